pub mod allocation;
pub mod analytics;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod provider;
pub mod selection;
pub mod types;

pub use config::EngineConfig;
pub use error::FrappeError;
pub use pipeline::Engine;
pub use types::*;

/// Standard result type for all frappe operations
pub type FrappeResult<T> = Result<T, FrappeError>;
