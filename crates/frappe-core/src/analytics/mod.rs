//! Return and correlation engine: pure functions over price tables.

pub mod correlation;
pub mod returns;
