use thiserror::Error;

#[derive(Debug, Error)]
pub enum FrappeError {
    #[error("Validation error: {field} — {reason}")]
    Validation { field: String, reason: String },

    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("No macro score recorded for {month}")]
    MissingMacroScore { month: String },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Data provider error: {0}")]
    Provider(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl FrappeError {
    /// Whether the run can continue after this error, with the affected fund
    /// left out of the computation.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, FrappeError::InsufficientData(_))
    }
}

impl From<serde_json::Error> for FrappeError {
    fn from(e: serde_json::Error) -> Self {
        FrappeError::Serialization(e.to_string())
    }
}

#[cfg(feature = "yaml")]
impl From<serde_yaml::Error> for FrappeError {
    fn from(e: serde_yaml::Error) -> Self {
        FrappeError::Serialization(e.to_string())
    }
}

impl From<regex::Error> for FrappeError {
    fn from(e: regex::Error) -> Self {
        FrappeError::Configuration(format!("invalid pattern: {e}"))
    }
}
