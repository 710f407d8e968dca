use thiserror::Error;

#[derive(Error, Debug)]
pub enum SorterError {
    #[error("invalid trigger payload: {0}")]
    InvalidTrigger(String),

    #[error("unparsable file key '{key}': {reason}")]
    UnparsableKey { key: String, reason: String },

    #[error("no destination bucket configured for instrument '{0}'")]
    UnknownInstrument(String),

    #[error("source object {bucket}/{key} does not exist")]
    SourceMissing { bucket: String, key: String },

    #[error("copy to {bucket}/{key} failed: {cause}")]
    CopyFailed {
        bucket: String,
        key: String,
        cause: String,
    },

    #[error("copy to {bucket}/{key} could not be confirmed, source retained")]
    CopyUnconfirmed { bucket: String, key: String },

    #[error("copied to {bucket}/{key} but source cleanup failed: {cause}")]
    PartialCleanupFailure {
        bucket: String,
        key: String,
        cause: String,
    },

    #[error("storage error: {0}")]
    Storage(String),

    #[error("notification delivery failed: {0}")]
    Notification(String),

    #[error("audit append failed: {0}")]
    Audit(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON deserialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Environment variable error: {0}")]
    Env(#[from] std::env::VarError),
}

impl SorterError {
    /// Short label for audit entries and log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            SorterError::InvalidTrigger(_) => "invalid_trigger",
            SorterError::UnparsableKey { .. } => "unparsable_key",
            SorterError::UnknownInstrument(_) => "unknown_instrument",
            SorterError::SourceMissing { .. } => "source_missing",
            SorterError::CopyFailed { .. } => "copy_failed",
            SorterError::CopyUnconfirmed { .. } => "copy_unconfirmed",
            SorterError::PartialCleanupFailure { .. } => "partial_cleanup_failure",
            SorterError::Storage(_) => "storage",
            SorterError::Notification(_) => "notification",
            SorterError::Audit(_) => "audit",
            SorterError::Config(_) => "config",
            SorterError::Http(_) => "http",
            SorterError::Json(_) => "json",
            SorterError::Toml(_) => "toml",
            SorterError::Io(_) => "io",
            SorterError::Env(_) => "env",
        }
    }
}

pub type Result<T> = std::result::Result<T, SorterError>;
