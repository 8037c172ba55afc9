use thiserror::Error;

#[derive(Error, Debug)]
pub enum LedgerlineError {
    #[error("Database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Missing schema mapping or malformed rule spec. Aborts the whole batch.
    #[error("Configuration error for source '{source_id}': {reason}")]
    Configuration { source_id: String, reason: String },

    /// A whole-column check failed (e.g. `validate_unique`). Aborts the pass.
    #[error("Batch validation failed on column '{column}': {reason}")]
    BatchValidation { column: String, reason: String },

    #[error("Unknown category: {0}")]
    UnknownCategory(String),

    #[error("Settings error: {0}")]
    Settings(String),

    #[error("{0}")]
    Other(String),
}

impl LedgerlineError {
    pub fn config(source_id: &str, reason: impl Into<String>) -> Self {
        Self::Configuration {
            source_id: source_id.to_string(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, LedgerlineError>;
