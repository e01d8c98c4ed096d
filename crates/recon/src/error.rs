use thiserror::Error;

/// Errors raised at the engine boundary (config parsing, record ingestion).
///
/// The reconciliation steps themselves never fail: missing values, invalid
/// overrides and empty groups are reported as data.
#[derive(Debug, Error)]
pub enum ReconError {
    /// TOML parse / deserialization error.
    #[error("config parse error: {0}")]
    ConfigParse(String),
    /// Config validation error (bad threshold, empty marker, etc.).
    #[error("config validation error: {0}")]
    ConfigValidation(String),
    /// Missing required column in input data.
    #[error("record {index}: missing column '{column}'")]
    MissingColumn { index: usize, column: String },
    /// A record that cannot be ingested (non-scalar value, bad report type).
    #[error("record {index}: {reason}")]
    InvalidRecord { index: usize, reason: String },
    /// JSON input could not be decoded.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    /// CSV input could not be decoded.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}
