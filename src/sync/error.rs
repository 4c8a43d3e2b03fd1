use crate::adapter::AdapterError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Invalid sync request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Adapter(#[from] AdapterError),

    #[error("Row count mismatch: source {source_rows}, target {target_rows}")]
    RowCountMismatch { source_rows: u64, target_rows: u64 },

    #[error("bcp {direction} failed: {message}")]
    BulkTool {
        direction: &'static str,
        message: String,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Job was cancelled")]
    Cancelled,
}

impl SyncError {
    /// Message stored on the failed table, without the wrapping of the
    /// adapter variants.
    pub fn table_message(&self) -> String {
        match self {
            SyncError::Adapter(e) => e.raw_message(),
            other => other.to_string(),
        }
    }
}
