use super::models::DbKind;
use thiserror::Error;

/// Errors raised by adapters.
///
/// Adapters never reword server messages: `Query` carries the raw text so that
/// callers can map it to something human readable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdapterError {
    /// Transport or authentication failure. Never retried.
    #[error("Connection failed: {0}")]
    Connection(String),

    /// The server rejected a statement.
    #[error("{0}")]
    Query(String),

    #[error("{capability} is not supported by {kind} adapters")]
    Unsupported {
        kind: DbKind,
        capability: &'static str,
    },

    /// Local file handling around export/import.
    #[error("I/O error: {0}")]
    Io(String),
}

impl AdapterError {
    /// The server's own message, or the display text for non-query errors.
    pub fn raw_message(&self) -> String {
        match self {
            AdapterError::Query(raw) | AdapterError::Connection(raw) => raw.clone(),
            other => other.to_string(),
        }
    }

    pub fn is_connection(&self) -> bool {
        matches!(self, AdapterError::Connection(_))
    }
}

impl From<std::io::Error> for AdapterError {
    fn from(err: std::io::Error) -> Self {
        AdapterError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for AdapterError {
    fn from(err: serde_json::Error) -> Self {
        AdapterError::Io(err.to_string())
    }
}
