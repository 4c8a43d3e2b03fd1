use super::models::ProvisionStep;
use crate::adapter::AdapterError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why a provisioning run stopped.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProvisionError {
    #[error("Invalid provisioning request: {reason}")]
    InvalidRequest { reason: String },

    #[error("Database '{database}' already exists on server '{server_id}'")]
    DuplicateDatabase { server_id: String, database: String },

    #[error("SQL contains forbidden keyword: {keyword}")]
    UnsafeSql { keyword: String },

    #[error("{step} failed, connection error: {message}")]
    Connection { step: ProvisionStep, message: String },

    #[error("{step} failed: {message}")]
    Query { step: ProvisionStep, message: String },

    #[error("Database '{database}' was not ready after {timeout_secs}s")]
    Timeout { database: String, timeout_secs: u64 },
}

impl ProvisionError {
    pub fn from_adapter(step: ProvisionStep, err: AdapterError) -> Self {
        match err {
            AdapterError::Connection(message) => ProvisionError::Connection { step, message },
            other => ProvisionError::Query {
                step,
                message: other.raw_message(),
            },
        }
    }

    /// Step the error was raised in. Request-level errors have none.
    pub fn step(&self) -> Option<ProvisionStep> {
        match self {
            ProvisionError::InvalidRequest { .. } => None,
            ProvisionError::DuplicateDatabase { .. } => Some(ProvisionStep::DuplicateCheck),
            ProvisionError::UnsafeSql { .. } => Some(ProvisionStep::KeywordValidation),
            ProvisionError::Connection { step, .. } | ProvisionError::Query { step, .. } => {
                Some(*step)
            }
            ProvisionError::Timeout { .. } => Some(ProvisionStep::CreateDatabase),
        }
    }

    /// Message suitable for the operator. Server errors go through
    /// [`map_server_error`]; everything else uses the display text.
    pub fn user_message(&self) -> String {
        match self {
            ProvisionError::DuplicateDatabase { database, .. } => {
                format!("Database '{}' already exists. Choose a different name.", database)
            }
            ProvisionError::Connection { .. } => {
                "Could not connect to the server. Check that it is running and reachable."
                    .to_string()
            }
            ProvisionError::Query { message, .. } => map_server_error(message),
            ProvisionError::Timeout { .. } => map_server_error("timeout"),
            other => other.to_string(),
        }
    }
}

/// Recognizable fragments of server messages and the guidance shown for them.
/// First match wins.
const SERVER_ERROR_HINTS: &[(&[&str], &str)] = &[
    (
        &["already exists"],
        "The database already exists. Choose a different name.",
    ),
    (
        &["permission", "denied"],
        "The server login lacks the privilege for this operation. Contact an administrator.",
    ),
    (
        &["disk", "space"],
        "Not enough disk space on the target server.",
    ),
    (
        &["path", "directory"],
        "The database file path is invalid. Check the server's data and log paths.",
    ),
    (
        &["timeout", "timed out"],
        "The operation timed out. Try again.",
    ),
    (
        &["connection"],
        "Could not connect to the server. Check that it is running and reachable.",
    ),
];

/// Maps a raw server message to operator guidance, falling back to the raw text.
pub fn map_server_error(raw: &str) -> String {
    let lower = raw.to_lowercase();
    SERVER_ERROR_HINTS
        .iter()
        .find(|(needles, _)| needles.iter().any(|n| lower.contains(n)))
        .map(|(_, hint)| hint.to_string())
        .unwrap_or_else(|| raw.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_server_error_table() {
        assert!(map_server_error("CREATE DATABASE permission denied in database 'master'.")
            .contains("privilege"));
        assert!(map_server_error("Could not allocate space for object").contains("disk space"));
        assert!(map_server_error("Directory lookup for the file \"X:\\a.mdf\" failed")
            .contains("file path"));
        assert!(map_server_error("Query timed out").contains("timed out"));
    }

    #[test]
    fn test_map_server_error_falls_back_to_raw() {
        assert_eq!(
            map_server_error("Incorrect syntax near 'GO'."),
            "Incorrect syntax near 'GO'."
        );
    }

    #[test]
    fn test_from_adapter_keeps_raw_text_and_step() {
        let err = ProvisionError::from_adapter(
            ProvisionStep::CloneSchema,
            AdapterError::Query("Invalid object name 'TB_X'.".into()),
        );
        assert_eq!(err.step(), Some(ProvisionStep::CloneSchema));
        assert_eq!(err.to_string(), "clone_schema failed: Invalid object name 'TB_X'.");

        let err = ProvisionError::from_adapter(
            ProvisionStep::CreateDatabase,
            AdapterError::Connection("Login failed for user 'sa'.".into()),
        );
        assert!(matches!(err, ProvisionError::Connection { .. }));
        assert!(err.user_message().contains("Could not connect"));
    }
}
