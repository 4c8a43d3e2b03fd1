//! Wrapper around the SQL Server `bcp` utility.

use super::error::SyncError;
use crate::adapter::TableName;
use crate::external::ServerConnection;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

/// Where the mssql-tools packages install `bcp` when it is not on `PATH`.
const KNOWN_LOCATIONS: [&str; 2] = ["/opt/mssql-tools/bin/bcp", "/opt/mssql-tools18/bin/bcp"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Out,
    In,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Out => "out",
            Direction::In => "in",
        }
    }
}

#[derive(Debug, Clone)]
pub struct BulkCopyTool {
    path: PathBuf,
    batch_size: u32,
}

impl BulkCopyTool {
    pub fn new(path: PathBuf, batch_size: u32) -> Self {
        Self { path, batch_size }
    }

    /// Finds the executable: the configured path if it exists, then `PATH`,
    /// then the usual install locations.
    pub fn locate(configured: Option<&Path>) -> Option<PathBuf> {
        if let Some(path) = configured {
            return path.exists().then(|| path.to_path_buf());
        }
        if let Ok(path) = which::which("bcp") {
            return Some(path);
        }
        KNOWN_LOCATIONS
            .iter()
            .map(PathBuf::from)
            .find(|p| p.exists())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Arguments for one transfer in native format.
    pub fn args(
        &self,
        direction: Direction,
        server: &ServerConnection,
        database: &str,
        table: &TableName,
        file: &Path,
        keep_identity: bool,
    ) -> Vec<String> {
        let schema = table.schema.as_deref().unwrap_or("dbo");
        let mut args = vec![
            format!("[{}].[{}].[{}]", database, schema, table.name),
            direction.as_str().to_string(),
            file.display().to_string(),
            "-S".to_string(),
            format!("{},{}", server.host, server.port),
            "-U".to_string(),
            server.username.clone(),
            "-P".to_string(),
            server.password.clone(),
            "-n".to_string(),
            "-b".to_string(),
            self.batch_size.to_string(),
        ];
        if direction == Direction::In {
            args.push("-h".to_string());
            args.push("TABLOCK".to_string());
            if keep_identity {
                args.push("-E".to_string());
            }
        }
        args
    }

    /// Runs one transfer and returns the tool's combined output.
    pub async fn run(
        &self,
        direction: Direction,
        server: &ServerConnection,
        database: &str,
        table: &TableName,
        file: &Path,
        keep_identity: bool,
    ) -> Result<String, SyncError> {
        debug!(
            "bcp {} {} ({}/{})",
            direction.as_str(),
            table,
            server.id,
            database
        );
        let output = Command::new(&self.path)
            .args(self.args(direction, server, database, table, file, keep_identity))
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await?;

        let mut text = String::from_utf8_lossy(&output.stdout).to_string();
        text.push_str(&String::from_utf8_lossy(&output.stderr));
        if !output.status.success() {
            return Err(SyncError::BulkTool {
                direction: direction.as_str(),
                message: text.trim().to_string(),
            });
        }
        Ok(text)
    }
}
