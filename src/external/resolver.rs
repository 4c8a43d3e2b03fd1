use crate::adapter::{AdapterError, DbKind};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Everything needed to reach one server. Resolved per operation and never
/// persisted by this crate.
#[derive(Clone, Serialize, Deserialize)]
pub struct ServerConnection {
    pub id: String,
    pub name: String,
    pub kind: DbKind,
    pub host: String,
    pub port: u16,
    pub username: String,
    #[serde(skip_serializing)]
    pub password: String,
    pub default_database: Option<String>,
    /// Directory for data files of newly created databases.
    pub data_path: Option<String>,
    /// Directory for log files of newly created databases.
    pub log_path: Option<String>,
}

impl fmt::Debug for ServerConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerConnection")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"***")
            .field("default_database", &self.default_database)
            .finish()
    }
}

/// Looks up connection details for a server id.
#[cfg_attr(feature = "mock", mockall::automock)]
#[async_trait]
pub trait ConnectionResolver: Send + Sync {
    async fn resolve(&self, server_id: &str) -> Result<ServerConnection, AdapterError>;
}

/// Resolver over a fixed set of servers, usually loaded from the config file.
#[derive(Debug, Clone, Default)]
pub struct ServerRegistry {
    servers: HashMap<String, ServerConnection>,
}

impl ServerRegistry {
    pub fn new(servers: Vec<ServerConnection>) -> Self {
        Self {
            servers: servers.into_iter().map(|s| (s.id.clone(), s)).collect(),
        }
    }

    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.servers.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.servers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }
}

#[async_trait]
impl ConnectionResolver for ServerRegistry {
    async fn resolve(&self, server_id: &str) -> Result<ServerConnection, AdapterError> {
        self.servers
            .get(server_id)
            .cloned()
            .ok_or_else(|| AdapterError::Connection(format!("Unknown server: {}", server_id)))
    }
}
