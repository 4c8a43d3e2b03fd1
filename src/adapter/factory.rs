use super::dialect::dialect_for;
use super::error::AdapterError;
use super::sql_adapter::SqlAdapter;
use super::{session, DatabaseAdapter};
use crate::external::ConnectionResolver;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// Opens adapters by server id.
///
/// The server's kind tag, resolved at open time, picks the dialect and the
/// driver. Every call returns a fresh connection owned by the caller.
#[async_trait]
pub trait AdapterFactory: Send + Sync {
    async fn open(
        &self,
        server_id: &str,
        database: Option<&str>,
    ) -> Result<Box<dyn DatabaseAdapter>, AdapterError>;
}

/// Factory that connects through the real drivers.
pub struct DriverFactory {
    resolver: Arc<dyn ConnectionResolver>,
}

impl DriverFactory {
    pub fn new(resolver: Arc<dyn ConnectionResolver>) -> Self {
        Self { resolver }
    }
}

#[async_trait]
impl AdapterFactory for DriverFactory {
    async fn open(
        &self,
        server_id: &str,
        database: Option<&str>,
    ) -> Result<Box<dyn DatabaseAdapter>, AdapterError> {
        let server = self.resolver.resolve(server_id).await?;
        debug!(
            "Opening {} adapter for {} ({}:{}) database={:?}",
            server.kind, server.id, server.host, server.port, database
        );
        let session = session::connect(&server, database).await?;
        let database = database
            .map(str::to_string)
            .or_else(|| server.default_database.clone());
        Ok(Box::new(SqlAdapter::new(
            dialect_for(server.kind),
            session,
            database,
        )))
    }
}
