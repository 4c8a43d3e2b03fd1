use super::models::ProvisionStep;
use crate::adapter::AdapterFactory;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// One compensating action and how it went.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollbackAction {
    pub description: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Record of a rollback, kept in the result for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollbackLog {
    pub trigger_step: ProvisionStep,
    pub original_error: String,
    pub actions: Vec<RollbackAction>,
}

impl RollbackLog {
    pub fn is_complete(&self) -> bool {
        self.actions.iter().all(|a| a.success)
    }

    fn push(&mut self, description: String, result: Result<(), String>) {
        match &result {
            Ok(()) => info!("Rollback: {}", description),
            Err(e) => warn!("Rollback: {} failed: {}", description, e),
        }
        self.actions.push(RollbackAction {
            description,
            success: result.is_ok(),
            error: result.err(),
        });
    }
}

/// Undoes what a failed run created on `server_id`: the database if the run
/// created it and it still exists, then the login if one was created.
///
/// Never fails. Every problem is recorded in the returned log.
pub async fn roll_back(
    factory: &dyn AdapterFactory,
    server_id: &str,
    database: &str,
    database_created: bool,
    login_name: Option<&str>,
    trigger_step: ProvisionStep,
    original_error: &str,
) -> RollbackLog {
    let mut log = RollbackLog {
        trigger_step,
        original_error: original_error.to_string(),
        actions: Vec::new(),
    };

    let adapter = match factory.open(server_id, None).await {
        Ok(adapter) => adapter,
        Err(e) => {
            log.push(
                format!("connect to server {}", server_id),
                Err(e.raw_message()),
            );
            return log;
        }
    };

    let exists = if database_created {
        adapter.database_exists(database).await
    } else {
        Ok(false)
    };
    match exists {
        Ok(true) => {
            let result = adapter
                .drop_database(database)
                .await
                .map_err(|e| e.raw_message());
            log.push(format!("drop database {}", database), result);
        }
        Ok(false) => {}
        Err(e) => log.push(
            format!("check database {}", database),
            Err(e.raw_message()),
        ),
    }

    if let Some(login) = login_name {
        let result = adapter
            .drop_login(login)
            .await
            .map_err(|e| e.raw_message());
        log.push(format!("drop login {}", login), result);
    }

    if let Err(e) = adapter.close().await {
        warn!("Closing rollback connection failed: {}", e);
    }
    log
}
