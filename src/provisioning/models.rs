use super::error::ProvisionError;
use super::rollback::RollbackLog;
use crate::config::ProvisioningSettings;
use crate::options::VerificationReport;
use serde::{Deserialize, Serialize};
use std::fmt;

/// States of the provisioning state machine, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProvisionStep {
    DuplicateCheck,
    KeywordValidation,
    CreateDatabase,
    ConfigureOptions,
    CreateAccounts,
    CloneSchema,
    CloneExtendedProperties,
    CloneIndexes,
    CopyBaselineData,
    CreateAdminAccount,
    Verify,
}

impl ProvisionStep {
    pub const ALL: [ProvisionStep; 11] = [
        ProvisionStep::DuplicateCheck,
        ProvisionStep::KeywordValidation,
        ProvisionStep::CreateDatabase,
        ProvisionStep::ConfigureOptions,
        ProvisionStep::CreateAccounts,
        ProvisionStep::CloneSchema,
        ProvisionStep::CloneExtendedProperties,
        ProvisionStep::CloneIndexes,
        ProvisionStep::CopyBaselineData,
        ProvisionStep::CreateAdminAccount,
        ProvisionStep::Verify,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProvisionStep::DuplicateCheck => "duplicate_check",
            ProvisionStep::KeywordValidation => "keyword_validation",
            ProvisionStep::CreateDatabase => "create_database",
            ProvisionStep::ConfigureOptions => "configure_options",
            ProvisionStep::CreateAccounts => "create_accounts",
            ProvisionStep::CloneSchema => "clone_schema",
            ProvisionStep::CloneExtendedProperties => "clone_extended_properties",
            ProvisionStep::CloneIndexes => "clone_indexes",
            ProvisionStep::CopyBaselineData => "copy_baseline_data",
            ProvisionStep::CreateAdminAccount => "create_admin_account",
            ProvisionStep::Verify => "verify",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|step| step.as_str() == s)
    }

    /// Whether a failure in this step has to be rolled back.
    pub fn requires_rollback(&self) -> bool {
        *self >= ProvisionStep::CreateDatabase && *self < ProvisionStep::Verify
    }
}

impl fmt::Display for ProvisionStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Application user created inside the new database.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminAccount {
    pub user_id: String,
    pub display_name: String,
    /// Generated when `None`; returned in the result.
    #[serde(default, skip_serializing)]
    pub password: Option<String>,
    pub role: String,
}

impl Default for AdminAccount {
    fn default() -> Self {
        Self {
            user_id: "admin".to_string(),
            display_name: "System Administrator".to_string(),
            password: None,
            role: "ADMIN".to_string(),
        }
    }
}

impl fmt::Debug for AdminAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdminAccount")
            .field("user_id", &self.user_id)
            .field("display_name", &self.display_name)
            .field("password", &self.password.as_ref().map(|_| "********"))
            .field("role", &self.role)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisioningRequest {
    pub source_server_id: String,
    /// Template database cloned into the new one.
    pub source_database: String,
    pub target_server_id: String,
    /// Derived from the configured prefix and the corp code when empty.
    #[serde(default)]
    pub target_database_name: String,
    pub corp_code: String,
    pub corp_name: String,
    #[serde(default)]
    pub biz_no: Option<String>,
    /// Corp code used as placeholder in the template's baseline rows.
    #[serde(default)]
    pub template_corp_code: Option<String>,
    #[serde(default)]
    pub admin: AdminAccount,
    /// Statements to run instead of the generated CREATE script, usually an
    /// operator-edited copy of a preview.
    #[serde(default)]
    pub generated_sql: Option<Vec<String>>,
}

impl ProvisioningRequest {
    pub fn new(
        source_server_id: impl Into<String>,
        source_database: impl Into<String>,
        target_server_id: impl Into<String>,
        corp_code: impl Into<String>,
        corp_name: impl Into<String>,
    ) -> Self {
        Self {
            source_server_id: source_server_id.into(),
            source_database: source_database.into(),
            target_server_id: target_server_id.into(),
            target_database_name: String::new(),
            corp_code: corp_code.into(),
            corp_name: corp_name.into(),
            biz_no: None,
            template_corp_code: None,
            admin: AdminAccount::default(),
            generated_sql: None,
        }
    }

    pub fn with_database_name(mut self, name: impl Into<String>) -> Self {
        self.target_database_name = name.into();
        self
    }

    pub fn with_biz_no(mut self, biz_no: impl Into<String>) -> Self {
        self.biz_no = Some(biz_no.into());
        self
    }

    pub fn with_template_corp_code(mut self, code: impl Into<String>) -> Self {
        self.template_corp_code = Some(code.into());
        self
    }

    pub fn with_admin(mut self, admin: AdminAccount) -> Self {
        self.admin = admin;
        self
    }

    pub fn with_generated_sql(mut self, statements: Vec<String>) -> Self {
        self.generated_sql = Some(statements);
        self
    }

    /// Name of the database to create.
    pub fn database_name(&self, settings: &ProvisioningSettings) -> String {
        let explicit = self.target_database_name.trim();
        if explicit.is_empty() {
            format!("{}{}", settings.db_prefix, self.corp_code.trim())
        } else {
            explicit.to_string()
        }
    }
}

/// The CREATE script a request would run, for review before provisioning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisioningPreview {
    pub database_name: String,
    pub server_id: String,
    pub script: String,
    pub statements: Vec<String>,
}

/// What a finished run left behind on the target server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProvisioningOutcome {
    /// Rejected before any mutation.
    NothingCreated,
    /// Failed after mutating, and the mutations were rolled back.
    RolledBack,
    Created,
}

/// One executed state of the state machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepRecord {
    pub step: ProvisionStep,
    pub success: bool,
    pub elapsed_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisioningResult {
    pub success: bool,
    pub database_name: String,
    pub server_id: String,
    /// Tables cloned from the template.
    pub table_count: usize,
    pub elapsed_ms: u64,
    pub outcome: ProvisioningOutcome,
    /// Operator-facing message when the run failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ProvisionError>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub login_name: Option<String>,
    #[serde(default, skip_serializing)]
    pub login_password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admin_user_id: Option<String>,
    #[serde(default, skip_serializing)]
    pub admin_password: Option<String>,
    /// Baseline tables copied, with the number of rows each received.
    pub baseline_tables: Vec<(String, u64)>,
    pub warnings: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verification: Option<VerificationReport>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rollback: Option<RollbackLog>,
    pub steps: Vec<StepRecord>,
}

impl ProvisioningResult {
    pub fn step(&self, step: ProvisionStep) -> Option<&StepRecord> {
        self.steps.iter().find(|s| s.step == step)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rollback_applies_from_create_database_until_verify() {
        let rolled: Vec<ProvisionStep> = ProvisionStep::ALL
            .iter()
            .copied()
            .filter(ProvisionStep::requires_rollback)
            .collect();
        assert_eq!(rolled.first(), Some(&ProvisionStep::CreateDatabase));
        assert_eq!(rolled.last(), Some(&ProvisionStep::CreateAdminAccount));
        assert!(!ProvisionStep::Verify.requires_rollback());
        assert!(!ProvisionStep::KeywordValidation.requires_rollback());
    }

    #[test]
    fn test_database_name_defaults_to_prefix_and_corp_code() {
        let settings = ProvisioningSettings {
            db_prefix: "CORP".to_string(),
            ..Default::default()
        };
        let request = ProvisioningRequest::new("SRV1", "TPL01", "SRV2", "1001", "Acme Corp");
        assert_eq!(request.database_name(&settings), "CORP1001");
        let request = request.with_database_name("ACME_DB");
        assert_eq!(request.database_name(&settings), "ACME_DB");
    }

    #[test]
    fn test_admin_debug_hides_password() {
        let admin = AdminAccount {
            password: Some("Secret!1".to_string()),
            ..Default::default()
        };
        assert!(!format!("{:?}", admin).contains("Secret"));
    }

    #[test]
    fn test_step_round_trip() {
        for step in ProvisionStep::ALL {
            assert_eq!(ProvisionStep::from_str(step.as_str()), Some(step));
        }
    }
}
