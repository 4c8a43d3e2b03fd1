//! Tenant database provisioning.
//!
//! [`Orchestrator::provision`] walks a linear state machine:
//!
//! ```text
//! DuplicateCheck -> KeywordValidation -> CreateDatabase -> ConfigureOptions
//!   -> CreateAccounts -> CloneSchema -> CloneExtendedProperties -> CloneIndexes
//!   -> CopyBaselineData -> CreateAdminAccount -> Verify
//! ```
//!
//! Nothing is written before `CreateDatabase`. A failure from there up to
//! `CreateAdminAccount` rolls the target back; `Verify` only produces warnings.

mod credentials;
mod error;
mod models;
mod orchestrator;
mod rollback;
mod template;

pub use credentials::{generate_password, hash_password};
pub use error::{map_server_error, ProvisionError};
pub use models::{
    AdminAccount, ProvisionStep, ProvisioningOutcome, ProvisioningPreview, ProvisioningRequest,
    ProvisioningResult, StepRecord,
};
pub use orchestrator::Orchestrator;
pub use rollback::{roll_back, RollbackAction, RollbackLog};
pub use template::AdminOutcome;
