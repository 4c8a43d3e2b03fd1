//! What a correctly provisioned database looks like.
//!
//! Everything here is derived from the database name and environment settings
//! only, never from tenant data. Scripts use `GO` lines as statement
//! separators for every server kind; [`parse_sql_statements`] splits them back
//! into statements the adapters can execute one at a time.

mod create_sql;
mod script;
mod sections;
mod verify;

pub use create_sql::{generate_create_database_sql, CreateDatabaseParams, PASSWORD_PLACEHOLDER};
pub use script::{extract_database_name, parse_sql_statements};
pub use sections::{generate_sections, ConfigurationSection, SectionName};
pub use verify::{verification_sql, verify, SectionOutcome, VerificationReport};
