//! Common test infrastructure
//!
//! Fixtures for the end-to-end tests, all built on the in-memory cluster.
//! Tests should only import from this module, not from internal submodules.
//!
//! # Example
//!
//! ```no_run
//! mod common;
//! use common::{orchestrator, provisioning_request, template_cluster};
//!
//! #[tokio::test]
//! async fn test_provision() {
//!     let cluster = template_cluster();
//!     let (orchestrator, _activity) = orchestrator(&cluster);
//!
//!     let result = orchestrator.provision(&provisioning_request()).await;
//!     assert!(result.success);
//! }
//! ```

mod constants;
mod fixtures;

pub use constants::*;
pub use fixtures::*;
