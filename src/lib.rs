//! Corp database manager library
//!
//! Provisioning of per-corp tenant databases from a template, and bulk data
//! synchronization between servers. The `corpdb` binary is a thin CLI over
//! [`CorpDbService`].

pub mod adapter;
pub mod config;
pub mod corp_code;
pub mod external;
pub mod options;
pub mod provisioning;
pub mod safety;
pub mod service;
pub mod sync;

// Re-export commonly used types for convenience
pub use adapter::{AdapterError, AdapterFactory, DatabaseAdapter, DbKind, MemoryCluster};
pub use provisioning::{Orchestrator, ProvisioningRequest, ProvisioningResult};
pub use service::CorpDbService;
pub use sync::{JobRegistry, SyncEngine, SyncJob, SyncRequest, SyncStrategy};
