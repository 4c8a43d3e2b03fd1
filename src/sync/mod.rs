//! Bulk data synchronization between servers.
//!
//! A [`SyncRequest`] names the tables to move and one of three transports
//! ([`SyncStrategy`]). [`SyncEngine::start`] registers a [`SyncJob`] in the
//! [`JobRegistry`] and runs it as a tokio task: tables are processed one at a
//! time in request order and cancellation is checked between tables.

mod bulk_tool;
mod engine;
mod error;
mod export_import;
mod models;
pub mod registry;
mod remote_direct;
mod row_copy;
mod strategy;

pub use bulk_tool::{BulkCopyTool, Direction};
pub use engine::SyncEngine;
pub use error::SyncError;
pub use models::{
    JobStatus, SyncJob, SyncOptions, SyncRequest, SyncStrategy, TableAction, TableSpec,
    TableStatus, TableSyncResult,
};
pub use registry::JobRegistry;
pub use remote_direct::NO_SUBSTITUTION_NOTICE;
pub use strategy::{transport_for, SyncContext, TableTransport};
