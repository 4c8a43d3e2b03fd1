//! Seams to collaborators that live outside this crate: where server
//! credentials come from, where activity records go, and who knows which corp
//! owns which database.

mod activity;
mod corp_directory;
mod resolver;

pub use activity::{
    sql_excerpt, ActivityKind, ActivityRecord, ActivitySink, MemoryActivitySink,
    TracingActivitySink,
};
pub use corp_directory::{CorpDirectory, CorpInfo, MainDbCorpDirectory, StaticCorpDirectory};
pub use resolver::{ConnectionResolver, ServerConnection, ServerRegistry};

#[cfg(feature = "mock")]
pub use corp_directory::MockCorpDirectory;
#[cfg(feature = "mock")]
pub use resolver::MockConnectionResolver;
