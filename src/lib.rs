//! Export Pipeline Library
//!
//! Durable job queues, their dispatch loops and the export/publish protocol
//! built on top of them. Exposed as a library for the binary and for tests.

pub mod config;
pub mod dispatch;
pub mod export;
pub mod impressions;
pub mod mail;
pub mod publish;
pub mod queue;
pub mod server;
pub mod sqlite_persistence;
pub mod workers;

// Re-export commonly used types for convenience
pub use queue::{DurableQueue, JobEnvelope, JobParams, QueueCategory, SqliteJobQueueStore};
pub use server::{run_server, RequestsLoggingLevel};
