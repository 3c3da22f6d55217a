//! Durable job queues.
//!
//! Every job category gets its own FIFO. Jobs are [`JobEnvelope`]s carrying
//! an encoded [`JobParams`] bag; handlers decode the bag when they pick the
//! job up.

mod category;
mod envelope;
mod schema;
mod sqlite_store;
mod store;

pub use category::QueueCategory;
pub use envelope::{JobEnvelope, JobParams, ParamsError};
pub use sqlite_store::{CategoryQueue, SqliteJobQueueStore};
pub use store::{DurableQueue, InMemoryQueue};
