//! Per-subject impression counting.

mod handler;
mod schema;
mod store;

pub use handler::ImpressionsJobHandler;
pub use store::SqliteImpressionStore;
