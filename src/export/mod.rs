//! Exports: correlation keys, the artifact state store and the
//! create/status/continue protocol around them.

mod artifact_store;
mod coordinator;
mod correlation;
mod format;
mod handler;

pub use artifact_store::{ArtifactStore, FsArtifactStore, InMemoryArtifactStore};
pub use coordinator::{ExportCoordinator, ExportError, ExportRequest, ExportState, StatusReport};
pub use correlation::{CorrelationKey, ExportKey, KeyParseError};
pub use format::{ExportFormat, ExportKind};
pub use handler::ExportJobHandler;
