use axum::extract::FromRef;

use crate::export::{ExportCoordinator, FsArtifactStore};
use crate::queue::DurableQueue;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use super::ServerConfig;

pub type GuardedCoordinator = Arc<ExportCoordinator>;
pub type GuardedArtifactStore = Arc<FsArtifactStore>;

#[derive(Clone)]
pub struct ServerState {
    pub config: ServerConfig,
    pub start_time: Instant,
    pub coordinator: GuardedCoordinator,
    /// The same store the coordinator reads, addressed by path for the
    /// provider-side routes.
    pub artifacts: GuardedArtifactStore,
    /// Every category queue, reported on the home route.
    pub queues: Vec<Arc<dyn DurableQueue>>,
    pub uploads_dir: PathBuf,
}

impl FromRef<ServerState> for GuardedCoordinator {
    fn from_ref(input: &ServerState) -> Self {
        input.coordinator.clone()
    }
}

impl FromRef<ServerState> for GuardedArtifactStore {
    fn from_ref(input: &ServerState) -> Self {
        input.artifacts.clone()
    }
}

impl FromRef<ServerState> for ServerConfig {
    fn from_ref(input: &ServerState) -> Self {
        input.config.clone()
    }
}
