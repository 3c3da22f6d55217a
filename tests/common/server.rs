//! Test server lifecycle management
//!
//! Each test gets an isolated server with its own in-memory job queue and
//! temporary export root. No dispatch loops run; tests drive the queues
//! and the publish dispatcher by hand.

use super::constants::*;
use export_pipeline::export::{ArtifactStore, CorrelationKey, ExportCoordinator, FsArtifactStore};
use export_pipeline::publish::{
    DirectoryPublisher, PublishDestination, PublishJobHandler, PublisherRegistry,
};
use export_pipeline::queue::{DurableQueue, QueueCategory, SqliteJobQueueStore};
use export_pipeline::server::{make_app, RequestsLoggingLevel, ServerConfig, ServerState};
use export_pipeline::workers::{PublishDispatcher, PublishPool};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tokio::net::TcpListener;

/// Test server instance with isolated queues and export root
///
/// When dropped, the server gracefully shuts down and temp resources are cleaned up.
pub struct TestServer {
    /// Base URL for making requests (e.g., "http://127.0.0.1:12345")
    pub base_url: String,

    /// The store the server reads artifacts and sidecars from
    pub artifacts: Arc<FsArtifactStore>,

    pub export_queue: Arc<dyn DurableQueue>,
    pub publish_queue: Arc<dyn DurableQueue>,

    /// Consumer for the publish queue, ticked manually by tests
    pub publish_dispatcher: Arc<PublishDispatcher>,

    /// Where the directory publisher copies published files
    pub public_dir: PathBuf,

    // Private fields - keep resources alive until drop
    _temp_dir: TempDir,
    _shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

impl TestServer {
    /// Spawns a new test server on a random port
    pub async fn spawn() -> Self {
        Self::spawn_with(true).await
    }

    /// Spawns a server that behaves as if no renderer were configured
    pub async fn spawn_without_renderer() -> Self {
        Self::spawn_with(false).await
    }

    async fn spawn_with(exports_enabled: bool) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let export_root = temp_dir.path().join("exports");
        let public_dir = temp_dir.path().join("public");
        std::fs::create_dir_all(&export_root).expect("Failed to create export root");

        let queue_store = SqliteJobQueueStore::in_memory().expect("Failed to open job queue");
        let export_queue: Arc<dyn DurableQueue> =
            Arc::new(queue_store.queue(QueueCategory::Export));
        let publish_queue: Arc<dyn DurableQueue> =
            Arc::new(queue_store.queue(QueueCategory::VideoPublish));
        let queues: Vec<Arc<dyn DurableQueue>> = vec![
            Arc::new(queue_store.queue(QueueCategory::Email)),
            export_queue.clone(),
            Arc::new(queue_store.queue(QueueCategory::Impressions)),
            publish_queue.clone(),
        ];

        let artifacts = Arc::new(FsArtifactStore::new(export_root.clone()));
        let registry = Arc::new(PublisherRegistry::new().with(
            PublishDestination::Directory,
            Arc::new(DirectoryPublisher::new(
                public_dir.clone(),
                PUBLIC_BASE_URL.to_string(),
            )),
        ));
        let coordinator = Arc::new(ExportCoordinator::new(
            artifacts.clone() as Arc<dyn ArtifactStore>,
            export_queue.clone(),
            publish_queue.clone(),
            registry.clone(),
            Duration::from_secs(STATUS_TIMEOUT_SECS),
        ));
        let publish_dispatcher = Arc::new(PublishDispatcher::new(
            publish_queue.clone(),
            Arc::new(PublishJobHandler::new(
                artifacts.clone() as Arc<dyn ArtifactStore>,
                registry,
            )),
            PublishPool::new(2),
        ));

        // Bind to random port
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind to random port");
        let port = listener
            .local_addr()
            .expect("Failed to get local address")
            .port();
        let base_url = format!("http://127.0.0.1:{}", port);

        let state = ServerState {
            config: ServerConfig {
                requests_logging_level: RequestsLoggingLevel::None,
                port,
                metrics_port: 0,
                exports_enabled,
            },
            start_time: Instant::now(),
            coordinator,
            artifacts: artifacts.clone(),
            queues,
            uploads_dir: export_root.join("uploads"),
        };
        let app = make_app(state);

        // Create shutdown channel
        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

        // Spawn server in background task with graceful shutdown
        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await
                .expect("Server failed");
        });

        let server = Self {
            base_url,
            artifacts,
            export_queue,
            publish_queue,
            publish_dispatcher,
            public_dir,
            _temp_dir: temp_dir,
            _shutdown_tx: Some(shutdown_tx),
        };

        server.wait_for_ready().await;

        server
    }

    pub fn export_root(&self) -> &Path {
        self.artifacts.root()
    }

    /// Stand in for the renderer: write the artifact for `key`.
    pub fn write_artifact(&self, key: &CorrelationKey) -> PathBuf {
        let path = self
            .artifacts
            .prepare_output(key)
            .expect("Failed to prepare artifact path");
        std::fs::write(&path, b"rendered bytes").expect("Failed to write artifact");
        path
    }

    /// Artifact path relative to the export root, as the provider routes take it.
    pub fn relative_artifact_path(&self, key: &CorrelationKey) -> String {
        self.artifacts
            .artifact_path(key)
            .strip_prefix(self.export_root())
            .expect("Artifact outside export root")
            .to_string_lossy()
            .to_string()
    }

    /// Waits for the server to become ready by polling the home route
    async fn wait_for_ready(&self) {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(100))
            .build()
            .expect("Failed to build reqwest client");

        let start = Instant::now();
        let timeout = Duration::from_millis(SERVER_READY_TIMEOUT_MS);

        loop {
            if start.elapsed() > timeout {
                panic!(
                    "Server did not become ready within {}ms",
                    SERVER_READY_TIMEOUT_MS
                );
            }

            match client.get(format!("{}/", self.base_url)).send().await {
                Ok(response) if response.status().is_success() => return,
                _ => {
                    tokio::time::sleep(Duration::from_millis(SERVER_READY_POLL_INTERVAL_MS)).await;
                }
            }
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self._shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}
