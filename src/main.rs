use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use std::time::Instant;
use std::{fmt::Debug, path::PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{info, level_filters::LevelFilter, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use export_pipeline::config;
use export_pipeline::dispatch::{spawn_periodic, DispatchLoop};
use export_pipeline::export::{ArtifactStore, ExportCoordinator, ExportJobHandler, FsArtifactStore};
use export_pipeline::impressions::{ImpressionsJobHandler, SqliteImpressionStore};
use export_pipeline::mail::{EmailJobHandler, FallbackPolicy, LettreTransport};
use export_pipeline::publish::{
    DirectoryPublisher, ProviderPublisher, PublishDestination, PublishJobHandler,
    PublisherRegistry,
};
use export_pipeline::queue::{DurableQueue, QueueCategory, SqliteJobQueueStore};
use export_pipeline::server::{metrics, run_server, RequestsLoggingLevel, ServerConfig, ServerState};
use export_pipeline::workers::{PublishDispatcher, PublishPool, RenderPool, TokioProcessLauncher};

fn parse_path(s: &str) -> Result<PathBuf, String> {
    let path_buf = PathBuf::from(s);
    let original_path = match path_buf.canonicalize() {
        Ok(path) => path,
        Err(msg) => {
            if msg.kind() == std::io::ErrorKind::NotFound {
                path_buf
            } else {
                return Err(format!("Error resolving path '{}': {}", s, msg));
            }
        }
    };
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir().map_err(|e| format!("Failed to get current dir: {}", e))?;
    Ok(cwd.join(original_path))
}

fn parse_dir(s: &str) -> Result<PathBuf, String> {
    let path = parse_path(s)?;
    if !path.exists() {
        return Err(format!("Directory does not exist: {}", s));
    }
    if !path.is_dir() {
        return Err(format!("Path is not a directory: {}", s));
    }
    Ok(path)
}

#[derive(Parser, Debug)]
struct CliArgs {
    /// Path to TOML configuration file. Values in the file override CLI arguments.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// Directory containing database files (job_queue.db, impressions.db).
    /// Can also be specified in config file.
    #[clap(long, value_parser = parse_dir)]
    pub db_dir: Option<PathBuf>,

    /// Directory where rendered artifacts and their status files live.
    /// Defaults to `exports` under the database directory.
    #[clap(long, value_parser = parse_path)]
    pub export_root: Option<PathBuf>,

    /// The port to listen on.
    #[clap(short, long, default_value_t = 3001)]
    pub port: u16,

    /// The port for the metrics server (Prometheus scraping).
    #[clap(long, default_value_t = 9091)]
    pub metrics_port: u16,

    /// The level of logging to perform on each request.
    #[clap(long, default_value = "path")]
    pub logging_level: RequestsLoggingLevel,

    /// Base URL under which the directory publisher's files are served.
    #[clap(long)]
    pub public_base_url: Option<String>,

    /// Path to the external renderer executable. Exports are disabled without it.
    #[clap(long, value_parser = parse_path)]
    pub renderer_path: Option<PathBuf>,

    /// Base URL of the external video provider.
    #[clap(long)]
    pub provider_url: Option<String>,

    /// SMTP host for outgoing mail. Mail jobs stay queued without it.
    #[clap(long)]
    pub mail_host: Option<String>,
}

/// Convert CLI args to CliConfig for config resolution
impl From<&CliArgs> for config::CliConfig {
    fn from(args: &CliArgs) -> Self {
        config::CliConfig {
            db_dir: args.db_dir.clone(),
            export_root: args.export_root.clone(),
            port: args.port,
            metrics_port: args.metrics_port,
            logging_level: args.logging_level.clone(),
            public_base_url: args.public_base_url.clone(),
            renderer_path: args.renderer_path.clone(),
            provider_url: args.provider_url.clone(),
            mail_host: args.mail_host.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .unwrap();

    // Load TOML config if provided
    let file_config = match &cli_args.config {
        Some(path) => {
            info!("Loading configuration from {:?}", path);
            Some(config::FileConfig::load(path)?)
        }
        None => None,
    };

    // Resolve final configuration (TOML overrides CLI)
    let cli_config: config::CliConfig = (&cli_args).into();
    let app_config = config::AppConfig::resolve(&cli_config, file_config)?;

    info!("Configuration loaded:");
    info!("  db_dir: {:?}", app_config.db_dir);
    info!("  export_root: {:?}", app_config.export_root);
    info!("  port: {}", app_config.port);

    info!("Initializing metrics...");
    metrics::init_metrics();

    std::fs::create_dir_all(&app_config.export_root)
        .with_context(|| format!("Failed to create export root {:?}", app_config.export_root))?;

    info!("Opening job queue at {:?}", app_config.queue_db_path());
    let queue_store = SqliteJobQueueStore::new(app_config.queue_db_path())?;
    let email_queue: Arc<dyn DurableQueue> = Arc::new(queue_store.queue(QueueCategory::Email));
    let export_queue: Arc<dyn DurableQueue> = Arc::new(queue_store.queue(QueueCategory::Export));
    let impressions_queue: Arc<dyn DurableQueue> =
        Arc::new(queue_store.queue(QueueCategory::Impressions));
    let publish_queue: Arc<dyn DurableQueue> =
        Arc::new(queue_store.queue(QueueCategory::VideoPublish));

    let artifacts = Arc::new(FsArtifactStore::new(app_config.export_root.clone()));

    let mut registry = PublisherRegistry::new();
    registry.register(
        PublishDestination::Directory,
        Arc::new(DirectoryPublisher::new(
            app_config.publish.public_dir.clone(),
            app_config.public_base_url.clone(),
        )),
    );
    match &app_config.publish.provider_url {
        Some(url) => {
            info!("Video provider configured at {}", url);
            registry.register(
                PublishDestination::Provider,
                Arc::new(ProviderPublisher::new(
                    url.clone(),
                    app_config.publish.request_timeout_secs,
                )),
            );
        }
        None => info!("No video provider configured, provider publishing disabled"),
    }
    let registry = Arc::new(registry);

    let coordinator = Arc::new(ExportCoordinator::new(
        artifacts.clone() as Arc<dyn ArtifactStore>,
        export_queue.clone(),
        publish_queue.clone(),
        registry.clone(),
        app_config.dispatch.status_timeout,
    ));

    let shutdown_token = CancellationToken::new();
    let dispatch = &app_config.dispatch;

    match &app_config.mail {
        Some(mail_settings) => {
            let transport = Arc::new(LettreTransport::new(mail_settings)?);
            let handler = EmailJobHandler::new(
                transport,
                FallbackPolicy::new(mail_settings.endpoints.clone()),
            );
            let email_loop = Arc::new(DispatchLoop::new(email_queue.clone(), Arc::new(handler)));
            spawn_periodic(
                "email",
                dispatch.email_interval,
                shutdown_token.child_token(),
                move || {
                    let email_loop = email_loop.clone();
                    async move { email_loop.tick().await.map(|_| ()) }
                },
            );
        }
        None => warn!("No mail host configured, email jobs will stay queued"),
    }

    let exports_enabled = match &app_config.render.executable {
        Some(executable) => {
            info!("Renderer configured at {:?}", executable);
            let pool = Arc::new(RenderPool::new(
                Arc::new(TokioProcessLauncher),
                app_config.render.max_concurrent,
                app_config.render.wait_timeout,
            ));
            let handler = ExportJobHandler::new(
                pool,
                artifacts.clone() as Arc<dyn ArtifactStore>,
                executable.clone(),
                app_config.render.extra_args.clone(),
            );
            let export_loop = Arc::new(DispatchLoop::new(export_queue.clone(), Arc::new(handler)));
            spawn_periodic(
                "export",
                dispatch.export_interval,
                shutdown_token.child_token(),
                move || {
                    let export_loop = export_loop.clone();
                    async move { export_loop.tick().await.map(|_| ()) }
                },
            );
            true
        }
        None => {
            warn!("No renderer configured, export creation disabled");
            false
        }
    };

    info!(
        "Opening impressions database at {:?}",
        app_config.impressions_db_path()
    );
    let impressions_store = SqliteImpressionStore::new(app_config.impressions_db_path())?;
    let impressions_loop = Arc::new(DispatchLoop::new(
        impressions_queue.clone(),
        Arc::new(ImpressionsJobHandler::new(impressions_store)),
    ));
    spawn_periodic(
        "impressions",
        dispatch.impressions_interval,
        shutdown_token.child_token(),
        move || {
            let impressions_loop = impressions_loop.clone();
            async move { impressions_loop.tick().await.map(|_| ()) }
        },
    );

    let publish_dispatcher = Arc::new(PublishDispatcher::new(
        publish_queue.clone(),
        Arc::new(PublishJobHandler::new(
            artifacts.clone() as Arc<dyn ArtifactStore>,
            registry.clone(),
        )),
        PublishPool::new(app_config.publish.max_concurrent),
    ));
    spawn_periodic(
        "publish",
        dispatch.publish_interval,
        shutdown_token.child_token(),
        move || {
            let publish_dispatcher = publish_dispatcher.clone();
            async move { publish_dispatcher.tick().await.map(|_| ()) }
        },
    );

    let state = ServerState {
        config: ServerConfig {
            requests_logging_level: app_config.logging_level.clone(),
            port: app_config.port,
            metrics_port: app_config.metrics_port,
            exports_enabled,
        },
        start_time: Instant::now(),
        coordinator,
        artifacts: artifacts.clone(),
        queues: vec![email_queue, export_queue, impressions_queue, publish_queue],
        uploads_dir: app_config.export_root.join("uploads"),
    };

    tokio::select! {
        result = run_server(state, shutdown_token.child_token()) => {
            info!("HTTP server stopped: {:?}", result);
            shutdown_token.cancel();
            result
        },
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down...");
            shutdown_token.cancel();
            Ok(())
        },
    }
}
