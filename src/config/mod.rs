mod file_config;

pub use file_config::{DispatchConfig, FileConfig, MailConfig, PublishConfig, RenderConfig};

use crate::mail::MailEndpoint;
use crate::server::RequestsLoggingLevel;
use anyhow::{bail, Result};
use clap::ValueEnum;
use std::path::PathBuf;
use std::time::Duration;

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub db_dir: Option<PathBuf>,
    pub export_root: Option<PathBuf>,
    pub port: u16,
    pub metrics_port: u16,
    pub logging_level: RequestsLoggingLevel,
    pub public_base_url: Option<String>,
    pub renderer_path: Option<PathBuf>,
    pub provider_url: Option<String>,
    pub mail_host: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    // Core settings
    pub db_dir: PathBuf,
    pub export_root: PathBuf,
    pub port: u16,
    pub metrics_port: u16,
    pub logging_level: RequestsLoggingLevel,
    pub public_base_url: String,

    // Feature configs (with defaults)
    pub render: RenderSettings,
    pub publish: PublishSettings,
    /// Present only when a mail host is configured.
    pub mail: Option<MailSettings>,
    pub dispatch: DispatchSettings,
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let db_dir = file
            .db_dir
            .map(PathBuf::from)
            .or_else(|| cli.db_dir.clone())
            .ok_or_else(|| {
                anyhow::anyhow!("db_dir must be specified via --db-dir or in config file")
            })?;

        if !db_dir.exists() {
            bail!("Database directory does not exist: {:?}", db_dir);
        }
        if !db_dir.is_dir() {
            bail!("db_dir is not a directory: {:?}", db_dir);
        }

        let export_root = file
            .export_root
            .map(PathBuf::from)
            .or_else(|| cli.export_root.clone())
            .unwrap_or_else(|| db_dir.join("exports"));
        if export_root.exists() && !export_root.is_dir() {
            bail!("export_root is not a directory: {:?}", export_root);
        }

        let port = file.port.unwrap_or(cli.port);
        let metrics_port = file.metrics_port.unwrap_or(cli.metrics_port);

        let logging_level = file
            .logging_level
            .and_then(|s| parse_logging_level(&s))
            .unwrap_or_else(|| cli.logging_level.clone());

        let public_base_url = file
            .public_base_url
            .or_else(|| cli.public_base_url.clone())
            .unwrap_or_else(|| format!("http://localhost:{}/public", port));

        let render_file = file.render.unwrap_or_default();
        let render = RenderSettings {
            executable: render_file
                .executable
                .map(PathBuf::from)
                .or_else(|| cli.renderer_path.clone()),
            max_concurrent: render_file.max_concurrent.unwrap_or(4).max(1),
            wait_timeout: Duration::from_secs(render_file.wait_timeout_secs.unwrap_or(120)),
            extra_args: render_file.extra_args.unwrap_or_default(),
        };

        let publish_file = file.publish.unwrap_or_default();
        let publish = PublishSettings {
            provider_url: publish_file
                .provider_url
                .or_else(|| cli.provider_url.clone()),
            max_concurrent: publish_file.max_concurrent.unwrap_or(2).max(1),
            request_timeout_secs: publish_file.request_timeout_secs.unwrap_or(300),
            public_dir: publish_file
                .public_dir
                .map(PathBuf::from)
                .unwrap_or_else(|| export_root.join("public")),
        };

        let mail_file = file.mail.unwrap_or_default();
        let mail = match mail_file.host.or_else(|| cli.mail_host.clone()) {
            Some(host) => {
                let endpoints = mail_file
                    .endpoints
                    .unwrap_or_else(MailEndpoint::default_list);
                if endpoints.is_empty() {
                    bail!("[mail] endpoints must not be empty");
                }
                if mail_file.username.is_some() != mail_file.password.is_some() {
                    bail!("[mail] username and password must be provided together");
                }
                let from = mail_file
                    .from
                    .unwrap_or_else(|| format!("noreply@{}", host));
                Some(MailSettings {
                    host,
                    endpoints,
                    username: mail_file.username,
                    password: mail_file.password,
                    from,
                    timeout: Duration::from_secs(mail_file.timeout_secs.unwrap_or(30)),
                })
            }
            None => None,
        };

        let dispatch_file = file.dispatch.unwrap_or_default();
        let defaults = DispatchSettings::default();
        let dispatch = DispatchSettings {
            email_interval: dispatch_file
                .email_interval_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.email_interval),
            export_interval: dispatch_file
                .export_interval_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.export_interval),
            impressions_interval: dispatch_file
                .impressions_interval_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.impressions_interval),
            publish_interval: dispatch_file
                .publish_interval_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.publish_interval),
            status_timeout: dispatch_file
                .status_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.status_timeout),
        };

        Ok(Self {
            db_dir,
            export_root,
            port,
            metrics_port,
            logging_level,
            public_base_url,
            render,
            publish,
            mail,
            dispatch,
        })
    }

    pub fn queue_db_path(&self) -> PathBuf {
        self.db_dir.join("job_queue.db")
    }

    pub fn impressions_db_path(&self) -> PathBuf {
        self.db_dir.join("impressions.db")
    }
}

#[derive(Debug, Clone)]
pub struct RenderSettings {
    /// Exports are refused while no renderer is configured.
    pub executable: Option<PathBuf>,
    pub max_concurrent: usize,
    pub wait_timeout: Duration,
    pub extra_args: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct PublishSettings {
    pub provider_url: Option<String>,
    pub max_concurrent: usize,
    pub request_timeout_secs: u64,
    pub public_dir: PathBuf,
}

#[derive(Debug, Clone)]
pub struct MailSettings {
    pub host: String,
    /// Tried in order until one accepts the message.
    pub endpoints: Vec<MailEndpoint>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub from: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct DispatchSettings {
    pub email_interval: Duration,
    pub export_interval: Duration,
    pub impressions_interval: Duration,
    pub publish_interval: Duration,
    /// How long an export may sit without progress before status polls give
    /// up on it.
    pub status_timeout: Duration,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            email_interval: Duration::from_millis(5000),
            export_interval: Duration::from_millis(2000),
            impressions_interval: Duration::from_millis(10000),
            publish_interval: Duration::from_millis(3000),
            status_timeout: Duration::from_secs(1800),
        }
    }
}

/// Parses a logging level string into RequestsLoggingLevel.
fn parse_logging_level(s: &str) -> Option<RequestsLoggingLevel> {
    RequestsLoggingLevel::from_str(s, true).ok()
}
