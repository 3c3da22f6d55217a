use crate::mail::MailEndpoint;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    // Core settings (can override CLI)
    pub db_dir: Option<String>,
    pub export_root: Option<String>,
    pub port: Option<u16>,
    pub metrics_port: Option<u16>,
    pub logging_level: Option<String>,
    pub public_base_url: Option<String>,

    // Feature configs
    pub render: Option<RenderConfig>,
    pub publish: Option<PublishConfig>,
    pub mail: Option<MailConfig>,
    pub dispatch: Option<DispatchConfig>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct RenderConfig {
    pub executable: Option<String>,
    pub max_concurrent: Option<usize>,
    pub wait_timeout_secs: Option<u64>,
    pub extra_args: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct PublishConfig {
    pub provider_url: Option<String>,
    pub max_concurrent: Option<usize>,
    pub request_timeout_secs: Option<u64>,
    pub public_dir: Option<String>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct MailConfig {
    pub host: Option<String>,
    pub endpoints: Option<Vec<MailEndpoint>>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub from: Option<String>,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct DispatchConfig {
    pub email_interval_ms: Option<u64>,
    pub export_interval_ms: Option<u64>,
    pub impressions_interval_ms: Option<u64>,
    pub publish_interval_ms: Option<u64>,
    pub status_timeout_secs: Option<u64>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }
}
