use crate::queue::JobParams;
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PublishError {
    #[error("Unknown publish destination: {0}")]
    UnknownDestination(String),

    #[error("No publisher configured for {0}")]
    NotConfigured(PublishDestination),
}

/// Where a finished export can be published to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PublishDestination {
    /// Upload to the external video provider.
    Provider,
    /// Copy into a publicly served directory.
    Directory,
}

impl PublishDestination {
    pub fn as_str(&self) -> &'static str {
        match self {
            PublishDestination::Provider => "provider",
            PublishDestination::Directory => "directory",
        }
    }
}

impl fmt::Display for PublishDestination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PublishDestination {
    type Err = PublishError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "provider" => Ok(PublishDestination::Provider),
            "directory" => Ok(PublishDestination::Directory),
            _ => Err(PublishError::UnknownDestination(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishResult {
    /// Public location of the published file. `None` means the destination
    /// refused the file.
    pub url: Option<String>,
}

/// Sidecar payload written once a publish operation has finished.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishOutcome {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
    #[serde(default)]
    pub url: Option<String>,
}

impl PublishOutcome {
    pub fn is_success(&self) -> bool {
        self.success.unwrap_or(self.url.is_some())
    }
}

impl From<PublishResult> for PublishOutcome {
    fn from(result: PublishResult) -> Self {
        Self {
            success: Some(result.url.is_some()),
            url: result.url,
        }
    }
}

#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, file: &Path, params: &JobParams) -> Result<PublishResult>;
}

/// Maps each destination to the publisher that serves it.
#[derive(Default, Clone)]
pub struct PublisherRegistry {
    publishers: HashMap<PublishDestination, Arc<dyn Publisher>>,
}

impl PublisherRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, destination: PublishDestination, publisher: Arc<dyn Publisher>) {
        self.publishers.insert(destination, publisher);
    }

    pub fn with(mut self, destination: PublishDestination, publisher: Arc<dyn Publisher>) -> Self {
        self.register(destination, publisher);
        self
    }

    /// Parse a destination tag and make sure something can serve it.
    pub fn resolve(&self, tag: &str) -> Result<PublishDestination, PublishError> {
        let destination = tag.parse::<PublishDestination>()?;
        if self.publishers.contains_key(&destination) {
            Ok(destination)
        } else {
            Err(PublishError::NotConfigured(destination))
        }
    }

    pub fn get(&self, destination: PublishDestination) -> Result<Arc<dyn Publisher>, PublishError> {
        self.publishers
            .get(&destination)
            .cloned()
            .ok_or(PublishError::NotConfigured(destination))
    }

    pub fn destinations(&self) -> Vec<PublishDestination> {
        self.publishers.keys().copied().collect()
    }
}
