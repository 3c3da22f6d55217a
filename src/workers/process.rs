//! Launching external renderer processes.

use futures::future::BoxFuture;
use futures::FutureExt;
use std::path::PathBuf;
use std::process::Stdio;
use thiserror::Error;
use tokio::process::Command;
use tracing::warn;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Failed to launch {executable}: {source}")]
    Launch {
        executable: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Render pool is closed")]
    PoolClosed,
}

/// A command line for one renderer run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderRequest {
    pub executable: PathBuf,
    pub args: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessExit {
    pub success: bool,
    pub code: Option<i32>,
}

impl ProcessExit {
    pub fn failed() -> Self {
        Self {
            success: false,
            code: None,
        }
    }
}

/// Resolves once the launched process has exited.
pub type ExitFuture = BoxFuture<'static, ProcessExit>;

pub trait ProcessLauncher: Send + Sync {
    /// Start the process without waiting for it.
    fn launch(&self, request: &RenderRequest) -> Result<ExitFuture, RenderError>;
}

/// Spawns real child processes. Children are not killed when their exit
/// future is dropped, so a render keeps going detached.
pub struct TokioProcessLauncher;

impl ProcessLauncher for TokioProcessLauncher {
    fn launch(&self, request: &RenderRequest) -> Result<ExitFuture, RenderError> {
        let mut child = Command::new(&request.executable)
            .args(&request.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit())
            .kill_on_drop(false)
            .spawn()
            .map_err(|source| RenderError::Launch {
                executable: request.executable.display().to_string(),
                source,
            })?;

        Ok(async move {
            match child.wait().await {
                Ok(status) => ProcessExit {
                    success: status.success(),
                    code: status.code(),
                },
                Err(err) => {
                    warn!("Failed to wait for renderer process: {}", err);
                    ProcessExit::failed()
                }
            }
        }
        .boxed())
    }
}
