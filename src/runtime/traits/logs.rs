// ABOUTME: Log operations trait for the container engine.
// ABOUTME: Stream or tail container output.

use super::sealed::Sealed;
use crate::types::ContainerId;
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use std::pin::Pin;

pub type LogLineStream = Pin<Box<dyn Stream<Item = Result<LogLine, LogError>> + Send>>;

/// Log streaming operations.
#[async_trait]
pub trait LogOps: Sealed + Send + Sync {
    /// Stream logs from a container.
    async fn container_logs(
        &self,
        id: &ContainerId,
        opts: &LogOptions,
    ) -> Result<LogLineStream, LogError>;

    /// Collect the last `lines` lines of combined output.
    async fn tail_logs(&self, id: &ContainerId, lines: u64) -> Result<Vec<String>, LogError> {
        let mut stream = self.container_logs(id, &LogOptions::tail(lines)).await?;
        let mut out = Vec::new();
        while let Some(line) = stream.next().await {
            let line = line?;
            out.extend(line.content.lines().map(str::to_string));
        }
        Ok(out)
    }
}

/// Options for log streaming.
#[derive(Debug, Clone, Default)]
pub struct LogOptions {
    pub stdout: bool,
    pub stderr: bool,
    /// Follow log output (like `tail -f`).
    pub follow: bool,
    pub timestamps: bool,
    /// Number of lines to show from end (`None` = all).
    pub tail: Option<u64>,
}

impl LogOptions {
    pub fn follow(tail: Option<u64>) -> Self {
        Self {
            stdout: true,
            stderr: true,
            follow: true,
            timestamps: false,
            tail,
        }
    }

    pub fn tail(n: u64) -> Self {
        Self {
            stdout: true,
            stderr: true,
            follow: false,
            timestamps: false,
            tail: Some(n),
        }
    }
}

/// A chunk of container output.
#[derive(Debug, Clone)]
pub struct LogLine {
    pub content: String,
    pub stream: LogStream,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogStream {
    Stdout,
    Stderr,
}

/// Errors from log operations.
#[derive(Debug, thiserror::Error)]
pub enum LogError {
    #[error("container not found: {0}")]
    ContainerNotFound(String),

    #[error("stream error: {0}")]
    StreamError(String),

    #[error("runtime error: {0}")]
    Runtime(String),
}
