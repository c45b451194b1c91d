// ABOUTME: Health verification of the freshly launched instance.
// ABOUTME: Settle delay, bounded HTTP polling, log capture when every attempt fails.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::Empty;
use hyper_util::rt::TokioIo;
use serde::Serialize;
use tokio::net::TcpStream;

use crate::config::{HealthSettings, RunConfig};
use crate::runtime::LogOps;

use super::error::DeployError;
use super::lifecycle::ContainerHandle;

/// Progress of health verification. Healthy and UnhealthyExhausted are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Unknown,
    Polling,
    Healthy,
    UnhealthyExhausted,
}

impl HealthStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, HealthStatus::Healthy | HealthStatus::UnhealthyExhausted)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub attempts: u32,
    #[serde(with = "humantime_serde")]
    pub elapsed: Duration,
    pub last_error: Option<String>,
    /// Tail of the instance's logs, captured on exhaustion.
    pub logs: Vec<String>,
}

impl HealthReport {
    pub fn into_result(self) -> Result<HealthReport, DeployError> {
        match self.status {
            HealthStatus::Healthy => Ok(self),
            _ => Err(DeployError::HealthCheckFailed {
                attempts: self.attempts,
                logs: self.logs,
            }),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum HealthProbeError {
    #[error("connection failed: {0}")]
    Connect(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] hyper::Error),

    #[error("invalid request: {0}")]
    Request(#[from] hyper::http::Error),
}

/// One health request against the running service.
#[async_trait]
pub trait HealthProbe: Send + Sync {
    /// HTTP status code of a single attempt.
    async fn probe(&self) -> Result<u16, HealthProbeError>;
}

/// Plain HTTP/1.1 GET over TCP.
#[derive(Debug, Clone)]
pub struct HttpProbe {
    addr: String,
    path: String,
}

impl HttpProbe {
    pub fn new(host: &str, port: u16, path: &str) -> Self {
        Self {
            addr: format!("{}:{}", host, port),
            path: path.to_string(),
        }
    }

    /// Probe the published host port on loopback.
    pub fn for_config(config: &RunConfig) -> Self {
        Self::new("127.0.0.1", config.port.host, &config.health.path)
    }
}

#[async_trait]
impl HealthProbe for HttpProbe {
    async fn probe(&self) -> Result<u16, HealthProbeError> {
        let stream = TcpStream::connect(&self.addr).await?;
        let io = TokioIo::new(stream);

        let (mut sender, conn) = hyper::client::conn::http1::handshake(io).await?;
        tokio::spawn(async move {
            if let Err(e) = conn.await {
                tracing::debug!("health probe connection error: {}", e);
            }
        });

        let req = hyper::Request::builder()
            .method("GET")
            .uri(&self.path)
            .header("Host", &self.addr)
            .body(Empty::<Bytes>::new())?;

        let resp = sender.send_request(req).await?;
        Ok(resp.status().as_u16())
    }
}

/// Wait `settle_delay`, then poll up to `max_attempts` times.
///
/// Stops at the first 2xx. On exhaustion the last `log_tail` log lines of
/// the instance are captured; the container itself is left running.
pub async fn await_healthy<R: LogOps>(
    runtime: &R,
    handle: &ContainerHandle,
    probe: &dyn HealthProbe,
    settings: &HealthSettings,
) -> HealthReport {
    let started = Instant::now();
    let mut last_error = None;

    tracing::info!(
        container = %handle.name,
        settle = ?settings.settle_delay,
        max_attempts = settings.max_attempts,
        "verifying health"
    );
    tokio::time::sleep(settings.settle_delay).await;

    for attempt in 1..=settings.max_attempts {
        match tokio::time::timeout(settings.probe_timeout, probe.probe()).await {
            Ok(Ok(code)) if (200..300).contains(&code) => {
                tracing::info!(attempt, code, "health check passed");
                return HealthReport {
                    status: HealthStatus::Healthy,
                    attempts: attempt,
                    elapsed: started.elapsed(),
                    last_error,
                    logs: Vec::new(),
                };
            }
            Ok(Ok(code)) => last_error = Some(format!("HTTP {}", code)),
            Ok(Err(e)) => last_error = Some(e.to_string()),
            Err(_) => {
                last_error = Some(format!(
                    "no response within {:?}",
                    settings.probe_timeout
                ))
            }
        }
        tracing::debug!(attempt, error = ?last_error, "health check attempt failed");

        if attempt < settings.max_attempts {
            tokio::time::sleep(settings.interval).await;
        }
    }

    let logs = runtime
        .tail_logs(&handle.id, settings.log_tail)
        .await
        .unwrap_or_else(|e| vec![format!("logs unavailable: {}", e)]);

    HealthReport {
        status: HealthStatus::UnhealthyExhausted,
        attempts: settings.max_attempts,
        elapsed: started.elapsed(),
        last_error,
        logs,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    async fn serve_once(status_line: &'static str) -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let _ = socket.read(&mut buf).await;
            let response = format!("{}\r\nContent-Length: 2\r\n\r\nok", status_line);
            socket.write_all(response.as_bytes()).await.unwrap();
        });
        port
    }

    #[tokio::test]
    async fn http_probe_reports_status() {
        let port = serve_once("HTTP/1.1 200 OK").await;
        let probe = HttpProbe::new("127.0.0.1", port, "/_stcore/health");
        assert_eq!(probe.probe().await.unwrap(), 200);

        let port = serve_once("HTTP/1.1 503 Service Unavailable").await;
        let probe = HttpProbe::new("127.0.0.1", port, "/_stcore/health");
        assert_eq!(probe.probe().await.unwrap(), 503);
    }

    #[tokio::test]
    async fn http_probe_connection_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let probe = HttpProbe::new("127.0.0.1", port, "/");
        assert!(matches!(
            probe.probe().await,
            Err(HealthProbeError::Connect(_))
        ));
    }

    #[test]
    fn terminal_states() {
        assert!(HealthStatus::Healthy.is_terminal());
        assert!(HealthStatus::UnhealthyExhausted.is_terminal());
        assert!(!HealthStatus::Polling.is_terminal());
        assert!(!HealthStatus::Unknown.is_terminal());
    }
}
