//! REST control plane
//!
//! A small HTTP surface on a configurable TCP port:
//!
//! - `GET /status` — controller state, positions, PnL, deviation,
//!   thresholds, orders (JSON);
//! - `GET /metrics` — Prometheus text format;
//! - `GET /health` — liveness probe;
//! - `POST /strategy/activate` | `/strategy/deactivate` |
//!   `/strategy/squareoff` | `/strategy/reload-thresholds` —
//!   fire-and-forget commands; 200 on accepted, 503 when the command
//!   queue is full.

use crate::control::metrics::Metrics;
use crate::control::status::StatusSnapshot;
use crate::control::{Command, CommandQueue};
use anyhow::{Context, Result};
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use parking_lot::RwLock;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

/// Listener configuration
#[derive(Debug, Clone)]
pub struct ControlServerConfig {
    pub listen_addr: SocketAddr,
}

impl Default for ControlServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:8710".parse().unwrap(),
        }
    }
}

/// The control-plane HTTP server
pub struct ControlServer {
    config: ControlServerConfig,
    status: Arc<RwLock<StatusSnapshot>>,
    commands: CommandQueue,
    metrics: Arc<Metrics>,
}

impl ControlServer {
    pub fn new(
        config: ControlServerConfig,
        status: Arc<RwLock<StatusSnapshot>>,
        commands: CommandQueue,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            config,
            status,
            commands,
            metrics,
        }
    }

    /// Serve until the process exits. Spawn on a dedicated runtime.
    pub async fn serve(self) -> Result<()> {
        let listener = TcpListener::bind(&self.config.listen_addr)
            .await
            .context("bind control server")?;
        info!("control plane listening on http://{}", self.config.listen_addr);

        loop {
            let (stream, remote_addr) = match listener.accept().await {
                Ok(conn) => conn,
                Err(e) => {
                    error!("control accept failed: {}", e);
                    continue;
                }
            };

            let status = self.status.clone();
            let commands = self.commands.clone();
            let metrics = self.metrics.clone();

            tokio::spawn(async move {
                let io = TokioIo::new(stream);
                let service = service_fn(move |req: Request<hyper::body::Incoming>| {
                    let status = status.clone();
                    let commands = commands.clone();
                    let metrics = metrics.clone();
                    async move { handle_request(req, status, commands, metrics).await }
                });

                if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                    debug!("control connection error from {}: {}", remote_addr, err);
                }
            });
        }
    }

    /// Run the server on its own single-threaded runtime. The returned
    /// thread lives for the rest of the process.
    pub fn spawn(self) -> std::thread::JoinHandle<()> {
        std::thread::Builder::new()
            .name("control-server".to_string())
            .spawn(move || {
                let rt = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(rt) => rt,
                    Err(e) => {
                        error!("control runtime failed to start: {}", e);
                        return;
                    }
                };
                if let Err(e) = rt.block_on(self.serve()) {
                    error!("control server exited: {}", e);
                }
            })
            .expect("spawn control-server thread")
    }
}

fn text_response(code: StatusCode, body: impl Into<Bytes>) -> Response<Full<Bytes>> {
    Response::builder()
        .status(code)
        .body(Full::new(body.into()))
        .unwrap()
}

/// Map a POST path onto its command.
fn command_for_path(path: &str) -> Option<Command> {
    match path {
        "/strategy/activate" => Some(Command::Activate),
        "/strategy/deactivate" => Some(Command::Deactivate),
        "/strategy/squareoff" => Some(Command::Squareoff),
        "/strategy/reload-thresholds" => Some(Command::ReloadThresholds),
        _ => None,
    }
}

async fn handle_request(
    req: Request<hyper::body::Incoming>,
    status: Arc<RwLock<StatusSnapshot>>,
    commands: CommandQueue,
    metrics: Arc<Metrics>,
) -> Result<Response<Full<Bytes>>, hyper::Error> {
    let path = req.uri().path().to_string();

    match (req.method(), path.as_str()) {
        (&Method::GET, "/status") => {
            let snapshot = status.read().clone();
            match serde_json::to_vec(&snapshot) {
                Ok(body) => Ok(Response::builder()
                    .status(StatusCode::OK)
                    .header("Content-Type", "application/json")
                    .body(Full::new(Bytes::from(body)))
                    .unwrap()),
                Err(e) => {
                    error!("status serialisation failed: {}", e);
                    Ok(text_response(StatusCode::INTERNAL_SERVER_ERROR, "serialisation error"))
                }
            }
        }

        (&Method::GET, "/metrics") => match metrics.encode() {
            Ok(text) => Ok(Response::builder()
                .status(StatusCode::OK)
                .header("Content-Type", "text/plain; version=0.0.4")
                .body(Full::new(Bytes::from(text)))
                .unwrap()),
            Err(e) => {
                error!("metrics encoding failed: {}", e);
                Ok(text_response(StatusCode::INTERNAL_SERVER_ERROR, "encode error"))
            }
        },

        (&Method::GET, "/health") | (&Method::GET, "/healthz") => {
            Ok(text_response(StatusCode::OK, "OK"))
        }

        (&Method::POST, p) => match command_for_path(p) {
            Some(cmd) => match commands.push(cmd) {
                Ok(()) => {
                    info!(?cmd, "command accepted");
                    Ok(text_response(StatusCode::OK, "accepted"))
                }
                Err(_) => {
                    warn!(?cmd, "command queue full");
                    Ok(text_response(StatusCode::SERVICE_UNAVAILABLE, "command queue full"))
                }
            },
            None => Ok(text_response(StatusCode::NOT_FOUND, "Not Found")),
        },

        _ => Ok(text_response(StatusCode::NOT_FOUND, "Not Found")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_listen_addr() {
        let cfg = ControlServerConfig::default();
        assert_eq!(cfg.listen_addr.port(), 8710);
    }

    #[test]
    fn test_command_paths() {
        assert_eq!(command_for_path("/strategy/activate"), Some(Command::Activate));
        assert_eq!(command_for_path("/strategy/deactivate"), Some(Command::Deactivate));
        assert_eq!(command_for_path("/strategy/squareoff"), Some(Command::Squareoff));
        assert_eq!(
            command_for_path("/strategy/reload-thresholds"),
            Some(Command::ReloadThresholds)
        );
        assert_eq!(command_for_path("/strategy/unknown"), None);
    }

    #[test]
    fn test_full_queue_maps_to_503_semantics() {
        let q = CommandQueue::new(1);
        q.push(Command::Activate).unwrap();
        // The handler turns this Err into SERVICE_UNAVAILABLE.
        assert!(q.push(Command::Squareoff).is_err());
    }
}
