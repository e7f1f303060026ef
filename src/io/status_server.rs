//! Read-only status HTTP server
//!
//! Routes:
//! - `GET /` HTML dashboard
//! - `GET /status` JSON snapshot
//! - `GET /metrics` Prometheus text
//! - `GET /health` liveness
//!
//! Requests are answered from the latest published snapshot; the control
//! loop is never consulted. Each connection is bounded by a timeout so a
//! stalled client only ties up its own task.

use crate::domain::status::StatusSnapshot;
use crate::infra::config::Config;
use crate::infra::metrics::Metrics;
use crate::io::dashboard::render_dashboard;
use crate::io::prometheus::format_prometheus_metrics;
use anyhow::Context;
use bytes::Bytes;
use http_body_util::Full;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Everything a request handler may read
pub struct StatusContext {
    pub snapshot_rx: watch::Receiver<Arc<StatusSnapshot>>,
    pub metrics: Arc<Metrics>,
    pub site: String,
}

fn response(
    status: StatusCode,
    content_type: &'static str,
    body: impl Into<Bytes>,
) -> Response<Full<Bytes>> {
    let mut resp = Response::new(Full::new(body.into()));
    *resp.status_mut() = status;
    resp.headers_mut().insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    resp
}

/// Handle HTTP requests
async fn handle_request(
    req: Request<hyper::body::Incoming>,
    ctx: Arc<StatusContext>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    if req.method() != Method::GET {
        return Ok(response(StatusCode::METHOD_NOT_ALLOWED, "text/plain", "Method Not Allowed"));
    }

    // One Arc clone: the whole request sees a single tick's state
    let snapshot = ctx.snapshot_rx.borrow().clone();

    let resp = match req.uri().path() {
        "/" => response(
            StatusCode::OK,
            "text/html; charset=utf-8",
            render_dashboard(&snapshot, &ctx.site),
        ),
        "/status" => match serde_json::to_vec(&*snapshot) {
            Ok(body) => response(StatusCode::OK, "application/json", body),
            Err(e) => {
                error!(error = %e, "status_serialize_failed");
                response(StatusCode::INTERNAL_SERVER_ERROR, "text/plain", "serialization error")
            }
        },
        "/metrics" => response(
            StatusCode::OK,
            "text/plain; version=0.0.4; charset=utf-8",
            format_prometheus_metrics(&ctx.metrics.summary(), &ctx.site),
        ),
        "/health" => response(StatusCode::OK, "text/plain", "ok"),
        _ => response(StatusCode::NOT_FOUND, "text/plain", "Not Found"),
    };
    Ok(resp)
}

pub struct StatusServer {
    listener: TcpListener,
    ctx: Arc<StatusContext>,
    request_timeout: Duration,
}

impl StatusServer {
    /// Bind the listening socket
    pub async fn bind(
        addr: SocketAddr,
        ctx: StatusContext,
        request_timeout: Duration,
    ) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind status server on {addr}"))?;
        Ok(Self { listener, ctx: Arc::new(ctx), request_timeout })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections until shutdown
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(
            addr = ?self.listener.local_addr().ok(),
            site = %self.ctx.site,
            "status_server_started"
        );

        loop {
            tokio::select! {
                result = self.listener.accept() => {
                    match result {
                        Ok((stream, peer)) => {
                            let io = TokioIo::new(stream);
                            let ctx = self.ctx.clone();
                            let request_timeout = self.request_timeout;

                            tokio::spawn(async move {
                                let service = service_fn(move |req| {
                                    let ctx = ctx.clone();
                                    async move { handle_request(req, ctx).await }
                                });

                                let conn = http1::Builder::new()
                                    .keep_alive(false)
                                    .serve_connection(io, service);
                                match tokio::time::timeout(request_timeout, conn).await {
                                    Ok(Ok(())) => {}
                                    Ok(Err(e)) => {
                                        debug!(peer = %peer, error = %e, "status_http_error");
                                    }
                                    Err(_) => warn!(peer = %peer, "status_request_timeout"),
                                }
                            });
                        }
                        Err(e) => {
                            error!(error = %e, "status_accept_error");
                        }
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("status_server_shutdown");
                        return;
                    }
                }
            }
        }
    }
}

/// Bind and spawn the server when enabled. A bind failure is logged and the
/// bay keeps running without a status page.
///
/// Returns the bound address when the server is running.
pub async fn start_status_server(
    config: &Config,
    ip: IpAddr,
    ctx: StatusContext,
    shutdown: watch::Receiver<bool>,
) -> Option<SocketAddr> {
    if !config.status_enabled() {
        info!("status_server_disabled");
        return None;
    }

    let addr = SocketAddr::new(ip, config.status_port());
    let request_timeout = Duration::from_millis(config.status_request_timeout_ms());
    match StatusServer::bind(addr, ctx, request_timeout).await {
        Ok(server) => {
            let bound = server.local_addr().ok();
            tokio::spawn(server.run(shutdown));
            bound
        }
        Err(e) => {
            error!(error = %format!("{e:#}"), "status_server_bind_failed");
            None
        }
    }
}
