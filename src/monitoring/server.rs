//! Operational HTTP Server
//!
//! Serves probes, Prometheus metrics and the cache dashboard:
//!
//! - `/healthz`, `/livez`: process liveness
//! - `/readyz`: shard pings plus subsystem start state, as JSON
//! - `/metrics`: Prometheus text format
//! - `/cache/dashboard`: analytics, shard and invalidation report as JSON

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use http_body_util::Full;
use hyper::body::Bytes;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde::Serialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use super::exporter::CacheMetricsExporter;
use crate::error::{Error, Result};
use crate::subsystem::CacheSubsystem;

/// Shared state for request handlers
pub struct ServerState {
    pub subsystem: Arc<CacheSubsystem>,
    pub exporter: CacheMetricsExporter,
}

fn respond(status: StatusCode, content_type: &'static str, body: impl Into<Bytes>) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body.into()));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

fn json<T: Serialize>(status: StatusCode, value: &T) -> Response<Full<Bytes>> {
    match serde_json::to_vec(value) {
        Ok(body) => respond(status, "application/json", body),
        Err(e) => respond(
            StatusCode::INTERNAL_SERVER_ERROR,
            "text/plain",
            format!("encoding failed: {}", e),
        ),
    }
}

/// Answer one request path.
pub async fn route(path: &str, state: &ServerState) -> Response<Full<Bytes>> {
    match path {
        "/healthz" | "/livez" => {
            if state.subsystem.probes().is_live() {
                respond(StatusCode::OK, "text/plain", "ok")
            } else {
                respond(StatusCode::SERVICE_UNAVAILABLE, "text/plain", "not live")
            }
        }
        "/readyz" => {
            let readiness = state.subsystem.readiness().await;
            let status = if readiness.status.is_operational() {
                StatusCode::OK
            } else {
                StatusCode::SERVICE_UNAVAILABLE
            };
            json(status, &readiness)
        }
        "/metrics" => match state.exporter.render(&state.subsystem) {
            Ok(text) => {
                let mut response = respond(StatusCode::OK, "text/plain", text);
                if let Ok(value) = HeaderValue::from_str(&state.exporter.content_type()) {
                    response.headers_mut().insert(CONTENT_TYPE, value);
                }
                response
            }
            Err(e) => {
                error!(error = %e, "Failed to render metrics");
                respond(StatusCode::INTERNAL_SERVER_ERROR, "text/plain", e.to_string())
            }
        },
        "/cache/dashboard" => json(StatusCode::OK, &state.subsystem.report()),
        _ => respond(StatusCode::NOT_FOUND, "text/plain", "not found"),
    }
}

/// Serve until `shutdown` is cancelled.
pub async fn serve(addr: &str, state: Arc<ServerState>, shutdown: CancellationToken) -> Result<()> {
    let addr: SocketAddr = addr
        .parse()
        .map_err(|e| Error::Config(format!("invalid server address {}: {}", addr, e)))?;
    let listener = TcpListener::bind(addr).await?;

    info!(%addr, "Operational server listening");

    loop {
        let (stream, peer) = tokio::select! {
            _ = shutdown.cancelled() => {
                info!("Operational server stopped");
                return Ok(());
            }
            accepted = listener.accept() => accepted?,
        };

        let io = TokioIo::new(stream);
        let state = Arc::clone(&state);
        tokio::spawn(async move {
            let service = service_fn(move |req: Request<hyper::body::Incoming>| {
                let state = Arc::clone(&state);
                async move { Ok::<_, Infallible>(route(req.uri().path(), &state).await) }
            });
            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                error!(%peer, error = %e, "Server connection error");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subsystem::CacheSubsystemConfig;
    use http_body_util::BodyExt;

    fn state() -> ServerState {
        ServerState {
            subsystem: Arc::new(
                CacheSubsystem::in_memory(2, CacheSubsystemConfig::default()).unwrap(),
            ),
            exporter: CacheMetricsExporter::new().unwrap(),
        }
    }

    async fn body(response: Response<Full<Bytes>>) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_liveness() {
        let state = state();
        let response = route("/healthz", &state).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body(response).await, "ok");
    }

    #[tokio::test]
    async fn test_readiness_follows_start() {
        let state = state();
        assert_eq!(
            route("/readyz", &state).await.status(),
            StatusCode::SERVICE_UNAVAILABLE
        );

        state.subsystem.start();
        let response = route("/readyz", &state).await;
        assert_eq!(response.status(), StatusCode::OK);
        let json: serde_json::Value = serde_json::from_str(&body(response).await).unwrap();
        assert_eq!(json["status"], "Healthy");
        assert_eq!(json["checks"].as_array().unwrap().len(), 2);

        state.subsystem.shutdown().await;
    }

    #[tokio::test]
    async fn test_metrics_and_dashboard() {
        let state = state();

        let response = route("/metrics", &state).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(body(response).await.contains("feedcache_shard_hits"));

        let response = route("/cache/dashboard", &state).await;
        assert_eq!(response.status(), StatusCode::OK);
        let json: serde_json::Value = serde_json::from_str(&body(response).await).unwrap();
        assert_eq!(json["shards"].as_array().unwrap().len(), 2);
        assert!(json["dashboard"]["analytics"]["hit_rate"].is_number());
    }

    #[tokio::test]
    async fn test_unknown_path() {
        let state = state();
        assert_eq!(route("/nope", &state).await.status(), StatusCode::NOT_FOUND);
    }
}
