//! Prometheus scrape endpoint.

use crate::metrics::gather_metrics;
use crate::TelemetryError;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use std::future::Future;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::{info, warn};

const TEXT_FORMAT: &str = "text/plain; version=0.0.4";

/// Router exposing `GET /metrics` in the Prometheus text format.
pub fn metrics_router() -> Router {
    Router::new().route("/metrics", get(render_metrics))
}

async fn render_metrics() -> Response {
    match gather_metrics() {
        Ok(text) => ([(header::CONTENT_TYPE, TEXT_FORMAT)], text).into_response(),
        Err(error) => {
            warn!(error = %error, "Failed to render metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, error.to_string()).into_response()
        }
    }
}

/// Serve `/metrics` on all interfaces at `port` until `shutdown` resolves.
pub async fn serve_metrics<F>(port: u16, shutdown: F) -> Result<(), TelemetryError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| TelemetryError::MetricsServer(format!("bind {addr}: {e}")))?;
    serve_metrics_on(listener, shutdown).await
}

/// Serve `/metrics` on an already bound listener.
pub async fn serve_metrics_on<F>(listener: TcpListener, shutdown: F) -> Result<(), TelemetryError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = listener
        .local_addr()
        .map_err(|e| TelemetryError::MetricsServer(e.to_string()))?;
    info!(%addr, "Serving Prometheus metrics");
    axum::serve(listener, metrics_router())
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| TelemetryError::MetricsServer(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{register_metrics, SUPERVISOR_REPLACEMENTS};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;
    use tokio::sync::oneshot;

    async fn scrape(addr: SocketAddr, path: &str) -> String {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        let request = format!("GET {path} HTTP/1.1\r\nHost: {addr}\r\nConnection: close\r\n\r\n");
        stream.write_all(request.as_bytes()).await.unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        response
    }

    #[tokio::test]
    async fn test_scrape_returns_relay_metrics() {
        register_metrics().unwrap();
        SUPERVISOR_REPLACEMENTS.inc();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (stop, stopped) = oneshot::channel::<()>();
        let server = tokio::spawn(serve_metrics_on(listener, async move {
            let _ = stopped.await;
        }));

        let response = scrape(addr, "/metrics").await;
        assert!(response.starts_with("HTTP/1.1 200"), "{response}");
        assert!(response.contains("text/plain; version=0.0.4"));
        assert!(response.contains("tr_supervisor_worker_replacements_total"));

        let missing = scrape(addr, "/health").await;
        assert!(missing.starts_with("HTTP/1.1 404"), "{missing}");

        stop.send(()).unwrap();
        assert!(server.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_port_in_use_is_reported() {
        let taken = TcpListener::bind("0.0.0.0:0").await.unwrap();
        let port = taken.local_addr().unwrap().port();

        let error = serve_metrics(port, std::future::pending()).await.unwrap_err();

        assert!(matches!(error, TelemetryError::MetricsServer(_)));
    }
}
