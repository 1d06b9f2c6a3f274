//! Minimal liveness responder used by external orchestration.

use axum::{routing::get, Router};

pub async fn serve(port: u16) {
    let app = Router::new().route("/", get(|| async { "running" }));
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));

    match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => {
            if let Err(e) = axum::serve(listener, app).await {
                tracing::warn!("health endpoint stopped: {e}");
            }
        }
        Err(e) => tracing::warn!("health endpoint not started (port busy?): {e}"),
    }
}
