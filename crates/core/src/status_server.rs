//! Read-only HTTP status endpoint (§6): the ambient observability surface,
//! distinct from the out-of-scope session-authenticated admin façade.
//!
//! Grounded on the teacher's `metrics_server.rs` — single-route axum
//! Router built with `.with_state`, `tower::ServiceExt::oneshot` router
//! tests without a real network bind.

use axum::{extract::State, routing::get, Json, Router};
use std::net::SocketAddr;
use thiserror::Error;

use crate::status::StatusFacade;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind to address: {0}")]
    BindError(#[from] std::io::Error),
}

async fn get_status(State(facade): State<StatusFacade>) -> Result<Json<crate::status::StatusSnapshot>, axum::http::StatusCode> {
    facade
        .snapshot()
        .map(Json)
        .map_err(|_| axum::http::StatusCode::INTERNAL_SERVER_ERROR)
}

pub fn create_status_router(facade: StatusFacade) -> Router {
    Router::new().route("/status", get(get_status)).with_state(facade)
}

/// Runs the status HTTP server on `127.0.0.1:<port>`.
pub async fn run_status_server(facade: StatusFacade, port: u16) -> Result<(), ServerError> {
    let app = create_status_router(facade);
    let addr = SocketAddr::from(([127, 0, 0, 1], port));

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Store;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    #[tokio::test]
    async fn get_status_returns_json_snapshot() {
        let store = Store::open_in_memory().unwrap();
        let facade = StatusFacade::new(store);
        let app = create_status_router(facade);

        let response = app
            .oneshot(Request::builder().uri("/status").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let content_type = response.headers().get("content-type").unwrap();
        assert!(content_type.to_str().unwrap().contains("application/json"));

        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let snapshot: crate::status::StatusSnapshot = serde_json::from_slice(&body).unwrap();
        assert_eq!(snapshot.sources.len(), 0);
        assert_eq!(snapshot.recent_jobs.len(), 0);
    }
}
