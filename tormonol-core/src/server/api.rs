//! Route table

use axum::extract::Request;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tracing::Instrument;

use super::handlers;
use super::state::AppState;

/// W3C trace context header, recorded on the request span when present
pub const TRACEPARENT: &str = "traceparent";

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/challenge", post(handlers::challenge))
        .route("/ticket", post(handlers::ticket))
        .route("/salt", post(handlers::salt))
        .route("/sessions/:id", get(handlers::admit))
        .layer(middleware::from_fn(trace_request))
        .with_state(state)
}

async fn trace_request(request: Request, next: Next) -> Response {
    let traceparent = request
        .headers()
        .get(TRACEPARENT)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string();
    let span = tracing::info_span!(
        "request",
        method = %request.method(),
        path = %request.uri().path(),
        traceparent = %traceparent,
    );
    next.run(request).instrument(span).await
}
