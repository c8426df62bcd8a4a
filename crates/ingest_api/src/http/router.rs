use crate::http::{healthz, ingest_point, AppState};
use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

pub fn ingest_router(state: AppState) -> Router {
    Router::new()
        .route("/vendor/:vendor_id/point", post(ingest_point))
        .route("/healthz", get(healthz))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
