use crate::domain::{IngestPointInput, PointIngestionService};
use crate::http::ApiError;
use axum::extract::{Path, State};
use axum::Json;
use bytes::Bytes;
use common::domain::Submission;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;

#[derive(Clone)]
pub struct AppState {
    pub ingestion_service: Arc<PointIngestionService>,
}

/// `POST /vendor/:vendor_id/point`: validate, queue, and echo the submission.
///
/// The body is taken as raw bytes so that content type never decides whether
/// a payload is GeoJSON; the validator does.
pub async fn ingest_point(
    State(state): State<AppState>,
    Path(vendor_id): Path<String>,
    body: Bytes,
) -> Result<Json<Submission>, ApiError> {
    info!(vendor_id = %vendor_id, body_bytes = body.len(), "received point submission");

    let receipt = state
        .ingestion_service
        .ingest(IngestPointInput { vendor_id, body })
        .await?;

    Ok(Json(receipt.submission))
}

pub async fn healthz() -> Json<Value> {
    Json(json!({"status": "ok"}))
}
