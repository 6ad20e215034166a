use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

use crate::asset::{sanitize_file_name, Asset, ContainerFormat, MediaKind};
use crate::engine::Engine;
use crate::provenance::ProvenanceRecord;
use crate::report::VerificationReport;

// ==========================================
// 1. Shared state
// ==========================================
pub struct AppState {
    pub engine: Arc<Engine>,
}

// ==========================================
// 2. DTOs
// ==========================================

/// Query string of the upload endpoints; the body is the raw asset.
#[derive(Debug, Deserialize)]
pub struct UploadParams {
    /// `image`, `video` or a MIME type. Sniffed from the bytes when absent.
    pub kind: Option<String>,
    pub name: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatermarkReceipt {
    pub output_name: String,
    pub digest: String,
    pub newly_issued: bool,
    pub record: ProvenanceRecord,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditResponse {
    pub proof_valid: bool,
    pub leaf_pos: u64,
    pub root_hash: String,
    pub proof_hex: Vec<String>,
}

type ApiError = (StatusCode, String);

// ==========================================
// 3. Router
// ==========================================
pub fn app(state: Arc<AppState>) -> Router {
    let body_limit = state.engine.max_asset_bytes();
    Router::new()
        .route("/health", get(health))
        .route("/verify", post(verify_media))
        .route("/watermark", post(watermark_media))
        .route("/records/{digest}", get(get_record))
        .route("/audit/{digest}", get(get_audit_proof))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ==========================================
// 4. Handlers
// ==========================================

fn upload(params: UploadParams, body: Bytes) -> Result<Asset, ApiError> {
    if body.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "No file uploaded".to_string()));
    }
    let kind = match params.kind.as_deref() {
        Some(raw) => raw
            .parse::<MediaKind>()
            .map_err(|e| (StatusCode::BAD_REQUEST, e))?,
        None => ContainerFormat::sniff(&body)
            .map(|format| format.media_kind())
            .ok_or_else(|| (StatusCode::BAD_REQUEST, "Cannot infer media kind; pass ?kind=".to_string()))?,
    };
    let asset = Asset::new(body.to_vec(), kind);
    Ok(match params.name {
        Some(raw) => {
            let name = sanitize_file_name(&raw)
                .ok_or_else(|| (StatusCode::BAD_REQUEST, format!("Invalid file name `{}`", raw)))?;
            asset.with_name(name)
        }
        None => asset,
    })
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "OK",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

async fn verify_media(
    State(state): State<Arc<AppState>>,
    Query(params): Query<UploadParams>,
    body: Bytes,
) -> Result<Json<VerificationReport>, ApiError> {
    let asset = upload(params, body)?;
    info!(digest = %asset.digest(), kind = %asset.kind(), size = asset.size(), "verify request");
    Ok(Json(state.engine.verify_asset(asset).await))
}

async fn watermark_media(
    State(state): State<Arc<AppState>>,
    Query(params): Query<UploadParams>,
    body: Bytes,
) -> Result<Json<WatermarkReceipt>, ApiError> {
    let asset = upload(params, body)?;
    let watermarked = state.engine.embed_asset(&asset).await.map_err(|e| {
        warn!(digest = %asset.digest(), error = %e, "watermark failed");
        (StatusCode::INTERNAL_SERVER_ERROR, format!("Watermark failed: {}", e))
    })?;

    Ok(Json(WatermarkReceipt {
        output_name: watermarked.asset.file_name(),
        digest: watermarked.record.digest.clone(),
        newly_issued: watermarked.newly_issued,
        record: watermarked.record,
    }))
}

async fn get_record(
    State(state): State<Arc<AppState>>,
    Path(digest): Path<String>,
) -> Result<Json<ProvenanceRecord>, ApiError> {
    state
        .engine
        .provenance()
        .records()
        .get(&digest)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?
        .map(Json)
        .ok_or_else(|| (StatusCode::NOT_FOUND, format!("No provenance record for {}", digest)))
}

/// Inclusion proof of a digest in the provenance ledger.
async fn get_audit_proof(
    State(state): State<Arc<AppState>>,
    Path(digest): Path<String>,
) -> Result<Json<AuditResponse>, ApiError> {
    let ledger = state.engine.ledger();
    let ledger = ledger.lock().await;

    let proof = ledger
        .prove(&digest)
        .map_err(|e| (StatusCode::BAD_REQUEST, format!("Proof generation failed: {}", e)))?
        .ok_or_else(|| (StatusCode::NOT_FOUND, format!("Digest {} is not anchored", digest)))?;

    Ok(Json(AuditResponse {
        proof_valid: proof.verify(),
        leaf_pos: proof.position,
        root_hash: hex::encode(proof.root),
        proof_hex: proof.items_hex(),
    }))
}
