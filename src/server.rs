//! HTTP surface: document upload, health check and generated docs.

use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    routing::{get, post},
};
use serde_json::{Value, json};
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};

use crate::contexts::{AnalysisResponse, Analyzer, DOCS_MOUNT};

/// Largest accepted upload.
const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Multipart field carrying the requirements document.
const UPLOAD_FIELD: &str = "file";

#[derive(Clone)]
pub struct AppState {
    analyzer: Arc<Analyzer>,
}

impl AppState {
    pub fn new(analyzer: Arc<Analyzer>) -> Self {
        Self { analyzer }
    }
}

pub fn router(analyzer: Arc<Analyzer>) -> Router {
    let docs_dir: PathBuf = analyzer.options().docs_dir.clone();
    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    Router::new()
        .route("/analyze-srs", post(analyze_srs))
        .route("/health", get(health_check))
        .with_state(AppState::new(analyzer))
        .nest_service(DOCS_MOUNT, ServeDir::new(docs_dir))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

/// Binds `addr` and serves until the process is stopped.
pub async fn serve(analyzer: Arc<Analyzer>, addr: &str) -> std::io::Result<()> {
    let app = router(analyzer);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(addr = %listener.local_addr()?, "listening");
    axum::serve(listener, app).await
}

async fn health_check() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

struct Upload {
    file_name: String,
    bytes: Vec<u8>,
}

async fn read_upload(multipart: &mut Multipart) -> Result<Upload, String> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| format!("invalid multipart body: {}", e))?
    {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }
        let file_name = field.file_name().unwrap_or("upload.txt").to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| format!("failed to read upload: {}", e))?;
        return Ok(Upload {
            file_name,
            bytes: bytes.to_vec(),
        });
    }
    Err(format!("missing multipart field '{}'", UPLOAD_FIELD))
}

fn error_response(status: StatusCode, message: String) -> (StatusCode, Json<AnalysisResponse>) {
    (
        status,
        Json(AnalysisResponse::Error {
            message,
            raw_db_schema: None,
        }),
    )
}

async fn analyze_srs(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> (StatusCode, Json<AnalysisResponse>) {
    let upload = match read_upload(&mut multipart).await {
        Ok(upload) => upload,
        Err(message) => return error_response(StatusCode::BAD_REQUEST, message),
    };
    tracing::info!(file = %upload.file_name, bytes = upload.bytes.len(), "received document");

    let analyzer = state.analyzer.clone();
    let joined = tokio::task::spawn_blocking(move || {
        analyzer.analyze_document(&upload.file_name, &upload.bytes)
    })
    .await;

    match joined {
        Ok(response) if response.is_success() => (StatusCode::OK, Json(response)),
        Ok(response) => (StatusCode::INTERNAL_SERVER_ERROR, Json(response)),
        Err(e) => {
            tracing::error!(error = %e, "analysis task failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, format!("analysis task failed: {}", e))
        }
    }
}
