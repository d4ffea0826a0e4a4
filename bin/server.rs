// ATI Ingest - Web Server
// REST API with Axum: CSV upload endpoints for ATI requests and public bodies

use anyhow::{anyhow, Context};
use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use ati_ingest::{
    ingestion_event, insert_event, source_checksum, AppConfig, IngestError, IngestOptions,
    IngestSource, IngestionReport, Ingestor, RecordKind, SqliteStore,
};
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

const ACTOR: &str = "ati-ingest-api";
const FILENAME_HEADER: &str = "x-filename";

#[derive(Debug, Parser)]
#[command(name = "ati-server", version, about = "HTTP upload endpoints for ATI CSV ingestion")]
struct Args {
    /// TOML configuration file
    #[arg(long, env = "ATI_CONFIG", value_name = "PATH")]
    config: Option<PathBuf>,

    /// SQLite database file (overrides the configured path)
    #[arg(long, env = "ATI_DATABASE", value_name = "PATH")]
    database: Option<PathBuf>,

    /// Listen address (overrides the configured one)
    #[arg(long, env = "ATI_BIND", value_name = "ADDR")]
    bind: Option<String>,
}

/// Shared application state
#[derive(Clone)]
struct AppState {
    store: Arc<Mutex<SqliteStore>>,
    defaults: IngestOptions,
}

/// API Response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    let body = ApiResponse::<()> {
        success: false,
        data: None,
        error: Some(message.into()),
    };
    (status, Json(body)).into_response()
}

/// Query string overrides for one upload
#[derive(Debug, Default, Deserialize)]
struct IngestQuery {
    strict_mode: Option<bool>,
    update_existing: Option<bool>,
    batch_size: Option<usize>,
    delimiter: Option<char>,
    encoding: Option<String>,
}

impl IngestQuery {
    fn options(self, defaults: &IngestOptions) -> IngestOptions {
        IngestOptions {
            strict_mode: self.strict_mode.unwrap_or(defaults.strict_mode),
            update_existing: self.update_existing.unwrap_or(defaults.update_existing),
            batch_size: self.batch_size.unwrap_or(defaults.batch_size),
            delimiter: self.delimiter.or(defaults.delimiter),
            encoding: self.encoding.or_else(|| defaults.encoding.clone()),
        }
    }
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok("OK"))
}

/// POST /api/ingest/ati-requests - Upload a CSV of ATI requests
async fn ingest_ati_requests(
    State(state): State<AppState>,
    Query(query): Query<IngestQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    run_upload(state, RecordKind::AtiRequest, query, &headers, body).await
}

/// POST /api/ingest/public-bodies - Upload a CSV of public bodies
async fn ingest_public_bodies(
    State(state): State<AppState>,
    Query(query): Query<IngestQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    run_upload(state, RecordKind::PublicBody, query, &headers, body).await
}

async fn run_upload(
    state: AppState,
    kind: RecordKind,
    query: IngestQuery,
    headers: &HeaderMap,
    body: Bytes,
) -> Response {
    let filename = match upload_filename(headers) {
        Some(name) => name,
        None => return error_response(StatusCode::BAD_REQUEST, "Missing X-Filename header"),
    };

    if !filename.to_ascii_lowercase().ends_with(".csv") {
        return error_response(StatusCode::BAD_REQUEST, "Only CSV files are accepted");
    }

    let options = query.options(&state.defaults);
    let data = body.to_vec();

    let outcome = tokio::task::spawn_blocking(move || ingest_upload(&state, kind, options, data, &filename)).await;

    match outcome {
        Ok(Ok(report)) => (StatusCode::OK, Json(ApiResponse::ok(report))).into_response(),
        Ok(Err(UploadError::Rejected(message))) => error_response(StatusCode::BAD_REQUEST, message),
        Ok(Err(UploadError::Internal(e))) => {
            tracing::error!(error = %format!("{:#}", e), "Upload failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Ingestion failed")
        }
        Err(e) => {
            tracing::error!(error = %e, "Ingestion task panicked");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Ingestion failed")
        }
    }
}

enum UploadError {
    Rejected(String),
    Internal(anyhow::Error),
}

fn ingest_upload(
    state: &AppState,
    kind: RecordKind,
    options: IngestOptions,
    data: Vec<u8>,
    filename: &str,
) -> Result<IngestionReport, UploadError> {
    let store = state
        .store
        .lock()
        .map_err(|_| UploadError::Internal(anyhow!("database lock poisoned")))?;

    let checksum = source_checksum(&data);
    let ingestor = Ingestor::new(&*store, options);

    let result = ingestor
        .ingest(kind, IngestSource::Bytes(data), Some(filename))
        .map_err(|e| match e {
            IngestError::InvalidOptions { .. } | IngestError::MissingSource => {
                UploadError::Rejected(e.to_string())
            }
            other => UploadError::Internal(other.into()),
        })?;

    let event = ingestion_event(kind, &result, &checksum, ACTOR);
    insert_event(store.connection(), &event)
        .context("Failed to record ingestion event")
        .map_err(UploadError::Internal)?;

    Ok(result.to_report())
}

/// Percent-decoded X-Filename header
fn upload_filename(headers: &HeaderMap) -> Option<String> {
    let raw = headers.get(FILENAME_HEADER)?.to_str().ok()?;
    let decoded = urlencoding::decode(raw)
        .map(|name| name.into_owned())
        .unwrap_or_else(|_| raw.to_string());

    let trimmed = decoded.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/ingest/ati-requests", post(ingest_ati_requests))
        .route("/ingest/public-bodies", post(ingest_public_bodies))
        .with_state(state);

    Router::new().nest("/api", api_routes).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive()),
    )
}

// ============================================================================
// Main Server
// ============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = AppConfig::load(args.config.as_deref())?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(format!("{},tower_http=info", config.log_filter))),
        )
        .init();

    let db_path = args.database.unwrap_or_else(|| config.database_path.clone());
    let store = SqliteStore::open(&db_path)?;
    tracing::info!(database = %db_path.display(), "Database opened");

    let state = AppState {
        store: Arc::new(Mutex::new(store)),
        defaults: config.ingestion.clone(),
    };

    let addr = args.bind.unwrap_or_else(|| config.server.bind_address.clone());
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    println!("🚀 Server running on http://{}", addr);
    println!("   API: http://{}/api/ingest/ati-requests", addr);
    println!("\n   Press Ctrl+C to stop\n");

    axum::serve(listener, router(state))
        .await
        .context("Server error")?;

    Ok(())
}
