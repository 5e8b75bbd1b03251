//! HTTP front door.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/review` | Ingest a source and return its review |
//! | `GET`  | `/health` | Status, version and configured providers |
//!
//! # Error Contract
//!
//! | Status | Body | When |
//! |--------|------|------|
//! | 400 | `{ "error": true, "message": "Ingestion failed: ..." }` | source could not be ingested |
//! | 400 | `{ "error": "LLM requested but configuration failed", "details": "..." }` | `use_llm` without a usable model |
//! | 500 | `{ "error": "..." }` | the review run itself failed |
//!
//! Reviews run on the blocking thread pool: every stage is synchronous and
//! the model and fetch clients are blocking.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so browser front ends can
//! call the API directly.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::config::Config;
use crate::embedding::{create_embedder, Embedder};
use crate::ingest::load_source;
use crate::model::create_model;
use crate::models::ReviewOutcome;
use crate::pipeline::Orchestrator;

/// Shared state for all handlers.
#[derive(Clone)]
pub struct AppState {
    config: Arc<Config>,
    /// Built once at startup and shared by every run.
    embedder: Option<Arc<dyn Embedder>>,
}

impl AppState {
    /// State for `config`. An embedder that cannot be built is logged and
    /// retrieval stays lexical.
    pub fn new(config: Config) -> Self {
        let embedder = match create_embedder(&config.embedding) {
            Ok(embedder) => embedder.map(Arc::from),
            Err(e) => {
                tracing::warn!(error = %e, "embedder unavailable; retrieval will be lexical");
                None
            }
        };
        Self {
            config: Arc::new(config),
            embedder,
        }
    }

    /// [`AppState::new`] on the blocking pool; embedder construction blocks.
    pub async fn build(config: Config) -> anyhow::Result<Self> {
        Ok(tokio::task::spawn_blocking(move || Self::new(config)).await?)
    }
}

/// Body of `POST /review`.
#[derive(Debug, Deserialize)]
pub struct ReviewRequest {
    pub source: String,
    #[serde(default)]
    pub use_llm: bool,
    #[serde(default)]
    pub llm_model: Option<String>,
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/review", post(handle_review))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state)
}

/// Serve on `[server].bind` until the process is terminated.
pub async fn run_server(config: Config) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let app = router(AppState::build(config).await?);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(addr = %bind_addr, "review server listening");
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Errors ============

/// A JSON error body with its status.
#[derive(Debug)]
struct AppError {
    status: StatusCode,
    body: serde_json::Value,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    model_provider: String,
    embedding_provider: String,
}

async fn handle_health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        model_provider: state.config.model.provider.clone(),
        embedding_provider: state.config.embedding.provider.clone(),
    })
}

// ============ POST /review ============

async fn handle_review(
    State(state): State<AppState>,
    Json(request): Json<ReviewRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    let outcome = tokio::task::spawn_blocking(move || review_blocking(&state, &request))
        .await
        .map_err(|e| AppError {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            body: serde_json::json!({ "error": e.to_string() }),
        })??;

    review_response(outcome).map(Json)
}

fn review_response(outcome: ReviewOutcome) -> Result<serde_json::Value, AppError> {
    let internal = |error: String| AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        body: serde_json::json!({ "error": error }),
    };
    match outcome {
        ReviewOutcome::Review(review) => {
            serde_json::to_value(&review).map_err(|e| internal(format!("failed to encode review: {}", e)))
        }
        ReviewOutcome::Failed { error } => Err(internal(error)),
    }
}

fn review_blocking(state: &AppState, request: &ReviewRequest) -> Result<ReviewOutcome, AppError> {
    let config = state.config.as_ref();

    let text = load_source(&request.source, config).map_err(|e| {
        tracing::warn!(error = %e, "ingestion failed");
        AppError {
            status: StatusCode::BAD_REQUEST,
            body: e.to_json(),
        }
    })?;

    let mut orchestrator = Orchestrator::new(config.clone());
    if let Some(embedder) = &state.embedder {
        orchestrator = orchestrator.with_embedder(embedder.clone());
    }
    if request.use_llm {
        let model = create_model(&config.model, request.llm_model.as_deref()).map_err(|e| {
            tracing::warn!(error = %e, "model construction failed");
            AppError {
                status: StatusCode::BAD_REQUEST,
                body: serde_json::json!({
                    "error": "LLM requested but configuration failed",
                    "details": e.to_string(),
                }),
            }
        })?;
        orchestrator = orchestrator.with_model(model);
    }

    Ok(orchestrator.run(&text))
}
