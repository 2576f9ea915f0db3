//! JSON HTTP API over the keyword service.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `GET`  | `/sources` | Registered sources and their options |
//! | `GET`  | `/keywords` | Keyword list, without term data |
//! | `GET`  | `/keywords/{name}` | One keyword with its terms |
//! | `POST` | `/keywords` | Save `{keyword, source, options}` through its source |
//! | `POST` | `/keywords/{name}/refresh` | Re-fetch terms; `{"persist": true}` stores them |
//! | `DELETE` | `/keywords/{name}` | Delete a keyword |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "url_invalid", "message": "The RSS feed URL '..' is not a valid http(s) URL." } }
//! ```
//!
//! Source errors keep their own code; the status comes from the error kind
//! (400 validation, 404 not found, 502 fetch, 403 blocked). Anything else is
//! `500 internal`.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so a browser-based editor
//! can talk to the server directly.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::config::Config;
use crate::db;
use crate::error::SourceError;
use crate::keywords::{self, KeywordSummary};
use crate::models::{Keyword, SourceKind, TermSet};
use crate::service;
use crate::traits::{SourceContext, SourceDescriptor, SourceRegistry};

#[derive(Clone)]
struct AppState {
    ctx: SourceContext,
    registry: Arc<SourceRegistry>,
}

/// Starts the server on `[server].bind`.
///
/// The registry is usually [`SourceRegistry::with_builtins`], optionally
/// with extra sources registered on top.
///
/// ```rust,no_run
/// use keyword_harness::server::run_server_with_registry;
/// use keyword_harness::traits::SourceRegistry;
///
/// # async fn example(config: &keyword_harness::config::Config) -> anyhow::Result<()> {
/// let registry = SourceRegistry::with_builtins();
/// // registry.register(Box::new(MySource));
/// run_server_with_registry(config, registry).await?;
/// # Ok(())
/// # }
/// ```
pub async fn run_server_with_registry(config: &Config, registry: SourceRegistry) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let ctx = db::open_context(config).await?;
    let app = router(ctx, Arc::new(registry));

    println!("Keyword server listening on http://{}", bind_addr);
    tracing::info!(bind = %bind_addr, "server started");

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Builds the application router.
pub fn router(ctx: SourceContext, registry: Arc<SourceRegistry>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/sources", get(handle_sources))
        .route("/keywords", get(handle_list_keywords).post(handle_save_keyword))
        .route(
            "/keywords/{name}",
            get(handle_get_keyword).delete(handle_delete_keyword),
        )
        .route("/keywords/{name}/refresh", post(handle_refresh_keyword))
        .layer(cors)
        .with_state(AppState { ctx, registry })
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<SourceError> for AppError {
    fn from(err: SourceError) -> Self {
        AppError {
            status: StatusCode::from_u16(err.kind.http_status())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            code: err.code.to_string(),
            message: err.message,
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast::<SourceError>() {
            Ok(source_err) => source_err.into(),
            Err(other) => {
                tracing::error!(error = %other, "request failed");
                AppError {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    code: "internal".to_string(),
                    message: other.to_string(),
                }
            }
        }
    }
}

fn not_found(name: &str) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found".to_string(),
        message: format!("Keyword '{}' does not exist.", name),
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ GET /sources ============

#[derive(Serialize)]
struct SourcesResponse {
    sources: Vec<SourceDescriptor>,
}

async fn handle_sources(State(state): State<AppState>) -> Json<SourcesResponse> {
    Json(SourcesResponse {
        sources: state.registry.descriptors(&state.ctx).await,
    })
}

// ============ /keywords ============

#[derive(Serialize)]
struct KeywordListResponse {
    keywords: Vec<KeywordSummary>,
}

async fn handle_list_keywords(State(state): State<AppState>) -> Result<Json<KeywordListResponse>, AppError> {
    let keywords = keywords::list_keywords(&state.ctx.pool).await?;
    Ok(Json(KeywordListResponse { keywords }))
}

async fn handle_get_keyword(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<Keyword>, AppError> {
    let keyword = keywords::get_keyword(&state.ctx.pool, &name)
        .await?
        .ok_or_else(|| not_found(&name))?;
    Ok(Json(keyword))
}

#[derive(Deserialize)]
struct SaveRequest {
    keyword: String,
    source: String,
    #[serde(default)]
    options: Map<String, Value>,
}

async fn handle_save_keyword(
    State(state): State<AppState>,
    Json(req): Json<SaveRequest>,
) -> Result<Json<Keyword>, AppError> {
    let source: SourceKind = req.source.parse()?;
    let draft = Keyword::draft(req.keyword, source, req.options);
    let saved = service::save_keyword(&state.ctx, &state.registry, draft).await?;
    Ok(Json(saved))
}

#[derive(Deserialize, Default)]
struct RefreshRequest {
    #[serde(default)]
    persist: bool,
}

async fn handle_refresh_keyword(
    State(state): State<AppState>,
    Path(name): Path<String>,
    body: Option<Json<RefreshRequest>>,
) -> Result<Json<TermSet>, AppError> {
    let persist = body.map(|Json(b)| b.persist).unwrap_or_default();
    let terms = service::refresh_keyword(&state.ctx, &state.registry, &name, persist).await?;
    Ok(Json(terms))
}

async fn handle_delete_keyword(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<Value>, AppError> {
    if !keywords::delete_keyword(&state.ctx.pool, &name).await? {
        return Err(not_found(&name));
    }
    Ok(Json(serde_json::json!({ "deleted": name })))
}
