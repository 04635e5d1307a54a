//! HTTP server.
//!
//! Exposes the ask pipeline, chat history, document upload, and the image
//! analysis operations as a JSON API.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Status, version, corpus size |
//! | `POST` | `/ask` | Answer a question (`{question, role, last_image?}`) |
//! | `GET`  | `/history` | The caller's 20 most recent turns, oldest first |
//! | `PUT`  | `/documents/{role}/{filename}` | Store a PDF as `{ROLE}_{filename}` and reload |
//! | `POST` | `/documents/reload` | Rebuild the corpus from disk (admin only) |
//! | `POST` | `/analyze-diagram` | Highlight analysis of one image |
//! | `POST` | `/analyze-component` | Component analysis of one image |
//! | `POST` | `/interpret-image-detailed` | Plain interpretation of one image |
//! | `GET`  | `/extracted_images/{name}` | Extracted image bytes |
//!
//! # Identity
//!
//! Authentication happens upstream. Every API request carries the caller's
//! identity in the `x-docsight-user` and `x-docsight-role` headers, which are
//! trusted as given. Roles are compared upper-cased.
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "not_found", "message": "image not found: x.png" } }
//! ```
//!
//! Error codes: `bad_request` (400), `forbidden` (403), `not_found` (404),
//! `timeout` (408), `internal` (500).

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, FromRequestParts, Path, State},
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;

use docsight_core::session::ImageSessions;

use crate::analysis::{HighlightResult, ImageAnalyzer};
use crate::ask::{AskRequest, AskResponse, Assistant};
use crate::config::Config;
use crate::corpus::{self, resolve_image, SharedCorpus, Snapshot};
use crate::embedding::create_provider;
use crate::history::{HistoryEntry, SqliteHistory, DEFAULT_HISTORY_LIMIT};
use crate::llm::{create_chat_model, create_vision_model, ModelTimeout};
use crate::{db, migrate};

pub const USER_HEADER: &str = "x-docsight-user";
pub const ROLE_HEADER: &str = "x-docsight-role";

const MAX_UPLOAD_BYTES: usize = 64 * 1024 * 1024;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub corpus: Arc<SharedCorpus>,
    pub assistant: Assistant,
    pub history: SqliteHistory,
}

/// Assemble every long-lived service from configuration.
///
/// Opens (and migrates) the history database, creates the model clients,
/// and loads the corpus. Fails when no chunks can be loaded.
pub async fn build_state(config: &Config) -> anyhow::Result<AppState> {
    let pool = db::connect(config).await?;
    migrate::migrate_pool(&pool).await?;
    let history = SqliteHistory::new(pool);

    let embedder: Arc<dyn crate::embedding::EmbeddingProvider> =
        Arc::from(create_provider(&config.embedding)?);
    let chat = create_chat_model(&config.llm)?;
    let vision = create_vision_model(&config.llm)?;

    let snapshot = corpus::load_snapshot(config, embedder.as_ref()).await?;

    let assistant = Assistant {
        embedder,
        chat,
        analyzer: ImageAnalyzer::new(vision),
        history: Arc::new(history.clone()),
        sessions: Arc::new(ImageSessions::new(
            config.session.window,
            config.session.max_users,
        )),
        images_dir: config.documents.images_dir.clone(),
        retrieval: config.retrieval.clone(),
    };

    Ok(AppState {
        config: Arc::new(config.clone()),
        corpus: Arc::new(SharedCorpus::new(snapshot)),
        assistant,
        history,
    })
}

/// Build the router over `state`.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let images = ServeDir::new(&state.config.documents.images_dir);

    Router::new()
        .route("/health", get(handle_health))
        .route("/ask", post(handle_ask))
        .route("/history", get(handle_history))
        .route(
            "/documents/{role}/{filename}",
            put(handle_upload).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .route("/documents/reload", post(handle_reload))
        .route("/analyze-diagram", post(handle_analyze_diagram))
        .route("/analyze-component", post(handle_analyze_component))
        .route("/interpret-image-detailed", post(handle_interpret_image))
        .nest_service("/extracted_images", images)
        .layer(cors)
        .with_state(state)
}

/// Starts the HTTP server on `[server].bind`. Runs until the process exits.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let state = build_state(config).await?;
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    tracing::info!(bind = %config.server.bind, "server listening");
    println!("Docsight listening on http://{}", config.server.bind);
    axum::serve(listener, app).await?;

    Ok(())
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

/// Error type that converts into the JSON error contract.
#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request",
        message: message.into(),
    }
}

fn forbidden(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::FORBIDDEN,
        code: "forbidden",
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found",
        message: message.into(),
    }
}

/// Timeouts map to 408; everything else is a 500.
impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        if err.downcast_ref::<ModelTimeout>().is_some() {
            return AppError {
                status: StatusCode::REQUEST_TIMEOUT,
                code: "timeout",
                message: err.to_string(),
            };
        }
        tracing::error!(error = %format!("{:#}", err), "request failed");
        AppError {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code: "internal",
            message: format!("{:#}", err),
        }
    }
}

// ============ Identity ============

/// The caller, as asserted by the upstream auth layer.
#[derive(Debug, Clone)]
pub struct Viewer {
    pub username: String,
    pub role: String,
}

impl<S: Send + Sync> FromRequestParts<S> for Viewer {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = |name: &str| {
            parts
                .headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .ok_or_else(|| bad_request(format!("missing {} header", name)))
        };
        Ok(Viewer {
            username: header(USER_HEADER)?,
            role: header(ROLE_HEADER)?.to_uppercase(),
        })
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    chunks: usize,
    documents: usize,
}

async fn handle_health(State(state): State<AppState>) -> Json<HealthResponse> {
    let snapshot = state.corpus.get();
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        chunks: snapshot.corpus.len(),
        documents: snapshot.documents.len(),
    })
}

// ============ POST /ask ============

#[derive(Deserialize)]
struct AskBody {
    question: String,
    role: String,
    #[serde(default)]
    last_image: Option<String>,
}

async fn handle_ask(
    State(state): State<AppState>,
    viewer: Viewer,
    Json(body): Json<AskBody>,
) -> Result<Json<AskResponse>, AppError> {
    if body.question.trim().is_empty() {
        return Err(bad_request("question must not be empty"));
    }

    let req = AskRequest {
        username: viewer.username,
        viewer_role: viewer.role,
        requested_role: body.role.trim().to_uppercase(),
        question: body.question,
        last_image: body.last_image,
    };
    let snapshot = state.corpus.get();
    let response = state.assistant.ask(&snapshot, &req).await?;
    Ok(Json(response))
}

// ============ GET /history ============

#[derive(Serialize)]
struct HistoryResponse {
    history: Vec<HistoryEntry>,
}

async fn handle_history(
    State(state): State<AppState>,
    viewer: Viewer,
) -> Result<Json<HistoryResponse>, AppError> {
    let history = state
        .history
        .entries(&viewer.username, DEFAULT_HISTORY_LIMIT)
        .await?;
    Ok(Json(HistoryResponse { history }))
}

// ============ Documents ============

#[derive(Serialize)]
struct ReloadResponse {
    message: String,
    documents: usize,
    chunks: usize,
    images: usize,
}

async fn reload(state: &AppState) -> Result<Arc<Snapshot>, AppError> {
    Ok(state
        .corpus
        .reload(&state.config, state.assistant.embedder.as_ref())
        .await?)
}

fn reload_response(snapshot: &Snapshot, message: &str) -> Json<ReloadResponse> {
    Json(ReloadResponse {
        message: message.to_string(),
        documents: snapshot.documents.len(),
        chunks: snapshot.corpus.len(),
        images: snapshot.images.len(),
    })
}

/// Whether `stored_name` made it into the published snapshot.
fn is_indexed(snapshot: &Snapshot, stored_name: &str) -> bool {
    snapshot.documents.iter().any(|d| d.filename == stored_name)
}

/// A plain `.pdf` file name with no path components.
fn valid_upload_name(filename: &str) -> bool {
    !filename.is_empty()
        && !filename.contains('/')
        && !filename.contains('\\')
        && !filename.starts_with('.')
        && filename.to_lowercase().ends_with(".pdf")
}

async fn handle_upload(
    State(state): State<AppState>,
    viewer: Viewer,
    Path((role, filename)): Path<(String, String)>,
    body: Bytes,
) -> Result<Json<ReloadResponse>, AppError> {
    let role = role.trim().to_uppercase();
    if role.is_empty() || role.contains('_') {
        return Err(bad_request("role must be non-empty and contain no '_'"));
    }
    if viewer.role != role && viewer.role != state.config.retrieval.admin_role {
        return Err(forbidden("Not authorized to upload for this role"));
    }
    if !valid_upload_name(&filename) {
        return Err(bad_request("filename must be a plain .pdf file name"));
    }
    if body.is_empty() {
        return Err(bad_request("upload body must not be empty"));
    }

    let dir = &state.config.documents.dir;
    let stored_name = format!("{}_{}", role, filename);
    let target = dir.join(&stored_name);
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(anyhow::Error::from)?;
    tokio::fs::write(&target, &body)
        .await
        .map_err(anyhow::Error::from)?;
    tracing::info!(user = %viewer.username, path = %target.display(), bytes = body.len(), "document uploaded");

    let snapshot = reload(&state).await?;
    if is_indexed(&snapshot, &stored_name) {
        Ok(reload_response(&snapshot, "File uploaded and indexed successfully"))
    } else {
        tracing::warn!(document = %stored_name, "uploaded document could not be indexed");
        Ok(reload_response(
            &snapshot,
            "File stored but could not be indexed",
        ))
    }
}

async fn handle_reload(
    State(state): State<AppState>,
    viewer: Viewer,
) -> Result<Json<ReloadResponse>, AppError> {
    if viewer.role != state.config.retrieval.admin_role {
        return Err(forbidden("Only the admin role may reload documents"));
    }
    let snapshot = reload(&state).await?;
    Ok(reload_response(&snapshot, "Documents reloaded"))
}

// ============ Image analysis ============

#[derive(Deserialize)]
struct DiagramBody {
    image_name: String,
    question: String,
}

#[derive(Deserialize)]
struct ComponentBody {
    image_name: String,
    component_name: String,
}

#[derive(Serialize)]
struct ComponentResponse {
    component: String,
    image: String,
    analysis: String,
}

#[derive(Serialize)]
struct InterpretResponse {
    image: String,
    question: String,
    interpretation: String,
}

fn image_path(state: &AppState, name: &str) -> Result<std::path::PathBuf, AppError> {
    resolve_image(&state.config.documents.images_dir, name)
        .ok_or_else(|| not_found(format!("image not found: {}", name)))
}

async fn handle_analyze_diagram(
    State(state): State<AppState>,
    _viewer: Viewer,
    Json(body): Json<DiagramBody>,
) -> Result<Json<HighlightResult>, AppError> {
    let path = image_path(&state, &body.image_name)?;
    let result = state.assistant.analyzer.highlight(&path, &body.question).await;
    Ok(Json(result))
}

async fn handle_analyze_component(
    State(state): State<AppState>,
    _viewer: Viewer,
    Json(body): Json<ComponentBody>,
) -> Result<Json<ComponentResponse>, AppError> {
    let path = image_path(&state, &body.image_name)?;
    let analysis = state
        .assistant
        .analyzer
        .analyze_component(&path, &body.component_name)
        .await;
    Ok(Json(ComponentResponse {
        component: body.component_name,
        image: body.image_name,
        analysis,
    }))
}

async fn handle_interpret_image(
    State(state): State<AppState>,
    _viewer: Viewer,
    Json(body): Json<DiagramBody>,
) -> Result<Json<InterpretResponse>, AppError> {
    let path = image_path(&state, &body.image_name)?;
    let interpretation = state.assistant.analyzer.interpret(&path, &body.question).await;
    Ok(Json(InterpretResponse {
        image: body.image_name,
        question: body.question,
        interpretation,
    }))
}
