//! API routes

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, post, put},
    Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::conversation::Message;
use crate::core::{ArenaReport, ArenaRequest, ComparisonEntry, RunError, VariantOutcome};
use crate::session::{
    ComparisonExport, NewSession, Session, SessionError, SessionExport, SettingsUpdate,
};
use crate::AppState;

type ApiResult<T> = Result<Json<T>, (StatusCode, String)>;

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    provider: &'static str,
}

#[derive(Debug, Deserialize)]
pub struct AddPromptRequest {
    pub content: String,
}

#[derive(Debug, Serialize)]
pub struct AddPromptResponse {
    pub index: usize,
    /// One-based number shown to people
    pub version: usize,
}

#[derive(Debug, Deserialize)]
pub struct SelectionRequest {
    pub selected: Vec<usize>,
}

#[derive(Debug, Deserialize)]
pub struct CompareRequest {
    pub user_message: String,
    #[serde(default = "default_iterations")]
    pub iterations: u32,
}

fn default_iterations() -> u32 {
    1
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub message: Message,
    /// False when the session changed while the reply was pending
    pub recorded: bool,
}

#[derive(Debug, Serialize)]
pub struct SimulateResponse {
    pub results: Vec<VariantOutcome>,
}

fn error_response(err: SessionError) -> (StatusCode, String) {
    let status = match &err {
        SessionError::NotFound(_) => StatusCode::NOT_FOUND,
        SessionError::Invalid(_) | SessionError::Run(_) => StatusCode::BAD_REQUEST,
        SessionError::Provider(_) => StatusCode::BAD_GATEWAY,
    };
    (status, err.to_string())
}

fn config_error(err: RunError) -> (StatusCode, String) {
    (StatusCode::BAD_REQUEST, err.to_string())
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        provider: state.engine.provider_name(),
    })
}

async fn create_session(
    State(state): State<AppState>,
    body: Option<Json<NewSession>>,
) -> Result<(StatusCode, Json<Session>), (StatusCode, String)> {
    let init = body.map(|Json(init)| init).unwrap_or_default();
    let session = state.sessions.create(init).await.map_err(error_response)?;
    Ok((StatusCode::CREATED, Json(session)))
}

async fn get_session(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Session> {
    state.sessions.get(id).await.map(Json).map_err(error_response)
}

async fn delete_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, (StatusCode, String)> {
    state.sessions.remove(id).await.map_err(error_response)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn add_prompt(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<AddPromptRequest>,
) -> ApiResult<AddPromptResponse> {
    let index = state
        .sessions
        .update(id, |session| session.add_variant(request.content))
        .await
        .map_err(error_response)?;

    Ok(Json(AddPromptResponse {
        index,
        version: index + 1,
    }))
}

async fn set_selection(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<SelectionRequest>,
) -> ApiResult<Session> {
    state
        .sessions
        .update(id, |session| {
            session.set_selection(request.selected)?;
            Ok(session.clone())
        })
        .await
        .map(Json)
        .map_err(error_response)
}

async fn update_settings(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(update): Json<SettingsUpdate>,
) -> ApiResult<Session> {
    state
        .sessions
        .update(id, |session| {
            session.update_settings(update)?;
            Ok(session.clone())
        })
        .await
        .map(Json)
        .map_err(error_response)
}

async fn add_message(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(message): Json<Message>,
) -> ApiResult<Session> {
    state
        .sessions
        .update(id, |session| {
            session.add_message(message)?;
            Ok(session.clone())
        })
        .await
        .map(Json)
        .map_err(error_response)
}

async fn reset_session(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Session> {
    state
        .sessions
        .update(id, |session| {
            session.reset();
            Ok(session.clone())
        })
        .await
        .map(Json)
        .map_err(error_response)
}

async fn simulate(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<SimulateResponse> {
    let results = state
        .sessions
        .simulate(&state.engine, id)
        .await
        .map_err(error_response)?;

    Ok(Json(SimulateResponse { results }))
}

async fn compare(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<CompareRequest>,
) -> ApiResult<Vec<ComparisonEntry>> {
    state
        .sessions
        .compare(&state.engine, id, request.user_message, request.iterations)
        .await
        .map(Json)
        .map_err(error_response)
}

async fn chat(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<ChatRequest>,
) -> ApiResult<ChatResponse> {
    let outcome = state
        .sessions
        .chat(&state.engine, id, request.message)
        .await
        .map_err(error_response)?;

    Ok(Json(ChatResponse {
        message: Message::assistant(outcome.reply),
        recorded: outcome.recorded,
    }))
}

async fn export_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<SessionExport> {
    state
        .sessions
        .get(id)
        .await
        .map(|session| Json(session.export()))
        .map_err(error_response)
}

async fn export_comparison(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<ComparisonExport> {
    state
        .sessions
        .get(id)
        .await
        .map(|session| Json(session.comparison_export()))
        .map_err(error_response)
}

async fn arena(
    State(state): State<AppState>,
    Json(request): Json<ArenaRequest>,
) -> ApiResult<ArenaReport> {
    let rounds = state.engine.arena(&request).await.map_err(config_error)?;
    Ok(Json(ArenaReport::new(request, rounds)))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/v1/sessions", post(create_session))
        .route("/v1/sessions/:id", get(get_session).delete(delete_session))
        .route("/v1/sessions/:id/prompts", post(add_prompt))
        .route("/v1/sessions/:id/selection", put(set_selection))
        .route("/v1/sessions/:id/settings", put(update_settings))
        .route("/v1/sessions/:id/messages", post(add_message))
        .route("/v1/sessions/:id/reset", post(reset_session))
        .route("/v1/sessions/:id/simulate", post(simulate))
        .route("/v1/sessions/:id/compare", post(compare))
        .route("/v1/sessions/:id/compare/export", get(export_comparison))
        .route("/v1/sessions/:id/chat", post(chat))
        .route("/v1/sessions/:id/export", get(export_session))
        .route("/v1/arena", post(arena))
}
