use axum::{
    extract::{rejection::JsonRejection, Path, Request, State},
    http::{header, HeaderName, HeaderValue, Method, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::warn;

use study_extract::{
    Answer, AskRequest, Quiz, QuizRequest, ScheduleDay, ScheduleRequest, StudyTasks, TaskError,
    TextGenerator, UnitSummary, UnitsRequest,
};

use crate::metrics::{Metrics, MetricsSnapshot};
use crate::notes::{Note, NoteStore};

const API_KEY_HEADER: &str = "x-api-key";

pub struct AppState<G> {
    pub tasks: Arc<StudyTasks<G>>,
    pub notes: Arc<dyn NoteStore>,
    pub metrics: Arc<Metrics>,
    pub api_key: Option<Arc<str>>,
}

impl<G> Clone for AppState<G> {
    fn clone(&self) -> Self {
        Self {
            tasks: self.tasks.clone(),
            notes: self.notes.clone(),
            metrics: self.metrics.clone(),
            api_key: self.api_key.clone(),
        }
    }
}

impl<G: TextGenerator> AppState<G> {
    pub fn new(tasks: StudyTasks<G>, notes: Arc<dyn NoteStore>, api_key: Option<String>) -> Self {
        Self {
            tasks: Arc::new(tasks),
            notes,
            metrics: Metrics::new(),
            api_key: api_key.map(Arc::from),
        }
    }
}

/// `TaskError` on the wire.
pub struct ApiError(TaskError);

/// Malformed or incomplete bodies get the same JSON error shape as the rest.
impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError(TaskError::InvalidRequest(rejection.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            TaskError::InvalidRequest(_) => StatusCode::UNPROCESSABLE_ENTITY,
            TaskError::Transport(e) if e.is_timeout() => StatusCode::GATEWAY_TIMEOUT,
            TaskError::Transport(_) => StatusCode::BAD_GATEWAY,
            TaskError::Extraction(_) | TaskError::Validation { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let mut body = json!({ "error": self.0.to_string() });
        match &self.0 {
            TaskError::Transport(e) => {
                if let Some(detail) = e.body.as_deref().filter(|b| !b.is_empty()) {
                    body["detail"] = json!(detail);
                }
            }
            other => {
                if let Some(raw) = other.raw() {
                    body["raw"] = json!(raw);
                }
            }
        }

        (status, Json(body)).into_response()
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    model: String,
}

#[derive(Deserialize)]
struct AddNoteRequest {
    filename: String,
    #[serde(default)]
    text: String,
}

#[derive(Serialize)]
struct AddNoteResponse {
    id: uuid::Uuid,
    filename: String,
    text_length: usize,
    summary: String,
}

pub fn router<G: TextGenerator + 'static>(state: AppState<G>) -> Router {
    let gated = Router::new()
        .route("/api/llm/ask", post(ask::<G>))
        .route("/api/llm/units", post(units::<G>))
        .route("/api/llm/schedule", post(schedule::<G>))
        .route("/api/llm/quiz", post(quiz::<G>))
        .route(
            "/notes/:user_id/:course_name",
            post(add_note::<G>).get(list_notes::<G>),
        )
        .route_layer(middleware::from_fn_with_state(
            state.api_key.clone(),
            require_api_key,
        ));

    Router::new()
        .route("/health", get(health::<G>))
        .route("/metrics", get(metrics::<G>))
        .merge(gated)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE, HeaderName::from_static(API_KEY_HEADER)])
}

/// Shared-credential gate. Open when no key is configured.
async fn require_api_key(
    State(api_key): State<Option<Arc<str>>>,
    request: Request,
    next: Next,
) -> Response {
    if let Some(expected) = api_key {
        let provided = request
            .headers()
            .get(API_KEY_HEADER)
            .and_then(|v| v.to_str().ok());
        if provided != Some(&*expected) {
            return (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "error": "Invalid or missing API key" })),
            )
                .into_response();
        }
    }
    next.run(request).await
}

async fn health<G: TextGenerator + 'static>(State(state): State<AppState<G>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        model: state.tasks.generator().model().to_string(),
    })
}

async fn metrics<G: TextGenerator + 'static>(State(state): State<AppState<G>>) -> Json<MetricsSnapshot> {
    Json(state.metrics.snapshot())
}

async fn ask<G: TextGenerator + 'static>(
    State(state): State<AppState<G>>,
    payload: Result<Json<AskRequest>, JsonRejection>,
) -> Result<Json<Answer>, ApiError> {
    let Json(req) = payload?;
    let started = Instant::now();
    let result = state.tasks.ask(&req).await;
    state.metrics.record(&result, started.elapsed());
    result.map(Json).map_err(ApiError)
}

async fn units<G: TextGenerator + 'static>(
    State(state): State<AppState<G>>,
    payload: Result<Json<UnitsRequest>, JsonRejection>,
) -> Result<Json<Vec<UnitSummary>>, ApiError> {
    let Json(req) = payload?;
    let started = Instant::now();
    let result = state.tasks.units(&req).await;
    state.metrics.record(&result, started.elapsed());
    result.map(Json).map_err(ApiError)
}

async fn schedule<G: TextGenerator + 'static>(
    State(state): State<AppState<G>>,
    payload: Result<Json<ScheduleRequest>, JsonRejection>,
) -> Result<Json<Vec<ScheduleDay>>, ApiError> {
    let Json(req) = payload?;
    let started = Instant::now();
    let result = state.tasks.schedule(&req).await;
    state.metrics.record(&result, started.elapsed());
    result.map(Json).map_err(ApiError)
}

async fn quiz<G: TextGenerator + 'static>(
    State(state): State<AppState<G>>,
    payload: Result<Json<QuizRequest>, JsonRejection>,
) -> Result<Json<Quiz>, ApiError> {
    let Json(req) = payload?;
    let started = Instant::now();
    let result = state.tasks.quiz(&req).await;
    state.metrics.record(&result, started.elapsed());
    result.map(Json).map_err(ApiError)
}

async fn add_note<G: TextGenerator + 'static>(
    State(state): State<AppState<G>>,
    Path((user_id, course_name)): Path<(String, String)>,
    payload: Result<Json<AddNoteRequest>, JsonRejection>,
) -> Result<Json<AddNoteResponse>, ApiError> {
    let Json(req) = payload?;
    if req.filename.trim().is_empty() {
        return Err(ApiError(TaskError::InvalidRequest("filename is empty".to_string())));
    }

    let note = Note::new(req.filename, req.text);
    let response = AddNoteResponse {
        id: note.id,
        filename: note.filename.clone(),
        text_length: note.text.chars().count(),
        summary: note.summary.clone(),
    };
    state.notes.add(&user_id, &course_name, note);

    Ok(Json(response))
}

async fn list_notes<G: TextGenerator + 'static>(
    State(state): State<AppState<G>>,
    Path((user_id, course_name)): Path<(String, String)>,
) -> Json<Vec<Note>> {
    Json(state.notes.list(&user_id, &course_name))
}
