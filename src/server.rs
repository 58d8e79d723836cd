//! JSON HTTP API.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `POST` | `/courses/{slug}/enroll` | Enroll the caller |
//! | `GET`  | `/courses/{slug}/report` | Course aggregate (owning teacher or admin) |
//! | `GET`  | `/enrollments` | Caller's enrollments |
//! | `GET`  | `/enrollments/{id}/progress` | Progress snapshot |
//! | `POST` | `/enrollments/{id}/lessons/{lesson}/complete` | Mark a lesson complete |
//! | `POST` | `/enrollments/{id}/certificate` | Issue (or fetch) the certificate |
//! | `GET`  | `/certificates/{code}` | Public certificate verification |
//! | `POST` | `/search` | Aggregate course/module/lesson matches |
//!
//! # Authentication
//!
//! Identity comes from a trusted upstream proxy via the `x-user-id` and
//! `x-user-role` headers. Requests without them get `401 unauthorized`.
//! Only `/health` and `/certificates/{code}` are public.
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "not_found", "message": "enrollment not found: 7" } }
//! ```
//!
//! Error codes: `unauthorized` (401), `forbidden` (403), `not_found` (404),
//! `enrollment_inactive` (409), `already_exists` (409), `not_eligible` (409),
//! `lesson_not_in_course` (422), `invalid_total_lesson_count` (422),
//! `internal` (500). Malformed path parameters and JSON bodies are rejected
//! by the extractors before reaching a handler.

use axum::{
    extract::{FromRequestParts, Path, State},
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use coursetrack_core::access::{
    authorize_course, authorize_enrollment_read, authorize_enrollment_write, Principal, Role,
};
use coursetrack_core::certificate::verify_certificate;
use coursetrack_core::models::{
    Certificate, CourseReport, Enrollment, EnrollmentSummary, ProgressSnapshot, ProgressUpdate,
};
use coursetrack_core::search::{search_courses, CourseSearchResult, SearchRequest};
use coursetrack_core::store::Store;
use coursetrack_core::ProgressError;

use crate::config::Config;
use crate::sqlite_store::SqliteStore;

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    config: Arc<Config>,
    store: Arc<dyn Store>,
}

impl AppState {
    pub fn new(config: Arc<Config>, store: Arc<dyn Store>) -> Self {
        Self { config, store }
    }
}

/// Starts the HTTP server on `[server].bind` against the configured SQLite
/// database. Runs until the process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let store = SqliteStore::connect(config).await?;
    let state = AppState::new(Arc::new(config.clone()), Arc::new(store));

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    info!("listening on http://{}", config.server.bind);
    axum::serve(listener, router(state)).await?;

    Ok(())
}

/// Build the router. Exposed so callers can serve it on their own listener
/// or against a different [`Store`].
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/courses/{slug}/enroll", post(handle_enroll))
        .route("/courses/{slug}/report", get(handle_report))
        .route("/enrollments", get(handle_list_enrollments))
        .route("/enrollments/{id}/progress", get(handle_progress))
        .route(
            "/enrollments/{id}/lessons/{lesson}/complete",
            post(handle_complete),
        )
        .route("/enrollments/{id}/certificate", post(handle_certificate))
        .route("/certificates/{code}", get(handle_verify))
        .route("/search", post(handle_search))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
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

/// Internal error type that converts into an Axum HTTP response.
pub struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl AppError {
    fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }
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

fn unauthorized(message: impl Into<String>) -> AppError {
    AppError::new(StatusCode::UNAUTHORIZED, "unauthorized", message)
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError::new(StatusCode::NOT_FOUND, "not_found", message)
}

impl From<ProgressError> for AppError {
    fn from(err: ProgressError) -> Self {
        let (status, code) = match &err {
            ProgressError::CourseNotFound(_)
            | ProgressError::ModuleNotFound(_)
            | ProgressError::LessonNotFound(_)
            | ProgressError::EnrollmentNotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            ProgressError::Forbidden(_) => (StatusCode::FORBIDDEN, "forbidden"),
            ProgressError::EnrollmentInactive(_) => (StatusCode::CONFLICT, "enrollment_inactive"),
            ProgressError::AlreadyExists(_) => (StatusCode::CONFLICT, "already_exists"),
            ProgressError::NotEligibleForCertificate(_) => (StatusCode::CONFLICT, "not_eligible"),
            ProgressError::LessonNotInCourse { .. } => {
                (StatusCode::UNPROCESSABLE_ENTITY, "lesson_not_in_course")
            }
            ProgressError::InvalidTotalLessonCount(_) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "invalid_total_lesson_count")
            }
        };
        AppError::new(status, code, err.to_string())
    }
}

/// Domain errors keep their status; anything else is a 500 and gets logged.
impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast_ref::<ProgressError>() {
            Some(e) => e.clone().into(),
            None => {
                error!(error = %err, "request failed");
                AppError::new(StatusCode::INTERNAL_SERVER_ERROR, "internal", err.to_string())
            }
        }
    }
}

// ============ Caller identity ============

fn header<'a>(parts: &'a Parts, name: &str) -> Option<&'a str> {
    parts
        .headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// The authenticated principal of a request, read from trusted headers.
pub struct Caller(pub Principal);

impl<S: Send + Sync> FromRequestParts<S> for Caller {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = header(parts, "x-user-id")
            .ok_or_else(|| unauthorized("missing x-user-id header"))?
            .parse::<i64>()
            .map_err(|_| unauthorized("x-user-id must be an integer"))?;
        let role = header(parts, "x-user-role")
            .ok_or_else(|| unauthorized("missing x-user-role header"))?
            .parse::<Role>()
            .map_err(unauthorized)?;

        Ok(Caller(Principal::new(user_id, role)))
    }
}

#[derive(Clone, Copy)]
enum Access {
    Read,
    Write,
}

/// Load an enrollment and check the caller may read or change it.
async fn authorized_enrollment(
    state: &AppState,
    caller: &Principal,
    enrollment_id: i64,
    access: Access,
) -> Result<Enrollment, AppError> {
    let enrollment = state
        .store
        .get_enrollment(enrollment_id)
        .await?
        .ok_or(ProgressError::EnrollmentNotFound(enrollment_id))?;
    match access {
        Access::Write => authorize_enrollment_write(caller, &enrollment)?,
        Access::Read => {
            let course = state
                .store
                .get_course_by_id(enrollment.course_id)
                .await?
                .ok_or_else(|| ProgressError::CourseNotFound(enrollment.course_id.to_string()))?;
            authorize_enrollment_read(caller, &enrollment, &course)?;
        }
    }
    Ok(enrollment)
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

// ============ Enrollments ============

async fn handle_enroll(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path(slug): Path<String>,
) -> Result<Json<Enrollment>, AppError> {
    let enrollment = state.store.enroll(caller.user_id, &slug, Utc::now()).await?;
    info!(
        enrollment_id = enrollment.id,
        user_id = caller.user_id,
        course = %slug,
        "enrollment active"
    );
    Ok(Json(enrollment))
}

async fn handle_list_enrollments(
    State(state): State<AppState>,
    Caller(caller): Caller,
) -> Result<Json<Vec<EnrollmentSummary>>, AppError> {
    Ok(Json(state.store.list_enrollments(caller.user_id).await?))
}

async fn handle_progress(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path(id): Path<i64>,
) -> Result<Json<ProgressSnapshot>, AppError> {
    authorized_enrollment(&state, &caller, id, Access::Read).await?;
    Ok(Json(state.store.get_progress(id).await?))
}

async fn handle_complete(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path((id, lesson)): Path<(i64, String)>,
) -> Result<Json<ProgressUpdate>, AppError> {
    authorized_enrollment(&state, &caller, id, Access::Write).await?;
    let update = state
        .store
        .complete_lesson(id, &lesson, &state.config.tracker(), Utc::now())
        .await?;
    Ok(Json(update))
}

async fn handle_certificate(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path(id): Path<i64>,
) -> Result<Json<Certificate>, AppError> {
    authorized_enrollment(&state, &caller, id, Access::Write).await?;
    Ok(Json(state.store.issue_certificate(id, Utc::now()).await?))
}

// ============ GET /certificates/{code} ============

#[derive(Serialize)]
struct VerifyResponse {
    valid: bool,
    certificate: Certificate,
}

async fn handle_verify(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Json<VerifyResponse>, AppError> {
    let certificate = verify_certificate(state.store.as_ref(), &code)
        .await?
        .ok_or_else(|| not_found(format!("certificate not found: {}", code)))?;
    Ok(Json(VerifyResponse {
        valid: true,
        certificate,
    }))
}

// ============ GET /courses/{slug}/report ============

async fn handle_report(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path(slug): Path<String>,
) -> Result<Json<CourseReport>, AppError> {
    let course = state
        .store
        .get_course(&slug)
        .await?
        .ok_or_else(|| ProgressError::CourseNotFound(slug.clone()))?;
    authorize_course(&caller, &course)?;
    Ok(Json(state.store.course_report(&slug).await?))
}

// ============ POST /search ============

#[derive(Serialize)]
struct SearchResponse {
    results: Vec<CourseSearchResult>,
}

async fn handle_search(
    State(state): State<AppState>,
    _caller: Caller,
    Json(req): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, AppError> {
    let results = search_courses(state.store.as_ref(), &req, &state.config.search_params()).await?;
    Ok(Json(SearchResponse { results }))
}
