//! HTTP + JSON surface over the task mutation service.
//!
//! Every route requires the `x-user-id` header. Identity is established by an
//! upstream authenticator; this layer only reads the id it forwards.

use std::str::FromStr;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{FromRequestParts, Path, Query, State},
    http::{StatusCode, request::Parts},
    response::{IntoResponse, Response},
    routing::{get, post, put},
};
use serde::Deserialize;
use taskboard_proto::task::{Priority, Task, TaskId, TaskPatch, TaskStatus, Timestamp};

use crate::actions::InMemoryActionLog;
use crate::config::BoardConfig;
use crate::notifier::BoardNotifier;
use crate::service::{DEFAULT_FEED_LIMIT, DEFAULT_MAX_FEED_LIMIT, MutationError, TaskService};
use crate::store::{InMemoryTaskStore, TaskFilter};
use crate::users::{DirectoryError, UserDirectory};

/// Header carrying the authenticated user id.
pub const USER_HEADER: &str = "x-user-id";

/// Default maximum websocket frame size in bytes (64 KB).
const DEFAULT_MAX_FRAME_SIZE: usize = 64 * 1024;

// ── Shared application state ──────────────────────────────────────────

/// State shared by every HTTP and websocket handler.
pub struct AppState {
    /// Mutation service every route goes through.
    pub service: TaskService,
    /// Feed page size used when the request names none.
    pub feed_limit: usize,
    /// Upper bound applied to a requested feed page size.
    pub max_feed_limit: usize,
    /// Largest websocket frame accepted from a client, in bytes.
    pub max_frame_size: usize,
}

/// Handle to [`AppState`] held by the router.
pub type SharedState = Arc<AppState>;

impl AppState {
    /// Wraps a service with default limits.
    #[must_use]
    pub const fn new(service: TaskService) -> Self {
        Self {
            service,
            feed_limit: DEFAULT_FEED_LIMIT,
            max_feed_limit: DEFAULT_MAX_FEED_LIMIT,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }

    /// Builds in-memory state with default limits and no known users.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(TaskService::new(
            Arc::new(InMemoryTaskStore::new()),
            Arc::new(InMemoryActionLog::new()),
            Arc::new(BoardNotifier::new()),
        ))
    }

    /// Builds in-memory state from resolved configuration.
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError`] if the configured users collide.
    pub fn from_config(config: &BoardConfig) -> Result<Self, DirectoryError> {
        let users = UserDirectory::from_profiles(config.users.iter().cloned())?;
        let service = TaskService::new(
            Arc::new(InMemoryTaskStore::new()),
            Arc::new(InMemoryActionLog::with_retention(config.retention)),
            Arc::new(BoardNotifier::new()),
        )
        .with_users(Arc::new(users));

        Ok(Self {
            service,
            feed_limit: config.feed_limit,
            max_feed_limit: config.max_feed_limit,
            max_frame_size: config.max_frame_size,
        })
    }
}

// ── Identity ──────────────────────────────────────────────────────────

/// The user id forwarded in the `x-user-id` header.
pub struct AuthUser(pub String);

impl<S: Send + Sync> FromRequestParts<S> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(USER_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(|v| Self(v.to_string()))
            .ok_or(ApiError::Unauthorized)
    }
}

// ── Request payload types ─────────────────────────────────────────────

/// Query string of `GET /api/boards/{board_id}/tasks`.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListTasksQuery {
    /// Column name to filter by (`Todo`, `In Progress`, `Done`).
    pub status: Option<String>,
    /// Only tasks assigned to this user id.
    pub assigned_user: Option<String>,
}

/// Body of `POST /api/boards/{board_id}/tasks`.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTaskRequest {
    /// Task title; trimmed before validation.
    pub title: String,
    /// Optional free-form description.
    pub description: Option<String>,
    /// Defaults to `Medium`.
    pub priority: Option<Priority>,
}

/// Body of `PUT /api/tasks/{task_id}`: the patch fields plus an optional
/// staleness token.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTaskRequest {
    /// Fields to overwrite. `null` clears a nullable field.
    #[serde(flatten)]
    pub patch: TaskPatch,
    /// The `lastEdited` the client last saw; omitted to skip the check.
    pub last_edited: Option<Timestamp>,
}

/// Query string of `GET /api/boards/{board_id}/actions`.
#[derive(Deserialize)]
pub struct FeedQuery {
    /// Requested page size, capped at [`AppState::max_feed_limit`].
    pub limit: Option<usize>,
}

// ── Error handling ────────────────────────────────────────────────────

/// A failed request, rendered as a status code and a JSON `{"error"}` body.
pub enum ApiError {
    /// 401: the identity header is missing or empty.
    Unauthorized,
    /// 400: validation failure, duplicate title or malformed id.
    BadRequest(String),
    /// 404: the task does not exist.
    NotFound(String),
    /// 409: stale edit. The body also carries the latest task.
    Conflict(Box<Task>),
    /// 500: persistence failure.
    Internal(String),
}

impl From<MutationError> for ApiError {
    fn from(err: MutationError) -> Self {
        match err {
            MutationError::Validation(_) | MutationError::DuplicateTitle { .. } => {
                Self::BadRequest(err.to_string())
            }
            MutationError::NotFound(_) => Self::NotFound(err.to_string()),
            MutationError::Conflict { latest } => Self::Conflict(latest),
            MutationError::Persistence(_) => Self::Internal(err.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::Conflict(latest) => {
                let body = serde_json::json!({
                    "error": "Edit conflict: task has been updated by someone else.",
                    "latest": latest,
                });
                return (StatusCode::CONFLICT, Json(body)).into_response();
            }
            Self::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                format!("missing {USER_HEADER} header"),
            ),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            Self::Internal(msg) => {
                tracing::error!(error = %msg, "request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };
        (status, Json(serde_json::json!({"error": message}))).into_response()
    }
}

fn parse_task_id(raw: &str) -> Result<TaskId, ApiError> {
    TaskId::from_str(raw).map_err(|_| ApiError::BadRequest(format!("invalid task id: {raw}")))
}

// ── Router ────────────────────────────────────────────────────────────

/// Builds the `/api` routes and `/health`.
pub fn api_router() -> Router<SharedState> {
    Router::new()
        .route(
            "/api/boards/{board_id}/tasks",
            get(list_tasks).post(create_task),
        )
        .route("/api/boards/{board_id}/actions", get(action_feed))
        .route("/api/boards/{board_id}/users", get(board_users))
        .route("/api/tasks/{task_id}", put(update_task).delete(delete_task))
        .route("/api/tasks/{task_id}/smart-assign", post(smart_assign))
        .route("/health", get(health_check))
}

// ── Handlers ──────────────────────────────────────────────────────────

async fn health_check() -> &'static str {
    "ok"
}

async fn list_tasks(
    State(state): State<SharedState>,
    AuthUser(_user): AuthUser,
    Path(board_id): Path<String>,
    Query(query): Query<ListTasksQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let status = query
        .status
        .as_deref()
        .map(TaskStatus::from_str)
        .transpose()
        .map_err(ApiError::BadRequest)?;
    let filter = TaskFilter {
        status,
        assigned_user: query.assigned_user,
    };
    let tasks = state.service.list(&board_id, &filter).await?;
    Ok(Json(tasks))
}

async fn create_task(
    State(state): State<SharedState>,
    AuthUser(user): AuthUser,
    Path(board_id): Path<String>,
    Json(req): Json<CreateTaskRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let task = state
        .service
        .create(
            &user,
            &board_id,
            &req.title,
            req.description,
            req.priority.unwrap_or_default(),
        )
        .await?;
    Ok((StatusCode::CREATED, Json(task)))
}

async fn update_task(
    State(state): State<SharedState>,
    AuthUser(user): AuthUser,
    Path(task_id): Path<String>,
    Json(req): Json<UpdateTaskRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let task_id = parse_task_id(&task_id)?;
    let task = state
        .service
        .update(&user, &task_id, req.patch, req.last_edited)
        .await?;
    Ok(Json(task))
}

async fn smart_assign(
    State(state): State<SharedState>,
    AuthUser(user): AuthUser,
    Path(task_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let task_id = parse_task_id(&task_id)?;
    let task = state.service.smart_assign(&user, &task_id).await?;
    Ok(Json(task))
}

async fn delete_task(
    State(state): State<SharedState>,
    AuthUser(user): AuthUser,
    Path(task_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let task_id = parse_task_id(&task_id)?;
    let deleted = state.service.delete(&user, &task_id).await?;
    Ok(Json(serde_json::json!({"deleted": deleted.id})))
}

async fn action_feed(
    State(state): State<SharedState>,
    AuthUser(_user): AuthUser,
    Path(board_id): Path<String>,
    Query(query): Query<FeedQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let limit = query
        .limit
        .unwrap_or(state.feed_limit)
        .min(state.max_feed_limit);
    let feed = state.service.feed(&board_id, limit).await?;
    Ok(Json(feed))
}

async fn board_users(
    State(state): State<SharedState>,
    AuthUser(_user): AuthUser,
    Path(board_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let users = state.service.board_users(&board_id).await?;
    Ok(Json(users))
}
