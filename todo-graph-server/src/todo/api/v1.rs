use crate::todo::{
    DependencyLink, NewTodo, Todo, TodoService, TodoServiceError, TodoState, TodoWithDependencies,
    parse_due_date,
};
use crate::web::api::ErrorResponse;
use axum::{
    Router,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
    response::Json,
    routing::{delete, get},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use todo_graph::Schedule;
use utoipa::ToSchema;

type ApiError = (StatusCode, Json<ErrorResponse>);

/// JSON representation of a Todo without its edges.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TodoJson {
    /// Unique identifier for the todo
    id: u32,
    title: String,
    due_date: Option<DateTime<Utc>>,
    image_url: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<&Todo> for TodoJson {
    fn from(todo: &Todo) -> Self {
        Self {
            id: todo.id(),
            title: todo.title().to_string(),
            due_date: todo.due_date(),
            image_url: todo.image_url().map(str::to_string),
            created_at: todo.created_at(),
        }
    }
}

/// An edge to a todo this one depends on.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DependencyJson {
    id: u32,
    todo_id: u32,
    depends_on_id: u32,
    /// The todo that must happen first
    depends_on: TodoJson,
}

impl From<&DependencyLink> for DependencyJson {
    fn from(link: &DependencyLink) -> Self {
        Self {
            id: link.id(),
            todo_id: link.todo_id(),
            depends_on_id: link.depends_on_id(),
            depends_on: TodoJson::from(link.other()),
        }
    }
}

/// An edge from a todo that depends on this one.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DependentJson {
    id: u32,
    todo_id: u32,
    depends_on_id: u32,
    /// The dependent todo
    todo: TodoJson,
}

impl From<&DependencyLink> for DependentJson {
    fn from(link: &DependencyLink) -> Self {
        Self {
            id: link.id(),
            todo_id: link.todo_id(),
            depends_on_id: link.depends_on_id(),
            todo: TodoJson::from(link.other()),
        }
    }
}

/// JSON representation of a Todo with its edges in both directions.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TodoRecordJson {
    id: u32,
    title: String,
    due_date: Option<DateTime<Utc>>,
    image_url: Option<String>,
    created_at: DateTime<Utc>,
    /// Todos this one depends on
    my_dependencies: Vec<DependencyJson>,
    /// Todos that depend on this one
    depends_on_me: Vec<DependentJson>,
}

impl From<&TodoWithDependencies> for TodoRecordJson {
    fn from(record: &TodoWithDependencies) -> Self {
        let todo = record.todo();
        Self {
            id: todo.id(),
            title: todo.title().to_string(),
            due_date: todo.due_date(),
            image_url: todo.image_url().map(str::to_string),
            created_at: todo.created_at(),
            my_dependencies: record
                .dependencies()
                .iter()
                .map(DependencyJson::from)
                .collect(),
            depends_on_me: record.dependents().iter().map(DependentJson::from).collect(),
        }
    }
}

/// Request body for creating a todo.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateTodoRequest {
    #[serde(default)]
    title: Option<String>,
    /// RFC 3339 datetime, or an ISO datetime or date without offset taken as UTC
    #[serde(default)]
    due_date: Option<String>,
    /// IDs of the todos the new one depends on
    #[serde(default)]
    dependencies: Option<Vec<u32>>,
    #[serde(default)]
    image_url: Option<String>,
}

/// Topological order of all todos and their earliest start times.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleJson {
    order: Vec<u32>,
    /// The order rendered as `1 -> 2 -> 3`
    critical_path: String,
    earliest_start: BTreeMap<u32, DateTime<Utc>>,
}

impl From<&Schedule> for ScheduleJson {
    fn from(schedule: &Schedule) -> Self {
        Self {
            order: schedule.order().iter().map(|id| id.get()).collect(),
            critical_path: schedule.critical_path(),
            earliest_start: schedule
                .order()
                .iter()
                .filter_map(|id| schedule.earliest_start(*id).map(|start| (id.get(), start)))
                .collect(),
        }
    }
}

fn error_response(status: StatusCode, message: impl Into<String>) -> ApiError {
    (status, Json(ErrorResponse::new(message.into())))
}

/// Handler for GET /api/v1/todos - Returns all todos with their edges, newest first.
#[tracing::instrument(skip(state))]
#[utoipa::path(
    get,
    path = "/api/v1/todos",
    responses(
        (status = 200, description = "Successfully retrieved todos", body = [TodoRecordJson]),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "Todos"
)]
pub async fn get_todos_handler(
    State(state): State<Arc<TodoState>>,
) -> Result<Json<Vec<TodoRecordJson>>, ApiError> {
    let service = TodoService::new(&state.db);

    match service.get_all_todos().await {
        Ok(todos) => Ok(Json(todos.iter().map(TodoRecordJson::from).collect())),
        Err(err) => {
            tracing::error!("Failed to get todos: {}", err);
            Err(error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Error fetching todos",
            ))
        }
    }
}

/// Handler for POST /api/v1/todos - Creates a todo with its dependency edges.
#[tracing::instrument(skip(state))]
#[utoipa::path(
    post,
    path = "/api/v1/todos",
    request_body = CreateTodoRequest,
    responses(
        (status = 201, description = "Todo created", body = TodoRecordJson),
        (status = 400, description = "Malformed body, missing title, invalid due date or unknown dependency", body = ErrorResponse),
        (status = 422, description = "Dependencies would create a cycle", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "Todos"
)]
pub async fn create_todo_handler(
    State(state): State<Arc<TodoState>>,
    payload: Result<Json<CreateTodoRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<TodoRecordJson>), ApiError> {
    let Json(request) = payload.map_err(|rejection| {
        tracing::warn!("Rejected todo request body: {}", rejection.body_text());
        error_response(rejection.status(), "Invalid request body")
    })?;
    let title = request.title.unwrap_or_default();
    if title.trim().is_empty() {
        return Err(error_response(StatusCode::BAD_REQUEST, "Title is required"));
    }
    let due_date = parse_due_date(request.due_date.as_deref().unwrap_or_default())
        .map_err(|_| error_response(StatusCode::BAD_REQUEST, "Invalid due date"))?;

    let new_todo = NewTodo {
        title,
        due_date,
        dependencies: request.dependencies.unwrap_or_default(),
        image_url: request.image_url.filter(|url| !url.is_empty()),
    };

    let service = TodoService::new(&state.db);
    match service.create_todo(new_todo).await {
        Ok(created) => Ok((StatusCode::CREATED, Json(TodoRecordJson::from(&created)))),
        Err(TodoServiceError::EmptyTitle) => {
            Err(error_response(StatusCode::BAD_REQUEST, "Title is required"))
        }
        Err(TodoServiceError::UnknownDependency(id)) => Err(error_response(
            StatusCode::BAD_REQUEST,
            format!("Unknown dependency {}", id),
        )),
        Err(TodoServiceError::CircularDependency) => Err(error_response(
            StatusCode::UNPROCESSABLE_ENTITY,
            "Circular dependency detected",
        )),
        Err(err) => {
            tracing::error!("Failed to create todo: {}", err);
            Err(error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Error creating todo",
            ))
        }
    }
}

/// Handler for DELETE /api/v1/todos/{id} - Deletes a todo and its edges.
#[tracing::instrument(skip(state))]
#[utoipa::path(
    delete,
    path = "/api/v1/todos/{id}",
    params(
        ("id" = u32, Path, description = "ID of the todo to delete")
    ),
    responses(
        (status = 204, description = "Todo deleted"),
        (status = 404, description = "Todo not found", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "Todos"
)]
pub async fn delete_todo_handler(
    State(state): State<Arc<TodoState>>,
    Path(id): Path<u32>,
) -> Result<StatusCode, ApiError> {
    let service = TodoService::new(&state.db);

    match service.delete_todo_by_id(id).await {
        Ok(_) => Ok(StatusCode::NO_CONTENT),
        Err(TodoServiceError::TodoNotFound(_)) => {
            Err(error_response(StatusCode::NOT_FOUND, "Todo not found"))
        }
        Err(err) => {
            tracing::error!("Failed to delete todo {}: {}", id, err);
            Err(error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Error deleting todo",
            ))
        }
    }
}

/// Handler for GET /api/v1/todos/schedule - Returns the critical path and earliest starts.
#[tracing::instrument(skip(state))]
#[utoipa::path(
    get,
    path = "/api/v1/todos/schedule",
    responses(
        (status = 200, description = "Schedule of all todos", body = ScheduleJson),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "Todos"
)]
pub async fn get_schedule_handler(
    State(state): State<Arc<TodoState>>,
) -> Result<Json<ScheduleJson>, ApiError> {
    let service = TodoService::new(&state.db);

    let graph = service.get_dependency_graph().await.map_err(|err| {
        tracing::error!("Failed to load dependency graph: {}", err);
        error_response(StatusCode::INTERNAL_SERVER_ERROR, "Error fetching todos")
    })?;

    match Schedule::compute(&graph) {
        Ok(schedule) => Ok(Json(ScheduleJson::from(&schedule))),
        Err(err) => {
            tracing::error!("Stored dependency graph is invalid: {}", err);
            Err(error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Dependency graph contains a cycle",
            ))
        }
    }
}

/// Creates and returns the todos API router.
pub fn create_api_router(state: Arc<TodoState>) -> Router {
    Router::new()
        .route("/todos", get(get_todos_handler).post(create_todo_handler))
        .route("/todos/schedule", get(get_schedule_handler))
        .route("/todos/{id}", delete(delete_todo_handler))
        .with_state(state)
}
