use askama::Template;
use axum::{
    Router,
    extract::{Path, State},
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::Html,
    routing::{delete, get, post},
};
use axum_extra::extract::Form;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use todo_graph::{GraphError, Schedule, TodoId};

use crate::todo::{
    InvalidDueDate, NewTodo, TodoService, TodoServiceError, TodoState, TodoWithDependencies,
    dependency_graph, parse_due_date,
};

/// Nodes per row in the rendered dependency graph.
const GRAPH_COLUMNS: usize = 5;
const GRAPH_SPACING: u32 = 100;
const GRAPH_MARGIN: u32 = 50;

#[derive(Debug, Deserialize)]
pub struct CreateTodoForm {
    #[serde(default)]
    title: String,
    #[serde(default)]
    due_date: String,
    #[serde(default)]
    dependencies: Vec<u32>,
}

/// Custom error type for todo page handlers.
#[derive(Debug, thiserror::Error)]
enum TodoWebError {
    /// Represents an error during template rendering.
    #[error("Template rendering failed")]
    Template(#[from] askama::Error),
    #[error("Todo service error: {0}")]
    Service(#[from] TodoServiceError),
    /// The submitted dependencies failed the pre-insert graph check.
    #[error("Dependency check failed: {0}")]
    Graph(#[from] GraphError),
    #[error(transparent)]
    InvalidDueDate(#[from] InvalidDueDate),
}

impl TodoWebError {
    fn status_and_message(&self) -> (StatusCode, String) {
        match self {
            TodoWebError::Service(TodoServiceError::EmptyTitle) => {
                (StatusCode::BAD_REQUEST, "Title is required.".to_string())
            }
            TodoWebError::InvalidDueDate(_) => {
                (StatusCode::BAD_REQUEST, "Invalid due date.".to_string())
            }
            TodoWebError::Service(TodoServiceError::UnknownDependency(id)) => (
                StatusCode::BAD_REQUEST,
                format!("Unknown dependency {}.", id),
            ),
            TodoWebError::Graph(GraphError::UnknownDependency(id)) => (
                StatusCode::BAD_REQUEST,
                format!("Unknown dependency {}.", id),
            ),
            TodoWebError::Service(TodoServiceError::CircularDependency)
            | TodoWebError::Graph(GraphError::CycleDetected { .. }) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "Circular dependency detected.".to_string(),
            ),
            TodoWebError::Service(TodoServiceError::TodoNotFound(_)) => {
                (StatusCode::NOT_FOUND, "Todo not found.".to_string())
            }
            _ => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "An unexpected error occurred while processing your request. Please try again later."
                    .to_string(),
            ),
        }
    }
}

impl axum::response::IntoResponse for TodoWebError {
    fn into_response(self) -> axum::response::Response {
        let (status_code, user_facing_error_message) = self.status_and_message();
        if status_code.is_server_error() {
            tracing::error!("Todo page request failed: {}", self);
        }

        let error_template = ErrorMessageTemplate::new(user_facing_error_message);
        let Ok(rendered) = error_template.render() else {
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        };

        let mut response = (status_code, Html(rendered)).into_response();
        // Point HTMX at the error slot instead of the board
        let mut headers = HeaderMap::new();
        headers.insert(
            HeaderName::from_static("hx-retarget"),
            HeaderValue::from_static("#error"),
        );
        headers.insert(
            HeaderName::from_static("hx-reswap"),
            HeaderValue::from_static("innerHTML"),
        );
        response.headers_mut().extend(headers);
        response
    }
}

#[derive(Debug)]
struct TodoView {
    id: u32,
    title: String,
    due_date: Option<String>,
    overdue: bool,
    image_url: Option<String>,
    dependencies: Vec<String>,
    dependents: Vec<String>,
    earliest_start: Option<String>,
}

#[derive(Debug, PartialEq)]
struct NodeView {
    id: u32,
    title: String,
    x: u32,
    y: u32,
}

#[derive(Debug, PartialEq)]
struct EdgeView {
    x1: u32,
    y1: u32,
    x2: u32,
    y2: u32,
}

#[derive(Debug)]
struct GraphView {
    width: u32,
    height: u32,
    nodes: Vec<NodeView>,
    edges: Vec<EdgeView>,
}

/// Everything the board fragment shows.
#[derive(Debug)]
struct BoardView {
    todos: Vec<TodoView>,
    critical_path: Option<String>,
    graph: GraphView,
}

fn display_time(time: DateTime<Utc>) -> String {
    time.format("%Y-%m-%d %H:%M UTC").to_string()
}

fn node_position(index: usize) -> (u32, u32) {
    let column = (index % GRAPH_COLUMNS) as u32;
    let row = (index / GRAPH_COLUMNS) as u32;
    (
        GRAPH_MARGIN + column * GRAPH_SPACING,
        GRAPH_MARGIN + row * GRAPH_SPACING,
    )
}

impl GraphView {
    fn new(todos: &[TodoWithDependencies]) -> Self {
        let positions: HashMap<u32, (u32, u32)> = todos
            .iter()
            .enumerate()
            .map(|(index, todo)| (todo.todo().id(), node_position(index)))
            .collect();

        let nodes = todos
            .iter()
            .enumerate()
            .map(|(index, todo)| {
                let (x, y) = node_position(index);
                NodeView {
                    id: todo.todo().id(),
                    title: todo.todo().title().to_string(),
                    x,
                    y,
                }
            })
            .collect();

        let edges = todos
            .iter()
            .flat_map(|todo| todo.dependencies())
            .filter_map(|link| {
                let (x1, y1) = *positions.get(&link.depends_on_id())?;
                let (x2, y2) = *positions.get(&link.todo_id())?;
                Some(EdgeView { x1, y1, x2, y2 })
            })
            .collect();

        let rows = todos.len().div_ceil(GRAPH_COLUMNS).max(1) as u32;
        Self {
            width: GRAPH_COLUMNS as u32 * GRAPH_SPACING,
            height: rows * GRAPH_SPACING,
            nodes,
            edges,
        }
    }
}

impl BoardView {
    fn new(todos: &[TodoWithDependencies], now: DateTime<Utc>) -> Self {
        let graph = dependency_graph(todos);
        let schedule = match Schedule::compute(&graph) {
            Ok(schedule) => Some(schedule),
            Err(err) => {
                tracing::warn!("Cannot schedule todos: {}", err);
                None
            }
        };

        let todo_views = todos
            .iter()
            .map(|record| {
                let todo = record.todo();
                let earliest_start = todo.due_date().and_then(|_| {
                    schedule
                        .as_ref()?
                        .earliest_start(TodoId::new(todo.id()))
                        .map(display_time)
                });
                TodoView {
                    id: todo.id(),
                    title: todo.title().to_string(),
                    due_date: todo.due_date().map(display_time),
                    overdue: todo.due_date().is_some_and(|due| due < now),
                    image_url: todo.image_url().map(str::to_string),
                    dependencies: record
                        .dependencies()
                        .iter()
                        .map(|link| link.other().title().to_string())
                        .collect(),
                    dependents: record
                        .dependents()
                        .iter()
                        .map(|link| link.other().title().to_string())
                        .collect(),
                    earliest_start,
                }
            })
            .collect();

        Self {
            todos: todo_views,
            critical_path: schedule.map(|schedule| schedule.critical_path()),
            graph: GraphView::new(todos),
        }
    }
}

#[derive(Template)]
#[template(path = "index.html")]
struct IndexTemplate {
    board: BoardView,
}

impl IndexTemplate {
    pub fn new(board: BoardView) -> Self {
        Self { board }
    }
}

#[derive(Template)]
#[template(path = "todos/board.html")]
struct BoardTemplate {
    board: BoardView,
}

impl BoardTemplate {
    pub fn new(board: BoardView) -> Self {
        Self { board }
    }
}

#[derive(Template)]
#[template(path = "todos/error_message.html")]
struct ErrorMessageTemplate {
    message: String,
}

impl ErrorMessageTemplate {
    pub fn new(message: String) -> Self {
        Self { message }
    }
}

/// Fetches every todo and renders the board fragment.
#[tracing::instrument(skip(todo_service))]
async fn render_board(todo_service: &TodoService<'_>) -> Result<Html<String>, TodoWebError> {
    let todos = todo_service.get_all_todos().await?;
    let template = BoardTemplate::new(BoardView::new(&todos, Utc::now()));
    template.render().map(Html).map_err(TodoWebError::from)
}

/// Handler for the page with the add form and the board.
#[tracing::instrument(skip(state))]
async fn index_handler(State(state): State<Arc<TodoState>>) -> Result<Html<String>, TodoWebError> {
    let todo_service = TodoService::new(&state.db);
    let todos = todo_service.get_all_todos().await?;
    let template = IndexTemplate::new(BoardView::new(&todos, Utc::now()));
    template.render().map(Html).map_err(TodoWebError::from)
}

/// Handler for refreshing the board fragment.
#[tracing::instrument(skip(state))]
async fn board_handler(State(state): State<Arc<TodoState>>) -> Result<Html<String>, TodoWebError> {
    let todo_service = TodoService::new(&state.db);
    render_board(&todo_service).await
}

/// Handler for creating a todo from the add form.
///
/// The dependency graph is rebuilt from a fresh fetch and checked before the
/// image lookup, so a rejected todo costs no outbound request.
#[tracing::instrument(skip(state))]
async fn create_todo_handler(
    State(state): State<Arc<TodoState>>,
    Form(form): Form<CreateTodoForm>,
) -> Result<Html<String>, TodoWebError> {
    if form.title.trim().is_empty() {
        return Err(TodoServiceError::EmptyTitle.into());
    }
    let due_date = parse_due_date(&form.due_date)?;

    let todo_service = TodoService::new(&state.db);
    let todos = todo_service.get_all_todos().await?;
    let dependencies: Vec<TodoId> = form.dependencies.iter().copied().map(TodoId::new).collect();
    dependency_graph(&todos).check_insert(&dependencies)?;

    let image_url = match state.image_search.find_image(&form.title).await {
        Ok(image_url) => image_url,
        Err(err) => {
            tracing::warn!("Image lookup for '{}' failed: {}", form.title, err);
            None
        }
    };

    todo_service
        .create_todo(NewTodo {
            title: form.title,
            due_date,
            dependencies: form.dependencies,
            image_url,
        })
        .await?;

    render_board(&todo_service).await
}

/// Handler for deleting a todo from the board.
#[tracing::instrument(skip(state))]
async fn delete_todo_handler(
    State(state): State<Arc<TodoState>>,
    Path(id): Path<u32>,
) -> Result<Html<String>, TodoWebError> {
    let todo_service = TodoService::new(&state.db);
    todo_service.delete_todo_by_id(id).await?;
    render_board(&todo_service).await
}

/// Creates and returns the todo page router.
pub fn create_todo_router(state: Arc<TodoState>) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/todos", post(create_todo_handler))
        .route("/todos/board", get(board_handler))
        .route("/todos/{id}", delete(delete_todo_handler))
        .with_state(state)
}
