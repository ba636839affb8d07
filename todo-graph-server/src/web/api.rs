use std::sync::Arc;

use axum::{Json, Router, routing::get};
use serde::{Deserialize, Serialize};
use utoipa::{OpenApi, ToSchema};

use crate::todo::TodoState;
use crate::todo::api::v1;

/// Error body returned by every JSON endpoint.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    /// Human readable error message
    error: String,
}

impl ErrorResponse {
    pub fn new(error: String) -> Self {
        Self { error }
    }

    pub fn error(&self) -> &str {
        &self.error
    }
}

#[derive(OpenApi)]
#[openapi(
    info(title = "Todo Graph API", description = "Todos with dependencies and their schedule"),
    paths(
        v1::get_todos_handler,
        v1::create_todo_handler,
        v1::delete_todo_handler,
        v1::get_schedule_handler,
    ),
    components(schemas(
        v1::TodoJson,
        v1::TodoRecordJson,
        v1::DependencyJson,
        v1::DependentJson,
        v1::CreateTodoRequest,
        v1::ScheduleJson,
        ErrorResponse,
    )),
    tags((name = "Todos", description = "Todo and dependency management"))
)]
pub struct ApiDoc;

async fn openapi_handler() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

/// Creates the API routes for JSON API endpoints.
pub fn create_api_router(todo_state: Arc<TodoState>) -> Router {
    Router::new()
        .nest("/api/v1", v1::create_api_router(todo_state))
        .route("/api-docs/openapi.json", get(openapi_handler))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn can_serialize_error_response() {
        let response = ErrorResponse::new("Todo not found".to_string());

        assert_eq!(response.error(), "Todo not found");
        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            serde_json::json!({ "error": "Todo not found" })
        );
    }

    #[test]
    fn can_document_every_todo_endpoint() {
        let doc = ApiDoc::openapi();

        let paths: Vec<&str> = doc.paths.paths.keys().map(String::as_str).collect();
        assert_eq!(
            paths,
            vec![
                "/api/v1/todos",
                "/api/v1/todos/schedule",
                "/api/v1/todos/{id}"
            ]
        );
    }
}
