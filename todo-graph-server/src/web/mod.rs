use axum::Router;
use axum::http::HeaderName;
use migration::MigratorTrait;
use sea_orm::Database;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::image_search;
use crate::todo::{TodoState, create_todo_router};

pub mod api;

/// Assembles the page routes, the JSON API and the health check.
pub fn create_app(todo_state: TodoState) -> Router {
    let todo_state = Arc::new(todo_state);

    Router::new()
        .route("/health", axum::routing::get(health_check_handler))
        .merge(create_todo_router(todo_state.clone()))
        .merge(api::create_api_router(todo_state))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::new().expose_headers([
                    HeaderName::from_static("hx-retarget"),
                    HeaderName::from_static("hx-reswap"),
                ])),
        )
}

#[tracing::instrument(skip(config))]
pub async fn start_web_server(config: Config) -> anyhow::Result<()> {
    let server_address = format!("0.0.0.0:{}", &config.port);
    let listener = tokio::net::TcpListener::bind(&server_address).await?;
    tracing::info!("Web server running on http://{}", server_address);

    let db = Database::connect(&config.db_url).await?;
    migration::Migrator::up(&db, None).await?;
    tracing::info!("Database migrations applied successfully");

    let todo_state = TodoState {
        db: Arc::new(db),
        image_search: Arc::from(image_search::from_config(&config)),
    };

    axum::serve(listener, create_app(todo_state)).await?;
    Ok(())
}

#[tracing::instrument]
pub async fn health_check_handler() -> &'static str {
    "OK"
}
