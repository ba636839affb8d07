//! Service tests against a real PostgreSQL instance. They need Docker, so run
//! them with `cargo test -- --ignored`.

use sea_orm::{DatabaseConnection, EntityTrait, PaginatorTrait};
use testcontainers_modules::{postgres, testcontainers};
use todo_graph_server::entities::todo_dependency;
use todo_graph_server::todo::{NewTodo, TodoService, TodoServiceError};

mod common;

pub struct TestContext {
    #[allow(dead_code)] // container is kept to ensure it's not dropped
    pub container: testcontainers::ContainerAsync<postgres::Postgres>,
    pub db: DatabaseConnection,
}

async fn setup() -> anyhow::Result<TestContext> {
    // Allow multiple calls to init for tests.
    let _ = tracing_subscriber::fmt().try_init();
    let container = common::setup_container().await?;
    let db = common::setup_db(&container).await?;
    Ok(TestContext { db, container })
}

fn new_todo(title: &str, dependencies: Vec<u32>) -> NewTodo {
    NewTodo {
        title: title.to_string(),
        dependencies,
        ..Default::default()
    }
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn can_create_and_delete_todos_on_postgres() {
    let state = setup().await.expect("Failed to setup test context");
    let todo_service = TodoService::new(&state.db);
    let a = todo_service.create_todo(new_todo("A", vec![])).await.unwrap();
    let b = todo_service
        .create_todo(new_todo("B", vec![a.todo().id()]))
        .await
        .unwrap();

    assert_eq!(b.dependencies()[0].other().title(), "A");

    todo_service.delete_todo_by_id(a.todo().id()).await.unwrap();

    assert_eq!(
        todo_dependency::Entity::find().count(&state.db).await.unwrap(),
        0
    );
    let remaining = todo_service.get_all_todos().await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert!(remaining[0].dependencies().is_empty());
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn cannot_create_todo_with_unknown_dependency_on_postgres() {
    let state = setup().await.expect("Failed to setup test context");
    let todo_service = TodoService::new(&state.db);

    let result = todo_service.create_todo(new_todo("Orphan", vec![7])).await;

    assert!(matches!(result, Err(TodoServiceError::UnknownDependency(7))));
    assert!(todo_service.get_all_todos().await.unwrap().is_empty());
}
