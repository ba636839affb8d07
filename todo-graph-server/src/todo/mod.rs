use crate::entities::*;
use crate::image_search::ImageSearch;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use sea_orm::*;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use todo_graph::{DependencyGraph, GraphError, TodoId, TodoNode};

pub mod api;
pub mod web;

pub use web::create_todo_router;

#[derive(Debug, PartialEq, Clone, Eq)]
pub struct Todo {
    id: u32,
    title: String,
    due_date: Option<DateTime<Utc>>,
    image_url: Option<String>,
    created_at: DateTime<Utc>,
}

impl Todo {
    pub fn new(
        id: u32,
        title: String,
        due_date: Option<DateTime<Utc>>,
        image_url: Option<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            title,
            due_date,
            image_url,
            created_at,
        }
    }

    /// Returns the ID of the todo.
    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn due_date(&self) -> Option<DateTime<Utc>> {
        self.due_date
    }

    pub fn image_url(&self) -> Option<&str> {
        self.image_url.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

impl From<todo::Model> for Todo {
    fn from(model: todo::Model) -> Self {
        Todo::new(
            model.id as u32,
            model.title,
            model.due_date.map(|due| due.with_timezone(&Utc)),
            model.image_url,
            model.created_at.with_timezone(&Utc),
        )
    }
}

/// A dependency edge seen from one of its ends.
///
/// `other` is the todo at the far end: the depended-on todo when listed under
/// a todo's dependencies, the dependent todo when listed under its dependents.
#[derive(Debug, PartialEq, Clone, Eq)]
pub struct DependencyLink {
    id: u32,
    todo_id: u32,
    depends_on_id: u32,
    other: Todo,
}

impl DependencyLink {
    pub fn new(id: u32, todo_id: u32, depends_on_id: u32, other: Todo) -> Self {
        Self {
            id,
            todo_id,
            depends_on_id,
            other,
        }
    }

    /// Returns the ID of the edge.
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Returns the ID of the dependent todo.
    pub fn todo_id(&self) -> u32 {
        self.todo_id
    }

    /// Returns the ID of the todo that must happen first.
    pub fn depends_on_id(&self) -> u32 {
        self.depends_on_id
    }

    pub fn other(&self) -> &Todo {
        &self.other
    }
}

/// A todo together with its edges in both directions.
#[derive(Debug, PartialEq, Clone, Eq)]
pub struct TodoWithDependencies {
    todo: Todo,
    dependencies: Vec<DependencyLink>,
    dependents: Vec<DependencyLink>,
}

impl TodoWithDependencies {
    pub fn todo(&self) -> &Todo {
        &self.todo
    }

    /// Edges to the todos this one depends on.
    pub fn dependencies(&self) -> &[DependencyLink] {
        &self.dependencies
    }

    /// Edges to the todos that depend on this one.
    pub fn dependents(&self) -> &[DependencyLink] {
        &self.dependents
    }
}

impl From<&TodoWithDependencies> for TodoNode {
    fn from(todo: &TodoWithDependencies) -> Self {
        TodoNode::new(
            TodoId::new(todo.todo.id),
            todo.todo.due_date,
            todo.dependencies
                .iter()
                .map(|link| TodoId::new(link.depends_on_id))
                .collect(),
        )
    }
}

/// Builds the dependency graph for a fetched todo list.
pub fn dependency_graph(todos: &[TodoWithDependencies]) -> DependencyGraph {
    let nodes: Vec<TodoNode> = todos.iter().map(TodoNode::from).collect();
    DependencyGraph::build(&nodes)
}

/// Input for creating a todo.
#[derive(Debug, Clone, Default)]
pub struct NewTodo {
    pub title: String,
    pub due_date: Option<DateTime<Utc>>,
    pub dependencies: Vec<u32>,
    pub image_url: Option<String>,
}

/// Error type for TodoService operations.
#[derive(Debug, thiserror::Error)]
pub enum TodoServiceError {
    /// The title is empty or only whitespace.
    #[error("Title is required")]
    EmptyTitle,
    /// A requested dependency does not exist.
    #[error("Unknown dependency {0}")]
    UnknownDependency(u32),
    /// The dependencies would make the graph cyclic, or it already is.
    #[error("Circular dependency detected")]
    CircularDependency,
    /// Represents a todo not found error.
    #[error("Todo with ID {0} not found")]
    TodoNotFound(u32),
    /// Represents a database error.
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),
}

impl From<GraphError> for TodoServiceError {
    fn from(err: GraphError) -> Self {
        match err {
            GraphError::UnknownDependency(id) => TodoServiceError::UnknownDependency(id.get()),
            GraphError::CycleDetected { .. } => TodoServiceError::CircularDependency,
        }
    }
}

/// A due date that is neither RFC 3339, a `YYYY-MM-DDTHH:MM[:SS[.fff]]`
/// datetime nor a `YYYY-MM-DD` date.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
#[error("Invalid due date '{0}'")]
pub struct InvalidDueDate(pub String);

/// Parses a submitted due date. Datetimes without an offset are taken as UTC,
/// bare dates as midnight UTC; an empty string means no due date.
pub fn parse_due_date(raw: &str) -> Result<Option<DateTime<Utc>>, InvalidDueDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Ok(Some(parsed.with_timezone(&Utc)));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .map(|date| date.and_time(NaiveTime::MIN))
        })
        .map(|naive| Some(naive.and_utc()))
        .ok_or_else(|| InvalidDueDate(raw.to_string()))
}

#[derive(Clone)]
pub struct TodoState {
    pub db: Arc<sea_orm::DatabaseConnection>,
    pub image_search: Arc<dyn ImageSearch>,
}

pub struct TodoService<'a> {
    db: &'a sea_orm::DatabaseConnection,
}

impl TodoService<'_> {
    pub fn new(db: &sea_orm::DatabaseConnection) -> TodoService<'_> {
        TodoService { db }
    }

    /// Retrieves all todos with their edges, newest first.
    ///
    /// # Returns
    ///
    /// A `Result` containing the todos ordered by creation time descending, or an error.
    #[tracing::instrument(skip(self))]
    pub async fn get_all_todos(&self) -> Result<Vec<TodoWithDependencies>, TodoServiceError> {
        let todos = todo::Entity::find()
            .order_by_desc(todo::Column::CreatedAt)
            .order_by_desc(todo::Column::Id)
            .all(self.db)
            .await?;
        let edges = todo_dependency::Entity::find()
            .order_by_asc(todo_dependency::Column::Id)
            .all(self.db)
            .await?;
        Ok(attach_edges(todos, edges))
    }

    /// Retrieves a todo and its edges by its ID.
    ///
    /// # Arguments
    ///
    /// * `id` - The ID of the todo to retrieve.
    #[tracing::instrument(skip(self))]
    pub async fn get_todo_by_id(&self, id: u32) -> Result<TodoWithDependencies, TodoServiceError> {
        let model = todo::Entity::find_by_id(id as i32)
            .one(self.db)
            .await?
            .ok_or(TodoServiceError::TodoNotFound(id))?;

        let edges = todo_dependency::Entity::find()
            .filter(
                Condition::any()
                    .add(todo_dependency::Column::TodoId.eq(model.id))
                    .add(todo_dependency::Column::DependsOnId.eq(model.id)),
            )
            .order_by_asc(todo_dependency::Column::Id)
            .all(self.db)
            .await?;

        let linked_ids: BTreeSet<i32> = edges
            .iter()
            .flat_map(|edge| [edge.todo_id, edge.depends_on_id])
            .filter(|linked| *linked != model.id)
            .collect();
        let mut todos = vec![model];
        if !linked_ids.is_empty() {
            todos.extend(
                todo::Entity::find()
                    .filter(todo::Column::Id.is_in(linked_ids))
                    .all(self.db)
                    .await?,
            );
        }

        attach_edges(todos, edges)
            .into_iter()
            .find(|todo| todo.todo.id == id)
            .ok_or(TodoServiceError::TodoNotFound(id))
    }

    /// Creates a todo and its dependency edges.
    ///
    /// The dependency graph is loaded and checked inside the same transaction
    /// as the inserts, so nothing is written when the title is empty, a
    /// dependency is unknown or the edges would close a cycle.
    ///
    /// # Arguments
    ///
    /// * `new_todo` - Title, optional due date, dependency IDs and optional image URL.
    ///
    /// # Returns
    ///
    /// A `Result` containing the created todo with its edges, or an error.
    #[tracing::instrument(skip(self))]
    pub async fn create_todo(
        &self,
        new_todo: NewTodo,
    ) -> Result<TodoWithDependencies, TodoServiceError> {
        if new_todo.title.trim().is_empty() {
            return Err(TodoServiceError::EmptyTitle);
        }

        let dependencies: Vec<TodoId> = new_todo
            .dependencies
            .iter()
            .copied()
            .collect::<BTreeSet<u32>>()
            .into_iter()
            .map(TodoId::new)
            .collect();

        let txn = self.db.begin().await?;
        let graph = load_graph(&txn).await?;
        graph.check_insert(&dependencies)?;

        let active_model = todo::ActiveModel {
            title: ActiveValue::Set(new_todo.title),
            due_date: ActiveValue::Set(new_todo.due_date.map(|due| due.fixed_offset())),
            image_url: ActiveValue::Set(new_todo.image_url),
            created_at: ActiveValue::Set(Utc::now().fixed_offset()),
            ..Default::default()
        };
        let created_model = active_model.insert(&txn).await?;

        if !dependencies.is_empty() {
            let edges = dependencies
                .iter()
                .map(|dependency| todo_dependency::ActiveModel {
                    todo_id: ActiveValue::Set(created_model.id),
                    depends_on_id: ActiveValue::Set(dependency.get() as i32),
                    ..Default::default()
                });
            todo_dependency::Entity::insert_many(edges).exec(&txn).await?;
        }
        txn.commit().await?;

        tracing::info!(
            "Created todo {} with {} dependencies",
            created_model.id,
            dependencies.len()
        );
        self.get_todo_by_id(created_model.id as u32).await
    }

    /// Deletes a todo and every edge touching it.
    ///
    /// # Arguments
    ///
    /// * `id` - The ID of the todo to delete.
    ///
    /// # Returns
    ///
    /// A `Result` containing the deleted `Todo` if successful, or an error otherwise.
    #[tracing::instrument(skip(self))]
    pub async fn delete_todo_by_id(&self, id: u32) -> Result<Todo, TodoServiceError> {
        let txn = self.db.begin().await?;
        let todo_to_delete = todo::Entity::find_by_id(id as i32)
            .one(&txn)
            .await?
            .ok_or(TodoServiceError::TodoNotFound(id))?;

        todo_dependency::Entity::delete_many()
            .filter(
                Condition::any()
                    .add(todo_dependency::Column::TodoId.eq(todo_to_delete.id))
                    .add(todo_dependency::Column::DependsOnId.eq(todo_to_delete.id)),
            )
            .exec(&txn)
            .await?;
        todo::Entity::delete_by_id(todo_to_delete.id)
            .exec(&txn)
            .await?;
        txn.commit().await?;

        Ok(Todo::from(todo_to_delete))
    }

    /// Rebuilds the dependency graph from the stored todos and edges.
    #[tracing::instrument(skip(self))]
    pub async fn get_dependency_graph(&self) -> Result<DependencyGraph, TodoServiceError> {
        Ok(load_graph(self.db).await?)
    }
}

async fn load_graph<C: ConnectionTrait>(conn: &C) -> Result<DependencyGraph, DbErr> {
    let todos = todo::Entity::find().all(conn).await?;
    let edges = todo_dependency::Entity::find().all(conn).await?;

    let mut depends_on: HashMap<i32, Vec<TodoId>> = HashMap::new();
    for edge in edges {
        depends_on
            .entry(edge.todo_id)
            .or_default()
            .push(TodoId::new(edge.depends_on_id as u32));
    }
    let nodes: Vec<TodoNode> = todos
        .into_iter()
        .map(|model| {
            TodoNode::new(
                TodoId::new(model.id as u32),
                model.due_date.map(|due| due.with_timezone(&Utc)),
                depends_on.remove(&model.id).unwrap_or_default(),
            )
        })
        .collect();
    Ok(DependencyGraph::build(&nodes))
}

/// Resolves edges against the given todos, keeping the todos' order.
/// Edges with an end outside `todos` are skipped.
fn attach_edges(
    todos: Vec<todo::Model>,
    edges: Vec<todo_dependency::Model>,
) -> Vec<TodoWithDependencies> {
    let by_id: HashMap<i32, Todo> = todos
        .iter()
        .map(|model| (model.id, Todo::from(model.clone())))
        .collect();

    let mut dependencies: HashMap<i32, Vec<DependencyLink>> = HashMap::new();
    let mut dependents: HashMap<i32, Vec<DependencyLink>> = HashMap::new();
    for edge in edges {
        let (Some(dependent), Some(depends_on)) =
            (by_id.get(&edge.todo_id), by_id.get(&edge.depends_on_id))
        else {
            tracing::debug!(
                "Skipping edge {} between todos {} and {}",
                edge.id,
                edge.todo_id,
                edge.depends_on_id
            );
            continue;
        };
        let (edge_id, todo_id, depends_on_id) = (
            edge.id as u32,
            edge.todo_id as u32,
            edge.depends_on_id as u32,
        );
        dependencies
            .entry(edge.todo_id)
            .or_default()
            .push(DependencyLink::new(
                edge_id,
                todo_id,
                depends_on_id,
                depends_on.clone(),
            ));
        dependents
            .entry(edge.depends_on_id)
            .or_default()
            .push(DependencyLink::new(
                edge_id,
                todo_id,
                depends_on_id,
                dependent.clone(),
            ));
    }

    todos
        .into_iter()
        .map(|model| {
            let id = model.id;
            TodoWithDependencies {
                todo: Todo::from(model),
                dependencies: dependencies.remove(&id).unwrap_or_default(),
                dependents: dependents.remove(&id).unwrap_or_default(),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn model(id: i32, title: &str) -> todo::Model {
        todo::Model {
            id,
            title: title.to_string(),
            due_date: None,
            image_url: None,
            created_at: Utc
                .with_ymd_and_hms(2026, 1, 1, 0, 0, id as u32)
                .unwrap()
                .fixed_offset(),
        }
    }

    fn edge(id: i32, todo_id: i32, depends_on_id: i32) -> todo_dependency::Model {
        todo_dependency::Model {
            id,
            todo_id,
            depends_on_id,
        }
    }

    #[test]
    fn can_parse_rfc3339_due_date() {
        let parsed = parse_due_date("2026-03-01T12:30:00+02:00").unwrap();

        assert_eq!(
            parsed,
            Some(Utc.with_ymd_and_hms(2026, 3, 1, 10, 30, 0).unwrap())
        );
    }

    #[test]
    fn can_parse_local_due_date_as_utc() {
        assert_eq!(
            parse_due_date("2026-03-01T12:30").unwrap(),
            Some(Utc.with_ymd_and_hms(2026, 3, 1, 12, 30, 0).unwrap())
        );
        assert_eq!(
            parse_due_date("2026-03-01T12:30:15").unwrap(),
            Some(Utc.with_ymd_and_hms(2026, 3, 1, 12, 30, 15).unwrap())
        );
        assert_eq!(
            parse_due_date("2026-11-01T09:00:00.000").unwrap(),
            Some(Utc.with_ymd_and_hms(2026, 11, 1, 9, 0, 0).unwrap())
        );
        assert_eq!(
            parse_due_date("2026-11-01").unwrap(),
            Some(Utc.with_ymd_and_hms(2026, 11, 1, 0, 0, 0).unwrap())
        );
    }

    #[test]
    fn can_treat_empty_due_date_as_none() {
        assert_eq!(parse_due_date("").unwrap(), None);
        assert_eq!(parse_due_date("   ").unwrap(), None);
    }

    #[test]
    fn cannot_parse_garbage_due_date() {
        assert_eq!(
            parse_due_date("next tuesday"),
            Err(InvalidDueDate("next tuesday".to_string()))
        );
    }

    #[test]
    fn can_attach_edges_in_both_directions() {
        let todos = vec![model(3, "C"), model(2, "B"), model(1, "A")];
        let edges = vec![edge(10, 3, 1), edge(11, 3, 2)];

        let attached = attach_edges(todos, edges);

        let ids: Vec<u32> = attached.iter().map(|todo| todo.todo().id()).collect();
        assert_eq!(ids, vec![3, 2, 1]);

        let c = &attached[0];
        let c_dependencies: Vec<&str> = c
            .dependencies()
            .iter()
            .map(|link| link.other().title())
            .collect();
        assert_eq!(c_dependencies, vec!["A", "B"]);
        assert!(c.dependents().is_empty());

        let a = &attached[2];
        assert_eq!(a.dependents().len(), 1);
        assert_eq!(a.dependents()[0].other().title(), "C");
        assert_eq!(a.dependents()[0].todo_id(), 3);
        assert_eq!(a.dependents()[0].depends_on_id(), 1);
    }

    #[test]
    fn can_skip_edges_to_missing_todos() {
        let attached = attach_edges(vec![model(1, "A")], vec![edge(10, 1, 99)]);

        assert!(attached[0].dependencies().is_empty());
    }

    #[test]
    fn can_build_graph_from_fetched_todos() {
        let attached = attach_edges(
            vec![model(3, "C"), model(2, "B"), model(1, "A")],
            vec![edge(10, 3, 1), edge(11, 3, 2)],
        );

        let graph = dependency_graph(&attached);

        assert_eq!(graph.node_count(), 3);
        assert_eq!(
            graph.topological_order().unwrap(),
            vec![TodoId::new(1), TodoId::new(2), TodoId::new(3)]
        );
    }

    #[test]
    fn can_map_graph_errors() {
        assert!(matches!(
            TodoServiceError::from(GraphError::UnknownDependency(TodoId::new(4))),
            TodoServiceError::UnknownDependency(4)
        ));
        assert!(matches!(
            TodoServiceError::from(GraphError::CycleDetected { node: None }),
            TodoServiceError::CircularDependency
        ));
    }
}
