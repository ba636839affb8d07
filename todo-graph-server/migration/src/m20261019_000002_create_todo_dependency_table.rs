use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(TodoDependency::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(TodoDependency::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(TodoDependency::TodoId).integer().not_null())
                    .col(
                        ColumnDef::new(TodoDependency::DependsOnId)
                            .integer()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_todo_dependency_todo_id")
                            .from(TodoDependency::Table, TodoDependency::TodoId)
                            .to(Todo::Table, Todo::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_todo_dependency_depends_on_id")
                            .from(TodoDependency::Table, TodoDependency::DependsOnId)
                            .to(Todo::Table, Todo::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("todo_dependency_todo_id_depends_on_id_unique")
                    .table(TodoDependency::Table)
                    .col(TodoDependency::TodoId)
                    .col(TodoDependency::DependsOnId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_todo_dependency_depends_on_id")
                    .table(TodoDependency::Table)
                    .col(TodoDependency::DependsOnId)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(TodoDependency::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum TodoDependency {
    Table,
    Id,
    TodoId,
    DependsOnId,
}

#[derive(DeriveIden)]
enum Todo {
    Table,
    Id,
}
