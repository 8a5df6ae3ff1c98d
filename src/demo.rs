//! Demo models served by the binary: users, projects and tasks

use std::sync::Arc;

use async_graphql::dynamic::{Field, FieldFuture, FieldValue, Object, Schema, TypeRef};
use gqlorm::graphql::{
    AttributeFieldOptions, GraphqlContext, ModelConnection, PaginationConfig, SchemaBuilder,
};
use gqlorm::orm::{
    Association, Attribute, DataType, Executor, Model, ModelRegistry, OrderDirection, Row,
    SqliteExecutor,
};
use serde_json::json;

pub fn registry() -> gqlorm::Result<ModelRegistry> {
    ModelRegistry::new()
        .register(
            Model::new("user", "users")
                .attribute(Attribute::new("id", DataType::Integer).primary_key().filterable())
                .attribute(
                    Attribute::new("firstName", DataType::String)
                        .field("first_name")
                        .filterable(),
                )
                .attribute(
                    Attribute::new("lastName", DataType::String)
                        .field("last_name")
                        .filterable(),
                )
                .attribute(Attribute::new("email", DataType::String).not_null().filterable())
                .attribute(Attribute::new("passwordHash", DataType::String).field("password_hash"))
                .attribute(Attribute::new("active", DataType::Boolean).filterable())
                .association(Association::has_many("tasks", "task", "userId"))
                .association(Association::has_many("projects", "project", "ownerId")),
        )?
        .register(
            Model::new("project", "projects")
                .attribute(Attribute::new("id", DataType::Integer).primary_key().filterable())
                .attribute(Attribute::new("name", DataType::String).not_null().filterable())
                .attribute(Attribute::new("ownerId", DataType::Integer).field("owner_id").filterable())
                .association(Association::belongs_to("owner", "user", "ownerId"))
                .association(Association::has_many("tasks", "task", "projectId")),
        )?
        .register(
            Model::new("task", "tasks")
                .attribute(Attribute::new("id", DataType::Integer).primary_key().filterable())
                .attribute(Attribute::new("title", DataType::String).not_null().filterable())
                .attribute(Attribute::new("done", DataType::Boolean).filterable())
                .attribute(
                    Attribute::new("dueAt", DataType::DateTime)
                        .field("due_at")
                        .filterable()
                        .description("ISO 8601 due date"),
                )
                .attribute(Attribute::new("metadata", DataType::Json))
                .attribute(Attribute::new("userId", DataType::Integer).field("user_id").filterable())
                .attribute(
                    Attribute::new("projectId", DataType::Integer)
                        .field("project_id")
                        .filterable(),
                )
                .association(Association::belongs_to("owner", "user", "userId"))
                .association(Association::belongs_to("project", "project", "projectId")),
        )?
        .finish()
}

/// Insert a handful of rows to query against.
pub async fn seed(executor: &SqliteExecutor) -> gqlorm::Result<()> {
    let registry = executor.registry().clone();
    let rows = [
        ("user", json!({ "id": 1, "firstName": "Ada", "lastName": "Lovelace", "email": "ada@example.com", "passwordHash": "x", "active": true })),
        ("user", json!({ "id": 2, "firstName": "Alan", "lastName": "Turing", "email": "alan@example.com", "passwordHash": "x", "active": false })),
        ("project", json!({ "id": 1, "name": "Analytical Engine", "ownerId": 1 })),
        ("project", json!({ "id": 2, "name": "Bombe", "ownerId": 2 })),
        ("task", json!({ "id": 1, "title": "Write notes", "done": true, "dueAt": "1843-09-01", "userId": 1, "projectId": 1, "metadata": { "tags": ["notes"] } })),
        ("task", json!({ "id": 2, "title": "Compute Bernoulli numbers", "done": false, "dueAt": "1843-10-01", "userId": 1, "projectId": 1 })),
        ("task", json!({ "id": 3, "title": "Break Enigma", "done": false, "dueAt": "1941-06-01", "userId": 2, "projectId": 2 })),
    ];
    let count = rows.len();
    for (model, row) in rows {
        if let Some(row) = row.as_object() {
            executor.insert(registry.get(model)?, row).await?;
        }
    }
    tracing::info!(rows = count, "Seeded demo data");
    Ok(())
}

/// Schema over the demo models, with a `viewer` root field and a `tasks`
/// connection on the viewer.
pub fn schema(
    registry: Arc<ModelRegistry>,
    executor: Arc<dyn Executor>,
    pagination: PaginationConfig,
) -> anyhow::Result<Schema> {
    let user = registry.get("user")?.clone();
    let tasks = user
        .get_association("tasks")
        .cloned()
        .ok_or_else(|| anyhow::anyhow!("user.tasks association is missing"))?;

    let viewer_tasks = ModelConnection::builder("ViewerTask", "task", tasks, registry.clone())
        .order_by("TITLE", "title", OrderDirection::Asc)
        .order_by("DUE_AT", "dueAt", OrderDirection::Asc)
        .where_arg(true)
        .pagination(pagination)
        .build()?;
    let all_tasks = ModelConnection::builder("Task", "task", registry.get("task")?.clone(), registry.clone())
        .order_by("NEWEST", "id", OrderDirection::Desc)
        .where_arg(true)
        .pagination(pagination)
        .build()?;

    let viewer = Object::new("Viewer")
        .field(Field::new("id", TypeRef::named_nn(TypeRef::INT), |ctx| {
            FieldFuture::new(async move {
                let viewer = ctx.parent_value.try_downcast_ref::<Row>()?;
                match viewer.get("id") {
                    Some(id) => Ok(Some(FieldValue::value(async_graphql::Value::from_json(id.clone())?))),
                    None => Ok(None),
                }
            })
        }))
        .field(viewer_tasks.field("tasks"));

    let schema = SchemaBuilder::new(registry, executor)
        .pagination(pagination)
        .context_to_option("viewer", "viewer")
        .attribute_options("user", AttributeFieldOptions::default().exclude(["passwordHash"]))
        .connection(&viewer_tasks)
        .connection(&all_tasks)
        .register(viewer)
        .query_field(Field::new("viewer", TypeRef::named("Viewer"), |ctx| {
            FieldFuture::new(async move {
                let viewer = ctx
                    .data_opt::<GraphqlContext>()
                    .and_then(|context| context.0.get("viewer"))
                    .and_then(|viewer| viewer.as_object())
                    .cloned();
                Ok(viewer.map(FieldValue::owned_any))
            })
        }))
        .query_field(all_tasks.field("tasksConnection"))
        .finish()?;

    Ok(schema)
}
