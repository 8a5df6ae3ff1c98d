//! Shared fixtures for integration tests: an in-memory SQLite database with
//! users and their tasks.

#![allow(dead_code)]

use std::sync::Arc;

use async_graphql::dynamic::Schema;
use async_graphql::{Request, Response, Variables};
use gqlorm::graphql::{AttributeFieldOptions, GraphqlContext, RequestVariables, SchemaBuilder};
use gqlorm::orm::{Association, Attribute, DataType, Executor, Model, ModelRegistry, SqliteExecutor};
use serde_json::{Value, json};
use sqlx::sqlite::SqlitePoolOptions;

pub fn registry() -> ModelRegistry {
    ModelRegistry::new()
        .register(
            Model::new("user", "users")
                .attribute(Attribute::new("id", DataType::Integer).primary_key().filterable())
                .attribute(
                    Attribute::new("firstName", DataType::String)
                        .field("first_name")
                        .filterable(),
                )
                .attribute(Attribute::new("email", DataType::String).not_null().filterable())
                .attribute(Attribute::new("passwordHash", DataType::String).field("password_hash"))
                .attribute(Attribute::new("active", DataType::Boolean).filterable())
                .association(Association::has_many("tasks", "task", "userId")),
        )
        .and_then(|r| {
            r.register(
                Model::new("task", "tasks")
                    .attribute(Attribute::new("id", DataType::Integer).primary_key().filterable())
                    .attribute(Attribute::new("title", DataType::String).not_null().filterable())
                    .attribute(Attribute::new("done", DataType::Boolean).filterable())
                    .attribute(Attribute::new("metadata", DataType::Json))
                    .attribute(Attribute::new("userId", DataType::Integer).field("user_id").filterable())
                    .association(Association::belongs_to("owner", "user", "userId")),
            )
        })
        .and_then(ModelRegistry::finish)
        .unwrap()
}

/// Fresh database holding three users and four tasks.
pub async fn executor() -> Arc<SqliteExecutor> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    let registry = Arc::new(registry());
    let executor = Arc::new(SqliteExecutor::new(pool, registry.clone()));
    executor.sync_schema().await.unwrap();

    let user = registry.get("user").unwrap();
    let task = registry.get("task").unwrap();
    for row in [
        json!({ "id": 1, "firstName": "Ada", "email": "ada@example.com", "passwordHash": "h1", "active": true }),
        json!({ "id": 2, "firstName": "Alan", "email": "alan@example.com", "passwordHash": "h2", "active": false }),
        json!({ "id": 3, "firstName": "Grace", "email": "grace@example.com", "passwordHash": "h3", "active": true }),
    ] {
        executor.insert(user, row.as_object().unwrap()).await.unwrap();
    }
    for row in [
        json!({ "id": 1, "title": "Write notes", "done": true, "userId": 1, "metadata": { "tags": ["notes"] } }),
        json!({ "id": 2, "title": "Compute Bernoulli numbers", "done": false, "userId": 1 }),
        json!({ "id": 3, "title": "Break Enigma", "done": false, "userId": 2 }),
        json!({ "id": 4, "title": "Debug 50%_done", "done": false, "userId": 3 }),
    ] {
        executor.insert(task, row.as_object().unwrap()).await.unwrap();
    }
    executor
}

/// Schema builder over the fixture models with password hashes hidden.
pub fn schema_builder(executor: &Arc<SqliteExecutor>) -> SchemaBuilder {
    SchemaBuilder::new(executor.registry().clone(), executor.clone() as Arc<dyn Executor>)
        .attribute_options("user", AttributeFieldOptions::default().exclude(["passwordHash"]))
}

pub async fn execute(schema: &Schema, query: &str, context: Value, variables: Value) -> Response {
    let variables = Variables::from_json(variables);
    let request = Request::new(query)
        .data(RequestVariables::from(&variables))
        .data(GraphqlContext(context.as_object().cloned().unwrap_or_default()))
        .variables(variables);
    schema.execute(request).await
}

/// Run a query that must succeed and return its data as JSON.
pub async fn query(schema: &Schema, query: &str) -> Value {
    let response = execute(schema, query, json!({}), json!({})).await;
    assert!(response.errors.is_empty(), "unexpected errors: {:?}", response.errors);
    response.data.into_json().unwrap()
}

/// Run a query that must fail and return the first error message.
pub async fn query_error(schema: &Schema, query: &str) -> String {
    let response = execute(schema, query, json!({}), json!({})).await;
    assert!(!response.errors.is_empty(), "expected an error");
    response.errors[0].message.clone()
}
