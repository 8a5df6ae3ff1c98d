//! gqlorm server - GraphQL over the demo models
//!
//! Serves the generated schema at /graphql (POST to execute, GET for GraphiQL).

mod api;
mod config;
mod demo;

use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::Context;
use async_graphql::dynamic::Schema;
use async_graphql::http::GraphiQLSource;
use async_graphql_axum::{GraphQLRequest, GraphQLResponse};
use axum::Router;
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::routing::get;
use gqlorm::graphql::{GraphqlContext, RequestVariables};
use gqlorm::orm::{Executor, SqliteExecutor};
use serde_json::{Value, json};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::Config;

/// Header naming the id of the user making the request
const VIEWER_HEADER: &str = "x-viewer-id";
/// Header that turns on info-level SQL logging for the request
const LOG_SQL_HEADER: &str = "x-log-sql";

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub executor: Arc<SqliteExecutor>,
    pub schema: Schema,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    gqlorm::logging::init("gqlorm=debug,tower_http=debug", config.log_json);
    tracing::info!("Starting gqlorm server");

    // Every connection to `sqlite::memory:` opens its own database
    let max_connections = if config.database_url.contains(":memory:") {
        1
    } else {
        config.database_max_connections
    };
    let options = SqliteConnectOptions::from_str(&config.database_url)
        .context("Invalid DATABASE_URL")?
        .create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(options)
        .await
        .context("Failed to connect to the database")?;
    tracing::info!(url = %config.database_url, max_connections, "Database connected");

    let registry = Arc::new(demo::registry()?);
    let executor = Arc::new(SqliteExecutor::new(pool, registry.clone()));
    executor.sync_schema().await?;
    if config.seed_demo_data {
        demo::seed(&executor).await?;
    }

    let schema = demo::schema(
        registry,
        executor.clone() as Arc<dyn Executor>,
        config.pagination(),
    )?;
    tracing::info!("GraphQL schema built");

    let state = AppState {
        executor,
        schema,
    };

    let app = router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Listening on {}", addr);
    tracing::info!("GraphQL playground: {}/graphql", config.base_url());

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Build the router - GraphQL is the primary API
fn router(state: AppState) -> Router {
    Router::new()
        .merge(api::health::router())
        .route("/graphql", get(graphiql).post(graphql_handler))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Request context built from headers
fn request_context(headers: &HeaderMap) -> GraphqlContext {
    let mut context = GraphqlContext::new();

    if let Some(id) = headers
        .get(VIEWER_HEADER)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.trim().parse::<i64>().ok())
    {
        context = context.with("viewer", json!({ "id": id }));
    }

    let log_sql = headers
        .get(LOG_SQL_HEADER)
        .and_then(|h| h.to_str().ok())
        .is_some_and(|h| h == "1" || h.eq_ignore_ascii_case("true"));
    context.with("logging", Value::Bool(log_sql))
}

/// GraphQL query handler with viewer context and request variables
async fn graphql_handler(
    axum::extract::State(state): axum::extract::State<AppState>,
    headers: HeaderMap,
    req: GraphQLRequest,
) -> GraphQLResponse {
    let request = req.into_inner();
    let variables = RequestVariables::from(&request.variables);
    let request = request.data(variables).data(request_context(&headers));

    state.schema.execute(request).await.into()
}

/// GraphiQL interactive playground (only for browsers)
async fn graphiql(headers: HeaderMap) -> impl IntoResponse {
    let accepts_html = headers
        .get(axum::http::header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.contains("text/html"))
        .unwrap_or(false);

    if accepts_html {
        axum::response::Html(GraphiQLSource::build().endpoint("/graphql").finish()).into_response()
    } else {
        (
            axum::http::StatusCode::METHOD_NOT_ALLOWED,
            axum::Json(serde_json::json!({
                "error": "GET requests are not supported for GraphQL queries. Use POST with Content-Type: application/json"
            })),
        )
            .into_response()
    }
}
