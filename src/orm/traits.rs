//! Core traits and value types for the ORM layer

use async_trait::async_trait;
use serde_json::{Map, Value};

use super::model::{Association, Model};
use super::options::FindOptions;
use crate::error::{Error, Result};

/// A decoded database row keyed by attribute name.
///
/// Rows are also what GraphQL fields resolve from; a key named after an
/// association holds an eagerly loaded ("manually included") result.
pub type Row = Map<String, Value>;

/// Represents a SQL value that can be bound to a query.
///
/// Used by filters to collect values for parameterized queries.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Null,
}

impl SqlValue {
    /// Convert a scalar JSON value; objects and arrays are not bindable.
    pub fn from_json(value: &Value) -> Result<Self> {
        match value {
            Value::Null => Ok(SqlValue::Null),
            Value::Bool(b) => Ok(SqlValue::Bool(*b)),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Ok(SqlValue::Int(i)),
                None => Ok(SqlValue::Float(n.as_f64().unwrap_or_default())),
            },
            Value::String(s) => Ok(SqlValue::String(s.clone())),
            other => Err(Error::InvalidFilter(format!(
                "cannot compare a column with {other}"
            ))),
        }
    }

    /// Textual form used when building LIKE patterns.
    pub fn as_text(&self) -> String {
        match self {
            SqlValue::String(s) => s.clone(),
            SqlValue::Int(i) => i.to_string(),
            SqlValue::Float(f) => f.to_string(),
            SqlValue::Bool(b) => b.to_string(),
            SqlValue::Null => String::new(),
        }
    }

    /// Bind this value to a sqlx query builder at the given parameter index
    pub fn bind_to_query<'q>(
        &'q self,
        query: sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>>,
    ) -> sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>> {
        match self {
            SqlValue::String(s) => query.bind(s.as_str()),
            SqlValue::Int(i) => query.bind(*i),
            SqlValue::Float(f) => query.bind(*f),
            SqlValue::Bool(b) => query.bind(if *b { 1i32 } else { 0i32 }),
            SqlValue::Null => query.bind(None::<String>),
        }
    }
}

/// Executes find options against a data source.
///
/// [`super::SqliteExecutor`] is the production implementation; resolvers only
/// see this trait, so tests can substitute a recording executor.
#[async_trait]
pub trait Executor: Send + Sync {
    /// Return every row of `model` matching `options`.
    async fn find_all(&self, model: &Model, options: &FindOptions) -> Result<Vec<Row>>;

    /// Return the first matching row.
    async fn find_one(&self, model: &Model, options: &FindOptions) -> Result<Option<Row>> {
        let mut options = options.clone();
        options.limit = Some(1);
        Ok(self.find_all(model, &options).await?.into_iter().next())
    }

    /// Count the rows matching the where clause of `options`.
    async fn count(&self, model: &Model, options: &FindOptions) -> Result<i64>;

    /// Load the rows an association of `source` points at.
    ///
    /// The association's key constraint is ANDed into `options`.
    async fn fetch_association(
        &self,
        association: &Association,
        source_model: &Model,
        target_model: &Model,
        source: &Row,
        options: &FindOptions,
    ) -> Result<Vec<Row>> {
        let options = super::builder::association_options(
            association,
            source_model,
            target_model,
            source,
            options.clone(),
        )?;
        match options {
            Some(options) => self.find_all(target_model, &options).await,
            None => Ok(Vec::new()),
        }
    }
}
