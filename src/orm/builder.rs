//! SQL Query Builder
//!
//! Renders [`FindOptions`] into parameterized SQLite statements and runs them
//! through sqlx. Values are always bound, never interpolated.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::Row as _;
use sqlx::SqlitePool;
use sqlx::sqlite::SqliteRow;

use super::filter::{ColumnRef, Operand, Where};
use super::model::{Association, AssociationKind, Attribute, DataType, Model, ModelRegistry};
use super::operators::WhereOperator;
use super::options::FindOptions;
use super::traits::{Executor, Row, SqlValue};
use crate::error::{Error, Result};

/// A rendered statement with its bind values in placeholder order.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlQuery {
    pub sql: String,
    pub values: Vec<SqlValue>,
}

/// Builds SELECT and COUNT statements for one model.
pub struct QueryBuilder<'a> {
    registry: &'a ModelRegistry,
    model: &'a Model,
    options: &'a FindOptions,
}

impl<'a> QueryBuilder<'a> {
    pub fn new(registry: &'a ModelRegistry, model: &'a Model, options: &'a FindOptions) -> Self {
        Self {
            registry,
            model,
            options,
        }
    }

    /// Attributes selected by the query, in model order.
    pub fn selected_attributes(&self) -> Result<Vec<&'a Attribute>> {
        if self.options.attributes.is_empty() {
            return Ok(self.model.attributes().iter().collect());
        }
        for name in &self.options.attributes {
            if self.model.get_attribute(name).is_none() {
                return Err(Error::UnknownAttribute(name.clone()));
            }
        }
        Ok(self
            .model
            .attributes()
            .iter()
            .filter(|a| self.options.attributes.contains(&a.name))
            .collect())
    }

    /// Build the SELECT statement.
    pub fn select(&self) -> Result<SqlQuery> {
        let joins = self.joins()?;
        let distinct = joins.iter().any(|(a, _)| a.is_multiple());

        let columns: Vec<String> = self
            .selected_attributes()?
            .iter()
            .map(|a| format!("{} AS \"{}\"", self.base_column(&a.field), a.name))
            .collect();

        let mut sql = format!(
            "SELECT {}{} FROM \"{}\"",
            if distinct { "DISTINCT " } else { "" },
            columns.join(", "),
            self.model.table
        );
        for (association, target) in &joins {
            sql.push_str(&self.join_sql(association, target));
        }

        let mut values = Vec::new();
        if let Some(clause) = &self.options.where_clause {
            sql.push_str(" WHERE ");
            sql.push_str(&render_where(clause, &self.model.table, &mut values)?);
        }

        if !self.options.order.is_empty() {
            let order: Vec<String> = self
                .options
                .order
                .iter()
                .map(|term| {
                    format!(
                        "{} {}",
                        render_column(&term.column, &self.model.table),
                        term.direction.to_sql()
                    )
                })
                .collect();
            sql.push_str(" ORDER BY ");
            sql.push_str(&order.join(", "));
        }

        match (self.options.limit, self.options.offset) {
            (Some(limit), Some(offset)) if offset > 0 => {
                sql.push_str(&format!(" LIMIT {} OFFSET {}", limit, offset))
            }
            (None, Some(offset)) if offset > 0 => {
                sql.push_str(&format!(" LIMIT -1 OFFSET {}", offset))
            }
            (Some(limit), _) => sql.push_str(&format!(" LIMIT {}", limit)),
            _ => {}
        }

        Ok(SqlQuery { sql, values })
    }

    /// Build a COUNT statement honouring the where clause only.
    pub fn count(&self) -> Result<SqlQuery> {
        let joins = self.joins()?;
        let mut sql = format!(
            "SELECT COUNT(DISTINCT {}) FROM \"{}\"",
            self.base_column(&self.model.primary_key().field),
            self.model.table
        );
        for (association, target) in &joins {
            sql.push_str(&self.join_sql(association, target));
        }

        let mut values = Vec::new();
        if let Some(clause) = &self.options.where_clause {
            sql.push_str(" WHERE ");
            sql.push_str(&render_where(clause, &self.model.table, &mut values)?);
        }

        Ok(SqlQuery { sql, values })
    }

    fn base_column(&self, column: &str) -> String {
        format!("\"{}\".\"{}\"", self.model.table, column)
    }

    /// Associations referenced by the where clause or ordering.
    fn joins(&self) -> Result<Vec<(&'a Arc<Association>, &'a Arc<Model>)>> {
        let mut names: BTreeSet<&str> = self
            .options
            .where_clause
            .as_ref()
            .map(Where::associations)
            .unwrap_or_default();
        names.extend(
            self.options
                .order
                .iter()
                .filter_map(|term| term.column.association.as_deref()),
        );

        names
            .into_iter()
            .map(|name| -> Result<_> {
                let unknown = || Error::UnknownAssociation {
                    model: self.model.name.clone(),
                    association: name.to_string(),
                };
                if !self.options.include.is_empty()
                    && !self.options.include.iter().any(|i| i == name)
                {
                    return Err(unknown());
                }
                let association = self.model.get_association(name).ok_or_else(unknown)?;
                Ok((association, self.registry.target_of(association)?))
            })
            .collect()
    }

    fn join_sql(&self, association: &Association, target: &Model) -> String {
        let (target_column, base_column) = match association.kind {
            AssociationKind::BelongsTo => (
                target.primary_key().field.as_str(),
                self.model.column_for(&association.foreign_key),
            ),
            AssociationKind::HasOne | AssociationKind::HasMany => (
                target.column_for(&association.foreign_key),
                self.model.primary_key().field.as_str(),
            ),
        };
        format!(
            " LEFT JOIN \"{}\" AS \"{}\" ON \"{}\".\"{}\" = {}",
            target.table,
            association.name,
            association.name,
            target_column,
            self.base_column(base_column)
        )
    }
}

fn render_column(column: &ColumnRef, table: &str) -> String {
    match &column.association {
        Some(association) => format!("\"{}\".\"{}\"", association, column.column),
        None => format!("\"{}\".\"{}\"", table, column.column),
    }
}

fn bind(values: &mut Vec<SqlValue>, value: SqlValue) -> String {
    values.push(value);
    format!("?{}", values.len())
}

fn render_where(clause: &Where, table: &str, values: &mut Vec<SqlValue>) -> Result<String> {
    match clause {
        Where::And(items) => render_group(items, " AND ", "1 = 1", table, values),
        Where::Or(items) => render_group(items, " OR ", "1 = 0", table, values),
        Where::Not(inner) => Ok(format!("NOT ({})", render_where(inner, table, values)?)),
        Where::Condition {
            column,
            op,
            operand,
        } => render_condition(&render_column(column, table), *op, operand, values),
    }
}

fn render_group(
    items: &[Where],
    separator: &str,
    empty: &str,
    table: &str,
    values: &mut Vec<SqlValue>,
) -> Result<String> {
    match items {
        [] => Ok(empty.to_string()),
        [single] => render_where(single, table, values),
        _ => {
            let parts = items
                .iter()
                .map(|item| render_where(item, table, values))
                .collect::<Result<Vec<_>>>()?;
            Ok(format!("({})", parts.join(separator)))
        }
    }
}

fn render_condition(
    column: &str,
    op: WhereOperator,
    operand: &Operand,
    values: &mut Vec<SqlValue>,
) -> Result<String> {
    let value = match operand {
        Operand::Variable(name) => {
            return Err(Error::InvalidFilter(format!("unresolved variable ${name}")));
        }
        Operand::List(items) => return render_list_condition(column, op, items, values),
        Operand::Value(value) => SqlValue::from_json(value)?,
    };

    if value == SqlValue::Null {
        match op {
            WhereOperator::Eq | WhereOperator::Is => return Ok(format!("{column} IS NULL")),
            WhereOperator::Ne | WhereOperator::Not => return Ok(format!("{column} IS NOT NULL")),
            _ => {}
        }
    }

    if let Some(comparison) = op.sql_comparison() {
        let placeholder = bind(values, value);
        return Ok(format!("{column} {comparison} {placeholder}"));
    }

    match op {
        WhereOperator::ILike => {
            let placeholder = bind(values, value);
            Ok(format!("LOWER({column}) LIKE LOWER({placeholder})"))
        }
        WhereOperator::NotILike => {
            let placeholder = bind(values, value);
            Ok(format!("LOWER({column}) NOT LIKE LOWER({placeholder})"))
        }
        WhereOperator::StartsWith | WhereOperator::EndsWith | WhereOperator::Substring => {
            let escaped = escape_like(&value.as_text());
            let pattern = match op {
                WhereOperator::StartsWith => format!("{escaped}%"),
                WhereOperator::EndsWith => format!("%{escaped}"),
                _ => format!("%{escaped}%"),
            };
            let placeholder = bind(values, SqlValue::String(pattern));
            Ok(format!("{column} LIKE {placeholder} ESCAPE '\\'"))
        }
        WhereOperator::In | WhereOperator::NotIn => {
            render_list_condition(column, op, &[value_to_json(&value)], values)
        }
        _ => Err(Error::InvalidFilter(format!("`{op}` expects a list"))),
    }
}

fn render_list_condition(
    column: &str,
    op: WhereOperator,
    items: &[Value],
    values: &mut Vec<SqlValue>,
) -> Result<String> {
    match op {
        WhereOperator::In | WhereOperator::NotIn => {
            if items.is_empty() {
                return Ok(if op == WhereOperator::In { "1 = 0" } else { "1 = 1" }.to_string());
            }
            let placeholders = items
                .iter()
                .map(|item| -> Result<String> { Ok(bind(values, SqlValue::from_json(item)?)) })
                .collect::<Result<Vec<_>>>()?;
            let keyword = if op == WhereOperator::In { "IN" } else { "NOT IN" };
            Ok(format!("{column} {keyword} ({})", placeholders.join(", ")))
        }
        WhereOperator::Between | WhereOperator::NotBetween => {
            let [low, high] = items else {
                return Err(Error::InvalidFilter(format!("`{op}` expects exactly two values")));
            };
            let low = bind(values, SqlValue::from_json(low)?);
            let high = bind(values, SqlValue::from_json(high)?);
            let keyword = if op == WhereOperator::Between {
                "BETWEEN"
            } else {
                "NOT BETWEEN"
            };
            Ok(format!("{column} {keyword} {low} AND {high}"))
        }
        _ => Err(Error::InvalidFilter(format!("`{op}` expects a scalar value"))),
    }
}

fn value_to_json(value: &SqlValue) -> Value {
    match value {
        SqlValue::String(s) => Value::String(s.clone()),
        SqlValue::Int(i) => Value::from(*i),
        SqlValue::Float(f) => Value::from(*f),
        SqlValue::Bool(b) => Value::Bool(*b),
        SqlValue::Null => Value::Null,
    }
}

/// Escape LIKE wildcards so user text matches literally (used with `ESCAPE '\'`).
fn escape_like(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Narrow `options` to the rows `association` links `source` to.
///
/// Returns `None` when the source row has no key to follow (e.g. a null
/// foreign key), in which case there is nothing to fetch.
pub fn association_options(
    association: &Association,
    source_model: &Model,
    target_model: &Model,
    source: &Row,
    mut options: FindOptions,
) -> Result<Option<FindOptions>> {
    let (source_attribute, target_attribute) = match association.kind {
        AssociationKind::BelongsTo => (
            association.foreign_key.as_str(),
            target_model.primary_key_attribute(),
        ),
        AssociationKind::HasOne | AssociationKind::HasMany => (
            source_model.primary_key_attribute(),
            association.foreign_key.as_str(),
        ),
    };

    let key = match source.get(source_attribute) {
        Some(Value::Null) | None => return Ok(None),
        Some(key) => key.clone(),
    };

    let column = ColumnRef {
        association: None,
        attribute: target_attribute.to_string(),
        column: target_model.column_for(target_attribute).to_string(),
    };
    options.and_where(Where::condition(column, WhereOperator::Eq, Operand::Value(key)));
    options.include.retain(|name| target_model.get_association(name).is_some());
    if !association.is_multiple() && options.limit.is_none() {
        options.limit = Some(1);
    }
    Ok(Some(options))
}

/// [`Executor`] backed by a SQLite pool.
#[derive(Clone)]
pub struct SqliteExecutor {
    pool: SqlitePool,
    registry: Arc<ModelRegistry>,
}

impl SqliteExecutor {
    pub fn new(pool: SqlitePool, registry: Arc<ModelRegistry>) -> Self {
        Self { pool, registry }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn registry(&self) -> &Arc<ModelRegistry> {
        &self.registry
    }

    /// Create every registered table that does not exist yet.
    pub async fn sync_schema(&self) -> Result<()> {
        for sql in self.registry.create_tables_sql() {
            tracing::debug!(sql = %sql, "Creating table");
            sqlx::query(&sql).execute(&self.pool).await?;
        }
        Ok(())
    }

    /// Insert one row; keys are attribute names.
    pub async fn insert(&self, model: &Model, row: &Row) -> Result<()> {
        let mut columns = Vec::with_capacity(row.len());
        let mut values = Vec::with_capacity(row.len());
        for (name, value) in row {
            let attribute = model
                .get_attribute(name)
                .ok_or_else(|| Error::UnknownAttribute(name.clone()))?;
            columns.push(format!("\"{}\"", attribute.field));
            values.push(match (attribute.data_type, value) {
                (DataType::Json, v) if !v.is_null() => SqlValue::String(v.to_string()),
                (_, v) => SqlValue::from_json(v)?,
            });
        }
        let placeholders: Vec<String> = (1..=values.len()).map(|i| format!("?{}", i)).collect();
        let sql = format!(
            "INSERT INTO \"{}\" ({}) VALUES ({})",
            model.table,
            columns.join(", "),
            placeholders.join(", ")
        );
        tracing::debug!(sql = %sql, model = %model.name, "Inserting row");

        let mut query = sqlx::query(&sql);
        for value in &values {
            query = value.bind_to_query(query);
        }
        query.execute(&self.pool).await?;
        Ok(())
    }
}

fn log_query(model: &Model, options: &FindOptions, query: &SqlQuery) {
    if options.logging {
        tracing::info!(model = %model.name, sql = %query.sql, binds = query.values.len(), "Executing entity query");
    } else {
        tracing::debug!(model = %model.name, sql = %query.sql, binds = query.values.len(), "Executing entity query");
    }
}

#[async_trait]
impl Executor for SqliteExecutor {
    async fn find_all(&self, model: &Model, options: &FindOptions) -> Result<Vec<Row>> {
        let builder = QueryBuilder::new(&self.registry, model, options);
        let attributes = builder.selected_attributes()?;
        let query = builder.select()?;
        log_query(model, options, &query);

        let mut sqlx_query = sqlx::query(&query.sql);
        for value in &query.values {
            sqlx_query = value.bind_to_query(sqlx_query);
        }

        let rows = sqlx_query.fetch_all(&self.pool).await?;
        rows.iter().map(|row| decode_row(row, &attributes)).collect()
    }

    async fn count(&self, model: &Model, options: &FindOptions) -> Result<i64> {
        let query = QueryBuilder::new(&self.registry, model, options).count()?;
        log_query(model, options, &query);

        let mut sqlx_query = sqlx::query(&query.sql);
        for value in &query.values {
            sqlx_query = value.bind_to_query(sqlx_query);
        }

        let row = sqlx_query.fetch_one(&self.pool).await?;
        Ok(row.try_get::<i64, _>(0)?)
    }
}

/// Decode a SQLite row by attribute type (INTEGER→bool, TEXT→JSON, ...).
fn decode_row(row: &SqliteRow, attributes: &[&Attribute]) -> Result<Row> {
    let mut out = Row::new();
    for attribute in attributes {
        let name = attribute.name.as_str();
        let value = match attribute.data_type {
            DataType::Integer => row.try_get::<Option<i64>, _>(name)?.map(Value::from),
            DataType::Float => row.try_get::<Option<f64>, _>(name)?.map(Value::from),
            DataType::Boolean => row.try_get::<Option<i64>, _>(name)?.map(|v| Value::Bool(v != 0)),
            DataType::String | DataType::Text | DataType::DateTime => {
                row.try_get::<Option<String>, _>(name)?.map(Value::String)
            }
            DataType::Json => row
                .try_get::<Option<String>, _>(name)?
                .map(|raw| serde_json::from_str(&raw).unwrap_or(Value::String(raw))),
        };
        out.insert(attribute.name.clone(), value.unwrap_or(Value::Null));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orm::filter::{FilterScope, replace_where_operators};
    use crate::orm::model::fixtures;
    use crate::orm::options::{OrderDirection, parse_order_by};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn options_for(registry: &ModelRegistry, model: &str, where_: Value, order_by: Value) -> FindOptions {
        let model = registry.get(model).unwrap().clone();
        let scope = FilterScope::new(registry, model).unwrap();
        FindOptions {
            where_clause: Some(replace_where_operators(&where_, &scope).unwrap()),
            order: parse_order_by(&order_by, &scope).unwrap(),
            ..Default::default()
        }
    }

    #[test]
    fn test_select_with_operators() {
        let registry = fixtures::registry();
        let options = options_for(
            &registry,
            "user",
            json!({ "firstName": { "iLike": "ada" }, "id": { "between": [1, 9] } }),
            json!([["email", "DESC"]]),
        )
        .limit(10)
        .offset(20);
        let user = registry.get("user").unwrap();
        let query = QueryBuilder::new(&registry, user, &options).select().unwrap();

        assert_eq!(
            query.sql,
            "SELECT \"users\".\"id\" AS \"id\", \"users\".\"first_name\" AS \"firstName\", \
             \"users\".\"email\" AS \"email\", \"users\".\"password_hash\" AS \"passwordHash\", \
             \"users\".\"active\" AS \"active\" FROM \"users\" \
             WHERE (LOWER(\"users\".\"first_name\") LIKE LOWER(?1) AND \"users\".\"id\" BETWEEN ?2 AND ?3) \
             ORDER BY \"users\".\"email\" DESC LIMIT 10 OFFSET 20"
        );
        assert_eq!(
            query.values,
            vec![SqlValue::String("ada".into()), SqlValue::Int(1), SqlValue::Int(9)]
        );
    }

    #[test]
    fn test_has_many_reference_joins_and_selects_distinct() {
        let registry = fixtures::registry();
        let mut options = options_for(
            &registry,
            "user",
            json!({ "tasks": { "title": { "startsWith": "50%_" } } }),
            json!([]),
        );
        options.attributes = vec!["id".to_string()];
        let user = registry.get("user").unwrap();
        let query = QueryBuilder::new(&registry, user, &options).select().unwrap();

        assert_eq!(
            query.sql,
            "SELECT DISTINCT \"users\".\"id\" AS \"id\" FROM \"users\" \
             LEFT JOIN \"tasks\" AS \"tasks\" ON \"tasks\".\"user_id\" = \"users\".\"id\" \
             WHERE \"tasks\".\"title\" LIKE ?1 ESCAPE '\\'"
        );
        assert_eq!(query.values, vec![SqlValue::String("50\\%\\_%".into())]);
    }

    #[test]
    fn test_belongs_to_order_joins_owner() {
        let registry = fixtures::registry();
        let mut options = options_for(&registry, "task", json!({}), json!([["owner.firstName"]]));
        options.where_clause = None;
        options.attributes = vec!["title".to_string()];
        let task = registry.get("task").unwrap();
        let query = QueryBuilder::new(&registry, task, &options).select().unwrap();

        assert_eq!(
            query.sql,
            "SELECT \"tasks\".\"title\" AS \"title\" FROM \"tasks\" \
             LEFT JOIN \"users\" AS \"owner\" ON \"owner\".\"id\" = \"tasks\".\"user_id\" \
             ORDER BY \"owner\".\"first_name\" ASC"
        );
        assert_eq!(options.order[0].direction, OrderDirection::Asc);
    }

    #[test]
    fn test_null_and_empty_list_conditions() {
        let registry = fixtures::registry();
        let options = options_for(
            &registry,
            "user",
            json!({ "email": { "ne": null }, "id": { "in": [] }, "or": [] }),
            json!([]),
        );
        let user = registry.get("user").unwrap();
        let query = QueryBuilder::new(&registry, user, &options).count().unwrap();
        assert_eq!(
            query.sql,
            "SELECT COUNT(DISTINCT \"users\".\"id\") FROM \"users\" \
             WHERE (\"users\".\"email\" IS NOT NULL AND 1 = 0 AND 1 = 0)"
        );
        assert!(query.values.is_empty());
    }

    #[test]
    fn test_unresolved_variable_is_an_error() {
        let registry = fixtures::registry();
        let options = options_for(&registry, "user", json!({ "id": { "$var": "id" } }), json!([]));
        let user = registry.get("user").unwrap();
        assert!(QueryBuilder::new(&registry, user, &options).select().is_err());
    }

    #[test]
    fn test_association_options() {
        let registry = fixtures::registry();
        let user = registry.get("user").unwrap();
        let task = registry.get("task").unwrap();
        let tasks = user.get_association("tasks").unwrap();
        let owner = task.get_association("owner").unwrap();

        let source = json!({ "id": 3 }).as_object().cloned().unwrap();
        let options = association_options(tasks, user, task, &source, FindOptions::default())
            .unwrap()
            .unwrap();
        assert_eq!(options.limit, None);
        let query = QueryBuilder::new(&registry, task, &options).select().unwrap();
        assert!(query.sql.ends_with("WHERE \"tasks\".\"user_id\" = ?1"));

        let orphan = json!({ "id": 1, "userId": null }).as_object().cloned().unwrap();
        assert!(
            association_options(owner, task, user, &orphan, FindOptions::default())
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("a_b%c\\"), "a\\_b\\%c\\\\");
    }
}
