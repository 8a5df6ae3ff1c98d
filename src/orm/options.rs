//! Find options assembled from GraphQL arguments

use std::sync::Arc;

use serde_json::{Map, Value};

use super::filter::{ColumnRef, FilterScope, Where, replace_where_operators};
use crate::error::{Error, Result};

/// Callback that may reject a fully assembled where clause.
pub type FiltersValidator = Arc<dyn Fn(&Where) -> std::result::Result<(), String> + Send + Sync>;

/// Sort direction for ORDER BY clauses.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum OrderDirection {
    #[default]
    Asc,
    Desc,
}

impl OrderDirection {
    /// Convert to SQL order string
    pub fn to_sql(&self) -> &'static str {
        match self {
            OrderDirection::Asc => "ASC",
            OrderDirection::Desc => "DESC",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        if value.eq_ignore_ascii_case("ASC") {
            Some(OrderDirection::Asc)
        } else if value.eq_ignore_ascii_case("DESC") {
            Some(OrderDirection::Desc)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderTerm {
    pub column: ColumnRef,
    pub direction: OrderDirection,
}

/// Everything needed to run a find against one model.
#[derive(Debug, Clone, Default)]
pub struct FindOptions {
    pub where_clause: Option<Where>,
    pub order: Vec<OrderTerm>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    /// Attributes to select; empty selects every attribute
    pub attributes: Vec<String>,
    /// Associations available for `$association.column$` references
    pub include: Vec<String>,
    /// Log executed SQL at info level
    pub logging: bool,
    /// Context values of the GraphQL request
    pub context: Map<String, Value>,
    /// Values copied from the context by `context_to_options`
    pub extra: Map<String, Value>,
}

impl FindOptions {
    /// AND a clause into the existing where clause.
    pub fn and_where(&mut self, clause: Where) {
        self.where_clause = Some(match self.where_clause.take() {
            Some(existing) => existing.and(clause),
            None => clause,
        });
    }

    pub fn filter(mut self, clause: Where) -> Self {
        self.and_where(clause);
        self
    }

    pub fn order_by(mut self, column: ColumnRef, direction: OrderDirection) -> Self {
        self.order.push(OrderTerm { column, direction });
        self
    }

    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: i64) -> Self {
        self.offset = Some(offset);
        self
    }
}

/// Build find options from field arguments.
///
/// Recognised arguments are `limit`, `offset`, `order` (`"attr"` or
/// `"reverse:attr"`), `where`, and any argument named after a model
/// attribute, which becomes an equality condition. Other arguments
/// (`orderBy`, connection arguments) are left to the caller.
pub fn args_to_find_options(
    args: &Map<String, Value>,
    scope: &FilterScope,
    required_filters: &[String],
    filters_validator: Option<&FiltersValidator>,
) -> Result<FindOptions> {
    let mut options = FindOptions::default();
    let mut filter: Option<Where> = None;

    for (key, value) in args {
        if value.is_null() {
            continue;
        }
        match key.as_str() {
            // Zero means unset, as for any other falsy value
            "limit" => options.limit = Some(parse_count(key, value)?).filter(|n| *n > 0),
            "offset" => options.offset = Some(parse_count(key, value)?).filter(|n| *n > 0),
            "order" => {
                let order = value
                    .as_str()
                    .ok_or_else(|| Error::invalid_argument(key, "expected a string"))?;
                options.order.push(parse_order(order, scope)?);
            }
            "where" => {
                if value.as_object().is_some_and(|o| !o.is_empty()) {
                    filter = Some(replace_where_operators(value, scope)?);
                } else if !value.is_object() {
                    return Err(Error::InvalidFilter("where must be an object".to_string()));
                }
            }
            "orderBy" => {}
            _ => {
                if scope.model().get_attribute(key).is_some() {
                    options.and_where(Where::eq(scope, key, value.clone())?);
                }
            }
        }
    }

    if let Some(filter) = filter {
        options.and_where(filter);
    }

    check_required_filters(options.where_clause.as_ref(), required_filters)?;

    if let (Some(validator), Some(clause)) = (filters_validator, options.where_clause.as_ref()) {
        validator.as_ref()(clause).map_err(Error::InvalidFilter)?;
    }

    Ok(options)
}

fn check_required_filters(clause: Option<&Where>, required_filters: &[String]) -> Result<()> {
    let present = clause.map(Where::conjunctive_attributes).unwrap_or_default();
    match required_filters
        .iter()
        .find(|name| !present.contains(name.as_str()))
    {
        Some(missing) => Err(Error::MissingRequiredFilter(missing.clone())),
        None => Ok(()),
    }
}

fn parse_count(name: &str, value: &Value) -> Result<i64> {
    let parsed = match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    };
    match parsed {
        Some(n) if n >= 0 => Ok(n),
        Some(_) => Err(Error::invalid_argument(name, "must not be negative")),
        None => Err(Error::invalid_argument(name, "expected an integer")),
    }
}

/// Parse the simple `order` argument: `"title"` sorts ascending, `"reverse:title"` descending.
pub fn parse_order(order: &str, scope: &FilterScope) -> Result<OrderTerm> {
    let (attribute, direction) = match order.strip_prefix("reverse:") {
        Some(attribute) => (attribute, OrderDirection::Desc),
        None => (order, OrderDirection::Asc),
    };
    Ok(OrderTerm {
        column: order_column(attribute, scope)?,
        direction,
    })
}

/// Parse an `orderBy` argument of the form `[["association.attribute", "DESC"], ["title"]]`.
///
/// Every path segment must name an association or a filterable attribute and
/// every trailing element must be `ASC` or `DESC`.
pub fn parse_order_by(value: &Value, scope: &FilterScope) -> Result<Vec<OrderTerm>> {
    let entries = value
        .as_array()
        .ok_or_else(|| Error::invalid_argument("orderBy", "expected a list of lists"))?;

    entries
        .iter()
        .map(|entry| -> Result<OrderTerm> {
            let parts = entry
                .as_array()
                .ok_or_else(|| Error::invalid_argument("orderBy", "expected a list of lists"))?;
            let mut parts = parts.iter().map(|p| {
                p.as_str()
                    .ok_or_else(|| Error::invalid_argument("orderBy", "expected strings"))
            });

            let path = parts
                .next()
                .transpose()?
                .ok_or_else(|| Error::invalid_argument("orderBy", "empty order entry"))?;
            let column = order_column(path, scope)?;

            let mut direction = OrderDirection::Asc;
            for part in parts {
                let part = part?;
                direction = OrderDirection::parse(part)
                    .ok_or_else(|| Error::UnknownOrderBy(part.to_string()))?;
            }

            Ok(OrderTerm { column, direction })
        })
        .collect()
}

fn order_column(path: &str, scope: &FilterScope) -> Result<ColumnRef> {
    let segments: Vec<&str> = path.split('.').collect();
    match segments.as_slice() {
        [attribute] => {
            let model = scope.model();
            if !model.is_filterable(attribute) {
                return Err(Error::UnknownOrderBy(attribute.to_string()));
            }
            Ok(ColumnRef {
                association: None,
                attribute: attribute.to_string(),
                column: model.column_for(attribute).to_string(),
            })
        }
        [association, attribute] => {
            let (association, target) = scope
                .association(association)
                .ok_or_else(|| Error::UnknownOrderBy(association.to_string()))?;
            if !target.is_filterable(attribute) {
                return Err(Error::UnknownOrderBy(attribute.to_string()));
            }
            Ok(ColumnRef {
                association: Some(association.name.clone()),
                attribute: attribute.to_string(),
                column: target.column_for(attribute).to_string(),
            })
        }
        _ => Err(Error::UnknownOrderBy(path.to_string())),
    }
}
