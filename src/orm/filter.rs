//! Where-clause rewriting
//!
//! Turns the nested `where` argument of a GraphQL field into a typed
//! [`Where`] tree. Operator keys are mapped through [`WhereOperator`], every
//! attribute key is checked against the allow-list of filterable attributes,
//! and keys naming an association are expanded into `$association.column$`
//! references on the associated model.
//!
//! ```text
//! { "firstName": { "like": "A%" },
//!   "or": [{ "active": true }, { "email": null }],
//!   "tasks": { "title": { "startsWith": "Fix" } } }
//! ```

use std::collections::BTreeSet;
use std::sync::Arc;

use serde_json::{Map, Value};

use super::model::{Association, Model, ModelRegistry};
use super::operators::{LogicalOperator, WhereOperator};
use crate::error::{Error, Result};

/// Object key marking a deferred reference to a request variable: `{"$var": "name"}`.
pub const VARIABLE_KEY: &str = "$var";

/// The model a filter applies to, plus the models reachable through its associations.
#[derive(Debug, Clone)]
pub struct FilterScope {
    model: Arc<Model>,
    associations: Vec<(Arc<Association>, Arc<Model>)>,
}

impl FilterScope {
    pub fn new(registry: &ModelRegistry, model: Arc<Model>) -> Result<Self> {
        let associations = model
            .associations()
            .iter()
            .map(|a| -> Result<_> { Ok((a.clone(), registry.target_of(a)?.clone())) })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            model,
            associations,
        })
    }

    pub fn model(&self) -> &Arc<Model> {
        &self.model
    }

    /// Association and its target model, matched case-insensitively.
    pub fn association(&self, name: &str) -> Option<(&Arc<Association>, &Arc<Model>)> {
        self.associations
            .iter()
            .find(|(a, _)| a.name.eq_ignore_ascii_case(name))
            .map(|(a, m)| (a, m))
    }

    pub fn association_names(&self) -> Vec<String> {
        self.associations.iter().map(|(a, _)| a.name.clone()).collect()
    }

    /// Filterable attributes of the model followed by those of associated models.
    pub fn filterable_attributes(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .model
            .filterable_attributes()
            .map(|a| a.name.clone())
            .collect();
        for (_, target) in &self.associations {
            for attribute in target.filterable_attributes() {
                if !names.contains(&attribute.name) {
                    names.push(attribute.name.clone());
                }
            }
        }
        names
    }

    fn column(&self, attribute: &str) -> Result<ColumnRef> {
        if !self.model.is_filterable(attribute) {
            return Err(Error::UnknownAttribute(attribute.to_string()));
        }
        Ok(ColumnRef {
            association: None,
            attribute: attribute.to_string(),
            column: self.model.column_for(attribute).to_string(),
        })
    }

    fn associated_column(
        &self,
        association: &Association,
        target: &Model,
        attribute: &str,
    ) -> Result<ColumnRef> {
        if !target.is_filterable(attribute) {
            return Err(Error::UnknownAttribute(attribute.to_string()));
        }
        Ok(ColumnRef {
            association: Some(association.name.clone()),
            attribute: attribute.to_string(),
            column: target.column_for(attribute).to_string(),
        })
    }
}

/// A column as seen from the queried model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnRef {
    /// Association the column is reached through, if any
    pub association: Option<String>,
    pub attribute: String,
    pub column: String,
}

impl std::fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.association {
            Some(association) => write!(f, "${}.{}$", association, self.column),
            None => f.write_str(&self.column),
        }
    }
}

/// Right-hand side of a condition.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Value(Value),
    List(Vec<Value>),
    /// Resolved against the request's variable values before execution
    Variable(String),
}

/// Typed where clause.
#[derive(Debug, Clone, PartialEq)]
pub enum Where {
    And(Vec<Where>),
    Or(Vec<Where>),
    Not(Box<Where>),
    Condition {
        column: ColumnRef,
        op: WhereOperator,
        operand: Operand,
    },
}

impl Where {
    pub fn condition(column: ColumnRef, op: WhereOperator, operand: Operand) -> Self {
        Where::Condition {
            column,
            op,
            operand,
        }
    }

    /// Equality on an attribute of the scope's model.
    pub fn eq(scope: &FilterScope, attribute: &str, value: Value) -> Result<Self> {
        let column = match scope.model.get_attribute(attribute) {
            Some(a) => ColumnRef {
                association: None,
                attribute: a.name.clone(),
                column: a.field.clone(),
            },
            None => return Err(Error::UnknownAttribute(attribute.to_string())),
        };
        let op = if value.is_null() {
            WhereOperator::Is
        } else {
            WhereOperator::Eq
        };
        Ok(Where::condition(column, op, Operand::Value(value)))
    }

    /// Combine two clauses with AND, flattening nested conjunctions.
    pub fn and(self, other: Where) -> Where {
        match (self, other) {
            (Where::And(mut left), Where::And(right)) => {
                left.extend(right);
                Where::And(left)
            }
            (Where::And(mut left), right) => {
                left.push(right);
                Where::And(left)
            }
            (left, Where::And(mut right)) => {
                right.insert(0, left);
                Where::And(right)
            }
            (left, right) => Where::And(vec![left, right]),
        }
    }

    /// Attributes of the queried model that every matching row is constrained on,
    /// i.e. those not hidden behind an `or` or `not`.
    pub fn conjunctive_attributes(&self) -> BTreeSet<&str> {
        let mut out = BTreeSet::new();
        self.collect_conjunctive(&mut out);
        out
    }

    fn collect_conjunctive<'a>(&'a self, out: &mut BTreeSet<&'a str>) {
        match self {
            Where::And(items) => {
                for item in items {
                    item.collect_conjunctive(out);
                }
            }
            Where::Condition { column, .. } if column.association.is_none() => {
                out.insert(column.attribute.as_str());
            }
            _ => {}
        }
    }

    /// Names of associations referenced anywhere in the clause.
    pub fn associations(&self) -> BTreeSet<&str> {
        let mut out = BTreeSet::new();
        self.visit(&mut |column, _| {
            if let Some(association) = &column.association {
                out.insert(association.as_str());
            }
        });
        out
    }

    pub fn has_variables(&self) -> bool {
        let mut found = false;
        self.visit(&mut |_, operand| {
            if matches!(operand, Operand::Variable(_)) {
                found = true;
            }
        });
        found
    }

    fn visit<'a, F: FnMut(&'a ColumnRef, &'a Operand)>(&'a self, f: &mut F) {
        match self {
            Where::And(items) | Where::Or(items) => {
                for item in items {
                    item.visit(f);
                }
            }
            Where::Not(inner) => inner.visit(f),
            Where::Condition {
                column, operand, ..
            } => f(column, operand),
        }
    }

    /// Replace deferred variable references with the request's variable values.
    pub fn resolve_variables(&mut self, variables: &Map<String, Value>) -> Result<()> {
        match self {
            Where::And(items) | Where::Or(items) => {
                for item in items {
                    item.resolve_variables(variables)?;
                }
                Ok(())
            }
            Where::Not(inner) => inner.resolve_variables(variables),
            Where::Condition { op, operand, .. } => {
                if let Operand::Variable(name) = operand {
                    let value = variables.get(name.as_str()).cloned().ok_or_else(|| {
                        Error::invalid_argument("where", format!("undefined variable ${name}"))
                    })?;
                    *operand = operand_for(*op, value)?;
                }
                Ok(())
            }
        }
    }
}

/// Rewrite a GraphQL `where` argument into a typed clause for `scope`.
pub fn replace_where_operators(value: &Value, scope: &FilterScope) -> Result<Where> {
    let object = value
        .as_object()
        .ok_or_else(|| Error::InvalidFilter("where must be an object".to_string()))?;

    let mut clauses = Vec::with_capacity(object.len());
    for (key, value) in object {
        if let Some(logical) = LogicalOperator::from_graphql_name(key) {
            clauses.push(logical_clause(logical, value, |v| replace_where_operators(v, scope))?);
        } else if let Some((association, target)) = scope.association(key) {
            let columns = value.as_object().ok_or_else(|| {
                Error::InvalidFilter(format!("association `{key}` expects an object of attributes"))
            })?;
            for (attribute, condition) in columns {
                let column = scope.associated_column(association, target, attribute)?;
                clauses.push(parse_condition(column, condition)?);
            }
        } else {
            let column = scope.column(key)?;
            clauses.push(parse_condition(column, value)?);
        }
    }

    Ok(collapse(clauses))
}

fn logical_clause<F>(logical: LogicalOperator, value: &Value, parse: F) -> Result<Where>
where
    F: Fn(&Value) -> Result<Where>,
{
    let items = || -> Result<Vec<Where>> {
        match value {
            Value::Array(items) => items.iter().map(&parse).collect(),
            Value::Object(_) => Ok(vec![parse(value)?]),
            _ => Err(Error::InvalidFilter(
                "`and`/`or` expect a list of conditions".to_string(),
            )),
        }
    };
    Ok(match logical {
        LogicalOperator::And => Where::And(items()?),
        LogicalOperator::Or => Where::Or(items()?),
        LogicalOperator::Not => Where::Not(Box::new(parse(value)?)),
    })
}

fn parse_condition(column: ColumnRef, value: &Value) -> Result<Where> {
    match value {
        Value::Null => Ok(Where::condition(
            column,
            WhereOperator::Is,
            Operand::Value(Value::Null),
        )),
        Value::Array(_) => Ok(Where::condition(
            column,
            WhereOperator::In,
            operand_for(WhereOperator::In, value.clone())?,
        )),
        Value::Object(_) if variable_name(value).is_some() => Ok(Where::condition(
            column,
            WhereOperator::Eq,
            operand_for(WhereOperator::Eq, value.clone())?,
        )),
        Value::Object(operators) => {
            let mut clauses = Vec::with_capacity(operators.len());
            for (key, operand) in operators {
                if let Some(logical) = LogicalOperator::from_graphql_name(key)
                    && logical != LogicalOperator::Not
                {
                    clauses.push(logical_clause(logical, operand, |v| {
                        parse_condition(column.clone(), v)
                    })?);
                } else if let Some(op) = WhereOperator::from_graphql_name(key) {
                    clauses.push(Where::condition(
                        column.clone(),
                        op,
                        operand_for(op, operand.clone())?,
                    ));
                } else {
                    return Err(Error::UnknownOperator(key.clone()));
                }
            }
            Ok(collapse(clauses))
        }
        scalar => Ok(Where::condition(
            column,
            WhereOperator::Eq,
            Operand::Value(scalar.clone()),
        )),
    }
}

fn operand_for(op: WhereOperator, value: Value) -> Result<Operand> {
    if let Some(name) = variable_name(&value) {
        return Ok(Operand::Variable(name.to_string()));
    }

    if op.takes_list() {
        let items = match value {
            Value::Array(items) => items,
            scalar if matches!(op, WhereOperator::In | WhereOperator::NotIn) => vec![scalar],
            _ => return Err(Error::InvalidFilter(format!("`{op}` expects a list"))),
        };
        if items.iter().any(|v| v.is_object() || v.is_array()) {
            return Err(Error::InvalidFilter(format!("`{op}` expects a list of scalars")));
        }
        if matches!(op, WhereOperator::Between | WhereOperator::NotBetween) && items.len() != 2 {
            return Err(Error::InvalidFilter(format!("`{op}` expects exactly two values")));
        }
        return Ok(Operand::List(items));
    }

    if value.is_object() || value.is_array() {
        return Err(Error::InvalidFilter(format!("`{op}` expects a scalar value")));
    }
    Ok(Operand::Value(value))
}

fn variable_name(value: &Value) -> Option<&str> {
    match value {
        Value::Object(map) if map.len() == 1 => map.get(VARIABLE_KEY).and_then(Value::as_str),
        _ => None,
    }
}

fn collapse(mut clauses: Vec<Where>) -> Where {
    if clauses.len() == 1 {
        clauses.remove(0)
    } else {
        Where::And(clauses)
    }
}
