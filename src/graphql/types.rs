//! GraphQL types derived from models
//!
//! Object types expose one field per model attribute. Fields resolve from the
//! parent [`Row`] produced by a resolver.

use std::collections::BTreeMap;

use async_graphql::Value as ConstValue;
use async_graphql::dynamic::{Field, FieldFuture, FieldValue, InputValue, Object, ResolverContext, Scalar, TypeRef};
use serde_json::{Map, Value};

use crate::orm::{Attribute, DataType, Model, Row};

/// Name of the scalar used for `where` arguments and JSON attributes.
pub const JSON_SCALAR: &str = "JSON";

const WHERE_DESCRIPTION: &str =
    "Filter object keyed by attribute or association, e.g. { title: { like: \"a%\" } }";

/// Context values of a GraphQL request (e.g. `viewer`, `logging`).
///
/// Attach it to the request with `Request::data`.
#[derive(Debug, Clone, Default)]
pub struct GraphqlContext(pub Map<String, Value>);

impl GraphqlContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: Value) -> Self {
        self.0.insert(key.into(), value);
        self
    }
}

impl From<Map<String, Value>> for GraphqlContext {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// Variable values of a GraphQL request, used to resolve deferred `$var`
/// references in `where` arguments.
#[derive(Debug, Clone, Default)]
pub struct RequestVariables(pub Map<String, Value>);

impl From<&async_graphql::Variables> for RequestVariables {
    fn from(variables: &async_graphql::Variables) -> Self {
        match variables.clone().into_value().into_json() {
            Ok(Value::Object(map)) => Self(map),
            _ => Self::default(),
        }
    }
}

pub fn type_ref_for(data_type: DataType) -> TypeRef {
    match data_type {
        DataType::Integer => TypeRef::named(TypeRef::INT),
        DataType::Float => TypeRef::named(TypeRef::FLOAT),
        DataType::String | DataType::Text | DataType::DateTime => TypeRef::named(TypeRef::STRING),
        DataType::Boolean => TypeRef::named(TypeRef::BOOLEAN),
        DataType::Json => TypeRef::named(JSON_SCALAR),
    }
}

pub fn json_scalar() -> Scalar {
    Scalar::new(JSON_SCALAR).description("Arbitrary JSON value")
}

/// Which attributes become fields, and under which names.
#[derive(Debug, Clone, Default)]
pub struct AttributeFieldOptions {
    /// Attributes to leave out
    pub exclude: Vec<String>,
    /// When set, only these attributes become fields
    pub only: Option<Vec<String>>,
    /// Attribute name → field name
    pub rename: BTreeMap<String, String>,
}

impl AttributeFieldOptions {
    pub fn exclude<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn only<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.only = Some(names.into_iter().map(Into::into).collect());
        self
    }

    pub fn rename(mut self, attribute: impl Into<String>, field: impl Into<String>) -> Self {
        self.rename.insert(attribute.into(), field.into());
        self
    }

    fn includes(&self, attribute: &str) -> bool {
        !self.exclude.iter().any(|e| e == attribute)
            && self
                .only
                .as_ref()
                .is_none_or(|only| only.iter().any(|o| o == attribute))
    }
}

/// One field per attribute of `model`.
pub fn attribute_fields(model: &Model, options: &AttributeFieldOptions) -> Vec<Field> {
    model
        .attributes()
        .iter()
        .filter(|attribute| options.includes(&attribute.name))
        .map(|attribute| {
            let name = options
                .rename
                .get(&attribute.name)
                .cloned()
                .unwrap_or_else(|| attribute.name.clone());
            attribute_field(name, attribute)
        })
        .collect()
}

fn attribute_field(name: String, attribute: &Attribute) -> Field {
    let mut ty = type_ref_for(attribute.data_type);
    if !attribute.allow_null {
        ty = TypeRef::NonNull(Box::new(ty));
    }

    let key = attribute.name.clone();
    let field = Field::new(name, ty, move |ctx: ResolverContext| {
        let key = key.clone();
        FieldFuture::new(async move {
            let row = ctx.parent_value.try_downcast_ref::<Row>()?;
            match row.get(&key) {
                None | Some(Value::Null) => Ok(None),
                Some(value) => Ok(Some(FieldValue::value(ConstValue::from_json(value.clone())?))),
            }
        })
    });

    match &attribute.description {
        Some(description) => field.description(description),
        None => field,
    }
}

/// Object type named after `model` with its attribute fields.
pub fn object_type(model: &Model, options: &AttributeFieldOptions) -> Object {
    attribute_fields(model, options)
        .into_iter()
        .fold(Object::new(&model.name), |object, field| object.field(field))
}

/// Arguments of a single-object field: the primary key and `where`.
pub fn default_args(model: &Model) -> Vec<InputValue> {
    let pk = model.primary_key();
    vec![
        InputValue::new(&pk.name, type_ref_for(pk.data_type)),
        InputValue::new("where", TypeRef::named(JSON_SCALAR))
            .description(WHERE_DESCRIPTION),
    ]
}

/// Arguments of a list field.
pub fn default_list_args() -> Vec<InputValue> {
    vec![
        InputValue::new("limit", TypeRef::named(TypeRef::INT)),
        InputValue::new("offset", TypeRef::named(TypeRef::INT)),
        InputValue::new("order", TypeRef::named(TypeRef::STRING))
            .description("Attribute to order by; prefix with `reverse:` to sort descending"),
        InputValue::new("orderBy", order_by_type())
            .description("List of [\"association.attribute\" | \"attribute\", \"ASC\" | \"DESC\"] pairs"),
        InputValue::new("where", TypeRef::named(JSON_SCALAR))
            .description(WHERE_DESCRIPTION),
    ]
}

/// `[[String!]!]`
fn order_by_type() -> TypeRef {
    TypeRef::List(Box::new(TypeRef::NonNull(Box::new(TypeRef::named_nn_list(
        TypeRef::STRING,
    )))))
}
