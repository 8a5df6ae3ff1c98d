//! Relay connections over a model or an association
//!
//! A [`ModelConnection`] produces the `<Name>Connection`, `<Name>Edge` and
//! `<Name>OrderBy` types and a field resolver that pages through the target
//! in SQL: count, compute the window, fetch one page.

use std::sync::Arc;

use async_graphql::dynamic::{
    Enum, EnumItem, Field, FieldFuture, FieldValue, InputValue, Object, ResolverContext, Type, TypeRef,
};
use serde_json::Value;

use super::pagination::{Connection, ConnectionArgs, Edge, PageInfo, PaginationConfig};
use super::resolver::{
    AfterHook, BeforeHook, ResolveInfo, Resolved, Target, is_truthy, paginate, primary_key_order,
};
use super::types::JSON_SCALAR;
use crate::error::{Error, Result};
use crate::orm::{
    ColumnRef, Executor, FilterScope, FindOptions, Model, ModelRegistry, OrderDirection, OrderTerm, Row,
    args_to_find_options, association_options,
};

/// Name of the shared page info type.
pub const PAGE_INFO: &str = "PageInfo";

/// Enum value name of the default ordering.
const DEFAULT_ORDER: &str = "ID";

/// One value of a `<Name>OrderBy` enum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderByValue {
    pub name: String,
    pub attribute: String,
    pub direction: OrderDirection,
}

/// A Relay connection over a model or an association.
#[derive(Clone)]
pub struct ModelConnection {
    inner: Arc<Inner>,
}

struct Inner {
    name: String,
    node_type: String,
    target: Target,
    registry: Arc<ModelRegistry>,
    order_by: Vec<OrderByValue>,
    where_arg: bool,
    before: Option<BeforeHook>,
    after: Option<AfterHook>,
    pagination: PaginationConfig,
}

pub struct ModelConnectionBuilder {
    inner: Inner,
}

impl ModelConnection {
    /// Start a connection named `name` (e.g. `UserTask`) whose edges hold `node_type`.
    pub fn builder(
        name: impl Into<String>,
        node_type: impl Into<String>,
        target: impl Into<Target>,
        registry: Arc<ModelRegistry>,
    ) -> ModelConnectionBuilder {
        ModelConnectionBuilder {
            inner: Inner {
                name: name.into(),
                node_type: node_type.into(),
                target: target.into(),
                registry,
                order_by: Vec::new(),
                where_arg: false,
                before: None,
                after: None,
                pagination: PaginationConfig::default(),
            },
        }
    }

    pub fn connection_type_name(&self) -> String {
        format!("{}Connection", self.inner.name)
    }

    pub fn edge_type_name(&self) -> String {
        format!("{}Edge", self.inner.name)
    }

    pub fn order_by_type_name(&self) -> String {
        format!("{}OrderBy", self.inner.name)
    }

    pub fn order_by_values(&self) -> &[OrderByValue] {
        &self.inner.order_by
    }

    /// Types to register with the schema. [`page_info_type`] is registered once separately.
    pub fn types(&self) -> Vec<Type> {
        let edge = Object::new(self.edge_type_name())
            .description("An edge in a connection.")
            .field(Field::new("node", TypeRef::named(&self.inner.node_type), |ctx| {
                FieldFuture::new(async move {
                    let edge = ctx.parent_value.try_downcast_ref::<Edge<Row>>()?;
                    Ok(Some(FieldValue::owned_any(edge.node.clone())))
                })
            }))
            .field(Field::new("cursor", TypeRef::named_nn(TypeRef::STRING), |ctx| {
                FieldFuture::new(async move {
                    let edge = ctx.parent_value.try_downcast_ref::<Edge<Row>>()?;
                    Ok(Some(FieldValue::value(edge.cursor.clone())))
                })
            }));

        let connection = Object::new(self.connection_type_name())
            .description(format!("A connection to a list of {} items.", self.inner.node_type))
            .field(Field::new(
                "edges",
                TypeRef::named_list(self.edge_type_name()),
                |ctx| {
                    FieldFuture::new(async move {
                        let connection = ctx.parent_value.try_downcast_ref::<Connection<Row>>()?;
                        Ok(Some(FieldValue::list(
                            connection.edges.iter().cloned().map(FieldValue::owned_any),
                        )))
                    })
                },
            ))
            .field(Field::new("pageInfo", TypeRef::named_nn(PAGE_INFO), |ctx| {
                FieldFuture::new(async move {
                    let connection = ctx.parent_value.try_downcast_ref::<Connection<Row>>()?;
                    Ok(Some(FieldValue::owned_any(connection.page_info.clone())))
                })
            }))
            .field(Field::new("totalCount", TypeRef::named_nn(TypeRef::INT), |ctx| {
                FieldFuture::new(async move {
                    let connection = ctx.parent_value.try_downcast_ref::<Connection<Row>>()?;
                    Ok(Some(FieldValue::value(
                        connection.page_info.total_count.unwrap_or_default(),
                    )))
                })
            }));

        let order_by = self
            .inner
            .order_by
            .iter()
            .fold(Enum::new(self.order_by_type_name()), |e, value| {
                e.item(EnumItem::new(&value.name))
            });

        vec![edge.into(), connection.into(), order_by.into()]
    }

    /// `first`, `after`, `last`, `before`, `orderBy` and, when enabled, `where`.
    pub fn connection_args(&self) -> Vec<InputValue> {
        let mut args = vec![
            InputValue::new("first", TypeRef::named(TypeRef::INT)),
            InputValue::new("after", TypeRef::named(TypeRef::STRING)),
            InputValue::new("last", TypeRef::named(TypeRef::INT)),
            InputValue::new("before", TypeRef::named(TypeRef::STRING)),
            InputValue::new("orderBy", TypeRef::named(self.order_by_type_name())),
        ];
        if self.inner.where_arg {
            args.push(InputValue::new("where", TypeRef::named(JSON_SCALAR)));
        }
        args
    }

    /// Field named `name` returning this connection, with its arguments attached.
    pub fn field(&self, name: impl Into<String>) -> Field {
        let name = name.into();
        let return_type = TypeRef::named_nn(self.connection_type_name());
        let this = self.clone();
        let field_name = name.clone();
        let ty = return_type.clone();

        let field = Field::new(name, return_type, move |ctx: ResolverContext| {
            let this = this.clone();
            let field_name = field_name.clone();
            let ty = ty.clone();
            FieldFuture::new(async move {
                let info = ResolveInfo::from_context(&ctx, &field_name, &ty)?;
                let executor = ctx.data::<Arc<dyn Executor>>()?;
                let resolved = this.resolve(executor.as_ref(), info).await?;
                Ok(resolved.into_field_value())
            })
        });

        self.connection_args()
            .into_iter()
            .fold(field, |field, arg| field.argument(arg))
    }

    pub async fn resolve(&self, executor: &dyn Executor, mut info: ResolveInfo) -> Result<Resolved> {
        let inner = &self.inner;
        if info.args.get("orderBy").is_none_or(Value::is_null) {
            info.args
                .insert("orderBy".to_string(), Value::String(DEFAULT_ORDER.to_string()));
        }

        let (association, model) = inner
            .target
            .resolve(&inner.registry, info.source.as_ref(), &info.args)
            .await?;
        let scope = FilterScope::new(&inner.registry, model.clone())?;

        let mut options = args_to_find_options(&info.args, &scope, &[], None)?;
        options.attributes = model.attribute_names();
        options.logging = options.logging || info.context.get("logging").is_some_and(is_truthy);
        options.context = info.context.clone();
        options.include = scope.association_names();
        options.order = self.order_for(&model, &info.args["orderBy"])?;

        info.target = match &association {
            Some(association) => association.name.clone(),
            None => model.name.clone(),
        };
        let info = Arc::new(info);
        tracing::debug!(
            connection = %inner.name,
            field = %info.field_name,
            target = %info.target,
            "Resolving connection"
        );

        if let Some(before) = &inner.before {
            options = before(options, info.clone()).await?;
        }
        if let Some(clause) = options.where_clause.as_mut()
            && clause.has_variables()
        {
            clause.resolve_variables(&info.variables)?;
        }

        let options = match &association {
            Some(association) => {
                let source = info
                    .source
                    .as_ref()
                    .ok_or_else(|| Error::MissingSource(info.field_name.clone()))?;
                let source_model = inner.registry.get(&association.source)?;
                association_options(association, source_model, &model, source, options)?
            }
            None => Some(options),
        };

        let connection = match options {
            Some(options) => {
                let args = ConnectionArgs::from_args(&info.args)?;
                paginate(executor, &model, options, &args, &inner.pagination).await?
            }
            None => Connection::empty(),
        };

        let result = Resolved::Connection(connection);
        match &inner.after {
            Some(after) => after(result, info).await,
            None => Ok(result),
        }
    }

    /// Order terms for an `orderBy` enum value, with the primary key as tie breaker.
    fn order_for(&self, model: &Model, value: &Value) -> Result<Vec<OrderTerm>> {
        let name = value
            .as_str()
            .ok_or_else(|| Error::invalid_argument("orderBy", "expected an enum value"))?;
        let order_by = self
            .inner
            .order_by
            .iter()
            .find(|v| v.name == name)
            .ok_or_else(|| Error::UnknownOrderBy(name.to_string()))?;
        let attribute = model
            .get_attribute(&order_by.attribute)
            .ok_or_else(|| Error::UnknownOrderBy(order_by.attribute.clone()))?;

        let mut order = vec![OrderTerm {
            column: ColumnRef {
                association: None,
                attribute: attribute.name.clone(),
                column: attribute.field.clone(),
            },
            direction: order_by.direction,
        }];
        if !attribute.primary_key {
            order.push(primary_key_order(model));
        }
        Ok(order)
    }
}

impl ModelConnectionBuilder {
    /// Add an `orderBy` enum value sorting by `attribute`.
    pub fn order_by(
        mut self,
        name: impl Into<String>,
        attribute: impl Into<String>,
        direction: OrderDirection,
    ) -> Self {
        let name = name.into();
        self.inner.order_by.retain(|v| v.name != name);
        self.inner.order_by.push(OrderByValue {
            name,
            attribute: attribute.into(),
            direction,
        });
        self
    }

    pub fn where_arg(mut self, enabled: bool) -> Self {
        self.inner.where_arg = enabled;
        self
    }

    pub fn before<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(FindOptions, Arc<ResolveInfo>) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<FindOptions>> + Send + 'static,
    {
        use futures::FutureExt;
        self.inner.before = Some(Arc::new(move |options, info| hook(options, info).boxed()));
        self
    }

    pub fn after<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(Resolved, Arc<ResolveInfo>) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<Resolved>> + Send + 'static,
    {
        use futures::FutureExt;
        self.inner.after = Some(Arc::new(move |result, info| hook(result, info).boxed()));
        self
    }

    pub fn pagination(mut self, pagination: PaginationConfig) -> Self {
        self.inner.pagination = pagination;
        self
    }

    /// Finish the connection. `ID` sorts by primary key unless it was overridden.
    pub fn build(mut self) -> Result<ModelConnection> {
        if !self.inner.order_by.iter().any(|v| v.name == DEFAULT_ORDER) {
            let pk = match &self.inner.target {
                Target::Model(model) => model.primary_key_attribute().to_string(),
                Target::Association(association) => self
                    .inner
                    .registry
                    .target_of(association)?
                    .primary_key_attribute()
                    .to_string(),
                Target::Thunk(_) => {
                    return Err(Error::InvalidModel(format!(
                        "connection `{}` needs an explicit ID ordering for a computed target",
                        self.inner.name
                    )));
                }
            };
            self.inner.order_by.insert(
                0,
                OrderByValue {
                    name: DEFAULT_ORDER.to_string(),
                    attribute: pk,
                    direction: OrderDirection::Asc,
                },
            );
        }
        Ok(ModelConnection {
            inner: Arc::new(self.inner),
        })
    }
}

/// The `PageInfo` object shared by every connection.
pub fn page_info_type() -> Object {
    fn page_info<'a>(ctx: &ResolverContext<'a>) -> async_graphql::Result<&'a PageInfo> {
        ctx.parent_value.try_downcast_ref::<PageInfo>()
    }

    Object::new(PAGE_INFO)
        .description("Information about pagination in a connection.")
        .field(Field::new("hasNextPage", TypeRef::named_nn(TypeRef::BOOLEAN), |ctx| {
            FieldFuture::new(async move {
                Ok(Some(FieldValue::value(page_info(&ctx)?.has_next_page)))
            })
        }))
        .field(Field::new("hasPreviousPage", TypeRef::named_nn(TypeRef::BOOLEAN), |ctx| {
            FieldFuture::new(async move {
                Ok(Some(FieldValue::value(page_info(&ctx)?.has_previous_page)))
            })
        }))
        .field(Field::new("startCursor", TypeRef::named(TypeRef::STRING), |ctx| {
            FieldFuture::new(async move {
                Ok(page_info(&ctx)?.start_cursor.clone().map(FieldValue::value))
            })
        }))
        .field(Field::new("endCursor", TypeRef::named(TypeRef::STRING), |ctx| {
            FieldFuture::new(async move {
                Ok(page_info(&ctx)?.end_cursor.clone().map(FieldValue::value))
            })
        }))
}
