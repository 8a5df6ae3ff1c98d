//! Resolver factory
//!
//! Wraps a model or an association as a GraphQL field resolver. A resolver
//! turns the field's arguments into [`FindOptions`], gives the `before` hook a
//! chance to adjust them, runs them through the [`Executor`] and hands the
//! result to the `after` hook.

use std::future::Future;
use std::sync::Arc;

use async_graphql::dynamic::{Field, FieldFuture, FieldValue, ResolverContext, TypeRef};
use futures::future::{BoxFuture, FutureExt};
use serde_json::{Map, Value};

use super::pagination::{
    Connection, ConnectionArgs, PaginationConfig, handle_connection, is_connection,
};
use super::types::{GraphqlContext, RequestVariables};
use crate::error::{Error, Result};
use crate::orm::{
    Association, ColumnRef, Executor, FilterScope, FiltersValidator, FindOptions, Model,
    ModelRegistry, OrderDirection, OrderTerm, Row, args_to_find_options, parse_order_by,
};

pub type ThunkFn = dyn Fn(Option<Row>, Map<String, Value>) -> BoxFuture<'static, Result<Target>> + Send + Sync;

/// Hook run on the find options before the query executes.
pub type BeforeHook =
    Arc<dyn Fn(FindOptions, Arc<ResolveInfo>) -> BoxFuture<'static, Result<FindOptions>> + Send + Sync>;

/// Hook run on the result before it is returned to GraphQL.
pub type AfterHook =
    Arc<dyn Fn(Resolved, Arc<ResolveInfo>) -> BoxFuture<'static, Result<Resolved>> + Send + Sync>;

/// What a resolver loads.
#[derive(Clone)]
pub enum Target {
    Model(Arc<Model>),
    Association(Arc<Association>),
    /// Computed per call from the source object and the field arguments
    Thunk(Arc<ThunkFn>),
}

impl Target {
    pub fn thunk<F, Fut>(f: F) -> Self
    where
        F: Fn(Option<Row>, Map<String, Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Target>> + Send + 'static,
    {
        Target::Thunk(Arc::new(move |source, args| f(source, args).boxed()))
    }

    /// Name used in logs and in [`ResolveInfo::target`].
    fn name(&self) -> &str {
        match self {
            Target::Model(model) => &model.name,
            Target::Association(association) => &association.name,
            Target::Thunk(_) => "<thunk>",
        }
    }

    /// Resolve thunks until a model or an association is reached.
    pub(crate) async fn resolve(
        &self,
        registry: &ModelRegistry,
        source: Option<&Row>,
        args: &Map<String, Value>,
    ) -> Result<(Option<Arc<Association>>, Arc<Model>)> {
        let mut target = self.clone();
        loop {
            match target {
                Target::Model(model) => return Ok((None, model)),
                Target::Association(association) => {
                    let model = registry.target_of(&association)?.clone();
                    return Ok((Some(association), model));
                }
                Target::Thunk(f) => target = f(source.cloned(), args.clone()).await?,
            }
        }
    }
}

impl From<Arc<Model>> for Target {
    fn from(model: Arc<Model>) -> Self {
        Target::Model(model)
    }
}

impl From<Arc<Association>> for Target {
    fn from(association: Arc<Association>) -> Self {
        Target::Association(association)
    }
}

/// Result shape implied by a field's return type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnShape {
    Single,
    List,
    Connection,
}

impl ReturnShape {
    pub fn of(ty: &TypeRef) -> Self {
        match ty {
            TypeRef::NonNull(inner) => Self::of(inner),
            TypeRef::List(_) => ReturnShape::List,
            TypeRef::Named(name) if is_connection(name) => ReturnShape::Connection,
            TypeRef::Named(_) => ReturnShape::Single,
        }
    }
}

/// Everything a resolver knows about the field being resolved.
#[derive(Debug, Clone)]
pub struct ResolveInfo {
    pub field_name: String,
    pub return_type: TypeRef,
    pub shape: ReturnShape,
    /// The parent object, absent for root fields
    pub source: Option<Row>,
    pub args: Map<String, Value>,
    /// Request context values (e.g. `viewer`, `logging`)
    pub context: Map<String, Value>,
    /// Variable values of the GraphQL request
    pub variables: Map<String, Value>,
    /// Name of the model or association being loaded
    pub target: String,
    /// Rows matching the final where clause of a model field, counted on demand
    pub count: Option<RowCount>,
}

/// Deferred `COUNT` over the where clause a model field was resolved with.
///
/// Set before the `after` hook runs so it can report a total for plain list
/// fields without a connection.
#[derive(Clone)]
pub struct RowCount {
    executor: Arc<dyn Executor>,
    model: Arc<Model>,
    options: FindOptions,
}

impl RowCount {
    fn new(executor: Arc<dyn Executor>, model: Arc<Model>, options: &FindOptions) -> Self {
        let options = FindOptions {
            where_clause: options.where_clause.clone(),
            include: options.include.clone(),
            logging: options.logging,
            ..FindOptions::default()
        };
        Self {
            executor,
            model,
            options,
        }
    }

    pub async fn get(&self) -> Result<i64> {
        self.executor.count(&self.model, &self.options).await
    }
}

impl std::fmt::Debug for RowCount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RowCount")
            .field("model", &self.model.name)
            .field("where_clause", &self.options.where_clause)
            .finish()
    }
}

impl ResolveInfo {
    pub fn new(field_name: impl Into<String>, return_type: TypeRef) -> Self {
        Self {
            field_name: field_name.into(),
            shape: ReturnShape::of(&return_type),
            return_type,
            source: None,
            args: Map::new(),
            context: Map::new(),
            variables: Map::new(),
            target: String::new(),
            count: None,
        }
    }

    pub fn with_source(mut self, source: Row) -> Self {
        self.source = Some(source);
        self
    }

    pub fn with_args(mut self, args: Map<String, Value>) -> Self {
        self.args = args;
        self
    }

    pub fn with_context(mut self, context: Map<String, Value>) -> Self {
        self.context = context;
        self
    }

    pub fn with_variables(mut self, variables: Map<String, Value>) -> Self {
        self.variables = variables;
        self
    }

    /// Collect the field's arguments, parent row and request data.
    pub fn from_context(ctx: &ResolverContext<'_>, field_name: &str, return_type: &TypeRef) -> Result<Self> {
        let mut args = Map::new();
        for (name, value) in ctx.args.as_index_map() {
            let value = value
                .clone()
                .into_json()
                .map_err(|e| Error::invalid_argument(name.as_str(), e.to_string()))?;
            args.insert(name.to_string(), value);
        }

        let mut info = Self::new(field_name, return_type.clone()).with_args(args);
        info.source = ctx.parent_value.try_downcast_ref::<Row>().ok().cloned();
        if let Some(context) = ctx.data_opt::<GraphqlContext>() {
            info.context = context.0.clone();
        }
        if let Some(variables) = ctx.data_opt::<RequestVariables>() {
            info.variables = variables.0.clone();
        }
        Ok(info)
    }
}

/// What a resolver produced.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolved {
    One(Option<Row>),
    Many(Vec<Row>),
    Connection(Connection<Row>),
}

impl Resolved {
    /// Wrap the result for the dynamic schema; rows stay typed as [`Row`].
    pub fn into_field_value(self) -> Option<FieldValue<'static>> {
        match self {
            Resolved::One(row) => row.map(FieldValue::owned_any),
            Resolved::Many(rows) => Some(FieldValue::list(rows.into_iter().map(FieldValue::owned_any))),
            Resolved::Connection(connection) => Some(FieldValue::owned_any(connection)),
        }
    }

    pub fn rows(&self) -> Vec<&Row> {
        match self {
            Resolved::One(row) => row.iter().collect(),
            Resolved::Many(rows) => rows.iter().collect(),
            Resolved::Connection(connection) => connection.nodes().collect(),
        }
    }
}

/// Options accepted by [`Resolver::new`].
#[derive(Clone)]
pub struct ResolverOptions {
    /// Force list (or single) results regardless of the return type
    pub list: Option<bool>,
    pub before: Option<BeforeHook>,
    pub after: Option<AfterHook>,
    /// Turn association results into connections for `...Connection` return types
    pub handle_connection: bool,
    /// Context key → `FindOptions::extra` key
    pub context_to_options: Vec<(String, String)>,
    pub required_filters: Vec<String>,
    pub filters_validator: Option<FiltersValidator>,
    pub pagination: PaginationConfig,
}

impl Default for ResolverOptions {
    fn default() -> Self {
        Self {
            list: None,
            before: None,
            after: None,
            handle_connection: true,
            context_to_options: Vec::new(),
            required_filters: Vec::new(),
            filters_validator: None,
            pagination: PaginationConfig::default(),
        }
    }
}

impl ResolverOptions {
    pub fn list(mut self, list: bool) -> Self {
        self.list = Some(list);
        self
    }

    pub fn before<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(FindOptions, Arc<ResolveInfo>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<FindOptions>> + Send + 'static,
    {
        self.before = Some(Arc::new(move |options, info| hook(options, info).boxed()));
        self
    }

    pub fn after<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(Resolved, Arc<ResolveInfo>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Resolved>> + Send + 'static,
    {
        self.after = Some(Arc::new(move |result, info| hook(result, info).boxed()));
        self
    }

    pub fn handle_connection(mut self, handle: bool) -> Self {
        self.handle_connection = handle;
        self
    }

    pub fn context_to_option(mut self, context_key: impl Into<String>, option: impl Into<String>) -> Self {
        let context_key = context_key.into();
        self.context_to_options.retain(|(key, _)| *key != context_key);
        self.context_to_options.push((context_key, option.into()));
        self
    }

    pub fn required_filters<I, S>(mut self, filters: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required_filters = filters.into_iter().map(Into::into).collect();
        self
    }

    pub fn filters_validator<F>(mut self, validator: F) -> Self
    where
        F: Fn(&crate::orm::Where) -> std::result::Result<(), String> + Send + Sync + 'static,
    {
        self.filters_validator = Some(Arc::new(validator));
        self
    }

    pub fn pagination(mut self, pagination: PaginationConfig) -> Self {
        self.pagination = pagination;
        self
    }

    /// Put `defaults` under this resolver's own `context_to_options`.
    pub fn with_default_context_to_options(mut self, defaults: &[(String, String)]) -> Self {
        let own = std::mem::take(&mut self.context_to_options);
        let mut merged: Vec<(String, String)> = defaults
            .iter()
            .filter(|(key, _)| !own.iter().any(|(k, _)| k == key))
            .cloned()
            .collect();
        merged.extend(own);
        self.context_to_options = merged;
        self
    }
}

/// Resolves one field against a model or an association.
#[derive(Clone)]
pub struct Resolver {
    target: Target,
    registry: Arc<ModelRegistry>,
    options: ResolverOptions,
}

/// Shorthand for [`Resolver::new`].
pub fn resolver_factory(
    target: impl Into<Target>,
    registry: Arc<ModelRegistry>,
    options: ResolverOptions,
) -> Resolver {
    Resolver::new(target, registry, options)
}

impl Resolver {
    pub fn new(target: impl Into<Target>, registry: Arc<ModelRegistry>, options: ResolverOptions) -> Self {
        Self {
            target: target.into(),
            registry,
            options,
        }
    }

    pub async fn resolve(&self, executor: Arc<dyn Executor>, mut info: ResolveInfo) -> Result<Resolved> {
        let (association, model) = self
            .target
            .resolve(&self.registry, info.source.as_ref(), &info.args)
            .await?;
        let scope = FilterScope::new(&self.registry, model.clone())?;

        let mut options = args_to_find_options(
            &info.args,
            &scope,
            &self.options.required_filters,
            self.options.filters_validator.as_ref(),
        )?;
        options.attributes = model.attribute_names();
        options.logging = options.logging || info.context.get("logging").is_some_and(is_truthy);
        options.context = info.context.clone();
        options.include = scope.association_names();
        if let Some(order_by) = info.args.get("orderBy").filter(|v| v.is_array()) {
            options.order = parse_order_by(order_by, &scope)?;
        }
        for (context_key, option) in &self.options.context_to_options {
            let value = info.context.get(context_key).cloned().unwrap_or(Value::Null);
            options.extra.insert(option.clone(), value);
        }

        info.target = match &association {
            Some(association) => association.name.clone(),
            None => model.name.clone(),
        };
        let mut info = Arc::new(info);
        tracing::debug!(
            field = %info.field_name,
            target = %info.target,
            "Resolving field"
        );

        if let Some(before) = &self.options.before {
            options = before(options, info.clone()).await?;
        }
        if let Some(clause) = options.where_clause.as_mut()
            && clause.has_variables()
        {
            clause.resolve_variables(&info.variables)?;
        }

        let list = self.options.list.unwrap_or(info.shape == ReturnShape::List);
        if (list || info.shape == ReturnShape::Connection) && options.order.is_empty() {
            options.order.push(primary_key_order(&model));
        }

        if association.is_none() {
            Arc::make_mut(&mut info).count = Some(RowCount::new(executor.clone(), model.clone(), &options));
        }

        let connection = self.options.handle_connection && info.shape == ReturnShape::Connection;
        let result = match association {
            Some(association) => {
                let source = info
                    .source
                    .as_ref()
                    .ok_or_else(|| Error::MissingSource(info.field_name.clone()))?;
                let rows = match source.get(&association.name) {
                    Some(included) => included_rows(&association, included)?,
                    None => {
                        let source_model = self.registry.get(&association.source)?;
                        executor
                            .fetch_association(&association, source_model, &model, source, &options)
                            .await?
                    }
                };
                if connection {
                    let args = ConnectionArgs::from_args(&info.args)?;
                    Resolved::Connection(handle_connection(rows, &args, &self.options.pagination)?)
                } else if list || association.is_multiple() {
                    Resolved::Many(rows)
                } else {
                    Resolved::One(rows.into_iter().next())
                }
            }
            None if connection => {
                let args = ConnectionArgs::from_args(&info.args)?;
                Resolved::Connection(
                    paginate(executor.as_ref(), &model, options, &args, &self.options.pagination).await?,
                )
            }
            None if list => Resolved::Many(executor.find_all(&model, &options).await?),
            None => Resolved::One(executor.find_one(&model, &options).await?),
        };

        match &self.options.after {
            Some(after) => after(result, info).await,
            None => Ok(result),
        }
    }

    /// Build a dynamic field named `name` returning `ty` that resolves through this resolver.
    ///
    /// The executor is taken from the schema data as `Arc<dyn Executor>`.
    pub fn field(self, name: impl Into<String>, ty: TypeRef) -> Field {
        let name = name.into();
        let field_name = name.clone();
        let return_type = ty.clone();
        let resolver = Arc::new(self);

        Field::new(name, ty, move |ctx: ResolverContext| {
            let resolver = resolver.clone();
            let field_name = field_name.clone();
            let return_type = return_type.clone();
            FieldFuture::new(async move {
                let info = ResolveInfo::from_context(&ctx, &field_name, &return_type)?;
                let executor = ctx.data::<Arc<dyn Executor>>()?;
                let resolved = resolver.resolve(executor.clone(), info).await?;
                Ok(resolved.into_field_value())
            })
        })
    }
}

impl std::fmt::Debug for Resolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resolver")
            .field("target", &self.target.name())
            .field("handle_connection", &self.options.handle_connection)
            .finish()
    }
}

/// Count, window and fetch one page of `model` in SQL.
pub(crate) async fn paginate(
    executor: &dyn Executor,
    model: &Model,
    mut options: FindOptions,
    args: &ConnectionArgs,
    config: &PaginationConfig,
) -> Result<Connection<Row>> {
    let total = executor.count(model, &options).await?;
    let window = args.window(total, config)?;
    if window.limit == 0 {
        return Ok(Connection::from_items(Vec::new(), window.offset, total));
    }
    options.offset = Some(window.offset);
    options.limit = Some(window.limit);
    let rows = executor.find_all(model, &options).await?;
    Ok(Connection::from_items(rows, window.offset, total))
}

pub(crate) fn primary_key_order(model: &Model) -> OrderTerm {
    let pk = model.primary_key();
    OrderTerm {
        column: ColumnRef {
            association: None,
            attribute: pk.name.clone(),
            column: pk.field.clone(),
        },
        direction: OrderDirection::Asc,
    }
}

/// Rows of a manually included association value.
fn included_rows(association: &Association, value: &Value) -> Result<Vec<Row>> {
    let invalid = || {
        Error::invalid_argument(
            association.name.as_str(),
            "included value must be an object or a list of objects",
        )
    };
    match value {
        Value::Null => Ok(Vec::new()),
        Value::Object(row) => Ok(vec![row.clone()]),
        Value::Array(items) => items
            .iter()
            .map(|item| item.as_object().cloned().ok_or_else(invalid))
            .collect(),
        _ => Err(invalid()),
    }
}

pub(crate) fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}


#[cfg(test)]
mod tests {
    use super::testing::RecordingExecutor;
    use super::*;
    use crate::orm::fixtures;
    use crate::orm::{Operand, Where, WhereOperator};
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn registry() -> Arc<ModelRegistry> {
        Arc::new(fixtures::registry())
    }

    fn object(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    fn model(registry: &ModelRegistry, name: &str) -> Arc<Model> {
        registry.get(name).unwrap().clone()
    }

    #[test]
    fn test_return_shape() {
        assert_eq!(ReturnShape::of(&TypeRef::named("task")), ReturnShape::Single);
        assert_eq!(ReturnShape::of(&TypeRef::named_nn_list_nn("task")), ReturnShape::List);
        assert_eq!(
            ReturnShape::of(&TypeRef::named_nn("UserTaskConnection")),
            ReturnShape::Connection
        );
    }

    #[tokio::test]
    async fn test_list_field_orders_by_primary_key() {
        let registry = registry();
        let executor = RecordingExecutor::with_rows(vec![json!({ "id": 1, "title": "a" })]);
        let resolver = Resolver::new(model(&registry, "task"), registry.clone(), ResolverOptions::default());

        let info = ResolveInfo::new("tasks", TypeRef::named_list("task"))
            .with_args(object(json!({ "where": { "title": { "like": "a%" } }, "limit": 5 })));
        let result = resolver.resolve(executor.shared(), info).await.unwrap();
        assert_eq!(result.rows().len(), 1);

        let calls = executor.calls();
        let (method, model, options) = &calls[0];
        assert_eq!(method, "find_all");
        assert_eq!(model, "task");
        assert_eq!(options.limit, Some(5));
        assert_eq!(options.order.len(), 1);
        assert_eq!(options.order[0].column.attribute, "id");
        assert_eq!(options.attributes, vec!["id", "title", "dueAt", "userId"]);
        assert_eq!(options.include, vec!["owner"]);
        assert_matches!(
            &options.where_clause,
            Some(Where::Condition { op: WhereOperator::Like, .. })
        );
    }

    #[tokio::test]
    async fn test_single_field_uses_find_one() {
        let registry = registry();
        let executor = RecordingExecutor::with_rows(vec![json!({ "id": 7 }), json!({ "id": 8 })]);
        let resolver = Resolver::new(model(&registry, "user"), registry.clone(), ResolverOptions::default());

        let info = ResolveInfo::new("user", TypeRef::named("user")).with_args(object(json!({ "id": 7 })));
        let result = resolver.resolve(executor.shared(), info).await.unwrap();

        assert_eq!(result, Resolved::One(Some(object(json!({ "id": 7 })))));
        let (_, _, options) = &executor.calls()[0];
        assert_eq!(options.limit, Some(1));
        assert!(options.order.is_empty());
    }

    #[tokio::test]
    async fn test_before_hook_sees_context_and_can_rewrite_options() {
        let registry = registry();
        let executor = RecordingExecutor::default();
        let options = ResolverOptions::default()
            .context_to_option("tenant", "tenantId")
            .before(|mut options: FindOptions, info: Arc<ResolveInfo>| async move {
                assert_eq!(info.context["viewer"]["id"], json!(3));
                assert_eq!(info.target, "task");
                assert_eq!(options.extra["tenantId"], json!("acme"));
                options.limit = Some(2);
                Ok(options)
            });
        let resolver = Resolver::new(model(&registry, "task"), registry.clone(), options);

        let info = ResolveInfo::new("tasks", TypeRef::named_list("task"))
            .with_context(object(json!({ "viewer": { "id": 3 }, "tenant": "acme", "logging": true })));
        resolver.resolve(executor.shared(), info).await.unwrap();

        let (_, _, options) = &executor.calls()[0];
        assert_eq!(options.limit, Some(2));
        assert!(options.logging);
        assert_eq!(options.context["tenant"], json!("acme"));
    }

    #[tokio::test]
    async fn test_before_hook_error_aborts() {
        let registry = registry();
        let executor = RecordingExecutor::default();
        let options = ResolverOptions::default()
            .before(|_, _| async { Err(Error::Hook("not allowed".to_string())) });
        let resolver = Resolver::new(model(&registry, "task"), registry.clone(), options);

        let result = resolver
            .resolve(executor.shared(), ResolveInfo::new("tasks", TypeRef::named_list("task")))
            .await;
        assert_matches!(result, Err(Error::Hook(_)));
        assert!(executor.calls().is_empty());
    }

    #[tokio::test]
    async fn test_required_filters_are_enforced() {
        let registry = registry();
        let executor = RecordingExecutor::default();
        let resolver = Resolver::new(
            model(&registry, "user"),
            registry.clone(),
            ResolverOptions::default().required_filters(["email"]),
        );

        let info = ResolveInfo::new("users", TypeRef::named_list("user"))
            .with_args(object(json!({ "where": { "or": [{ "email": "a@b.c" }, { "active": true }] } })));
        let error = resolver.resolve(executor.shared(), info).await.unwrap_err();
        assert_eq!(error.to_string(), "Missing required filter: email");
    }

    #[tokio::test]
    async fn test_order_by_argument() {
        let registry = registry();
        let executor = RecordingExecutor::default();
        let resolver = Resolver::new(model(&registry, "task"), registry.clone(), ResolverOptions::default());

        let info = ResolveInfo::new("tasks", TypeRef::named_list("task"))
            .with_args(object(json!({ "orderBy": [["owner.firstName", "DESC"]] })));
        resolver.resolve(executor.shared(), info).await.unwrap();
        let (_, _, options) = &executor.calls()[0];
        assert_eq!(options.order[0].column.to_string(), "$owner.first_name$");
        assert_eq!(options.order[0].direction, OrderDirection::Desc);

        let info = ResolveInfo::new("tasks", TypeRef::named_list("task"))
            .with_args(object(json!({ "orderBy": [["secret", "ASC"]] })));
        let error = resolver.resolve(executor.shared(), info).await.unwrap_err();
        assert_eq!(error.to_string(), "Unknown order by: secret");
    }

    #[tokio::test]
    async fn test_variables_are_resolved_after_before_hook() {
        let registry = registry();
        let executor = RecordingExecutor::default();
        let options = ResolverOptions::default().before(|options: FindOptions, _| async move {
            assert!(options.where_clause.as_ref().is_some_and(Where::has_variables));
            Ok(options)
        });
        let resolver = Resolver::new(model(&registry, "user"), registry.clone(), options);

        let info = ResolveInfo::new("users", TypeRef::named_list("user"))
            .with_args(object(json!({ "where": { "email": { "$var": "email" } } })))
            .with_variables(object(json!({ "email": "x@y.z" })));
        resolver.resolve(executor.shared(), info).await.unwrap();

        let (_, _, options) = &executor.calls()[0];
        assert_matches!(
            &options.where_clause,
            Some(Where::Condition { operand: Operand::Value(v), .. }) if v == "x@y.z"
        );
    }

    #[tokio::test]
    async fn test_association_is_narrowed_by_source_key() {
        let registry = registry();
        let user = model(&registry, "user");
        let tasks = user.get_association("tasks").unwrap().clone();
        let executor = RecordingExecutor::with_rows(vec![json!({ "id": 1 }), json!({ "id": 2 })]);
        let resolver = Resolver::new(tasks, registry.clone(), ResolverOptions::default());

        let info = ResolveInfo::new("tasks", TypeRef::named_list("task"))
            .with_source(object(json!({ "id": 42, "email": "a@b.c" })));
        let result = resolver.resolve(executor.shared(), info).await.unwrap();
        assert_eq!(result.rows().len(), 2);

        let (_, model, options) = &executor.calls()[0];
        assert_eq!(model, "task");
        assert_matches!(
            &options.where_clause,
            Some(Where::Condition { column, operand: Operand::Value(v), .. })
                if column.column == "user_id" && v == 42
        );
    }

    #[tokio::test]
    async fn test_manual_include_skips_the_executor() {
        let registry = registry();
        let user = model(&registry, "user");
        let tasks = user.get_association("tasks").unwrap().clone();
        let executor = RecordingExecutor::default();
        let resolver = Resolver::new(tasks, registry.clone(), ResolverOptions::default());

        let source = object(json!({
            "id": 1,
            "tasks": [{ "id": 1 }, { "id": 2 }, { "id": 3 }]
        }));
        let info = ResolveInfo::new("tasks", TypeRef::named_nn("UserTaskConnection"))
            .with_source(source)
            .with_args(object(json!({ "first": 2 })));
        let result = resolver.resolve(executor.shared(), info).await.unwrap();

        assert!(executor.calls().is_empty());
        let connection = assert_matches!(result, Resolved::Connection(c) => c);
        assert_eq!(connection.edges.len(), 2);
        assert_eq!(connection.page_info.total_count, Some(3));
        assert!(connection.page_info.has_next_page);
    }

    #[tokio::test]
    async fn test_association_without_source_fails() {
        let registry = registry();
        let owner = model(&registry, "task").get_association("owner").unwrap().clone();
        let resolver = Resolver::new(owner, registry.clone(), ResolverOptions::default());

        let result = resolver
            .resolve(RecordingExecutor::default().shared(), ResolveInfo::new("owner", TypeRef::named("user")))
            .await;
        assert_matches!(result, Err(Error::MissingSource(field)) if field == "owner");
    }

    #[tokio::test]
    async fn test_thunk_target_and_after_hook() {
        let registry = registry();
        let user = model(&registry, "user");
        let executor = RecordingExecutor::with_rows(vec![json!({ "id": 1 }), json!({ "id": 2 })]);
        let target = Target::thunk(move |_, _| {
            let user = user.clone();
            async move { Ok(Target::Model(user)) }
        });
        let options = ResolverOptions::default().after(|result, _| async move {
            match result {
                Resolved::Many(mut rows) => {
                    rows.reverse();
                    Ok(Resolved::Many(rows))
                }
                other => Ok(other),
            }
        });
        let resolver = Resolver::new(target, registry.clone(), options);

        let result = resolver
            .resolve(executor.shared(), ResolveInfo::new("users", TypeRef::named_list("user")))
            .await
            .unwrap();
        assert_eq!(result.rows()[0]["id"], json!(2));
        assert_eq!(executor.calls()[0].1, "user");
    }

    #[tokio::test]
    async fn test_model_connection_pages_in_sql() {
        let registry = registry();
        let executor = RecordingExecutor::with_rows(
            (1..=5).map(|id| json!({ "id": id })).collect(),
        );
        let resolver = Resolver::new(model(&registry, "task"), registry.clone(), ResolverOptions::default());

        let info = ResolveInfo::new("tasks", TypeRef::named_nn("TaskConnection"))
            .with_args(object(json!({ "first": 2, "after": crate::graphql::pagination::encode_cursor(0) })));
        let connection = assert_matches!(
            resolver.resolve(executor.shared(), info).await.unwrap(),
            Resolved::Connection(c) => c
        );

        let calls = executor.calls();
        assert_eq!(calls[0].0, "count");
        assert_eq!(calls[1].2.offset, Some(1));
        assert_eq!(calls[1].2.limit, Some(2));
        assert_eq!(connection.edges[0].node["id"], json!(2));
        assert_eq!(connection.page_info.total_count, Some(5));
    }

    #[test]
    fn test_default_context_to_options_merge() {
        let options = ResolverOptions::default()
            .context_to_option("tenant", "tenantId")
            .with_default_context_to_options(&[
                ("tenant".to_string(), "defaultTenant".to_string()),
                ("locale".to_string(), "locale".to_string()),
            ]);
        assert_eq!(
            options.context_to_options,
            vec![
                ("locale".to_string(), "locale".to_string()),
                ("tenant".to_string(), "tenantId".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_after_hook_counts_filtered_rows() {
        let registry = registry();
        let executor = RecordingExecutor::with_rows(vec![json!({ "id": 1 }), json!({ "id": 2 }), json!({ "id": 3 })]);
        let seen: Arc<std::sync::Mutex<Option<i64>>> = Arc::default();
        let recorder = seen.clone();
        let options = ResolverOptions::default().after(move |result: Resolved, info: Arc<ResolveInfo>| {
            let recorder = recorder.clone();
            async move {
                let count = info.count.as_ref().ok_or_else(|| Error::Hook("no count".into()))?;
                *recorder.lock().unwrap() = Some(count.get().await?);
                Ok(result)
            }
        });
        let resolver = Resolver::new(model(&registry, "task"), registry.clone(), options);

        let info = ResolveInfo::new("tasks", TypeRef::named_list("task"))
            .with_args(object(json!({ "where": { "title": { "like": "a%" } }, "limit": 2, "offset": 1 })));
        let result = resolver.resolve(executor.shared(), info).await.unwrap();
        assert_eq!(result.rows().len(), 2);
        assert_eq!(*seen.lock().unwrap(), Some(3));

        let calls = executor.calls();
        let (method, model, options) = &calls[1];
        assert_eq!(method, "count");
        assert_eq!(model, "task");
        assert_eq!(options.limit, None);
        assert_eq!(options.offset, None);
        assert!(options.where_clause.is_some());
    }

    #[tokio::test]
    async fn test_list_option_overrides_return_type() {
        let registry = registry();
        let executor = RecordingExecutor::with_rows(vec![json!({ "id": 1 }), json!({ "id": 2 })]);

        let resolver = Resolver::new(
            model(&registry, "task"),
            registry.clone(),
            ResolverOptions::default().list(true),
        );
        let result = resolver
            .resolve(executor.shared(), ResolveInfo::new("tasks", TypeRef::named("task")))
            .await
            .unwrap();
        assert_matches!(result, Resolved::Many(rows) if rows.len() == 2);
        let (_, _, options) = &executor.calls()[0];
        assert_eq!(options.limit, None);
        assert_eq!(options.order[0].column.attribute, "id");

        let resolver = Resolver::new(
            model(&registry, "task"),
            registry.clone(),
            ResolverOptions::default().list(false),
        );
        let result = resolver
            .resolve(executor.shared(), ResolveInfo::new("tasks", TypeRef::named_list("task")))
            .await
            .unwrap();
        assert_eq!(result, Resolved::One(Some(object(json!({ "id": 1 })))));
        let (_, _, options) = &executor.calls()[1];
        assert_eq!(options.limit, Some(1));
        assert!(options.order.is_empty());
    }

    #[tokio::test]
    async fn test_without_handle_connection_after_hook_builds_the_page() {
        let registry = registry();
        let tasks = model(&registry, "user").get_association("tasks").unwrap().clone();
        let executor = RecordingExecutor::with_rows(vec![json!({ "id": 1 }), json!({ "id": 2 }), json!({ "id": 3 })]);
        let options = ResolverOptions::default()
            .handle_connection(false)
            .after(|result: Resolved, info: Arc<ResolveInfo>| async move {
                assert!(info.count.is_none());
                let rows = assert_matches!(result, Resolved::Many(rows) => rows);
                let args = ConnectionArgs::from_args(&info.args)?;
                Ok(Resolved::Connection(handle_connection(
                    rows,
                    &args,
                    &PaginationConfig::default(),
                )?))
            });
        let resolver = Resolver::new(tasks, registry.clone(), options);

        let info = ResolveInfo::new("tasks", TypeRef::named_nn("UserTaskConnection"))
            .with_source(object(json!({ "id": 1 })))
            .with_args(object(json!({ "first": 2 })));
        let connection = assert_matches!(
            resolver.resolve(executor.shared(), info).await.unwrap(),
            Resolved::Connection(c) => c
        );
        assert_eq!(connection.edges.len(), 2);
        assert_eq!(connection.page_info.total_count, Some(3));

        let calls = executor.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "find_all");
    }
}
