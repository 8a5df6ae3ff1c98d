//! GraphQL schema assembly
//!
//! Builds a dynamic schema from a [`ModelRegistry`]: one object type per
//! model, association fields resolved through [`Resolver`], and root query
//! fields for every model.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_graphql::dynamic::{Field, Object, Schema, SchemaError, Type, TypeRef};

use super::connection::{ModelConnection, page_info_type};
use super::pagination::PaginationConfig;
use super::resolver::{Resolver, ResolverOptions};
use super::types::{AttributeFieldOptions, default_args, default_list_args, json_scalar, object_type};
use crate::orm::{Executor, Model, ModelRegistry};

/// Name of the root query type
pub const QUERY: &str = "Query";

/// Builds a dynamic schema over a model registry.
pub struct SchemaBuilder {
    registry: Arc<ModelRegistry>,
    executor: Arc<dyn Executor>,
    pagination: PaginationConfig,
    context_to_options: Vec<(String, String)>,
    attribute_options: BTreeMap<String, AttributeFieldOptions>,
    model_fields: BTreeMap<String, Vec<Field>>,
    query_fields: Vec<Field>,
    types: Vec<Type>,
}

impl SchemaBuilder {
    pub fn new(registry: Arc<ModelRegistry>, executor: Arc<dyn Executor>) -> Self {
        Self {
            registry,
            executor,
            pagination: PaginationConfig::default(),
            context_to_options: Vec::new(),
            attribute_options: BTreeMap::new(),
            model_fields: BTreeMap::new(),
            query_fields: Vec::new(),
            types: Vec::new(),
        }
    }

    pub fn registry(&self) -> &Arc<ModelRegistry> {
        &self.registry
    }

    pub fn pagination(mut self, pagination: PaginationConfig) -> Self {
        self.pagination = pagination;
        self
    }

    /// Copy a context value into `FindOptions::extra` for every generated resolver.
    pub fn context_to_option(mut self, context_key: impl Into<String>, option: impl Into<String>) -> Self {
        self.context_to_options.push((context_key.into(), option.into()));
        self
    }

    /// Choose which attributes of `model` are exposed.
    pub fn attribute_options(mut self, model: impl Into<String>, options: AttributeFieldOptions) -> Self {
        self.attribute_options.insert(model.into(), options);
        self
    }

    /// Add a field to the object type of `model`.
    pub fn model_field(mut self, model: impl Into<String>, field: Field) -> Self {
        self.model_fields.entry(model.into()).or_default().push(field);
        self
    }

    /// Add a root query field.
    pub fn query_field(mut self, field: Field) -> Self {
        self.query_fields.push(field);
        self
    }

    /// Register an additional type (e.g. an object holding connection fields).
    pub fn register(mut self, ty: impl Into<Type>) -> Self {
        self.types.push(ty.into());
        self
    }

    /// Register the types a connection needs.
    pub fn connection(mut self, connection: &ModelConnection) -> Self {
        self.types.extend(connection.types());
        self
    }

    /// Resolver options carrying the schema-wide defaults.
    pub fn resolver_options(&self) -> ResolverOptions {
        ResolverOptions::default()
            .pagination(self.pagination)
            .with_default_context_to_options(&self.context_to_options)
    }

    pub fn finish(mut self) -> Result<Schema, SchemaError> {
        let mut query = Object::new(QUERY);
        let mut objects = Vec::new();

        let registry = self.registry.clone();
        for model in registry.models() {
            objects.push(self.model_object(model));

            let single = Resolver::new(model.clone(), self.registry.clone(), self.resolver_options())
                .field(&model.name, TypeRef::named(&model.name));
            query = query.field(
                default_args(model)
                    .into_iter()
                    .fold(single, |field, arg| field.argument(arg)),
            );

            let list = Resolver::new(model.clone(), self.registry.clone(), self.resolver_options())
                .field(&model.table, TypeRef::named_nn_list_nn(&model.name));
            query = query.field(
                default_list_args()
                    .into_iter()
                    .fold(list, |field, arg| field.argument(arg)),
            );
        }
        for field in std::mem::take(&mut self.query_fields) {
            query = query.field(field);
        }

        tracing::info!(
            models = self.registry.models().count(),
            types = self.types.len(),
            "Building GraphQL schema"
        );

        let mut builder = Schema::build(QUERY, None, None)
            .register(json_scalar())
            .register(page_info_type())
            .register(query);
        for object in objects {
            builder = builder.register(object);
        }
        for ty in self.types {
            builder = builder.register(ty);
        }
        builder
            .data(self.executor)
            .data(self.registry)
            .finish()
    }

    /// Object type of `model`: attribute fields, association fields and extra fields.
    fn model_object(&mut self, model: &Model) -> Object {
        let options = self
            .attribute_options
            .get(&model.name)
            .cloned()
            .unwrap_or_default();
        let mut object = object_type(model, &options);

        for association in model.associations() {
            let target = &association.target;
            let resolver = Resolver::new(association.clone(), self.registry.clone(), self.resolver_options());
            object = object.field(if association.is_multiple() {
                default_list_args().into_iter().fold(
                    resolver.field(&association.name, TypeRef::named_nn_list_nn(target)),
                    |field, arg| field.argument(arg),
                )
            } else {
                resolver.field(&association.name, TypeRef::named(target))
            });
        }

        for field in self.model_fields.remove(&model.name).unwrap_or_default() {
            object = object.field(field);
        }
        object
    }
}
