//! Model registration
//!
//! Models describe a table: its attributes (with the column each one maps
//! to), which of them may be used in filters, and the associations to other
//! models. Resolvers and the query builder read everything they need from
//! here, so a model is registered once and shared behind an `Arc`.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::{Error, Result};

/// Storage type of an attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    Integer,
    Float,
    String,
    Text,
    Boolean,
    DateTime,
    Json,
}

impl DataType {
    /// SQLite column type
    pub fn sql_type(&self) -> &'static str {
        match self {
            DataType::Integer | DataType::Boolean => "INTEGER",
            DataType::Float => "REAL",
            DataType::String | DataType::Text | DataType::DateTime | DataType::Json => "TEXT",
        }
    }
}

/// A single model attribute.
#[derive(Debug, Clone)]
pub struct Attribute {
    /// Attribute name as exposed over GraphQL
    pub name: String,
    /// Column name in the database
    pub field: String,
    pub data_type: DataType,
    pub primary_key: bool,
    /// Whether the attribute may appear in `where` and `orderBy` arguments
    pub filterable: bool,
    pub allow_null: bool,
    pub description: Option<String>,
}

impl Attribute {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        let name = name.into();
        Self {
            field: name.clone(),
            name,
            data_type,
            primary_key: false,
            filterable: false,
            allow_null: true,
            description: None,
        }
    }

    /// Map the attribute onto a differently named column.
    pub fn field(mut self, field: impl Into<String>) -> Self {
        self.field = field.into();
        self
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.allow_null = false;
        self
    }

    pub fn filterable(mut self) -> Self {
        self.filterable = true;
        self
    }

    pub fn not_null(mut self) -> Self {
        self.allow_null = false;
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Column definition used by `CREATE TABLE`.
    pub fn column_sql(&self) -> String {
        let mut sql = format!("\"{}\" {}", self.field, self.data_type.sql_type());
        if self.primary_key {
            sql.push_str(" PRIMARY KEY");
        } else if !self.allow_null {
            sql.push_str(" NOT NULL");
        }
        sql
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssociationKind {
    BelongsTo,
    HasOne,
    HasMany,
}

/// A named link from one model to another.
///
/// For `BelongsTo` the foreign key lives on the source model and points at
/// the target's primary key; for `HasOne`/`HasMany` it lives on the target
/// and points back at the source's primary key.
#[derive(Debug, Clone)]
pub struct Association {
    /// Name the association is accessed by (e.g. `tasks`)
    pub name: String,
    pub kind: AssociationKind,
    /// Name of the owning model
    pub source: String,
    /// Name of the associated model
    pub target: String,
    /// Attribute name of the foreign key
    pub foreign_key: String,
}

impl Association {
    pub fn belongs_to(
        name: impl Into<String>,
        target: impl Into<String>,
        foreign_key: impl Into<String>,
    ) -> Self {
        Self::with_kind(AssociationKind::BelongsTo, name, target, foreign_key)
    }

    pub fn has_one(
        name: impl Into<String>,
        target: impl Into<String>,
        foreign_key: impl Into<String>,
    ) -> Self {
        Self::with_kind(AssociationKind::HasOne, name, target, foreign_key)
    }

    pub fn has_many(
        name: impl Into<String>,
        target: impl Into<String>,
        foreign_key: impl Into<String>,
    ) -> Self {
        Self::with_kind(AssociationKind::HasMany, name, target, foreign_key)
    }

    fn with_kind(
        kind: AssociationKind,
        name: impl Into<String>,
        target: impl Into<String>,
        foreign_key: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            source: String::new(),
            target: target.into(),
            foreign_key: foreign_key.into(),
        }
    }

    pub fn is_multiple(&self) -> bool {
        self.kind == AssociationKind::HasMany
    }
}

/// A registered model (one table).
#[derive(Debug, Clone)]
pub struct Model {
    pub name: String,
    pub table: String,
    attributes: Vec<Attribute>,
    associations: Vec<Arc<Association>>,
}

impl Model {
    pub fn new(name: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table: table.into(),
            attributes: Vec::new(),
            associations: Vec::new(),
        }
    }

    pub fn attribute(mut self, attribute: Attribute) -> Self {
        self.attributes.push(attribute);
        self
    }

    pub fn association(mut self, mut association: Association) -> Self {
        association.source = self.name.clone();
        self.associations.push(Arc::new(association));
        self
    }

    /// All attributes in declaration order.
    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    pub fn associations(&self) -> &[Arc<Association>] {
        &self.associations
    }

    pub fn get_attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.name == name)
    }

    /// Look up an association by name, ignoring case.
    pub fn get_association(&self, name: &str) -> Option<&Arc<Association>> {
        self.associations
            .iter()
            .find(|a| a.name.eq_ignore_ascii_case(name))
    }

    pub fn primary_key(&self) -> &Attribute {
        // `ModelRegistry::register` guarantees exactly one primary key.
        self.attributes
            .iter()
            .find(|a| a.primary_key)
            .unwrap_or(&self.attributes[0])
    }

    /// Attribute name of the primary key (e.g. `id`)
    pub fn primary_key_attribute(&self) -> &str {
        &self.primary_key().name
    }

    pub fn filterable_attributes(&self) -> impl Iterator<Item = &Attribute> {
        self.attributes.iter().filter(|a| a.filterable)
    }

    pub fn is_filterable(&self, name: &str) -> bool {
        self.get_attribute(name).is_some_and(|a| a.filterable)
    }

    /// Column backing an attribute, or the name itself when unknown.
    pub fn column_for<'a>(&'a self, attribute: &'a str) -> &'a str {
        self.get_attribute(attribute)
            .map(|a| a.field.as_str())
            .unwrap_or(attribute)
    }

    pub fn attribute_names(&self) -> Vec<String> {
        self.attributes.iter().map(|a| a.name.clone()).collect()
    }

    /// Generate CREATE TABLE IF NOT EXISTS SQL
    pub fn create_table_sql(&self) -> String {
        let column_defs: Vec<String> = self.attributes.iter().map(|a| a.column_sql()).collect();

        format!(
            "CREATE TABLE IF NOT EXISTS \"{}\" (\n  {}\n)",
            self.table,
            column_defs.join(",\n  ")
        )
    }
}

/// Every model known to a schema, keyed by model name.
#[derive(Debug, Clone, Default)]
pub struct ModelRegistry {
    models: BTreeMap<String, Arc<Model>>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a model. It must declare exactly one primary key.
    pub fn register(mut self, model: Model) -> Result<Self> {
        let keys = model.attributes.iter().filter(|a| a.primary_key).count();
        if keys != 1 {
            return Err(Error::InvalidModel(format!(
                "model `{}` must declare exactly one primary key, found {}",
                model.name, keys
            )));
        }
        if self.models.contains_key(&model.name) {
            return Err(Error::InvalidModel(format!(
                "model `{}` is already registered",
                model.name
            )));
        }
        tracing::debug!(model = %model.name, table = %model.table, "Registered model");
        self.models.insert(model.name.clone(), Arc::new(model));
        Ok(self)
    }

    /// Check that every association points at a registered model with the
    /// foreign key it names.
    pub fn finish(self) -> Result<Self> {
        for model in self.models.values() {
            for association in model.associations() {
                let target = self.get(&association.target)?;
                let key_owner = match association.kind {
                    AssociationKind::BelongsTo => model.as_ref(),
                    AssociationKind::HasOne | AssociationKind::HasMany => target.as_ref(),
                };
                if key_owner.get_attribute(&association.foreign_key).is_none() {
                    return Err(Error::InvalidModel(format!(
                        "association `{}.{}` names unknown foreign key `{}`",
                        model.name, association.name, association.foreign_key
                    )));
                }
            }
        }
        Ok(self)
    }

    pub fn get(&self, name: &str) -> Result<&Arc<Model>> {
        self.models
            .get(name)
            .ok_or_else(|| Error::UnknownModel(name.to_string()))
    }

    pub fn models(&self) -> impl Iterator<Item = &Arc<Model>> {
        self.models.values()
    }

    /// Resolve the model an association points at.
    pub fn target_of(&self, association: &Association) -> Result<&Arc<Model>> {
        self.get(&association.target)
    }

    pub fn create_tables_sql(&self) -> Vec<String> {
        self.models.values().map(|m| m.create_table_sql()).collect()
    }
}
