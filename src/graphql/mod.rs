//! GraphQL layer
//!
//! Exposes registered models through an `async-graphql` dynamic schema:
//! - Object types generated from model attributes
//! - A resolver factory turning field arguments into find options
//! - Relay connections paginated in SQL
//!
//! Request context values are attached as [`GraphqlContext`] and the request's
//! variables as [`RequestVariables`]; resolvers read both from the dynamic
//! resolver context.

pub mod connection;
pub mod pagination;
pub mod resolver;
mod schema;
pub mod types;

pub use connection::{ModelConnection, ModelConnectionBuilder, OrderByValue, page_info_type};
pub use pagination::{Connection, ConnectionArgs, Edge, PageInfo, PaginationConfig};
pub use resolver::{Resolved, ResolveInfo, Resolver, ResolverOptions, RowCount, Target, resolver_factory};
pub use schema::{QUERY, SchemaBuilder};
pub use types::{AttributeFieldOptions, GraphqlContext, RequestVariables};
