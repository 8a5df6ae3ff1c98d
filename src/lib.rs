//! gqlorm - GraphQL arguments to relational queries
//!
//! Models are registered in an [`orm::ModelRegistry`]. The GraphQL layer
//! rewrites `where`, `order`, `orderBy` and pagination arguments into
//! [`orm::FindOptions`], validates them against the models' filterable
//! attributes, and runs them through an [`orm::Executor`].

pub mod error;
pub mod graphql;
pub mod logging;
pub mod orm;

pub use error::{Error, Result};
