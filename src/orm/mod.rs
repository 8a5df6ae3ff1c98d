//! ORM Layer
//!
//! Provides the model registry and the translation from loosely typed
//! GraphQL arguments into executable queries:
//! - Model registration (attributes, columns, associations)
//! - Where-clause rewriting with attribute allow-lists
//! - Find options (ordering, pagination, required filters)
//! - SQL query generation (parameterized via sqlx)
//!
//! # Example
//!
//! ```rust,ignore
//! let scope = FilterScope::new(&registry, user.clone())?;
//! let args = json!({ "where": { "email": { "like": "%@example.com" } }, "limit": 10 });
//! let options = args_to_find_options(args.as_object().unwrap(), &scope, &[], None)?;
//! let users = executor.find_all(&user, &options).await?;
//! ```

mod builder;
mod filter;
mod model;
mod operators;
mod options;
mod traits;

pub use builder::*;
pub use filter::*;
pub use model::*;
pub use operators::*;
pub use options::*;
pub use traits::*;

#[cfg(test)]
pub(crate) use model::fixtures;
