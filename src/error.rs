//! Error type shared by the ORM and GraphQL layers

/// Errors raised while translating GraphQL arguments or executing the resulting query.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Unknown attribute: {0}")]
    UnknownAttribute(String),

    #[error("Unknown operator: {0}")]
    UnknownOperator(String),

    #[error("Unknown order by: {0}")]
    UnknownOrderBy(String),

    #[error("Missing required filter: {0}")]
    MissingRequiredFilter(String),

    #[error("Invalid filter: {0}")]
    InvalidFilter(String),

    #[error("Invalid argument `{name}`: {reason}")]
    InvalidArgument { name: String, reason: String },

    #[error("Invalid cursor: {0}")]
    InvalidCursor(&'static str),

    #[error("Unknown model: {0}")]
    UnknownModel(String),

    #[error("Unknown association: {model}.{association}")]
    UnknownAssociation { model: String, association: String },

    #[error("Invalid model definition: {0}")]
    InvalidModel(String),

    #[error("Field `{0}` resolves an association but has no source object")]
    MissingSource(String),

    #[error("Resolver hook failed: {0}")]
    Hook(String),

    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

impl Error {
    pub(crate) fn invalid_argument(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::InvalidArgument {
            name: name.into(),
            reason: reason.into(),
        }
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
