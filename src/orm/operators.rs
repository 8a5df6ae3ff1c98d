//! GraphQL-safe operator names
//!
//! GraphQL argument keys cannot carry the `$` prefix ORM operators are usually
//! spelled with, so filters use plain names (`gte`, `notIn`, `iLike`, ...)
//! which are mapped to SQL operators here.

/// Comparison operators usable on a single attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WhereOperator {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    Is,
    Not,
    In,
    NotIn,
    Like,
    NotLike,
    ILike,
    NotILike,
    StartsWith,
    EndsWith,
    Substring,
    Between,
    NotBetween,
}

impl WhereOperator {
    pub const ALL: [WhereOperator; 19] = [
        WhereOperator::Eq,
        WhereOperator::Ne,
        WhereOperator::Gt,
        WhereOperator::Gte,
        WhereOperator::Lt,
        WhereOperator::Lte,
        WhereOperator::Is,
        WhereOperator::Not,
        WhereOperator::In,
        WhereOperator::NotIn,
        WhereOperator::Like,
        WhereOperator::NotLike,
        WhereOperator::ILike,
        WhereOperator::NotILike,
        WhereOperator::StartsWith,
        WhereOperator::EndsWith,
        WhereOperator::Substring,
        WhereOperator::Between,
        WhereOperator::NotBetween,
    ];

    /// Look up an operator by the key used in GraphQL arguments.
    pub fn from_graphql_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.graphql_name() == name)
    }

    pub fn graphql_name(&self) -> &'static str {
        match self {
            WhereOperator::Eq => "eq",
            WhereOperator::Ne => "ne",
            WhereOperator::Gt => "gt",
            WhereOperator::Gte => "gte",
            WhereOperator::Lt => "lt",
            WhereOperator::Lte => "lte",
            WhereOperator::Is => "is",
            WhereOperator::Not => "not",
            WhereOperator::In => "in",
            WhereOperator::NotIn => "notIn",
            WhereOperator::Like => "like",
            WhereOperator::NotLike => "notLike",
            WhereOperator::ILike => "iLike",
            WhereOperator::NotILike => "notILike",
            WhereOperator::StartsWith => "startsWith",
            WhereOperator::EndsWith => "endsWith",
            WhereOperator::Substring => "substring",
            WhereOperator::Between => "between",
            WhereOperator::NotBetween => "notBetween",
        }
    }

    /// SQL comparison for operators that render as `column <op> ?`.
    pub fn sql_comparison(&self) -> Option<&'static str> {
        match self {
            WhereOperator::Eq => Some("="),
            WhereOperator::Ne => Some("!="),
            WhereOperator::Gt => Some(">"),
            WhereOperator::Gte => Some(">="),
            WhereOperator::Lt => Some("<"),
            WhereOperator::Lte => Some("<="),
            WhereOperator::Is => Some("IS"),
            WhereOperator::Not => Some("IS NOT"),
            WhereOperator::Like => Some("LIKE"),
            WhereOperator::NotLike => Some("NOT LIKE"),
            _ => None,
        }
    }

    /// Operators whose operand is a list.
    pub fn takes_list(&self) -> bool {
        matches!(
            self,
            WhereOperator::In
                | WhereOperator::NotIn
                | WhereOperator::Between
                | WhereOperator::NotBetween
        )
    }
}

impl std::fmt::Display for WhereOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.graphql_name())
    }
}

/// Operators combining several conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOperator {
    And,
    Or,
    Not,
}

impl LogicalOperator {
    pub fn from_graphql_name(name: &str) -> Option<Self> {
        match name {
            "and" => Some(LogicalOperator::And),
            "or" => Some(LogicalOperator::Or),
            "not" => Some(LogicalOperator::Not),
            _ => None,
        }
    }
}
