//! Cursor-based pagination types for GraphQL
//!
//! Implements the Relay Connection specification for consistent pagination
//! across list queries. Cursors encode the absolute offset of a row in the
//! (filtered, ordered) result, so the same cursor format serves both SQL-level
//! windows and in-memory slicing of already loaded rows.

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// Page size limits applied to connection arguments.
#[derive(Debug, Clone, Copy)]
pub struct PaginationConfig {
    /// Page size used when neither `first` nor `last` is given
    pub default_limit: i64,
    /// Upper bound for `first` and `last`
    pub max_limit: i64,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            default_limit: 25,
            max_limit: 100,
        }
    }
}

/// Information about pagination in a connection
#[derive(Serialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    /// When paginating forwards, are there more items?
    pub has_next_page: bool,
    /// When paginating backwards, are there more items?
    pub has_previous_page: bool,
    /// Cursor of the first item in this page
    pub start_cursor: Option<String>,
    /// Cursor of the last item in this page
    pub end_cursor: Option<String>,
    /// Total count of items (if available)
    pub total_count: Option<i64>,
}

/// An edge in a connection, containing a node and cursor
#[derive(Debug, Clone, PartialEq)]
pub struct Edge<T> {
    /// The item at the end of the edge
    pub node: T,
    /// A cursor for pagination
    pub cursor: String,
}

/// A paginated connection result
#[derive(Debug, Clone, PartialEq)]
pub struct Connection<T> {
    /// The edges in this connection
    pub edges: Vec<Edge<T>>,
    /// Pagination information
    pub page_info: PageInfo,
}

impl<T> Connection<T> {
    /// Create an empty connection
    pub fn empty() -> Self {
        Self {
            edges: Vec::new(),
            page_info: PageInfo {
                has_next_page: false,
                has_previous_page: false,
                start_cursor: None,
                end_cursor: None,
                total_count: Some(0),
            },
        }
    }

    /// Create a connection from one page of items
    ///
    /// # Arguments
    /// * `items` - The items to include in this page
    /// * `offset` - The offset of the first item (for cursor generation)
    /// * `total` - Total count of items matching the query
    pub fn from_items(items: Vec<T>, offset: i64, total: i64) -> Self {
        let has_next_page = (offset + items.len() as i64) < total;
        let has_previous_page = offset > 0;

        let edges: Vec<Edge<T>> = items
            .into_iter()
            .enumerate()
            .map(|(i, node)| Edge {
                cursor: encode_cursor(offset + i as i64),
                node,
            })
            .collect();

        let page_info = PageInfo {
            has_next_page,
            has_previous_page,
            start_cursor: edges.first().map(|e| e.cursor.clone()),
            end_cursor: edges.last().map(|e| e.cursor.clone()),
            total_count: Some(total),
        };

        Self { edges, page_info }
    }

    pub fn nodes(&self) -> impl Iterator<Item = &T> {
        self.edges.iter().map(|e| &e.node)
    }
}

/// Encode an offset as a cursor string
pub fn encode_cursor(offset: i64) -> String {
    BASE64.encode(format!("cursor:{}", offset))
}

/// Decode a cursor string to an offset
pub fn decode_cursor(cursor: &str) -> Result<i64> {
    let decoded = BASE64
        .decode(cursor)
        .map_err(|_| Error::InvalidCursor("invalid cursor format"))?;

    let s = String::from_utf8(decoded).map_err(|_| Error::InvalidCursor("invalid cursor encoding"))?;

    let offset = s
        .strip_prefix("cursor:")
        .ok_or(Error::InvalidCursor("invalid cursor prefix"))?;

    match offset.parse::<i64>() {
        Ok(n) if n >= 0 => Ok(n),
        _ => Err(Error::InvalidCursor("invalid cursor value")),
    }
}

/// Connection types are named `<Node>Connection`.
pub fn is_connection(type_name: &str) -> bool {
    type_name.len() > "Connection".len() && type_name.ends_with("Connection")
}

/// Relay connection arguments.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionArgs {
    pub first: Option<i64>,
    pub after: Option<String>,
    pub last: Option<i64>,
    pub before: Option<String>,
}

/// Slice of a result selected by connection arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub offset: i64,
    pub limit: i64,
}

impl ConnectionArgs {
    /// Read `first`, `after`, `last` and `before` from field arguments.
    pub fn from_args(args: &Map<String, Value>) -> Result<Self> {
        let count = |name: &str| -> Result<Option<i64>> {
            match args.get(name) {
                None | Some(Value::Null) => Ok(None),
                Some(Value::Number(n)) => match n.as_i64() {
                    Some(n) if n >= 0 => Ok(Some(n)),
                    _ => Err(Error::invalid_argument(name, "must be a non-negative integer")),
                },
                Some(_) => Err(Error::invalid_argument(name, "expected an integer")),
            }
        };
        let cursor = |name: &str| -> Result<Option<String>> {
            match args.get(name) {
                None | Some(Value::Null) => Ok(None),
                Some(Value::String(s)) => Ok(Some(s.clone())),
                Some(_) => Err(Error::invalid_argument(name, "expected a cursor string")),
            }
        };

        Ok(Self {
            first: count("first")?,
            after: cursor("after")?,
            last: count("last")?,
            before: cursor("before")?,
        })
    }

    /// Compute the offset/limit window over `total` rows.
    pub fn window(&self, total: i64, config: &PaginationConfig) -> Result<Window> {
        let mut start = match &self.after {
            Some(cursor) => decode_cursor(cursor)?.saturating_add(1).min(total),
            None => 0,
        };
        let mut end = match &self.before {
            Some(cursor) => decode_cursor(cursor)?.min(total),
            None => total,
        };
        start = start.min(end);

        let first = match (self.first, self.last) {
            (None, None) => Some(config.default_limit),
            (first, _) => first,
        };
        if let Some(first) = first {
            end = end.min(start + first.min(config.max_limit));
        }
        if let Some(last) = self.last {
            start = start.max(end - last.min(config.max_limit));
        }

        Ok(Window {
            offset: start,
            limit: end - start,
        })
    }
}

/// Paginate rows that are already in memory.
pub fn handle_connection<T>(
    rows: Vec<T>,
    args: &ConnectionArgs,
    config: &PaginationConfig,
) -> Result<Connection<T>> {
    let total = rows.len() as i64;
    let window = args.window(total, config)?;
    let page: Vec<T> = rows
        .into_iter()
        .skip(window.offset as usize)
        .take(window.limit as usize)
        .collect();
    Ok(Connection::from_items(page, window.offset, total))
}
