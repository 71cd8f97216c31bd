//! Observed operations.
//!
//! An `Operation` is one intercepted call against an aliased resource. It is
//! created by a source proxy, handed to the recorder callback, folded into a
//! `RecordEntry`, and dropped.

use std::backtrace::Backtrace;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::cache_key::clean_key;
use crate::errors::CoreError;

/// Alias of the resource that gets no suffix in operation names.
pub const DEFAULT_ALIAS: &str = "default";

/// The normalized instruction of an operation.
///
/// `Many` is used by multi-key cache calls and is always sorted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Query {
    Single(String),
    Many(Vec<String>),
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Single(query) => f.write_str(query),
            Self::Many(keys) => write!(f, "[{}]", keys.join(", ")),
        }
    }
}

impl From<&str> for Query {
    fn from(query: &str) -> Self {
        Self::Single(query.to_string())
    }
}

impl From<String> for Query {
    fn from(query: String) -> Self {
        Self::Single(query)
    }
}

/// Call-stack snapshot attached to an operation for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Traceback(Vec<String>);

impl Traceback {
    /// Capture the current call stack, one line per formatted frame line.
    #[must_use]
    pub fn capture() -> Self {
        let backtrace = Backtrace::force_capture().to_string();
        Self(backtrace.lines().map(str::to_string).collect())
    }

    #[must_use]
    pub const fn from_frames(frames: Vec<String>) -> Self {
        Self(frames)
    }

    #[must_use]
    pub fn frames(&self) -> &[String] {
        &self.0
    }
}

/// Key argument of a cache call: one key or a batch of keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheKeys {
    One(String),
    Many(Vec<String>),
}

impl CacheKeys {
    /// Collect a batch of keys from any iterable (set, map keys, slice).
    pub fn many<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::Many(keys.into_iter().map(|k| k.as_ref().to_string()).collect())
    }

    /// Accept a dynamically typed key argument.
    ///
    /// Strings, arrays of strings and objects (their keys) are accepted.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Validation` for any other shape, including arrays
    /// holding non-string elements.
    pub fn from_value(value: &serde_json::Value) -> Result<Self, CoreError> {
        match value {
            serde_json::Value::String(key) => Ok(Self::One(key.clone())),
            serde_json::Value::Array(items) => items
                .iter()
                .map(|item| {
                    item.as_str().map(str::to_string).ok_or_else(|| {
                        CoreError::Validation(format!("cache key must be a string, got {item}"))
                    })
                })
                .collect::<Result<Vec<_>, _>>()
                .map(Self::Many),
            serde_json::Value::Object(map) => Ok(Self::many(map.keys())),
            other => Err(CoreError::Validation(format!(
                "key_or_keys must be a string or collection, got {other}"
            ))),
        }
    }
}

impl From<&str> for CacheKeys {
    fn from(key: &str) -> Self {
        Self::One(key.to_string())
    }
}

impl From<String> for CacheKeys {
    fn from(key: String) -> Self {
        Self::One(key)
    }
}

impl From<Vec<String>> for CacheKeys {
    fn from(keys: Vec<String>) -> Self {
        Self::Many(keys)
    }
}

impl From<Vec<&str>> for CacheKeys {
    fn from(keys: Vec<&str>) -> Self {
        Self::many(keys)
    }
}

impl From<&[&str]> for CacheKeys {
    fn from(keys: &[&str]) -> Self {
        Self::many(keys)
    }
}

impl<const N: usize> From<[&str; N]> for CacheKeys {
    fn from(keys: [&str; N]) -> Self {
        Self::many(keys)
    }
}

/// A query run against a database connection. `query` is already fingerprinted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbOp {
    alias: String,
    query: Query,
    traceback: Option<Traceback>,
}

impl DbOp {
    pub fn new(alias: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            alias: alias.into(),
            query: Query::Single(query.into()),
            traceback: None,
        }
    }

    /// `db` for the default connection, `db|{alias}` otherwise.
    #[must_use]
    pub fn name(&self) -> String {
        if self.alias == DEFAULT_ALIAS {
            "db".to_string()
        } else {
            format!("db|{}", self.alias)
        }
    }
}

/// A call against a cache, with its key(s) cleaned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheOp {
    alias: String,
    operation: String,
    query: Query,
    traceback: Option<Traceback>,
}

impl CacheOp {
    /// Build a cache operation. Batches are cleaned and then sorted so the
    /// iteration order of the caller's collection does not matter.
    pub fn new(
        alias: impl Into<String>,
        operation: impl Into<String>,
        key_or_keys: impl Into<CacheKeys>,
    ) -> Self {
        let query = match key_or_keys.into() {
            CacheKeys::One(key) => Query::Single(clean_key(&key)),
            CacheKeys::Many(keys) => {
                let mut cleaned: Vec<String> = keys.iter().map(|k| clean_key(k)).collect();
                cleaned.sort();
                Query::Many(cleaned)
            }
        };
        Self {
            alias: alias.into(),
            operation: operation.into(),
            query,
            traceback: None,
        }
    }

    /// Build a cache operation from a dynamically typed key argument.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Validation` if the argument is neither a string nor
    /// a collection of strings.
    pub fn from_value(
        alias: impl Into<String>,
        operation: impl Into<String>,
        key_or_keys: &serde_json::Value,
    ) -> Result<Self, CoreError> {
        Ok(Self::new(alias, operation, CacheKeys::from_value(key_or_keys)?))
    }

    #[must_use]
    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// `cache|{operation}`, with `|{alias}` inserted for non-default caches.
    #[must_use]
    pub fn name(&self) -> String {
        if self.alias == DEFAULT_ALIAS {
            format!("cache|{}", self.operation)
        } else {
            format!("cache|{}|{}", self.alias, self.operation)
        }
    }
}

/// One observed side-effecting call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Db(DbOp),
    Cache(CacheOp),
}

impl Operation {
    #[must_use]
    pub fn alias(&self) -> &str {
        match self {
            Self::Db(op) => &op.alias,
            Self::Cache(op) => &op.alias,
        }
    }

    #[must_use]
    pub const fn query(&self) -> &Query {
        match self {
            Self::Db(op) => &op.query,
            Self::Cache(op) => &op.query,
        }
    }

    #[must_use]
    pub const fn traceback(&self) -> Option<&Traceback> {
        match self {
            Self::Db(op) => op.traceback.as_ref(),
            Self::Cache(op) => op.traceback.as_ref(),
        }
    }

    /// Display key of the operation category, used as the record entry name.
    #[must_use]
    pub fn name(&self) -> String {
        match self {
            Self::Db(op) => op.name(),
            Self::Cache(op) => op.name(),
        }
    }

    #[must_use]
    pub fn with_traceback(mut self, traceback: Traceback) -> Self {
        match &mut self {
            Self::Db(op) => op.traceback = Some(traceback),
            Self::Cache(op) => op.traceback = Some(traceback),
        }
        self
    }
}

impl From<DbOp> for Operation {
    fn from(op: DbOp) -> Self {
        Self::Db(op)
    }
}

impl From<CacheOp> for Operation {
    fn from(op: CacheOp) -> Self {
        Self::Cache(op)
    }
}
