//! Observable resources.
//!
//! Real database and cache clients implement [`DatabaseBackend`] /
//! [`CacheBackend`]. Code under test talks to them through a
//! [`DatabaseHandle`] / [`CacheHandle`] proxy, which reports every call to
//! the observer installed by the active capture scope, if any.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::thread::{self, ThreadId};

use anyhow::anyhow;
use parking_lot::{Mutex, RwLock};
use perf_core::{CacheKeys, sorted_names};
use serde_json::Value;
use tracing::debug;

use crate::error::CaptureError;

/// A call seen by a proxy, before fingerprinting or key cleaning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawOperation {
    Sql { alias: String, sql: String },
    Cache {
        alias: String,
        verb: CacheVerb,
        keys: CacheKeys,
    },
}

/// Callback that receives every observed call.
pub type Observer = Arc<dyn Fn(RawOperation) + Send + Sync>;

/// The cache methods a [`CacheHandle`] reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheVerb {
    Add,
    Decr,
    Delete,
    DeleteMany,
    Get,
    GetMany,
    GetOrSet,
    Incr,
    Set,
    SetMany,
}

impl CacheVerb {
    pub const ALL: [Self; 10] = [
        Self::Add,
        Self::Decr,
        Self::Delete,
        Self::DeleteMany,
        Self::Get,
        Self::GetMany,
        Self::GetOrSet,
        Self::Incr,
        Self::Set,
        Self::SetMany,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Decr => "decr",
            Self::Delete => "delete",
            Self::DeleteMany => "delete_many",
            Self::Get => "get",
            Self::GetMany => "get_many",
            Self::GetOrSet => "get_or_set",
            Self::Incr => "incr",
            Self::Set => "set",
            Self::SetMany => "set_many",
        }
    }
}

impl fmt::Display for CacheVerb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of observable resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    Database,
    Cache,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Database => "database",
            Self::Cache => "cache",
        })
    }
}

/// A real database client.
pub trait DatabaseBackend: Send + Sync {
    /// Run one statement, returning the number of rows it produced or touched.
    ///
    /// # Errors
    ///
    /// Any client failure.
    fn execute(&self, sql: &str) -> anyhow::Result<u64>;
}

/// A real cache client. Batch and compound verbs are built on these
/// primitives by [`CacheHandle`].
pub trait CacheBackend: Send + Sync {
    fn get(&self, key: &str) -> anyhow::Result<Option<Value>>;
    fn set(&self, key: &str, value: Value) -> anyhow::Result<()>;
    /// Set only if absent; returns whether the value was stored.
    fn add(&self, key: &str, value: Value) -> anyhow::Result<bool>;
    /// Returns whether the key existed.
    fn delete(&self, key: &str) -> anyhow::Result<bool>;
    /// Add `delta` to an integer value; fails if the key is missing.
    fn incr(&self, key: &str, delta: i64) -> anyhow::Result<i64>;
}

/// Holds the observer of one handle.
#[derive(Default)]
struct ObserverSlot(RwLock<Option<Observer>>);

impl ObserverSlot {
    fn install(&self, kind: SourceKind, alias: &str, observer: Observer) -> Result<(), CaptureError> {
        let mut slot = self.0.write();
        if slot.is_some() {
            return Err(CaptureError::AlreadyCapturing {
                kind,
                alias: alias.to_string(),
            });
        }
        *slot = Some(observer);
        debug!(%kind, alias, "observer installed");
        Ok(())
    }

    fn uninstall(&self, kind: SourceKind, alias: &str) {
        if self.0.write().take().is_some() {
            debug!(%kind, alias, "observer removed");
        }
    }

    fn is_set(&self) -> bool {
        self.0.read().is_some()
    }

    /// Call the observer outside the lock, so it may touch the handle itself.
    fn notify(&self, op: impl FnOnce() -> RawOperation) {
        let observer = self.0.read().clone();
        if let Some(observer) = observer {
            observer(op());
        }
    }
}

/// Proxy for a database connection.
pub struct DatabaseHandle {
    alias: String,
    backend: Box<dyn DatabaseBackend>,
    observer: ObserverSlot,
}

impl DatabaseHandle {
    pub fn new(alias: impl Into<String>, backend: impl DatabaseBackend + 'static) -> Self {
        Self {
            alias: alias.into(),
            backend: Box::new(backend),
            observer: ObserverSlot::default(),
        }
    }

    #[must_use]
    pub fn alias(&self) -> &str {
        &self.alias
    }

    /// Whether a capture scope is observing this connection.
    #[must_use]
    pub fn is_observed(&self) -> bool {
        self.observer.is_set()
    }

    /// Run `sql`. The statement is reported even if the backend fails.
    ///
    /// # Errors
    ///
    /// Returns `CaptureError::Backend` on client failure.
    pub fn execute(&self, sql: &str) -> Result<u64, CaptureError> {
        self.observer.notify(|| RawOperation::Sql {
            alias: self.alias.clone(),
            sql: sql.to_string(),
        });
        self.backend.execute(sql).map_err(CaptureError::Backend)
    }

    fn install(&self, observer: Observer) -> Result<(), CaptureError> {
        self.observer.install(SourceKind::Database, &self.alias, observer)
    }

    fn uninstall(&self) {
        self.observer.uninstall(SourceKind::Database, &self.alias);
    }
}

/// Threads currently inside a verb of one [`CacheHandle`], so that verbs
/// built on other verbs report only the outermost call.
#[derive(Default)]
struct ActiveCalls(Mutex<HashSet<ThreadId>>);

/// Leaves [`ActiveCalls`] when the outermost verb returns or unwinds.
struct OutermostCall<'a> {
    calls: &'a ActiveCalls,
    thread: ThreadId,
}

impl<'a> OutermostCall<'a> {
    fn enter(calls: &'a ActiveCalls) -> Option<Self> {
        let thread = thread::current().id();
        calls
            .0
            .lock()
            .insert(thread)
            .then_some(Self { calls, thread })
    }
}

impl Drop for OutermostCall<'_> {
    fn drop(&mut self) {
        self.calls.0.lock().remove(&self.thread);
    }
}

/// Proxy for a cache client.
pub struct CacheHandle {
    alias: String,
    backend: Box<dyn CacheBackend>,
    observer: ObserverSlot,
    active: ActiveCalls,
}

impl CacheHandle {
    pub fn new(alias: impl Into<String>, backend: impl CacheBackend + 'static) -> Self {
        Self {
            alias: alias.into(),
            backend: Box::new(backend),
            observer: ObserverSlot::default(),
            active: ActiveCalls::default(),
        }
    }

    #[must_use]
    pub fn alias(&self) -> &str {
        &self.alias
    }

    #[must_use]
    pub fn is_observed(&self) -> bool {
        self.observer.is_set()
    }

    fn install(&self, observer: Observer) -> Result<(), CaptureError> {
        self.observer.install(SourceKind::Cache, &self.alias, observer)
    }

    fn uninstall(&self) {
        self.observer.uninstall(SourceKind::Cache, &self.alias);
    }

    /// Report `verb` unless it runs inside another verb, then run `call`.
    fn observed<T>(
        &self,
        verb: CacheVerb,
        keys: impl FnOnce() -> CacheKeys,
        call: impl FnOnce() -> anyhow::Result<T>,
    ) -> Result<T, CaptureError> {
        let _outermost = OutermostCall::enter(&self.active).inspect(|_| {
            self.observer.notify(|| RawOperation::Cache {
                alias: self.alias.clone(),
                verb,
                keys: keys(),
            });
        });
        call().map_err(CaptureError::Backend)
    }

    pub fn get(&self, key: &str) -> Result<Option<Value>, CaptureError> {
        self.observed(CacheVerb::Get, || key.into(), || self.backend.get(key))
    }

    pub fn set(&self, key: &str, value: Value) -> Result<(), CaptureError> {
        self.observed(CacheVerb::Set, || key.into(), || self.backend.set(key, value))
    }

    pub fn add(&self, key: &str, value: Value) -> Result<bool, CaptureError> {
        self.observed(CacheVerb::Add, || key.into(), || self.backend.add(key, value))
    }

    pub fn delete(&self, key: &str) -> Result<bool, CaptureError> {
        self.observed(CacheVerb::Delete, || key.into(), || self.backend.delete(key))
    }

    pub fn incr(&self, key: &str, delta: i64) -> Result<i64, CaptureError> {
        self.observed(CacheVerb::Incr, || key.into(), || self.backend.incr(key, delta))
    }

    pub fn decr(&self, key: &str, delta: i64) -> Result<i64, CaptureError> {
        self.observed(
            CacheVerb::Decr,
            || key.into(),
            || {
                let delta = delta
                    .checked_neg()
                    .ok_or_else(|| anyhow!("cannot decrement '{key}' by {delta}"))?;
                Ok(self.incr(key, delta)?)
            },
        )
    }

    /// Values of the keys that are present.
    pub fn get_many(&self, keys: &[&str]) -> Result<BTreeMap<String, Value>, CaptureError> {
        self.observed(
            CacheVerb::GetMany,
            || CacheKeys::many(keys.iter().copied()),
            || {
                let mut found = BTreeMap::new();
                for key in keys {
                    if let Some(value) = self.get(key)? {
                        found.insert((*key).to_string(), value);
                    }
                }
                Ok(found)
            },
        )
    }

    pub fn set_many(&self, values: &BTreeMap<String, Value>) -> Result<(), CaptureError> {
        self.observed(
            CacheVerb::SetMany,
            || CacheKeys::many(values.keys().cloned()),
            || {
                for (key, value) in values {
                    self.set(key, value.clone())?;
                }
                Ok(())
            },
        )
    }

    pub fn delete_many(&self, keys: &[&str]) -> Result<(), CaptureError> {
        self.observed(
            CacheVerb::DeleteMany,
            || CacheKeys::many(keys.iter().copied()),
            || {
                for key in keys {
                    self.delete(key)?;
                }
                Ok(())
            },
        )
    }

    /// The cached value, or `default()` stored and returned when absent.
    pub fn get_or_set(
        &self,
        key: &str,
        default: impl FnOnce() -> Value,
    ) -> Result<Value, CaptureError> {
        self.observed(
            CacheVerb::GetOrSet,
            || key.into(),
            || {
                if let Some(value) = self.get(key)? {
                    return Ok(value);
                }
                let value = default();
                self.add(key, value.clone())?;
                Ok(self.get(key)?.unwrap_or(value))
            },
        )
    }
}

/// Either kind of handle, for code that treats them uniformly.
#[derive(Clone)]
pub enum Source {
    Database(Arc<DatabaseHandle>),
    Cache(Arc<CacheHandle>),
}

impl Source {
    #[must_use]
    pub const fn kind(&self) -> SourceKind {
        match self {
            Self::Database(_) => SourceKind::Database,
            Self::Cache(_) => SourceKind::Cache,
        }
    }

    #[must_use]
    pub fn alias(&self) -> &str {
        match self {
            Self::Database(handle) => handle.alias(),
            Self::Cache(handle) => handle.alias(),
        }
    }

    /// Start reporting calls to `observer`.
    ///
    /// # Errors
    ///
    /// Returns `CaptureError::AlreadyCapturing` if another observer is set.
    pub fn install(&self, observer: Observer) -> Result<(), CaptureError> {
        match self {
            Self::Database(handle) => handle.install(observer),
            Self::Cache(handle) => handle.install(observer),
        }
    }

    pub fn uninstall(&self) {
        match self {
            Self::Database(handle) => handle.uninstall(),
            Self::Cache(handle) => handle.uninstall(),
        }
    }
}

/// Every observable resource, by kind and alias.
#[derive(Clone, Default)]
pub struct SourceRegistry {
    databases: BTreeMap<String, Arc<DatabaseHandle>>,
    caches: BTreeMap<String, Arc<CacheHandle>>,
}

impl SourceRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a database client under `alias`, replacing any previous one.
    pub fn add_database(
        &mut self,
        alias: impl Into<String>,
        backend: impl DatabaseBackend + 'static,
    ) -> Arc<DatabaseHandle> {
        let alias = alias.into();
        let handle = Arc::new(DatabaseHandle::new(alias.clone(), backend));
        self.databases.insert(alias, Arc::clone(&handle));
        handle
    }

    /// Register a cache client under `alias`, replacing any previous one.
    pub fn add_cache(
        &mut self,
        alias: impl Into<String>,
        backend: impl CacheBackend + 'static,
    ) -> Arc<CacheHandle> {
        let alias = alias.into();
        let handle = Arc::new(CacheHandle::new(alias.clone(), backend));
        self.caches.insert(alias, Arc::clone(&handle));
        handle
    }

    /// # Errors
    ///
    /// Returns `CaptureError::UnknownAlias` if nothing is registered.
    pub fn database(&self, alias: &str) -> Result<Arc<DatabaseHandle>, CaptureError> {
        self.databases
            .get(alias)
            .cloned()
            .ok_or_else(|| unknown(SourceKind::Database, alias))
    }

    /// # Errors
    ///
    /// Returns `CaptureError::UnknownAlias` if nothing is registered.
    pub fn cache(&self, alias: &str) -> Result<Arc<CacheHandle>, CaptureError> {
        self.caches
            .get(alias)
            .cloned()
            .ok_or_else(|| unknown(SourceKind::Cache, alias))
    }

    /// # Errors
    ///
    /// Returns `CaptureError::UnknownAlias` if nothing is registered.
    pub fn source(&self, kind: SourceKind, alias: &str) -> Result<Source, CaptureError> {
        match kind {
            SourceKind::Database => self.database(alias).map(Source::Database),
            SourceKind::Cache => self.cache(alias).map(Source::Cache),
        }
    }

    /// Registered aliases of `kind`, `default` first and the rest sorted.
    #[must_use]
    pub fn aliases(&self, kind: SourceKind) -> Vec<String> {
        match kind {
            SourceKind::Database => sorted_names(self.databases.keys().cloned()),
            SourceKind::Cache => sorted_names(self.caches.keys().cloned()),
        }
    }
}

fn unknown(kind: SourceKind, alias: &str) -> CaptureError {
    CaptureError::UnknownAlias {
        kind,
        alias: alias.to_string(),
    }
}
