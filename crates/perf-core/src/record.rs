//! Performance record entries.
//!
//! A record is the ordered list of operations one capture scope observed.
//! Each entry persists as a single-key mapping `{name: query}` so that the
//! order of operations survives serialization even when names repeat. An
//! optional `traceback` key carries the diagnostic call stack.

use std::fmt;

use serde::de::{self, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use similar::{ChangeTag, TextDiff};

use crate::operation::{Operation, Query, Traceback};

/// Reserved entry key for an attached traceback.
pub const TRACEBACK_KEY: &str = "traceback";

/// An ordered list of captured operations.
pub type PerformanceRecord = Vec<RecordEntry>;

/// A single `{name: query}` element of a performance record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordEntry {
    pub name: String,
    pub query: Query,
    pub traceback: Option<Traceback>,
}

impl RecordEntry {
    pub fn new(name: impl Into<String>, query: impl Into<Query>) -> Self {
        Self {
            name: name.into(),
            query: query.into(),
            traceback: None,
        }
    }

    /// Fold an operation into an entry, keeping its traceback if it has one.
    #[must_use]
    pub fn from_operation(op: &Operation) -> Self {
        Self {
            name: op.name(),
            query: op.query().clone(),
            traceback: op.traceback().cloned(),
        }
    }

    /// The lines used when diffing records: `name: query`, then
    /// `traceback: [..]` when a traceback is attached.
    #[must_use]
    pub fn diff_lines(&self) -> Vec<String> {
        let mut lines = vec![format!("{}: {}", self.name, self.query)];
        if let Some(traceback) = &self.traceback {
            lines.push(format!("{TRACEBACK_KEY}: [{}]", traceback.frames().join(", ")));
        }
        lines
    }
}

impl Serialize for RecordEntry {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let len = if self.traceback.is_some() { 2 } else { 1 };
        let mut map = serializer.serialize_map(Some(len))?;
        map.serialize_entry(&self.name, &self.query)?;
        if let Some(traceback) = &self.traceback {
            map.serialize_entry(TRACEBACK_KEY, traceback)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for RecordEntry {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(EntryVisitor)
    }
}

struct EntryVisitor;

impl<'de> Visitor<'de> for EntryVisitor {
    type Value = RecordEntry;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a single-operation mapping `{name: query}`")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<RecordEntry, A::Error> {
        let mut operation: Option<(String, Query)> = None;
        let mut traceback: Option<Traceback> = None;

        while let Some(key) = map.next_key::<String>()? {
            if key == TRACEBACK_KEY {
                if traceback.is_some() {
                    return Err(de::Error::duplicate_field(TRACEBACK_KEY));
                }
                traceback = Some(map.next_value()?);
            } else if let Some((name, _)) = &operation {
                return Err(de::Error::custom(format!(
                    "record entry holds more than one operation: `{name}` and `{key}`"
                )));
            } else {
                operation = Some((key, map.next_value()?));
            }
        }

        let (name, query) =
            operation.ok_or_else(|| de::Error::custom("record entry holds no operation"))?;
        Ok(RecordEntry {
            name,
            query,
            traceback,
        })
    }
}

/// Generate a human-readable line diff of two performance records.
///
/// Lines are prefixed the way `ndiff` does it: `"  "` unchanged, `"- "` only
/// in `old`, `"+ "` only in `new`.
#[must_use]
pub fn record_diff(old: &[RecordEntry], new: &[RecordEntry]) -> String {
    let old_lines: Vec<String> = old.iter().flat_map(RecordEntry::diff_lines).collect();
    let new_lines: Vec<String> = new.iter().flat_map(RecordEntry::diff_lines).collect();
    let old_refs: Vec<&str> = old_lines.iter().map(String::as_str).collect();
    let new_refs: Vec<&str> = new_lines.iter().map(String::as_str).collect();

    TextDiff::from_slices(&old_refs, &new_refs)
        .iter_all_changes()
        .map(|change| {
            let prefix = match change.tag() {
                ChangeTag::Equal => "  ",
                ChangeTag::Delete => "- ",
                ChangeTag::Insert => "+ ",
            };
            format!("{prefix}{}", change.value())
        })
        .collect::<Vec<_>>()
        .join("\n")
}
