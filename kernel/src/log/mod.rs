// Audit Log
//
// Immutable, per-object log entries recorded by the change-tracking
// listener. Each entry holds only the fields that changed at its version.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use uuid::Uuid;

pub mod store;

pub use store::{LogQuery, LogStore, SortOrder, VersionFilter};

/// Logical version of a tracked object.
pub type Version = u64;

/// Field-level diff carried by a single log entry.
pub type FieldDiff = BTreeMap<String, Value>;

/// Opaque identifier of a tracked object.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectId(pub String);

impl ObjectId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Fresh random identifier.
    pub fn new_v4() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<Uuid> for ObjectId {
    fn from(id: Uuid) -> Self {
        Self(id.to_string())
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Type discriminator of a tracked object.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectClass(pub String);

impl ObjectClass {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ObjectClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogAction {
    Create,
    #[default]
    Update,
    Remove,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub object_id: ObjectId,
    pub object_class: ObjectClass,
    pub version: Version,
    #[serde(default)]
    pub action: LogAction,
    #[serde(default)]
    pub data: FieldDiff,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logged_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

impl LogEntry {
    pub fn new(
        object_id: ObjectId,
        object_class: ObjectClass,
        version: Version,
        data: FieldDiff,
    ) -> Self {
        Self {
            object_id,
            object_class,
            version,
            action: LogAction::Update,
            data,
            logged_at: None,
            username: None,
        }
    }

    pub fn with_action(mut self, action: LogAction) -> Self {
        self.action = action;
        self
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    pub fn with_logged_at(mut self, at: DateTime<Utc>) -> Self {
        self.logged_at = Some(at);
        self
    }

    /// Whether this entry belongs to the given object.
    pub fn belongs_to(&self, id: &ObjectId, class: &ObjectClass) -> bool {
        &self.object_id == id && &self.object_class == class
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum LogError {
    #[error("version conflict for {object_class}#{object_id}: expected a version above {last}, got {actual}")]
    VersionConflict {
        object_id: ObjectId,
        object_class: ObjectClass,
        last: Version,
        actual: Version,
    },

    #[error("log entry versions start at 1")]
    ZeroVersion,

    #[error("log storage failure: {0}")]
    Storage(String),
}

type ObjectKey = (ObjectId, ObjectClass);

/// Process-local log store, one ascending history per object.
#[derive(Debug, Default)]
pub struct InMemoryLogStore {
    histories: HashMap<ObjectKey, Vec<LogEntry>>,
}

impl InMemoryLogStore {
    pub fn new() -> Self {
        Self {
            histories: HashMap::new(),
        }
    }

    /// Build a store from entries listed in any per-object ascending order.
    pub fn from_entries(entries: impl IntoIterator<Item = LogEntry>) -> Result<Self, LogError> {
        let mut store = Self::new();
        for entry in entries {
            store.append(entry)?;
        }
        Ok(store)
    }

    /// Record a new entry. Write path of the change-tracking listener.
    pub fn append(&mut self, entry: LogEntry) -> Result<(), LogError> {
        if entry.version == 0 {
            return Err(LogError::ZeroVersion);
        }

        let key = (entry.object_id.clone(), entry.object_class.clone());
        let history = self.histories.entry(key).or_default();

        if let Some(last) = history.last() {
            if entry.version <= last.version {
                return Err(LogError::VersionConflict {
                    object_id: entry.object_id,
                    object_class: entry.object_class,
                    last: last.version,
                    actual: entry.version,
                });
            }
        }

        history.push(entry);
        Ok(())
    }

    /// Latest recorded version for an object, 0 when it has no history.
    pub fn current_version(&self, id: &ObjectId, class: &ObjectClass) -> Version {
        self.histories
            .get(&(id.clone(), class.clone()))
            .and_then(|h| h.last())
            .map(|e| e.version)
            .unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.histories.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl LogStore for InMemoryLogStore {
    fn list(&self, query: &LogQuery) -> Result<Vec<LogEntry>, LogError> {
        let key = (query.object_id.clone(), query.object_class.clone());
        let Some(history) = self.histories.get(&key) else {
            return Ok(Vec::new());
        };

        let matching = history.iter().filter(|e| query.filter.matches(e.version));
        let ordered: Vec<&LogEntry> = match query.order {
            SortOrder::Ascending => matching.collect(),
            SortOrder::Descending => matching.rev().collect(),
        };

        Ok(query.paginate(ordered).into_iter().cloned().collect())
    }
}
