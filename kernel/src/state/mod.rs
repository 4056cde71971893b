// Reconstructed Object State
//
// Accumulates field-level diffs into a single cumulative field map.
// This module is pure, deterministic, and side-effect free.

use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::log::{LogEntry, ObjectClass, ObjectId, Version};
use crate::schema::{is_empty_value, CollaboratorError};

/// Highest number of positions a logged collection may address.
pub const MAX_COLLECTION_LEN: usize = 1 << 16;

/// Field-level diff of one element of an embedded collection.
pub type ElementDiff = Map<String, Value>;

/// Positional element diffs of an embedded collection.
///
/// Logged either as a JSON array (a `null` element leaves that index
/// untouched) or as a JSON object keyed by decimal index.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ElementDiffs(Vec<Option<ElementDiff>>);

impl ElementDiffs {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Parse a logged collection value.
    pub fn from_logged(field: &str, value: &Value) -> Result<Self, FoldError> {
        let mut diffs = Self::new();
        match value {
            Value::Array(items) => {
                for (index, item) in items.iter().enumerate() {
                    check_index(field, index)?;
                    diffs.set(index, element(field, index, item)?);
                }
            }
            Value::Object(sparse) => {
                for (key, item) in sparse {
                    let index = key.parse::<usize>().map_err(|_| FoldError::MalformedCollection {
                        field: field.to_string(),
                        reason: format!("`{key}` is not an element index"),
                    })?;
                    check_index(field, index)?;
                    diffs.set(index, element(field, index, item)?);
                }
            }
            other => {
                return Err(FoldError::MalformedCollection {
                    field: field.to_string(),
                    reason: format!("expected an array or index map, got {other}"),
                })
            }
        }
        Ok(diffs)
    }

    /// Index-wise shallow merge; incoming fields overwrite at each index.
    pub fn merge(&mut self, incoming: ElementDiffs) {
        for (index, diff) in incoming.0.into_iter().enumerate() {
            let Some(diff) = diff else { continue };
            let slot = self.slot(index);
            match slot.as_mut() {
                Some(existing) => existing.extend(diff),
                None => *slot = Some(diff),
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = Option<&ElementDiff>> {
        self.0.iter().map(Option::as_ref)
    }

    /// Ordered JSON array; never-filled positions become `null`.
    pub fn into_value(self) -> Value {
        Value::Array(
            self.0
                .into_iter()
                .map(|d| d.map(Value::Object).unwrap_or(Value::Null))
                .collect(),
        )
    }

    fn set(&mut self, index: usize, diff: Option<ElementDiff>) {
        if diff.is_some() {
            *self.slot(index) = diff;
        }
    }

    fn slot(&mut self, index: usize) -> &mut Option<ElementDiff> {
        if self.0.len() <= index {
            self.0.resize(index + 1, None);
        }
        &mut self.0[index]
    }
}

fn check_index(field: &str, index: usize) -> Result<(), FoldError> {
    match index.checked_add(1) {
        Some(len) if len <= MAX_COLLECTION_LEN => Ok(()),
        _ => Err(FoldError::MalformedCollection {
            field: field.to_string(),
            reason: format!("element index {index} exceeds {MAX_COLLECTION_LEN} positions"),
        }),
    }
}

fn element(field: &str, index: usize, item: &Value) -> Result<Option<ElementDiff>, FoldError> {
    match item {
        Value::Null => Ok(None),
        Value::Object(map) => Ok(Some(map.clone())),
        other => Err(FoldError::MalformedCollection {
            field: field.to_string(),
            reason: format!("element {index} is not an object: {other}"),
        }),
    }
}

/// Accumulated value of one field.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum StateValue {
    /// Last-write-wins value.
    Value(Value),
    /// Index-merged embedded collection.
    Collection(ElementDiffs),
}

impl StateValue {
    pub fn into_value(self) -> Value {
        match self {
            StateValue::Value(v) => v,
            StateValue::Collection(diffs) => diffs.into_value(),
        }
    }
}

/// Errors produced while folding entries.
#[derive(Debug, thiserror::Error)]
pub enum FoldError {
    #[error("fold invariant violated: {0}")]
    Invariant(#[from] crate::invariants::InvariantViolation),

    #[error("malformed collection diff for `{field}`: {reason}")]
    MalformedCollection { field: String, reason: String },

    #[error(transparent)]
    Collaborator(#[from] CollaboratorError),
}

/// Cumulative state of one object up to `version`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconstructedState {
    object_id: ObjectId,
    object_class: ObjectClass,
    version: Version,
    fields: BTreeMap<String, StateValue>,
}

impl ReconstructedState {
    /// Empty state, before any entry has been folded.
    pub fn new(object_id: ObjectId, object_class: ObjectClass) -> Self {
        Self {
            object_id,
            object_class,
            version: 0,
            fields: BTreeMap::new(),
        }
    }

    /// Fold a single entry into the state.
    ///
    /// `is_collection` reports whether a field is an embedded collection
    /// of the object's type.
    pub fn apply<F>(&mut self, entry: &LogEntry, mut is_collection: F) -> Result<(), FoldError>
    where
        F: FnMut(&str) -> Result<bool, CollaboratorError>,
    {
        for (field, value) in &entry.data {
            // Empty values replace the collection outright
            let merged = if !is_empty_value(value) && is_collection(field.as_str())? {
                let incoming = ElementDiffs::from_logged(field, value)?;
                match self.fields.remove(field) {
                    Some(StateValue::Collection(mut acc)) => {
                        acc.merge(incoming);
                        StateValue::Collection(acc)
                    }
                    _ => StateValue::Collection(incoming),
                }
            } else {
                StateValue::Value(value.clone())
            };

            self.fields.insert(field.clone(), merged);
        }

        self.version = entry.version;
        Ok(())
    }

    pub fn object_id(&self) -> &ObjectId {
        &self.object_id
    }

    pub fn object_class(&self) -> &ObjectClass {
        &self.object_class
    }

    /// Version of the last folded entry, 0 when nothing was folded.
    pub fn version(&self) -> Version {
        self.version
    }

    pub fn get(&self, field: &str) -> Option<&StateValue> {
        self.fields.get(field)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Plain field map, collections rendered as ordered arrays.
    pub fn into_fields(self) -> Map<String, Value> {
        self.fields
            .into_iter()
            .map(|(field, value)| (field, value.into_value()))
            .collect()
    }
}
