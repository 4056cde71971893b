// Revert Engine
//
// Reconstructs an object's historical state from its audit log and
// writes it back onto the live object:
// list (<= version, ascending) → fold → resolve → set fields
//
// The engine never persists anything; callers save the object after
// a successful revert.

use serde_json::{Map, Value};
use std::sync::Arc;

use crate::config::RevertConfig;
use crate::invariants::InvariantEngine;
use crate::log::{LogEntry, LogError, LogQuery, LogStore, ObjectClass, ObjectId, SortOrder, Version, VersionFilter};
use crate::replay::fold_entries;
use crate::schema::{
    is_empty_value, CollaboratorError, FieldKind, FieldMapping, FieldValue, MetadataService,
    ReferenceResolver, VersionedFieldConfig,
};
use crate::state::{ElementDiffs, FoldError, ReconstructedState};

mod dates;

pub use dates::parse_date;

/// Errors that can occur while reverting an object.
#[derive(Debug, thiserror::Error)]
pub enum RevertError {
    #[error("could not find any log entries under version {version}")]
    NoHistory { version: Version },

    #[error("no change-tracking listener configured: versioned fields are unknown")]
    ListenerNotConfigured,

    #[error("could not fully revert the object to version {version}: {missing:?} never logged")]
    IncompleteRevert { version: Version, missing: Vec<String> },

    #[error("log store error: {0}")]
    Log(#[from] LogError),

    #[error("replay failed: {0}")]
    Fold(FoldError),

    #[error(transparent)]
    Collaborator(#[from] CollaboratorError),
}

impl From<FoldError> for RevertError {
    fn from(err: FoldError) -> Self {
        match err {
            FoldError::Collaborator(inner) => RevertError::Collaborator(inner),
            other => RevertError::Fold(other),
        }
    }
}

/// Restores objects of model `O` from the log held by `S`.
pub struct RevertEngine<O, S> {
    store: S,
    metadata: Arc<dyn MetadataService<O>>,
    versioned: Arc<dyn VersionedFieldConfig>,
    references: Arc<dyn ReferenceResolver<O>>,
    invariants: InvariantEngine,
    config: RevertConfig,
}

/// Assembles a [`RevertEngine`] from its collaborators.
pub struct RevertEngineBuilder<O, S> {
    store: S,
    metadata: Arc<dyn MetadataService<O>>,
    references: Arc<dyn ReferenceResolver<O>>,
    versioned: Option<Arc<dyn VersionedFieldConfig>>,
    invariants: Option<InvariantEngine>,
    config: RevertConfig,
}

impl<O, S: LogStore> RevertEngineBuilder<O, S> {
    /// Versioned-field configuration of the change-tracking listener.
    pub fn versioned_fields(mut self, config: Arc<dyn VersionedFieldConfig>) -> Self {
        self.versioned = Some(config);
        self
    }

    /// Replace the standard fold invariants.
    pub fn invariants(mut self, invariants: InvariantEngine) -> Self {
        self.invariants = Some(invariants);
        self
    }

    pub fn config(mut self, config: RevertConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Result<RevertEngine<O, S>, RevertError> {
        let versioned = self.versioned.ok_or(RevertError::ListenerNotConfigured)?;

        Ok(RevertEngine {
            store: self.store,
            metadata: self.metadata,
            versioned,
            references: self.references,
            invariants: self.invariants.unwrap_or_else(InvariantEngine::standard),
            config: self.config,
        })
    }
}

impl<O, S: LogStore> RevertEngine<O, S> {
    pub fn builder(
        store: S,
        metadata: Arc<dyn MetadataService<O>>,
        references: Arc<dyn ReferenceResolver<O>>,
    ) -> RevertEngineBuilder<O, S> {
        RevertEngineBuilder {
            store,
            metadata,
            references,
            versioned: None,
            invariants: None,
            config: RevertConfig::default_config(),
        }
    }

    /// Log entries of `object`, newest first.
    pub fn get_history(
        &self,
        object: &O,
        limit: Option<usize>,
        skip: Option<usize>,
    ) -> Result<Vec<LogEntry>, RevertError> {
        let query = LogQuery::new(
            self.metadata.identity_of(object)?,
            self.metadata.type_of(object)?,
        )
        .order(SortOrder::Descending)
        .page(limit, skip);

        Ok(self.store.list(&query)?)
    }

    /// Fold the history of `object` up to `version` without touching it.
    pub fn reconstruct(&self, object: &O, version: Version) -> Result<ReconstructedState, RevertError> {
        let object_id = self.metadata.identity_of(object)?;
        let object_class = self.metadata.type_of(object)?;
        self.reconstruct_by_id(object_id, object_class, version)
    }

    /// Fold the history of the object identified by `object_id` up to `version`.
    pub fn reconstruct_by_id(
        &self,
        object_id: ObjectId,
        object_class: ObjectClass,
        version: Version,
    ) -> Result<ReconstructedState, RevertError> {
        let query = LogQuery::new(object_id.clone(), object_class.clone())
            .filter(VersionFilter::AtOrBelow(version))
            .order(SortOrder::Ascending);

        let entries = self.store.list(&query)?;
        if entries.is_empty() {
            return Err(RevertError::NoHistory { version });
        }

        let state = fold_entries(
            object_id,
            object_class.clone(),
            &entries,
            &self.invariants,
            |field| self.is_collection(&object_class, field),
        )?;

        Ok(state)
    }

    /// Restore `object` to its state at `version`, in place.
    ///
    /// Failures after the first field write leave the object partially
    /// reverted.
    pub fn revert(&self, object: &mut O, version: Version) -> Result<(), RevertError> {
        let state = self.reconstruct(object, version)?;
        let object_class = state.object_class().clone();

        let versioned = self.versioned.versioned_fields(&object_class)?;
        let missing: Vec<String> = versioned
            .iter()
            .filter(|field| !state.contains(field))
            .cloned()
            .collect();

        if !missing.is_empty() {
            if self.config.strict {
                tracing::warn!(
                    object_id = %state.object_id(),
                    object_class = %object_class,
                    version,
                    ?missing,
                    "refusing incomplete revert"
                );
                return Err(RevertError::IncompleteRevert { version, missing });
            }
            tracing::debug!(?missing, "versioned fields absent from history");
        }

        let object_id = state.object_id().clone();
        let reached = state.version();
        self.fill_with(object, &object_class, &versioned, state.into_fields())?;

        tracing::info!(
            object_id = %object_id,
            object_class = %object_class,
            requested = version,
            reached,
            "object reverted"
        );
        Ok(())
    }

    /// Write the versioned fields of `data` onto `object`.
    fn fill(&self, object: &mut O, class: &ObjectClass, data: Map<String, Value>) -> Result<(), RevertError> {
        let versioned = self.versioned.versioned_fields(class)?;
        self.fill_with(object, class, &versioned, data)
    }

    fn fill_with(
        &self,
        object: &mut O,
        class: &ObjectClass,
        versioned: &[String],
        data: Map<String, Value>,
    ) -> Result<(), RevertError> {
        for (field, value) in data {
            if !versioned.iter().any(|f| *f == field) {
                tracing::debug!(object_class = %class, field = %field, "skipping unversioned field");
                continue;
            }

            let mapping = self.metadata.field_mapping(class, &field)?;
            let resolved = self.resolve(class, &field, &mapping, value)?;
            self.metadata.set_field(object, &field, resolved)?;
        }
        Ok(())
    }

    fn resolve(
        &self,
        class: &ObjectClass,
        field: &str,
        mapping: &FieldMapping,
        value: Value,
    ) -> Result<FieldValue<O>, RevertError> {
        let resolved = match mapping.kind {
            FieldKind::Scalar => FieldValue::raw(value),

            FieldKind::Date if is_empty_value(&value) => FieldValue::Null,
            FieldKind::Date => FieldValue::Date(parse_date(field, &value)?),

            FieldKind::Reference if is_empty_value(&value) => FieldValue::Null,
            FieldKind::Reference => {
                let target = mapping.target_of(class, field)?;
                let id = reference_id(field, &value)?;
                FieldValue::Reference(self.references.get_reference(target, &id)?)
            }

            FieldKind::Embedded => match value {
                Value::Object(map) if !map.is_empty() => {
                    let target = mapping.target_of(class, field)?;
                    FieldValue::Embedded(self.fill_embedded(target, map)?)
                }
                other if is_empty_value(&other) => FieldValue::raw(other),
                other => {
                    return Err(CollaboratorError::MalformedValue {
                        field: field.to_string(),
                        reason: format!("embedded value is not an object: {other}"),
                    }
                    .into())
                }
            },

            FieldKind::EmbeddedCollection if value.is_null() => FieldValue::Null,
            FieldKind::EmbeddedCollection if is_empty_value(&value) => FieldValue::Collection(Vec::new()),
            FieldKind::EmbeddedCollection => {
                let target = mapping.target_of(class, field)?;
                let diffs = ElementDiffs::from_logged(field, &value)?;

                let mut items = Vec::new();
                for element in diffs.iter() {
                    let item = match element {
                        Some(map) if !map.is_empty() => Some(self.fill_embedded(target, map.clone())?),
                        _ => None,
                    };
                    items.push(item);
                }
                FieldValue::Collection(items)
            }
        };

        Ok(resolved)
    }

    fn fill_embedded(&self, class: &ObjectClass, data: Map<String, Value>) -> Result<O, RevertError> {
        let mut instance = self.metadata.new_instance(class)?;
        self.fill(&mut instance, class, data)?;
        Ok(instance)
    }

    fn is_collection(&self, class: &ObjectClass, field: &str) -> Result<bool, CollaboratorError> {
        match self.metadata.is_embedded_collection_field(class, field) {
            // Fields dropped from the mapping fold as plain values
            Err(CollaboratorError::UnknownField { .. }) => Ok(false),
            other => other,
        }
    }
}

/// Identifier stored for a reference: a string, a number, or an
/// object carrying `$id` or `id`.
fn reference_id(field: &str, value: &Value) -> Result<ObjectId, CollaboratorError> {
    match value {
        Value::String(s) => Ok(ObjectId::new(s.clone())),
        Value::Number(n) => Ok(ObjectId::new(n.to_string())),
        Value::Object(map) => map
            .get("$id")
            .or_else(|| map.get("id"))
            .ok_or_else(|| CollaboratorError::MalformedValue {
                field: field.to_string(),
                reason: "reference object carries no id".into(),
            })
            .and_then(|id| reference_id(field, id)),
        other => Err(CollaboratorError::MalformedValue {
            field: field.to_string(),
            reason: format!("not a reference id: {other}"),
        }),
    }
}
