// Versioned Field Schema & Collaborator Contracts
//
// The revert engine never inspects objects itself. Identity, field
// kinds, instantiation, configuration and reference resolution are
// all reached through the traits below.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use crate::log::{ObjectClass, ObjectId};

/// How a field's logged value is turned back into a live value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Scalar,
    Date,
    /// Single embedded sub-object.
    Embedded,
    /// Ordered collection of embedded sub-objects.
    EmbeddedCollection,
    /// Single-valued association to another tracked object.
    Reference,
}

impl FieldKind {
    /// Kinds that name another type.
    pub fn requires_target(&self) -> bool {
        matches!(
            self,
            FieldKind::Embedded | FieldKind::EmbeddedCollection | FieldKind::Reference
        )
    }
}

/// Mapping of a single field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldMapping {
    pub kind: FieldKind,
    pub target: Option<ObjectClass>,
}

impl FieldMapping {
    pub fn scalar() -> Self {
        Self {
            kind: FieldKind::Scalar,
            target: None,
        }
    }

    pub fn date() -> Self {
        Self {
            kind: FieldKind::Date,
            target: None,
        }
    }

    pub fn embedded(target: ObjectClass) -> Self {
        Self {
            kind: FieldKind::Embedded,
            target: Some(target),
        }
    }

    pub fn embedded_collection(target: ObjectClass) -> Self {
        Self {
            kind: FieldKind::EmbeddedCollection,
            target: Some(target),
        }
    }

    pub fn reference(target: ObjectClass) -> Self {
        Self {
            kind: FieldKind::Reference,
            target: Some(target),
        }
    }

    /// Target type of an embedded or reference field.
    pub fn target_of(&self, class: &ObjectClass, field: &str) -> Result<&ObjectClass, CollaboratorError> {
        self.target.as_ref().ok_or_else(|| CollaboratorError::MissingTarget {
            class: class.clone(),
            field: field.to_string(),
        })
    }
}

/// Precomputed field descriptors of one type, looked up by name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TypeSchema {
    order: Vec<String>,
    mappings: HashMap<String, FieldMapping>,
    versioned: Vec<String>,
}

impl TypeSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a field. Redeclaring a name replaces its mapping in place.
    pub fn field(mut self, name: impl Into<String>, mapping: FieldMapping, versioned: bool) -> Self {
        let name = name.into();
        if self.mappings.insert(name.clone(), mapping).is_none() {
            self.order.push(name.clone());
        }
        self.versioned.retain(|f| *f != name);
        if versioned {
            self.versioned.push(name);
        }
        self
    }

    /// Declare a versioned field.
    pub fn versioned(self, name: impl Into<String>, mapping: FieldMapping) -> Self {
        self.field(name, mapping, true)
    }

    pub fn mapping(&self, field: &str) -> Option<&FieldMapping> {
        self.mappings.get(field)
    }

    pub fn is_versioned(&self, field: &str) -> bool {
        self.versioned.iter().any(|f| f == field)
    }

    /// Versioned field names in declaration order.
    pub fn versioned_fields(&self) -> &[String] {
        &self.versioned
    }

    /// All fields in declaration order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldMapping)> {
        self.order
            .iter()
            .filter_map(|name| self.mappings.get(name).map(|m| (name.as_str(), m)))
    }
}

/// Live value written onto an object during revert.
///
/// `O` is the host's object type: embedded instances and lazy
/// reference handles are objects of the same model.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue<O> {
    Null,
    Scalar(Value),
    Date(DateTime<Utc>),
    Reference(O),
    Embedded(O),
    /// Index-preserving; `None` marks a position no entry ever filled.
    Collection(Vec<Option<O>>),
}

impl<O> FieldValue<O> {
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    /// A raw logged value passed through without conversion.
    pub fn raw(value: Value) -> Self {
        match value {
            Value::Null => FieldValue::Null,
            other => FieldValue::Scalar(other),
        }
    }
}

/// Failure reported by an external collaborator.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum CollaboratorError {
    #[error("unknown type `{0}`")]
    UnknownType(ObjectClass),

    #[error("type `{class}` has no field `{field}`")]
    UnknownField { class: ObjectClass, field: String },

    #[error("field `{field}` of `{class}` does not name a target type")]
    MissingTarget { class: ObjectClass, field: String },

    #[error("field `{field}` holds an invalid date: {value}")]
    InvalidDate { field: String, value: String },

    #[error("field `{field}` holds a malformed value: {reason}")]
    MalformedValue { field: String, reason: String },

    #[error("cannot reference {class}#{id}: {reason}")]
    Reference {
        class: ObjectClass,
        id: ObjectId,
        reason: String,
    },

    #[error("{0}")]
    Other(String),
}

/// Identity and metadata service.
pub trait MetadataService<O>: Send + Sync {
    fn identity_of(&self, object: &O) -> Result<ObjectId, CollaboratorError>;

    fn type_of(&self, object: &O) -> Result<ObjectClass, CollaboratorError>;

    fn field_mapping(
        &self,
        class: &ObjectClass,
        field: &str,
    ) -> Result<FieldMapping, CollaboratorError>;

    /// Blank instance of `class`, used for embedded sub-objects.
    fn new_instance(&self, class: &ObjectClass) -> Result<O, CollaboratorError>;

    fn set_field(
        &self,
        object: &mut O,
        field: &str,
        value: FieldValue<O>,
    ) -> Result<(), CollaboratorError>;

    fn is_embedded_collection_field(
        &self,
        class: &ObjectClass,
        field: &str,
    ) -> Result<bool, CollaboratorError> {
        Ok(self.field_mapping(class, field)?.kind == FieldKind::EmbeddedCollection)
    }

    fn is_embedded_field(&self, class: &ObjectClass, field: &str) -> Result<bool, CollaboratorError> {
        Ok(self.field_mapping(class, field)?.kind == FieldKind::Embedded)
    }

    fn is_reference_field(&self, class: &ObjectClass, field: &str) -> Result<bool, CollaboratorError> {
        Ok(self.field_mapping(class, field)?.kind == FieldKind::Reference)
    }
}

/// Versioned-field configuration, as declared to the change-tracking listener.
pub trait VersionedFieldConfig: Send + Sync {
    /// Ordered set of versioned field names for `class`.
    fn versioned_fields(&self, class: &ObjectClass) -> Result<Vec<String>, CollaboratorError>;
}

/// Produces lazy handles to tracked objects without loading them.
pub trait ReferenceResolver<O>: Send + Sync {
    fn get_reference(&self, class: &ObjectClass, id: &ObjectId) -> Result<O, CollaboratorError>;
}

/// Whether a logged value counts as empty: null, false, "", [] or {}.
pub fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        Value::Number(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn emptiness() {
        assert!(is_empty_value(&json!(null)));
        assert!(is_empty_value(&json!("")));
        assert!(is_empty_value(&json!([])));
        assert!(is_empty_value(&json!({})));
        assert!(is_empty_value(&json!(false)));

        assert!(!is_empty_value(&json!(0)));
        assert!(!is_empty_value(&json!("0")));
        assert!(!is_empty_value(&json!({"a": 1})));
    }

    #[test]
    fn kind_parses_snake_case() {
        let kind: FieldKind = serde_json::from_str("\"embedded_collection\"").unwrap();
        assert_eq!(kind, FieldKind::EmbeddedCollection);
        assert!(kind.requires_target());
        assert!(!FieldKind::Date.requires_target());
    }

    #[test]
    fn type_schema_keeps_declaration_order() {
        let schema = TypeSchema::new()
            .versioned("title", FieldMapping::scalar())
            .field("views", FieldMapping::scalar(), false)
            .versioned("published", FieldMapping::date())
            .versioned("title", FieldMapping::scalar());

        let names: Vec<_> = schema.fields().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["title", "views", "published"]);
        assert_eq!(schema.versioned_fields(), ["published", "title"]);
        assert!(!schema.is_versioned("views"));
        assert_eq!(schema.mapping("published"), Some(&FieldMapping::date()));
        assert!(schema.mapping("missing").is_none());
    }

    #[test]
    fn raw_null_becomes_null() {
        assert!(FieldValue::<()>::raw(json!(null)).is_null());
        assert_eq!(FieldValue::<()>::raw(json!("")), FieldValue::Scalar(json!("")));
    }
}
