// Schema Registry
//
// Field descriptors and versioned-field configuration for documents,
// built once from a JSON schema file.

use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};

use super::Document;
use crate::log::{ObjectClass, ObjectId};
use crate::schema::{
    CollaboratorError, FieldKind, FieldMapping, FieldValue, MetadataService, TypeSchema,
    VersionedFieldConfig,
};

#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("invalid schema JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("field `{field}` of `{class}` needs a target type")]
    MissingTarget { class: ObjectClass, field: String },

    #[error("field `{field}` of `{class}` targets unknown type `{target}`")]
    UnknownTarget {
        class: ObjectClass,
        field: String,
        target: ObjectClass,
    },

    #[error("field `{field}` of `{class}` is declared twice")]
    DuplicateField { class: ObjectClass, field: String },
}

/// Schema file layout.
#[derive(Debug, Deserialize)]
struct SchemaFile {
    types: BTreeMap<ObjectClass, TypeSpec>,
}

#[derive(Debug, Deserialize)]
struct TypeSpec {
    #[serde(default)]
    fields: Vec<FieldSpec>,
}

#[derive(Debug, Deserialize)]
struct FieldSpec {
    name: String,
    #[serde(default = "scalar_kind")]
    kind: FieldKind,
    #[serde(default)]
    target: Option<ObjectClass>,
    #[serde(default = "versioned_by_default")]
    versioned: bool,
}

fn scalar_kind() -> FieldKind {
    FieldKind::Scalar
}

fn versioned_by_default() -> bool {
    true
}

/// Type schemas of every document class.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    types: HashMap<ObjectClass, TypeSchema>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, class: ObjectClass, schema: TypeSchema) {
        self.types.insert(class, schema);
    }

    pub fn with_type(mut self, class: impl Into<String>, schema: TypeSchema) -> Self {
        self.register(ObjectClass::new(class), schema);
        self
    }

    /// Load and validate a schema file.
    ///
    /// ```json
    /// { "types": { "Article": { "fields": [
    ///     { "name": "title" },
    ///     { "name": "author", "kind": "reference", "target": "User" }
    /// ] } } }
    /// ```
    pub fn from_json(json: &str) -> Result<Self, SchemaError> {
        let file: SchemaFile = serde_json::from_str(json)?;
        let mut registry = Self::new();

        for (class, spec) in &file.types {
            let mut schema = TypeSchema::new();
            for field in &spec.fields {
                if schema.mapping(&field.name).is_some() {
                    return Err(SchemaError::DuplicateField {
                        class: class.clone(),
                        field: field.name.clone(),
                    });
                }

                let mapping = match (field.kind.requires_target(), &field.target) {
                    (true, None) => {
                        return Err(SchemaError::MissingTarget {
                            class: class.clone(),
                            field: field.name.clone(),
                        })
                    }
                    (true, Some(target)) if !file.types.contains_key(target) => {
                        return Err(SchemaError::UnknownTarget {
                            class: class.clone(),
                            field: field.name.clone(),
                            target: target.clone(),
                        })
                    }
                    (true, target) => FieldMapping {
                        kind: field.kind,
                        target: target.clone(),
                    },
                    (false, _) => FieldMapping {
                        kind: field.kind,
                        target: None,
                    },
                };

                schema = schema.field(field.name.clone(), mapping, field.versioned);
            }
            registry.register(class.clone(), schema);
        }

        Ok(registry)
    }

    pub fn schema(&self, class: &ObjectClass) -> Result<&TypeSchema, CollaboratorError> {
        self.types
            .get(class)
            .ok_or_else(|| CollaboratorError::UnknownType(class.clone()))
    }
}

impl MetadataService<Document> for SchemaRegistry {
    fn identity_of(&self, object: &Document) -> Result<ObjectId, CollaboratorError> {
        object.id().cloned().ok_or_else(|| {
            CollaboratorError::Other(format!("document of type `{}` has no identifier", object.class()))
        })
    }

    fn type_of(&self, object: &Document) -> Result<ObjectClass, CollaboratorError> {
        Ok(object.class().clone())
    }

    fn field_mapping(&self, class: &ObjectClass, field: &str) -> Result<FieldMapping, CollaboratorError> {
        self.schema(class)?
            .mapping(field)
            .cloned()
            .ok_or_else(|| CollaboratorError::UnknownField {
                class: class.clone(),
                field: field.to_string(),
            })
    }

    fn new_instance(&self, class: &ObjectClass) -> Result<Document, CollaboratorError> {
        self.schema(class)?;
        Ok(Document::new(class.clone()))
    }

    fn set_field(
        &self,
        object: &mut Document,
        field: &str,
        value: FieldValue<Document>,
    ) -> Result<(), CollaboratorError> {
        self.field_mapping(object.class(), field)?;
        object.set(field, value);
        Ok(())
    }
}

impl VersionedFieldConfig for SchemaRegistry {
    fn versioned_fields(&self, class: &ObjectClass) -> Result<Vec<String>, CollaboratorError> {
        Ok(self.schema(class)?.versioned_fields().to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCHEMA: &str = r#"
    {
      "types": {
        "Article": {
          "fields": [
            { "name": "title" },
            { "name": "views", "versioned": false },
            { "name": "published", "kind": "date" },
            { "name": "author", "kind": "reference", "target": "User" },
            { "name": "references", "kind": "embedded_collection", "target": "Reference" }
          ]
        },
        "Reference": { "fields": [ { "name": "title" }, { "name": "url" } ] },
        "User": {}
      }
    }
    "#;

    fn article() -> ObjectClass {
        ObjectClass::new("Article")
    }

    #[test]
    fn load_schema_json() {
        let registry = SchemaRegistry::from_json(SCHEMA).unwrap();

        assert_eq!(
            registry.versioned_fields(&article()).unwrap(),
            vec!["title", "published", "author", "references"]
        );
        assert!(registry
            .is_embedded_collection_field(&article(), "references")
            .unwrap());
        assert!(registry.is_reference_field(&article(), "author").unwrap());
        assert!(!registry.is_embedded_field(&article(), "title").unwrap());
        assert_eq!(
            registry.field_mapping(&article(), "views").unwrap(),
            FieldMapping::scalar()
        );
    }

    #[test]
    fn unknown_lookups_fail() {
        let registry = SchemaRegistry::from_json(SCHEMA).unwrap();

        assert!(matches!(
            registry.field_mapping(&article(), "subtitle"),
            Err(CollaboratorError::UnknownField { .. })
        ));
        assert!(matches!(
            registry.versioned_fields(&ObjectClass::new("Comment")),
            Err(CollaboratorError::UnknownType(_))
        ));
        assert!(registry.new_instance(&ObjectClass::new("Comment")).is_err());
    }

    #[test]
    fn invalid_schemas_are_rejected() {
        let missing = r#"{ "types": { "A": { "fields": [ { "name": "b", "kind": "embedded" } ] } } }"#;
        assert!(matches!(
            SchemaRegistry::from_json(missing),
            Err(SchemaError::MissingTarget { .. })
        ));

        let unknown = r#"{ "types": { "A": { "fields": [ { "name": "b", "kind": "reference", "target": "B" } ] } } }"#;
        assert!(matches!(
            SchemaRegistry::from_json(unknown),
            Err(SchemaError::UnknownTarget { .. })
        ));

        let duplicate = r#"{ "types": { "A": { "fields": [ { "name": "b" }, { "name": "b" } ] } } }"#;
        assert!(matches!(
            SchemaRegistry::from_json(duplicate),
            Err(SchemaError::DuplicateField { .. })
        ));
    }

    #[test]
    fn set_field_requires_mapped_field() {
        let registry = SchemaRegistry::from_json(SCHEMA).unwrap();
        let mut doc = Document::with_id(article(), ObjectId::new("a1"));

        registry
            .set_field(&mut doc, "title", FieldValue::Scalar("t".into()))
            .unwrap();
        assert!(registry
            .set_field(&mut doc, "subtitle", FieldValue::Null)
            .is_err());
        assert!(registry.identity_of(&Document::new(article())).is_err());
    }
}
