// JSON Document Adapter
//
// A dynamic document model for hosts without compiled entity types.
// Documents are read from JSON, reverted through the schema registry,
// and rendered back to JSON.
//
// Input layout:
// { "class": "Article", "id": "a1", "fields": { "title": "..." } }

use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::log::{ObjectClass, ObjectId};
use crate::schema::{CollaboratorError, FieldValue, ReferenceResolver};

mod registry;

pub use registry::{SchemaError, SchemaRegistry};

/// A dynamically typed document.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    class: ObjectClass,
    id: Option<ObjectId>,
    proxy: bool,
    fields: BTreeMap<String, FieldValue<Document>>,
}

#[derive(Deserialize)]
struct RawDocument {
    class: ObjectClass,
    #[serde(default)]
    id: Option<ObjectId>,
    #[serde(default)]
    fields: Map<String, Value>,
}

impl Document {
    /// Blank document without identity, as used for embedded objects.
    pub fn new(class: ObjectClass) -> Self {
        Self {
            class,
            id: None,
            proxy: false,
            fields: BTreeMap::new(),
        }
    }

    pub fn with_id(class: ObjectClass, id: ObjectId) -> Self {
        Self {
            id: Some(id),
            ..Self::new(class)
        }
    }

    /// Unloaded handle to a stored document.
    pub fn proxy(class: ObjectClass, id: ObjectId) -> Self {
        Self {
            proxy: true,
            ..Self::with_id(class, id)
        }
    }

    /// Parse a document; field values are kept as raw JSON.
    pub fn from_json(value: Value) -> Result<Self, serde_json::Error> {
        let raw: RawDocument = serde_json::from_value(value)?;
        Ok(Self {
            class: raw.class,
            id: raw.id,
            proxy: false,
            fields: raw
                .fields
                .into_iter()
                .map(|(name, value)| (name, FieldValue::raw(value)))
                .collect(),
        })
    }

    pub fn class(&self) -> &ObjectClass {
        &self.class
    }

    pub fn id(&self) -> Option<&ObjectId> {
        self.id.as_ref()
    }

    pub fn is_proxy(&self) -> bool {
        self.proxy
    }

    pub fn get(&self, field: &str) -> Option<&FieldValue<Document>> {
        self.fields.get(field)
    }

    pub fn set(&mut self, field: impl Into<String>, value: FieldValue<Document>) {
        self.fields.insert(field.into(), value);
    }

    pub fn with_field(mut self, field: impl Into<String>, value: FieldValue<Document>) -> Self {
        self.set(field, value);
        self
    }

    /// Scalar shortcut for tests and fixtures.
    pub fn scalar(&self, field: &str) -> Option<&Value> {
        match self.fields.get(field) {
            Some(FieldValue::Scalar(value)) => Some(value),
            _ => None,
        }
    }

    /// Render as JSON. Dates become RFC 3339 strings.
    pub fn to_json(&self) -> Value {
        let mut out = Map::new();
        out.insert("class".into(), Value::String(self.class.0.clone()));
        if let Some(id) = &self.id {
            out.insert("id".into(), Value::String(id.0.clone()));
        }
        if self.proxy {
            out.insert("proxy".into(), Value::Bool(true));
        }
        let fields = self
            .fields
            .iter()
            .map(|(name, value)| (name.clone(), field_to_json(value)))
            .collect();
        out.insert("fields".into(), Value::Object(fields));
        Value::Object(out)
    }
}

fn field_to_json(value: &FieldValue<Document>) -> Value {
    match value {
        FieldValue::Null => Value::Null,
        FieldValue::Scalar(v) => v.clone(),
        FieldValue::Date(d) => Value::String(d.to_rfc3339()),
        FieldValue::Reference(doc) | FieldValue::Embedded(doc) => doc.to_json(),
        FieldValue::Collection(items) => Value::Array(
            items
                .iter()
                .map(|item| item.as_ref().map(Document::to_json).unwrap_or(Value::Null))
                .collect(),
        ),
    }
}

/// Hands out unloaded proxies and counts how often they are loaded.
#[derive(Debug, Default)]
pub struct ProxyResolver {
    sources: HashMap<(ObjectClass, ObjectId), Document>,
    issued: AtomicUsize,
    loads: AtomicUsize,
}

impl ProxyResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make a stored document loadable through its proxy.
    pub fn with_document(mut self, document: Document) -> Self {
        if let Some(id) = document.id.clone() {
            self.sources.insert((document.class.clone(), id), document);
        }
        self
    }

    /// Fully load the document behind `proxy`.
    pub fn load(&self, proxy: &Document) -> Result<Document, CollaboratorError> {
        self.loads.fetch_add(1, Ordering::Relaxed);

        let id = proxy
            .id
            .clone()
            .ok_or_else(|| CollaboratorError::Other("cannot load a document without id".into()))?;
        self.sources
            .get(&(proxy.class.clone(), id.clone()))
            .cloned()
            .ok_or(CollaboratorError::Reference {
                class: proxy.class.clone(),
                id,
                reason: "no such document".into(),
            })
    }

    /// Proxies handed out so far.
    pub fn issued(&self) -> usize {
        self.issued.load(Ordering::Relaxed)
    }

    /// Full loads performed so far.
    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::Relaxed)
    }
}

impl ReferenceResolver<Document> for ProxyResolver {
    fn get_reference(&self, class: &ObjectClass, id: &ObjectId) -> Result<Document, CollaboratorError> {
        self.issued.fetch_add(1, Ordering::Relaxed);
        Ok(Document::proxy(class.clone(), id.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    #[test]
    fn parse_document_json() {
        let doc = Document::from_json(json!({
            "class": "Article",
            "id": "a1",
            "fields": { "title": "Hello", "content": null }
        }))
        .unwrap();

        assert_eq!(doc.class(), &ObjectClass::new("Article"));
        assert_eq!(doc.id(), Some(&ObjectId::new("a1")));
        assert_eq!(doc.scalar("title"), Some(&json!("Hello")));
        assert_eq!(doc.get("content"), Some(&FieldValue::Null));
    }

    #[test]
    fn render_typed_fields() {
        let published = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        let doc = Document::with_id(ObjectClass::new("Article"), ObjectId::new("a1"))
            .with_field("published", FieldValue::Date(published))
            .with_field(
                "author",
                FieldValue::Reference(Document::proxy(ObjectClass::new("User"), ObjectId::new("u1"))),
            )
            .with_field(
                "references",
                FieldValue::Collection(vec![
                    None,
                    Some(Document::new(ObjectClass::new("Reference")).with_field("title", FieldValue::Scalar(json!("r")))),
                ]),
            );

        assert_eq!(
            doc.to_json(),
            json!({
                "class": "Article",
                "id": "a1",
                "fields": {
                    "published": "2024-01-02T03:04:05+00:00",
                    "author": { "class": "User", "id": "u1", "proxy": true, "fields": {} },
                    "references": [null, { "class": "Reference", "fields": { "title": "r" } }]
                }
            })
        );
    }

    #[test]
    fn proxies_are_not_loaded_until_asked() {
        let user = Document::with_id(ObjectClass::new("User"), ObjectId::new("u1"))
            .with_field("name", FieldValue::Scalar(json!("Jo")));
        let resolver = ProxyResolver::new().with_document(user.clone());

        let proxy = resolver
            .get_reference(&ObjectClass::new("User"), &ObjectId::new("u1"))
            .unwrap();
        assert!(proxy.is_proxy());
        assert_eq!(resolver.issued(), 1);
        assert_eq!(resolver.loads(), 0);

        assert_eq!(resolver.load(&proxy).unwrap(), user);
        assert_eq!(resolver.loads(), 1);

        let missing = Document::proxy(ObjectClass::new("User"), ObjectId::new("u2"));
        assert!(matches!(
            resolver.load(&missing),
            Err(CollaboratorError::Reference { .. })
        ));
    }
}
