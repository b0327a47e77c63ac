//! Wire types shared by the folio cache and its transports.
//!
//! A transport turns a query into a [`PageResponse`] of raw [`Record`]s; the
//! cache keeps each record once, keyed by [`RecordId`].

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Server-assigned identity of a record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RecordId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for RecordId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Broad family a record belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Collection,
    Entity,
    Document,
    #[default]
    #[serde(other)]
    Unknown,
}

impl RecordKind {
    pub fn as_str(self) -> &'static str {
        match self {
            RecordKind::Collection => "collection",
            RecordKind::Entity => "entity",
            RecordKind::Document => "document",
            RecordKind::Unknown => "unknown",
        }
    }
}

/// A record as returned by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: RecordId,
    #[serde(default)]
    pub kind: RecordKind,
    /// Fine-grained type such as `Person`, `Email` or `Table`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Record {
    pub fn new(id: impl Into<RecordId>, kind: RecordKind) -> Self {
        Self {
            id: id.into(),
            kind,
            schema: None,
            fields: Map::new(),
        }
    }

    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Shallow-assign `incoming` over `self`.
    ///
    /// Identity, kind and schema are taken from `incoming`; fields present in
    /// `incoming` overwrite, fields only present in `self` are kept. Applying
    /// the same record twice yields the same result as applying it once.
    pub fn assign(&mut self, incoming: Record) {
        self.id = incoming.id;
        self.kind = incoming.kind;
        if incoming.schema.is_some() {
            self.schema = incoming.schema;
        }
        for (name, value) in incoming.fields {
            self.fields.insert(name, value);
        }
    }
}

/// Page descriptor sent to the transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    pub offset: u32,
    pub limit: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,
}

impl PageRequest {
    pub fn first(limit: u32) -> Self {
        Self {
            offset: 0,
            limit,
            next: None,
        }
    }

    pub fn new(offset: u32, limit: u32, next: Option<String>) -> Self {
        Self {
            offset,
            limit,
            next,
        }
    }

    pub fn is_continuation(&self) -> bool {
        self.next.is_some()
    }
}

/// One bucket of a facet aggregation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FacetValue {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub count: u64,
}

/// Facet aggregation reported alongside a page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FacetResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
    #[serde(default)]
    pub values: Vec<FacetValue>,
}

/// A page of records returned by the transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageResponse {
    pub offset: u32,
    pub limit: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,
    #[serde(default)]
    pub results: Vec<Record>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub facets: BTreeMap<String, FacetResult>,
}

impl PageResponse {
    pub fn new(offset: u32, limit: u32, results: Vec<Record>, next: Option<String>) -> Self {
        Self {
            offset,
            limit,
            total: None,
            next,
            results,
            facets: BTreeMap::new(),
        }
    }

    pub fn with_total(mut self, total: u64) -> Self {
        self.total = Some(total);
        self
    }

    pub fn ids(&self) -> Vec<RecordId> {
        self.results.iter().map(|record| record.id.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn record_deserializes_flattened_fields() {
        let record: Record = serde_json::from_value(json!({
            "id": "doc-1",
            "kind": "document",
            "schema": "Email",
            "title": "Quarterly report",
        }))
        .expect("record should deserialize");

        assert_eq!(record.id.as_str(), "doc-1");
        assert_eq!(record.kind, RecordKind::Document);
        assert_eq!(record.schema.as_deref(), Some("Email"));
        assert_eq!(record.field("title"), Some(&json!("Quarterly report")));
    }

    #[test]
    fn unknown_kind_falls_back() {
        let record: Record = serde_json::from_value(json!({"id": "x", "kind": "mystery"}))
            .expect("record should deserialize");
        assert_eq!(record.kind, RecordKind::Unknown);
    }

    #[test]
    fn assign_keeps_fields_missing_from_incoming() {
        let mut existing = Record::new("e1", RecordKind::Entity)
            .with_field("name", "Alice")
            .with_field("country", "de");
        let incoming = Record::new("e1", RecordKind::Entity).with_field("name", "Alice B.");

        existing.assign(incoming.clone());
        let once = existing.clone();
        existing.assign(incoming);

        assert_eq!(existing, once);
        assert_eq!(existing.field("name"), Some(&json!("Alice B.")));
        assert_eq!(existing.field("country"), Some(&json!("de")));
    }
}
