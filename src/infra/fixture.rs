//! In-process transport serving a JSON dataset.
//!
//! Dataset layout: `{"resources": {"<name>": [<record>, ...]}}`. Filters,
//! text search, sorting, facets and cursor paging are evaluated locally so
//! the cache can be driven end to end without a server.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::application::pagination::OffsetCursor;
use crate::application::transport::Transport;
use crate::domain::error::FetchError;
use crate::domain::query::{Query, SortDirection};
use crate::domain::{FacetResult, FacetValue, PageRequest, PageResponse, Record, RecordId};

use super::error::InfraError;

const DEFAULT_FACET_SIZE: usize = 10;
const STATUS_BAD_REQUEST: u16 = 400;

#[derive(Debug, Default, Deserialize)]
struct Dataset {
    #[serde(default)]
    resources: BTreeMap<String, Vec<Record>>,
}

#[derive(Debug, Default, Clone)]
pub struct FixtureTransport {
    resources: BTreeMap<String, Vec<Record>>,
    index: HashMap<RecordId, Record>,
}

impl FixtureTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a dataset document.
    pub fn from_json(json: &str) -> Result<Self, InfraError> {
        let dataset: Dataset = serde_json::from_str(json)
            .map_err(|err| InfraError::dataset(format!("invalid dataset: {err}")))?;
        let mut transport = Self::new();
        for (resource, records) in dataset.resources {
            transport = transport.with_resource(resource, records);
        }
        Ok(transport)
    }

    /// Read and parse a dataset file.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, InfraError> {
        let path = path.as_ref();
        let json = tokio::fs::read_to_string(path).await?;
        let transport = Self::from_json(&json)?;
        debug!(
            path = %path.display(),
            resources = transport.resources.len(),
            records = transport.index.len(),
            "Loaded fixture dataset"
        );
        Ok(transport)
    }

    pub fn with_resource(mut self, name: impl Into<String>, records: Vec<Record>) -> Self {
        for record in &records {
            self.index.insert(record.id.clone(), record.clone());
        }
        self.resources.entry(name.into()).or_default().extend(records);
        self
    }

    fn matching(&self, query: &Query) -> Result<Vec<&Record>, FetchError> {
        let records = self.resources.get(query.resource()).ok_or_else(|| {
            FetchError::not_found(format!("unknown resource `{}`", query.resource()))
        })?;

        let text = query.text_term().map(str::to_lowercase);
        let mut matching: Vec<&Record> = records
            .iter()
            .filter(|record| {
                query.filters().iter().all(|(field, values)| {
                    field_values(record, field)
                        .iter()
                        .any(|value| values.contains(value))
                })
            })
            .filter(|record| text.as_deref().is_none_or(|term| mentions(record, term)))
            .collect();

        if !query.sort_keys().is_empty() {
            matching.sort_by(|left, right| {
                for key in query.sort_keys() {
                    let ordering = compare_values(left.field(&key.field), right.field(&key.field));
                    let ordering = match key.direction {
                        SortDirection::Asc => ordering,
                        SortDirection::Desc => ordering.reverse(),
                    };
                    if ordering != Ordering::Equal {
                        return ordering;
                    }
                }
                Ordering::Equal
            });
        }
        Ok(matching)
    }
}

#[async_trait]
impl Transport for FixtureTransport {
    async fn fetch_page(
        &self,
        query: &Query,
        page: &PageRequest,
    ) -> Result<PageResponse, FetchError> {
        let matching = self.matching(query)?;
        let total = matching.len();

        let offset = match &page.next {
            Some(cursor) => OffsetCursor::decode(cursor)
                .map_err(|err| FetchError::http(STATUS_BAD_REQUEST, err.to_string()))?
                .offset(),
            None => page.offset,
        };
        let start = (offset as usize).min(total);
        let end = start.saturating_add(page.limit as usize).min(total);

        let next = if end < total {
            let cursor = OffsetCursor::new(end as u32).with_total(total as u64);
            Some(
                cursor
                    .encode()
                    .map_err(|err| FetchError::transport(err.to_string()))?,
            )
        } else {
            None
        };

        let results = matching[start..end].iter().map(|record| (*record).clone()).collect();
        let mut response = PageResponse::new(offset, page.limit, results, next).with_total(total as u64);
        for (field, size) in query.facets() {
            let size = size.map_or(DEFAULT_FACET_SIZE, |size| size as usize);
            response
                .facets
                .insert(field.clone(), facet(&matching, field, size));
        }
        Ok(response)
    }

    async fn fetch_record(&self, id: &RecordId) -> Result<Record, FetchError> {
        self.index
            .get(id)
            .cloned()
            .ok_or_else(|| FetchError::not_found(format!("no record `{id}`")))
    }
}

/// String forms of `field` on `record`; arrays contribute each element.
fn field_values(record: &Record, field: &str) -> Vec<String> {
    match field {
        "id" => return vec![record.id.to_string()],
        "kind" => return vec![record.kind.as_str().to_string()],
        "schema" => return record.schema.iter().cloned().collect(),
        _ => {}
    }
    match record.field(field) {
        Some(Value::Array(items)) => items.iter().filter_map(scalar).collect(),
        Some(value) => scalar(value).into_iter().collect(),
        None => Vec::new(),
    }
}

fn scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        _ => None,
    }
}

fn mentions(record: &Record, term: &str) -> bool {
    record.fields.values().any(|value| match value {
        Value::String(text) => text.to_lowercase().contains(term),
        _ => false,
    })
}

fn compare_values(left: Option<&Value>, right: Option<&Value>) -> Ordering {
    match (left, right) {
        (Some(Value::Number(l)), Some(Value::Number(r))) => l
            .as_f64()
            .partial_cmp(&r.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(l), Some(r)) => scalar(l).cmp(&scalar(r)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn facet(records: &[&Record], field: &str, size: usize) -> FacetResult {
    let mut counts: BTreeMap<String, u64> = BTreeMap::new();
    for record in records {
        for value in field_values(record, field) {
            *counts.entry(value).or_insert(0) += 1;
        }
    }
    let total = counts.len() as u64;
    let mut values: Vec<FacetValue> = counts
        .into_iter()
        .map(|(id, count)| FacetValue {
            id,
            label: None,
            count,
        })
        .collect();
    values.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.id.cmp(&b.id)));
    values.truncate(size);
    FacetResult {
        total: Some(total),
        values,
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    const DATASET: &str = r#"{
        "resources": {
            "collections": [
                {"id": "c1", "kind": "collection", "label": "Harbour registry", "category": "land", "count": 5},
                {"id": "c2", "kind": "collection", "label": "Port leaks", "category": "leak", "count": 12},
                {"id": "c3", "kind": "collection", "label": "Ships", "category": "leak", "count": 7},
                {"id": "c4", "kind": "collection", "label": "Court files", "category": "court", "count": 1}
            ]
        }
    }"#;

    fn transport() -> FixtureTransport {
        FixtureTransport::from_json(DATASET).expect("dataset should parse")
    }

    fn ids(page: &PageResponse) -> Vec<&str> {
        page.results.iter().map(|record| record.id.as_str()).collect()
    }

    #[tokio::test]
    async fn pages_follow_cursor() {
        let transport = transport();
        let query = Query::new("collections").sort_by("count", SortDirection::Desc);

        let first = transport
            .fetch_page(&query, &PageRequest::first(2))
            .await
            .expect("first page");
        assert_eq!(ids(&first), vec!["c2", "c3"]);
        assert_eq!(first.total, Some(4));

        let next = PageRequest::new(2, 2, first.next.clone());
        let second = transport.fetch_page(&query, &next).await.expect("second page");
        assert_eq!(second.offset, 2);
        assert_eq!(ids(&second), vec!["c1", "c4"]);
        assert_eq!(second.next, None);
    }

    #[tokio::test]
    async fn filters_text_and_facets() {
        let transport = transport();
        let query = Query::new("collections")
            .filter("category", "leak")
            .text("PORT")
            .facet("category", None);
        let page = transport
            .fetch_page(&query, &PageRequest::first(10))
            .await
            .expect("page");
        assert_eq!(ids(&page), vec!["c2"]);

        let all = Query::new("collections").facet("category", Some(1));
        let page = transport
            .fetch_page(&all, &PageRequest::first(10))
            .await
            .expect("page");
        let facet = page.facets.get("category").expect("facet requested");
        assert_eq!(facet.total, Some(3));
        assert_eq!(facet.values.len(), 1);
        assert_eq!(facet.values[0].id, "leak");
        assert_eq!(facet.values[0].count, 2);
    }

    #[tokio::test]
    async fn unknown_resource_and_record_are_not_found() {
        let transport = transport();
        let err = transport
            .fetch_page(&Query::new("entities"), &PageRequest::first(5))
            .await
            .expect_err("unknown resource");
        assert!(err.is_not_found());

        let record = transport
            .fetch_record(&RecordId::from("c3"))
            .await
            .expect("record");
        assert_eq!(record.field("label"), Some(&Value::from("Ships")));
        assert!(
            transport
                .fetch_record(&RecordId::from("zz"))
                .await
                .expect_err("missing")
                .is_not_found()
        );
    }

    #[tokio::test]
    async fn ascending_sort_orders_numbers() {
        let query = Query::new("collections").sort_by("count", SortDirection::Asc);
        let page = transport()
            .fetch_page(&query, &PageRequest::first(2))
            .await
            .expect("page");
        assert_eq!(ids(&page), vec!["c4", "c1"]);
        assert!(page.next.is_some());
    }

    #[tokio::test]
    async fn bad_cursor_is_a_client_error() {
        let err = transport()
            .fetch_page(
                &Query::new("collections"),
                &PageRequest::new(2, 2, Some("%%%".to_string())),
            )
            .await
            .expect_err("bad cursor");
        assert_eq!(err.status, Some(STATUS_BAD_REQUEST));
    }

    #[tokio::test]
    async fn loads_dataset_file() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        file.write_all(DATASET.as_bytes()).expect("write dataset");

        let transport = FixtureTransport::load(file.path()).await.expect("load");
        assert!(
            transport
                .fetch_record(&RecordId::from("c1"))
                .await
                .is_ok()
        );

        let err = FixtureTransport::from_json("{\"resources\": 3}").expect_err("invalid");
        assert!(matches!(err, InfraError::Dataset { .. }));
    }
}
