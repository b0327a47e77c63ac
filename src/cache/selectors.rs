//! Read-only views derived from cached state.
//!
//! Nothing here is cached or mutates: every call recomputes from the
//! window and the object store it is given.

use std::collections::BTreeMap;
use std::iter::FusedIterator;
use std::slice;

use serde::Serialize;
use serde_json::Value;

use crate::domain::error::FetchError;
use crate::domain::{FacetResult, FacetValue, Record, RecordId, RecordKind};

use super::store::ObjectStore;
use super::window::{ResultWindow, WindowStatus};

const SCHEMA_FACET: &str = "schema";

/// Window identities resolved against the object store, in window order.
///
/// Yields one item per identity; identities missing from the store (for
/// example after a delete) yield `None`.
#[derive(Debug, Clone)]
pub struct Denormalized<'a> {
    ids: slice::Iter<'a, RecordId>,
    store: &'a ObjectStore,
}

impl<'a> Denormalized<'a> {
    /// Only the records that are present.
    pub fn present(self) -> impl Iterator<Item = &'a Record> + 'a {
        self.flatten()
    }
}

impl<'a> Iterator for Denormalized<'a> {
    type Item = Option<&'a Record>;

    fn next(&mut self) -> Option<Self::Item> {
        let store = self.store;
        self.ids.next().map(|id| store.record(id))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.ids.size_hint()
    }
}

impl ExactSizeIterator for Denormalized<'_> {}

impl FusedIterator for Denormalized<'_> {}

impl DoubleEndedIterator for Denormalized<'_> {
    fn next_back(&mut self) -> Option<Self::Item> {
        let store = self.store;
        self.ids.next_back().map(|id| store.record(id))
    }
}

pub fn denormalize<'a>(window: &'a ResultWindow, store: &'a ObjectStore) -> Denormalized<'a> {
    Denormalized {
        ids: window.ids.iter(),
        store,
    }
}

/// What a list view should render.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ListState {
    /// Nothing requested yet.
    Idle,
    /// First page in flight: full loading indicator.
    Loading,
    Ready,
    /// Rows visible with a spinner at the end.
    LoadingMore,
    Failed,
    /// Rows visible with a retry affordance at the end.
    MoreFailed,
}

pub fn list_state(window: &ResultWindow) -> ListState {
    match window.status {
        WindowStatus::Empty => ListState::Idle,
        WindowStatus::Loading => ListState::Loading,
        WindowStatus::Loaded => ListState::Ready,
        WindowStatus::LoadingNext => ListState::LoadingMore,
        WindowStatus::Failed(_) => ListState::Failed,
        WindowStatus::NextFailed(_) => ListState::MoreFailed,
    }
}

/// Serializable snapshot of one result window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultView {
    pub state: ListState,
    pub results: Vec<Record>,
    /// Identities in the window with no record in the store.
    pub missing: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
    pub has_more: bool,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub facets: BTreeMap<String, FacetResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<FetchError>,
}

pub fn select_result(window: &ResultWindow, store: &ObjectStore) -> ResultView {
    let mut results = Vec::with_capacity(window.len());
    let mut missing = 0;
    for slot in denormalize(window, store) {
        match slot {
            Some(record) => results.push(record.clone()),
            None => missing += 1,
        }
    }

    ResultView {
        state: list_state(window),
        results,
        missing,
        total: window.total,
        has_more: window.next.is_some(),
        facets: window.facets.clone(),
        error: window.error().cloned(),
    }
}

/// Buckets reported for `field` by the latest page, empty if not requested.
pub fn facet_values<'a>(window: &'a ResultWindow, field: &str) -> &'a [FacetValue] {
    window
        .facets
        .get(field)
        .map(|facet| facet.values.as_slice())
        .unwrap_or_default()
}

/// Record count per schema.
///
/// Uses the server's `schema` facet when the query asked for it, otherwise
/// counts the records loaded so far.
pub fn schema_counts(window: &ResultWindow, store: &ObjectStore) -> BTreeMap<String, u64> {
    if let Some(facet) = window.facets.get(SCHEMA_FACET) {
        return facet
            .values
            .iter()
            .map(|value| (value.id.clone(), value.count))
            .collect();
    }

    let mut counts = BTreeMap::new();
    for record in denormalize(window, store).present() {
        if let Some(schema) = &record.schema {
            *counts.entry(schema.clone()).or_insert(0) += 1;
        }
    }
    counts
}

/// Presentation a record should be shown with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Viewer {
    Email,
    Table,
    Text,
    Html,
    Pdf,
    Image,
    Folder,
    Entity,
    Collection,
    /// No preview available.
    Default,
}

pub fn viewer_for(record: &Record) -> Viewer {
    match record.kind {
        RecordKind::Collection => return Viewer::Collection,
        RecordKind::Entity => return Viewer::Entity,
        RecordKind::Document | RecordKind::Unknown => {}
    }

    let has_html = is_truthy(record.field("html"));
    match record.schema.as_deref() {
        Some("Email") => Viewer::Email,
        Some("Table") => Viewer::Table,
        _ if is_truthy(record.field("text")) && !has_html => Viewer::Text,
        _ if has_html => Viewer::Html,
        _ if is_truthy(record.field("links").and_then(|links| links.get("pdf"))) => Viewer::Pdf,
        Some("Image") => Viewer::Image,
        _ if record.field("children").is_some() => Viewer::Folder,
        _ => Viewer::Default,
    }
}

fn is_truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(flag)) => *flag,
        Some(Value::String(text)) => !text.is_empty(),
        Some(Value::Number(number)) => number.as_f64().is_some_and(|n| n != 0.0),
        Some(Value::Array(_)) | Some(Value::Object(_)) => true,
    }
}
