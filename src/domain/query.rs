//! Query descriptions for paginated listings.
//!
//! A [`Query`] captures everything that decides *which* records a listing
//! shows and in what order. Pagination position (offset, cursor) is not part
//! of it: a result window spans every page fetched for one query.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use url::form_urlencoded;

use crate::cache::Fingerprint;

const PARAM_TEXT: &str = "q";
const PARAM_FILTER_PREFIX: &str = "filter:";
const PARAM_FACET: &str = "facet";
const PARAM_FACET_SIZE_PREFIX: &str = "facet_size:";
const PARAM_SORT: &str = "sort";
const PARAM_LIMIT: &str = "limit";
const PARAM_OFFSET: &str = "offset";

pub const DEFAULT_LIMIT: u32 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            SortDirection::Asc => "asc",
            SortDirection::Desc => "desc",
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "asc" => Some(SortDirection::Asc),
            "desc" => Some(SortDirection::Desc),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SortKey {
    pub field: String,
    pub direction: SortDirection,
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.field, self.direction.as_str())
    }
}

/// A listing query against one server resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    resource: String,
    text: Option<String>,
    filters: BTreeMap<String, BTreeSet<String>>,
    facets: BTreeMap<String, Option<u32>>,
    sort: Vec<SortKey>,
    params: BTreeMap<String, BTreeSet<String>>,
    namespace: Option<String>,
    limit: Option<u32>,
}

impl Query {
    pub fn new(resource: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            text: None,
            filters: BTreeMap::new(),
            facets: BTreeMap::new(),
            sort: Vec::new(),
            params: BTreeMap::new(),
            namespace: None,
            limit: None,
        }
    }

    /// Build a query from a URL query string layered over a fixed context.
    ///
    /// `context` entries use the same parameter names as `search` and are
    /// applied first, so a screen can pin e.g. `filter:kind=source` while the
    /// user controls the rest. `namespace` keeps otherwise identical queries
    /// issued by different screens in separate cache slots.
    pub fn from_search(
        resource: impl Into<String>,
        search: &str,
        context: &[(&str, &str)],
        namespace: Option<&str>,
    ) -> Self {
        let mut query = Self::new(resource);
        for (name, value) in context {
            query.apply_param(name, value);
        }
        let search = search.strip_prefix('?').unwrap_or(search);
        for (name, value) in form_urlencoded::parse(search.as_bytes()) {
            query.apply_param(&name, &value);
        }
        if let Some(namespace) = namespace {
            query.namespace = Some(namespace.to_string());
        }
        query
    }

    fn apply_param(&mut self, name: &str, value: &str) {
        if name == PARAM_TEXT {
            self.set_text(value);
        } else if let Some(field) = name.strip_prefix(PARAM_FILTER_PREFIX) {
            self.add_filter(field, value);
        } else if name == PARAM_FACET {
            self.facets.entry(value.to_string()).or_insert(None);
        } else if let Some(field) = name.strip_prefix(PARAM_FACET_SIZE_PREFIX) {
            if let Ok(size) = value.trim().parse::<u32>() {
                self.facets.insert(field.to_string(), Some(size));
            }
        } else if name == PARAM_SORT {
            let (field, direction) = match value.rsplit_once(':') {
                Some((field, raw)) => match SortDirection::parse(raw) {
                    Some(direction) => (field, direction),
                    None => (value, SortDirection::Asc),
                },
                None => (value, SortDirection::Asc),
            };
            self.push_sort(field, direction);
        } else if name == PARAM_LIMIT {
            if let Ok(limit) = value.trim().parse::<u32>()
                && limit > 0
            {
                self.limit = Some(limit);
            }
        } else if name == PARAM_OFFSET {
            // position within the window, never part of the query identity
        } else if !value.is_empty() {
            self.params
                .entry(name.to_string())
                .or_default()
                .insert(value.to_string());
        }
    }

    fn set_text(&mut self, value: &str) {
        let trimmed = value.trim();
        self.text = (!trimmed.is_empty()).then(|| trimmed.to_string());
    }

    fn add_filter(&mut self, field: &str, value: &str) {
        if value.is_empty() {
            return;
        }
        self.filters
            .entry(field.to_string())
            .or_default()
            .insert(value.to_string());
    }

    fn push_sort(&mut self, field: &str, direction: SortDirection) {
        if field.is_empty() {
            return;
        }
        if let Some(existing) = self.sort.iter_mut().find(|key| key.field == field) {
            existing.direction = direction;
        } else {
            self.sort.push(SortKey {
                field: field.to_string(),
                direction,
            });
        }
    }

    pub fn text(mut self, text: &str) -> Self {
        self.set_text(text);
        self
    }

    pub fn filter(mut self, field: &str, value: &str) -> Self {
        self.add_filter(field, value);
        self
    }

    /// Drop every value of a filter field.
    pub fn clear_filter(mut self, field: &str) -> Self {
        self.filters.remove(field);
        self
    }

    pub fn facet(mut self, field: &str, size: Option<u32>) -> Self {
        self.facets.insert(field.to_string(), size);
        self
    }

    pub fn sort_by(mut self, field: &str, direction: SortDirection) -> Self {
        self.push_sort(field, direction);
        self
    }

    pub fn param(mut self, name: &str, value: &str) -> Self {
        self.apply_param(name, value);
        self
    }

    pub fn namespace(mut self, namespace: &str) -> Self {
        self.namespace = Some(namespace.to_string());
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        if limit > 0 {
            self.limit = Some(limit);
        }
        self
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    pub fn text_term(&self) -> Option<&str> {
        self.text.as_deref()
    }

    pub fn filters(&self) -> &BTreeMap<String, BTreeSet<String>> {
        &self.filters
    }

    pub fn filter_values(&self, field: &str) -> impl Iterator<Item = &str> {
        self.filters
            .get(field)
            .into_iter()
            .flat_map(|values| values.iter().map(String::as_str))
    }

    pub fn facets(&self) -> &BTreeMap<String, Option<u32>> {
        &self.facets
    }

    pub fn sort_keys(&self) -> &[SortKey] {
        &self.sort
    }

    pub fn namespace_key(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    /// Page size explicitly asked for, if any.
    pub fn requested_limit(&self) -> Option<u32> {
        self.limit
    }

    pub fn page_limit(&self) -> u32 {
        self.limit.unwrap_or(DEFAULT_LIMIT)
    }

    /// Canonical parameter pairs in a construction-order independent order.
    pub(crate) fn canonical_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = Vec::new();
        if let Some(text) = &self.text {
            pairs.push((PARAM_TEXT.to_string(), text.clone()));
        }
        for (field, values) in &self.filters {
            for value in values {
                pairs.push((format!("{PARAM_FILTER_PREFIX}{field}"), value.clone()));
            }
        }
        for (field, size) in &self.facets {
            pairs.push((PARAM_FACET.to_string(), field.clone()));
            if let Some(size) = size {
                pairs.push((format!("{PARAM_FACET_SIZE_PREFIX}{field}"), size.to_string()));
            }
        }
        for key in &self.sort {
            pairs.push((PARAM_SORT.to_string(), key.to_string()));
        }
        for (name, values) in &self.params {
            for value in values {
                pairs.push((name.clone(), value.clone()));
            }
        }
        pairs
    }

    /// Render the query as a URL query string, including its page limit.
    pub fn to_search(&self) -> String {
        let mut serializer = form_urlencoded::Serializer::new(String::new());
        for (name, value) in self.canonical_pairs() {
            serializer.append_pair(&name, &value);
        }
        if let Some(limit) = self.limit {
            serializer.append_pair(PARAM_LIMIT, &limit.to_string());
        }
        serializer.finish()
    }

    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::of(self)
    }
}
