//! Merge engine: how an arriving page combines with a cached window.

use std::collections::BTreeMap;

use crate::domain::{FacetResult, PageResponse, RecordId};

use super::window::{ResultWindow, WindowStatus};

/// A page reduced to identities, ready to be merged into a window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingPage {
    pub offset: u32,
    pub limit: u32,
    pub ids: Vec<RecordId>,
    pub next: Option<String>,
    pub total: Option<u64>,
    pub facets: BTreeMap<String, FacetResult>,
}

impl IncomingPage {
    pub fn new(offset: u32, limit: u32, ids: Vec<RecordId>, next: Option<String>) -> Self {
        Self {
            offset,
            limit,
            ids,
            next,
            total: None,
            facets: BTreeMap::new(),
        }
    }
}

impl From<&PageResponse> for IncomingPage {
    fn from(page: &PageResponse) -> Self {
        Self {
            offset: page.offset,
            limit: page.limit,
            ids: page.ids(),
            next: page.next.clone(),
            total: page.total,
            facets: page.facets.clone(),
        }
    }
}

/// How a page was combined with the previous window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// First page ever seen for the window.
    Initial,
    /// Contiguous continuation, appended.
    Appended,
    /// Not contiguous, the previous window was discarded.
    Replaced,
}

impl MergeOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            MergeOutcome::Initial => "initial",
            MergeOutcome::Appended => "appended",
            MergeOutcome::Replaced => "replaced",
        }
    }
}

/// Offset a page must start at to continue `window`, once a page has landed.
pub fn expected_offset(window: &ResultWindow) -> Option<u32> {
    window
        .limit
        .map(|limit| window.offset.saturating_add(limit))
}

/// Combine `incoming` with `previous`.
///
/// Appends only when `incoming` starts exactly where the previous window's
/// last page ended; any other offset restarts the window from `incoming`.
/// The result always reports the incoming page's cursor metadata and is
/// `Loaded`; its generation is inherited from `previous`.
pub fn merge_page(previous: Option<&ResultWindow>, incoming: IncomingPage) -> (ResultWindow, MergeOutcome) {
    let generation = previous.map_or(0, |window| window.generation);
    let IncomingPage {
        offset,
        limit,
        ids,
        next,
        total,
        facets,
    } = incoming;

    let (ids, outcome) = match previous.and_then(|window| expected_offset(window).map(|at| (window, at))) {
        None => (ids, MergeOutcome::Initial),
        Some((window, at)) if at == offset => {
            let mut merged = Vec::with_capacity(window.ids.len() + ids.len());
            merged.extend(window.ids.iter().cloned());
            merged.extend(ids);
            (merged, MergeOutcome::Appended)
        }
        Some(_) => (ids, MergeOutcome::Replaced),
    };

    let window = ResultWindow {
        ids,
        offset,
        limit: Some(limit),
        next,
        total,
        facets,
        status: WindowStatus::Loaded,
        generation,
    };
    (window, outcome)
}
