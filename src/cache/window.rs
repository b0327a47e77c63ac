//! Result windows: the ordered identities fetched so far for one query.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::domain::error::FetchError;
use crate::domain::{FacetResult, PageRequest, RecordId};

/// Invalidation generation a window belongs to.
///
/// Bumped by every `invalidate_all`; completions carrying an older
/// generation belong to a window that no longer exists.
pub type Generation = u64;

/// Loading/paging state of a result window.
///
/// A single enum keeps `is_loading` and `is_loading_next` mutually exclusive.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "error", rename_all = "snake_case")]
pub enum WindowStatus {
    /// Never requested.
    #[default]
    Empty,
    /// Initial page in flight.
    Loading,
    Loaded,
    /// Continuation page in flight; rows already fetched stay visible.
    LoadingNext,
    /// Initial page failed. Terminal until the window is requested again.
    Failed(FetchError),
    /// Continuation page failed; rows stay visible and the page can be retried.
    NextFailed(FetchError),
}

/// Everything fetched so far for one fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResultWindow {
    pub ids: Vec<RecordId>,
    /// Offset of the most recently merged page.
    pub offset: u32,
    /// Size of the most recently merged page; `None` until the first page lands.
    pub limit: Option<u32>,
    pub next: Option<String>,
    pub total: Option<u64>,
    pub facets: BTreeMap<String, FacetResult>,
    pub status: WindowStatus,
    #[serde(skip)]
    pub generation: Generation,
}

/// Placeholder handed out for fingerprints that were never requested.
pub(crate) static EMPTY_WINDOW: ResultWindow = ResultWindow::empty(0);

impl ResultWindow {
    pub const fn empty(generation: Generation) -> Self {
        Self {
            ids: Vec::new(),
            offset: 0,
            limit: None,
            next: None,
            total: None,
            facets: BTreeMap::new(),
            status: WindowStatus::Empty,
            generation,
        }
    }

    pub fn should_load(&self) -> bool {
        matches!(self.status, WindowStatus::Empty)
    }

    pub fn is_loading(&self) -> bool {
        matches!(self.status, WindowStatus::Loading)
    }

    pub fn is_loading_next(&self) -> bool {
        matches!(self.status, WindowStatus::LoadingNext)
    }

    pub fn is_error(&self) -> bool {
        matches!(
            self.status,
            WindowStatus::Failed(_) | WindowStatus::NextFailed(_)
        )
    }

    pub fn error(&self) -> Option<&FetchError> {
        match &self.status {
            WindowStatus::Failed(error) | WindowStatus::NextFailed(error) => Some(error),
            _ => None,
        }
    }

    /// Whether a continuation page may be requested right now.
    pub fn can_request_next(&self) -> bool {
        self.next.is_some() && !self.is_loading_next() && !self.is_error()
    }

    /// Whether a failed continuation page can be retried.
    pub fn can_retry_next(&self) -> bool {
        self.next.is_some() && matches!(self.status, WindowStatus::NextFailed(_))
    }

    /// Page descriptor continuing this window, if it has a cursor.
    pub fn next_request(&self) -> Option<PageRequest> {
        let limit = self.limit?;
        let next = self.next.clone()?;
        Some(PageRequest::new(
            self.offset.saturating_add(limit),
            limit,
            Some(next),
        ))
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

impl Default for ResultWindow {
    fn default() -> Self {
        Self::empty(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loaded(next: Option<&str>) -> ResultWindow {
        ResultWindow {
            ids: vec![RecordId::from("a"), RecordId::from("b")],
            limit: Some(2),
            next: next.map(str::to_string),
            status: WindowStatus::Loaded,
            ..ResultWindow::default()
        }
    }

    #[test]
    fn placeholder_asks_to_be_loaded() {
        assert!(EMPTY_WINDOW.should_load());
        assert!(!EMPTY_WINDOW.is_loading());
        assert!(!EMPTY_WINDOW.can_request_next());
        assert!(EMPTY_WINDOW.is_empty());
    }

    #[test]
    fn next_eligibility_requires_cursor_idle_and_no_error() {
        assert!(loaded(Some("tok")).can_request_next());
        assert!(!loaded(None).can_request_next());

        let mut window = loaded(Some("tok"));
        window.status = WindowStatus::LoadingNext;
        assert!(!window.can_request_next());

        window.status = WindowStatus::NextFailed(FetchError::transport("reset"));
        assert!(!window.can_request_next());
        assert!(window.can_retry_next());

        window.status = WindowStatus::Failed(FetchError::transport("reset"));
        assert!(!window.can_request_next());
        assert!(!window.can_retry_next());
    }

    #[test]
    fn loading_flags_are_exclusive() {
        let statuses = [
            WindowStatus::Empty,
            WindowStatus::Loading,
            WindowStatus::Loaded,
            WindowStatus::LoadingNext,
            WindowStatus::Failed(FetchError::transport("x")),
            WindowStatus::NextFailed(FetchError::transport("x")),
        ];
        for status in statuses {
            let window = ResultWindow {
                status,
                ..ResultWindow::default()
            };
            assert!(!(window.is_loading() && window.is_loading_next()));
        }
    }

    #[test]
    fn next_request_continues_after_last_page() {
        let mut window = loaded(Some("tok"));
        window.offset = 20;
        window.limit = Some(20);

        assert_eq!(
            window.next_request(),
            Some(PageRequest::new(40, 20, Some("tok".to_string())))
        );
        assert_eq!(loaded(None).next_request(), None);
    }
}
