//! Cache controller: the single entry point for reading and mutating the
//! cache.
//!
//! Every mutation goes through [`CacheController::dispatch`], which stamps
//! the event, applies it to the [`CacheState`], records it in the bounded
//! history and emits logs and metrics for the resulting [`Transition`].

use metrics::{counter, gauge};
use tracing::{debug, info, warn};

use crate::domain::error::FetchError;
use crate::domain::query::Query;
use crate::domain::{PageRequest, PageResponse, Record, RecordId};

use super::config::CacheConfig;
use super::error::CacheError;
use super::events::{CacheEvent, EventKind, EventLog};
use super::keys::Fingerprint;
use super::selectors::{self, Denormalized, ResultView};
use super::state::{CacheState, Transition};
use super::store::ObjectEntry;
use super::window::{Generation, ResultWindow, WindowStatus};

pub(crate) const METRIC_PAGE_MERGE_TOTAL: &str = "folio_cache_page_merge_total";
pub(crate) const METRIC_PAGE_DROPPED_TOTAL: &str = "folio_cache_page_dropped_total";
pub(crate) const METRIC_FETCH_ERROR_TOTAL: &str = "folio_cache_fetch_error_total";
pub(crate) const METRIC_WINDOWS: &str = "folio_cache_windows";
pub(crate) const METRIC_OBJECTS: &str = "folio_cache_objects";

/// Permission to fetch one page, issued when a load starts.
///
/// Hand it back with the outcome; the generation it carries lets the
/// controller recognise pages for windows invalidated in the meantime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageTicket {
    pub fingerprint: Fingerprint,
    pub generation: Generation,
    pub request: PageRequest,
}

#[derive(Debug, Clone)]
pub struct CacheController {
    config: CacheConfig,
    state: CacheState,
    log: EventLog,
}

impl CacheController {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            state: CacheState::new(config.prune_on_delete),
            log: EventLog::new(config.history_limit),
            config,
        }
    }

    /// Rebuild a controller by applying `events` in order.
    ///
    /// Events the reducer rejects are skipped; they never changed state when
    /// they were first dispatched either.
    pub fn replay<I>(config: CacheConfig, events: I) -> Self
    where
        I: IntoIterator<Item = EventKind>,
    {
        let mut controller = Self::new(config);
        let mut applied = 0usize;
        let mut skipped = 0usize;
        for kind in events {
            match controller.dispatch(kind) {
                Ok(_) => applied += 1,
                Err(err) => {
                    debug!(error = %err, "Replay skipped rejected event");
                    skipped += 1;
                }
            }
        }
        info!(
            applied,
            skipped,
            version = controller.state.version(),
            "Cache replay complete"
        );
        controller
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn state(&self) -> &CacheState {
        &self.state
    }

    /// Applied events, oldest first, bounded by `history_limit`.
    pub fn history(&self) -> impl Iterator<Item = &CacheEvent> {
        self.log.iter()
    }

    // ========================================================================
    // Reads
    // ========================================================================

    pub fn window(&self, fingerprint: &Fingerprint) -> &ResultWindow {
        self.state.window(fingerprint)
    }

    pub fn object(&self, id: &RecordId) -> &ObjectEntry {
        self.state.object(id)
    }

    pub fn denormalize(&self, fingerprint: &Fingerprint) -> Denormalized<'_> {
        selectors::denormalize(self.state.window(fingerprint), self.state.objects())
    }

    pub fn select(&self, fingerprint: &Fingerprint) -> ResultView {
        selectors::select_result(self.state.window(fingerprint), self.state.objects())
    }

    pub fn can_request_next(&self, fingerprint: &Fingerprint) -> bool {
        self.state.window(fingerprint).can_request_next()
    }

    // ========================================================================
    // Result windows
    // ========================================================================

    /// Start loading the first page of `query` if its window was never requested.
    ///
    /// Returns `None` when the window is loading, loaded or failed. A failed
    /// window stays failed until [`reload`](Self::reload) is called.
    pub fn begin_load(&mut self, query: &Query) -> Option<PageTicket> {
        let fingerprint = query.fingerprint();
        if !self.state.window(&fingerprint).should_load() {
            return None;
        }
        self.start_first_page(query, fingerprint)
    }

    /// Request the first page of `query` again, resetting a failed window.
    ///
    /// Loaded windows keep their rows until the new page replaces them.
    /// Returns `None` while a page for the window is in flight.
    pub fn reload(&mut self, query: &Query) -> Option<PageTicket> {
        let fingerprint = query.fingerprint();
        let window = self.state.window(&fingerprint);
        if matches!(window.status, WindowStatus::Loading | WindowStatus::LoadingNext) {
            return None;
        }
        self.start_first_page(query, fingerprint)
    }

    fn start_first_page(&mut self, query: &Query, fingerprint: Fingerprint) -> Option<PageTicket> {
        let limit = query
            .requested_limit()
            .unwrap_or_else(|| self.config.page_limit_non_zero().get());
        self.start(fingerprint, PageRequest::first(limit)).ok()
    }

    /// Start loading the page after the last one merged.
    pub fn begin_next_page(&mut self, fingerprint: &Fingerprint) -> Result<PageTicket, CacheError> {
        let window = self.state.window(fingerprint);
        if !window.can_request_next() {
            return Err(CacheError::next_unavailable(fingerprint));
        }
        let request = window
            .next_request()
            .ok_or_else(|| CacheError::next_unavailable(fingerprint))?;
        self.start(fingerprint.clone(), request)
    }

    /// Retry a continuation page that failed, with the same cursor.
    pub fn retry_next_page(&mut self, fingerprint: &Fingerprint) -> Result<PageTicket, CacheError> {
        let window = self.state.window(fingerprint);
        if !window.can_retry_next() {
            return Err(CacheError::next_unavailable(fingerprint));
        }
        let request = window
            .next_request()
            .ok_or_else(|| CacheError::next_unavailable(fingerprint))?;
        self.start(fingerprint.clone(), request)
    }

    fn start(
        &mut self,
        fingerprint: Fingerprint,
        request: PageRequest,
    ) -> Result<PageTicket, CacheError> {
        let generation = self.state.generation();
        let transition = self.dispatch(EventKind::ResultLoadStarted {
            fingerprint: fingerprint.clone(),
            request: request.clone(),
        })?;
        if transition.is_noop() {
            return Err(CacheError::next_unavailable(&fingerprint));
        }
        Ok(PageTicket {
            fingerprint,
            generation,
            request,
        })
    }

    /// Settle a ticket with the page the transport returned.
    ///
    /// Records are stored even when the window was invalidated while the
    /// page was in flight; the merge itself is then dropped and
    /// [`CacheError::StaleWindow`] returned.
    pub fn complete_page(
        &mut self,
        ticket: &PageTicket,
        page: PageResponse,
    ) -> Result<Transition, CacheError> {
        let transition = self.dispatch(EventKind::ResultLoadCompleted {
            fingerprint: ticket.fingerprint.clone(),
            generation: Some(ticket.generation),
            page,
        })?;
        match transition {
            Transition::PageDropped { .. } => Err(CacheError::stale(&ticket.fingerprint)),
            other => Ok(other),
        }
    }

    /// Settle a ticket with the transport's failure.
    pub fn fail_page(
        &mut self,
        ticket: &PageTicket,
        error: FetchError,
    ) -> Result<Transition, CacheError> {
        let transition = self.dispatch(EventKind::ResultLoadFailed {
            fingerprint: ticket.fingerprint.clone(),
            generation: Some(ticket.generation),
            error,
        })?;
        match transition {
            Transition::PageDropped { .. } => Err(CacheError::stale(&ticket.fingerprint)),
            other => Ok(other),
        }
    }

    /// Drop every window. Records stay cached.
    pub fn invalidate_all(&mut self) -> usize {
        match self.dispatch(EventKind::ResultsInvalidated) {
            Ok(Transition::Invalidated { windows }) => windows,
            _ => 0,
        }
    }

    // ========================================================================
    // Objects
    // ========================================================================

    /// Mark `id` as in flight. Returns `false` if a fetch is already running.
    pub fn begin_object_load(&mut self, id: &RecordId) -> bool {
        matches!(
            self.dispatch(EventKind::ObjectLoadStarted { id: id.clone() }),
            Ok(Transition::ObjectLoadStarted)
        )
    }

    pub fn complete_object_load(&mut self, record: Record) {
        // object events are always accepted by the reducer
        let _ = self.dispatch(EventKind::ObjectLoadCompleted { record });
    }

    pub fn fail_object_load(&mut self, id: &RecordId, error: FetchError) {
        let _ = self.dispatch(EventKind::ObjectLoadFailed {
            id: id.clone(),
            error,
        });
    }

    pub fn delete_object(&mut self, id: &RecordId) -> Result<Transition, CacheError> {
        self.dispatch(EventKind::ObjectDeleted { id: id.clone() })
    }

    // ========================================================================
    // Dispatch
    // ========================================================================

    /// Apply one event and record it.
    pub fn dispatch(&mut self, kind: EventKind) -> Result<Transition, CacheError> {
        let event = self.log.stamp(kind);
        let transition = match self.state.apply(&event.kind) {
            Ok(transition) => transition,
            Err(err) => {
                debug!(
                    event_id = %event.id,
                    event_epoch = event.epoch,
                    event_kind = event.kind.name(),
                    error = %err,
                    "Cache event rejected"
                );
                return Err(err);
            }
        };

        self.observe(&event, &transition);
        if !transition.is_noop() {
            self.log.push(event);
        }
        Ok(transition)
    }

    fn observe(&self, event: &CacheEvent, transition: &Transition) {
        let window = event
            .kind
            .fingerprint()
            .map(Fingerprint::digest)
            .unwrap_or_default();

        match transition {
            Transition::LoadStarted { next_page } => {
                info!(
                    event_id = %event.id,
                    event_epoch = event.epoch,
                    window = %window,
                    next_page,
                    "Result page requested"
                );
            }
            Transition::PageMerged {
                outcome,
                ingested,
                len,
            } => {
                info!(
                    event_id = %event.id,
                    event_epoch = event.epoch,
                    window = %window,
                    outcome = outcome.as_str(),
                    ingested,
                    len,
                    "Result page merged"
                );
                counter!(METRIC_PAGE_MERGE_TOTAL, "outcome" => outcome.as_str()).increment(1);
            }
            Transition::PageDropped { ingested } => {
                debug!(
                    event_id = %event.id,
                    event_epoch = event.epoch,
                    window = %window,
                    ingested,
                    "Dropped page for invalidated window"
                );
                counter!(METRIC_PAGE_DROPPED_TOTAL).increment(1);
            }
            Transition::LoadFailed { next_page } => {
                warn!(
                    event_id = %event.id,
                    event_epoch = event.epoch,
                    window = %window,
                    next_page,
                    "Result page failed"
                );
                let scope = if *next_page { "next_page" } else { "page" };
                counter!(METRIC_FETCH_ERROR_TOTAL, "scope" => scope).increment(1);
            }
            Transition::Invalidated { windows } => {
                info!(
                    event_id = %event.id,
                    event_epoch = event.epoch,
                    windows,
                    generation = self.state.generation(),
                    "Result windows invalidated"
                );
            }
            Transition::ObjectFailed => {
                debug!(
                    event_id = %event.id,
                    event_epoch = event.epoch,
                    event_kind = event.kind.name(),
                    "Object load failed"
                );
                counter!(METRIC_FETCH_ERROR_TOTAL, "scope" => "object").increment(1);
            }
            Transition::ObjectDeleted { pruned } => {
                debug!(
                    event_id = %event.id,
                    event_epoch = event.epoch,
                    pruned,
                    "Object deleted"
                );
            }
            Transition::AlreadyLoading
            | Transition::ObjectLoadStarted
            | Transition::ObjectAlreadyLoading
            | Transition::ObjectLoaded => {
                debug!(
                    event_id = %event.id,
                    event_epoch = event.epoch,
                    event_kind = event.kind.name(),
                    "Cache event applied"
                );
            }
        }

        gauge!(METRIC_WINDOWS).set(self.state.window_count() as f64);
        gauge!(METRIC_OBJECTS).set(self.state.objects().len() as f64);
    }
}

impl Default for CacheController {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}
