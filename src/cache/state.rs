//! Versioned cache state and the reducer that mutates it.
//!
//! [`CacheState::apply`] is the only way state changes: one event at a
//! time, with no I/O, so applying the same events in the same order always
//! produces the same state.

use std::collections::HashMap;

use crate::domain::RecordId;
use crate::domain::error::FetchError;

use super::error::CacheError;
use super::events::EventKind;
use super::keys::Fingerprint;
use super::merge::{IncomingPage, MergeOutcome, merge_page};
use super::store::{ObjectEntry, ObjectStore};
use super::window::{EMPTY_WINDOW, Generation, ResultWindow, WindowStatus};

/// What an applied event did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// A window moved to `Loading` or, for continuations, `LoadingNext`.
    LoadStarted { next_page: bool },
    /// The window already had a request in flight; nothing changed.
    AlreadyLoading,
    PageMerged {
        outcome: MergeOutcome,
        ingested: usize,
        len: usize,
    },
    /// Records were stored but the page belonged to an invalidated window.
    PageDropped { ingested: usize },
    LoadFailed { next_page: bool },
    Invalidated { windows: usize },
    ObjectLoadStarted,
    ObjectAlreadyLoading,
    ObjectLoaded,
    ObjectFailed,
    ObjectDeleted { pruned: usize },
}

impl Transition {
    /// Whether the event changed any state.
    pub fn is_noop(&self) -> bool {
        matches!(self, Transition::AlreadyLoading | Transition::ObjectAlreadyLoading)
    }
}

#[derive(Debug, Clone, Default)]
pub struct CacheState {
    version: u64,
    generation: Generation,
    objects: ObjectStore,
    windows: HashMap<Fingerprint, ResultWindow>,
    prune_on_delete: bool,
}

impl CacheState {
    pub fn new(prune_on_delete: bool) -> Self {
        Self {
            prune_on_delete,
            ..Self::default()
        }
    }

    /// Count of state-changing events applied so far.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn objects(&self) -> &ObjectStore {
        &self.objects
    }

    pub fn object(&self, id: &RecordId) -> &ObjectEntry {
        self.objects.entry(id)
    }

    /// Window for `fingerprint`, or the shared `Empty` placeholder.
    pub fn window(&self, fingerprint: &Fingerprint) -> &ResultWindow {
        self.windows.get(fingerprint).unwrap_or(&EMPTY_WINDOW)
    }

    pub fn windows(&self) -> impl Iterator<Item = (&Fingerprint, &ResultWindow)> {
        self.windows.iter()
    }

    pub fn window_count(&self) -> usize {
        self.windows.len()
    }

    /// Apply one event.
    ///
    /// An `Err` leaves the state untouched.
    pub fn apply(&mut self, event: &EventKind) -> Result<Transition, CacheError> {
        let transition = match event {
            EventKind::ResultLoadStarted {
                fingerprint,
                request,
            } => self.start_window(fingerprint, request.is_continuation())?,
            EventKind::ResultLoadCompleted {
                fingerprint,
                generation,
                page,
            } => {
                let ingested = self.objects.ingest_list_page(page.results.iter().cloned());
                if self.is_stale(*generation) {
                    Transition::PageDropped { ingested }
                } else {
                    let (mut window, outcome) =
                        merge_page(self.windows.get(fingerprint), IncomingPage::from(page));
                    window.generation = self.generation;
                    let len = window.len();
                    self.windows.insert(fingerprint.clone(), window);
                    Transition::PageMerged {
                        outcome,
                        ingested,
                        len,
                    }
                }
            }
            EventKind::ResultLoadFailed {
                fingerprint,
                generation,
                error,
            } => {
                if self.is_stale(*generation) {
                    Transition::PageDropped { ingested: 0 }
                } else {
                    self.fail_window(fingerprint, error.clone())
                }
            }
            EventKind::ResultsInvalidated => {
                let windows = self.windows.len();
                self.windows.clear();
                self.generation += 1;
                Transition::Invalidated { windows }
            }
            EventKind::ObjectLoadStarted { id } => {
                if self.objects.start_load(id) {
                    Transition::ObjectLoadStarted
                } else {
                    Transition::ObjectAlreadyLoading
                }
            }
            EventKind::ObjectLoadCompleted { record } => {
                self.objects.complete_load(record.clone());
                Transition::ObjectLoaded
            }
            EventKind::ObjectLoadFailed { id, error } => {
                self.objects.fail_load(id, error.clone());
                Transition::ObjectFailed
            }
            EventKind::ObjectDeleted { id } => {
                if self.objects.delete(id).is_none() {
                    return Err(CacheError::not_found(id.clone()));
                }
                let pruned = if self.prune_on_delete {
                    self.prune(id)
                } else {
                    0
                };
                Transition::ObjectDeleted { pruned }
            }
        };

        if !transition.is_noop() {
            self.version += 1;
        }
        Ok(transition)
    }

    fn is_stale(&self, generation: Option<Generation>) -> bool {
        generation.is_some_and(|generation| generation != self.generation)
    }

    fn start_window(
        &mut self,
        fingerprint: &Fingerprint,
        continuation: bool,
    ) -> Result<Transition, CacheError> {
        let current = self.window(fingerprint);

        if continuation {
            if !(current.can_request_next() || current.can_retry_next()) {
                return Err(CacheError::next_unavailable(fingerprint));
            }
            if let Some(window) = self.windows.get_mut(fingerprint) {
                window.status = WindowStatus::LoadingNext;
            }
            return Ok(Transition::LoadStarted { next_page: true });
        }

        if current.is_loading() {
            return Ok(Transition::AlreadyLoading);
        }
        let reset = matches!(current.status, WindowStatus::Empty | WindowStatus::Failed(_));

        if reset {
            let mut window = ResultWindow::empty(self.generation);
            window.status = WindowStatus::Loading;
            self.windows.insert(fingerprint.clone(), window);
        } else if let Some(window) = self.windows.get_mut(fingerprint) {
            // reload of a populated window: rows stay until the first page replaces them
            window.status = WindowStatus::Loading;
        }
        Ok(Transition::LoadStarted { next_page: false })
    }

    fn fail_window(&mut self, fingerprint: &Fingerprint, error: FetchError) -> Transition {
        let generation = self.generation;
        let window = self
            .windows
            .entry(fingerprint.clone())
            .or_insert_with(|| ResultWindow::empty(generation));
        let next_page = window.is_loading_next();
        window.status = if next_page {
            WindowStatus::NextFailed(error)
        } else {
            WindowStatus::Failed(error)
        };
        Transition::LoadFailed { next_page }
    }

    fn prune(&mut self, id: &RecordId) -> usize {
        let mut pruned = 0;
        for window in self.windows.values_mut() {
            let before = window.ids.len();
            window.ids.retain(|candidate| candidate != id);
            pruned += before - window.ids.len();
        }
        pruned
    }
}
