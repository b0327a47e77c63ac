//! Cache event system.
//!
//! Every mutation of the cache is an [`EventKind`]; the controller stamps it
//! into a [`CacheEvent`] and keeps a bounded [`EventLog`] for replay.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::error::FetchError;
use crate::domain::{PageRequest, PageResponse, Record, RecordId};

use super::keys::Fingerprint;
use super::window::Generation;

/// Monotonic epoch for ordering events.
///
/// Each applied event gets a unique, monotonically increasing epoch number;
/// replaying a log in epoch order reproduces the state it was recorded from.
pub type Epoch = u64;

/// Cache event with identity and ordering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEvent {
    /// Unique identifier (UUIDv4).
    pub id: Uuid,
    /// Monotonic epoch within one controller.
    pub epoch: Epoch,
    pub kind: EventKind,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

impl CacheEvent {
    pub fn new(kind: EventKind, epoch: Epoch) -> Self {
        Self {
            id: Uuid::new_v4(),
            epoch,
            kind,
            timestamp: OffsetDateTime::now_utc(),
        }
    }
}

/// Discrete cache mutations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    // Result windows
    /// A page for `fingerprint` was requested.
    ResultLoadStarted {
        fingerprint: Fingerprint,
        request: PageRequest,
    },
    /// A page arrived. `generation` is the one the request was issued under;
    /// `None` means the current one.
    ResultLoadCompleted {
        fingerprint: Fingerprint,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        generation: Option<Generation>,
        page: PageResponse,
    },
    /// A page request failed.
    ResultLoadFailed {
        fingerprint: Fingerprint,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        generation: Option<Generation>,
        error: FetchError,
    },
    /// Every window was dropped.
    ResultsInvalidated,

    // Objects
    ObjectLoadStarted { id: RecordId },
    ObjectLoadCompleted { record: Record },
    ObjectLoadFailed { id: RecordId, error: FetchError },
    ObjectDeleted { id: RecordId },
}

impl EventKind {
    pub fn name(&self) -> &'static str {
        match self {
            EventKind::ResultLoadStarted { .. } => "result_load_started",
            EventKind::ResultLoadCompleted { .. } => "result_load_completed",
            EventKind::ResultLoadFailed { .. } => "result_load_failed",
            EventKind::ResultsInvalidated => "results_invalidated",
            EventKind::ObjectLoadStarted { .. } => "object_load_started",
            EventKind::ObjectLoadCompleted { .. } => "object_load_completed",
            EventKind::ObjectLoadFailed { .. } => "object_load_failed",
            EventKind::ObjectDeleted { .. } => "object_deleted",
        }
    }

    /// Window the event targets, if any.
    pub fn fingerprint(&self) -> Option<&Fingerprint> {
        match self {
            EventKind::ResultLoadStarted { fingerprint, .. }
            | EventKind::ResultLoadCompleted { fingerprint, .. }
            | EventKind::ResultLoadFailed { fingerprint, .. } => Some(fingerprint),
            _ => None,
        }
    }
}

/// Bounded history of applied events.
///
/// Epochs keep increasing when old entries are evicted, so a truncated log
/// still orders correctly. A limit of zero disables retention.
#[derive(Debug, Clone)]
pub struct EventLog {
    entries: VecDeque<CacheEvent>,
    limit: usize,
    next_epoch: Epoch,
}

impl EventLog {
    pub fn new(limit: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(limit.min(1024)),
            limit,
            next_epoch: 0,
        }
    }

    /// Get the next epoch number.
    pub fn next_epoch(&mut self) -> Epoch {
        let epoch = self.next_epoch;
        self.next_epoch += 1;
        epoch
    }

    /// Stamp `kind` with the next epoch.
    pub fn stamp(&mut self, kind: EventKind) -> CacheEvent {
        let epoch = self.next_epoch();
        CacheEvent::new(kind, epoch)
    }

    /// Retain `event`, evicting the oldest entry once the limit is reached.
    pub fn push(&mut self, event: CacheEvent) {
        if self.limit == 0 {
            return;
        }
        while self.entries.len() >= self.limit {
            self.entries.pop_front();
        }
        self.entries.push_back(event);
    }

    pub fn iter(&self) -> impl Iterator<Item = &CacheEvent> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new(super::config::DEFAULT_HISTORY_LIMIT)
    }
}
