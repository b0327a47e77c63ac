use thiserror::Error;

use crate::domain::RecordId;
use crate::domain::error::FetchError;

use super::keys::Fingerprint;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("record `{id}` is not cached")]
    NotFound { id: RecordId },
    /// A page arrived for a window that was invalidated while it was in flight.
    #[error("page for `{fingerprint}` arrived after its window was invalidated")]
    StaleWindow { fingerprint: Fingerprint },
    #[error("no further page can be requested for `{fingerprint}`")]
    NextPageUnavailable { fingerprint: Fingerprint },
}

impl CacheError {
    pub fn not_found(id: impl Into<RecordId>) -> Self {
        Self::NotFound { id: id.into() }
    }

    pub fn stale(fingerprint: &Fingerprint) -> Self {
        Self::StaleWindow {
            fingerprint: fingerprint.clone(),
        }
    }

    pub fn next_unavailable(fingerprint: &Fingerprint) -> Self {
        Self::NextPageUnavailable {
            fingerprint: fingerprint.clone(),
        }
    }

    pub fn is_stale(&self) -> bool {
        matches!(self, Self::StaleWindow { .. })
    }
}
