//! Opaque page cursors handed out by transports.

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
struct OffsetCursorPayload {
    offset: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    total: Option<u64>,
}

/// Cursor pointing at the first row of the next page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OffsetCursor {
    offset: u32,
    total: Option<u64>,
}

impl OffsetCursor {
    pub fn new(offset: u32) -> Self {
        Self {
            offset,
            total: None,
        }
    }

    /// Remember the size of the listing the cursor was issued for.
    pub fn with_total(mut self, total: u64) -> Self {
        self.total = Some(total);
        self
    }

    pub fn offset(&self) -> u32 {
        self.offset
    }

    pub fn total(&self) -> Option<u64> {
        self.total
    }

    pub fn encode(&self) -> Result<String, PaginationError> {
        let payload = OffsetCursorPayload {
            offset: self.offset,
            total: self.total,
        };
        let serialized = serde_json::to_vec(&payload)
            .map_err(|err| PaginationError::InvalidCursor(err.to_string()))?;
        Ok(URL_SAFE_NO_PAD.encode(serialized))
    }

    pub fn decode(cursor: &str) -> Result<Self, PaginationError> {
        let bytes = URL_SAFE_NO_PAD
            .decode(cursor)
            .map_err(|err| PaginationError::InvalidCursor(err.to_string()))?;
        let payload: OffsetCursorPayload = serde_json::from_slice(&bytes)
            .map_err(|err| PaginationError::InvalidCursor(err.to_string()))?;
        Ok(Self {
            offset: payload.offset,
            total: payload.total,
        })
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PaginationError {
    #[error("invalid cursor: {0}")]
    InvalidCursor(String),
}
