use serde::{Deserialize, Serialize};
use thiserror::Error;

const STATUS_NOT_FOUND: u16 = 404;

/// Failure reported by a transport for a page or single-record fetch.
///
/// Stored inside window and object state, so it is cloneable and
/// serializable rather than wrapping a source error.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{}", describe(.status, .message))]
pub struct FetchError {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

fn describe(status: &Option<u16>, message: &str) -> String {
    match status {
        Some(status) => format!("fetch failed with status {status}: {message}"),
        None => format!("fetch failed: {message}"),
    }
}

impl FetchError {
    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status: None,
        }
    }

    pub fn http(status: u16, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status: Some(status),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::http(STATUS_NOT_FOUND, message)
    }

    pub fn is_not_found(&self) -> bool {
        self.status == Some(STATUS_NOT_FOUND)
    }
}
