//! JSON-lines event logs.
//!
//! Each non-blank line holds either a bare [`EventKind`] or a full
//! [`CacheEvent`] as written by [`write_event_log`]. Lines starting with `#`
//! are comments.

use std::path::Path;

use serde::Deserialize;
use tracing::debug;

use crate::cache::{CacheEvent, EventKind};

use super::error::InfraError;

#[derive(Deserialize)]
#[serde(untagged)]
enum LogLine {
    Stamped(CacheEvent),
    Bare(EventKind),
}

impl LogLine {
    fn into_kind(self) -> EventKind {
        match self {
            LogLine::Stamped(event) => event.kind,
            LogLine::Bare(kind) => kind,
        }
    }
}

pub fn parse_event_log(text: &str) -> Result<Vec<EventKind>, InfraError> {
    let mut events = Vec::new();
    for (index, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let parsed: LogLine = serde_json::from_str(line).map_err(|source| InfraError::EventLog {
            line: index + 1,
            source,
        })?;
        events.push(parsed.into_kind());
    }
    Ok(events)
}

pub async fn read_event_log(path: impl AsRef<Path>) -> Result<Vec<EventKind>, InfraError> {
    let path = path.as_ref();
    let text = tokio::fs::read_to_string(path).await?;
    let events = parse_event_log(&text)?;
    debug!(path = %path.display(), events = events.len(), "Read event log");
    Ok(events)
}

pub async fn write_event_log<'a, I>(path: impl AsRef<Path>, events: I) -> Result<usize, InfraError>
where
    I: IntoIterator<Item = &'a CacheEvent>,
{
    let mut buffer = Vec::new();
    let mut written = 0usize;
    for event in events {
        serde_json::to_writer(&mut buffer, event)?;
        buffer.push(b'\n');
        written += 1;
    }

    tokio::fs::write(path.as_ref(), buffer).await?;
    Ok(written)
}
