//! Infrastructure adapters and runtime bootstrap.

pub mod error;
pub mod event_log;
pub mod fixture;
pub mod telemetry;
