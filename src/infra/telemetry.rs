use std::sync::Once;

use metrics::{Unit, describe_counter, describe_gauge, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::cache::{
    METRIC_FETCH_ERROR_TOTAL, METRIC_FETCH_MS, METRIC_OBJECTS, METRIC_PAGE_DROPPED_TOTAL,
    METRIC_PAGE_MERGE_TOTAL, METRIC_WINDOWS,
};
use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install a global tracing subscriber using the provided logging settings.
///
/// Logs go to stderr so command output on stdout stays machine readable.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .compact()
            .with_writer(std::io::stderr)
            .with_target(true)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| {
            InfraError::telemetry(format!("failed to install tracing subscriber: {err}"))
        })
}

fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(describe_cache_metrics);
}

fn describe_cache_metrics() {
    describe_counter!(
        METRIC_PAGE_MERGE_TOTAL,
        Unit::Count,
        "Total number of result pages merged, by merge outcome."
    );
    describe_counter!(
        METRIC_PAGE_DROPPED_TOTAL,
        Unit::Count,
        "Total number of result pages dropped because their window was invalidated."
    );
    describe_counter!(
        METRIC_FETCH_ERROR_TOTAL,
        Unit::Count,
        "Total number of failed fetches, by scope."
    );
    describe_gauge!(
        METRIC_WINDOWS,
        Unit::Count,
        "Current number of cached result windows."
    );
    describe_gauge!(
        METRIC_OBJECTS,
        Unit::Count,
        "Current number of records in the object store."
    );
    describe_histogram!(
        METRIC_FETCH_MS,
        Unit::Milliseconds,
        "Transport fetch latency in milliseconds, by scope."
    );
}
