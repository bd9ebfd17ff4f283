use std::sync::Once;

use metrics::{Unit, describe_counter, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install a global tracing subscriber using the provided logging settings.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(true).boxed(),
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

pub(crate) fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "patchwork_page_responses_total",
            Unit::Count,
            "Total number of full-page responses rendered."
        );
        describe_counter!(
            "patchwork_fragment_responses_total",
            Unit::Count,
            "Total number of fragment responses, including zero-task responses."
        );
        describe_counter!(
            "patchwork_render_tasks_total",
            Unit::Count,
            "Total number of render jobs executed by the render worker."
        );
        describe_counter!(
            "patchwork_render_failures_total",
            Unit::Count,
            "Total number of render batches that failed."
        );
        describe_histogram!(
            "patchwork_render_batch_ms",
            Unit::Milliseconds,
            "Latency of a render batch from submission to join, in milliseconds."
        );
    });
}
