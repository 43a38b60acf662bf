use std::sync::Once;

use metrics::{Unit, describe_counter, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::application::{detail, search, share};
use crate::config::{LogFormat, LoggingSettings};
use crate::infra::http::middleware::METRIC_HTTP_REQUEST_MS;

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

/// Register metric descriptions with whichever recorder is installed. Without
/// a recorder the `metrics` macros are no-ops.
fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            detail::METRIC_COMMENTS_CREATED,
            Unit::Count,
            "Total number of reader comments created."
        );
        describe_counter!(
            share::METRIC_SHARES_SENT,
            Unit::Count,
            "Total number of share-by-email messages handed to the transport."
        );
        describe_counter!(
            share::METRIC_SHARES_FAILED,
            Unit::Count,
            "Total number of share-by-email messages the transport rejected."
        );
        describe_counter!(
            search::METRIC_SEARCHES,
            Unit::Count,
            "Total number of executed searches, labelled by strategy."
        );
        describe_histogram!(
            METRIC_HTTP_REQUEST_MS,
            Unit::Milliseconds,
            "HTTP request latency in milliseconds."
        );
    });
}
