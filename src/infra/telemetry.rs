use std::sync::Once;

use metrics::{Unit, describe_counter};
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

fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "verdant_cache_hit_total",
            Unit::Count,
            "Total number of cache hits."
        );
        describe_counter!(
            "verdant_cache_miss_total",
            Unit::Count,
            "Total number of cache misses."
        );
        describe_counter!(
            "verdant_cache_expired_total",
            Unit::Count,
            "Total number of cache entries dropped because their TTL elapsed."
        );
        describe_counter!(
            "verdant_cache_evict_total",
            Unit::Count,
            "Total number of cache evictions due to capacity."
        );
        describe_counter!(
            "verdant_ingest_readings_total",
            Unit::Count,
            "Total number of sensor readings accepted by telemetry ingest."
        );
        describe_counter!(
            "verdant_bridge_command_total",
            Unit::Count,
            "Total number of actuator commands issued."
        );
        describe_counter!(
            "verdant_bridge_ack_total",
            Unit::Count,
            "Total number of commands acknowledged by devices."
        );
        describe_counter!(
            "verdant_bridge_timeout_total",
            Unit::Count,
            "Total number of commands that timed out unacknowledged."
        );
        describe_counter!(
            "verdant_bridge_publish_dropped_total",
            Unit::Count,
            "Total number of command publishes dropped by a full queue."
        );
        describe_counter!(
            "verdant_bridge_reconnect_total",
            Unit::Count,
            "Total number of broker reconnect attempts."
        );
        describe_counter!(
            "verdant_retention_deleted_total",
            Unit::Count,
            "Total number of documents deleted by the retention sweeper."
        );
    });
}
