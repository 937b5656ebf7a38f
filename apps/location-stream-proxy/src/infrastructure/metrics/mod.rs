//! Gateway Metrics
//!
//! Counters, gauges, and histograms for stream traffic, rendered in
//! Prometheus text format at `/metrics` on the health port.

use std::sync::OnceLock;
use std::time::Duration;

use location_protocol::ErrorCode;
use metrics::{
    Unit, counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram,
};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};

/// Downstream stream requests.
pub const STREAMS_OPENED: &str = "location_proxy_streams_opened_total";
/// Synthetic error frames, labelled by `code`.
pub const STREAM_ERRORS: &str = "location_proxy_stream_errors_total";
/// Upstream lines written downstream.
pub const LINES_FORWARDED: &str = "location_proxy_lines_forwarded_total";
/// Live upstream connections.
pub const ACTIVE_UPSTREAMS: &str = "location_proxy_active_upstreams";
/// Upstream connection lifetime.
pub const STREAM_DURATION: &str = "location_proxy_stream_duration_seconds";

/// Streams live for minutes to hours, so the default buckets are too fine.
const DURATION_BUCKETS: [f64; 8] = [1.0, 10.0, 60.0, 300.0, 900.0, 1800.0, 3600.0, 14400.0];

static HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the Prometheus recorder once and return its handle.
///
/// # Panics
///
/// Panics if another global recorder is already installed.
#[allow(clippy::expect_used)]
pub fn init_metrics() -> PrometheusHandle {
    HANDLE
        .get_or_init(|| {
            let handle = PrometheusBuilder::new()
                .set_buckets_for_metric(
                    Matcher::Full(STREAM_DURATION.to_owned()),
                    &DURATION_BUCKETS,
                )
                .expect("duration buckets are non-empty")
                .install_recorder()
                .expect("no other metrics recorder may be installed");
            describe();
            handle
        })
        .clone()
}

/// Handle for rendering, or `None` before [`init_metrics`] ran.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    HANDLE.get().cloned()
}

fn describe() {
    describe_counter!(STREAMS_OPENED, Unit::Count, "Downstream stream requests");
    describe_counter!(STREAM_ERRORS, Unit::Count, "Synthetic error frames by code");
    describe_counter!(
        LINES_FORWARDED,
        Unit::Count,
        "Upstream lines forwarded downstream"
    );
    describe_gauge!(ACTIVE_UPSTREAMS, Unit::Count, "Live upstream connections");
    describe_histogram!(
        STREAM_DURATION,
        Unit::Seconds,
        "Upstream connection lifetime"
    );
}

/// Count a downstream stream request.
pub fn record_stream_opened() {
    counter!(STREAMS_OPENED).increment(1);
}

/// Count a synthetic error frame.
pub fn record_stream_error(code: &ErrorCode) {
    counter!(STREAM_ERRORS, "code" => code.as_str().to_owned()).increment(1);
}

/// Count lines written downstream.
pub fn record_lines_forwarded(count: u64) {
    counter!(LINES_FORWARDED).increment(count);
}

/// Publish the live upstream connection count.
#[allow(clippy::cast_precision_loss)]
pub fn set_active_upstreams(count: usize) {
    gauge!(ACTIVE_UPSTREAMS).set(count as f64);
}

/// Record how long an upstream connection lived.
pub fn record_stream_duration(duration: Duration) {
    histogram!(STREAM_DURATION).record(duration.as_secs_f64());
}
