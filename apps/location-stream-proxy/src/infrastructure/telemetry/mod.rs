//! Logging and Trace Export
//!
//! Installs the global `tracing` subscriber: an `EnvFilter`, a fmt layer, and
//! when an OTLP target is configured, a span exporter.
//!
//! # Environment Variables
//!
//! - `OTEL_ENABLED`: "false" turns export off (default: on)
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: Collector endpoint (default: http://localhost:4317)
//! - `OTEL_SERVICE_NAME`: Reported service name (default: location-stream-proxy)
//! - `RUST_LOG`: Extra filter directives

use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::trace::SdkTracerProvider;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

const SERVICE_NAME: &str = "location-stream-proxy";
const OTLP_ENDPOINT: &str = "http://localhost:4317";

/// Directives layered on top of `RUST_LOG`.
const BASE_DIRECTIVES: [&str; 4] = [
    "location_stream_proxy=info",
    "tower_http=info",
    "hyper=warn",
    "reqwest=warn",
];

/// Where spans are exported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OtlpTarget {
    /// Collector endpoint.
    pub endpoint: String,
    /// Reported service name.
    pub service_name: String,
}

/// Telemetry settings. `otlp` is `None` when export is switched off.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryConfig {
    /// Span export target.
    pub otlp: Option<OtlpTarget>,
}

impl TelemetryConfig {
    /// Read settings from the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read settings through `lookup`.
    #[must_use]
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let disabled = lookup("OTEL_ENABLED").is_some_and(|v| v.eq_ignore_ascii_case("false"));
        if disabled {
            return Self { otlp: None };
        }
        Self {
            otlp: Some(OtlpTarget {
                endpoint: lookup("OTEL_EXPORTER_OTLP_ENDPOINT")
                    .unwrap_or_else(|| OTLP_ENDPOINT.to_owned()),
                service_name: lookup("OTEL_SERVICE_NAME")
                    .unwrap_or_else(|| SERVICE_NAME.to_owned()),
            }),
        }
    }
}

/// Flushes pending spans when dropped. Keep it alive in `main`.
pub struct TelemetryGuard {
    provider: Option<SdkTracerProvider>,
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        let Some(provider) = self.provider.take() else {
            return;
        };
        if let Err(e) = provider.shutdown() {
            eprintln!("span exporter shutdown failed: {e}");
        }
    }
}

/// Install the subscriber using settings from the environment.
#[must_use]
pub fn init() -> TelemetryGuard {
    init_with_config(&TelemetryConfig::from_env())
}

/// Install the subscriber. Logging still works if the exporter cannot be built.
#[must_use]
pub fn init_with_config(config: &TelemetryConfig) -> TelemetryGuard {
    let provider = config.otlp.as_ref().and_then(tracer_provider);
    let otel = provider.as_ref().map(|provider| {
        let service = config
            .otlp
            .as_ref()
            .map_or(SERVICE_NAME, |t| t.service_name.as_str());
        tracing_opentelemetry::layer().with_tracer(provider.tracer(service.to_owned()))
    });

    tracing_subscriber::registry()
        .with(env_filter())
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .with(otel)
        .init();

    TelemetryGuard { provider }
}

fn tracer_provider(target: &OtlpTarget) -> Option<SdkTracerProvider> {
    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(&target.endpoint)
        .build();
    match exporter {
        Ok(exporter) => Some(
            SdkTracerProvider::builder()
                .with_batch_exporter(exporter)
                .with_resource(
                    Resource::builder()
                        .with_service_name(target.service_name.clone())
                        .build(),
                )
                .build(),
        ),
        Err(e) => {
            eprintln!("OTLP exporter unavailable, logging only: {e}");
            None
        }
    }
}

fn env_filter() -> EnvFilter {
    BASE_DIRECTIVES
        .iter()
        .filter_map(|d| d.parse::<Directive>().ok())
        .fold(EnvFilter::from_default_env(), EnvFilter::add_directive)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn export_is_on_by_default() {
        let config = TelemetryConfig::from_lookup(|_| None);
        assert_eq!(
            config.otlp,
            Some(OtlpTarget {
                endpoint: OTLP_ENDPOINT.to_owned(),
                service_name: SERVICE_NAME.to_owned(),
            })
        );
    }

    #[test]
    fn export_can_be_switched_off() {
        let config = TelemetryConfig::from_lookup(|key| {
            (key == "OTEL_ENABLED").then(|| "FALSE".to_owned())
        });
        assert_eq!(config.otlp, None);
    }

    #[test]
    fn base_directives_parse() {
        for directive in BASE_DIRECTIVES {
            assert!(directive.parse::<Directive>().is_ok(), "{directive}");
        }
    }
}
