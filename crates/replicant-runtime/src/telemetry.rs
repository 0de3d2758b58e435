//! Logging and OpenTelemetry initialisation for replicant processes.
//!
//! Call [`init_tracing`] once at process startup to wire up the `tracing`
//! subscriber with an optional OTLP span exporter.
//!
//! # Environment variables
//!
//! | Variable | Effect |
//! |---|---|
//! | `OTEL_EXPORTER_OTLP_ENDPOINT` | OTLP collector base URL (e.g. `http://localhost:4318`). When set the OTLP HTTP exporter is activated. |
//! | `RUST_LOG` | Log filter (default `"info"`). |
//! | `REPLICANT_LOG_FORMAT=json` | Emit newline-delimited JSON logs. |
//!
//! # Example
//!
//! ```rust,no_run
//! // Hold the guard for the entire lifetime of the process.
//! let _guard = replicant_runtime::telemetry::init_tracing("replicant");
//! ```

use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{trace::SdkTracerProvider, Resource};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

// ─────────────────────────────────────────────────────────────────────────────
// Public API
// ─────────────────────────────────────────────────────────────────────────────

/// Console log layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Compact,
    /// Newline-delimited JSON.
    Json,
}

impl LogFormat {
    /// Parse a `REPLICANT_LOG_FORMAT` value; anything but `json` is compact.
    pub fn parse(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            Some(v) if v.eq_ignore_ascii_case("json") => LogFormat::Json,
            _ => LogFormat::Compact,
        }
    }

    pub fn from_env() -> Self {
        Self::parse(std::env::var("REPLICANT_LOG_FORMAT").ok().as_deref())
    }
}

/// Initialise the global `tracing` subscriber with an optional OTLP exporter.
///
/// When `OTEL_EXPORTER_OTLP_ENDPOINT` is set an OTLP/HTTP span exporter is
/// configured and every span (the per-tick `Session::communicate` and
/// `Replicant::on_response` spans included) is forwarded to the collector.
/// Without it only the console layer is installed.
///
/// The returned [`TracerProviderGuard`] **must** be held for the lifetime of
/// the process; dropping it flushes all pending spans.
pub fn init_tracing(service_name: &str) -> TracerProviderGuard {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = match LogFormat::from_env() {
        LogFormat::Json => tracing_subscriber::fmt::layer().json().boxed(),
        LogFormat::Compact => tracing_subscriber::fmt::layer().compact().boxed(),
    };

    let provider = build_provider(service_name);
    let otel_layer = provider
        .as_ref()
        .map(|p| tracing_opentelemetry::layer().with_tracer(p.tracer("replicant")));

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(otel_layer)
        .with(env_filter)
        .init();

    TracerProviderGuard(provider)
}

// ─────────────────────────────────────────────────────────────────────────────
// RAII guard
// ─────────────────────────────────────────────────────────────────────────────

/// RAII guard that shuts down the OTel [`SdkTracerProvider`] on drop.
///
/// Dropping this guard calls [`SdkTracerProvider::shutdown`], flushing all
/// pending spans before the process exits.  Hold an instance of this type
/// in `main` for the entire program lifetime.
pub struct TracerProviderGuard(Option<SdkTracerProvider>);

impl Drop for TracerProviderGuard {
    fn drop(&mut self) {
        if let Some(provider) = self.0.take() {
            if let Err(e) = provider.shutdown() {
                eprintln!("[replicant] OpenTelemetry provider shutdown error: {e}");
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Internal helpers
// ─────────────────────────────────────────────────────────────────────────────

/// Build an [`SdkTracerProvider`] when `OTEL_EXPORTER_OTLP_ENDPOINT` is set.
///
/// Returns `None` when the env-var is absent or the exporter cannot be
/// initialised (the error is printed to stderr and the caller falls back to
/// plain tracing-subscriber output).
fn build_provider(service_name: &str) -> Option<SdkTracerProvider> {
    let endpoint = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").ok()?;

    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_http()
        .with_endpoint(endpoint)
        .build()
        .map_err(|e| eprintln!("[replicant] OTLP exporter init failed: {e}"))
        .ok()?;

    let resource = Resource::builder()
        .with_service_name(service_name.to_string())
        .build();

    Some(
        SdkTracerProvider::builder()
            .with_resource(resource)
            // The tick loop is synchronous; no async runtime exists to drive
            // a batch exporter.
            .with_simple_exporter(exporter)
            .build(),
    )
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_endpoint_means_no_provider() {
        // SAFETY: no other test in this crate touches this variable.
        unsafe { std::env::remove_var("OTEL_EXPORTER_OTLP_ENDPOINT") };
        assert!(
            build_provider("replicant-test").is_none(),
            "expected None when OTEL_EXPORTER_OTLP_ENDPOINT is absent"
        );
    }

    #[test]
    fn only_json_selects_json() {
        assert_eq!(LogFormat::parse(Some("JSON ")), LogFormat::Json);
        assert_eq!(LogFormat::parse(Some("pretty")), LogFormat::Compact);
        assert_eq!(LogFormat::parse(None), LogFormat::Compact);
    }

    #[test]
    fn empty_guard_drops_quietly() {
        let guard = TracerProviderGuard(None);
        drop(guard);
    }
}
