//! Tracing subscriber initialization with structured logging and optional
//! OpenTelemetry trace export.
//!
//! # Usage
//!
//! ```no_run
//! // Structured logging at the default level
//! memoria_observe::tracing_setup::init_tracing(false).unwrap();
//!
//! // Debug level for Memoria crates, spans also exported to stdout
//! memoria_observe::tracing_setup::init_tracing_with_level(true, "debug").unwrap();
//! ```

use opentelemetry::trace::TracerProvider as _;
use opentelemetry_sdk::trace::SdkTracerProvider;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use std::sync::OnceLock;

/// Level for Memoria's own crates when `RUST_LOG` is unset.
pub const DEFAULT_LEVEL: &str = "info";

const MEMORIA_TARGETS: [&str; 5] = [
    "memoria",
    "memoria_api",
    "memoria_core",
    "memoria_infra",
    "memoria_types",
];

static TRACER_PROVIDER: OnceLock<SdkTracerProvider> = OnceLock::new();

/// Initialize the global subscriber at [`DEFAULT_LEVEL`].
pub fn init_tracing(enable_otel: bool) -> Result<(), Box<dyn std::error::Error>> {
    init_tracing_with_level(enable_otel, DEFAULT_LEVEL)
}

/// Initialize the global tracing subscriber.
///
/// - Installs a `fmt` layer with target visibility and span close timing, so
///   every dispatch and per-topic span logs its duration when it ends.
/// - `RUST_LOG` wins when set; otherwise Memoria crates log at `level` and
///   everything else at `warn`.
/// - When `enable_otel` is true, spans are also bridged to OpenTelemetry with
///   a stdout exporter under the tracer name `memoria`.
///
/// # Errors
///
/// Returns an error if the global subscriber has already been set.
pub fn init_tracing_with_level(
    enable_otel: bool,
    level: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE);

    let env_filter = match std::env::var(EnvFilter::DEFAULT_ENV) {
        Ok(directives) if !directives.trim().is_empty() => EnvFilter::try_new(directives)?,
        _ => EnvFilter::try_new(default_directives(level))?,
    };

    if enable_otel {
        let provider = SdkTracerProvider::builder()
            .with_simple_exporter(opentelemetry_stdout::SpanExporter::default())
            .build();
        let tracer = provider.tracer("memoria");
        let otel_layer = tracing_opentelemetry::layer().with_tracer(tracer);

        let _ = TRACER_PROVIDER.set(provider.clone());
        opentelemetry::global::set_tracer_provider(provider);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .with(otel_layer)
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()?;
    }

    Ok(())
}

/// `warn` globally, `level` for every Memoria crate.
pub fn default_directives(level: &str) -> String {
    let mut directives = vec!["warn".to_string()];
    directives.extend(MEMORIA_TARGETS.iter().map(|target| format!("{target}={level}")));
    directives.join(",")
}

/// Flush pending spans and shut down the OpenTelemetry tracer provider.
///
/// No-op when OTel was not enabled.
pub fn shutdown_tracing() {
    if let Some(provider) = TRACER_PROVIDER.get() {
        if let Err(e) = provider.shutdown() {
            eprintln!("Warning: OTel tracer provider shutdown error: {e}");
        }
    }
}
