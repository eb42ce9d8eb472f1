//! Logging and OpenTelemetry pipeline initialisation for ORC.
//!
//! Call [`init_tracing`] once at process startup to wire up the `tracing`
//! subscriber with an optional OTLP span exporter.
//!
//! Console output goes through [`ConsoleWriter`], which serializes whole log
//! lines from both execution contexts behind a single logging lock.  Unlike
//! the data-path locks, the logging lock is waited on indefinitely; if it is
//! poisoned the line is written to stderr without it rather than lost.
//!
//! # Environment variables
//!
//! | Variable | Effect |
//! |---|---|
//! | `OTEL_EXPORTER_OTLP_ENDPOINT` | OTLP collector base URL (e.g. `http://localhost:4318`). When set the OTLP HTTP exporter is activated. |
//! | `RUST_LOG` | Log filter (default `"info"`). |
//! | `ORC_LOG_FORMAT=json` | Emit newline-delimited JSON logs. |
//!
//! # Example
//!
//! ```rust,no_run
//! // Hold the guard for the entire lifetime of the process.
//! let _guard = orc_runtime::telemetry::init_tracing("orc");
//! ```

use std::io::{self, Write};
use std::sync::{Arc, Mutex, MutexGuard};

use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{Resource, trace::SdkTracerProvider};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

// ─────────────────────────────────────────────────────────────────────────────
// Public API
// ─────────────────────────────────────────────────────────────────────────────

/// Initialise the global `tracing` subscriber with an optional OTLP exporter.
///
/// When `OTEL_EXPORTER_OTLP_ENDPOINT` is set an OTLP/HTTP span exporter is
/// configured and all tracing spans are forwarded to the collector.  When
/// the env-var is absent only the console formatter is installed.
///
/// The returned [`TracerProviderGuard`] **must** be held for the lifetime of
/// the process; dropping it flushes all pending span batches.
pub fn init_tracing(service_name: &str) -> TracerProviderGuard {
    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    let use_json = std::env::var("ORC_LOG_FORMAT").as_deref() == Ok("json");
    let console = ConsoleWriter::new();

    let provider = build_provider(service_name);

    if let Some(ref p) = provider {
        let tracer = p.tracer("orc");
        let otel_layer = tracing_opentelemetry::layer().with_tracer(tracer);
        if use_json {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(otel_layer)
                .with(tracing_subscriber::fmt::layer().json().with_writer(console))
                .init();
        } else {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(otel_layer)
                .with(tracing_subscriber::fmt::layer().compact().with_writer(console))
                .init();
        }
    } else if use_json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(console))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .compact()
                    .with_thread_names(true)
                    .with_writer(console),
            )
            .init();
    }

    TracerProviderGuard(provider)
}

// ─────────────────────────────────────────────────────────────────────────────
// Console writer
// ─────────────────────────────────────────────────────────────────────────────

/// [`MakeWriter`] that holds the logging lock while a line is written.
#[derive(Clone, Default)]
pub struct ConsoleWriter {
    lock: Arc<Mutex<()>>,
}

impl ConsoleWriter {
    pub fn new() -> Self {
        Self::default()
    }
}

/// One line's worth of console output.
pub enum ConsoleLine<'a> {
    /// Lock held; written to stdout.
    Locked(MutexGuard<'a, ()>),
    /// Lock poisoned; written to stderr without it.
    Unprotected,
}

impl<'a> MakeWriter<'a> for ConsoleWriter {
    type Writer = ConsoleLine<'a>;

    fn make_writer(&'a self) -> Self::Writer {
        match self.lock.lock() {
            Ok(guard) => ConsoleLine::Locked(guard),
            Err(_) => ConsoleLine::Unprotected,
        }
    }
}

impl Write for ConsoleLine<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            ConsoleLine::Locked(_) => io::stdout().write(buf),
            ConsoleLine::Unprotected => io::stderr().write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            ConsoleLine::Locked(_) => io::stdout().flush(),
            ConsoleLine::Unprotected => io::stderr().flush(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// RAII guard
// ─────────────────────────────────────────────────────────────────────────────

/// RAII guard that shuts down the OTel [`SdkTracerProvider`] on drop.
///
/// Hold an instance of this type in `main` for the entire program lifetime.
pub struct TracerProviderGuard(Option<SdkTracerProvider>);

impl Drop for TracerProviderGuard {
    fn drop(&mut self) {
        if let Some(provider) = self.0.take() {
            if let Err(e) = provider.shutdown() {
                eprintln!("[orc] OpenTelemetry provider shutdown error: {e}");
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
/// console output only).
fn build_provider(service_name: &str) -> Option<SdkTracerProvider> {
    let endpoint = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").ok()?;

    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_http()
        .with_endpoint(endpoint)
        .build()
        .map_err(|e| eprintln!("[orc] OTLP exporter init failed: {e}"))
        .ok()?;

    let resource = Resource::builder()
        .with_service_name(service_name.to_string())
        .build();

    Some(
        SdkTracerProvider::builder()
            .with_resource(resource)
            // Synchronous export: the device has no async runtime.
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
    use std::thread;

    #[test]
    fn build_provider_returns_none_without_endpoint() {
        // SAFETY: single-threaded test; no other thread reads this env-var.
        unsafe { std::env::remove_var("OTEL_EXPORTER_OTLP_ENDPOINT") };
        assert!(build_provider("test-service").is_none());
    }

    #[test]
    fn tracer_provider_guard_drop_with_none_is_safe() {
        let guard = TracerProviderGuard(None);
        drop(guard);
    }

    #[test]
    fn console_line_holds_logging_lock() {
        let console = ConsoleWriter::new();
        let mut line = console.make_writer();
        assert!(matches!(line, ConsoleLine::Locked(_)));
        assert!(console.lock.try_lock().is_err());
        line.write_all(b"").unwrap();
        drop(line);
        assert!(console.lock.try_lock().is_ok());
    }

    #[test]
    fn poisoned_lock_falls_back_to_unprotected_stderr() {
        let console = ConsoleWriter::new();
        let poisoner = console.clone();
        let _ = thread::spawn(move || {
            let _guard = poisoner.lock.lock().unwrap();
            panic!("poison the logging lock");
        })
        .join();

        let mut line = console.make_writer();
        assert!(matches!(line, ConsoleLine::Unprotected));
        line.write_all(b"fallback line\n").unwrap();
    }
}
