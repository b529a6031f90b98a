//! Diagnostics for fedctl: logs on stderr, spans over OTLP when an endpoint is configured.
//!
//! Tables go to stdout, so nothing here ever writes there.

use std::{
	env,
	io::{self, IsTerminal},
};

use anyhow::{Context, Result};
use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::SpanExporter;
use opentelemetry_sdk::{trace::SdkTracerProvider, Resource};
use tracing::Level;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const SERVICE_NAME: &str = "fedctl";

/// Flushes exported spans when dropped.
pub struct TelemetryGuard {
	tracer_provider: Option<SdkTracerProvider>,
}

impl Drop for TelemetryGuard {
	fn drop(&mut self) {
		if let Some(provider) = self.tracer_provider.take() {
			if let Err(e) = provider.shutdown() {
				eprintln!("failed to flush traces: {e}");
			}
		}
	}
}

/// `--log-level` wins over `RUST_LOG`; without either, info.
fn filter_directives(log_level: Option<Level>, rust_log: Option<String>) -> String {
	match (log_level, rust_log) {
		(Some(level), _) => level.as_str().to_ascii_lowercase(),
		(None, Some(directives)) if !directives.trim().is_empty() => directives,
		_ => Level::INFO.as_str().to_ascii_lowercase(),
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OtlpTransport {
	Grpc,
	Http,
}

impl OtlpTransport {
	/// `None` when no endpoint is set, so spans are not exported at all.
	fn select(endpoint: Option<&str>, protocol: Option<&str>) -> Option<Self> {
		endpoint?;
		Some(match protocol {
			Some("grpc") => Self::Grpc,
			_ => Self::Http,
		})
	}

	fn from_env() -> Option<Self> {
		let endpoint = env::var(opentelemetry_otlp::OTEL_EXPORTER_OTLP_TRACES_ENDPOINT)
			.or_else(|_| env::var(opentelemetry_otlp::OTEL_EXPORTER_OTLP_ENDPOINT))
			.ok();
		let protocol = env::var(opentelemetry_otlp::OTEL_EXPORTER_OTLP_PROTOCOL).ok();
		Self::select(endpoint.as_deref(), protocol.as_deref())
	}

	fn exporter(self) -> Result<SpanExporter> {
		let builder = SpanExporter::builder();
		let exporter = match self {
			Self::Grpc => builder.with_tonic().build(),
			Self::Http => builder.with_http().build(),
		};
		exporter.with_context(|| format!("building {self:?} span exporter"))
	}
}

fn tracer_provider(transport: OtlpTransport) -> Result<SdkTracerProvider> {
	// The builder reads OTEL_SERVICE_NAME and OTEL_RESOURCE_ATTRIBUTES itself.
	let mut resource = Resource::builder();
	if env::var("OTEL_SERVICE_NAME").is_err() {
		resource = resource.with_service_name(SERVICE_NAME);
	}
	let provider = SdkTracerProvider::builder()
		.with_resource(resource.build())
		.with_batch_exporter(transport.exporter()?)
		.build();
	opentelemetry::global::set_tracer_provider(provider.clone());
	Ok(provider)
}

/// Install the global subscriber. Keep the guard alive until the command finishes.
pub fn init(log_level: Option<Level>) -> Result<TelemetryGuard> {
	let filter = EnvFilter::builder().parse_lossy(filter_directives(
		log_level,
		env::var(EnvFilter::DEFAULT_ENV).ok(),
	));

	let output = fmt::layer().with_writer(io::stderr);
	let output = if io::stderr().is_terminal() {
		output.pretty().boxed()
	} else {
		output.json().boxed()
	};

	let tracer_provider = OtlpTransport::from_env().map(tracer_provider).transpose()?;
	let spans = tracer_provider.as_ref().map(|provider| {
		tracing_opentelemetry::layer()
			.with_error_records_to_exceptions(true)
			.with_tracer(provider.tracer(SERVICE_NAME))
	});

	tracing_subscriber::registry()
		.with(filter)
		.with(output)
		.with(spans)
		.init();

	Ok(TelemetryGuard { tracer_provider })
}
