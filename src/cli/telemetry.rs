//! Log output and optional OTLP span export.
//!
//! Spans always go to the fmt layer. When `OTEL_EXPORTER_OTLP_ENDPOINT` is
//! set they are also batched to a gRPC collector, tagged with the service
//! name, version, build commit and an instance id.

use crate::GIT_COMMIT_HASH;
use anyhow::{anyhow, Context, Result};
use opentelemetry::{
    global, propagation::TextMapCompositePropagator, trace::TracerProvider as _, KeyValue,
};
use opentelemetry_otlp::{WithExportConfig, WithTonicConfig};
use opentelemetry_sdk::{
    propagation::{BaggagePropagator, TraceContextPropagator},
    runtime::Tokio,
    trace::{Tracer, TracerProvider},
    Resource,
};
use std::{env::var, sync::OnceLock, time::Duration};
use tonic::{
    metadata::{Ascii, MetadataKey, MetadataMap, MetadataValue},
    transport::ClientTlsConfig,
};
use tracing::{debug, Level};
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter, Registry};
use ulid::Ulid;
use url::Url;

const EXPORT_TIMEOUT: Duration = Duration::from_secs(3);

static TRACER_PROVIDER: OnceLock<TracerProvider> = OnceLock::new();

/// Collector settings taken from the standard `OTEL_*` variables.
#[derive(Debug)]
struct OtlpSettings {
    endpoint: Url,
    metadata: MetadataMap,
    instance_id: String,
}

impl OtlpSettings {
    /// `None` when no endpoint is configured.
    fn from_env() -> Result<Option<Self>> {
        let Ok(endpoint) = var("OTEL_EXPORTER_OTLP_ENDPOINT") else {
            return Ok(None);
        };

        if let Ok(protocol) = var("OTEL_EXPORTER_OTLP_PROTOCOL") {
            if protocol != "grpc" {
                debug!("OTEL_EXPORTER_OTLP_PROTOCOL={} ignored, exporting over grpc", protocol);
            }
        }

        Ok(Some(Self {
            endpoint: parse_endpoint(&endpoint)?,
            metadata: parse_metadata(&var("OTEL_EXPORTER_OTLP_HEADERS").unwrap_or_default())?,
            instance_id: var("OTEL_SERVICE_INSTANCE_ID")
                .unwrap_or_else(|_| Ulid::new().to_string()),
        }))
    }

    fn resource(&self) -> Resource {
        Resource::new(vec![
            KeyValue::new("service.name", env!("CARGO_PKG_NAME")),
            KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
            KeyValue::new("service.instance.id", self.instance_id.clone()),
            KeyValue::new("vcs.revision", GIT_COMMIT_HASH),
        ])
    }
}

/// A bare `host:port` means TLS.
fn parse_endpoint(raw: &str) -> Result<Url> {
    let raw = raw.trim().trim_end_matches('/');
    let with_scheme = if raw.starts_with("http://") || raw.starts_with("https://") {
        raw.to_string()
    } else {
        format!("https://{raw}")
    };

    let url = Url::parse(&with_scheme)
        .with_context(|| format!("invalid OTEL_EXPORTER_OTLP_ENDPOINT: {raw}"))?;
    if url.host_str().is_none() {
        return Err(anyhow!("OTEL_EXPORTER_OTLP_ENDPOINT has no host: {raw}"));
    }

    Ok(url)
}

/// `k1=v1,k2=v2` into gRPC metadata. Pairs without `=` are skipped; invalid
/// keys or values are an error.
fn parse_metadata(headers: &str) -> Result<MetadataMap> {
    let mut metadata = MetadataMap::new();

    for pair in headers.split(',') {
        let Some((key, value)) = pair.split_once('=') else {
            continue;
        };
        let key = key.trim().to_ascii_lowercase();

        let name = MetadataKey::<Ascii>::from_bytes(key.as_bytes())
            .map_err(|e| anyhow!("invalid OTLP header name {key}: {e}"))?;
        let value: MetadataValue<Ascii> = value
            .trim()
            .parse()
            .map_err(|e| anyhow!("invalid OTLP header value for {key}: {e}"))?;
        metadata.insert(name, value);
    }

    Ok(metadata)
}

fn init_tracer(settings: OtlpSettings) -> Result<Tracer> {
    let resource = settings.resource();

    let mut builder = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(settings.endpoint.as_str())
        .with_timeout(EXPORT_TIMEOUT)
        .with_metadata(settings.metadata);

    if settings.endpoint.scheme() == "https" {
        if let Some(host) = settings.endpoint.host_str() {
            builder = builder.with_tls_config(
                ClientTlsConfig::new()
                    .domain_name(host.to_string())
                    .with_native_roots(),
            );
        }
    }

    let provider = TracerProvider::builder()
        .with_batch_exporter(builder.build()?, Tokio)
        .with_resource(resource)
        .build();

    let _ = TRACER_PROVIDER.set(provider.clone());

    global::set_tracer_provider(provider.clone());
    global::set_text_map_propagator(TextMapCompositePropagator::new(vec![
        Box::new(TraceContextPropagator::new()),
        Box::new(BaggagePropagator::new()),
    ]));

    Ok(provider.tracer(env!("CARGO_PKG_NAME")))
}

/// `RUST_LOG` wins over `level`; dependency noise is capped either way.
fn filter(level: Level) -> Result<EnvFilter> {
    Ok(EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy()
        .add_directive("hyper=error".parse()?)
        .add_directive("h2=error".parse()?)
        .add_directive("tonic=warn".parse()?)
        .add_directive("sqlx=warn".parse()?)
        .add_directive("opentelemetry_sdk=warn".parse()?))
}

/// Initialize logging and, when `OTEL_EXPORTER_OTLP_ENDPOINT` is set, the
/// OTLP/gRPC span exporter.
///
/// # Errors
///
/// Returns an error if the collector settings are invalid or the subscriber
/// cannot be installed
pub fn init(verbosity_level: Option<Level>) -> Result<()> {
    let fmt_layer = fmt::layer().with_target(false);
    let filter = filter(verbosity_level.unwrap_or(Level::ERROR))?;

    match OtlpSettings::from_env()? {
        Some(settings) => {
            let otel_layer = tracing_opentelemetry::layer().with_tracer(init_tracer(settings)?);
            tracing::subscriber::set_global_default(
                Registry::default().with(fmt_layer).with(otel_layer).with(filter),
            )?;
        }
        None => {
            tracing::subscriber::set_global_default(
                Registry::default().with(fmt_layer).with(filter),
            )?;
        }
    }

    Ok(())
}

/// Flush pending spans; noop when export was never enabled.
pub fn shutdown_tracer() {
    if let Some(provider) = TRACER_PROVIDER.get() {
        if let Err(err) = provider.shutdown() {
            debug!("tracer provider shutdown failed: {}", err);
        }
    }
}
