//! Log output and optional OTLP span export.
//!
//! Spans are exported over OTLP/gRPC only when `OTEL_EXPORTER_OTLP_ENDPOINT`
//! is set. Extra exporter metadata comes from `OTEL_EXPORTER_OTLP_HEADERS`
//! (`key=value,key2=value2`); keys ending in `-bin` carry base64 values.

use anyhow::{anyhow, Context, Result};
use base64ct::{Base64, Encoding};
use opentelemetry::{
    global, propagation::TextMapCompositePropagator, trace::TracerProvider as _, KeyValue,
};
use opentelemetry_otlp::{WithExportConfig, WithTonicConfig};
use opentelemetry_sdk::{
    propagation::{BaggagePropagator, TraceContextPropagator},
    runtime,
    trace::{Tracer, TracerProvider},
    Resource,
};
use std::{env, sync::OnceLock, time::Duration};
use tonic::{
    metadata::{Ascii, Binary, MetadataKey, MetadataMap, MetadataValue},
    transport::ClientTlsConfig,
};
use tracing::{debug, Level};
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter, Registry};
use ulid::Ulid;

const ENV_ENDPOINT: &str = "OTEL_EXPORTER_OTLP_ENDPOINT";
const ENV_HEADERS: &str = "OTEL_EXPORTER_OTLP_HEADERS";
const ENV_PROTOCOL: &str = "OTEL_EXPORTER_OTLP_PROTOCOL";
const ENV_INSTANCE_ID: &str = "OTEL_SERVICE_INSTANCE_ID";
const EXPORT_TIMEOUT: Duration = Duration::from_secs(3);

static PROVIDER: OnceLock<TracerProvider> = OnceLock::new();

/// Exporter settings taken from the standard `OTEL_*` variables.
#[derive(Debug, Clone, PartialEq, Eq)]
struct OtlpSettings {
    endpoint: String,
    headers: Vec<(String, String)>,
    instance_id: String,
}

impl OtlpSettings {
    /// `None` when no endpoint is configured.
    fn from_env() -> Option<Self> {
        let endpoint = env::var(ENV_ENDPOINT).ok()?;

        if let Ok(protocol) = env::var(ENV_PROTOCOL) {
            if protocol != "grpc" {
                debug!("{ENV_PROTOCOL}={protocol} ignored, exporting over grpc");
            }
        }

        Some(Self {
            endpoint: with_scheme(&endpoint),
            headers: env::var(ENV_HEADERS)
                .map(|raw| split_header_pairs(&raw))
                .unwrap_or_default(),
            instance_id: env::var(ENV_INSTANCE_ID).unwrap_or_else(|_| Ulid::new().to_string()),
        })
    }

    /// Host to verify the collector certificate against, for `https` endpoints.
    fn tls_domain(&self) -> Option<&str> {
        self.endpoint
            .strip_prefix("https://")
            .and_then(|rest| rest.split('/').next())
            .and_then(|authority| authority.split(':').next())
            .filter(|host| !host.is_empty())
    }
}

/// Endpoints without a scheme are assumed to be TLS.
fn with_scheme(endpoint: &str) -> String {
    if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
        endpoint.to_string()
    } else {
        format!("https://{}", endpoint.trim_end_matches('/'))
    }
}

/// Pairs without `=` are skipped; values may contain `=`.
fn split_header_pairs(raw: &str) -> Vec<(String, String)> {
    raw.split(',')
        .filter_map(|pair| pair.split_once('='))
        .map(|(key, value)| (key.trim().to_ascii_lowercase(), value.trim().to_string()))
        .filter(|(key, _)| !key.is_empty())
        .collect()
}

fn exporter_metadata(headers: &[(String, String)]) -> Result<MetadataMap> {
    let mut metadata = MetadataMap::with_capacity(headers.len());

    for (key, value) in headers {
        if key.ends_with("-bin") {
            let bytes = Base64::decode_vec(value)
                .map_err(|e| anyhow!("exporter header {key}: failed to base64-decode: {e}"))?;
            let name = MetadataKey::<Binary>::from_bytes(key.as_bytes())
                .with_context(|| format!("exporter header {key}: invalid binary key"))?;
            metadata.insert_bin(name, MetadataValue::from_bytes(&bytes));
        } else {
            let name = MetadataKey::<Ascii>::from_bytes(key.as_bytes())
                .with_context(|| format!("exporter header {key}: invalid key"))?;
            let value = value
                .parse::<MetadataValue<Ascii>>()
                .with_context(|| format!("exporter header {key}: invalid value"))?;
            metadata.insert(name, value);
        }
    }

    Ok(metadata)
}

fn build_tracer(settings: &OtlpSettings) -> Result<Tracer> {
    let mut exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(settings.endpoint.as_str())
        .with_timeout(EXPORT_TIMEOUT);

    if let Some(domain) = settings.tls_domain() {
        exporter = exporter.with_tls_config(
            ClientTlsConfig::new()
                .domain_name(domain.to_string())
                .with_native_roots(),
        );
    }

    if !settings.headers.is_empty() {
        exporter = exporter.with_metadata(exporter_metadata(&settings.headers)?);
    }

    let provider = TracerProvider::builder()
        .with_batch_exporter(exporter.build()?, runtime::Tokio)
        .with_resource(Resource::new(vec![
            KeyValue::new("service.name", env!("CARGO_PKG_NAME")),
            KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
            KeyValue::new("service.instance.id", settings.instance_id.clone()),
        ]))
        .build();

    let _ = PROVIDER.set(provider.clone());
    global::set_tracer_provider(provider.clone());
    global::set_text_map_propagator(TextMapCompositePropagator::new(vec![
        Box::new(TraceContextPropagator::new()),
        Box::new(BaggagePropagator::new()),
    ]));

    Ok(provider.tracer(env!("CARGO_PKG_NAME")))
}

/// Install the global subscriber.
///
/// `RUST_LOG` directives take precedence over `verbosity_level`.
///
/// # Errors
///
/// Returns an error if the exporter cannot be built or a subscriber is already set.
pub fn init(verbosity_level: Option<Level>) -> Result<()> {
    let filter = EnvFilter::builder()
        .with_default_directive(verbosity_level.unwrap_or(Level::ERROR).into())
        .from_env_lossy()
        .add_directive("hyper=error".parse()?)
        .add_directive("tokio=error".parse()?)
        .add_directive("sqlx=warn".parse()?)
        .add_directive("opentelemetry_sdk=warn".parse()?);

    let fmt_layer = fmt::layer().with_target(false).compact();

    let otel_layer = OtlpSettings::from_env()
        .map(|settings| build_tracer(&settings))
        .transpose()?
        .map(|tracer| tracing_opentelemetry::layer().with_tracer(tracer));

    // An absent exporter layer is a no-op
    let subscriber = Registry::default()
        .with(fmt_layer)
        .with(otel_layer)
        .with(filter);
    tracing::subscriber::set_global_default(subscriber)?;

    Ok(())
}

/// Flush pending spans; does nothing when export is off.
pub fn shutdown_tracer() {
    if let Some(provider) = PROVIDER.get() {
        if let Err(err) = provider.shutdown() {
            debug!("Tracer provider shutdown failed: {err}");
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn pair(key: &str, value: &str) -> (String, String) {
        (key.to_string(), value.to_string())
    }

    #[test]
    fn header_pairs_are_trimmed_and_lowercased() {
        assert_eq!(
            split_header_pairs(" Authorization = Bearer abc , x-tenant=ops"),
            vec![pair("authorization", "Bearer abc"), pair("x-tenant", "ops")]
        );
    }

    #[test]
    fn header_pairs_skip_entries_without_value() {
        assert_eq!(
            split_header_pairs("a=1,broken,=orphan,b=2"),
            vec![pair("a", "1"), pair("b", "2")]
        );
        assert!(split_header_pairs("").is_empty());
    }

    #[test]
    fn header_values_keep_equals_signs() {
        assert_eq!(
            split_header_pairs("authorization=Basic dXNlcjpwYXNz=="),
            vec![pair("authorization", "Basic dXNlcjpwYXNz==")]
        );
    }

    #[test]
    fn metadata_accepts_ascii_and_binary_keys() {
        let metadata = exporter_metadata(&[
            pair("authorization", "Bearer token123"),
            // base64 of "binary data"
            pair("trace-key-bin", "YmluYXJ5IGRhdGE="),
        ])
        .unwrap();
        assert_eq!(metadata.len(), 2);
        assert!(metadata.get("authorization").is_some());
        assert!(metadata.get_bin("trace-key-bin").is_some());
    }

    #[test]
    fn metadata_rejects_bad_base64() {
        let err = exporter_metadata(&[pair("trace-key-bin", "not-valid-base64!!!")]).unwrap_err();
        assert!(err.to_string().contains("failed to base64-decode"));
    }

    #[test]
    fn endpoints_default_to_https() {
        assert_eq!(with_scheme("http://collector:4317"), "http://collector:4317");
        assert_eq!(with_scheme("https://collector:4317"), "https://collector:4317");
        assert_eq!(with_scheme("collector:4317/"), "https://collector:4317");
    }

    #[test]
    fn tls_domain_only_for_https() {
        let settings = |endpoint: &str| OtlpSettings {
            endpoint: endpoint.to_string(),
            headers: Vec::new(),
            instance_id: "test".to_string(),
        };
        assert_eq!(
            settings("https://otel.example.com:4317/v1/traces").tls_domain(),
            Some("otel.example.com")
        );
        assert_eq!(settings("http://localhost:4317").tls_domain(), None);
    }

    #[test]
    fn settings_require_an_endpoint() {
        temp_env::with_vars(
            [
                (ENV_ENDPOINT, None::<&str>),
                (ENV_HEADERS, Some("a=1")),
            ],
            || assert!(OtlpSettings::from_env().is_none()),
        );

        temp_env::with_vars(
            [
                (ENV_ENDPOINT, Some("collector:4317")),
                (ENV_HEADERS, Some("x-tenant=ops")),
                (ENV_INSTANCE_ID, Some("node-1")),
            ],
            || {
                assert_eq!(
                    OtlpSettings::from_env(),
                    Some(OtlpSettings {
                        endpoint: "https://collector:4317".to_string(),
                        headers: vec![pair("x-tenant", "ops")],
                        instance_id: "node-1".to_string(),
                    })
                );
            },
        );
    }

    #[test]
    fn shutdown_without_exporter_is_a_noop() {
        shutdown_tracer();
    }
}
