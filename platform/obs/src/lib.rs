//! Tracing setup shared by the pipeline binaries.

use anyhow::{Context, Result};
use once_cell::sync::OnceCell;
use opentelemetry::trace::TracerProvider;
use opentelemetry_otlp::{Protocol, SpanExporter, WithExportConfig};
use opentelemetry_sdk::{self as sdk, Resource};
use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

static INIT: OnceCell<()> = OnceCell::new();

const DEFAULT_FILTER: &str = "info,sqlx=warn,sea_orm=warn";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Pretty,
    Compact,
}

impl LogFormat {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pretty" | "full" => Some(LogFormat::Pretty),
            "compact" => Some(LogFormat::Compact),
            _ => None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct ObsConfig {
    pub service_name: &'static str,
    pub env_filter: Option<String>,
    pub otlp_endpoint: Option<String>,
    pub format: LogFormat,
}

impl Default for ObsConfig {
    fn default() -> Self {
        Self {
            service_name: "pipeline",
            env_filter: None,
            otlp_endpoint: None,
            format: LogFormat::default(),
        }
    }
}

impl ObsConfig {
    /// Reads `RUST_LOG`, `OTLP_ENDPOINT` and `LOG_FORMAT`.
    pub fn from_env(service_name: &'static str) -> Self {
        Self {
            service_name,
            env_filter: non_empty_var("RUST_LOG"),
            otlp_endpoint: non_empty_var("OTLP_ENDPOINT"),
            format: non_empty_var("LOG_FORMAT")
                .and_then(|raw| LogFormat::parse(&raw))
                .unwrap_or_default(),
        }
    }

    fn filter(&self) -> &str {
        self.env_filter.as_deref().unwrap_or(DEFAULT_FILTER)
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
}

/// Installs the global subscriber once; later calls are no-ops.
pub fn init_tracing(config: ObsConfig) -> Result<()> {
    INIT.get_or_try_init(|| install(&config))?;
    Ok(())
}

fn install(config: &ObsConfig) -> Result<()> {
    let env_filter = EnvFilter::try_new(config.filter())
        .with_context(|| format!("invalid log filter {:?}", config.filter()))?;
    let fmt_layer = match config.format {
        LogFormat::Pretty => tracing_subscriber::fmt::layer().with_target(false).boxed(),
        LogFormat::Compact => tracing_subscriber::fmt::layer()
            .compact()
            .with_target(false)
            .boxed(),
    };
    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer);

    let Some(endpoint) = config.otlp_endpoint.as_deref() else {
        registry.try_init()?;
        return Ok(());
    };

    let exporter = SpanExporter::builder()
        .with_http()
        .with_protocol(Protocol::HttpBinary)
        .with_endpoint(endpoint)
        .build()
        .context("failed to build OTLP exporter")?;
    let resource = Resource::builder()
        .with_service_name(config.service_name)
        .build();
    let provider = sdk::trace::SdkTracerProvider::builder()
        .with_resource(resource)
        .with_batch_exporter(exporter)
        .build();
    let tracer = provider.tracer(config.service_name);
    registry
        .with(tracing_opentelemetry::layer().with_tracer(tracer))
        .try_init()?;
    Ok(())
}
