use anyhow::Result;
use pdf_reporter::chart::PlottersChartRenderer;
use pdf_reporter::config::Config;
use pdf_reporter::grpc::{serve, ReportService};
use pdf_reporter::pipeline::ReportPipeline;
use pdf_reporter::status::ReportStatusStore;
use pdf_reporter::store::TimeSeriesReader;
use redis::aio::ConnectionManager;
use std::sync::Arc;

fn init_tracing(config: &Config) -> Result<()> {
    use opentelemetry::KeyValue;
    use opentelemetry_otlp::WithExportConfig;
    use opentelemetry_sdk::{runtime::Tokio, trace::Config as OTelTraceConfig, Resource};
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,pdf_reporter=info".into());
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(true);

    if let Some(endpoint) = &config.otlp_endpoint {
        let endpoint = normalize_otlp_http_endpoint(endpoint);
        let exporter = opentelemetry_otlp::new_exporter()
            .http()
            .with_endpoint(endpoint);
        let tracer = opentelemetry_otlp::new_pipeline()
            .tracing()
            .with_exporter(exporter)
            .with_trace_config(OTelTraceConfig::default().with_resource(Resource::new(vec![
                KeyValue::new("service.name", "pdf-reporter"),
            ])))
            .install_batch(Tokio)?;

        let otel_layer = tracing_opentelemetry::layer().with_tracer(tracer);
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

fn normalize_otlp_http_endpoint(endpoint: &str) -> String {
    let trimmed = endpoint.trim();
    if trimmed.is_empty() {
        return String::new();
    }
    if trimmed.contains("/v1/traces") {
        return trimmed.to_string();
    }
    format!("{}/v1/traces", trimmed.trim_end_matches('/'))
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;
    init_tracing(&config)?;

    let client = redis::Client::open(config.redis_url.as_str())?;
    let conn = ConnectionManager::new(client).await?;
    let reader = TimeSeriesReader::new(conn);

    let pipeline = ReportPipeline::new(
        Arc::new(reader),
        Arc::new(PlottersChartRenderer),
        config.table_row_cap,
    );
    let statuses = Arc::new(ReportStatusStore::with_capacity(
        config.status_max_records,
    ));
    let service = ReportService::new(pipeline, statuses, config.request_timeout());

    let addr = format!("0.0.0.0:{}", config.grpc_port).parse()?;
    tracing::info!(%addr, "report generator gRPC server starting");
    tracing::info!("connected to Redis TimeSeries");

    serve(addr, service).await
}
