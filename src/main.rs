use kpi_measure::{
    app_state::AppState,
    config::AppConfig,
    db,
    models::measurement::{MeasurementRequest, NewMeasurementRequest},
    services::executor::KpiExecutor,
};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    // Load configuration from environment
    let config = AppConfig::from_env().expect("Failed to load configuration from environment");

    tracing::info!("Initializing KPI measurement service");

    // Prometheus exporter with its own listener
    let metrics_addr: SocketAddr = config
        .metrics_addr
        .parse()
        .expect("METRICS_ADDR must be a socket address");
    PrometheusBuilder::new()
        .with_http_listener(metrics_addr)
        .install()
        .expect("Failed to install Prometheus exporter");

    metrics::describe_counter!(
        "kpi_measurements_enqueued_total",
        "KPI measurements accepted into the queue"
    );
    metrics::describe_counter!(
        "kpi_measurements_dropped_total",
        "KPI measurements dropped because the queue was full"
    );
    metrics::describe_counter!(
        "kpi_measurements_completed_total",
        "KPI measurements processed, by outcome"
    );
    metrics::describe_histogram!(
        "kpi_measurement_duration_ms",
        "Measured action-to-screen latency in milliseconds"
    );
    metrics::describe_histogram!(
        "kpi_captures_scanned",
        "Capture frames evaluated per measurement"
    );
    metrics::describe_gauge!("kpi_queue_depth", "KPI measurements waiting in the queue");

    tracing::info!("Connecting to PostgreSQL database");
    let db_pool = db::init_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");

    let state = AppState::new(&config, db_pool).expect("Failed to initialize verification clients");
    tracing::info!(devices = state.devices.len(), "Device registry ready");

    state.executor.start();

    // Requests arrive as one JSON object per line on stdin
    let intake = tokio::spawn(read_requests(state.executor.clone()));

    tokio::signal::ctrl_c()
        .await
        .expect("Failed to listen for shutdown signal");

    tracing::info!("Shutdown requested");
    intake.abort();
    state.executor.stop().await;
}

async fn read_requests(executor: KpiExecutor) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => {
                tracing::info!("Request intake closed");
                return;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to read request intake");
                return;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let new: NewMeasurementRequest = match serde_json::from_str(&line) {
            Ok(new) => new,
            Err(e) => {
                tracing::warn!(error = %e, "Ignoring malformed KPI request");
                continue;
            }
        };

        match MeasurementRequest::new(new) {
            Ok(request) => {
                executor.enqueue(request);
            }
            Err(e) => tracing::warn!(error = %e, "Rejected KPI request"),
        }
    }
}
