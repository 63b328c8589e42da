use anyhow::{Context, Result};
use clap::Parser;
use clevermcp::api::ApiServer;
use clevermcp::clever::CleverClient;
use clevermcp::config::{Config, ObservabilityConfig};
use clevermcp::devices::SqliteDeviceStore;
use clevermcp::mcp::ToolContext;
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

#[derive(Parser, Debug)]
#[command(name = "clevermcp-server")]
#[command(about = "MCP tool gateway for device inventory and Clever courses")]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "clevermcp.toml")]
    config: String,

    /// Host to bind to (overrides config)
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on (overrides config)
    #[arg(short, long)]
    port: Option<u16>,
}

fn init_tracing(config: &Config) -> Result<()> {
    let logging = &config.logging;
    let observability = &config.observability;
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(config.log_filter())
            .with_context(|| format!("invalid log filter {:?}", config.log_filter()))?,
    };

    let format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| observability.log_format.clone());

    let writer = match &logging.file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("opening log file {:?}", path))?;
            tracing_subscriber::fmt::writer::BoxMakeWriter::new(Arc::new(file))
        }
        None => tracing_subscriber::fmt::writer::BoxMakeWriter::new(std::io::stderr),
    };

    let fmt_layer = if format.eq_ignore_ascii_case("json") {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(writer)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer().with_writer(writer).boxed()
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .init();
    Ok(())
}

fn install_metrics_exporter(observability: &ObservabilityConfig) -> Result<()> {
    if let Some(addr) = &observability.metrics_addr {
        let addr: std::net::SocketAddr = addr
            .parse()
            .with_context(|| format!("invalid metrics_addr {:?}", addr))?;
        metrics_exporter_prometheus::PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .context("installing Prometheus exporter")?;
        tracing::info!("Prometheus metrics on http://{}/metrics", addr);
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load config
    let mut config = Config::load_or_create(Path::new(&args.config))?;

    // Apply CLI overrides
    if args.host.is_some() || args.port.is_some() {
        let (default_host, default_port) = config
            .server
            .bind_addr
            .rsplit_once(':')
            .map(|(h, p)| (h.to_string(), p.parse::<u16>().unwrap_or(8787)))
            .unwrap_or_else(|| ("127.0.0.1".to_string(), 8787));
        config.server.bind_addr = format!(
            "{}:{}",
            args.host.unwrap_or(default_host),
            args.port.unwrap_or(default_port)
        );
    }

    init_tracing(&config)?;
    install_metrics_exporter(&config.observability)?;

    tracing::info!("Starting {} {}", config.mcp.server_name, config.mcp.server_version);
    tracing::info!("Config file: {}", args.config);

    // Collaborators
    let devices = Arc::new(
        SqliteDeviceStore::open(&config.devices.db_path)
            .with_context(|| format!("opening device store {:?}", config.devices.db_path))?,
    );
    tracing::info!("Device store: {:?}", config.devices.db_path);

    let token = config.clever.resolve_token();
    if token.is_none() {
        tracing::warn!(
            "No Clever API token configured (set clever.token or ${}); get_clever_courses will fail upstream",
            config.clever.token_env
        );
    }
    let courses = Arc::new(CleverClient::new(
        &config.clever.base_url,
        token.as_deref(),
        config.clever.timeout(),
    )?);

    let ctx = ToolContext { devices, courses };

    // Create and start server
    let server = ApiServer::from_config(&config, ctx);
    let addr = config.server.bind_addr.clone();
    server.serve(&addr, shutdown_signal()).await?;

    tracing::info!("Server stopped");
    Ok(())
}
