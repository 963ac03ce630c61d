//! Prometheus exporter for GitHub organizations.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio::sync::watch;
use tracing::{Level, error, info};
use tracing_subscriber::EnvFilter;

use githubql_exporter::config::{
    LogFormat, LoggingConfig, normalize_listen_addr, split_organizations,
};
use githubql_exporter::{ExporterConfig, GithubClient, HttpServer, OrganizationCollector};

/// Prometheus exporter for GitHub organizations.
#[derive(Parser, Debug)]
#[command(name = "githubql-exporter")]
#[command(about = "Export GitHub organization repository statistics as Prometheus metrics")]
#[command(version)]
struct Args {
    /// Path to configuration file (JSON5 format).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// GitHub token (overrides config).
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Comma-separated list of organizations (overrides config).
    #[arg(long, env = "ORGS")]
    orgs: Option<String>,

    /// HTTP listen address (overrides config).
    #[arg(long, env = "WEB_ADDR")]
    listen: Option<String>,

    /// Metrics endpoint path (overrides config).
    #[arg(long, env = "WEB_PATH")]
    path: Option<String>,

    /// Enable debug logging.
    #[arg(
        long,
        env = "DEBUG",
        action = clap::ArgAction::SetTrue,
        value_parser = clap::builder::BoolishValueParser::new()
    )]
    debug: bool,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long)]
    log_level: Option<String>,
}

impl Args {
    /// Apply command-line and environment overrides on top of the file config.
    fn apply(self, config: &mut ExporterConfig) {
        if let Some(token) = self.token {
            config.github.token = token;
        }
        if let Some(orgs) = self.orgs {
            config.github.organizations = split_organizations(&orgs);
        }
        if let Some(listen) = self.listen {
            config.prometheus.listen = normalize_listen_addr(&listen);
        }
        if let Some(path) = self.path {
            config.prometheus.path = path;
        }
        if self.debug {
            config.logging.level = "debug".to_string();
        }
        if let Some(level) = self.log_level {
            config.logging.level = level;
        }
    }
}

/// Build the log filter. Directives from `RUST_LOG` take precedence; the
/// configured level only applies when it is unset, empty or unparsable.
fn build_env_filter(config: &LoggingConfig, rust_log: Option<&str>) -> EnvFilter {
    rust_log
        .filter(|directives| !directives.trim().is_empty())
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| {
            let level = config.level.parse().unwrap_or(Level::INFO);
            let level = level.as_str().to_ascii_lowercase();
            EnvFilter::new(format!("{level},hyper=warn,reqwest=warn"))
        })
}

fn init_tracing(config: &LoggingConfig) -> anyhow::Result<()> {
    let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let filter = build_env_filter(config, rust_log.as_deref());

    match config.format {
        LogFormat::Json => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .json()
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
        }
    }

    Ok(())
}

/// Resolve once Ctrl+C or SIGTERM is received.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
        _ = terminate => info!("Received SIGTERM, shutting down..."),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Load configuration
    let mut config = match &args.config {
        Some(path) => ExporterConfig::load_from_file(path)
            .with_context(|| format!("Failed to load config from {:?}", path))?,
        None => ExporterConfig::default(),
    };
    args.apply(&mut config);
    config.validate()?;

    init_tracing(&config.logging)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        organizations = ?config.github.organizations,
        endpoint = %config.github.endpoint,
        "Starting GitHubQL exporter"
    );

    let client = GithubClient::new(&config.github).context("Failed to create GitHub client")?;
    let collector = Arc::new(OrganizationCollector::new(
        client,
        &config.prometheus.namespace,
        config.github.organizations.clone(),
    ));

    let listen_addr: SocketAddr = config
        .prometheus
        .listen
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid listen address: {}", e))?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let http_server = HttpServer::new(
        collector.clone(),
        listen_addr,
        config.prometheus.path.clone(),
    );
    let mut http_task = tokio::spawn(async move {
        if let Err(e) = http_server.run(shutdown_rx).await {
            error!("HTTP server error: {}", e);
        }
    });

    let http_exited = tokio::select! {
        _ = shutdown_signal() => false,
        _ = &mut http_task => {
            error!("HTTP server exited unexpectedly");
            true
        }
    };

    // Signal shutdown
    shutdown_tx.send(true).ok();

    if !http_exited {
        let _ = tokio::time::timeout(Duration::from_secs(5), http_task).await;
    }

    let stats = collector.stats();
    info!(
        scrapes = stats.scrapes,
        failed_scrapes = stats.failed_scrapes,
        samples_emitted = stats.samples_emitted,
        last_scrape_ms = stats.last_scrape_duration.as_millis() as u64,
        "Final statistics"
    );

    info!("Exporter stopped");
    Ok(())
}
