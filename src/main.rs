//! folio-rpc-router - operational entry point
//!
//! Loads the router configuration, brings up the provider manager, and
//! runs a periodic status loop. `--test-providers` probes each configured
//! endpoint directly and exits.

use clap::{Arg, Command};
use ethers::providers::{Http, Provider};
use serde_json::Value;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use url::Url;

use folio_rpc::{Result, RouterConfig, RpcProviderManager, VERSION};

#[tokio::main]
async fn main() -> Result<()> {
    let matches = Command::new("folio-rpc-router")
        .version(VERSION)
        .about("Multi-provider JSON-RPC request router")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path (without extension)")
                .default_value("config/rpc-router"),
        )
        .arg(
            Arg::new("log-level")
                .short('l')
                .long("log-level")
                .value_name("LEVEL")
                .help("Log level (trace, debug, info, warn, error)")
                .default_value("info"),
        )
        .arg(
            Arg::new("status-interval")
                .short('s')
                .long("status-interval")
                .value_name("SECONDS")
                .help("Seconds between status reports")
                .default_value("30"),
        )
        .arg(
            Arg::new("test-providers")
                .long("test-providers")
                .help("Probe each configured provider and exit")
                .action(clap::ArgAction::SetTrue),
        )
        .get_matches();

    let log_level = matches.get_one::<String>("log-level").unwrap();
    init_logging(log_level);

    info!(version = VERSION, "Starting RPC request router");

    let config = RouterConfig::load_from(matches.get_one::<String>("config").unwrap())?;
    let manager = RpcProviderManager::new(config)?;

    if matches.get_flag("test-providers") {
        info!("Testing provider connections...");
        test_providers(&manager).await;
        info!("Provider testing completed");
        return Ok(());
    }

    let interval_seconds: u64 = matches
        .get_one::<String>("status-interval")
        .unwrap()
        .parse()
        .unwrap_or(30);

    tokio::select! {
        _ = status_loop(&manager, interval_seconds) => {}
        _ = shutdown_signal() => {
            info!("Shutdown signal received, stopping router");
        }
    }

    info!("RPC request router stopped");
    Ok(())
}

/// Initialize logging with the specified level
fn init_logging(log_level: &str) {
    let level = match log_level.to_lowercase().as_str() {
        "trace" => tracing::Level::TRACE,
        "debug" => tracing::Level::DEBUG,
        "info" => tracing::Level::INFO,
        "warn" => tracing::Level::WARN,
        "error" => tracing::Level::ERROR,
        _ => {
            eprintln!("Invalid log level: {}. Using 'info'", log_level);
            tracing::Level::INFO
        }
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("folio_rpc={}", level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Probe each configured provider directly with a block-number call
async fn test_providers(manager: &RpcProviderManager) {
    for config in manager.get_configs().await {
        if !config.enabled {
            continue;
        }

        info!(provider = %config.name, "Testing provider connection");

        let url = match Url::parse(&config.http_url) {
            Ok(url) => url,
            Err(err) => {
                error!(provider = %config.name, error = %err, "Invalid HTTP URL");
                continue;
            }
        };

        let client = Provider::new(Http::new(url));
        match client.request::<_, Value>("eth_blockNumber", ()).await {
            Ok(block) => info!(provider = %config.name, block = %block, "Provider responded"),
            Err(err) => warn!(provider = %config.name, error = %err, "Provider probe failed"),
        }
    }
}

/// Periodically log provider health and queue occupancy
async fn status_loop(manager: &RpcProviderManager, interval_seconds: u64) {
    let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(interval_seconds));

    loop {
        interval.tick().await;

        for snapshot in manager.get_status().await {
            info!(
                provider = %snapshot.name,
                endpoint = %snapshot.endpoint,
                healthy = snapshot.healthy,
                consecutive_errors = snapshot.consecutive_errors,
                daily_calls = snapshot.daily_calls,
                "provider status"
            );
        }

        let queue = manager.get_queue_status();
        let metrics = manager.get_metrics().await;
        info!(
            queue_length = queue.queue_length,
            active_workers = queue.active_workers,
            total_requests = metrics.total_requests,
            success_rate = metrics.success_rate(),
            "router status"
        );
    }
}

/// Set up graceful shutdown signal handling
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
