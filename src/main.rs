use std::process::ExitCode;

use rpcframe::server::shutdown::listen_for_signals;
use rpcframe::{Config, Server, SleepHandler};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

// ========================================
// MAIN ENTRY POINT
// ========================================

#[tokio::main]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();
    let config = Config::global();
    init_tracing(&config.server.log_level);

    info!(
        host = %config.server.host,
        port = config.server.port,
        max_body_len = config.server.max_body_len,
        max_connections = config.server.max_connections,
        "Starting rpcframe server"
    );

    let server = Server::new(config.server.clone(), SleepHandler::from_config(&config.handler));

    let listener = match server.bind().await {
        Ok(listener) => listener,
        Err(err) => {
            error!(address = %config.server.addr(), error = %err, "Failed to bind");
            return ExitCode::FAILURE;
        }
    };

    listen_for_signals(server.shutdown_token());

    let report = server.run(listener).await;

    match serde_json::to_string(&server.stats().snapshot()) {
        Ok(stats) => info!(%stats, "Final statistics"),
        Err(err) => error!(error = %err, "Failed to serialize statistics"),
    }

    if report.is_clean() {
        info!("Shutdown complete");
        ExitCode::SUCCESS
    } else {
        for err in &report.errors {
            error!(error = %err, "Shutdown error");
        }
        ExitCode::FAILURE
    }
}

/// `RUST_LOG` wins over the configured level.
fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
