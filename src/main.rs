//! CLI entry point.
//!
//! Startup: load config → init logging → build server → bind → start
//! config watcher → wait for SIGINT/SIGTERM → graceful drain (30 s bound).
//! Exit code 0 on clean shutdown, 1 on any startup error.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info};

use forwarder::config::{load_config, ConfigWatcher};
use forwarder::http::Server;
use forwarder::lifecycle::{signals, Shutdown};
use forwarder::observability::logging;
use forwarder::routing::RoutingTable;

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Parser)]
#[command(name = "forwarder", version, about = "Routing-aware forwarding proxy")]
struct Cli {
    /// Path to the configuration file.
    #[arg(short, long, default_value = "configs/config.yaml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(&cli.config) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Failed to load config: {}", err);
            return ExitCode::FAILURE;
        }
    };

    if let Err(err) = logging::init(&config.logging) {
        eprintln!("Failed to initialize logging: {}", err);
        return ExitCode::FAILURE;
    }

    info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %cli.config.display(),
        "starting forwarder"
    );

    let server = match Server::new(config) {
        Ok(server) => server,
        Err(err) => {
            error!(error = %err, "failed to initialize routes");
            return ExitCode::FAILURE;
        }
    };

    let listeners = match server.bind().await {
        Ok(listeners) => listeners,
        Err(err) => {
            error!(error = %err, "failed to start server");
            return ExitCode::FAILURE;
        }
    };

    // Hot reload: rebuild the routing table on config changes; a failed
    // reload leaves the running table untouched.
    let router = server.router();
    let watcher = match ConfigWatcher::spawn(
        cli.config.clone(),
        Box::new(move |config| {
            let table = RoutingTable::build(&config.services)?;
            router.replace(table);
            Ok(())
        }),
    ) {
        Ok(watcher) => watcher,
        Err(err) => {
            error!(error = %err, "failed to start config watcher");
            return ExitCode::FAILURE;
        }
    };

    let shutdown = Arc::new(Shutdown::new());
    let serve = {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            server.serve(listeners, shutdown, SHUTDOWN_TIMEOUT).await;
        })
    };

    info!("forwarder is ready");

    signals::shutdown_signal().await;
    shutdown.trigger();

    let result = serve.await;
    watcher.stop();

    match result {
        Ok(()) => {
            info!("forwarder stopped gracefully");
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!(error = %err, "error during shutdown");
            ExitCode::FAILURE
        }
    }
}
