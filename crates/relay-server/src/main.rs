//! relay-server: admin message relay.
//!
//! Accepts WebSocket connections, binds each to an announced identity, routes
//! private messages between participants and the admin, and keeps the admin
//! informed of who is online.

use clap::Parser;
use relay_server::config::{Overrides, ServerConfig};
use relay_server::directory::StaticDirectory;
use relay_server::server::RelayServer;
use relay_server::transport::websocket;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

/// relay-server — admin message relay
#[derive(Parser, Debug)]
#[command(name = "relay-server", version, about = "Admin message relay server")]
struct Cli {
    /// Listen port
    #[arg(short, long)]
    port: Option<u16>,

    /// Listen address
    #[arg(long)]
    bind: Option<String>,

    /// Identity that acts as the admin
    #[arg(long)]
    admin: Option<String>,

    /// Roster file (one registered identity per line)
    #[arg(long)]
    roster: Option<String>,

    /// Reject identities that are not in the directory
    #[arg(long)]
    enforce_directory: bool,

    /// Config file path
    #[arg(long, default_value = "~/.relay/config.toml")]
    config: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing
    use tracing_subscriber::EnvFilter;
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "starting relay-server");

    let config_path = PathBuf::from(&cli.config);
    let overrides = Overrides {
        bind: cli.bind,
        port: cli.port,
        admin_identity: cli.admin,
        roster_file: cli.roster,
        enforce_directory: cli.enforce_directory,
    };
    let server_config = match ServerConfig::load(Some(&config_path), overrides) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!(error = %e, "failed to load config");
            std::process::exit(1);
        }
    };

    // Account directory
    let mut directory = StaticDirectory::new(server_config.directory_identities.clone());
    if let Some(ref path) = server_config.roster_file {
        if let Err(e) = directory.load_roster_file(path) {
            error!(error = %e, "failed to load roster");
            std::process::exit(1);
        }
    }
    info!(identities = directory.len(), "account directory ready");
    if server_config.enforce_directory && directory.is_empty() {
        warn!("directory enforcement is on but the directory is empty; only the admin can connect");
    }

    let addr = match server_config.listen_addr() {
        Ok(a) => a,
        Err(e) => {
            error!(error = %e, "bad listen address");
            std::process::exit(1);
        }
    };
    let (_bound, incoming) = match websocket::start_listener(addr).await {
        Ok(l) => l,
        Err(e) => {
            error!(error = %e, "failed to start listener");
            std::process::exit(1);
        }
    };

    let relay_server = RelayServer::new(server_config, Arc::new(directory));
    if let Err(e) = relay_server.run(incoming, shutdown_signal()).await {
        error!(error = %e, "server error");
        std::process::exit(1);
    }

    info!("relay-server stopped");
}

/// Wait for SIGTERM or SIGINT (Ctrl+C).
async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => {}
            _ = sigterm.recv() => {}
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
    }
}
