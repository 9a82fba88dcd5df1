//! relay — terminal client for the admin relay.
//!
//! Announces an identity and chats: participants talk to the admin, the
//! admin picks a recipient with `/to <name>` and lists users with `/who`.

mod chat;
mod config;
mod view;

use anyhow::Context;
use clap::Parser;
use relay_core::Identity;
use tracing::error;

/// relay — admin relay client
#[derive(Parser)]
#[command(name = "relay", version, about = "Chat client for the admin relay")]
struct Cli {
    /// Identity to announce (falls back to the config file)
    name: Option<String>,

    /// Relay host
    #[arg(long)]
    host: Option<String>,

    /// Relay port
    #[arg(short, long)]
    port: Option<u16>,

    /// Identity the relay treats as the admin
    #[arg(long)]
    admin: Option<String>,

    /// Config file path
    #[arg(long = "config")]
    config: Option<String>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing.
    if cli.verbose {
        tracing_subscriber::fmt()
            .with_env_filter("relay_cli=debug,relay_core=debug")
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter("relay_cli=warn")
            .with_target(false)
            .init();
    }

    if let Err(e) = run(cli).await {
        error!("{:#}", e);
        eprintln!("relay: {e:#}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config_path = cli.config.clone().unwrap_or_else(|| {
        let home = dirs::home_dir().unwrap_or_default();
        home.join(".relay").join("client.toml").to_string_lossy().to_string()
    });
    let cfg = config::Config::load(&config_path)?;

    // CLI overrides config.
    let host = cli.host.unwrap_or(cfg.default.host);
    let port = cli.port.unwrap_or(cfg.default.port);
    let name = cli
        .name
        .or(cfg.default.name)
        .context("no identity given (pass a name or set default.name)")?;
    let name = Identity::new(name)?;
    let admin = Identity::new(cli.admin.unwrap_or(cfg.default.admin))?;

    chat::run(&host, port, name, admin).await
}
