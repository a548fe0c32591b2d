//! hostkeeper: command-line client for host access control
//!
//! Logs in against the auth service, keeps the session alive and edits the
//! host's profile (friend list, ban list and connection flags).

mod commands;

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::info;

use commands::{Command, Context};
use hostkeeper::credentials::{FileCredentialStore, MemoryCredentialStore};
use hostkeeper::{ClientConfig, CredentialStore, FakeGateway, HttpGateway, RemoteGateway};

#[derive(Parser)]
#[command(name = "hostkeeper")]
#[command(about = "Manage host access control")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "hostkeeper.toml")]
    config: PathBuf,

    /// Base URL of the auth and hosts services (overrides config file)
    #[arg(long, env = "HOSTKEEPER_API_URL")]
    api_url: Option<String>,

    /// Credential file (overrides config file)
    #[arg(long, env = "HOSTKEEPER_CREDENTIALS")]
    credentials: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("hostkeeper=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = ClientConfig::load(&cli.config)?;

    // Apply CLI overrides
    if let Some(api_url) = cli.api_url {
        config.gateway.base_url = api_url;
    }
    if let Some(path) = cli.credentials {
        config.credentials.path = path;
    }

    let (gateway, credentials): (Arc<dyn RemoteGateway>, Arc<dyn CredentialStore>) =
        match cli.command {
            Command::Demo => {
                info!("Using in-memory demo backend");
                (
                    Arc::new(FakeGateway::demo()),
                    Arc::new(MemoryCredentialStore::new()),
                )
            }
            _ => {
                info!(api = %config.gateway.base_url, "Using HTTP backend");
                (
                    Arc::new(HttpGateway::new(&config.gateway)?),
                    Arc::new(FileCredentialStore::new(config.credentials.path.clone())),
                )
            }
        };

    let ctx = Context {
        gateway,
        credentials,
        config,
    };

    match commands::execute(&ctx, cli.command).await {
        Ok(output) => {
            println!("{}", output);
            Ok(())
        }
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    }
}
