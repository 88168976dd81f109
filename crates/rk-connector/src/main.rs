//! rk-connector CLI
//!
//! Connects to kernels already started on configured remote servers and
//! keeps the tunnel open until interrupted. Also inspects and resets the
//! server configuration store.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use rk_connector::{ConnectorDefaults, ConsoleClient, RemoteKernelConnector};
use rk_core::config::{self, ConnectorConfig};
use rk_core::store::{DefaultsRegistry, FileStore};
use rk_core::{ConfigStore, ConnectionInfo, ConnectionStatus, KernelInfo, ServerId};
use rk_tunnel::{KernelHandle, SshTunnelOpener};

#[derive(Parser)]
#[command(name = "rk-connector")]
#[command(author, version, about = "Connect to kernels on remote servers over SSH")]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List configured servers and their last known status
    Servers,

    /// Tunnel to a kernel started on a server and print its local
    /// connection info
    Connect {
        /// Server configuration id
        #[arg(short, long)]
        server: String,
        /// JSON file with the kernel's `id` and `connection_info`
        #[arg(short, long)]
        kernel_info: PathBuf,
    },

    /// Mark every server inactive
    ResetStatus,

    /// Wipe the store and restore default settings
    ResetDefaults,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = match (cli.quiet, cli.verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, 2) => "debug",
        (false, _) => "trace",
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| log_level.into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let config = load_connector_config(cli.config.as_deref())?;
    let store: Arc<dyn ConfigStore> = Arc::new(
        FileStore::open(&config.store_path)
            .with_context(|| format!("Failed to open store {:?}", config.store_path))?,
    );
    let opener = Arc::new(SshTunnelOpener::new(config.connect_timeout));
    let connector = RemoteKernelConnector::new(&config, Arc::clone(&store), opener);

    match cli.command {
        Commands::Servers => list_servers(&connector),
        Commands::Connect {
            server,
            kernel_info,
        } => connect(&connector, ServerId::new(server), &kernel_info).await,
        Commands::ResetStatus => {
            connector.reset_status()?;
            println!("All servers marked inactive");
            Ok(())
        }
        Commands::ResetDefaults => {
            let mut registry = DefaultsRegistry::new();
            registry.register(ConnectorDefaults);
            registry.reset_to_defaults(store.as_ref())?;
            println!("Store reset to defaults");
            Ok(())
        }
    }
}

fn load_connector_config(path: Option<&Path>) -> Result<ConnectorConfig> {
    if let Some(path) = path {
        return config::load_config(path)
            .with_context(|| format!("Failed to load config from {:?}", path));
    }

    let default_path = config::default_config_path();
    if !default_path.exists() {
        return Ok(ConnectorConfig::default());
    }
    Ok(config::load_config(&default_path).unwrap_or_else(|e| {
        tracing::warn!("Failed to load config from {:?}: {}", default_path, e);
        ConnectorConfig::default()
    }))
}

fn list_servers(connector: &RemoteKernelConnector) -> Result<()> {
    let ids = connector.config_ids();
    if ids.is_empty() {
        println!("No servers configured");
        return Ok(());
    }

    for id in ids {
        let name = connector.server_name(&id).unwrap_or_else(|_| id.to_string());
        match connector.connection_status(&id) {
            Some(info) if !info.message.is_empty() => {
                println!("{:<24} {:<24} {} ({})", id, name, info.status, info.message)
            }
            Some(info) => println!("{:<24} {:<24} {}", id, name, info.status),
            None => println!("{:<24} {:<24} -", id, name),
        }
    }
    Ok(())
}

async fn connect(connector: &RemoteKernelConnector, server: ServerId, info_path: &Path) -> Result<()> {
    let raw = std::fs::read_to_string(info_path)
        .with_context(|| format!("Failed to read {:?}", info_path))?;
    let kernel_info: KernelInfo =
        serde_json::from_str(&raw).with_context(|| format!("Invalid kernel info in {:?}", info_path))?;

    let (tx, rx) = oneshot::channel();
    let client: Arc<dyn ConsoleClient> = Arc::new(TerminalClient::new(server.clone(), tx));

    connector.on_connection_status_changed(ConnectionInfo::new(
        server.clone(),
        ConnectionStatus::Connecting,
        "",
    ))?;
    if let Err(e) = connector.begin_kernel_connection(&client, kernel_info) {
        connector.on_connection_status_changed(ConnectionInfo::new(
            server,
            ConnectionStatus::Error,
            e.to_string(),
        ))?;
        return Err(e.into());
    }

    let cancel = CancellationToken::new();
    let result = match wait_for_kernel(connector, cancel.clone(), rx, tokio::signal::ctrl_c()).await? {
        Some(result) => result,
        None => {
            eprintln!("Interrupted before the kernel was ready");
            cancel.cancel();
            connector.shutdown().await;
            connector.on_connection_status_changed(ConnectionInfo::new(
                server,
                ConnectionStatus::Inactive,
                "",
            ))?;
            return Ok(());
        }
    };

    let mut handle = match result {
        Ok(handle) => handle,
        Err(message) => {
            connector.on_connection_status_changed(ConnectionInfo::new(
                server,
                ConnectionStatus::Error,
                message.as_str(),
            ))?;
            bail!("Kernel connection failed: {}", message);
        }
    };

    connector.on_connection_status_changed(ConnectionInfo::new(
        server.clone(),
        ConnectionStatus::Active,
        "",
    ))?;
    println!("{}", serde_json::to_string_pretty(&handle.local_connection_info())?);
    eprintln!("Tunnel open through {}; press Ctrl-C to close", handle.hostname());

    tokio::signal::ctrl_c().await?;
    cancel.cancel();
    handle.close();
    connector.close();
    connector.on_connection_status_changed(ConnectionInfo::new(
        server,
        ConnectionStatus::Inactive,
        "",
    ))?;
    Ok(())
}

/// Drive completions until the console hears back, or until `interrupt`
/// resolves first, in which case `None` is returned
async fn wait_for_kernel<I>(
    connector: &RemoteKernelConnector,
    cancel: CancellationToken,
    result: oneshot::Receiver<Result<KernelHandle, String>>,
    interrupt: I,
) -> Result<Option<Result<KernelHandle, String>>>
where
    I: Future,
{
    tokio::select! {
        _ = connector.run(cancel) => bail!("Connector stopped before the kernel was ready"),
        result = result => Ok(Some(result.context("Console dropped before the kernel was ready")?)),
        _ = interrupt => Ok(None),
    }
}

/// Console client that hands the kernel (or error) back to the CLI
struct TerminalClient {
    server_id: ServerId,
    result: Mutex<Option<oneshot::Sender<Result<KernelHandle, String>>>>,
}

impl TerminalClient {
    fn new(server_id: ServerId, result: oneshot::Sender<Result<KernelHandle, String>>) -> Self {
        Self {
            server_id,
            result: Mutex::new(Some(result)),
        }
    }

    fn send(&self, result: Result<KernelHandle, String>) {
        let sender = self.result.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(sender) = sender {
            let _ = sender.send(result);
        }
    }
}

impl ConsoleClient for TerminalClient {
    fn server_id(&self) -> ServerId {
        self.server_id.clone()
    }

    fn set_kernel_id(&self, kernel_id: &str) {
        tracing::info!("Console on {} uses kernel {}", self.server_id, kernel_id);
    }

    fn show_kernel_error(&self, message: &str) {
        self.send(Err(message.to_string()));
    }

    fn connect_kernel(&self, kernel: KernelHandle) {
        self.send(Ok(kernel));
    }
}
