//! Strand Daemon (`strandd`)
//!
//! Opens a store, resumes or starts this instance's chain, and syncs with
//! peers over TCP until interrupted.

use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use strand_kernel::{Backend, DataDir, Instance, InstanceOptions};
use tracing_subscriber::EnvFilter;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum BackendArg {
    Redb,
    Log,
    Memory,
}

impl From<BackendArg> for Backend {
    fn from(arg: BackendArg) -> Self {
        match arg {
            BackendArg::Redb => Backend::Redb,
            BackendArg::Log => Backend::Log,
            BackendArg::Memory => Backend::Memory,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "strandd", version, about = "Strand Headless Daemon")]
struct Args {
    /// Data directory (defaults to the platform data dir)
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Entry store implementation
    #[arg(long, value_enum, default_value = "redb")]
    backend: BackendArg,

    /// Address to accept peers on, e.g. 127.0.0.1:8080
    #[arg(long)]
    listen: Option<String>,

    /// Peer to dial on startup (repeatable)
    #[arg(long)]
    connect: Vec<String>,

    /// Verbose logging (-v for debug, -vv for trace)
    #[arg(long, short, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose)?;

    tracing::info!("strandd v{} starting...", env!("CARGO_PKG_VERSION"));

    let data_dir = args.data_dir.map(DataDir::new).unwrap_or_default();
    let store = data_dir.open_store(args.backend.into()).map_err(|e| {
        tracing::error!("Failed to open store in {}: {}", data_dir.base().display(), e);
        anyhow::anyhow!("{}", e)
    })?;
    let options = InstanceOptions::default().with_software(format!("strandd {}", env!("CARGO_PKG_VERSION")));
    let instance = Arc::new(Instance::open(store, options)?);

    let chain = instance.my_chain();
    tracing::info!(
        "Medallion: {} (chain start {})",
        hex::encode(chain.medallion.to_be_bytes()),
        chain.chain_start
    );

    let server = match &args.listen {
        Some(addr) => {
            let listener = tokio::net::TcpListener::bind(addr).await?;
            Some(tokio::spawn(strand_net::serve(listener, instance.clone())))
        }
        None => None,
    };

    for addr in &args.connect {
        if let Err(e) = strand_net::connect(addr.as_str(), instance.clone()).await {
            tracing::warn!("Failed to connect to {}: {}", addr, e);
        }
    }

    tracing::info!("Daemon ready. Press Ctrl+C to stop.");
    shutdown_signal().await?;
    tracing::info!("Shutdown signal received...");

    if let Some(server) = server {
        server.abort();
    }
    instance.close().await;

    tracing::info!("Daemon stopped");
    Ok(())
}

fn init_tracing(verbosity: u8) -> anyhow::Result<()> {
    let mut filter = EnvFilter::from_default_env();

    // Only apply defaults if RUST_LOG is not set
    if std::env::var("RUST_LOG").is_err() {
        let level = match verbosity {
            0 => "info",
            1 => "debug",
            _ => "trace",
        };
        filter = filter.add_directive(level.parse()?);
    }

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
    Ok(())
}

#[cfg(unix)]
async fn shutdown_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    tokio::select! {
        _ = sigint.recv() => {}
        _ = sigterm.recv() => {}
    }
    Ok(())
}

#[cfg(not(unix))]
async fn shutdown_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}
