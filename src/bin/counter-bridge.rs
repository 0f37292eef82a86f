//! `counter-bridge` – serves the reference counter model over NDJSON.

use anyhow::{Context, Result};
use clap::Parser;
use mbt_bridge::demo::{self, CounterModel};
use mbt_bridge::runtime::config::{self, BridgeConfig};
use mbt_bridge::runtime::Bridge;
use mbt_bridge::service::Service;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{self, AsyncRead, AsyncWrite, BufReader};

#[derive(Parser)]
#[command(name = "counter-bridge")]
#[command(about = "Model-based testing bridge for the reference counter model", long_about = None)]
struct Cli {
    /// Listen for TCP connections on this address instead of stdio
    #[arg(long, conflicts_with = "socket")]
    listen: Option<String>,

    /// Listen on a unix domain socket instead of stdio
    #[arg(long)]
    socket: Option<PathBuf>,

    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Pause between commands of one sequence, in nanoseconds
    #[arg(long)]
    pacing_ns: Option<u64>,

    /// Disable the scheduling interference thread
    #[arg(long)]
    no_interference: bool,

    /// Capture role states in every successful response
    #[arg(long)]
    capture_state: bool,

    /// Number of counter roles created on init
    #[arg(long, default_value = "2")]
    roles: usize,

    /// Save the effective configuration to this file and exit
    #[arg(long, value_name = "PATH")]
    write_config: Option<PathBuf>,
}

impl Cli {
    fn bridge_config(&self) -> Result<BridgeConfig> {
        let mut config = match &self.config {
            Some(path) => config::load_config(path)?,
            None => BridgeConfig::default(),
        };
        if let Some(pacing_ns) = self.pacing_ns {
            config.pacing_ns = pacing_ns;
        }
        if self.no_interference {
            config.interference = false;
        }
        if self.capture_state {
            config.capture_state = true;
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr; stdout carries the protocol in stdio mode
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();
    let config = cli.bridge_config()?;

    if let Some(path) = &cli.write_config {
        config::write_config(path, &config)?;
        tracing::info!(path = ?path, "configuration written");
        return Ok(());
    }

    let model = Arc::new(CounterModel::new(cli.roles));
    let bridge = Bridge::new(model, demo::actions(), config);
    let service = Service::new(Arc::new(bridge));

    if let Some(addr) = &cli.listen {
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind {}", addr))?;
        tracing::info!(%addr, "counter-bridge listening");
        loop {
            let (stream, peer) = listener
                .accept()
                .await
                .context("Failed to accept connection")?;
            let (reader, writer) = stream.into_split();
            spawn_connection(service.clone(), reader, writer, peer.to_string());
        }
    }

    if let Some(path) = &cli.socket {
        return serve_unix(service, path).await;
    }

    service
        .handle(BufReader::new(io::stdin()), io::stdout())
        .await
        .context("stdio session failed")
}

fn spawn_connection<R, W>(service: Service<CounterModel>, reader: R, writer: W, peer: String)
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        tracing::info!(%peer, "connection opened");
        if let Err(err) = service.handle(BufReader::new(reader), writer).await {
            tracing::warn!(%peer, error = %err, "connection failed");
        }
        tracing::info!(%peer, "connection closed");
    });
}

#[cfg(unix)]
async fn serve_unix(service: Service<CounterModel>, path: &std::path::Path) -> Result<()> {
    let listener = tokio::net::UnixListener::bind(path)
        .with_context(|| format!("Failed to bind {:?}", path))?;
    tracing::info!(path = ?path, "counter-bridge listening");
    loop {
        let (stream, _) = listener.accept().await.context("Failed to accept connection")?;
        let (reader, writer) = stream.into_split();
        spawn_connection(service.clone(), reader, writer, format!("{:?}", path));
    }
}

#[cfg(not(unix))]
async fn serve_unix(_service: Service<CounterModel>, _path: &std::path::Path) -> Result<()> {
    anyhow::bail!("unix sockets are not supported on this platform")
}
