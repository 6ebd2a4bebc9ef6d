use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use replikv_server::config::parse_host_port;
use replikv_server::{ReplicaClient, Server, ServerConfig, StorageBackend, Store, open_store};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "replikv-server")]
#[command(about = "replikv - replicated ordered key-value server", long_about = None)]
#[command(version, disable_help_flag = true)]
struct Args {
    /// Address to listen on
    #[arg(short = 'h', long)]
    host: Option<String>,

    /// Port to listen on
    #[arg(short = 'p', long)]
    port: Option<u16>,

    /// YAML configuration file
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    /// Keep data in memory only (no write-ahead log)
    #[arg(long)]
    memory: bool,

    /// Data directory (default: db-<port>)
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Replicate from a primary at startup (host:port)
    #[arg(long)]
    replicaof: Option<String>,

    /// Log level (overridden by RUST_LOG)
    #[arg(long)]
    log_level: Option<String>,

    /// Print help
    #[arg(long, action = ArgAction::Help)]
    help: Option<bool>,
}

impl Args {
    /// Apply command-line overrides on top of the file configuration
    fn apply(self, config: &mut ServerConfig) {
        if let Some(host) = self.host {
            config.server.host = host;
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if self.memory {
            config.storage.backend = StorageBackend::Memory;
        }
        if let Some(dir) = self.data_dir {
            config.storage.data_dir = Some(dir);
        }
        if let Some(primary) = self.replicaof {
            config.replication.replicaof = Some(primary);
        }
        if let Some(level) = self.log_level {
            config.logging.level = level;
        }
    }
}

fn init_tracing(config: &ServerConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    if config.logging.format == "json" {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => ServerConfig::from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => ServerConfig::default(),
    };
    args.apply(&mut config);
    config.validate()?;

    init_tracing(&config);
    info!("Starting replikv server v{}", env!("CARGO_PKG_VERSION"));

    let data_dir = config.data_dir();
    let store = open_store(&config.storage, &data_dir)
        .await
        .with_context(|| format!("opening store in {}", data_dir.display()))?;
    info!(
        "Store ready: backend={:?}, keys={}",
        config.storage.backend,
        store.len()
    );

    if let Some(primary) = config.replication.replicaof.as_deref() {
        let (host, port) = parse_host_port(primary)?;
        ReplicaClient::new(Arc::clone(&store), &host, port).spawn();
    }

    let server = Server::new(config, store);
    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                error!("server stopped: {}", e);
                return Err(e.into());
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down");
        }
    }

    server
        .state()
        .store
        .flush()
        .await
        .context("flushing store on shutdown")?;

    Ok(())
}
