use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use gaggle::{GaggleDaemon, NodeConfig};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "gaggle")]
#[command(about = "Raft cluster node that reports whether it leads")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    Run {
        #[arg(short, long, default_value = "gaggle.toml")]
        config: PathBuf,

        /// Address of this node for Raft communication
        #[arg(long)]
        node_addr: Option<String>,

        /// Port of this node for HTTP communication
        #[arg(long)]
        http_port: Option<u16>,

        /// HTTP address of an existing member to join through
        #[arg(long)]
        join: Option<String>,

        #[arg(long)]
        data_dir: Option<PathBuf>,
    },
    Init {
        #[arg(short, long, default_value = "gaggle.toml")]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gaggle=info,openraft=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            node_addr,
            http_port,
            join,
            data_dir,
        } => {
            let mut config = if config.exists() {
                NodeConfig::load(&config)?
            } else {
                NodeConfig::default()
            };
            if let Some(node_addr) = node_addr {
                config.node_addr = node_addr;
            }
            if let Some(http_port) = http_port {
                config.http_port = http_port;
            }
            if join.is_some() {
                config.join = join;
            }
            if let Some(data_dir) = data_dir {
                config.data_dir = data_dir;
            }
            run_node(config).await?;
        }
        Commands::Init { config } => {
            init_config(config)?;
        }
    }

    Ok(())
}

async fn run_node(config: NodeConfig) -> Result<()> {
    let daemon = Arc::new(GaggleDaemon::new(config.clone()).await?);

    // Peers must reach our consensus endpoint before we ask to be admitted.
    let raft_listener = TcpListener::bind(&config.node_addr)
        .await
        .with_context(|| format!("failed to bind consensus address {}", config.node_addr))?;
    info!("Consensus RPC listening on {}", config.node_addr);
    let raft_router = daemon.raft_router();
    let raft_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(raft_listener, raft_router).await {
            error!("Consensus server error: {}", e);
        }
    });

    daemon
        .bootstrap()
        .await
        .context("cluster bootstrap failed")?;

    let api_listener = TcpListener::bind(&config.http_listen_addr())
        .await
        .with_context(|| format!("failed to bind HTTP address {}", config.http_listen_addr()))?;
    info!("API server listening on {}", config.http_listen_addr());
    let api_router = daemon.api_router();
    let api_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(api_listener, api_router).await {
            error!("API server error: {}", e);
        }
    });

    let daemon_clone = daemon.clone();
    let daemon_handle = tokio::spawn(async move {
        if let Err(e) = daemon_clone.run().await {
            error!("Daemon error: {}", e);
        }
    });

    tokio::signal::ctrl_c().await?;
    info!("Shutting down...");
    daemon.shutdown();

    let _ = tokio::time::timeout(std::time::Duration::from_secs(5), daemon_handle).await;
    api_handle.abort();
    raft_handle.abort();

    Ok(())
}

fn init_config(config_path: PathBuf) -> Result<()> {
    if config_path.exists() {
        anyhow::bail!("Config file already exists: {:?}", config_path);
    }

    let config = NodeConfig::default();
    config.save(&config_path)?;
    println!("Created config file: {:?}", config_path);
    println!("\nEdit the config file to:");
    println!("  - Set node_addr to this node's Raft address");
    println!("  - Set join to an existing member's HTTP address");
    println!("  - Adjust the leader/follower labels");

    Ok(())
}
