use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use gaggle::bootstrap::base_url;
use serde_json::Value;

#[derive(Parser)]
#[command(name = "gagglectl")]
#[command(about = "CLI for inspecting and reshaping a gaggle cluster")]
struct Cli {
    #[arg(short, long, default_value = "127.0.0.1:8000")]
    addr: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Role label reported by the node
    State,
    Status,
    Members,
    /// Admit a node by its consensus address
    Join { node_addr: String },
    /// Remove a node by its consensus address
    Leave { node_addr: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let base_url = base_url(&cli.addr);

    match cli.command {
        Commands::State => {
            let resp: Value = client.get(&base_url).send().await?.json().await?;
            println!("{}", serde_json::to_string_pretty(&resp)?);
        }
        Commands::Status => {
            let resp: Value = client
                .get(format!("{}/status", base_url))
                .send()
                .await?
                .json()
                .await?;
            println!("{}", serde_json::to_string_pretty(&resp)?);
        }
        Commands::Members => {
            let resp: Value = client
                .get(format!("{}/members", base_url))
                .send()
                .await?
                .json()
                .await?;

            if let Some(members) = resp["members"].as_array() {
                println!("configuration index {}", resp["index"]);
                for member in members {
                    println!(
                        "  {} ({})",
                        member["id"].as_str().unwrap_or("?"),
                        member["role"].as_str().unwrap_or("?")
                    );
                }
            }
        }
        Commands::Join { node_addr } => {
            membership_change(&client, &base_url, "join", &node_addr).await?;
        }
        Commands::Leave { node_addr } => {
            membership_change(&client, &base_url, "leave", &node_addr).await?;
        }
    }

    Ok(())
}

async fn membership_change(
    client: &reqwest::Client,
    base_url: &str,
    action: &str,
    node_addr: &str,
) -> Result<()> {
    let resp = client
        .get(format!("{}/{}", base_url, action))
        .query(&[("nodeAddr", node_addr)])
        .send()
        .await?;

    let status = resp.status();
    let body = resp.text().await?;
    if !status.is_success() {
        bail!("{} failed ({}): {}", action, status, body);
    }
    println!("{}", body);
    Ok(())
}
