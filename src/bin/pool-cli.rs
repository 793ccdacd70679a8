use clap::{Parser, Subcommand};
use serde_json::Value;

#[derive(Parser)]
#[command(name = "pool-cli")]
#[command(about = "Management CLI for the proxy pool manager", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:9095")]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List node health and connections
    Nodes,
    /// Show subscription refresh status
    Status,
    /// Show reload orchestrator state
    ReloadStatus,
    /// Trigger a subscription refresh
    Refresh,
    /// Probe one node by tag
    Probe { tag: String },
    /// Clear a node's blacklist by tag
    Release { tag: String },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    let response = match cli.command {
        Commands::Nodes => client.get(format!("{}/api/nodes", cli.url)).send().await?,
        Commands::Status => {
            client
                .get(format!("{}/api/subscription/status", cli.url))
                .send()
                .await?
        }
        Commands::ReloadStatus => {
            client
                .get(format!("{}/api/reload/status", cli.url))
                .send()
                .await?
        }
        Commands::Refresh => {
            client
                .post(format!("{}/api/subscription/refresh", cli.url))
                .send()
                .await?
        }
        Commands::Probe { tag } => {
            client
                .post(format!("{}/api/nodes/{}/probe", cli.url, tag))
                .send()
                .await?
        }
        Commands::Release { tag } => {
            client
                .post(format!("{}/api/nodes/{}/release", cli.url, tag))
                .send()
                .await?
        }
    };

    print_response(response).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    let json: Value = res.json().await?;
    if !status.is_success() {
        eprintln!("API returned status {status}");
    }
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
