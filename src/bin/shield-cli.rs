use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::{json, Value};

use shield_gateway::security::OperatingMode;

#[derive(Parser)]
#[command(name = "shield-cli")]
#[command(about = "Operator CLI for the shield admission gateway", long_about = None)]
struct Cli {
    #[arg(short, long, env = "SHIELD_ADMIN_URL", default_value = "http://127.0.0.1:8081")]
    url: String,

    #[arg(short, long, env = "SHIELD_ADMIN_KEY")]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version, mode and uptime
    Status,
    /// Show or change the operating mode
    Mode {
        #[command(subcommand)]
        action: Option<ModeAction>,
    },
    /// Show denial counters and recent decisions
    Stats {
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },
}

#[derive(Subcommand)]
enum ModeAction {
    /// Switch to `normal` or `restricted`
    Set { mode: OperatingMode },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let base = cli.url.trim_end_matches('/');

    let mut headers = HeaderMap::new();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", cli.key))?,
    );

    let res = match cli.command {
        Commands::Status => {
            client.get(format!("{}/admin/status", base))
                .headers(headers)
                .send()
                .await?
        }
        Commands::Mode { action: None } => {
            client.get(format!("{}/admin/mode", base))
                .headers(headers)
                .send()
                .await?
        }
        Commands::Mode { action: Some(ModeAction::Set { mode }) } => {
            client.put(format!("{}/admin/mode", base))
                .headers(headers)
                .json(&json!({ "mode": mode }))
                .send()
                .await?
        }
        Commands::Stats { limit } => {
            client.get(format!("{}/admin/stats", base))
                .headers(headers)
                .query(&[("limit", limit)])
                .send()
                .await?
        }
    };

    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: admin API returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        std::process::exit(1);
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
