use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::{json, Value};

#[derive(Parser)]
#[command(name = "bgctl")]
#[command(about = "Management CLI for the blue-green traffic switch", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8080")]
    url: String,

    /// Admin API key, if the switch requires one for changes
    #[arg(short, long)]
    key: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the active environment and both health records
    Status,
    /// Promote the inactive environment
    Switch {
        /// Refuse unless this environment (blue or green) is still active
        #[arg(long)]
        expect: Option<String>,
    },
    /// Read or replace environment addresses
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the current addresses
    Get,
    /// Replace both addresses at once
    Set {
        #[arg(long)]
        blue: String,
        #[arg(long)]
        green: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let base = cli.url.trim_end_matches('/');

    let mut headers = HeaderMap::new();
    if let Some(key) = &cli.key {
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", key))?,
        );
    }

    let res = match cli.command {
        Commands::Status => {
            client.get(format!("{}/api/status", base))
                .headers(headers)
                .send()
                .await?
        }
        Commands::Switch { expect } => {
            let request = client.post(format!("{}/api/switch", base)).headers(headers);
            let request = match expect {
                Some(env) => request.json(&json!({ "expected_active": env })),
                None => request,
            };
            request.send().await?
        }
        Commands::Config { action: ConfigAction::Get } => {
            client.get(format!("{}/api/config", base))
                .headers(headers)
                .send()
                .await?
        }
        Commands::Config { action: ConfigAction::Set { blue, green } } => {
            client.post(format!("{}/api/config", base))
                .headers(headers)
                .json(&json!({ "blue": blue, "green": green }))
                .send()
                .await?
        }
    };

    let ok = print_response(res).await?;
    if !ok {
        std::process::exit(1);
    }
    Ok(())
}

async fn print_response(res: reqwest::Response) -> Result<bool, Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: admin API returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(false);
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(true)
}
