use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue};
use serde_json::Value;

#[derive(Parser)]
#[command(name = "gateway-cli")]
#[command(about = "Management CLI for the Agent Gateway", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8080")]
    url: String,

    #[arg(short, long, default_value = "")]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the daemon supervisor state
    Status,
    /// Clear the daemon's caches (no-op when absent)
    ClearCaches,
    /// Clear caches, then force a fresh daemon process
    Restart,
    /// List registered tools
    Tools,
    /// List artifacts
    Artifacts,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    let mut headers = HeaderMap::new();
    if !cli.key.is_empty() {
        headers.insert("x-api-key", HeaderValue::from_str(&cli.key)?);
    }

    match cli.command {
        Commands::Status => {
            let res = client
                .get(format!("{}/api/daemon/status", cli.url))
                .headers(headers)
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::ClearCaches => {
            let res = client
                .post(format!("{}/api/daemon/caches/clear", cli.url))
                .headers(headers)
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::Restart => {
            let res = client
                .post(format!("{}/api/daemon/restart", cli.url))
                .headers(headers)
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::Tools => {
            let res = client
                .get(format!("{}/api/tools", cli.url))
                .headers(headers)
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::Artifacts => {
            let res = client
                .get(format!("{}/api/artifacts", cli.url))
                .headers(headers)
                .send()
                .await?;
            print_response(res).await?;
        }
    }

    Ok(())
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: gateway returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
