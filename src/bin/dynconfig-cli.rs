use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::{json, Value};

#[derive(Parser)]
#[command(name = "dynconfig-cli")]
#[command(about = "Management CLI for the dynamic configuration daemon", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8081")]
    url: String,

    #[arg(short, long, env = "DYNCONFIG_ADMIN_KEY")]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Daemon status, layout and reload state
    Status,
    /// Dump every value of the published bundle
    Config,
    /// Reload the raw source now
    Reload,
    /// Show throttle rules and their live counters
    Throttle,
    /// Apply a permanent override
    Override {
        /// `GROUP\NAME` or `GROUP\NAME\VALUE`
        name: String,

        /// Value, when not part of the name
        #[arg(default_value = "")]
        value: String,

        /// Accept `::` and `/` as separators and spaces for underscores
        #[arg(long)]
        substitute: bool,

        /// Skip silently if the value is not registered
        #[arg(long)]
        optional: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    let mut headers = HeaderMap::new();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", cli.key))?,
    );

    let res = match cli.command {
        Commands::Status => client.get(format!("{}/admin/status", cli.url)),
        Commands::Config => client.get(format!("{}/admin/config", cli.url)),
        Commands::Throttle => client.get(format!("{}/admin/throttle", cli.url)),
        Commands::Reload => client.post(format!("{}/admin/reload", cli.url)),
        Commands::Override {
            name,
            value,
            substitute,
            optional,
        } => client
            .post(format!("{}/admin/override", cli.url))
            .json(&json!({
                "name": name,
                "value": value,
                "substitute": substitute,
                "optional": optional,
            })),
    }
    .headers(headers)
    .send()
    .await?;

    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    let body = res.text().await?;

    if !status.is_success() {
        eprintln!("Error: admin API returned status {}", status);
        if !body.is_empty() {
            eprintln!("Response: {}", body);
        }
        std::process::exit(1);
    }

    match serde_json::from_str::<Value>(&body) {
        Ok(json) => println!("{}", serde_json::to_string_pretty(&json)?),
        Err(_) => println!("{}", body),
    }
    Ok(())
}
