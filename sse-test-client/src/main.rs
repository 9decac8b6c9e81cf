use anyhow::Result;
use clap::Parser;
use colored::*;

mod api_client;
mod output;
mod scenarios;
mod sse_client;

use api_client::ApiClient;
use output::print_test_summary;

#[derive(Parser)]
#[command(name = "sse-test-client")]
#[command(about = "SSE Integration Testing Tool")]
struct Cli {
    /// Base URL of the relay (e.g., http://localhost:4000)
    #[arg(long)]
    base_url: String,

    /// Shared secret sent with webhook events, if the relay requires one
    #[arg(long, env = "WEBHOOK_SECRET")]
    webhook_secret: Option<String>,

    /// Test scenario to run
    #[arg(long, value_enum)]
    scenario: ScenarioChoice,

    /// Enable verbose output
    #[arg(long, short)]
    verbose: bool,
}

#[derive(clap::ValueEnum, Clone)]
enum ScenarioChoice {
    /// Test basic SSE connection without publishing anything
    ConnectionTest,
    /// Publish a message and status update to two open streams
    LiveDelivery,
    /// Publish into an empty room, then connect and expect a replay
    Recovery,
    /// Run all tests, recovery first
    All,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.verbose {
        env_logger::Builder::from_default_env()
            .filter_level(log::LevelFilter::Debug)
            .init();
    }

    println!("{}", "=== SETUP PHASE ===".bright_white().bold());

    let client = reqwest::Client::new();
    let api_client = ApiClient::new(client, cli.base_url.clone(), cli.webhook_secret.clone());

    let status = api_client.relay_status().await?;
    println!(
        "{} Relay reachable ({} open connection(s))",
        "✓".green(),
        status.connections
    );

    println!("\n{}", "=== TEST PHASE ===".bright_white().bold());

    let mut results = Vec::new();

    match cli.scenario {
        ScenarioChoice::ConnectionTest => {
            results.push(scenarios::test_connection(&cli.base_url).await?);
        }
        ScenarioChoice::LiveDelivery => {
            results.push(scenarios::test_live_delivery(&cli.base_url, &api_client).await?);
        }
        ScenarioChoice::Recovery => {
            results.push(scenarios::test_recovery(&cli.base_url, &api_client).await?);
        }
        ScenarioChoice::All => {
            // Recovery needs the room empty, so it runs before any stream opens.
            results.push(scenarios::test_recovery(&cli.base_url, &api_client).await?);
            results.push(scenarios::test_connection(&cli.base_url).await?);
            results.push(scenarios::test_live_delivery(&cli.base_url, &api_client).await?);
        }
    }

    println!("\n{}", "=== RESULTS ===".bright_white().bold());
    print_test_summary(&results);

    let all_passed = results.iter().all(|r| r.passed);

    if all_passed {
        println!("\n{}", "All tests passed! ✓".bright_green().bold());
    } else {
        println!("\n{}", "Some tests failed! ✗".bright_red().bold());
    }

    std::process::exit(if all_passed { 0 } else { 1 });
}
