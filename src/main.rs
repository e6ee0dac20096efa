use std::sync::Arc;

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;
use view_batcher::{Aggregator, AggregatorConfig, EndpointConfig, HttpBatchClient};

// Driver commands, one per stdin line
enum Command {
    View(String),
    Seed(String, i64),
    Count(String),
    Flush,
    Stats,
    Quit,
}

fn parse_command(line: &str) -> Option<Command> {
    let mut parts = line.split_whitespace();
    let command = match (parts.next()?, parts.next(), parts.next()) {
        ("view", Some(id), None) => Command::View(id.to_string()),
        ("seed", Some(id), Some(count)) => Command::Seed(id.to_string(), count.parse().ok()?),
        ("count", Some(id), None) => Command::Count(id.to_string()),
        ("flush", None, None) => Command::Flush,
        ("stats", None, None) => Command::Stats,
        ("quit", None, None) => Command::Quit,
        _ => return None,
    };
    Some(command)
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    tracing::info!("View batcher booting...");

    let endpoint_config = EndpointConfig::from_env();
    tracing::info!(url = %endpoint_config.base_url, "Using batch-view endpoint");

    let endpoint = Arc::new(HttpBatchClient::new(&endpoint_config));
    let aggregator = Aggregator::new(AggregatorConfig::from_env(), endpoint);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    println!("commands: view <id> | seed <id> <n> | count <id> | flush | stats | quit");

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else { break };
        if line.trim().is_empty() {
            continue;
        }

        match parse_command(&line) {
            Some(Command::View(id)) => aggregator.record_view(&id),
            Some(Command::Seed(id, count)) => aggregator.seed_initial_count(&id, count),
            Some(Command::Count(id)) => println!("{} -> {}", id, aggregator.view_count(&id)),
            Some(Command::Flush) => {
                let outcome = aggregator.flush_now().wait().await;
                println!("{:?}", outcome);
            }
            Some(Command::Stats) => {
                let snap = aggregator.telemetry();
                println!(
                    "pending={} submitted={} confirmed={} degraded={} failed={} avg_batch={:.2}",
                    aggregator.pending_len(),
                    snap.flush_stats.submitted,
                    snap.flush_stats.confirmed,
                    snap.flush_stats.degraded,
                    snap.flush_stats.failed,
                    snap.flush_stats.avg_batch_size,
                );
            }
            Some(Command::Quit) => break,
            None => println!("unrecognized command: {}", line.trim()),
        }
    }

    let outcome = aggregator.shutdown().await;
    tracing::info!(?outcome, "View batcher stopped");
    Ok(())
}
