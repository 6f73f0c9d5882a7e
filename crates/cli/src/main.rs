//! Queueherd CLI
//!
//! `start` runs the supervisor in the foreground until signaled; the
//! remaining commands talk to the running supervisor over its localhost
//! JSON-RPC control surface.

mod run;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tabled::{Table, Tabled};

const DEFAULT_RPC_URL: &str = "http://127.0.0.1:9630";

#[derive(Parser)]
#[command(name = "queueherd")]
#[command(about = "Autoscaling supervisor for queue worker processes", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// RPC address of the running supervisor
    #[arg(long, env = "QUEUEHERD_RPC_URL", default_value = DEFAULT_RPC_URL)]
    rpc_url: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the supervisor until signaled
    Start {
        /// Initial worker count (defaults to MIN_PROCESSES, clamped to the bounds)
        #[arg(long)]
        processes: Option<usize>,
    },

    /// Show queue depth, fleet size, thresholds and per-worker state
    Status,

    /// Request additional workers
    ScaleUp {
        /// Number of workers to add
        #[arg(value_parser = clap::value_parser!(u64).range(1..))]
        count: u64,
    },

    /// Request fewer workers
    ScaleDown {
        /// Number of workers to stop
        #[arg(value_parser = clap::value_parser!(u64).range(1..))]
        count: u64,
    },

    /// Initiate orderly shutdown of the running supervisor
    Stop,
}

#[derive(Serialize)]
struct JsonRpcRequest {
    jsonrpc: String,
    method: String,
    params: serde_json::Value,
    id: u64,
}

#[derive(Deserialize)]
struct JsonRpcResponse {
    #[allow(dead_code)]
    jsonrpc: String,
    #[allow(dead_code)]
    id: u64,
    result: Option<serde_json::Value>,
    error: Option<JsonRpcError>,
}

#[derive(Deserialize)]
struct JsonRpcError {
    code: i32,
    message: String,
}

#[derive(Deserialize)]
struct StatusResult {
    state: String,
    queue: String,
    depth: Option<u64>,
    probe_error: Option<String>,
    starting: usize,
    running: usize,
    total: usize,
    min_processes: usize,
    max_processes: usize,
    scale_up_threshold: f64,
    scale_down_threshold: f64,
    unexpected_exits: u64,
    workers: Vec<WorkerEntry>,
}

#[derive(Deserialize)]
struct WorkerEntry {
    pid: u32,
    state: String,
    started_at: i64,
}

#[derive(Tabled)]
struct WorkerRow {
    pid: u32,
    state: String,
    started_at: String,
}

#[derive(Deserialize)]
struct ScaleUpResult {
    requested: u64,
    added: usize,
    total: usize,
}

#[derive(Deserialize)]
struct ScaleDownResult {
    requested: u64,
    removed: usize,
    total: usize,
}

#[derive(Deserialize)]
struct StopResult {
    initiated: bool,
    state: String,
}

async fn call_rpc(url: &str, method: &str, params: serde_json::Value) -> Result<serde_json::Value> {
    let request = JsonRpcRequest {
        jsonrpc: "2.0".to_string(),
        method: method.to_string(),
        params,
        id: 1,
    };

    let client = reqwest::Client::new();
    let response: JsonRpcResponse = client
        .post(url)
        .json(&request)
        .send()
        .await
        .context("Failed to connect to the running supervisor")?
        .json()
        .await
        .context("Failed to parse response")?;

    if let Some(error) = response.error {
        anyhow::bail!("RPC error ({}): {}", error.code, error.message);
    }

    response
        .result
        .ok_or_else(|| anyhow::anyhow!("No result in response"))
}

fn format_started_at(epoch_ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(epoch_ms)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| epoch_ms.to_string())
}

fn print_status(status: &StatusResult) {
    println!("{}", "Queueherd Status".cyan().bold());
    println!();
    println!("  {} {}", "State:".bold(), status.state);
    println!("  {} {}", "Queue:".bold(), status.queue);
    match status.depth {
        Some(depth) => println!("  {} {}", "Depth:".bold(), depth),
        None => println!(
            "  {} {} ({})",
            "Depth:".bold(),
            "unavailable".red(),
            status.probe_error.as_deref().unwrap_or("probe failed")
        ),
    }
    println!();
    println!(
        "  {} {} ({} starting, {} running)",
        "Workers:".bold(),
        status.total,
        status.starting,
        status.running
    );
    println!(
        "  {} {} - {}",
        "Bounds:".bold(),
        status.min_processes,
        status.max_processes
    );
    println!(
        "  {} grow above {:.1}, shrink below {:.1}",
        "Thresholds:".bold(),
        status.scale_up_threshold,
        status.scale_down_threshold
    );
    println!(
        "  {} {}",
        "Unexpected exits:".bold(),
        status.unexpected_exits
    );

    if status.workers.is_empty() {
        println!();
        println!("{}", "No workers running".yellow());
    } else {
        let rows: Vec<WorkerRow> = status
            .workers
            .iter()
            .map(|w| WorkerRow {
                pid: w.pid,
                state: w.state.clone(),
                started_at: format_started_at(w.started_at),
            })
            .collect();
        println!();
        println!("{}", Table::new(rows));
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Start { processes } => {
            let code = run::run(processes).await;
            std::process::exit(code);
        }

        Commands::Status => {
            let result = call_rpc(&cli.rpc_url, "fleet.status.v1", json!({})).await?;
            let status: StatusResult = serde_json::from_value(result)?;
            print_status(&status);
        }

        Commands::ScaleUp { count } => {
            let result = call_rpc(&cli.rpc_url, "fleet.scale_up.v1", json!({ "count": count })).await?;
            let outcome: ScaleUpResult = serde_json::from_value(result)?;
            println!(
                "{} added {} of {} requested (fleet total: {})",
                "✓".green().bold(),
                outcome.added,
                outcome.requested,
                outcome.total
            );
        }

        Commands::ScaleDown { count } => {
            let result =
                call_rpc(&cli.rpc_url, "fleet.scale_down.v1", json!({ "count": count })).await?;
            let outcome: ScaleDownResult = serde_json::from_value(result)?;
            println!(
                "{} stopped {} of {} requested (fleet total: {})",
                "✓".green().bold(),
                outcome.removed,
                outcome.requested,
                outcome.total
            );
        }

        Commands::Stop => {
            let result = call_rpc(&cli.rpc_url, "supervisor.stop.v1", json!({})).await?;
            let outcome: StopResult = serde_json::from_value(result)?;
            if outcome.initiated {
                println!("{} shutdown initiated", "✓".green().bold());
            } else {
                println!(
                    "{} supervisor already {}",
                    "○".yellow(),
                    outcome.state.to_lowercase()
                );
            }
        }
    }

    Ok(())
}
