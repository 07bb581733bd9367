//! Attempt coordinator CLI
//!
//! Entry point for the `attempt-coord` command-line tool.

use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use attempt_coord::config::EffectiveConfig;
use attempt_coord::gateway::{OpScript, RpcOp, ScriptedGateway, ScriptedOutcome};
use attempt_coord::logging::init_tracing;
use attempt_coord::{AllocatedSlot, AttemptSnapshot, ExecutionGraph, FailureCause, SlotId};
use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "attempt-coord")]
#[command(about = "Execution attempt coordinator", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a job on a scripted gateway, cancel it and print every attempt
    Simulate {
        /// Number of parallel subtasks
        #[arg(long, short = 'p', default_value_t = 4)]
        parallelism: usize,

        /// How the gateway answers cancel RPCs
        #[arg(long, value_enum, default_value_t = CancelOutcome::Ack)]
        cancel_outcome: CancelOutcome,

        /// Fail this subtask before the job is canceled
        #[arg(long)]
        fail_vertex: Option<usize>,

        /// Override rpc.cancel_timeout_ms
        #[arg(long)]
        cancel_timeout_ms: Option<u64>,

        /// Path to config file (TOML)
        #[arg(long, short = 'c')]
        config: Option<PathBuf>,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Print the effective configuration with provenance
    Config {
        /// Path to config file (TOML)
        #[arg(long, short = 'c')]
        config: Option<PathBuf>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum CancelOutcome {
    /// Acknowledge, then report the task canceled
    Ack,
    /// Fail with a transport error
    Fail,
    /// Never answer
    Drop,
}

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Simulate {
            parallelism,
            cancel_outcome,
            fail_vertex,
            cancel_timeout_ms,
            config,
            json,
        } => {
            run_simulate(parallelism, cancel_outcome, fail_vertex, cancel_timeout_ms, config, json);
        }
        Commands::Config { config } => {
            run_config(config);
        }
    }
}

fn load_config(config_path: Option<PathBuf>, cancel_timeout_ms: Option<u64>) -> EffectiveConfig {
    let overrides = cancel_timeout_ms
        .map(|ms| serde_json::json!({ "rpc": { "cancel_timeout_ms": ms } }));

    match EffectiveConfig::build(config_path.as_deref(), overrides) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            process::exit(1);
        }
    }
}

fn run_simulate(
    parallelism: usize,
    cancel_outcome: CancelOutcome,
    fail_vertex: Option<usize>,
    cancel_timeout_ms: Option<u64>,
    config_path: Option<PathBuf>,
    json: bool,
) {
    let config = load_config(config_path, cancel_timeout_ms);
    let settings = &config.settings;
    init_tracing(&settings.log_level);

    let mut graph = ExecutionGraph::new("simulated", parallelism, settings);

    let gateway = match cancel_outcome {
        CancelOutcome::Ack => ScriptedGateway::acking(),
        CancelOutcome::Fail => ScriptedGateway::failing_cancel(),
        CancelOutcome::Drop => ScriptedGateway::new()
            .with_script(RpcOp::Cancel, OpScript::always(ScriptedOutcome::Drop)),
    };
    gateway.attach_reporter(graph.mailbox());
    let gateway = Arc::new(gateway);

    let running = graph.switch_all_to_running(|index| {
        AllocatedSlot::new(SlotId::new(format!("worker-0/{}", index)), gateway.clone())
    });
    tracing::info!(running, parallelism, "job deployed");

    if let Some(index) = fail_vertex {
        let cause = FailureCause::new("USER_CODE", "injected failure");
        if let Err(e) = graph.fail_vertex(index, cause) {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    }

    graph.cancel();
    let outcome = graph.run_until_settled(settings.settle_wait());
    let snapshots = graph.snapshots();

    if json {
        let report = serde_json::json!({
            "job": graph.job_name(),
            "status": graph.job_status(),
            "settled": outcome.settled,
            "rpc_calls": gateway.calls().len(),
            "attempts": snapshots,
        });
        match serde_json::to_string_pretty(&report) {
            Ok(out) => println!("{}", out),
            Err(e) => {
                eprintln!("Error serializing output: {}", e);
                process::exit(1);
            }
        }
    } else {
        print_human(&graph, &snapshots);
    }

    if !outcome.settled {
        process::exit(1);
    }
}

fn print_human(graph: &ExecutionGraph, snapshots: &[AttemptSnapshot]) {
    println!("Job {}: {:?}", graph.job_name(), graph.job_status());
    println!();
    println!("{:<8} {:<8} {:<10} {:<14} {}", "VERTEX", "ATTEMPT", "STATE", "SLOT", "FAILURE");

    for snapshot in snapshots {
        let slot = snapshot
            .slot_id
            .as_ref()
            .map(|s| s.as_str().to_string())
            .unwrap_or_else(|| "-".to_string());
        let failure = snapshot
            .failure
            .as_ref()
            .map(|f| f.to_string())
            .unwrap_or_default();
        println!(
            "{:<8} {:<8} {:<10} {:<14} {}",
            snapshot.vertex_index,
            snapshot.attempt_number,
            snapshot.state.as_str(),
            slot,
            failure
        );
    }
}

fn run_config(config_path: Option<PathBuf>) {
    let config = load_config(config_path, None);

    match config.to_json() {
        Ok(json) => println!("{}", json),
        Err(e) => {
            eprintln!("Error serializing config: {}", e);
            process::exit(1);
        }
    }
}
