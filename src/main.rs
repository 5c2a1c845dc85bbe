use clap::{Parser, Subcommand};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info};

mod backend;
mod config;
mod error;
mod logging;
mod notify;
mod observability;
mod pipeline;
mod scheduler;
mod tasks;

use crate::backend::{create_backend, ProbeOutcome, WarehouseBackend};
use crate::config::Config;
use crate::pipeline::{PipelineRun, RunState};
use crate::scheduler::Scheduler;
use crate::tasks::{trigger_run, TriggerOutcome, TriggerParams};

#[derive(Parser)]
#[command(name = "dwh_etl")]
#[command(about = "Data warehouse ETL orchestrator (Bronze -> Silver -> Gold)")]
#[command(version = "0.1.0")]
struct Cli {
    /// Path to the pipeline configuration file
    #[arg(long, default_value = "config.toml")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Trigger one pipeline run for today's interval
    Run {
        /// Re-run even if this interval already has a completed run
        #[arg(long)]
        force: bool,
    },
    /// Check warehouse connectivity and exit
    Probe,
    /// Stay resident and trigger one run per day at the configured hour
    Schedule,
}

fn print_run_summary(run: &PipelineRun) {
    println!("\n📊 Run summary for {} ({}):", run.pipeline, run.logical_date);
    println!("   Run id:  {}", run.run_id);
    println!("   Backend: {}", run.backend);
    println!("   State:   {}", run.state.as_str());
    for stage in &run.stages {
        let detail = stage.detail.as_deref().unwrap_or("");
        println!("   - {:<26} {:<16} {}", stage.stage, stage.outcome.as_str(), detail);
    }
    if let Some(failure) = run.first_failure() {
        println!(
            "\n❌ First failing stage: {} ({})",
            failure.stage,
            failure.detail.as_deref().unwrap_or("no detail")
        );
    }
}

fn cancel_on_ctrl_c() -> Arc<AtomicBool> {
    let cancel = Arc::new(AtomicBool::new(false));
    let flag = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("cancellation requested; in-flight work will finish");
            flag.store(true, Ordering::SeqCst);
        }
    });
    cancel
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    logging::init_logging();
    dotenv::dotenv().ok();

    let cli = Cli::parse();
    let config = Config::load(&cli.config)?;

    match cli.command {
        Commands::Run { force } => {
            println!("🚀 Triggering pipeline run...");
            let params = TriggerParams {
                logical_date: chrono::Utc::now().date_naive(),
                force,
                cancel: cancel_on_ctrl_c(),
            };
            match trigger_run(&config, params).await? {
                TriggerOutcome::Ran(run) => {
                    print_run_summary(&run);
                    if run.state != RunState::Completed {
                        std::process::exit(1);
                    }
                }
                TriggerOutcome::AlreadySucceeded => {
                    println!("✅ Interval already has a completed run (use --force to re-run)");
                }
            }
        }
        Commands::Probe => {
            let kind = config.backend_kind();
            let warehouse = create_backend(kind, &config);
            match warehouse.probe().await {
                Ok(ProbeOutcome::Alive) => {
                    println!("✅ {} is alive", kind);
                }
                Ok(ProbeOutcome::Skipped) => {
                    println!("⚠️  no probe wired for {}; nothing was verified", kind);
                }
                Err(e) => {
                    error!("connectivity check failed: {}", e);
                    println!("❌ {} is unreachable: {}", kind, e);
                    std::process::exit(1);
                }
            }
        }
        Commands::Schedule => {
            println!(
                "⏰ Scheduling daily runs at {:02}:00 UTC...",
                config.schedule.hour
            );
            if let Err(e) = metrics_exporter_prometheus::PrometheusBuilder::new().install() {
                error!("metrics exporter could not be installed: {}", e);
            }
            let scheduler = Scheduler::new(config, cancel_on_ctrl_c());
            scheduler.run_forever().await?;
        }
    }
    Ok(())
}
