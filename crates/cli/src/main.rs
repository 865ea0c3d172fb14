mod cli;
mod workload;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use taskyard_pool::{PoolConfig, ThreadPool};

use crate::cli::CliArgs;
use crate::workload::Workload;

fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args = CliArgs::parse();

    let mut config = match args.config.as_deref() {
        Some(path) => PoolConfig::from_file(path)
            .with_context(|| format!("failed to load pool config from '{}'", path))?,
        None => PoolConfig::from_env().context("invalid TASKYARD_* environment")?,
    };
    if let Some(workers) = args.workers {
        config.worker_threads = workers;
    }

    let pool = ThreadPool::new(config).context("failed to start thread pool")?;
    info!(
        pool = %pool.name(),
        workers = pool.size(),
        tasks = args.tasks,
        "Starting workload"
    );

    let report = Workload::from_args(&args)
        .run(&pool)
        .context("workload failed")?;

    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("failed to serialize report")?
        );
    } else {
        report.print();
    }

    Ok(())
}
