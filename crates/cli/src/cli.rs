use clap::Parser;

/// Drive a taskyard pool with a synthetic workload.
///
/// Submits tasks across all priority bands, optionally cancels and resizes
/// along the way, then reports the pool's statistics.
#[derive(Parser, Debug)]
#[command(name = "taskyard", about = "Priority thread pool workload runner")]
pub struct CliArgs {
    /// Path to a TOML pool config (TASKYARD_* env vars still apply on top)
    #[arg(long, env = "TASKYARD_CONFIG")]
    pub config: Option<String>,

    /// Worker thread count override (0 = available parallelism)
    #[arg(long)]
    pub workers: Option<usize>,

    /// Number of tasks to submit
    #[arg(long, default_value = "200")]
    pub tasks: usize,

    /// Simulated work per task, in milliseconds
    #[arg(long, default_value = "5")]
    pub work_ms: u64,

    /// Make every Nth task fail (0 disables)
    #[arg(long, default_value = "0")]
    pub fail_every: usize,

    /// Cancel every Nth task right after submission (0 disables)
    #[arg(long, default_value = "0")]
    pub cancel_every: usize,

    /// Resize the pool to this many workers halfway through submission
    #[arg(long)]
    pub resize_to: Option<usize>,

    /// Force-shutdown instead of waiting for the queue to drain
    #[arg(long)]
    pub force: bool,

    /// Print the final report as JSON
    #[arg(long)]
    pub json: bool,
}
