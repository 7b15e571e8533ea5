use anyhow::{Context, Result};
use clap::Parser;
use poolalloc::{LibcSystem, PoolConfig, PoolStats, SharedPool, MAX_BYTES};
use std::fs;
use std::path::PathBuf;
use std::ptr::NonNull;
use std::time::Instant;

#[derive(Parser)]
#[command(name = "pool_report")]
#[command(about = "Drive a small-object workload through the pool and print its statistics", long_about = None)]
struct Cli {
    /// JSON file holding a `PoolConfig`; defaults apply when omitted
    #[arg(long)]
    config: Option<PathBuf>,

    /// Allocate/free rounds to run
    #[arg(long, default_value_t = 1_000)]
    rounds: usize,

    /// Live blocks held per round
    #[arg(long, default_value_t = 256)]
    live: usize,

    /// Use the process-wide pool (default configuration) instead of a private one
    #[arg(long, default_value_t = false)]
    global: bool,
}

fn load_config(path: Option<&PathBuf>) -> Result<PoolConfig> {
    let Some(path) = path else {
        return Ok(PoolConfig::default());
    };
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    let config: PoolConfig = serde_json::from_str(&text)
        .with_context(|| format!("failed to parse config {}", path.display()))?;
    config.validate()?;
    Ok(config)
}

/// Cycles through every size from 1 to twice the largest class so both the
/// pooled and the pass-through paths see traffic.
fn churn(pool: &SharedPool<LibcSystem>, rounds: usize, live: usize) -> Result<()> {
    let mut held: Vec<(NonNull<u8>, usize)> = Vec::with_capacity(live);
    let mut size = 1;

    for _ in 0..rounds {
        for _ in 0..live {
            let block = pool
                .allocate(size)
                .with_context(|| format!("allocation of {size} bytes failed"))?;
            held.push((block, size));
            size = size % (2 * MAX_BYTES) + 1;
        }
        // Free in reverse so the next round reuses the same blocks.
        while let Some((block, size)) = held.pop() {
            // Safety: each block came from this pool with this size and is freed once.
            unsafe { pool.deallocate(block, size) };
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref())?;

    let private;
    let pool: &SharedPool<LibcSystem> = if cli.global {
        poolalloc::global_pool()
    } else {
        private = SharedPool::with_config(LibcSystem, config)?;
        &private
    };

    let start = Instant::now();
    churn(pool, cli.rounds, cli.live)?;
    let elapsed = start.elapsed();

    let stats: PoolStats = pool.stats();
    tracing::info!(
        rounds = cli.rounds,
        live = cli.live,
        elapsed_ms = elapsed.as_secs_f64() * 1000.0,
        "workload finished"
    );
    println!(
        "{}",
        serde_json::to_string_pretty(&stats).context("failed to serialize stats")?
    );
    Ok(())
}
