//! Tributary workload driver
//!
//! Runs a merge-then-batch pipeline and a keyed-lock churn workload, and
//! fails if either loses items or leaks lock records.

use std::time::{Duration, Instant};

use anyhow::{ensure, Context, Result};
use clap::Parser;
use tokio::sync::mpsc;
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use tributary_core::lock::{LockFactory, LockFactoryConfig};
use tributary_core::stream::{self, BatchConfig};

/// Tributary - stress driver for keyed locks, fan-in merging and batching
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Number of producer streams feeding the merger
    #[arg(long, default_value_t = 32)]
    producers: usize,

    /// Items emitted by each producer
    #[arg(long, default_value_t = 10_000)]
    items: u64,

    /// Maximum items per batch (0 selects the default)
    #[arg(long, default_value_t = 0)]
    batch_size: usize,

    /// Batch wait limit in milliseconds (0 disables the timer)
    #[arg(long, default_value_t = 0)]
    wait_ms: u64,

    /// Threads hammering the lock factory
    #[arg(long, default_value_t = 16)]
    lock_tasks: usize,

    /// Distinct keys shared by the lock threads
    #[arg(long, default_value_t = 100)]
    lock_keys: u64,

    /// Acquire/release cycles per lock thread
    #[arg(long, default_value_t = 1_000)]
    lock_cycles: u64,

    /// Let reads on absent keys skip record creation
    #[arg(long)]
    read_optimised: bool,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!(
                    "tributary_stress={0},tributary_core={0}",
                    args.log_level
                )
                .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting tributary stress run");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    run_pipeline(&args).await?;
    run_lock_churn(&args).await?;

    info!("Stress run passed");
    Ok(())
}

/// Merges `producers` streams into one and batches the result.
async fn run_pipeline(args: &Args) -> Result<()> {
    let started = Instant::now();

    let inputs: Vec<_> = (0..args.producers)
        .map(|id| {
            let (tx, rx) = mpsc::channel(16);
            let items = args.items;
            tokio::spawn(async move {
                for n in 0..items {
                    if tx.send((id, n)).await.is_err() {
                        debug!(producer = id, "merger gone, producer exiting");
                        return;
                    }
                }
            });
            rx
        })
        .collect();

    let (output, cancel) = stream::merge(inputs).into_parts();
    info!(
        producers = args.producers,
        forwarders = cancel.forwarder_count(),
        "merge tree built"
    );

    let mut config = BatchConfig::with_size(args.batch_size);
    if args.wait_ms > 0 {
        config.wait_limit = Some(Duration::from_millis(args.wait_ms));
    }
    let size = config.effective_size();
    let mut batches = stream::batch(output, config);

    let mut last_seen = vec![None::<u64>; args.producers];
    let mut total = 0u64;
    let mut batch_count = 0u64;
    while let Some(batch) = batches.recv().await {
        ensure!(
            !batch.is_empty() && batch.len() <= size,
            "batch of {} items outside 1..={size}",
            batch.len()
        );
        for (id, n) in batch {
            let slot = last_seen
                .get_mut(id)
                .with_context(|| format!("item from unknown producer {id}"))?;
            ensure!(
                slot.map_or(true, |prev| prev < n),
                "producer {id} reordered: {n} after {slot:?}"
            );
            *slot = Some(n);
            total += 1;
        }
        batch_count += 1;
    }
    cancel.cancel().await;

    let expected = args.items * args.producers as u64;
    ensure!(total == expected, "pipeline delivered {total} of {expected} items");

    let elapsed = started.elapsed();
    info!(
        items = total,
        batches = batch_count,
        elapsed_ms = elapsed.as_millis(),
        "pipeline complete"
    );
    Ok(())
}

/// Runs balanced acquire/release cycles across a shared key space.
async fn run_lock_churn(args: &Args) -> Result<()> {
    let config = if args.read_optimised {
        LockFactoryConfig::read_optimised()
    } else {
        LockFactoryConfig::default()
    };
    let factory = LockFactory::with_config(config);
    let keys = args.lock_keys.max(1);
    let started = Instant::now();

    let handles: Vec<_> = (0..args.lock_tasks as u64)
        .map(|t| {
            let factory = factory.clone();
            let cycles = args.lock_cycles;
            tokio::task::spawn_blocking(move || {
                for i in 0..cycles {
                    let locker = factory.locker_for((i * 31 + t * 7) % keys);
                    if (i + t) % 4 == 0 {
                        locker.lock();
                        locker.unlock();
                    } else {
                        locker.rlock();
                        locker.runlock();
                    }
                }
            })
        })
        .collect();

    for handle in handles {
        handle.await.context("lock worker panicked")?;
    }

    let remaining = factory.active_keys();
    ensure!(remaining == 0, "{remaining} lock records leaked");

    info!(
        tasks = args.lock_tasks,
        keys,
        cycles = args.lock_cycles,
        read_optimised = factory.is_read_optimised(),
        elapsed_ms = started.elapsed().as_millis(),
        "lock churn complete"
    );
    Ok(())
}
