//! Compares the three race modes against one pair of live backends.
//!
//! Start two backends first, e.g.
//! `PORT=8081 SERVICE_NAME=A cargo run -- backend` and
//! `PORT=8082 SERVICE_NAME=A2 cargo run -- backend`, then run this example.
//! It performs the same number of dispatches per mode and prints latency
//! percentiles and which endpoint won.

use std::{
    env,
    sync::Arc,
    time::{Duration, Instant},
};

use hedged_fetch::{HttpCaller, RaceConfig, RaceMode, RacingDispatcher, DEFAULT_HEDGE_DELAY};
use tokio::sync::{mpsc, Semaphore};

const NUM_CALLS: usize = 2_000;
const MAX_IN_FLIGHT: usize = 64;

#[derive(Debug)]
struct CallResult {
    latency: Duration,
    ok: bool,
}

fn percentile(sorted: &[Duration], p: f64) -> Duration {
    if sorted.is_empty() {
        return Duration::ZERO;
    }
    let idx = ((sorted.len() - 1) as f64 * p).round() as usize;
    sorted[idx]
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let primary = env::var("SERVICE_A").unwrap_or_else(|_| "http://localhost:8081".to_string());
    let secondary = env::var("SERVICE_A2").unwrap_or_else(|_| "http://localhost:8082".to_string());

    for mode in [RaceMode::Standard, RaceMode::Tied, RaceMode::Hedged] {
        let cfg = RaceConfig::for_mode(mode, primary.as_str(), secondary.as_str(), DEFAULT_HEDGE_DELAY);
        let dispatcher = RacingDispatcher::new(HttpCaller::new());

        let mut latencies = run_mode(&dispatcher, cfg).await?;
        latencies.sort();

        println!("\n=== {mode} ===");
        println!("calls                : {}", NUM_CALLS);
        println!("absent results       : {}", NUM_CALLS - latencies.len());
        println!(
            "latency p50/p90/p99  : {:?} / {:?} / {:?}",
            percentile(&latencies, 0.50),
            percentile(&latencies, 0.90),
            percentile(&latencies, 0.99),
        );
        println!("max latency          : {:?}", latencies.last().copied().unwrap_or_default());

        for (endpoint, stats) in dispatcher.endpoint_stats() {
            println!(
                "endpoint {:>24}: wins = {:5}, avg = {:7.2} ms, failures = {:4}, cancelled = {:5}",
                endpoint, stats.wins, stats.avg_latency_ms, stats.failures, stats.cancellations,
            );
        }
    }

    Ok(())
}

/// Runs `NUM_CALLS` dispatches and returns the latency of each successful one.
async fn run_mode(
    dispatcher: &RacingDispatcher<HttpCaller>,
    cfg: RaceConfig,
) -> Result<Vec<Duration>, Box<dyn std::error::Error + Send + Sync>> {
    let (tx, mut rx) = mpsc::channel::<CallResult>(MAX_IN_FLIGHT * 2);
    let semaphore = Arc::new(Semaphore::new(MAX_IN_FLIGHT));
    let cfg = Arc::new(cfg);

    for _ in 0..NUM_CALLS {
        let dispatcher = dispatcher.clone();
        let cfg = cfg.clone();
        let tx = tx.clone();
        let permit = semaphore.clone().acquire_owned().await?;

        tokio::spawn(async move {
            let _permit = permit;
            let start = Instant::now();
            let ok = matches!(dispatcher.dispatch(&cfg).await, Ok(Some(_)));
            let _ = tx
                .send(CallResult {
                    latency: start.elapsed(),
                    ok,
                })
                .await;
        });
    }
    drop(tx);

    let mut latencies = Vec::with_capacity(NUM_CALLS);
    while let Some(res) = rx.recv().await {
        if res.ok {
            latencies.push(res.latency);
        }
    }
    Ok(latencies)
}
