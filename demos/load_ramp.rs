//! Ramping load driver for the aggregation endpoint.
//!
//! Ramps virtual users from 0 to 100 over 8 s, holds 100 for 8 s, then ramps
//! down to 0 over 4 s. Each virtual user loops: GET the target, sleep 100 ms.
//! Set `LOAD_TARGET` to override `http://localhost:3000`.

use std::{
    env,
    time::{Duration, Instant},
};

use tokio::{sync::mpsc, task::JoinHandle};
use tokio_util::sync::CancellationToken;

/// (stage length, target virtual users at its end)
const STAGES: [(Duration, usize); 3] = [
    (Duration::from_secs(8), 100),
    (Duration::from_secs(8), 100),
    (Duration::from_secs(4), 0),
];
const TICK: Duration = Duration::from_millis(250);
const THINK_TIME: Duration = Duration::from_millis(100);

#[derive(Debug)]
enum Sample {
    Ok(Duration),
    Err(Duration),
}

fn percentile(sorted: &[Duration], p: f64) -> Duration {
    if sorted.is_empty() {
        return Duration::ZERO;
    }
    let idx = ((sorted.len() - 1) as f64 * p).round() as usize;
    sorted[idx]
}

fn spawn_user(
    http: reqwest::Client,
    target: String,
    tx: mpsc::UnboundedSender<Sample>,
    stop: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while !stop.is_cancelled() {
            let start = Instant::now();
            let res = http.get(&target).send().await;
            let elapsed = start.elapsed();
            let sample = match res {
                Ok(resp) if resp.status().is_success() => Sample::Ok(elapsed),
                _ => Sample::Err(elapsed),
            };
            if tx.send(sample).is_err() {
                break;
            }

            tokio::select! {
                _ = stop.cancelled() => break,
                _ = tokio::time::sleep(THINK_TIME) => {}
            }
        }
    })
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let target = env::var("LOAD_TARGET").unwrap_or_else(|_| "http://localhost:3000".to_string());
    let http = reqwest::Client::new();
    let (tx, mut rx) = mpsc::unbounded_channel::<Sample>();

    let mut users: Vec<(CancellationToken, JoinHandle<()>)> = Vec::new();
    let mut current_target = 0usize;

    for (length, stage_target) in STAGES {
        let from = current_target;
        let stage_start = Instant::now();

        while stage_start.elapsed() < length {
            let progress = stage_start.elapsed().as_secs_f64() / length.as_secs_f64();
            let want = from as f64 + (stage_target as f64 - from as f64) * progress;
            let want = want.round() as usize;

            while users.len() < want {
                let stop = CancellationToken::new();
                let handle = spawn_user(http.clone(), target.clone(), tx.clone(), stop.clone());
                users.push((stop, handle));
            }
            while users.len() > want {
                if let Some((stop, _handle)) = users.pop() {
                    stop.cancel();
                }
            }

            tokio::time::sleep(TICK).await;
        }
        current_target = stage_target;
    }

    for (stop, handle) in users.drain(..) {
        stop.cancel();
        let _ = handle.await;
    }
    drop(tx);

    let mut ok = Vec::new();
    let mut errors = 0usize;
    while let Some(sample) = rx.recv().await {
        match sample {
            Sample::Ok(latency) => ok.push(latency),
            Sample::Err(_) => errors += 1,
        }
    }
    ok.sort();

    let avg = if ok.is_empty() {
        Duration::ZERO
    } else {
        ok.iter().sum::<Duration>() / ok.len() as u32
    };

    println!("\n=== summary ({target}) ===");
    println!("requests : {}", ok.len() + errors);
    println!("errors   : {}", errors);
    println!("avg      : {:?}", avg);
    println!("min      : {:?}", ok.first().copied().unwrap_or_default());
    println!("med      : {:?}", percentile(&ok, 0.50));
    println!("max      : {:?}", ok.last().copied().unwrap_or_default());
    println!("p(90)    : {:?}", percentile(&ok, 0.90));
    println!("p(95)    : {:?}", percentile(&ok, 0.95));
    println!("p(99)    : {:?}", percentile(&ok, 0.99));

    Ok(())
}
