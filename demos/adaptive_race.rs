//! High-volume hedged race run against a simulated slow-tail backend.
//!
//! Performs 5,000 concurrent races through one adaptive engine, with
//! in-flight races bounded by a semaphore, and prints how often the hedge
//! rescued a slow primary and where the adaptive cutoff settled.
//!
//! Run with `RUST_LOG=hedged_race=debug` to see every hedge start.

use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use hedged_race::{Branch, HedgeConfig, LoserPolicy, RaceEngine};
use tokio::sync::{mpsc, Semaphore};
use tracing_subscriber::EnvFilter;

const NUM_RACES: usize = 5_000;
const MAX_IN_FLIGHT: usize = 256;

#[derive(Debug)]
struct RaceResult {
    race_idx: usize,
    branch: Branch,
    ok: bool,
    latency: Duration,
}

/// Mostly ~20ms, one call in ten stuck for ~300ms, one in a hundred failing.
fn simulated_call() -> impl std::future::Future<Output = Result<u64, String>> + Send + 'static {
    let latency = if fastrand::u8(0..10) == 0 {
        300 + fastrand::u64(0..50)
    } else {
        15 + fastrand::u64(0..10)
    };
    let fails = fastrand::u8(0..100) == 0;
    async move {
        tokio::time::sleep(Duration::from_millis(latency)).await;
        if fails {
            Err(format!("backend error after {latency} ms"))
        } else {
            Ok(latency)
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cfg = HedgeConfig::adaptive_percent(150)
        .with_window_size(200)
        .with_loser_policy(LoserPolicy::Drain);
    let engine = RaceEngine::named("demo", cfg)?;

    let discarded = Arc::new(AtomicU64::new(0));
    let d = Arc::clone(&discarded);
    engine.events().on_discarded(move |_| {
        d.fetch_add(1, Ordering::Relaxed);
    });

    let (tx, mut rx) = mpsc::channel::<RaceResult>(MAX_IN_FLIGHT * 2);
    let semaphore = Arc::new(Semaphore::new(MAX_IN_FLIGHT));
    let consumer = tokio::spawn(async move {
        let mut results: Vec<RaceResult> = Vec::with_capacity(NUM_RACES);
        while let Some(res) = rx.recv().await {
            results.push(res);
        }
        results
    });

    for i in 0..NUM_RACES {
        let engine = engine.clone();
        let tx = tx.clone();
        let sem = semaphore.clone();

        tokio::spawn(async move {
            let _permit = sem.acquire_owned().await.expect("semaphore closed");

            let outcome = engine.race(simulated_call).await;

            let _ = tx
                .send(RaceResult {
                    race_idx: i,
                    branch: outcome.source,
                    ok: outcome.result.is_ok(),
                    latency: outcome.elapsed,
                })
                .await;
        });
    }

    drop(tx);
    let mut results = consumer.await?;
    results.sort_by_key(|r| r.race_idx);

    // Let drained losers finish so the discarded count is complete.
    tokio::time::sleep(Duration::from_millis(500)).await;

    let mut wins = [0usize; 2];
    let mut errors = 0usize;
    let mut total_latency = Duration::ZERO;
    let mut worst = Duration::ZERO;
    for r in &results {
        wins[matches!(r.branch, Branch::Hedge) as usize] += 1;
        if !r.ok {
            errors += 1;
        }
        total_latency += r.latency;
        worst = worst.max(r.latency);
    }

    let window = engine.window().map(|w| w.snapshot());

    println!("\n=== summary ===");
    println!("total races          : {}", results.len());
    println!("primary wins         : {}", wins[0]);
    println!("hedge wins           : {}", wins[1]);
    println!("errors               : {}", errors);
    println!("discarded losers     : {}", discarded.load(Ordering::Relaxed));
    println!(
        "avg latency          : {:.3} ms",
        total_latency.as_secs_f64() * 1000.0 / results.len().max(1) as f64
    );
    println!("worst latency        : {:?}", worst);
    println!("final cutoff         : {:?}", engine.current_cutoff());
    if let Some(snap) = window {
        println!(
            "window               : {} samples, avg {:?}",
            snap.samples, snap.average
        );
    }

    Ok(())
}
