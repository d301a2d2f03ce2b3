//! Simulated workload and race execution for the TUI dashboard.

use std::{future::Future, time::Duration};

use hedged_race::{Branch, RaceEngine};
use tokio::sync::mpsc;

use crate::app::{App, AppEvent};

/// Failure returned by the simulated operation.
#[derive(thiserror::Error, Debug)]
#[error("simulated failure after {0} ms")]
pub struct SimError(pub u64);

/// Latency profile of the simulated remote call.
#[derive(Debug, Clone, Copy)]
pub struct Workload {
    /// Typical latency in milliseconds.
    pub base_ms: u64,
    /// Uniform jitter added to the typical latency.
    pub jitter_ms: u64,
    /// Latency of a call that hits the slow tail.
    pub tail_ms: u64,
    /// Percentage of calls hitting the slow tail.
    pub tail_pct: u32,
    /// Percentage of calls that fail.
    pub fail_pct: u32,
    /// Slow tail can be switched off from the dashboard.
    pub tail_enabled: bool,
}

impl Workload {
    fn sample_latency(&self) -> u64 {
        if self.tail_enabled && fastrand::u32(0..100) < self.tail_pct {
            return self.tail_ms + fastrand::u64(0..=self.jitter_ms);
        }
        self.base_ms + fastrand::u64(0..=self.jitter_ms)
    }

    /// One invocation of the simulated call.
    ///
    /// Latency and failure are drawn when the call is created, so a hedge
    /// gets an independent draw from the primary.
    pub fn call(&self) -> impl Future<Output = Result<u64, SimError>> + Send + 'static {
        let latency = self.sample_latency();
        let fails = fastrand::u32(0..100) < self.fail_pct;
        async move {
            tokio::time::sleep(Duration::from_millis(latency)).await;
            if fails {
                Err(SimError(latency))
            } else {
                Ok(latency)
            }
        }
    }
}

/// Spawns one hedged race using the app's current engine and workload.
///
/// The outcome is reported back through `tx`.
pub fn spawn_race(app: &App, tx: mpsc::UnboundedSender<AppEvent>) {
    let engine: RaceEngine = app.engine.clone();
    let workload = app.workload;

    tokio::spawn(async move {
        let outcome = engine.race(|| workload.call()).await;

        let latency_ms = outcome.elapsed.as_secs_f64() * 1000.0;
        let (ok, message) = match &outcome.result {
            Ok(call_ms) => (true, format!("call took {call_ms} ms")),
            Err(e) => (false, e.to_string()),
        };

        let _ = tx.send(AppEvent::RaceFinished {
            branch: outcome.source,
            latency_ms,
            cutoff_ms: outcome.cutoff.unwrap_or_default().as_secs_f64() * 1000.0,
            ok,
            message,
        });
    });
}

/// Label shown for a winning branch.
pub fn branch_label(branch: Branch) -> &'static str {
    match branch {
        Branch::Primary => "primary",
        Branch::Hedge => "hedge",
    }
}
