//! Application state and logic for the TUI dashboard.

use std::{
    collections::{HashMap, VecDeque},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use color_eyre::Result;
use hedged_race::{Branch, EstimatorKind, HedgeConfig, RaceEngine, RaceEvent, WindowSnapshot};

use crate::sim::Workload;

/// Events emitted by race tasks.
#[derive(Debug)]
pub enum AppEvent {
    /// A race resolved.
    RaceFinished {
        branch: Branch,
        latency_ms: f64,
        cutoff_ms: f64,
        ok: bool,
        message: String,
    },
}

/// Outcome counters fed by the engine's event sink.
#[derive(Debug, Default)]
pub struct EventCounters {
    pub primary_success: AtomicU64,
    pub primary_failure: AtomicU64,
    pub hedge_success: AtomicU64,
    pub hedge_failure: AtomicU64,
    pub discarded: AtomicU64,
}

impl EventCounters {
    /// Registers one consumer per outcome kind on `engine`.
    pub fn attach(self: &Arc<Self>, engine: &RaceEngine) {
        let discarded = Arc::clone(self);

        engine
            .events()
            .on_primary_success(bump(self, |c| &c.primary_success))
            .on_primary_failure(bump(self, |c| &c.primary_failure))
            .on_hedge_success(bump(self, |c| &c.hedge_success))
            .on_hedge_failure(bump(self, |c| &c.hedge_failure))
            .on_discarded(move |_| {
                discarded.discarded.fetch_add(1, Ordering::Relaxed);
            });
    }

    pub fn wins(&self, branch: Branch) -> u64 {
        match branch {
            Branch::Primary => self.primary_success.load(Ordering::Relaxed),
            Branch::Hedge => self.hedge_success.load(Ordering::Relaxed),
        }
    }

    pub fn failures(&self, branch: Branch) -> u64 {
        match branch {
            Branch::Primary => self.primary_failure.load(Ordering::Relaxed),
            Branch::Hedge => self.hedge_failure.load(Ordering::Relaxed),
        }
    }

    pub fn discarded(&self) -> u64 {
        self.discarded.load(Ordering::Relaxed)
    }

    pub fn clear(&self) {
        for counter in [
            &self.primary_success,
            &self.primary_failure,
            &self.hedge_success,
            &self.hedge_failure,
            &self.discarded,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

fn bump(
    counters: &Arc<EventCounters>,
    pick: fn(&EventCounters) -> &AtomicU64,
) -> impl Fn(&RaceEvent) + Send + Sync + 'static {
    let counters = Arc::clone(counters);
    move |_: &RaceEvent| {
        pick(&counters).fetch_add(1, Ordering::Relaxed);
    }
}

/// Main application state for the TUI.
pub struct App {
    pub engine: RaceEngine,
    pub cfg: HedgeConfig,
    pub workload: Workload,
    pub counters: Arc<EventCounters>,
    pub last_message: String,
    pub last_branch: Option<Branch>,
    pub last_latency_ms: Option<f64>,
    pub last_cutoff_ms: Option<f64>,
    pub batch_mode: bool,
    pub batch_count: usize,
    pub batch_current: usize,
    pub session_start: Instant,
    pub total_calls: u64,
    pub total_successes: u64,
    pub total_errors: u64,
    pub latency_history: HashMap<Branch, VecDeque<u64>>,
    pub call_timestamps: VecDeque<Instant>,
}

impl App {
    pub fn new(cfg: HedgeConfig, workload: Workload) -> Result<Self> {
        let engine = RaceEngine::named("dashboard", cfg.clone())?;
        let counters = Arc::new(EventCounters::default());
        counters.attach(&engine);

        let mut latency_history = HashMap::new();
        for branch in [Branch::Primary, Branch::Hedge] {
            latency_history.insert(branch, VecDeque::with_capacity(100));
        }

        Ok(Self {
            engine,
            cfg,
            workload,
            counters,
            last_message: String::from("Ready. Press 'r' to run a race or 'b' for batch mode"),
            last_branch: None,
            last_latency_ms: None,
            last_cutoff_ms: None,
            batch_mode: false,
            batch_count: 10,
            batch_current: 0,
            session_start: Instant::now(),
            total_calls: 0,
            total_successes: 0,
            total_errors: 0,
            latency_history,
            call_timestamps: VecDeque::with_capacity(1000),
        })
    }

    /// Switches between the fixed and adaptive estimator.
    ///
    /// The engine is rebuilt, so the adaptive window starts empty again.
    /// Session totals and branch counters carry over.
    pub fn toggle_estimator(&mut self) -> Result<()> {
        let mut cfg = self.cfg.clone();
        cfg.estimator = match cfg.estimator {
            EstimatorKind::Fixed => EstimatorKind::AdaptivePlus,
            EstimatorKind::AdaptivePlus => EstimatorKind::Fixed,
        };
        if cfg.fixed_cutoff.is_none() {
            cfg.fixed_cutoff = Some(Duration::from_millis(50));
        }
        self.rebuild(cfg)?;
        self.last_message = format!("Estimator: {}", self.estimator_string());
        Ok(())
    }

    /// Drops all statistics and starts over with a fresh engine.
    pub fn reset(&mut self) -> Result<()> {
        self.rebuild(self.cfg.clone())?;
        self.counters.clear();
        self.total_calls = 0;
        self.total_successes = 0;
        self.total_errors = 0;
        self.last_branch = None;
        self.last_latency_ms = None;
        self.last_cutoff_ms = None;
        for history in self.latency_history.values_mut() {
            history.clear();
        }
        self.call_timestamps.clear();
        self.last_message = "Stats reset".to_string();
        Ok(())
    }

    /// Replaces the engine, keeping the same counters.
    ///
    /// Races still running on the old engine keep publishing into them, so
    /// counters and session totals stay in step.
    fn rebuild(&mut self, cfg: HedgeConfig) -> Result<()> {
        let engine = RaceEngine::named("dashboard", cfg.clone())?;
        self.counters.attach(&engine);
        self.engine = engine;
        self.cfg = cfg;
        Ok(())
    }

    pub fn toggle_tail(&mut self) {
        self.workload.tail_enabled = !self.workload.tail_enabled;
        self.last_message = if self.workload.tail_enabled {
            format!("Slow tail ON ({}% at ~{} ms)", self.workload.tail_pct, self.workload.tail_ms)
        } else {
            "Slow tail OFF".to_string()
        };
    }

    pub fn toggle_batch_mode(&mut self) {
        self.batch_mode = !self.batch_mode;
        if self.batch_mode {
            self.batch_current = 0;
            self.last_message = format!("Batch mode ON: {} races queued", self.batch_count);
        } else {
            self.last_message = "Batch mode OFF".to_string();
        }
    }

    pub fn increase_batch_count(&mut self) {
        self.batch_count = (self.batch_count + 10).min(1000);
    }

    pub fn decrease_batch_count(&mut self) {
        self.batch_count = (self.batch_count.saturating_sub(10)).max(10);
    }

    pub fn set_last_result(
        &mut self,
        branch: Branch,
        latency_ms: f64,
        cutoff_ms: f64,
        ok: bool,
        message: String,
    ) {
        self.last_branch = Some(branch);
        self.last_latency_ms = Some(latency_ms);
        self.last_cutoff_ms = Some(cutoff_ms);

        self.total_calls += 1;
        if ok {
            self.total_successes += 1;
        } else {
            self.total_errors += 1;
        }

        let history = self
            .latency_history
            .entry(branch)
            .or_insert_with(|| VecDeque::with_capacity(100));
        history.push_back(latency_ms as u64);
        if history.len() > 100 {
            history.pop_front();
        }

        self.call_timestamps.push_back(Instant::now());
        if self.call_timestamps.len() > 1000 {
            self.call_timestamps.pop_front();
        }

        let status = if ok { "✓" } else { "✗" };
        self.last_message = format!("{} {} ({:.0} ms)", status, message, latency_ms);

        if self.batch_mode {
            self.batch_current += 1;
            if self.batch_current >= self.batch_count {
                self.batch_mode = false;
                self.last_message = format!("Batch complete! {} races finished", self.batch_count);
            }
        }
    }

    pub fn estimator_string(&self) -> String {
        match self.cfg.estimator {
            EstimatorKind::Fixed => format!(
                "Fixed ({} ms)",
                self.cfg.fixed_cutoff.unwrap_or_default().as_millis()
            ),
            EstimatorKind::AdaptivePlus if self.cfg.factor_is_percentage => {
                format!("Adaptive ({}% of avg)", self.cfg.factor)
            }
            EstimatorKind::AdaptivePlus => format!("Adaptive (avg + {} ms)", self.cfg.factor),
        }
    }

    pub fn window_snapshot(&self) -> Option<WindowSnapshot> {
        self.engine.window().map(|w| w.snapshot())
    }

    pub fn current_cutoff_ms(&self) -> f64 {
        self.engine.current_cutoff().as_secs_f64() * 1000.0
    }

    pub fn should_run_call(&self) -> bool {
        self.batch_mode && self.batch_current < self.batch_count
    }

    pub fn session_uptime(&self) -> Duration {
        self.session_start.elapsed()
    }

    pub fn success_rate(&self) -> f64 {
        if self.total_calls > 0 {
            (self.total_successes as f64 / self.total_calls as f64) * 100.0
        } else {
            0.0
        }
    }

    /// Share of resolved races won by a hedge.
    pub fn hedge_rate(&self) -> f64 {
        let hedge = self.counters.wins(Branch::Hedge) + self.counters.failures(Branch::Hedge);
        let primary = self.counters.wins(Branch::Primary) + self.counters.failures(Branch::Primary);
        let total = hedge + primary;
        if total > 0 {
            hedge as f64 / total as f64 * 100.0
        } else {
            0.0
        }
    }

    pub fn calls_per_second(&self) -> f64 {
        let now = Instant::now();
        let one_sec_ago = now - Duration::from_secs(1);

        self.call_timestamps
            .iter()
            .filter(|&&ts| ts > one_sec_ago)
            .count() as f64
    }

    pub fn average_latency(&self) -> f64 {
        let mut total = 0u64;
        let mut count = 0usize;

        for history in self.latency_history.values() {
            for &latency in history {
                total += latency;
                count += 1;
            }
        }

        if count > 0 {
            total as f64 / count as f64
        } else {
            0.0
        }
    }
}
