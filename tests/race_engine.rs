//! Integration tests for the hedged race engine.
//!
//! All tests run on a paused tokio clock, so sleeps inside operations
//! resolve in virtual time and latencies are deterministic.

use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use futures::{future::BoxFuture, FutureExt};
use hedged_race::{
    Branch, Classification, ConfigError, EstimatorKind, HedgeConfig, LoserPolicy, RaceEngine,
};

type Reply = Result<&'static str, &'static str>;

fn ms(v: u64) -> Duration {
    Duration::from_millis(v)
}

// ============================================================================
// Scripted operations
// ============================================================================

/// Operation whose n-th invocation sleeps `script[n].0` ms then returns `script[n].1`.
///
/// Invocations past the end of the script repeat the last entry.
struct Scripted {
    script: Vec<(u64, Reply)>,
    calls: AtomicUsize,
    completed: AtomicUsize,
}

impl Scripted {
    fn new(script: Vec<(u64, Reply)>) -> Arc<Self> {
        Arc::new(Self {
            script,
            calls: AtomicUsize::new(0),
            completed: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    fn factory(self: &Arc<Self>) -> impl Fn() -> BoxFuture<'static, Reply> {
        let this = Arc::clone(self);
        move || {
            let idx = this.calls.fetch_add(1, Ordering::SeqCst);
            let (delay, reply) = this.script[idx.min(this.script.len() - 1)];
            let this = Arc::clone(&this);
            async move {
                tokio::time::sleep(ms(delay)).await;
                this.completed.fetch_add(1, Ordering::SeqCst);
                reply
            }
            .boxed()
        }
    }
}

/// Records every published classification.
fn record_events(engine: &RaceEngine) -> Arc<Mutex<Vec<Classification>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let push = |seen: &Arc<Mutex<Vec<Classification>>>| {
        let seen = Arc::clone(seen);
        move |ev: &hedged_race::RaceEvent| seen.lock().unwrap().push(ev.classification)
    };
    engine
        .events()
        .on_primary_success(push(&seen))
        .on_primary_failure(push(&seen))
        .on_hedge_success(push(&seen))
        .on_hedge_failure(push(&seen));
    seen
}

// ============================================================================
// Winner selection
// ============================================================================

#[tokio::test(start_paused = true)]
async fn fast_primary_wins_without_hedge() {
    let engine = RaceEngine::new(HedgeConfig::fixed(ms(50))).unwrap();
    let events = record_events(&engine);
    let op = Scripted::new(vec![(10, Ok("primary")), (1, Ok("hedge"))]);

    let outcome = engine.race(op.factory()).await;

    assert_eq!(outcome.source, Branch::Primary);
    assert_eq!(outcome.classification(), Classification::PrimarySuccess);
    assert!(outcome.elapsed >= ms(10) && outcome.elapsed < ms(15));
    assert_eq!(outcome.result, Ok("primary"));

    // Timer never fires afterwards.
    tokio::time::sleep(ms(100)).await;
    assert_eq!(op.calls(), 1);
    assert_eq!(*events.lock().unwrap(), vec![Classification::PrimarySuccess]);
}

#[tokio::test(start_paused = true)]
async fn slow_primary_loses_to_hedge() {
    let engine = RaceEngine::new(HedgeConfig::fixed(ms(10))).unwrap();
    let events = record_events(&engine);
    let op = Scripted::new(vec![(200, Ok("primary")), (20, Ok("hedge"))]);

    let outcome = engine.race(op.factory()).await;

    assert_eq!(outcome.source, Branch::Hedge);
    assert_eq!(outcome.result, Ok("hedge"));
    assert!(outcome.elapsed >= ms(30) && outcome.elapsed < ms(35));
    assert_eq!(outcome.cutoff, Some(ms(10)));
    assert_eq!(op.calls(), 2);
    assert_eq!(*events.lock().unwrap(), vec![Classification::HedgeSuccess]);
}

#[tokio::test(start_paused = true)]
async fn hedge_win_does_not_feed_window() {
    let engine = RaceEngine::new(HedgeConfig::adaptive_plus(10)).unwrap();
    let op = Scripted::new(vec![(200, Ok("primary")), (20, Ok("hedge"))]);

    let value = engine.execute(op.factory()).await;
    assert_eq!(value, Ok("hedge"));

    tokio::time::sleep(ms(500)).await;
    assert!(engine.window().unwrap().is_empty());
    assert_eq!(engine.current_cutoff(), ms(10));
}

#[tokio::test(start_paused = true)]
async fn aborted_loser_never_completes() {
    let engine = RaceEngine::new(HedgeConfig::fixed(ms(10))).unwrap();
    let op = Scripted::new(vec![(200, Ok("primary")), (20, Ok("hedge"))]);

    engine.execute(op.factory()).await.unwrap();
    tokio::time::sleep(ms(500)).await;

    // Only the hedge ran to the end; the primary was aborted mid-sleep.
    assert_eq!(op.completed(), 1);
}

#[tokio::test(start_paused = true)]
async fn drained_loser_is_published_as_discarded() {
    let cfg = HedgeConfig::adaptive_plus(10).with_loser_policy(LoserPolicy::Drain);
    let engine = RaceEngine::new(cfg).unwrap();
    let discarded = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&discarded);
    engine
        .events()
        .on_discarded(move |ev| sink.lock().unwrap().push((ev.classification, ev.elapsed)));
    let op = Scripted::new(vec![(200, Ok("primary")), (20, Ok("hedge"))]);

    assert_eq!(engine.execute(op.factory()).await, Ok("hedge"));
    assert!(discarded.lock().unwrap().is_empty());

    tokio::time::sleep(ms(300)).await;

    let discarded = discarded.lock().unwrap();
    assert_eq!(discarded.len(), 1);
    assert_eq!(discarded[0].0, Classification::PrimarySuccess);
    assert!(discarded[0].1 >= ms(200));
    assert_eq!(op.completed(), 2);
    assert!(engine.window().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn primary_finishing_exactly_at_cutoff_still_wins() {
    // Empty window, so the cutoff is the flat 10ms.
    let engine = RaceEngine::new(HedgeConfig::adaptive_plus(10)).unwrap();
    let events = record_events(&engine);
    let op = Scripted::new(vec![(10, Ok("primary")), (1, Ok("hedge"))]);

    let outcome = engine.race(op.factory()).await;

    assert_eq!(outcome.source, Branch::Primary);
    assert_eq!(outcome.result, Ok("primary"));
    assert_eq!(outcome.cutoff, Some(ms(10)));

    tokio::time::sleep(ms(100)).await;
    // The hedge may or may not have been started at the tie, never more.
    assert!((1..=2).contains(&op.calls()));
    assert_eq!(*events.lock().unwrap(), vec![Classification::PrimarySuccess]);
    assert_eq!(engine.window().unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn overlapping_races_start_at_most_one_hedge_each() {
    const RACES: usize = 20;
    let engine = RaceEngine::new(HedgeConfig::fixed(ms(10))).unwrap();
    let events = record_events(&engine);

    let ops: Vec<_> = (0..RACES)
        .map(|_| Scripted::new(vec![(100, Ok("primary")), (5, Ok("hedge"))]))
        .collect();
    let races: Vec<_> = ops
        .iter()
        .map(|op| {
            let engine = engine.clone();
            let factory = op.factory();
            tokio::spawn(async move { engine.execute(factory).await })
        })
        .collect();
    for race in races {
        assert_eq!(race.await.unwrap(), Ok("hedge"));
    }

    tokio::time::sleep(ms(500)).await;
    let calls: usize = ops.iter().map(|op| op.calls()).sum();
    assert!(calls <= 2 * RACES);
    let events = events.lock().unwrap();
    assert_eq!(events.len(), RACES);
    assert!(events.iter().all(|c| *c == Classification::HedgeSuccess));
}

#[tokio::test(start_paused = true)]
async fn panicking_drained_loser_is_not_published() {
    let cfg = HedgeConfig::fixed(ms(10)).with_loser_policy(LoserPolicy::Drain);
    let engine = RaceEngine::new(cfg).unwrap();
    let discarded = Arc::new(AtomicUsize::new(0));
    let d = Arc::clone(&discarded);
    engine.events().on_discarded(move |_| {
        d.fetch_add(1, Ordering::SeqCst);
    });
    let calls = Arc::new(AtomicUsize::new(0));
    let c = Arc::clone(&calls);

    let outcome = engine
        .race(move || {
            let primary = c.fetch_add(1, Ordering::SeqCst) == 0;
            async move {
                if primary {
                    tokio::time::sleep(ms(200)).await;
                    panic!("primary blew up after losing");
                }
                tokio::time::sleep(ms(20)).await;
                let reply: Reply = Ok("hedge");
                reply
            }
            .boxed()
        })
        .await;

    assert_eq!(outcome.source, Branch::Hedge);
    assert_eq!(outcome.result, Ok("hedge"));

    tokio::time::sleep(ms(500)).await;
    assert_eq!(discarded.load(Ordering::SeqCst), 0);
}

// ============================================================================
// Failures
// ============================================================================

#[tokio::test(start_paused = true)]
async fn primary_failure_before_cutoff_is_not_retried() {
    let engine = RaceEngine::new(HedgeConfig::adaptive_plus(50)).unwrap();
    let events = record_events(&engine);
    let op = Scripted::new(vec![(5, Err("boom")), (1, Ok("hedge"))]);

    let result = engine.execute(op.factory()).await;
    assert_eq!(result, Err("boom"));

    tokio::time::sleep(ms(100)).await;
    assert_eq!(op.calls(), 1);
    assert_eq!(*events.lock().unwrap(), vec![Classification::PrimaryFailure]);
    assert!(engine.window().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn primary_failure_recorded_when_errors_included() {
    let cfg = HedgeConfig::adaptive_plus(50).with_include_errors(true);
    let engine = RaceEngine::new(cfg).unwrap();
    let op = Scripted::new(vec![(5, Err("boom"))]);

    assert_eq!(engine.execute(op.factory()).await, Err("boom"));

    let snap = engine.window().unwrap().snapshot();
    assert_eq!(snap.samples, 1);
    assert_eq!(snap.errors, 1);
}

#[tokio::test(start_paused = true)]
async fn hedge_failure_can_win() {
    let engine = RaceEngine::new(HedgeConfig::fixed(ms(10))).unwrap();
    let events = record_events(&engine);
    let op = Scripted::new(vec![(200, Ok("primary")), (5, Err("hedge down"))]);

    let outcome = engine.race(op.factory()).await;
    assert_eq!(outcome.classification(), Classification::HedgeFailure);
    assert_eq!(outcome.result, Err("hedge down"));
    assert_eq!(*events.lock().unwrap(), vec![Classification::HedgeFailure]);
}

#[tokio::test(start_paused = true)]
async fn primary_construction_failure_surfaces_immediately() {
    let engine = RaceEngine::new(HedgeConfig::fixed(ms(10))).unwrap();
    let events = record_events(&engine);
    let calls = Arc::new(AtomicUsize::new(0));
    let c = Arc::clone(&calls);

    let outcome = engine
        .try_race(move || {
            c.fetch_add(1, Ordering::SeqCst);
            Err::<futures::future::Ready<Reply>, _>("cannot build request")
        })
        .await;

    assert_eq!(outcome.classification(), Classification::PrimaryFailure);
    assert_eq!(outcome.elapsed, Duration::ZERO);
    assert_eq!(outcome.result, Err("cannot build request"));
    assert_eq!(outcome.cutoff, None);

    tokio::time::sleep(ms(100)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(*events.lock().unwrap(), vec![Classification::PrimaryFailure]);
}

#[tokio::test(start_paused = true)]
async fn hedge_construction_failure_wins_while_primary_pending() {
    let engine = RaceEngine::new(HedgeConfig::fixed(ms(10))).unwrap();
    let op = Scripted::new(vec![(200, Ok("primary"))]);
    let primary = op.factory();
    let calls = Arc::new(AtomicUsize::new(0));
    let c = Arc::clone(&calls);

    let outcome = engine
        .try_race(move || {
            if c.fetch_add(1, Ordering::SeqCst) == 0 {
                Ok(primary())
            } else {
                Err("hedge build failed")
            }
        })
        .await;

    assert_eq!(outcome.source, Branch::Hedge);
    assert_eq!(outcome.result, Err("hedge build failed"));
    assert!(outcome.elapsed >= ms(10) && outcome.elapsed < ms(15));
}

#[tokio::test(start_paused = true)]
async fn panicking_consumer_does_not_affect_result() {
    let engine = RaceEngine::new(HedgeConfig::fixed(ms(50))).unwrap();
    engine
        .events()
        .on_primary_success(|_| panic!("exporter crashed"));
    let op = Scripted::new(vec![(5, Ok("primary"))]);

    assert_eq!(engine.execute(op.factory()).await, Ok("primary"));
}

// ============================================================================
// Cancellation
// ============================================================================

#[tokio::test(start_paused = true)]
async fn cancelling_before_cutoff_stops_everything() {
    let engine = RaceEngine::new(HedgeConfig::adaptive_plus(10)).unwrap();
    let events = record_events(&engine);
    let op = Scripted::new(vec![(100, Ok("primary")), (100, Ok("hedge"))]);

    let res = tokio::time::timeout(ms(5), engine.execute(op.factory())).await;
    assert!(res.is_err());

    tokio::time::sleep(ms(500)).await;
    assert_eq!(op.calls(), 1);
    assert_eq!(op.completed(), 0);
    assert!(events.lock().unwrap().is_empty());
    assert!(engine.window().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn cancelling_after_hedge_start_aborts_both_branches() {
    let engine = RaceEngine::new(HedgeConfig::fixed(ms(10))).unwrap();
    let events = record_events(&engine);
    let op = Scripted::new(vec![(100, Ok("primary")), (100, Ok("hedge"))]);

    let res = tokio::time::timeout(ms(15), engine.execute(op.factory())).await;
    assert!(res.is_err());

    tokio::time::sleep(ms(500)).await;
    assert_eq!(op.calls(), 2);
    assert_eq!(op.completed(), 0);
    assert!(events.lock().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn cancelling_with_drain_policy_still_aborts_both_branches() {
    let cfg = HedgeConfig::fixed(ms(10)).with_loser_policy(LoserPolicy::Drain);
    let engine = RaceEngine::new(cfg).unwrap();
    let events = record_events(&engine);
    let discarded = Arc::new(AtomicUsize::new(0));
    let d = Arc::clone(&discarded);
    engine.events().on_discarded(move |_| {
        d.fetch_add(1, Ordering::SeqCst);
    });
    let op = Scripted::new(vec![(100, Ok("primary")), (100, Ok("hedge"))]);

    let res = tokio::time::timeout(ms(15), engine.execute(op.factory())).await;
    assert!(res.is_err());

    // Drain only applies once a winner exists.
    tokio::time::sleep(ms(500)).await;
    assert_eq!(op.calls(), 2);
    assert_eq!(op.completed(), 0);
    assert_eq!(discarded.load(Ordering::SeqCst), 0);
    assert!(events.lock().unwrap().is_empty());
}

// ============================================================================
// Adaptive cutoff & sharing
// ============================================================================

#[tokio::test(start_paused = true)]
async fn cutoff_tracks_primary_latency() {
    let cfg = HedgeConfig::adaptive_percent(50).with_window_size(3);
    let engine = RaceEngine::new(cfg).unwrap();

    // Empty window: cutoff is zero, so the first race hedges straight away.
    assert_eq!(engine.current_cutoff(), Duration::ZERO);

    // Seed the window through the estimator the races feed.
    for v in [10, 20, 30] {
        engine
            .estimator()
            .feed(Classification::PrimarySuccess, ms(v));
    }
    assert_eq!(engine.current_cutoff(), ms(10));

    // A primary that answers in 4ms beats the 10ms cutoff and is recorded.
    let op = Scripted::new(vec![(4, Ok("primary"))]);
    assert_eq!(engine.execute(op.factory()).await, Ok("primary"));
    assert_eq!(op.calls(), 1);

    let window = engine.window().unwrap();
    assert_eq!(window.len(), 3);
    // Window now holds [20, 30, ~4].
    assert!(window.snapshot_average() >= ms(18) && window.snapshot_average() < ms(19));
}

#[tokio::test(start_paused = true)]
async fn additional_hedges_start_one_cutoff_apart() {
    let cfg = HedgeConfig::fixed(ms(10)).with_max_hedges(2);
    let engine = RaceEngine::new(cfg).unwrap();
    let op = Scripted::new(vec![
        (100, Ok("primary")),
        (100, Ok("hedge-1")),
        (5, Ok("hedge-2")),
    ]);

    let outcome = engine.race(op.factory()).await;
    assert_eq!(outcome.source, Branch::Hedge);
    assert_eq!(outcome.result, Ok("hedge-2"));
    assert!(outcome.elapsed >= ms(25) && outcome.elapsed < ms(30));
    assert_eq!(op.calls(), 3);

    tokio::time::sleep(ms(200)).await;
    assert_eq!(op.calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn concurrent_races_share_one_window() {
    let cfg = HedgeConfig::adaptive_plus(1_000).with_window_size(1_000);
    let engine = RaceEngine::new(cfg).unwrap();
    let hedges = Arc::new(AtomicUsize::new(0));
    let h = Arc::clone(&hedges);
    engine.events().on_hedge_success(move |_| {
        h.fetch_add(1, Ordering::SeqCst);
    });
    let op = Scripted::new(vec![(5, Ok("primary"))]);

    let races: Vec<_> = (0..64)
        .map(|_| {
            let engine = engine.clone();
            let factory = op.factory();
            tokio::spawn(async move { engine.execute(factory).await })
        })
        .collect();
    for race in races {
        assert_eq!(race.await.unwrap(), Ok("primary"));
    }

    assert_eq!(op.calls(), 64);
    assert_eq!(hedges.load(Ordering::SeqCst), 0);
    assert_eq!(engine.window().unwrap().len(), 64);
}

#[tokio::test(start_paused = true)]
async fn window_overwrites_under_concurrency() {
    let cfg = HedgeConfig::adaptive_plus(1_000).with_window_size(10);
    let engine = RaceEngine::new(cfg).unwrap();
    let op = Scripted::new(vec![(5, Ok("primary"))]);

    let races: Vec<_> = (0..32)
        .map(|_| {
            let engine = engine.clone();
            let factory = op.factory();
            tokio::spawn(async move { engine.execute(factory).await })
        })
        .collect();
    for race in races {
        race.await.unwrap().unwrap();
    }

    assert_eq!(engine.window().unwrap().len(), 10);
}

// ============================================================================
// Construction
// ============================================================================

#[test]
fn invalid_config_is_rejected_at_construction() {
    let cfg = HedgeConfig {
        estimator: EstimatorKind::Fixed,
        fixed_cutoff: None,
        ..HedgeConfig::default()
    };
    assert_eq!(
        RaceEngine::new(cfg).unwrap_err(),
        ConfigError::MissingFixedCutoff
    );

    let cfg = HedgeConfig::adaptive_percent(50).with_window_size(0);
    assert_eq!(
        RaceEngine::new(cfg).unwrap_err(),
        ConfigError::InvalidWindowSize(0)
    );
}
