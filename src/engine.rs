use std::{
    future::Future,
    panic,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
    time::Duration,
};

use futures::{stream::FuturesUnordered, StreamExt};
use tokio::{
    task::{JoinError, JoinHandle},
    time::{self, Instant},
};

use crate::{
    config::{HedgeConfig, LoserPolicy},
    errors::ConfigError,
    estimator::DurationEstimator,
    events::{DiscardedEvent, EventSink, RaceEvent},
    outcome::{Branch, Classification, RaceOutcome},
    window::SlidingWindowStats,
};

/// A spawned branch of a race.
///
/// Aborts its task when dropped unless it has been detached, so dropping a
/// race mid-flight cancels every branch still running.
struct BranchTask<T> {
    branch: Branch,
    handle: JoinHandle<T>,
    abort_on_drop: bool,
}

impl<T> BranchTask<T> {
    fn spawn<Fut>(branch: Branch, fut: Fut) -> Self
    where
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        Self {
            branch,
            handle: tokio::spawn(fut),
            abort_on_drop: true,
        }
    }

    fn detach(&mut self) {
        self.abort_on_drop = false;
    }
}

impl<T> Future for BranchTask<T> {
    type Output = (Branch, Result<T, JoinError>);

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let branch = this.branch;
        Pin::new(&mut this.handle).poll(cx).map(|res| (branch, res))
    }
}

impl<T> Drop for BranchTask<T> {
    fn drop(&mut self) {
        if self.abort_on_drop {
            self.handle.abort();
        }
    }
}

/// Races a primary call against delayed hedges of the same call.
///
/// One engine corresponds to one named hedge instance: its estimator window
/// and event sink are shared by every race run through it, and clones share
/// them too.
///
/// ```no_run
/// use std::time::Duration;
/// use hedged_race::{HedgeConfig, RaceEngine};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let engine = RaceEngine::new(HedgeConfig::fixed(Duration::from_millis(50)))?;
///
/// let value = engine
///     .execute(|| async {
///         tokio::time::sleep(Duration::from_millis(10)).await;
///         Ok::<_, std::io::Error>(42)
///     })
///     .await?;
/// assert_eq!(value, 42);
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct RaceEngine {
    name: Arc<str>,
    cfg: Arc<HedgeConfig>,
    estimator: Arc<DurationEstimator>,
    events: Arc<EventSink>,
}

impl RaceEngine {
    /// Creates an engine named `"hedge"`.
    ///
    /// Fails if `cfg` does not validate.
    pub fn new(cfg: HedgeConfig) -> Result<Self, ConfigError> {
        Self::named("hedge", cfg)
    }

    /// Creates an engine whose log lines carry `name`.
    pub fn named(name: impl Into<Arc<str>>, cfg: HedgeConfig) -> Result<Self, ConfigError> {
        let estimator = DurationEstimator::from_config(&cfg)?;
        Ok(Self {
            name: name.into(),
            cfg: Arc::new(cfg),
            estimator: Arc::new(estimator),
            events: Arc::new(EventSink::new()),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &HedgeConfig {
        &self.cfg
    }

    /// Registration surface for race outcome consumers.
    pub fn events(&self) -> &EventSink {
        &self.events
    }

    pub fn estimator(&self) -> &DurationEstimator {
        &self.estimator
    }

    /// Cutoff the next race would use.
    pub fn current_cutoff(&self) -> Duration {
        self.estimator.get()
    }

    /// Shared latency window, when the estimator is adaptive.
    pub fn window(&self) -> Option<&Arc<SlidingWindowStats>> {
        self.estimator.window()
    }

    /// Runs a hedged race and returns the winner's result.
    ///
    /// `factory` may be invoked more than once per call. Every invocation
    /// must produce an independent future that is safe to run alongside
    /// the others.
    pub async fn execute<T, E, F, Fut>(&self, factory: F) -> Result<T, E>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
    {
        self.race(factory).await.into_result()
    }

    /// Like [`execute`](Self::execute), for factories that can fail while
    /// building the call.
    pub async fn try_execute<T, E, F, Fut>(&self, factory: F) -> Result<T, E>
    where
        F: Fn() -> Result<Fut, E>,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
    {
        self.try_race(factory).await.into_result()
    }

    /// Runs a hedged race and returns the full winning outcome.
    pub async fn race<T, E, F, Fut>(&self, factory: F) -> RaceOutcome<T, E>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
    {
        self.try_race(|| Ok::<_, E>(factory())).await
    }

    /// Core hedged race.
    ///
    /// 1. Starts the primary immediately.
    /// 2. Arms a timer for the estimator's cutoff.
    /// 3. Each time the timer fires with nothing resolved, starts a hedge
    ///    (up to `max_hedges`), re-arming for the next one.
    /// 4. The first branch to resolve wins, success or failure.
    ///
    /// The winner is fed to the estimator and published; losers are handled
    /// per [`LoserPolicy`]. If the returned future is dropped before a
    /// winner exists, all branches are aborted and nothing is recorded.
    pub async fn try_race<T, E, F, Fut>(&self, factory: F) -> RaceOutcome<T, E>
    where
        F: Fn() -> Result<Fut, E>,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
    {
        let start = Instant::now();

        let mut branches = FuturesUnordered::new();
        match factory() {
            Ok(fut) => branches.push(BranchTask::spawn(Branch::Primary, fut)),
            Err(err) => return self.settle(Branch::Primary, Err(err), start.elapsed(), None),
        }

        let cutoff = self.estimator.get();
        let max_hedges = self.cfg.max_hedges;
        let mut hedges_started = 0usize;
        let hedge_sleep = time::sleep(cutoff);
        tokio::pin!(hedge_sleep);

        let (winner, result) = loop {
            tokio::select! {
                biased;

                Some((branch, joined)) = branches.next(), if !branches.is_empty() => {
                    match joined {
                        Ok(result) => break (branch, result),
                        Err(err) if err.is_panic() => panic::resume_unwind(err.into_panic()),
                        // Only runtime shutdown cancels a branch we still hold.
                        Err(_) => continue,
                    }
                }
                _ = &mut hedge_sleep, if hedges_started < max_hedges => {
                    hedges_started += 1;
                    tracing::debug!(
                        engine = %self.name,
                        hedge = hedges_started,
                        ?cutoff,
                        "no result within cutoff, starting hedge"
                    );
                    match factory() {
                        Ok(fut) => branches.push(BranchTask::spawn(Branch::Hedge, fut)),
                        Err(err) => branches.push(BranchTask::spawn(
                            Branch::Hedge,
                            futures::future::ready(Err(err)),
                        )),
                    }
                    if hedges_started < max_hedges {
                        hedge_sleep.as_mut().reset(Instant::now() + cutoff);
                    }
                }
                else => {
                    return std::future::pending().await;
                }
            }
        };

        let elapsed = start.elapsed();
        self.release_losers(branches, start);
        self.settle(winner, result, elapsed, Some(cutoff))
    }

    fn settle<T, E>(
        &self,
        source: Branch,
        result: Result<T, E>,
        elapsed: Duration,
        cutoff: Option<Duration>,
    ) -> RaceOutcome<T, E> {
        let classification = Classification::new(source, result.is_ok());
        tracing::trace!(engine = %self.name, ?classification, ?elapsed, "race resolved");

        self.estimator.feed(classification, elapsed);
        self.events.publish(RaceEvent {
            classification,
            elapsed,
        });

        RaceOutcome {
            source,
            result,
            elapsed,
            cutoff,
        }
    }

    fn release_losers<T, E>(
        &self,
        mut losers: FuturesUnordered<BranchTask<Result<T, E>>>,
        start: Instant,
    ) where
        T: Send + 'static,
        E: Send + 'static,
    {
        if losers.is_empty() {
            return;
        }

        match self.cfg.loser_policy {
            LoserPolicy::Abort => drop(losers),
            LoserPolicy::Drain => {
                for task in losers.iter_mut() {
                    task.detach();
                }
                let events = Arc::clone(&self.events);
                let name = Arc::clone(&self.name);
                tokio::spawn(async move {
                    while let Some((branch, joined)) = losers.next().await {
                        let result = match joined {
                            Ok(result) => result,
                            Err(err) => {
                                if err.is_panic() {
                                    tracing::warn!(engine = %name, ?branch, "drained loser panicked");
                                }
                                continue;
                            }
                        };
                        let classification = Classification::new(branch, result.is_ok());
                        let elapsed = start.elapsed();
                        tracing::trace!(engine = %name, ?classification, ?elapsed, "loser resolved");
                        events.publish_discarded(DiscardedEvent {
                            classification,
                            elapsed,
                        });
                    }
                });
            }
        }
    }
}
