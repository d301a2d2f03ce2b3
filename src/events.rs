//! Race observability: consumers registered per outcome kind.

use std::{
    panic::{self, AssertUnwindSafe},
    sync::{Arc, PoisonError, RwLock},
    time::Duration,
};

use crate::outcome::Classification;

/// Published once per resolved race, for the winning branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RaceEvent {
    pub classification: Classification,
    /// Time from race start until the winner resolved.
    pub elapsed: Duration,
}

/// Published when a drained loser finally resolves.
///
/// Its result was never seen by the caller and never fed the estimator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiscardedEvent {
    pub classification: Classification,
    /// Time from race start until the loser resolved.
    pub elapsed: Duration,
}

type RaceConsumer = Arc<dyn Fn(&RaceEvent) + Send + Sync>;
type DiscardedConsumer = Arc<dyn Fn(&DiscardedEvent) + Send + Sync>;

#[derive(Default)]
struct Consumers {
    primary_success: Vec<RaceConsumer>,
    primary_failure: Vec<RaceConsumer>,
    hedge_success: Vec<RaceConsumer>,
    hedge_failure: Vec<RaceConsumer>,
    discarded: Vec<DiscardedConsumer>,
}

impl Consumers {
    fn for_kind(&mut self, classification: Classification) -> &mut Vec<RaceConsumer> {
        match classification {
            Classification::PrimarySuccess => &mut self.primary_success,
            Classification::PrimaryFailure => &mut self.primary_failure,
            Classification::HedgeSuccess => &mut self.hedge_success,
            Classification::HedgeFailure => &mut self.hedge_failure,
        }
    }

    fn matching(&self, classification: Classification) -> Vec<RaceConsumer> {
        match classification {
            Classification::PrimarySuccess => self.primary_success.clone(),
            Classification::PrimaryFailure => self.primary_failure.clone(),
            Classification::HedgeSuccess => self.hedge_success.clone(),
            Classification::HedgeFailure => self.hedge_failure.clone(),
        }
    }
}

/// Multi-consumer publisher for race outcomes.
///
/// Delivery is synchronous on the task that resolved the race. A consumer
/// that panics is logged and skipped; the rest still run and the race
/// result is unaffected.
///
/// ```
/// use hedged_race::EventSink;
///
/// let sink = EventSink::new();
/// sink.on_primary_success(|ev| println!("primary won in {:?}", ev.elapsed))
///     .on_hedge_success(|ev| println!("hedge won in {:?}", ev.elapsed));
/// ```
#[derive(Default)]
pub struct EventSink {
    consumers: RwLock<Consumers>,
}

impl std::fmt::Debug for EventSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSink").finish_non_exhaustive()
    }
}

impl EventSink {
    pub fn new() -> Self {
        Self::default()
    }

    fn register<F>(&self, classification: Classification, consumer: F) -> &Self
    where
        F: Fn(&RaceEvent) + Send + Sync + 'static,
    {
        self.consumers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .for_kind(classification)
            .push(Arc::new(consumer));
        self
    }

    pub fn on_primary_success<F>(&self, consumer: F) -> &Self
    where
        F: Fn(&RaceEvent) + Send + Sync + 'static,
    {
        self.register(Classification::PrimarySuccess, consumer)
    }

    pub fn on_primary_failure<F>(&self, consumer: F) -> &Self
    where
        F: Fn(&RaceEvent) + Send + Sync + 'static,
    {
        self.register(Classification::PrimaryFailure, consumer)
    }

    pub fn on_hedge_success<F>(&self, consumer: F) -> &Self
    where
        F: Fn(&RaceEvent) + Send + Sync + 'static,
    {
        self.register(Classification::HedgeSuccess, consumer)
    }

    pub fn on_hedge_failure<F>(&self, consumer: F) -> &Self
    where
        F: Fn(&RaceEvent) + Send + Sync + 'static,
    {
        self.register(Classification::HedgeFailure, consumer)
    }

    /// Registers a consumer for late results of drained losers.
    pub fn on_discarded<F>(&self, consumer: F) -> &Self
    where
        F: Fn(&DiscardedEvent) + Send + Sync + 'static,
    {
        self.consumers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .discarded
            .push(Arc::new(consumer));
        self
    }

    /// Delivers `event` to every consumer registered for its kind.
    pub fn publish(&self, event: RaceEvent) {
        // Snapshot so consumers may register more consumers without deadlocking.
        let targets = self
            .consumers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .matching(event.classification);
        for consumer in targets {
            deliver(event.classification, || consumer(&event));
        }
    }

    /// Delivers a late loser result to the discarded consumers.
    pub fn publish_discarded(&self, event: DiscardedEvent) {
        let targets = self
            .consumers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .discarded
            .clone();
        for consumer in targets {
            deliver(event.classification, || consumer(&event));
        }
    }
}

fn deliver(classification: Classification, call: impl FnOnce()) {
    if panic::catch_unwind(AssertUnwindSafe(call)).is_err() {
        tracing::warn!(?classification, "event consumer panicked; skipping it");
    }
}
