//! Cutoff estimation: how long a race waits before starting a hedge.

use std::{sync::Arc, time::Duration};

use crate::{
    config::{EstimatorKind, HedgeConfig},
    errors::ConfigError,
    outcome::Classification,
    window::{SampleOutcome, SlidingWindowStats},
};

/// Cutoff derived from the window average.
#[derive(Debug, Clone)]
pub struct AdaptivePlus {
    stats: Arc<SlidingWindowStats>,
    factor: u64,
    use_percentage: bool,
    include_errors: bool,
}

impl AdaptivePlus {
    pub fn new(factor: u64, use_percentage: bool, include_errors: bool, window_size: usize) -> Self {
        Self {
            stats: Arc::new(SlidingWindowStats::new(window_size)),
            factor,
            use_percentage,
            include_errors,
        }
    }

    pub fn stats(&self) -> &Arc<SlidingWindowStats> {
        &self.stats
    }

    fn get(&self) -> Duration {
        let avg = self.stats.snapshot_average();
        if self.factor == 0 {
            avg
        } else if self.use_percentage {
            let nanos = avg.as_nanos() * u128::from(self.factor) / 100;
            Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
        } else {
            avg.saturating_add(Duration::from_millis(self.factor))
        }
    }

    fn feed(&self, classification: Classification, elapsed: Duration) {
        match classification {
            Classification::PrimarySuccess => self.stats.record(elapsed, SampleOutcome::Success),
            Classification::PrimaryFailure if self.include_errors => {
                self.stats.record(elapsed, SampleOutcome::Error)
            }
            Classification::PrimaryFailure
            | Classification::HedgeSuccess
            | Classification::HedgeFailure => {}
        }
    }
}

/// Strategy producing the cutoff for the next race.
#[derive(Debug, Clone)]
pub enum DurationEstimator {
    /// Always the same cutoff. Ignores every outcome.
    Fixed(Duration),
    /// Average of recent primary latencies, adjusted by a factor.
    AdaptivePlus(AdaptivePlus),
}

impl DurationEstimator {
    /// Builds the estimator selected by `cfg`.
    pub fn from_config(cfg: &HedgeConfig) -> Result<Self, ConfigError> {
        cfg.validate()?;
        match cfg.estimator {
            EstimatorKind::Fixed => cfg
                .fixed_cutoff
                .map(Self::Fixed)
                .ok_or(ConfigError::MissingFixedCutoff),
            EstimatorKind::AdaptivePlus => Ok(Self::AdaptivePlus(AdaptivePlus::new(
                cfg.factor,
                cfg.factor_is_percentage,
                cfg.include_errors,
                cfg.window_size,
            ))),
        }
    }

    /// Current cutoff.
    pub fn get(&self) -> Duration {
        match self {
            Self::Fixed(d) => *d,
            Self::AdaptivePlus(a) => a.get(),
        }
    }

    /// Reports the outcome of a finished race.
    ///
    /// Only primary outcomes are ever recorded; hedge wins say nothing about
    /// how the primary path behaves.
    pub fn feed(&self, classification: Classification, elapsed: Duration) {
        match self {
            Self::Fixed(_) => {}
            Self::AdaptivePlus(a) => a.feed(classification, elapsed),
        }
    }

    /// The shared window, when the estimator keeps one.
    pub fn window(&self) -> Option<&Arc<SlidingWindowStats>> {
        match self {
            Self::Fixed(_) => None,
            Self::AdaptivePlus(a) => Some(a.stats()),
        }
    }
}
