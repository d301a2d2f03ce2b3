use std::time::Duration;

use crate::errors::ConfigError;

/// Default number of primary samples kept by the adaptive estimator.
pub const DEFAULT_WINDOW_SIZE: usize = 100;

/// Strategy used to compute the cutoff before a hedge may start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EstimatorKind {
    /// Always wait `fixed_cutoff`.
    Fixed,
    /// Derive the cutoff from the average of recent primary latencies.
    #[default]
    AdaptivePlus,
}

/// What happens to the branch that did not win a race.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoserPolicy {
    /// Abort the losing task. It stops at its next await point.
    #[default]
    Abort,
    /// Let the loser run to completion in the background and publish its
    /// late result as a discarded event.
    Drain,
}

/// Hedging strategy configuration.
///
/// Built once before any race and shared read-only by every race run
/// through the same engine.
#[derive(Debug, Clone)]
pub struct HedgeConfig {
    /// Which estimator produces the cutoff.
    pub estimator: EstimatorKind,

    /// Cutoff used by [`EstimatorKind::Fixed`]. Required for that kind.
    pub fixed_cutoff: Option<Duration>,

    /// Adaptive factor.
    ///
    /// A percentage of the window average when `factor_is_percentage` is set,
    /// otherwise milliseconds added to it. Zero means "use the average as is".
    pub factor: u64,

    /// Interpret `factor` as a percentage of the average.
    pub factor_is_percentage: bool,

    /// Record failed primary calls in the window as well as successes.
    pub include_errors: bool,

    /// Number of primary samples kept in the sliding window.
    pub window_size: usize,

    /// Maximum number of hedge branches per race.
    ///
    /// Each additional hedge starts one cutoff after the previous one.
    pub max_hedges: usize,

    /// Treatment of branches that lose the race.
    pub loser_policy: LoserPolicy,
}

impl Default for HedgeConfig {
    fn default() -> Self {
        Self {
            estimator: EstimatorKind::AdaptivePlus,
            fixed_cutoff: None,
            factor: 0,
            factor_is_percentage: false,
            include_errors: false,
            window_size: DEFAULT_WINDOW_SIZE,
            max_hedges: 1,
            loser_policy: LoserPolicy::Abort,
        }
    }
}

impl HedgeConfig {
    /// Creates a configuration that always hedges after `cutoff`.
    pub fn fixed(cutoff: Duration) -> Self {
        Self {
            estimator: EstimatorKind::Fixed,
            fixed_cutoff: Some(cutoff),
            ..Self::default()
        }
    }

    /// Creates an adaptive configuration hedging after `percent`% of the
    /// average primary latency.
    pub fn adaptive_percent(percent: u64) -> Self {
        Self {
            estimator: EstimatorKind::AdaptivePlus,
            factor: percent,
            factor_is_percentage: true,
            ..Self::default()
        }
    }

    /// Creates an adaptive configuration hedging `extra_ms` milliseconds
    /// after the average primary latency.
    pub fn adaptive_plus(extra_ms: u64) -> Self {
        Self {
            estimator: EstimatorKind::AdaptivePlus,
            factor: extra_ms,
            factor_is_percentage: false,
            ..Self::default()
        }
    }

    /// Sets the window size.
    pub fn with_window_size(mut self, window_size: usize) -> Self {
        self.window_size = window_size;
        self
    }

    /// Sets whether failed primaries feed the window.
    pub fn with_include_errors(mut self, include_errors: bool) -> Self {
        self.include_errors = include_errors;
        self
    }

    /// Sets the maximum number of hedges per race.
    pub fn with_max_hedges(mut self, max_hedges: usize) -> Self {
        self.max_hedges = max_hedges;
        self
    }

    /// Sets the loser policy.
    pub fn with_loser_policy(mut self, loser_policy: LoserPolicy) -> Self {
        self.loser_policy = loser_policy;
        self
    }

    /// Checks the configuration for values no engine can run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.estimator == EstimatorKind::Fixed && self.fixed_cutoff.is_none() {
            return Err(ConfigError::MissingFixedCutoff);
        }
        if self.window_size == 0 {
            return Err(ConfigError::InvalidWindowSize(self.window_size));
        }
        if self.max_hedges == 0 {
            return Err(ConfigError::InvalidMaxHedges(self.max_hedges));
        }
        Ok(())
    }
}
