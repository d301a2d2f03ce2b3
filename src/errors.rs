/// Errors raised while building a [`RaceEngine`](crate::RaceEngine) from a
/// [`HedgeConfig`](crate::HedgeConfig).
///
/// Operation failures are never wrapped in this type: whichever branch wins
/// the race hands its own error back to the caller untouched.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The fixed estimator was selected but no cutoff duration was supplied.
    #[error("fixed estimator selected without a cutoff duration")]
    MissingFixedCutoff,

    /// The sliding window must hold at least one sample.
    #[error("window size must be at least 1, got {0}")]
    InvalidWindowSize(usize),

    /// At least one hedge branch must be allowed per race.
    #[error("max hedges must be at least 1, got {0}")]
    InvalidMaxHedges(usize),
}
