//! Hedged execution for unreliable or slow async calls.
//!
//! A race starts the protected call immediately. If it has not resolved by
//! a cutoff, a duplicate ("hedge") is started and the first of the two to
//! resolve wins. The loser is cancelled or drained, the winner's latency
//! feeds an estimator that picks the next cutoff, and every outcome is
//! published to registered consumers.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::time::Duration;
//! use hedged_race::{HedgeConfig, RaceEngine};
//!
//! # async fn fetch() -> Result<String, std::io::Error> { Ok(String::new()) }
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // Hedge once the primary is 50% slower than its recent average.
//! let engine = RaceEngine::new(HedgeConfig::adaptive_percent(150))?;
//!
//! engine
//!     .events()
//!     .on_hedge_success(|ev| println!("hedge rescued a slow call after {:?}", ev.elapsed));
//!
//! let body = engine.execute(|| fetch()).await?;
//! # let _ = body;
//! # Ok(())
//! # }
//! ```
//!
//! # Estimators
//!
//! - **Fixed**: always wait the configured cutoff.
//! - **AdaptivePlus**: take the average of the last `window_size` primary
//!   latencies and scale it by a percentage, or add a number of
//!   milliseconds to it.
//!
//! Only primary outcomes are recorded. Failed primaries are recorded only
//! when `include_errors` is set.
//!
//! # What hedging is not
//!
//! A failing primary is not retried: it simply wins the race with its
//! error. The engine does not bound concurrency and keeps no state between
//! races other than the estimator window.

pub mod config;
pub mod engine;
pub mod errors;
pub mod estimator;
pub mod events;
pub mod outcome;
pub mod window;

pub use config::{EstimatorKind, HedgeConfig, LoserPolicy};
pub use engine::RaceEngine;
pub use errors::ConfigError;
pub use estimator::DurationEstimator;
pub use events::{DiscardedEvent, EventSink, RaceEvent};
pub use outcome::{Branch, Classification, RaceOutcome};
pub use window::{SampleOutcome, SlidingWindowStats, WindowSnapshot};
