//! Environment configuration for the dashboard's hedge engine and workload.

use std::{
    env::{self, VarError},
    str::FromStr,
    time::Duration,
};

use color_eyre::{eyre::eyre, Result};
use hedged_race::{EstimatorKind, HedgeConfig, LoserPolicy};

use crate::sim::Workload;

fn var<T: FromStr>(key: &str) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    parse_var(key, env::var(key))
}

/// Unset means "use the default"; a value that is not valid unicode is an error.
fn parse_var<T: FromStr>(key: &str, lookup: Result<String, VarError>) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    match lookup {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| eyre!("invalid {key}={raw:?}: {e}")),
        Err(VarError::NotPresent) => Ok(None),
        Err(VarError::NotUnicode(raw)) => Err(eyre!("{key} is not valid unicode: {raw:?}")),
    }
}

fn parse_strategy(lookup: Result<String, VarError>) -> Result<EstimatorKind> {
    match lookup.as_deref() {
        Ok("fixed") => Ok(EstimatorKind::Fixed),
        Ok("adaptive") | Err(VarError::NotPresent) => Ok(EstimatorKind::AdaptivePlus),
        Ok(other) => color_eyre::eyre::bail!(
            "unknown HEDGE_STRATEGY {other:?}; expected \"fixed\" or \"adaptive\""
        ),
        Err(VarError::NotUnicode(raw)) => {
            color_eyre::eyre::bail!("HEDGE_STRATEGY is not valid unicode: {raw:?}")
        }
    }
}

/// Builds the hedge configuration from environment variables.
///
/// Recognised variables:
/// - `HEDGE_STRATEGY`: `fixed` or `adaptive` (default `adaptive`)
/// - `HEDGE_CUTOFF_MS`: fixed cutoff (default 50)
/// - `HEDGE_FACTOR`: adaptive factor (default 150)
/// - `HEDGE_PERCENT`: factor is a percentage (default `true`)
/// - `HEDGE_INCLUDE_ERRORS`: record failed primaries (default `false`)
/// - `HEDGE_WINDOW`: window size (default 100)
/// - `HEDGE_MAX`: hedges per race (default 1)
/// - `HEDGE_DRAIN_LOSERS`: let losers finish instead of aborting (default `false`)
pub fn hedge_config_from_env() -> Result<HedgeConfig> {
    let estimator = parse_strategy(env::var("HEDGE_STRATEGY"))?;

    let cfg = HedgeConfig {
        estimator,
        fixed_cutoff: Some(Duration::from_millis(
            var("HEDGE_CUTOFF_MS")?.unwrap_or(50),
        )),
        factor: var("HEDGE_FACTOR")?.unwrap_or(150),
        factor_is_percentage: var("HEDGE_PERCENT")?.unwrap_or(true),
        include_errors: var("HEDGE_INCLUDE_ERRORS")?.unwrap_or(false),
        window_size: var("HEDGE_WINDOW")?.unwrap_or(100),
        max_hedges: var("HEDGE_MAX")?.unwrap_or(1),
        loser_policy: if var("HEDGE_DRAIN_LOSERS")?.unwrap_or(false) {
            LoserPolicy::Drain
        } else {
            LoserPolicy::Abort
        },
    };
    cfg.validate()?;
    Ok(cfg)
}

/// Builds the simulated workload from environment variables.
///
/// - `SIM_BASE_MS`: typical latency (default 40)
/// - `SIM_JITTER_MS`: uniform jitter on top of it (default 20)
/// - `SIM_TAIL_MS`: latency of a slow-tail call (default 400)
/// - `SIM_TAIL_PCT`: share of calls that hit the tail (default 10)
/// - `SIM_FAIL_PCT`: share of calls that fail (default 2)
pub fn workload_from_env() -> Result<Workload> {
    let tail_pct: u32 = var("SIM_TAIL_PCT")?.unwrap_or(10);
    let fail_pct: u32 = var("SIM_FAIL_PCT")?.unwrap_or(2);
    if tail_pct > 100 || fail_pct > 100 {
        color_eyre::eyre::bail!("SIM_TAIL_PCT and SIM_FAIL_PCT must be between 0 and 100");
    }

    Ok(Workload {
        base_ms: var("SIM_BASE_MS")?.unwrap_or(40),
        jitter_ms: var("SIM_JITTER_MS")?.unwrap_or(20),
        tail_ms: var("SIM_TAIL_MS")?.unwrap_or(400),
        tail_pct,
        fail_pct,
        tail_enabled: true,
    })
}
