//! Demo runtime configuration.
//!
//! Knobs for the simulated environment: artificial latency, failure rate
//! and seed, and the cache staleness window. Defaults match the demo this
//! replaces; `REQUERY_*` environment variables override them for the demo
//! binary. The library itself takes everything by constructor argument.

use std::time::Duration;

use tracing::warn;

const ENV_LATENCY_MS: &str = "REQUERY_LATENCY_MS";
const ENV_FAILURE_RATE: &str = "REQUERY_FAILURE_RATE";
const ENV_FAILURE_SEED: &str = "REQUERY_FAILURE_SEED";
const ENV_STALE_AFTER_SECS: &str = "REQUERY_STALE_AFTER_SECS";

#[derive(Debug, Clone)]
pub struct Config {
    /// Artificial latency of every simulated call, in milliseconds.
    pub latency_ms: u64,
    /// Failure rate of the full-list fetch (0.0..=1.0).
    pub failure_rate: f64,
    /// Seed for the failure injector; `None` seeds from entropy.
    pub failure_seed: Option<u64>,
    /// Seconds after which a cached success goes stale.
    pub stale_after_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            latency_ms: 1000,
            failure_rate: 0.1,
            failure_seed: None,
            stale_after_secs: 30,
        }
    }
}

impl Config {
    /// Defaults with `REQUERY_*` overrides applied. Unparseable values are
    /// logged and ignored.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(v) = read_env(ENV_LATENCY_MS) {
            config.latency_ms = v;
        }
        if let Some(v) = read_env(ENV_FAILURE_RATE) {
            config.failure_rate = v;
        }
        if let Some(v) = read_env(ENV_FAILURE_SEED) {
            config.failure_seed = Some(v);
        }
        if let Some(v) = read_env(ENV_STALE_AFTER_SECS) {
            config.stale_after_secs = v;
        }
        config
    }

    pub fn latency(&self) -> Duration {
        Duration::from_millis(self.latency_ms)
    }

    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_after_secs)
    }
}

fn read_env<T: std::str::FromStr>(name: &str) -> Option<T> {
    let raw = std::env::var(name).ok()?;
    match raw.parse() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!(var = name, value = %raw, "ignoring unparseable value");
            None
        }
    }
}
