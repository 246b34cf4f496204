use std::time::Duration;

use typed_builder::TypedBuilder;

use super::{
    addr::PeerAddr,
    animator::{StyleTable, DEFAULT_CAPACITY},
    error::Error,
    ring::RingCoordinate,
};

/// Render cadence when none is configured.
pub const DEFAULT_TICK: Duration = Duration::from_millis(100);

pub const SEED_VAR: &str = "RINGSCOPE_SEED";
pub const TICK_VAR: &str = "RINGSCOPE_TICK_MS";
pub const CAPACITY_VAR: &str = "RINGSCOPE_CAPACITY";

#[derive(Debug, Clone, TypedBuilder)]
pub struct ObserverConfig {
    /// Observation address of the first node to connect to. The rest of the
    /// membership is discovered from there.
    pub seed: PeerAddr,
    /// How often a render frame is produced.
    #[builder(default = DEFAULT_TICK)]
    pub tick: Duration,
    /// Most animation events alive at once.
    #[builder(default = DEFAULT_CAPACITY)]
    pub capacity: usize,
    #[builder(default)]
    pub ring: RingCoordinate,
    #[builder(default)]
    pub styles: StyleTable,
}

impl ObserverConfig {
    /// Reads the configuration from the process environment. `seed` (usually
    /// the first command line argument) takes precedence over
    /// `RINGSCOPE_SEED`.
    pub fn from_env(seed: Option<String>) -> Result<Self, Error> {
        Self::from_lookup(seed, |name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(seed: Option<String>, lookup: F) -> Result<Self, Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let seed = seed
            .or_else(|| lookup(SEED_VAR))
            .ok_or(Error::MissingSeed)?;
        let seed = PeerAddr::parse(&seed)?;

        let tick = match lookup(TICK_VAR) {
            Some(ms) => Duration::from_millis(positive(TICK_VAR, &ms)?),
            None => DEFAULT_TICK,
        };
        let capacity = match lookup(CAPACITY_VAR) {
            Some(n) => positive(CAPACITY_VAR, &n)? as usize,
            None => DEFAULT_CAPACITY,
        };

        Ok(Self::builder()
            .seed(seed)
            .tick(tick)
            .capacity(capacity)
            .build())
    }
}

fn positive(name: &'static str, value: &str) -> Result<u64, Error> {
    match value.trim().parse::<u64>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(Error::InvalidSetting {
            name,
            value: value.to_string(),
        }),
    }
}
