//! Periodic chance roll driving autonomous triggers

use rand::Rng;
use serde::Serialize;
use std::time::Duration;
use tokio::time::{Instant, Interval, MissedTickBehavior};

pub const TICK_INTERVAL: Duration = Duration::from_millis(1000);

/// Outcome of one tick's roll
#[derive(Serialize, Debug, Clone, Copy, PartialEq)]
pub struct Roll {
    pub roll: f64,
    pub chance: f64,
    pub success: bool,
}

impl Roll {
    /// Draw a uniform value in [0, 1) against `1 / max(1, denominator)`
    pub fn draw<R: Rng>(rng: &mut R, chance_denominator: u64) -> Self {
        Self::with_value(rng.r#gen::<f64>(), chance_denominator)
    }

    pub fn with_value(roll: f64, chance_denominator: u64) -> Self {
        let chance = chance(chance_denominator);
        Self {
            roll,
            chance,
            success: roll < chance,
        }
    }
}

pub fn chance(chance_denominator: u64) -> f64 {
    1.0 / chance_denominator.max(1) as f64
}

/// Interval whose first tick fires one full period from now.
///
/// Late ticks are skipped rather than replayed in a burst.
pub fn ticker(period: Duration) -> Interval {
    let period = period.max(Duration::from_millis(1));
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    interval
}
