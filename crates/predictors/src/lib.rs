//! Throughput predictors: how a running press's speed evolves from one tick
//! to the next, and how that speed turns into counted strokes.

use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};

use pl_core::Gpm;

pub mod accumulator;

pub use accumulator::HitAccumulator;

/// A predictor proposes the next instantaneous speed of a running machine.
pub trait SpeedPredictor: Send + Sync {
    fn next_speed(&self, current: Gpm, rng: &mut dyn RngCore) -> Gpm;
}

/// Speed window the walk is pulled back into.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct SpeedBand {
    pub low: Gpm,
    pub high: Gpm,
}

impl Default for SpeedBand {
    fn default() -> Self {
        Self { low: 330, high: 365 }
    }
}

/// Symmetric integer random walk that is forced back toward a healthy band.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BandedRandomWalk {
    pub band: SpeedBand,
    pub max_step: u32,
}

impl Default for BandedRandomWalk {
    fn default() -> Self {
        Self { band: SpeedBand::default(), max_step: 3 }
    }
}

impl BandedRandomWalk {
    pub fn new(band: SpeedBand, max_step: u32) -> Self {
        Self { band, max_step }
    }

    fn step(&self, current: Gpm, rng: &mut dyn RngCore) -> i64 {
        let bound = i64::from(self.max_step);
        let drawn = rng.random_range(-bound..=bound);
        if current < self.band.low {
            drawn.abs() + 1
        } else if current > self.band.high {
            -drawn.abs() - 1
        } else {
            drawn
        }
    }
}

impl SpeedPredictor for BandedRandomWalk {
    fn next_speed(&self, current: Gpm, rng: &mut dyn RngCore) -> Gpm {
        let next = (i64::from(current) + self.step(current, rng)).max(0);
        Gpm::try_from(next).unwrap_or(Gpm::MAX)
    }
}

/// Keeps whatever speed the machine already has.
pub struct HoldSpeed;

impl SpeedPredictor for HoldSpeed {
    fn next_speed(&self, current: Gpm, _rng: &mut dyn RngCore) -> Gpm {
        current
    }
}

/// Output of one simulated tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickSample {
    pub speed: Gpm,
    pub hits: f64,
}

/// Couples a predictor with the tick rate so speed (per minute) becomes
/// fractional strokes per tick.
pub struct ThroughputModel {
    predictor: Box<dyn SpeedPredictor>,
    ticks_per_minute: u32,
}

impl ThroughputModel {
    pub fn new(predictor: Box<dyn SpeedPredictor>, ticks_per_minute: u32) -> Self {
        Self { predictor, ticks_per_minute: ticks_per_minute.max(1) }
    }

    pub fn sample(&self, current: Gpm, rng: &mut dyn RngCore) -> TickSample {
        let speed = self.predictor.next_speed(current, rng);
        TickSample { speed, hits: f64::from(speed) / f64::from(self.ticks_per_minute) }
    }
}

impl Default for ThroughputModel {
    fn default() -> Self {
        Self::new(Box::new(BandedRandomWalk::default()), 60)
    }
}
