/// Fractional stroke counter. Whole hits are only taken at read time so that
/// sub-stroke progress carries over between ticks.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct HitAccumulator {
    internal: f64,
}

impl HitAccumulator {
    pub fn starting_at(hits: u64) -> Self {
        Self { internal: hits as f64 }
    }

    pub fn add(&mut self, hits: f64) {
        self.internal += hits;
    }

    pub fn internal(&self) -> f64 {
        self.internal
    }

    pub fn total_hits(&self) -> u64 {
        self.internal.floor() as u64
    }

    pub fn is_finite(&self) -> bool {
        self.internal.is_finite()
    }
}
