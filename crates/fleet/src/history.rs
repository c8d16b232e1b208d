use std::collections::VecDeque;

use pl_core::HistoryPoint;

pub const DEFAULT_HISTORY_CAPACITY: usize = 30;

/// Bounded ring of recent speed samples; the oldest entry is evicted first.
#[derive(Debug, Clone)]
pub struct HistoryWindow {
    points: VecDeque<HistoryPoint>,
    capacity: usize,
}

impl HistoryWindow {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self { points: VecDeque::with_capacity(capacity), capacity }
    }

    pub fn push(&mut self, point: HistoryPoint) {
        if self.points.len() == self.capacity {
            self.points.pop_front();
        }
        self.points.push_back(point);
    }

    pub fn last(&self) -> Option<&HistoryPoint> {
        self.points.back()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn clear(&mut self) {
        self.points.clear();
    }

    pub fn to_vec(&self) -> Vec<HistoryPoint> {
        self.points.iter().copied().collect()
    }
}

impl Default for HistoryWindow {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_HISTORY_CAPACITY)
    }
}
