use std::collections::VecDeque;

use crate::types::Verdict;

/// Default history length. At typical inference rates this covers roughly the
/// last two seconds, but iterations are not evenly spaced.
pub const DEFAULT_HISTORY_CAPACITY: usize = 32;

/// Fixed-capacity FIFO of recent verdicts, oldest first.
#[derive(Clone, Debug)]
pub struct ResultHistory {
    verdicts: VecDeque<Verdict>,
    capacity: usize,
}

impl ResultHistory {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "result history needs a non-zero capacity");
        Self {
            verdicts: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, verdict: Verdict) {
        if self.verdicts.len() == self.capacity {
            self.verdicts.pop_front();
        }
        self.verdicts.push_back(verdict);
    }

    pub fn snapshot(&self) -> Vec<Verdict> {
        self.verdicts.iter().copied().collect()
    }

    pub fn clear(&mut self) {
        self.verdicts.clear();
    }

    pub fn len(&self) -> usize {
        self.verdicts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.verdicts.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn latest(&self) -> Option<Verdict> {
        self.verdicts.back().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Verdict> {
        self.verdicts.iter()
    }

    /// Share of stored verdicts with a non-zero label. Zero when empty.
    pub fn positive_ratio(&self) -> f32 {
        positive_ratio(self.verdicts.iter())
    }
}

impl Default for ResultHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

pub fn positive_ratio<'a>(verdicts: impl ExactSizeIterator<Item = &'a Verdict>) -> f32 {
    let total = verdicts.len();
    if total == 0 {
        return 0.0;
    }
    let positive = verdicts.filter(|v| v.is_positive()).count();
    positive as f32 / total as f32
}
