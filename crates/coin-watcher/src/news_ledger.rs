use std::collections::{HashSet, VecDeque};

pub const DEFAULT_NEWS_MEMORY: usize = 1000;

/// Bounded memory of news URLs that were already delivered.
pub struct NewsLedger {
    order: VecDeque<String>,
    seen: HashSet<String>,
    capacity: usize,
}

impl Default for NewsLedger {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_NEWS_MEMORY)
    }
}

impl NewsLedger {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            order: VecDeque::with_capacity(capacity),
            seen: HashSet::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    pub fn contains(&self, url: &str) -> bool {
        self.seen.contains(url)
    }

    /// Remember `url`, evicting the oldest entry once full.
    pub fn remember(&mut self, url: &str) {
        if !self.seen.insert(url.to_string()) {
            return;
        }
        self.order.push_back(url.to_string());
        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.seen.remove(&oldest);
            }
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.order.len()
    }
}
