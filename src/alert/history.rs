use std::collections::VecDeque;
use std::sync::{Arc, RwLock};

use super::{AlertEvent, AlertSink};

struct Inner {
    events: VecDeque<AlertEvent>,
    total: u64,
}

/// Bounded in-memory record of recent alerts, newest last.
pub struct AlertHistory {
    inner: Arc<RwLock<Inner>>,
    capacity: usize,
}

impl AlertHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Inner {
                events: VecDeque::with_capacity(capacity),
                total: 0,
            })),
            capacity,
        }
    }

    pub fn record(&self, event: AlertEvent) {
        let mut inner = match self.inner.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        inner.total += 1;
        if self.capacity == 0 {
            return;
        }
        while inner.events.len() >= self.capacity {
            inner.events.pop_front();
        }
        inner.events.push_back(event);
    }

    /// Up to `limit` most recent events, oldest first.
    pub fn recent(&self, limit: usize) -> Vec<AlertEvent> {
        match self.inner.read() {
            Ok(inner) => {
                let skip = inner.events.len().saturating_sub(limit);
                inner.events.iter().skip(skip).cloned().collect()
            }
            Err(_) => Vec::new(),
        }
    }

    /// Alerts recorded since start, including evicted ones.
    pub fn total(&self) -> u64 {
        self.inner.read().map(|inner| inner.total).unwrap_or(0)
    }
}

impl Clone for AlertHistory {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            capacity: self.capacity,
        }
    }
}

impl AlertSink for AlertHistory {
    fn trigger(&mut self, event: &AlertEvent) {
        self.record(event.clone());
    }
}
