//! Cached total image count for callers that show it on every page.

use std::time::{Duration, Instant};

use crate::db::{AssociationStore, StoreError};

pub trait Clock {
    fn now(&self) -> Instant;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Total image count, refreshed from the store once the TTL has elapsed.
pub struct ImageCountCache<C: Clock = SystemClock> {
    clock: C,
    ttl: Duration,
    cached: Option<(u64, Instant)>,
}

impl ImageCountCache<SystemClock> {
    pub fn new(ttl: Duration) -> Self {
        Self::with_clock(ttl, SystemClock)
    }
}

impl<C: Clock> ImageCountCache<C> {
    pub fn with_clock(ttl: Duration, clock: C) -> Self {
        Self {
            clock,
            ttl,
            cached: None,
        }
    }

    pub fn get<S: AssociationStore>(&mut self, store: &S) -> Result<u64, StoreError> {
        let now = self.clock.now();
        if let Some((count, at)) = self.cached {
            if now.duration_since(at) < self.ttl {
                return Ok(count);
            }
        }
        let count = store.total_images()?;
        tracing::debug!(count, "refreshed total image count");
        self.cached = Some((count, now));
        Ok(count)
    }

    /// Drop the cached value so the next `get` hits the store.
    pub fn invalidate(&mut self) {
        self.cached = None;
    }
}
