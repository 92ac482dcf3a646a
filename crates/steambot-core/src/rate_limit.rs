//! A shared, cancel-aware rate limiter, grounded on
//! `original_source/Headers/RateLimit.hpp` ("We give an EXTRA dose of
//! rate-limiting to some activities, such as inventory queries... thread-safe,
//! so you can apply the limit across all clients by letting them use the same
//! instance").
//!
//! `limit()` waits for a slot, runs the caller's future, and only then
//! schedules the next slot — so a slow action (e.g. an HTTP request) pushes
//! later callers back too, matching the original's "slower is better".

use std::{future::Future, time::Duration};

use tokio::{sync::Mutex, time::Instant};

use crate::cancel::{CancelToken, Cancelled};

pub struct RateLimiter {
    schedule: Duration,
    next_access: Mutex<Instant>,
}

impl RateLimiter {
    pub fn new(schedule: Duration) -> Self {
        Self {
            schedule,
            next_access: Mutex::new(Instant::now()),
        }
    }

    /// Waits for the next available slot, then runs `f`. The slot for the
    /// *following* call is scheduled only after `f` completes.
    pub async fn limit<F, Fut, T>(&self, cancel: &CancelToken, f: F) -> Result<T, Cancelled>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let mut next_access = cancel.race(self.next_access.lock()).await?;

        let now = Instant::now();
        if *next_access > now {
            cancel.sleep(*next_access - now).await?;
        }

        let result = cancel.race(f()).await?;
        *next_access = Instant::now() + self.schedule;
        Ok(result)
    }
}
