// src/feedback/rate_limit.rs
//! Per-client sliding-window rate limiter.
//!
//! A client may make at most `max` recorded attempts within any `window`.
//! Rejected attempts are not recorded, so a client that backs off regains
//! capacity as its oldest attempts age out.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::store::lock;

/// Clients tracked before idle entries are swept.
const SWEEP_THRESHOLD: usize = 4096;

#[derive(Debug)]
pub struct SlidingWindowLimiter {
    max: usize,
    window: Duration,
    hits: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl SlidingWindowLimiter {
    pub fn new(max: usize, window: Duration) -> Self {
        Self {
            max,
            window,
            hits: Mutex::new(HashMap::new()),
        }
    }

    /// `true` when the attempt is allowed (and counted).
    pub fn check_at(&self, client: &str, now: Instant) -> bool {
        let mut hits = lock(&self.hits);
        if hits.len() > SWEEP_THRESHOLD {
            let window = self.window;
            hits.retain(|_, q| q.back().is_some_and(|&t| now.duration_since(t) < window));
        }

        let q = hits.entry(client.to_string()).or_default();
        while let Some(&oldest) = q.front() {
            if now.duration_since(oldest) >= self.window {
                q.pop_front();
            } else {
                break;
            }
        }
        if q.len() >= self.max {
            return false;
        }
        q.push_back(now);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocks_after_max_and_recovers_after_window() {
        let rl = SlidingWindowLimiter::new(3, Duration::from_secs(60));
        let t0 = Instant::now();
        for i in 0..3 {
            assert!(rl.check_at("1.2.3.4", t0 + Duration::from_secs(i)));
        }
        assert!(!rl.check_at("1.2.3.4", t0 + Duration::from_secs(10)));
        // other clients are independent
        assert!(rl.check_at("5.6.7.8", t0 + Duration::from_secs(10)));
        // the first attempt ages out at t0+60
        assert!(rl.check_at("1.2.3.4", t0 + Duration::from_secs(60)));
        assert!(!rl.check_at("1.2.3.4", t0 + Duration::from_secs(60)));
    }
}
