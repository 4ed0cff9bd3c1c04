//! Per-client sliding-window rate limiting, held in process memory.

use crate::error::{FinchError, Result};
use dashmap::DashMap;
use std::collections::VecDeque;
use std::time::{Duration, Instant};
use tracing::warn;

pub struct RateLimiter {
    max_requests: usize,
    window: Duration,
    requests: DashMap<String, VecDeque<Instant>>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(30, Duration::from_secs(60))
    }
}

impl RateLimiter {
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            requests: DashMap::new(),
        }
    }

    /// Record a request from `client` or refuse it when the window is full.
    pub fn check(&self, client: &str) -> Result<()> {
        self.check_at(client, Instant::now())
    }

    pub fn check_at(&self, client: &str, now: Instant) -> Result<()> {
        let mut entry = self
            .requests
            .entry(client.to_string())
            .or_insert_with(VecDeque::new);

        while let Some(oldest) = entry.front() {
            if now.saturating_duration_since(*oldest) >= self.window {
                entry.pop_front();
            } else {
                break;
            }
        }

        if entry.len() >= self.max_requests {
            warn!("Rate limit hit for client {}", client);
            return Err(FinchError::RateLimited(format!(
                "Rate limit exceeded. Max {} requests per {}s.",
                self.max_requests,
                self.window.as_secs()
            )));
        }

        entry.push_back(now);
        Ok(())
    }

    /// Requests currently counted against `client`.
    pub fn in_window(&self, client: &str) -> usize {
        self.requests.get(client).map(|q| q.len()).unwrap_or(0)
    }
}
