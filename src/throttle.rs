//! Per-client request admission.
//!
//! Each client key has a counter that expires one window after that client's
//! last request, so a client that keeps hammering stays throttled. Expired
//! counters are swept from `admit` at most once per window.

use dashmap::DashMap;
use log::debug;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use crate::errors::{PoolError, Result};

#[derive(Debug, Clone, Copy)]
struct Window {
    requests: u32,
    last_seen: Instant,
}

#[derive(Debug)]
pub struct RequestThrottle {
    max_requests: u32,
    window: Duration,
    clients: DashMap<String, Window>,
    last_sweep: Mutex<Instant>,
}

impl RequestThrottle {
    pub fn new(max_requests_per_second: u32) -> Self {
        Self::with_window(max_requests_per_second, Duration::from_secs(1))
    }

    pub fn with_window(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            clients: DashMap::new(),
            last_sweep: Mutex::new(Instant::now()),
        }
    }

    pub fn max_requests_per_window(&self) -> u32 {
        self.max_requests
    }

    /// Count one request from `client`; `Throttled` once it exceeds the limit
    pub fn admit(&self, client: &str) -> Result<()> {
        let now = Instant::now();
        self.sweep_if_due(now);

        let mut entry = self.clients.entry(client.to_string()).or_insert(Window {
            requests: 0,
            last_seen: now,
        });

        if now.duration_since(entry.last_seen) >= self.window {
            entry.requests = 0;
        }
        entry.last_seen = now;

        if entry.requests >= self.max_requests {
            debug!("Throttling {} ({} requests)", client, entry.requests);
            return Err(PoolError::Throttled {
                client: client.to_string(),
            });
        }
        entry.requests += 1;
        Ok(())
    }

    /// Drop counters whose window has passed
    pub fn purge_expired(&self) {
        self.purge_expired_at(Instant::now());
    }

    fn purge_expired_at(&self, now: Instant) {
        let before = self.clients.len();
        self.clients
            .retain(|_, window| now.duration_since(window.last_seen) < self.window);
        let purged = before.saturating_sub(self.clients.len());
        if purged > 0 {
            debug!("Purged {} expired client counters", purged);
        }
    }

    // Must run before `admit` takes its map entry: `retain` locks every shard
    fn sweep_if_due(&self, now: Instant) {
        {
            let mut last_sweep = self.last_sweep.lock().unwrap_or_else(PoisonError::into_inner);
            if now.duration_since(*last_sweep) < self.window {
                return;
            }
            *last_sweep = now;
        }
        self.purge_expired_at(now);
    }

    pub fn tracked_clients(&self) -> usize {
        self.clients.len()
    }
}
