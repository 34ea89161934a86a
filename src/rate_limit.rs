//! Sliding-window command throttle
//!
//! Counts each user's recent commands over a trailing window. The limiter
//! holds no opinion about who is privileged: callers that bypass throttling
//! simply never consult it (see [`CallerPrivileges`](crate::CallerPrivileges)).
//! Timestamps are passed in explicitly, which keeps the checks pure and the
//! tests clock-free.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use dashmap::DashMap;

use crate::config::RateLimitConfig;
use crate::ledger::UserId;

/// Per-user trailing-window command counter.
#[derive(Debug)]
pub struct RateLimiter {
    windows: DashMap<UserId, VecDeque<Instant>>,
    window: Duration,
    max_commands: u32,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            windows: DashMap::new(),
            window: config.window,
            max_commands: config.max_commands,
        }
    }

    /// Record one command invocation at `now`.
    pub fn record(&self, user: UserId, now: Instant) {
        let mut window = self.windows.entry(user).or_default();
        Self::prune(&mut window, now, self.window);
        window.push_back(now);
    }

    /// Whether the user has exhausted the window as of `now`.
    pub fn is_limited(&self, user: UserId, now: Instant) -> bool {
        match self.windows.get_mut(&user) {
            Some(mut window) => {
                Self::prune(&mut window, now, self.window);
                window.len() >= self.max_commands as usize
            }
            None => false,
        }
    }

    /// Seconds until the user stops being limited; zero when not limited.
    pub fn reset_time(&self, user: UserId, now: Instant) -> Duration {
        match self.windows.get_mut(&user) {
            Some(mut window) => {
                Self::prune(&mut window, now, self.window);
                let len = window.len();
                let max = self.max_commands as usize;
                if len < max {
                    return Duration::ZERO;
                }
                // limited until enough of the oldest entries age out to put
                // the count back under the maximum
                let pivot = window[len - max];
                (pivot + self.window).saturating_duration_since(now)
            }
            None => Duration::ZERO,
        }
    }

    /// Drop users whose whole window has aged out. Entries self-prune on
    /// access; this reclaims memory for users who went quiet.
    pub fn purge_idle(&self, now: Instant) {
        self.windows.retain(|_, window| {
            Self::prune(window, now, self.window);
            !window.is_empty()
        });
    }

    /// Number of users with at least one tracked command.
    pub fn tracked_users(&self) -> usize {
        self.windows.len()
    }

    fn prune(window: &mut VecDeque<Instant>, now: Instant, duration: Duration) {
        while let Some(&oldest) = window.front() {
            if now.duration_since(oldest) >= duration {
                window.pop_front();
            } else {
                break;
            }
        }
    }
}
