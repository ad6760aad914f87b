//! Sliding-window admission control keyed by client.
//!
//! Each client key owns a [`RateWindow`] holding the instants of its
//! admitted requests for the trailing minute and the trailing hour. The key
//! map sits behind a read/write lock that is only write-locked to insert a
//! new key or by the sweep; the check-and-record step runs under the key's
//! own mutex so two simultaneous requests can never both see the
//! pre-increment count.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, TryLockError};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::config::RateLimitConfig;

/// Span of the short budget.
pub const MINUTE_WINDOW: Duration = Duration::from_secs(60);
/// Span of the long budget.
pub const HOUR_WINDOW: Duration = Duration::from_secs(3600);

/// Paths that are never subject to admission control.
pub const EXEMPT_PATHS: &[&str] = &["/health", "/ready", "/metrics"];

/// Whether a request path bypasses admission.
pub fn is_exempt(path: &str) -> bool {
    EXEMPT_PATHS.contains(&path)
}

/// Quota left after an admitted request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Remaining {
    pub per_minute: u32,
    pub per_hour: u32,
}

/// Outcome of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Allowed(Remaining),
    Denied { retry_after_secs: u64 },
}

impl Admission {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Admission::Allowed(_))
    }
}

/// Admitted-request instants for one client key.
#[derive(Debug, Default)]
struct RateWindow {
    minute: VecDeque<Instant>,
    hour: VecDeque<Instant>,
    /// Set by the sweep when the window is dropped from the map. An
    /// admission that raced the sweep and still holds this window must
    /// re-resolve the key instead of recording into a detached window.
    retired: bool,
}

impl RateWindow {
    fn prune(&mut self, now: Instant) {
        retain_within(&mut self.minute, now, MINUTE_WINDOW);
        retain_within(&mut self.hour, now, HOUR_WINDOW);
    }
}

/// Drop every instant at least `span` older than `now`.
///
/// Uses `retain` rather than popping from the front: callers capture `now`
/// before taking the key lock, so instants can land slightly out of order.
fn retain_within(entries: &mut VecDeque<Instant>, now: Instant, span: Duration) {
    entries.retain(|&t| now.saturating_duration_since(t) < span);
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Per-key two-budget sliding-window rate limiter.
pub struct RateLimiter {
    per_minute: u32,
    per_hour: u32,
    windows: RwLock<HashMap<String, Arc<Mutex<RateWindow>>>>,
}

impl RateLimiter {
    pub fn new(per_minute: u32, per_hour: u32) -> Self {
        Self {
            per_minute,
            per_hour,
            windows: RwLock::new(HashMap::new()),
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(config.per_minute, config.per_hour)
    }

    /// Check `key` against both budgets at `now`, recording the request if admitted.
    pub fn admit(&self, key: &str, now: Instant) -> Admission {
        if self.per_minute == 0 {
            return Admission::Denied {
                retry_after_secs: MINUTE_WINDOW.as_secs(),
            };
        }
        if self.per_hour == 0 {
            return Admission::Denied {
                retry_after_secs: HOUR_WINDOW.as_secs(),
            };
        }

        loop {
            let entry = self.window_for(key);
            let mut window = lock(&entry);
            if window.retired {
                continue;
            }

            window.prune(now);

            if window.minute.len() >= self.per_minute as usize {
                warn!(client = %key, "Rate limit exceeded (per minute)");
                return Admission::Denied {
                    retry_after_secs: MINUTE_WINDOW.as_secs(),
                };
            }
            if window.hour.len() >= self.per_hour as usize {
                warn!(client = %key, "Rate limit exceeded (per hour)");
                return Admission::Denied {
                    retry_after_secs: HOUR_WINDOW.as_secs(),
                };
            }

            window.minute.push_back(now);
            window.hour.push_back(now);

            return Admission::Allowed(Remaining {
                per_minute: self.per_minute - window.minute.len() as u32,
                per_hour: self.per_hour - window.hour.len() as u32,
            });
        }
    }

    /// Drop every key whose hour window is empty once pruned at `now`.
    ///
    /// Keys whose lock is held by an in-flight admission are skipped for
    /// this round. Returns the number of keys removed.
    pub fn sweep(&self, now: Instant) -> usize {
        let mut windows = self.windows.write().unwrap_or_else(PoisonError::into_inner);
        let before = windows.len();

        windows.retain(|_, window| match window.try_lock() {
            Ok(mut w) => keep_after_sweep(&mut w, now),
            Err(TryLockError::Poisoned(p)) => keep_after_sweep(&mut p.into_inner(), now),
            Err(TryLockError::WouldBlock) => true,
        });

        let removed = before - windows.len();
        if removed > 0 {
            info!(removed, remaining = windows.len(), "Cleaned up idle rate limit entries");
        }
        removed
    }

    /// Number of client keys currently tracked.
    pub fn tracked_keys(&self) -> usize {
        self.windows
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn window_for(&self, key: &str) -> Arc<Mutex<RateWindow>> {
        {
            let windows = self.windows.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(window) = windows.get(key) {
                return Arc::clone(window);
            }
        }

        let mut windows = self.windows.write().unwrap_or_else(PoisonError::into_inner);
        let window = windows.entry(key.to_string()).or_insert_with(|| {
            debug!(client = %key, "Tracking new rate limit key");
            Arc::new(Mutex::new(RateWindow::default()))
        });
        Arc::clone(window)
    }
}

fn keep_after_sweep(window: &mut RateWindow, now: Instant) -> bool {
    window.prune(now);
    if window.hour.is_empty() {
        window.retired = true;
        false
    } else {
        true
    }
}

/// Spawn the periodic idle-key sweep.
pub fn spawn_sweep_task(
    limiter: Arc<RateLimiter>,
    every: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let start = tokio::time::Instant::now() + every;
        let mut interval = tokio::time::interval_at(start, every);
        loop {
            interval.tick().await;
            limiter.sweep(Instant::now());
        }
    })
}
