//! Monotonic time source for the trigger and feedback loops.
//!
//! All state-machine timestamps are milliseconds on a monotonic clock. Remote
//! events carry wall-clock timestamps, so the clock also maps those onto its own
//! timeline.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use tokio::time::Instant;

/// Milliseconds on a monotonic timeline.
pub type Millis = u64;

/// A time source.
pub trait Clock: Send + Sync {
    /// Current monotonic time in milliseconds.
    fn now_ms(&self) -> Millis;

    /// Current wall-clock time.
    fn wall_now(&self) -> DateTime<Utc>;

    /// Map a wall-clock instant onto the monotonic timeline.
    ///
    /// Instants in the future map to `now_ms()`.
    fn monotonic_at(&self, at: DateTime<Utc>) -> Millis {
        let age_ms = (self.wall_now() - at).num_milliseconds().max(0) as u64;
        self.now_ms().saturating_sub(age_ms)
    }
}

/// Clock backed by the runtime's monotonic instant.
#[derive(Debug, Clone)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> Millis {
        self.origin.elapsed().as_millis() as Millis
    }

    fn wall_now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually advanced clock for deterministic tests and replays.
#[derive(Debug)]
pub struct ManualClock {
    now_ms: AtomicU64,
    wall: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    /// Create a clock at `start_ms`, with wall time anchored at the Unix epoch.
    pub fn new(start_ms: Millis) -> Self {
        Self {
            now_ms: AtomicU64::new(start_ms),
            wall: Mutex::new(
                DateTime::<Utc>::default() + chrono::Duration::milliseconds(start_ms as i64),
            ),
        }
    }

    /// Move both timelines forward.
    pub fn advance(&self, ms: Millis) {
        self.now_ms.fetch_add(ms, Ordering::SeqCst);
        if let Ok(mut wall) = self.wall.lock() {
            *wall += chrono::Duration::milliseconds(ms as i64);
        }
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> Millis {
        self.now_ms.load(Ordering::SeqCst)
    }

    fn wall_now(&self) -> DateTime<Utc> {
        self.wall
            .lock()
            .map(|wall| *wall)
            .unwrap_or(DateTime::<Utc>::default())
    }
}
