//! Timestamp representation used for every persisted or wire-carried instant.
//!
//! spec.md §9 calls out the source's habit of storing time as ad-hoc strings
//! and asks for a monotonic + wall-clock pair instead: wall-clock for
//! display/audit only, monotonic for all ordering/deadline math. `MeshTime`
//! is that pair.

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

#[derive(Clone, Copy, Debug)]
pub struct MeshTime {
    /// Used only for display, logs, and audit trails. Never compared across
    /// processes for ordering.
    pub wall: SystemTime,
    /// Used for all deadline, timeout, and backoff arithmetic.
    pub monotonic: Instant,
}

impl MeshTime {
    pub fn now() -> Self {
        Self {
            wall: SystemTime::now(),
            monotonic: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.monotonic.elapsed()
    }

    pub fn wall_millis_since_epoch(&self) -> u64 {
        self.wall
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64
    }
}

/// Exponential backoff with jitter, shared by transport reconnect (§4.A),
/// outbox retry (§4.E), and scheduler path-unavailable retry (§4.D), all of
/// which specify "base 1s, cap 60s, jitter".
#[derive(Clone, Copy, Debug)]
pub struct Backoff {
    pub base: Duration,
    pub cap: Duration,
    pub jitter: f64,
}

impl Backoff {
    pub const DEFAULT: Backoff = Backoff {
        base: Duration::from_secs(1),
        cap: Duration::from_secs(60),
        jitter: 0.20,
    };

    pub fn duration_for_attempt(&self, attempt: u32) -> Duration {
        let exp = self.base.as_secs_f64() * 2f64.powi(attempt.min(32) as i32);
        let capped = exp.min(self.cap.as_secs_f64());
        let jitter_span = capped * self.jitter;
        let offset = (rand::random::<f64>() * 2.0 - 1.0) * jitter_span;
        let with_jitter = (capped + offset).max(0.0);
        Duration::from_secs_f64(with_jitter)
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::DEFAULT
    }
}
