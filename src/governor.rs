//! Request-rate governor for the generative service.
//!
//! Provider quotas are enforced per account, not per document, so one
//! [`RateGovernor`] is shared (behind an `Arc`) by every component that calls
//! the service during a run. It keeps a sliding window of admission times and
//! suspends callers once the window is full.
//!
//! The window lives behind an async mutex that is held across the wait. A
//! caller that has to sleep therefore blocks everyone queued behind it, which
//! is exactly what keeps the quota intact when chapters are generated
//! concurrently.

use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

/// Sliding-window limiter: at most `max_requests` admissions in any trailing
/// `window`.
#[derive(Debug)]
pub struct RateGovernor {
    max_requests: usize,
    window: Duration,
    timestamps: Mutex<VecDeque<Instant>>,
}

impl RateGovernor {
    /// Create a governor. `max_requests` is raised to at least 1.
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            max_requests: max_requests.max(1),
            window,
            timestamps: Mutex::new(VecDeque::with_capacity(max_requests.max(1))),
        }
    }

    pub fn max_requests(&self) -> usize {
        self.max_requests
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Wait until a call may be dispatched, then record it.
    ///
    /// Never fails; the only effect besides bookkeeping is the wait.
    pub async fn acquire(&self) {
        let mut timestamps = self.timestamps.lock().await;

        let now = Instant::now();
        prune(&mut timestamps, now, self.window);

        if timestamps.len() >= self.max_requests {
            if let Some(&oldest) = timestamps.front() {
                let wait = (oldest + self.window).saturating_duration_since(now);
                if !wait.is_zero() {
                    warn!(
                        "Request limit reached ({} per {:?}). Waiting {:.2}s…",
                        self.max_requests,
                        self.window,
                        wait.as_secs_f64()
                    );
                    sleep(wait).await;
                }
            }
            prune(&mut timestamps, Instant::now(), self.window);
        }

        timestamps.push_back(Instant::now());
        debug!(
            "Request admitted ({}/{} in window)",
            timestamps.len(),
            self.max_requests
        );
    }

    /// Number of admissions still inside the window.
    pub async fn in_flight(&self) -> usize {
        let mut timestamps = self.timestamps.lock().await;
        prune(&mut timestamps, Instant::now(), self.window);
        timestamps.len()
    }
}

/// Drop every timestamp that has left the trailing window.
fn prune(timestamps: &mut VecDeque<Instant>, now: Instant, window: Duration) {
    while let Some(&front) = timestamps.front() {
        if now.duration_since(front) >= window {
            timestamps.pop_front();
        } else {
            break;
        }
    }
}
