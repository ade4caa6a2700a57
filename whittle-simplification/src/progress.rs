//! Progress reporting and cooperative cancellation
//!
//! Simplification is a long-running task. The driver polls a shared cancel
//! flag once per collapse and keeps a live face counter current, so a UI
//! thread can display progress or abort the run without locks.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Shared handle for observing and cancelling a simplification run.
///
/// Cloning is cheap; all clones observe the same flag and counter. A
/// cancelled run returns the input mesh unchanged.
#[derive(Debug, Clone, Default)]
pub struct SimplifyMonitor {
    cancelled: Arc<AtomicBool>,
    face_count: Arc<AtomicUsize>,
}

impl SimplifyMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation; takes effect before the next collapse
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    /// Number of faces currently remaining in the running simplification
    pub fn face_count(&self) -> usize {
        self.face_count.load(Ordering::Relaxed)
    }

    pub(crate) fn set_face_count(&self, count: usize) {
        self.face_count.store(count, Ordering::Relaxed);
    }
}

/// Throttles progress callbacks to a coarse interval (200ms by default)
pub(crate) struct ProgressThrottle {
    interval: Duration,
    last: Instant,
}

impl ProgressThrottle {
    pub(crate) fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: Instant::now(),
        }
    }

    /// True at most once per interval
    pub(crate) fn ready(&mut self) -> bool {
        if self.last.elapsed() >= self.interval {
            self.last = Instant::now();
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_monitor_cancel_visible_across_clones() {
        let monitor = SimplifyMonitor::new();
        let observer = monitor.clone();
        assert!(!observer.is_cancelled());
        monitor.cancel();
        assert!(observer.is_cancelled());
    }

    #[test]
    fn test_monitor_face_count() {
        let monitor = SimplifyMonitor::new();
        monitor.set_face_count(42);
        assert_eq!(monitor.face_count(), 42);
    }

    #[test]
    fn test_throttle_zero_interval_always_ready() {
        let mut throttle = ProgressThrottle::new(Duration::ZERO);
        assert!(throttle.ready());
        assert!(throttle.ready());
    }
}
