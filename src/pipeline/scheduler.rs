//! Frame admission and backpressure
//!
//! A frame is processed only when its sequence number falls on the sample
//! interval and no other pass is in flight. Everything else is dropped, never
//! queued. The decision is synchronous and O(1).

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use tracing::debug;

/// Outcome of an admission check
#[derive(Debug)]
#[must_use = "dropping the guard immediately ends the pass"]
pub enum Admission {
    /// Run a pass; the pass ends when the guard is dropped
    Process(PassGuard),
    /// Drop the frame
    Skip,
}

impl Admission {
    pub fn is_process(&self) -> bool {
        matches!(self, Admission::Process(_))
    }
}

/// Scoped in-flight marker
///
/// Dropping it clears the scheduler's in-flight flag, whichever way the pass
/// ends (success, error or panic).
#[derive(Debug)]
pub struct PassGuard {
    flag: Arc<AtomicBool>,
}

impl Drop for PassGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Admission counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    pub admitted: u64,
    pub skipped: u64,
}

/// Admission gate, one per scanning session
#[derive(Debug)]
pub struct FrameScheduler {
    interval: u64,
    in_flight: Arc<AtomicBool>,
    admitted: AtomicU64,
    skipped: AtomicU64,
}

impl Default for FrameScheduler {
    fn default() -> Self {
        Self::new(3)
    }
}

impl FrameScheduler {
    /// Create a scheduler processing every `interval`-th frame (minimum 1)
    pub fn new(interval: u64) -> Self {
        Self {
            interval: interval.max(1),
            in_flight: Arc::new(AtomicBool::new(false)),
            admitted: AtomicU64::new(0),
            skipped: AtomicU64::new(0),
        }
    }

    pub fn interval(&self) -> u64 {
        self.interval
    }

    /// Decide whether frame `seq` is processed
    pub fn accept(&self, seq: u64) -> Admission {
        if seq % self.interval != 0 {
            self.skipped.fetch_add(1, Ordering::Relaxed);
            return Admission::Skip;
        }

        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Frame {} skipped: pass in flight", seq);
            self.skipped.fetch_add(1, Ordering::Relaxed);
            return Admission::Skip;
        }

        self.admitted.fetch_add(1, Ordering::Relaxed);
        Admission::Process(PassGuard {
            flag: self.in_flight.clone(),
        })
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> SchedulerStats {
        SchedulerStats {
            admitted: self.admitted.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_interval() {
        let scheduler = FrameScheduler::new(3);
        let admitted: Vec<u64> = (0..12)
            .filter(|&seq| {
                // Guard dropped at once: each pass completes before the next frame
                scheduler.accept(seq).is_process()
            })
            .collect();

        assert_eq!(admitted, vec![0, 3, 6, 9]);
        assert_eq!(scheduler.stats(), SchedulerStats { admitted: 4, skipped: 8 });
        assert!(!scheduler.is_in_flight());
    }

    #[test]
    fn test_busy_scheduler_skips() {
        let scheduler = FrameScheduler::new(3);
        let guard = scheduler.accept(0);
        assert!(guard.is_process());
        assert!(scheduler.is_in_flight());

        assert!(!scheduler.accept(3).is_process());
        assert!(!scheduler.accept(6).is_process());

        drop(guard);
        assert!(!scheduler.is_in_flight());
        assert!(scheduler.accept(9).is_process());
    }

    #[test]
    fn test_guard_released_on_panic() {
        let scheduler = FrameScheduler::new(1);
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = scheduler.accept(0);
            panic!("pass failed");
        }));

        assert!(result.is_err());
        assert!(!scheduler.is_in_flight());
        assert!(scheduler.accept(1).is_process());
    }

    #[test]
    fn test_zero_interval_clamped() {
        let scheduler = FrameScheduler::new(0);
        assert_eq!(scheduler.interval(), 1);
        assert!(scheduler.accept(7).is_process());
    }

    #[test]
    fn test_concurrent_admission_is_exclusive() {
        let scheduler = Arc::new(FrameScheduler::new(1));
        let guard = scheduler.accept(0);

        let handles: Vec<_> = (1..9)
            .map(|seq| {
                let scheduler = scheduler.clone();
                std::thread::spawn(move || scheduler.accept(seq).is_process())
            })
            .collect();
        for handle in handles {
            assert!(!handle.join().unwrap());
        }
        drop(guard);
    }
}
