//! Active instance flag.
//!
//! The only cross-invocation state inside a worker process image. Acquisition
//! is a single compare-and-swap, so two concurrent entries can never both
//! observe the flag clear. The returned [`InstanceGuard`] clears it on drop,
//! including when the session future is torn down mid-flight.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Default)]
pub struct ActiveInstanceFlag {
    active: AtomicBool,
}

impl ActiveInstanceFlag {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    #[inline]
    pub fn is_set(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Sets the flag if it is clear; `None` means another session holds it.
    pub fn try_acquire(self: &Arc<Self>) -> Option<InstanceGuard> {
        self.active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| InstanceGuard {
                flag: Arc::clone(self),
            })
    }
}

/// Proof of holding the active instance flag.
#[derive(Debug)]
pub struct InstanceGuard {
    flag: Arc<ActiveInstanceFlag>,
}

impl Drop for InstanceGuard {
    fn drop(&mut self) {
        self.flag.active.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_acquire_fails_until_guard_dropped() {
        let flag = ActiveInstanceFlag::new();
        let guard = flag.try_acquire();
        assert!(guard.is_some());
        assert!(flag.is_set());
        assert!(flag.try_acquire().is_none());

        drop(guard);
        assert!(!flag.is_set());
        assert!(flag.try_acquire().is_some());
    }

    #[test]
    fn test_concurrent_entries_admit_exactly_one() {
        let flag = ActiveInstanceFlag::new();
        let barrier = Arc::new(std::sync::Barrier::new(8));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let f = Arc::clone(&flag);
                let b = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    b.wait();
                    f.try_acquire()
                })
            })
            .collect();
        // Guards stay alive until every thread has tried.
        let guards: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let winners = guards.iter().filter(|g| g.is_some()).count();
        assert_eq!(winners, 1);
    }
}
