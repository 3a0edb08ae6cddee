use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Instant,
};

/// Source of monotonic timestamps in milliseconds.
///
/// Only differences between timestamps are meaningful, so implementations are free to pick any
/// origin as long as the values never go backwards.
pub trait TimeSource: Send + Sync {
    fn now_millis(&self) -> u64;
}

/// Milliseconds elapsed since the clock was created.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for MonotonicClock {
    fn now_millis(&self) -> u64 {
        // u64::MAX milliseconds is far beyond the lifetime of any connection
        self.origin.elapsed().as_millis() as u64
    }
}

/// A clock that only moves when told to. Clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    millis: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new(start_millis: u64) -> Self {
        Self {
            millis: Arc::new(AtomicU64::new(start_millis)),
        }
    }

    pub fn set(&self, millis: u64) {
        self.millis.store(millis, Ordering::Release);
    }

    pub fn advance(&self, millis: u64) {
        self.millis.fetch_add(millis, Ordering::AcqRel);
    }
}

impl TimeSource for ManualClock {
    fn now_millis(&self) -> u64 {
        self.millis.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_test() {
        let clock = ManualClock::new(100);
        let shared = clock.clone();
        assert_eq!(clock.now_millis(), 100);

        shared.advance(250);
        assert_eq!(clock.now_millis(), 350);

        clock.set(1000);
        assert_eq!(shared.now_millis(), 1000);
    }

    #[test]
    fn monotonic_clock_test() {
        let clock = MonotonicClock::new();
        let first = clock.now_millis();
        std::thread::sleep(std::time::Duration::from_millis(5));
        assert!(clock.now_millis() >= first + 5);
    }
}
