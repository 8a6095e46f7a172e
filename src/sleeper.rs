//! Sleep abstraction for the statistics loop, so it can be tested without real delays.

use std::sync::Mutex;
use std::time::Duration;

pub trait Sleeper: Send + Sync {
    fn sleep(&self, duration: Duration);
}

/// Sleeps the calling thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct RealSleeper;

impl Sleeper for RealSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Returns immediately and records each requested duration.
#[derive(Debug, Default)]
pub struct MockSleeper {
    calls: Mutex<Vec<Duration>>,
}

impl MockSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<Duration> {
        self.calls.lock().map(|calls| calls.clone()).unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|calls| calls.len()).unwrap_or(0)
    }
}

impl Sleeper for MockSleeper {
    fn sleep(&self, duration: Duration) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(duration);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn mock_sleeper_records_without_sleeping() {
        let sleeper = MockSleeper::new();
        let start = Instant::now();
        sleeper.sleep(Duration::from_secs(60));
        sleeper.sleep(Duration::from_millis(5));

        assert!(start.elapsed() < Duration::from_secs(1));
        assert_eq!(sleeper.calls(), vec![Duration::from_secs(60), Duration::from_millis(5)]);
        assert_eq!(sleeper.call_count(), 2);
    }

    #[test]
    fn real_sleeper_sleeps() {
        let start = Instant::now();
        RealSleeper.sleep(Duration::from_millis(10));
        assert!(start.elapsed() >= Duration::from_millis(10));
    }

    #[test]
    fn sleeper_trait_object() {
        let sleeper: Box<dyn Sleeper> = Box::new(MockSleeper::new());
        sleeper.sleep(Duration::ZERO);
    }
}
