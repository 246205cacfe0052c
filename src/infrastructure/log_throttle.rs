use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Debounces repetitive error logging per subsystem key.
///
/// A failing collaborator can fire on every tick; logging each occurrence
/// drowns the useful lines. `should_log` returns true at most once per
/// interval per key, and the caller skips the log line otherwise.
pub struct LogThrottle {
    interval: Duration,
    last: Mutex<HashMap<String, Instant>>,
}

impl LogThrottle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: Mutex::new(HashMap::new()),
        }
    }

    pub fn should_log(&self, key: &str) -> bool {
        let mut last = match self.last.lock() {
            Ok(guard) => guard,
            // Poisoned lock: favor logging over silence.
            Err(poisoned) => poisoned.into_inner(),
        };
        let now = Instant::now();
        match last.get(key) {
            Some(at) if now.duration_since(*at) < self.interval => false,
            _ => {
                last.insert(key.to_string(), now);
                true
            }
        }
    }
}

impl Default for LogThrottle {
    fn default() -> Self {
        Self::new(Duration::from_secs(60))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_log_passes_repeat_suppressed() {
        let throttle = LogThrottle::new(Duration::from_secs(60));
        assert!(throttle.should_log("feed"));
        assert!(!throttle.should_log("feed"));
    }

    #[test]
    fn test_keys_are_independent() {
        let throttle = LogThrottle::new(Duration::from_secs(60));
        assert!(throttle.should_log("feed"));
        assert!(throttle.should_log("macro"));
    }

    #[test]
    fn test_elapsed_interval_logs_again() {
        let throttle = LogThrottle::new(Duration::from_millis(0));
        assert!(throttle.should_log("feed"));
        assert!(throttle.should_log("feed"));
    }
}
