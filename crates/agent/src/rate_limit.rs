//! Throttles the user-visible notice shown when the provider rate-limits us.

use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;

/// Lets at most one notice through per interval.
#[derive(Debug)]
pub struct RateLimitNotice {
    interval: Duration,
    last_shown: Mutex<Option<Instant>>,
}

impl RateLimitNotice {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_shown: Mutex::new(None),
        }
    }

    /// Whether a notice should be shown now. Records the time when it says yes.
    pub fn should_notify(&self) -> bool {
        let now = Instant::now();
        let mut last = self.last_shown.lock().unwrap_or_else(|e| e.into_inner());
        match *last {
            Some(at) if now.duration_since(at) < self.interval => false,
            _ => {
                *last = Some(now);
                true
            }
        }
    }

    pub fn message(retry_after_secs: u64) -> String {
        format!("Rate limit reached. Please wait about {retry_after_secs} seconds before trying again.")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn one_notice_per_interval() {
        let gate = RateLimitNotice::new(Duration::from_secs(60));
        assert!(gate.should_notify());
        assert!(!gate.should_notify());

        tokio::time::advance(Duration::from_secs(59)).await;
        assert!(!gate.should_notify());

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(gate.should_notify());
        assert!(!gate.should_notify());
    }

    #[test]
    fn message_mentions_wait() {
        assert!(RateLimitNotice::message(12).contains("12 seconds"));
    }
}
