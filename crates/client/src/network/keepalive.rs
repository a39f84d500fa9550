//! Notification socket keep-alive
//!
//! The daemon sends keep-alive records on an open notification handle, so
//! a silent notification socket means the daemon or the network is gone.
//! The timer restarts on every received chunk.

use std::time::Duration;
use tokio::time::Instant;

/// Reason reported when the idle timer expires
pub const KEEPALIVE_REASON: &str = "pigpio keep-alive timeout";

#[derive(Debug, Clone)]
pub struct KeepAlive {
    timeout: Duration,
    deadline: Option<Instant>,
}

impl KeepAlive {
    /// A zero timeout disables the timer
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            deadline: None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        !self.timeout.is_zero()
    }

    pub fn arm(&mut self, now: Instant) {
        if self.is_enabled() {
            // Past the representable range the timer never fires
            self.deadline = now.checked_add(self.timeout);
        }
    }

    /// Restart the timer after activity
    pub fn touch(&mut self, now: Instant) {
        if self.deadline.is_some() {
            self.arm(now);
        }
    }

    pub fn disarm(&mut self) {
        self.deadline = None;
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// True once, when the deadline has passed
    pub fn expired(&mut self, now: Instant) -> bool {
        if self.deadline.is_some_and(|d| d <= now) {
            self.deadline = None;
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
    fn test_disabled() {
        let mut keepalive = KeepAlive::new(Duration::ZERO);
        keepalive.arm(Instant::now());
        assert!(keepalive.deadline().is_none());
        assert!(!keepalive.expired(Instant::now() + Duration::from_secs(3600)));
    }

    #[test]
    fn test_huge_timeout_never_fires() {
        let now = Instant::now();
        let mut keepalive = KeepAlive::new(Duration::MAX);
        keepalive.arm(now);
        keepalive.touch(now);
        assert!(keepalive.deadline().is_none());
        assert!(!keepalive.expired(now + Duration::from_secs(86_400)));
    }

    #[test]
    fn test_touch_extends() {
        let start = Instant::now();
        let mut keepalive = KeepAlive::new(Duration::from_secs(60));
        keepalive.arm(start);

        keepalive.touch(start + Duration::from_secs(50));
        assert!(!keepalive.expired(start + Duration::from_secs(70)));
        assert!(keepalive.expired(start + Duration::from_secs(110)));
        // Reported once
        assert!(!keepalive.expired(start + Duration::from_secs(120)));
    }

    #[test]
    fn test_touch_does_not_arm() {
        let mut keepalive = KeepAlive::new(Duration::from_secs(1));
        keepalive.touch(Instant::now());
        assert!(keepalive.deadline().is_none());

        keepalive.arm(Instant::now());
        keepalive.disarm();
        assert!(keepalive.deadline().is_none());
    }
}
