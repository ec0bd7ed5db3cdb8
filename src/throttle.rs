//! Outbound rate limiting.
//!
//! A token bucket sits between the dispatcher and the transport: a burst
//! allowance, then a steady refill rate. Only chat traffic (PRIVMSG and
//! NOTICE) is subject to it; protocol plumbing such as PING/PONG and the
//! registration handshake goes out on the bypass lane.

use std::time::Duration;

use tokio::time::Instant;

/// Default burst allowance.
pub const DEFAULT_BURST: u32 = 3;

/// Default steady-state interval between messages once the burst is spent.
pub const DEFAULT_PERIOD: Duration = Duration::from_secs(2);

/// Whether a command is subject to throttling.
pub fn is_throttled_command(command: &str) -> bool {
    matches!(command, "PRIVMSG" | "NOTICE")
}

/// Token bucket throttle.
#[derive(Clone, Debug)]
pub struct Throttle {
    burst: u32,
    period: Duration,
    tokens: u32,
    /// Refill accounting anchor: the instant the bucket state was last
    /// brought up to date.
    refilled_at: Instant,
}

impl Throttle {
    pub fn new(burst: u32, period: Duration) -> Throttle {
        Throttle {
            burst,
            period,
            tokens: burst,
            refilled_at: Instant::now(),
        }
    }

    fn refill(&mut self, now: Instant) {
        if self.tokens >= self.burst {
            self.refilled_at = now;
            return;
        }
        let elapsed = now.saturating_duration_since(self.refilled_at);
        let earned = (elapsed.as_millis() / self.period.as_millis().max(1)) as u32;
        if earned == 0 {
            return;
        }
        if self.tokens + earned >= self.burst {
            self.tokens = self.burst;
            self.refilled_at = now;
        } else {
            self.tokens += earned;
            self.refilled_at += self.period * earned;
        }
    }

    /// Take a token if one is available right now.
    pub fn try_acquire(&mut self) -> bool {
        let now = Instant::now();
        self.refill(now);
        if self.tokens > 0 {
            self.tokens -= 1;
            true
        } else {
            false
        }
    }

    /// When the next token becomes available, if none is available now.
    pub fn next_ready(&self) -> Option<Instant> {
        if self.tokens > 0 {
            None
        } else {
            Some(self.refilled_at + self.period)
        }
    }

    /// Wait until a token is available and take it.
    pub async fn acquire(&mut self) {
        loop {
            if self.try_acquire() {
                return;
            }
            match self.next_ready() {
                Some(at) => tokio::time::sleep_until(at).await,
                None => continue,
            }
        }
    }
}

impl Default for Throttle {
    fn default() -> Throttle {
        Throttle::new(DEFAULT_BURST, DEFAULT_PERIOD)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_classes() {
        assert!(is_throttled_command("PRIVMSG"));
        assert!(is_throttled_command("NOTICE"));
        assert!(!is_throttled_command("PING"));
        assert!(!is_throttled_command("PONG"));
        assert!(!is_throttled_command("NICK"));
        assert!(!is_throttled_command("USER"));
        assert!(!is_throttled_command("CAP"));
        assert!(!is_throttled_command("AUTHENTICATE"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_then_blocked() {
        let mut throttle = Throttle::default();
        assert!(throttle.try_acquire());
        assert!(throttle.try_acquire());
        assert!(throttle.try_acquire());
        assert!(!throttle.try_acquire());
        assert!(throttle.next_ready().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_refill_after_period() {
        let mut throttle = Throttle::default();
        for _ in 0..3 {
            assert!(throttle.try_acquire());
        }
        assert!(!throttle.try_acquire());

        tokio::time::advance(DEFAULT_PERIOD).await;
        assert!(throttle.try_acquire());
        assert!(!throttle.try_acquire());
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_refills_only_to_burst() {
        let mut throttle = Throttle::default();
        for _ in 0..3 {
            assert!(throttle.try_acquire());
        }
        tokio::time::advance(DEFAULT_PERIOD * 100).await;
        // A long idle stretch earns back at most the burst allowance.
        for _ in 0..3 {
            assert!(throttle.try_acquire());
        }
        assert!(!throttle.try_acquire());
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_waits() {
        let mut throttle = Throttle::new(1, Duration::from_secs(2));
        throttle.acquire().await;

        let before = Instant::now();
        throttle.acquire().await;
        assert!(before.elapsed() >= Duration::from_secs(2));
    }
}
