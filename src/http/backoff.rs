//! Retry backoff calculation (spec §4.1).

use std::time::Duration;

/// Base delay and retry cap for the HTTP client's retry policy.
#[derive(Debug, Clone, Copy)]
pub struct BackoffConfig {
    pub base_delay: Duration,
    pub max_retries: u32,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(1000),
            max_retries: 4,
        }
    }
}

impl BackoffConfig {
    /// `base * 2^(attempt-1) * jitter`, jitter uniform in `[1.0, 1.2]`.
    ///
    /// `attempt` is 1-based: the delay computed *before* the second attempt
    /// uses `attempt == 1`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = 2f64.powi(attempt.saturating_sub(1) as i32);
        let jitter = 1.0 + fastrand::f64() * 0.2;
        self.base_delay.mul_f64(factor * jitter)
    }

    /// Combine the computed backoff delay with a `Retry-After` hint: the
    /// larger of the two wins (spec §4.1).
    pub fn delay_with_retry_after(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        let computed = self.delay_for_attempt(attempt);
        match retry_after {
            Some(hint) if hint > computed => hint,
            _ => computed,
        }
    }
}

/// Parse a `Retry-After` header value: either an integer number of seconds,
/// or an HTTP-date (RFC 2822 / RFC 1123 style).
pub fn parse_retry_after(value: &str, now: chrono::DateTime<chrono::Utc>) -> Option<Duration> {
    if let Ok(secs) = value.trim().parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    if let Ok(parsed) = chrono::DateTime::parse_from_rfc2822(value.trim()) {
        let delta = parsed.with_timezone(&chrono::Utc) - now;
        let millis = delta.num_milliseconds();
        if millis > 0 {
            return Some(Duration::from_millis(millis as u64));
        }
        return Some(Duration::ZERO);
    }
    None
}
