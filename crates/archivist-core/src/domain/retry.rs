//! Retry/backoff policy: failure classification and delay computation.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::{CrawlError, ErrorKind};

/// Backoff policy for transient failures.
///
/// Exponential backoff: delay = base_delay * multiplier^(attempts - 1), capped
/// at `max_delay`. Once `max_attempts` attempts have been charged the entry is
/// given up on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Delay before the first retry.
    pub base_delay: Duration,

    pub multiplier: f64,

    /// Upper bound for any computed delay.
    pub max_delay: Duration,

    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(2),
            multiplier: 2.0,
            max_delay: Duration::from_secs(300),
            max_attempts: 5,
        }
    }
}

impl RetryPolicy {
    /// Delay before the next retry after `attempts` charged attempts (1-indexed).
    ///
    /// With base_delay=2s, multiplier=2.0:
    /// - attempt 1 (first failure): 2s
    /// - attempt 2: 4s
    /// - attempt 3: 8s
    pub fn next_delay(&self, attempts: u32) -> Duration {
        let exponent = attempts.saturating_sub(1).min(i32::MAX as u32) as i32;
        let delay_secs = self.base_delay.as_secs_f64() * self.multiplier.powi(exponent);
        if !delay_secs.is_finite() || delay_secs >= self.max_delay.as_secs_f64() {
            return self.max_delay;
        }
        Duration::from_secs_f64(delay_secs.max(0.0))
    }

    pub fn is_exhausted(&self, attempts: u32) -> bool {
        attempts >= self.max_attempts
    }

    /// How long a rate-limited request should wait, from its `Retry-After`
    /// header. Missing or unparseable headers wait `base_delay`.
    pub fn retry_after(&self, header: Option<&str>, now: DateTime<Utc>) -> Duration {
        header
            .and_then(|value| parse_retry_after(value, now))
            .unwrap_or(self.base_delay)
    }
}

/// What to do with a job whose execution failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Retire the job: acknowledge, never retry, not an error for the transport.
    Retire,

    /// Sleep for the hint, then hand the same job back without charging an attempt.
    SleepThenRedeliver(Duration),

    /// Hand to the transport's bounded exponential retry.
    Backoff,

    /// Never retried.
    Fatal,
}

pub fn classify(err: &CrawlError) -> Disposition {
    match err {
        CrawlError::RateLimited { retry_after } => Disposition::SleepThenRedeliver(*retry_after),
        other => match other.kind() {
            ErrorKind::AccessDenied => Disposition::Retire,
            ErrorKind::Transient => Disposition::Backoff,
            ErrorKind::Fatal | ErrorKind::RateLimited => Disposition::Fatal,
        },
    }
}

/// Parse a `Retry-After` header value: delta-seconds or an HTTP date.
///
/// Negative or past values clamp to zero. Returns `None` when the value is
/// neither form.
pub fn parse_retry_after(value: &str, now: DateTime<Utc>) -> Option<Duration> {
    let value = value.trim();
    if let Ok(secs) = value.parse::<i64>() {
        return Some(Duration::from_secs(secs.max(0) as u64));
    }
    let at = DateTime::parse_from_rfc2822(value).ok()?.with_timezone(&Utc);
    Some((at - now).to_std().unwrap_or(Duration::ZERO))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rstest::rstest;

    #[test]
    fn default_policy_has_reasonable_values() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.base_delay, Duration::from_secs(2));
        assert_eq!(policy.multiplier, 2.0);
        assert_eq!(policy.max_attempts, 5);
    }

    #[test]
    fn exponential_backoff_increases_until_cap() {
        let policy = RetryPolicy {
            max_delay: Duration::from_secs(10),
            ..RetryPolicy::default()
        };

        assert_eq!(policy.next_delay(1), Duration::from_secs(2));
        assert_eq!(policy.next_delay(2), Duration::from_secs(4));
        assert_eq!(policy.next_delay(3), Duration::from_secs(8));
        assert_eq!(policy.next_delay(4), Duration::from_secs(10));
        assert_eq!(policy.next_delay(60), Duration::from_secs(10));
    }

    #[test]
    fn attempt_zero_uses_base_delay() {
        assert_eq!(RetryPolicy::default().next_delay(0), Duration::from_secs(2));
    }

    #[rstest]
    #[case(CrawlError::AccessDenied("removed".into()), Disposition::Retire)]
    #[case(CrawlError::RateLimited { retry_after: Duration::from_secs(3) }, Disposition::SleepThenRedeliver(Duration::from_secs(3)))]
    #[case(CrawlError::Transient("503".into()), Disposition::Backoff)]
    #[case(CrawlError::Fatal("unexpected shape".into()), Disposition::Fatal)]
    fn failures_are_classified(#[case] err: CrawlError, #[case] expected: Disposition) {
        assert_eq!(classify(&err), expected);
    }

    #[rstest]
    #[case("3", Some(Duration::from_secs(3)))]
    #[case(" 120 ", Some(Duration::from_secs(120)))]
    #[case("-4", Some(Duration::ZERO))]
    #[case("Mon, 01 Jan 2024 12:00:30 GMT", Some(Duration::from_secs(30)))]
    #[case("Mon, 01 Jan 2024 11:59:00 GMT", Some(Duration::ZERO))]
    #[case("soon", None)]
    fn retry_after_accepts_seconds_and_http_dates(
        #[case] header: &str,
        #[case] expected: Option<Duration>,
    ) {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        assert_eq!(parse_retry_after(header, now), expected);
    }

    #[test]
    fn unusable_retry_after_falls_back_to_base_delay() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let policy = RetryPolicy::default();
        assert_eq!(policy.retry_after(Some("7"), now), Duration::from_secs(7));
        assert_eq!(policy.retry_after(Some("later"), now), policy.base_delay);
        assert_eq!(policy.retry_after(None, now), policy.base_delay);
    }
}
