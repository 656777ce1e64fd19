//! Failure classification and wait computation for API requests
//!
//! Rate-limited requests wait for the advertised reset and are retried without
//! limit. Transient failures back off geometrically and share a small retry
//! budget. Everything else fails immediately.

use std::time::Duration;

use ghpulse_core::{RateLimitInfo, RetryConfig};
use reqwest::StatusCode;

/// How a failed request should be handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Quota exhausted; wait for the window to reset
    RateLimited,
    /// Likely to succeed if repeated
    Transient,
    /// Repeating will not help
    Fatal,
}

impl ErrorClass {
    /// Classify a failed request
    ///
    /// `status` is `None` when no response arrived at all.
    /// `graphql_rate_limited` is set when a GraphQL body reported
    /// `RATE_LIMITED` regardless of the HTTP status.
    pub fn classify(
        status: Option<StatusCode>,
        rate_limit: &RateLimitInfo,
        graphql_rate_limited: bool,
    ) -> Self {
        if graphql_rate_limited {
            return ErrorClass::RateLimited;
        }

        let Some(status) = status else {
            return ErrorClass::Transient;
        };

        match status {
            StatusCode::FORBIDDEN | StatusCode::TOO_MANY_REQUESTS if rate_limit.is_exhausted() => {
                ErrorClass::RateLimited
            }
            StatusCode::TOO_MANY_REQUESTS => ErrorClass::Transient,
            s if s.is_server_error() => ErrorClass::Transient,
            _ => ErrorClass::Fatal,
        }
    }
}

/// Retry bookkeeping for a single request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetryContext {
    /// Transient retries used so far
    pub attempt: u32,
    /// Rate-limit waits so far; these are not budgeted
    pub rate_limit_waits: u32,
    /// Delay chosen for the most recent retry
    pub last_delay: Option<Duration>,
    /// Class of the most recent failure
    pub last_class: Option<ErrorClass>,
}

impl RetryContext {
    /// Record a failure and decide how long to wait before repeating it
    ///
    /// Returns `None` when the request should not be repeated.
    pub fn next_delay(
        &mut self,
        class: ErrorClass,
        rate_limit: &RateLimitInfo,
        now_ms: i64,
        config: &RetryConfig,
    ) -> Option<Duration> {
        self.last_class = Some(class);

        let delay = match class {
            ErrorClass::RateLimited => {
                self.rate_limit_waits += 1;
                rate_limit_wait(rate_limit.reset_at, now_ms, config)
            }
            ErrorClass::Transient if self.attempt < config.max_retries => {
                let delay = config.backoff_delay(self.attempt);
                self.attempt += 1;
                delay
            }
            ErrorClass::Transient | ErrorClass::Fatal => return None,
        };

        self.last_delay = Some(delay);
        Some(delay)
    }
}

/// Time to wait before repeating a rate-limited request
///
/// Waits until the reset time (never negative) plus the configured buffer.
/// Without a reset time the fallback wait is used.
pub fn rate_limit_wait(reset_at: Option<i64>, now_ms: i64, config: &RetryConfig) -> Duration {
    match reset_at {
        Some(reset) => {
            let until_reset = reset.saturating_mul(1000).saturating_sub(now_ms).max(0);
            Duration::from_millis(until_reset as u64).saturating_add(config.rate_limit_buffer)
        }
        None => config.rate_limit_fallback,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exhausted() -> RateLimitInfo {
        RateLimitInfo {
            limit: Some(5000),
            remaining: Some(0),
            reset_at: Some(1_700_000_000),
        }
    }

    #[test]
    fn test_quota_exhausted_is_rate_limited() {
        for status in [StatusCode::FORBIDDEN, StatusCode::TOO_MANY_REQUESTS] {
            assert_eq!(
                ErrorClass::classify(Some(status), &exhausted(), false),
                ErrorClass::RateLimited
            );
        }
    }

    #[test]
    fn test_forbidden_with_quota_left_is_fatal() {
        let info = RateLimitInfo {
            remaining: Some(10),
            ..exhausted()
        };
        assert_eq!(
            ErrorClass::classify(Some(StatusCode::FORBIDDEN), &info, false),
            ErrorClass::Fatal
        );
        assert_eq!(
            ErrorClass::classify(Some(StatusCode::FORBIDDEN), &RateLimitInfo::default(), false),
            ErrorClass::Fatal
        );
    }

    #[test]
    fn test_transient_statuses() {
        let none = RateLimitInfo::default();
        for status in [
            StatusCode::INTERNAL_SERVER_ERROR,
            StatusCode::BAD_GATEWAY,
            StatusCode::SERVICE_UNAVAILABLE,
            StatusCode::TOO_MANY_REQUESTS,
        ] {
            assert_eq!(
                ErrorClass::classify(Some(status), &none, false),
                ErrorClass::Transient
            );
        }
        assert_eq!(ErrorClass::classify(None, &none, false), ErrorClass::Transient);
    }

    #[test]
    fn test_client_errors_are_fatal() {
        let none = RateLimitInfo::default();
        for status in [
            StatusCode::BAD_REQUEST,
            StatusCode::UNAUTHORIZED,
            StatusCode::NOT_FOUND,
            StatusCode::UNPROCESSABLE_ENTITY,
        ] {
            assert_eq!(
                ErrorClass::classify(Some(status), &none, false),
                ErrorClass::Fatal
            );
        }
    }

    #[test]
    fn test_graphql_rate_limit_wins() {
        assert_eq!(
            ErrorClass::classify(Some(StatusCode::OK), &RateLimitInfo::default(), true),
            ErrorClass::RateLimited
        );
    }

    #[test]
    fn test_wait_until_reset_plus_buffer() {
        let config = RetryConfig::default();
        let now_ms = 1_700_000_000_000 - 30_000;
        assert_eq!(
            rate_limit_wait(Some(1_700_000_000), now_ms, &config),
            Duration::from_secs(31)
        );
    }

    #[test]
    fn test_reset_in_the_past_waits_only_buffer() {
        let config = RetryConfig::default();
        let now_ms = 1_700_000_100_000;
        assert_eq!(
            rate_limit_wait(Some(1_700_000_000), now_ms, &config),
            Duration::from_secs(1)
        );
    }

    #[test]
    fn test_missing_reset_uses_fallback() {
        let config = RetryConfig::default();
        assert_eq!(rate_limit_wait(None, 0, &config), Duration::from_secs(60));
    }

    #[test]
    fn test_context_spends_budget_on_transient_only() {
        let config = RetryConfig::default();
        let none = RateLimitInfo::default();
        let mut ctx = RetryContext::default();

        let delays: Vec<_> = (0..4)
            .map(|_| ctx.next_delay(ErrorClass::Transient, &none, 0, &config))
            .collect();
        assert_eq!(
            delays,
            vec![
                Some(Duration::from_secs(1)),
                Some(Duration::from_secs(3)),
                Some(Duration::from_secs(9)),
                None
            ]
        );
        assert_eq!(ctx.attempt, 3);

        // Rate limits are still waited out after the budget is gone
        for _ in 0..10 {
            assert_eq!(
                ctx.next_delay(ErrorClass::RateLimited, &none, 0, &config),
                Some(Duration::from_secs(60))
            );
        }
        assert_eq!(ctx.rate_limit_waits, 10);
        assert_eq!(ctx.attempt, 3);
        assert_eq!(ctx.last_class, Some(ErrorClass::RateLimited));
    }

    #[test]
    fn test_context_never_retries_fatal() {
        let mut ctx = RetryContext::default();
        assert_eq!(
            ctx.next_delay(
                ErrorClass::Fatal,
                &RateLimitInfo::default(),
                0,
                &RetryConfig::default()
            ),
            None
        );
        assert_eq!(ctx.attempt, 0);
    }

    #[test]
    fn test_backoff_grows_geometrically() {
        let config = RetryConfig::default();
        let delays: Vec<_> = (0..3).map(|a| config.backoff_delay(a)).collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_secs(1),
                Duration::from_secs(3),
                Duration::from_secs(9)
            ]
        );
        assert!(delays.windows(2).all(|w| w[0] < w[1]));
    }
}
