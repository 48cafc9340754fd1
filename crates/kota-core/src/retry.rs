//! Retry wrapper for transient external failures.
//!
//! Only errors matching the transient pattern set are retried; everything
//! else propagates immediately. Backoff is exponential per attempt.

use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Whether an error message matches the transient pattern set:
/// timeouts, rate limits, connection resets, 5xx, 429, overload.
pub fn is_transient(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    if lower.contains("timeout")
        || lower.contains("timed out")
        || lower.contains("rate limit")
        || lower.contains("rate_limit")
        || lower.contains("rate-limit")
        || lower.contains("overloaded")
        || lower.contains("connection reset")
        || lower.contains("econnreset")
        || lower.contains("econnrefused")
        || lower.contains("429")
    {
        return true;
    }
    // Bare 5xx status codes embedded in the message.
    lower
        .split(|c: char| !c.is_ascii_digit())
        .filter(|tok| tok.len() == 3)
        .filter_map(|tok| tok.parse::<u32>().ok())
        .any(|code| (500..=599).contains(&code))
}

/// Attempt count and base backoff for a retried operation.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_backoff,
        }
    }

    /// Backoff before attempt `attempt` (1-based; no wait before the first).
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        self.base_backoff * 2u32.saturating_pow(attempt - 2)
    }

    /// Run `op` until it succeeds, fails non-transiently, or attempts run out.
    pub async fn run<T, E, F, Fut>(&self, label: &str, mut op: F) -> Result<T, E>
    where
        E: std::fmt::Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut last_err = None;
        for attempt in 1..=self.max_attempts {
            let backoff = self.backoff_for(attempt);
            if !backoff.is_zero() {
                tokio::time::sleep(backoff).await;
            }

            match op().await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    let transient = is_transient(&e.to_string());
                    warn!(
                        "[retry] attempt {}/{} failed: {}: {}",
                        attempt, self.max_attempts, label, e
                    );
                    if !transient {
                        return Err(e);
                    }
                    last_err = Some(e);
                }
            }
        }
        // max_attempts >= 1, so at least one error was recorded.
        Err(last_err.unwrap())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn transient_patterns_match() {
        assert!(is_transient("request timed out"));
        assert!(is_transient("Rate limit exceeded"));
        assert!(is_transient("HTTP 429 Too Many Requests"));
        assert!(is_transient("server returned 503"));
        assert!(is_transient("ECONNRESET while reading"));
        assert!(is_transient("api overloaded"));
    }

    #[test]
    fn non_transient_patterns_do_not_match() {
        assert!(!is_transient("validation failed: missing field"));
        assert!(!is_transient("HTTP 404 not found"));
        assert!(!is_transient("unique constraint violated"));
    }

    #[test]
    fn backoff_doubles_per_attempt() {
        let policy = RetryPolicy::new(4, Duration::from_secs(2));
        assert_eq!(policy.backoff_for(1), Duration::ZERO);
        assert_eq!(policy.backoff_for(2), Duration::from_secs(2));
        assert_eq!(policy.backoff_for(3), Duration::from_secs(4));
        assert_eq!(policy.backoff_for(4), Duration::from_secs(8));
    }

    #[tokio::test]
    async fn retries_transient_until_success() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(3, Duration::from_millis(1));
        let result: Result<u32, String> = policy
            .run("llm", || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err("529 overloaded".to_string())
                    } else {
                        Ok(7)
                    }
                }
            })
            .await;
        assert_eq!(result, Ok(7));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_transient_fails_immediately() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(5, Duration::from_millis(1));
        let result: Result<(), String> = policy
            .run("llm", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err("invalid api key".to_string()) }
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
