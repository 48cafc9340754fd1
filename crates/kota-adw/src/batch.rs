//! Batch runner: bounded-concurrency fan-out over issue ids.
//!
//! Each issue runs in its own task behind a counting semaphore. With
//! fail-fast enabled, the first failure cancels issues that have not
//! started; they complete immediately with a cancellation error.

use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub const DEFAULT_CONCURRENCY: usize = 3;

/// Error string reported for issues cancelled by fail-fast.
pub const CANCELLED_ERROR: &str = "Cancelled (fail-fast)";

#[derive(Debug, Clone, Copy)]
pub struct BatchOptions {
    pub concurrency: usize,
    pub fail_fast: bool,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            fail_fast: false,
        }
    }
}

/// Successful per-issue payload.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IssueSuccess {
    pub pr_url: Option<String>,
    pub cost_usd: f64,
}

/// Aggregate per-issue outcome.
#[derive(Debug, Clone, Serialize)]
pub struct IssueOutcome {
    pub issue: u64,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pr_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u64,
    pub cost_usd: f64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchTotals {
    pub duration_ms: u64,
    pub cost_usd: f64,
    pub success_count: usize,
    pub failure_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchResult {
    pub issues: Vec<IssueOutcome>,
    pub totals: BatchTotals,
}

/// Run `work` for each issue with at most `concurrency` in flight.
///
/// `work` is the full per-issue workflow; its failure is isolated to that
/// issue unless fail-fast is set.
pub async fn run_batch<F, Fut>(
    issues: &[u64],
    options: BatchOptions,
    work: F,
) -> BatchResult
where
    F: Fn(u64) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<IssueSuccess, String>> + Send + 'static,
{
    let started = Instant::now();
    let semaphore = Arc::new(Semaphore::new(options.concurrency.max(1)));
    let cancel = CancellationToken::new();
    let work = Arc::new(work);

    let mut handles = Vec::with_capacity(issues.len());
    for &issue in issues {
        let semaphore = Arc::clone(&semaphore);
        let cancel = cancel.clone();
        let work = Arc::clone(&work);
        let fail_fast = options.fail_fast;

        handles.push(tokio::spawn(async move {
            // Issues cancelled before acquiring a slot never start work.
            if cancel.is_cancelled() {
                return cancelled_outcome(issue);
            }
            let permit = tokio::select! {
                permit = semaphore.acquire_owned() => permit,
                () = cancel.cancelled() => return cancelled_outcome(issue),
            };
            let _permit = match permit {
                Ok(permit) => permit,
                Err(_) => return cancelled_outcome(issue),
            };
            if cancel.is_cancelled() {
                return cancelled_outcome(issue);
            }

            let issue_started = Instant::now();
            info!(issue, "batch issue starting");
            match work(issue).await {
                Ok(success) => IssueOutcome {
                    issue,
                    success: true,
                    pr_url: success.pr_url,
                    error: None,
                    duration_ms: issue_started.elapsed().as_millis() as u64,
                    cost_usd: success.cost_usd,
                },
                Err(error) => {
                    warn!(issue, error = %error, "batch issue failed");
                    if fail_fast {
                        cancel.cancel();
                    }
                    IssueOutcome {
                        issue,
                        success: false,
                        pr_url: None,
                        error: Some(error),
                        duration_ms: issue_started.elapsed().as_millis() as u64,
                        cost_usd: 0.0,
                    }
                }
            }
        }));
    }

    let mut outcomes = Vec::with_capacity(handles.len());
    for handle in handles {
        match handle.await {
            Ok(outcome) => outcomes.push(outcome),
            Err(e) => warn!(error = %e, "batch task panicked"),
        }
    }
    outcomes.sort_by_key(|o| {
        issues
            .iter()
            .position(|&i| i == o.issue)
            .unwrap_or(usize::MAX)
    });

    let totals = BatchTotals {
        duration_ms: started.elapsed().as_millis() as u64,
        cost_usd: outcomes.iter().map(|o| o.cost_usd).sum(),
        success_count: outcomes.iter().filter(|o| o.success).count(),
        failure_count: outcomes.iter().filter(|o| !o.success).count(),
    };
    BatchResult {
        issues: outcomes,
        totals,
    }
}

fn cancelled_outcome(issue: u64) -> IssueOutcome {
    IssueOutcome {
        issue,
        success: false,
        pr_url: None,
        error: Some(CANCELLED_ERROR.to_string()),
        duration_ms: 0,
        cost_usd: 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn all_issues_run_without_fail_fast() {
        let result = run_batch(&[1, 2, 3], BatchOptions::default(), |issue| async move {
            if issue == 2 {
                Err("boom".to_string())
            } else {
                Ok(IssueSuccess {
                    pr_url: Some(format!("https://example.test/pr/{issue}")),
                    cost_usd: 0.5,
                })
            }
        })
        .await;

        assert_eq!(result.totals.success_count, 2);
        assert_eq!(result.totals.failure_count, 1);
        assert!((result.totals.cost_usd - 1.0).abs() < f64::EPSILON);
        let failed = result.issues.iter().find(|o| o.issue == 2).unwrap();
        assert_eq!(failed.error.as_deref(), Some("boom"));
    }

    #[tokio::test]
    async fn concurrency_is_bounded() {
        let current = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let current2 = Arc::clone(&current);
        let peak2 = Arc::clone(&peak);

        run_batch(
            &[1, 2, 3, 4, 5, 6],
            BatchOptions {
                concurrency: 2,
                fail_fast: false,
            },
            move |_issue| {
                let current = Arc::clone(&current2);
                let peak = Arc::clone(&peak2);
                async move {
                    let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
                    current.fetch_sub(1, Ordering::SeqCst);
                    Ok(IssueSuccess::default())
                }
            },
        )
        .await;

        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn fail_fast_cancels_unstarted_issues() {
        // Every started issue fails, so whichever runs first trips the
        // cancellation and the rest return without doing work.
        let result = run_batch(
            &[1, 2, 3, 4],
            BatchOptions {
                concurrency: 1,
                fail_fast: true,
            },
            |_issue| async move { Err("boom".to_string()) },
        )
        .await;

        assert_eq!(result.totals.success_count, 0);
        assert_eq!(result.totals.failure_count, 4);
        let cancelled: Vec<&IssueOutcome> = result
            .issues
            .iter()
            .filter(|o| o.error.as_deref() == Some(CANCELLED_ERROR))
            .collect();
        assert!(!cancelled.is_empty(), "some issues should be cancelled");
        for outcome in &cancelled {
            assert_eq!(outcome.duration_ms, 0);
        }
        assert!(result
            .issues
            .iter()
            .any(|o| o.error.as_deref() == Some("boom")));
    }

    #[tokio::test]
    async fn outcomes_preserve_input_order() {
        let result = run_batch(
            &[9, 3, 7],
            BatchOptions::default(),
            |_issue| async move { Ok(IssueSuccess::default()) },
        )
        .await;
        let order: Vec<u64> = result.issues.iter().map(|o| o.issue).collect();
        assert_eq!(order, vec![9, 3, 7]);
    }
}
