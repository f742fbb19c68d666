//! Single-tile fetch with retry.
//!
//! [`TileFetcher`] performs exactly one attempt; [`fetch_with_retry`] wraps it
//! with the scheduler's [`RetryPolicy`]. Only errors reported as transient by
//! [`TileError::is_transient`] are retried. Auth failures, rejected requests
//! and invalid coordinates resolve on the first attempt.

use std::future::Future;

use tokio_util::sync::CancellationToken;
use tracing::{trace, warn};

use crate::coord::TileCoordinate;
use crate::source::TileResult;

use super::policy::RetryPolicy;

/// One network attempt for one tile.
pub trait TileFetcher: Send + Sync + 'static {
    /// Fetches `coord` once, classifying any failure into a `TileError`.
    fn fetch(&self, coord: TileCoordinate) -> impl Future<Output = TileResult> + Send;
}

/// Outcome of a fetch including how many attempts it took.
#[derive(Debug, Clone)]
pub struct FetchReport {
    pub result: TileResult,
    pub attempts: u32,
}

/// Runs `fetcher` for `coord` until it succeeds, fails permanently, or the
/// retry budget is spent.
///
/// Returns `None` if `cancel` fires, either during an attempt (the attempt's
/// future is dropped) or during backoff.
pub async fn fetch_with_retry<F: TileFetcher>(
    fetcher: &F,
    coord: TileCoordinate,
    policy: &RetryPolicy,
    cancel: &CancellationToken,
) -> Option<FetchReport> {
    let mut attempt = 1;

    loop {
        trace!(tile = %coord, attempt, "Fetch attempt starting");

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return None,
            result = fetcher.fetch(coord) => result,
        };

        let error = match result {
            Ok(image) => {
                return Some(FetchReport {
                    result: Ok(image),
                    attempts: attempt,
                })
            }
            Err(error) if error.is_transient() => error,
            Err(error) => {
                warn!(tile = %coord, error = %error, "Fetch failed permanently");
                return Some(FetchReport {
                    result: Err(error),
                    attempts: attempt,
                });
            }
        };

        let delay = {
            let mut rng = rand::rng();
            policy.jittered_delay(attempt, &mut rng)
        };

        let Some(delay) = delay else {
            warn!(tile = %coord, attempts = attempt, error = %error, "Retries exhausted");
            return Some(FetchReport {
                result: Err(error.with_attempts(attempt)),
                attempts: attempt,
            });
        };

        warn!(
            tile = %coord,
            attempt,
            delay_ms = delay.as_millis() as u64,
            error = %error,
            "Transient failure, backing off"
        );

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return None,
            _ = tokio::time::sleep(delay) => {}
        }

        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{TileError, TileImage};
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::time::Instant;

    /// Fetcher that replays a script of results and records call times.
    #[derive(Default)]
    struct ScriptedFetcher {
        script: Mutex<VecDeque<crate::source::TileResult>>,
        calls: Mutex<Vec<Instant>>,
    }

    impl ScriptedFetcher {
        fn new(results: Vec<crate::source::TileResult>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(results.into()),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn call_count(&self) -> usize {
            self.calls.lock().len()
        }

        fn gaps(&self) -> Vec<Duration> {
            self.calls
                .lock()
                .windows(2)
                .map(|pair| pair[1] - pair[0])
                .collect()
        }
    }

    impl TileFetcher for Arc<ScriptedFetcher> {
        async fn fetch(&self, coord: TileCoordinate) -> crate::source::TileResult {
            self.calls.lock().push(Instant::now());
            self.script
                .lock()
                .pop_front()
                .unwrap_or_else(|| Ok(TileImage::new(coord, vec![0u8])))
        }
    }

    fn coord() -> TileCoordinate {
        TileCoordinate::new(5, 10, 12)
    }

    fn unavailable() -> crate::source::TileResult {
        Err(TileError::Service {
            status: 503,
            attempts: 1,
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_on_first_attempt() {
        let fetcher = ScriptedFetcher::new(vec![Ok(TileImage::new(coord(), vec![1, 2]))]);
        let report = fetch_with_retry(
            &fetcher,
            coord(),
            &RetryPolicy::exponential(3),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(report.attempts, 1);
        assert_eq!(report.result.unwrap().data().as_ref(), &[1, 2]);
        assert_eq!(fetcher.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failure_then_success() {
        let fetcher = ScriptedFetcher::new(vec![unavailable()]);
        let report = fetch_with_retry(
            &fetcher,
            coord(),
            &RetryPolicy::exponential(3),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(report.attempts, 2);
        assert!(report.result.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_are_bounded_with_increasing_delay() {
        let fetcher = ScriptedFetcher::new(vec![unavailable(), unavailable(), unavailable()]);
        let report = fetch_with_retry(
            &fetcher,
            coord(),
            &RetryPolicy::exponential(3),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(fetcher.call_count(), 3);
        assert_eq!(
            report.result,
            Err(TileError::Service {
                status: 503,
                attempts: 3
            })
        );

        let gaps = fetcher.gaps();
        assert_eq!(gaps.len(), 2);
        assert!(gaps[0] >= Duration::from_millis(200));
        assert!(gaps[0] < gaps[1], "gaps must increase: {:?}", gaps);
    }

    #[tokio::test(start_paused = true)]
    async fn test_network_errors_are_retried() {
        let network = || {
            Err(TileError::Network {
                message: "connection reset".to_string(),
                attempts: 1,
            })
        };
        let fetcher = ScriptedFetcher::new(vec![network(), network()]);
        let report = fetch_with_retry(
            &fetcher,
            coord(),
            &RetryPolicy::exponential(2),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(report.attempts, 2);
        assert!(matches!(
            report.result,
            Err(TileError::Network { attempts: 2, .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_auth_error_is_not_retried() {
        let fetcher = ScriptedFetcher::new(vec![Err(TileError::Auth {
            status: Some(401),
            reason: "token rejected".to_string(),
        })]);
        let report = fetch_with_retry(
            &fetcher,
            coord(),
            &RetryPolicy::exponential(3),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(fetcher.call_count(), 1);
        assert_eq!(report.attempts, 1);
        assert!(report.result.unwrap_err().is_auth());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_request_is_not_retried() {
        let fetcher = ScriptedFetcher::new(vec![Err(TileError::Rejected { status: 404 })]);
        let report = fetch_with_retry(
            &fetcher,
            coord(),
            &RetryPolicy::exponential(3),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(fetcher.call_count(), 1);
        assert_eq!(report.result, Err(TileError::Rejected { status: 404 }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_backoff() {
        let fetcher = ScriptedFetcher::new(vec![unavailable(), unavailable()]);
        let cancel = CancellationToken::new();

        let task = {
            let fetcher = Arc::clone(&fetcher);
            let cancel = cancel.clone();
            tokio::spawn(async move {
                fetch_with_retry(&fetcher, coord(), &RetryPolicy::exponential(3), &cancel).await
            })
        };

        // First attempt runs, then the task sleeps in backoff
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();

        assert!(task.await.unwrap().is_none());
        assert_eq!(fetcher.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_retry_policy_makes_one_attempt() {
        let fetcher = ScriptedFetcher::new(vec![unavailable()]);
        let report = fetch_with_retry(
            &fetcher,
            coord(),
            &RetryPolicy::None,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(fetcher.call_count(), 1);
        assert_eq!(report.attempts, 1);
    }
}
