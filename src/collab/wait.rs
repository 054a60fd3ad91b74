//! Bounded polling used by readiness checks

use crate::collab::CollaboratorError;
use crate::core::interval::WaitInterval;
use std::future::Future;
use tokio::time::{sleep, timeout, Instant};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Run `check` every `interval.poll` until it yields a value or `interval.timeout` elapses
///
/// A check returning `Ok(None)` means "not ready yet". A `CommandFailed` or a
/// single call timing out is treated the same way, since the object may not
/// exist yet or the API server may be slow. Each call is cut off at the overall
/// deadline. Other errors end the wait immediately.
pub async fn poll_until<T, F, Fut>(
    what: &str,
    interval: WaitInterval,
    cancel: &CancellationToken,
    mut check: F,
) -> Result<T, CollaboratorError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>, CollaboratorError>>,
{
    let deadline = Instant::now() + interval.timeout;

    loop {
        if cancel.is_cancelled() {
            return Err(CollaboratorError::Cancelled);
        }

        let remaining = deadline.saturating_duration_since(Instant::now());
        match timeout(remaining, check()).await {
            Ok(Ok(Some(value))) => return Ok(value),
            Ok(Ok(None)) => debug!("{} not ready yet", what),
            Ok(Err(CollaboratorError::CommandFailed { message, .. })) => {
                debug!("{} not ready yet: {}", what, message)
            }
            Ok(Err(CollaboratorError::Timeout { what: call, after })) => {
                debug!("{} not ready yet: {} timed out after {:?}", what, call, after)
            }
            Ok(Err(e)) => return Err(e),
            Err(_) => debug!("{} still checking at the deadline", what),
        }

        let now = Instant::now();
        if now >= deadline {
            return Err(CollaboratorError::Timeout {
                what: what.to_string(),
                after: interval.timeout,
            });
        }

        let pause = interval.poll.min(deadline - now);
        tokio::select! {
            _ = sleep(pause) => {}
            _ = cancel.cancelled() => return Err(CollaboratorError::Cancelled),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn interval(timeout_ms: u64, poll_ms: u64) -> WaitInterval {
        WaitInterval::new(
            Duration::from_millis(timeout_ms),
            Duration::from_millis(poll_ms),
        )
    }

    #[tokio::test]
    async fn test_ready_after_a_few_polls() {
        let calls = AtomicU32::new(0);
        let result = poll_until("deployment", interval(1000, 5), &CancellationToken::new(), || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move { Ok(if n >= 2 { Some(n) } else { None }) }
        })
        .await
        .unwrap();
        assert_eq!(result, 2);
    }

    #[tokio::test]
    async fn test_times_out() {
        let err = poll_until::<(), _, _>("deployment", interval(30, 5), &CancellationToken::new(), || async {
            Ok(None)
        })
        .await
        .unwrap_err();
        assert!(matches!(err, CollaboratorError::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_cancel_stops_wait_early() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let started = std::time::Instant::now();
        let err = poll_until::<(), _, _>("deployment", interval(10_000, 5), &cancel, || async {
            Ok(None)
        })
        .await
        .unwrap_err();
        assert!(matches!(err, CollaboratorError::Cancelled));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_invalid_response_is_not_retried() {
        let calls = AtomicU32::new(0);
        let err = poll_until::<(), _, _>("service", interval(1000, 5), &CancellationToken::new(), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(CollaboratorError::InvalidResponse("garbage".to_string())) }
        })
        .await
        .unwrap_err();
        assert!(matches!(err, CollaboratorError::InvalidResponse(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_slow_call_timeout_is_retried() {
        let calls = AtomicU32::new(0);
        let result = poll_until("deployment", interval(1000, 5), &CancellationToken::new(), || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err(CollaboratorError::Timeout {
                        what: "kubectl get deployment".to_string(),
                        after: Duration::from_secs(60),
                    })
                } else {
                    Ok(Some(n))
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(result, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_hanging_call_is_cut_off_at_deadline() {
        let started = std::time::Instant::now();
        let err = poll_until::<(), _, _>("service", interval(50, 5), &CancellationToken::new(), || async {
            sleep(Duration::from_secs(30)).await;
            Ok(Some(()))
        })
        .await
        .unwrap_err();
        match err {
            CollaboratorError::Timeout { what, after } => {
                assert_eq!(what, "service");
                assert_eq!(after, Duration::from_millis(50));
            }
            other => panic!("expected timeout, got {:?}", other),
        }
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
