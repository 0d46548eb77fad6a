use crate::{InvokeError, InvokeResult};
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Run `op` up to `attempts` times with a fixed `delay` between attempts.
///
/// `op` receives the 1-based attempt number. Non-retryable errors end the loop
/// immediately, exhaustion returns the last error. Cancellation aborts both
/// the running attempt and the wait and yields [`InvokeError::Cancelled`].
pub async fn retry<T, F, Fut>(
    attempts: u32,
    delay: Duration,
    cancel: &CancellationToken,
    mut op: F,
) -> InvokeResult<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = InvokeResult<T>>,
{
    let attempts = attempts.max(1);
    let mut attempt = 1;
    loop {
        let result = tokio::select! {
            _ = cancel.cancelled() => return Err(InvokeError::Cancelled),
            result = op(attempt) => result,
        };

        let err = match result {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };
        if attempt >= attempts || !err.is_retryable() {
            return Err(err);
        }

        tracing::debug!(attempt, attempts, error = %err, "Attempt failed, retrying");
        tokio::select! {
            _ = cancel.cancelled() => return Err(InvokeError::Cancelled),
            _ = tokio::time::sleep(delay) => {}
        }
        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result = retry(5, Duration::from_millis(1), &CancellationToken::new(), |attempt| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                if attempt < 3 {
                    Err(InvokeError::Transport("refused".into()))
                } else {
                    Ok(attempt)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhaustion_returns_last_error() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result: InvokeResult<()> =
            retry(3, Duration::from_millis(1), &CancellationToken::new(), |attempt| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(InvokeError::Transport(format!("attempt {attempt}")))
                }
            })
            .await;

        match result {
            Err(InvokeError::Transport(msg)) => assert_eq!(msg, "attempt 3"),
            other => panic!("unexpected result: {other:?}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_retryable_error_stops_immediately() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result: InvokeResult<()> =
            retry(5, Duration::from_millis(1), &CancellationToken::new(), |_| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(InvokeError::NoFallbackReconciler {
                        component: "istio".into(),
                    })
                }
            })
            .await;

        assert!(matches!(result, Err(InvokeError::NoFallbackReconciler { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancellation_aborts_wait() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();

        let handle = tokio::spawn(async move {
            retry(10, Duration::from_secs(60), &cancel, |_| async {
                Err::<(), _>(InvokeError::Transport("refused".into()))
            })
            .await
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        trigger.cancel();

        let result = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("retry did not observe cancellation")
            .unwrap();
        assert!(matches!(result, Err(InvokeError::Cancelled)));
    }
}
