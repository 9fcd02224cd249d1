use std::{future::Future, time::Duration};

use tokio_util::sync::CancellationToken;

/// Call `run_once` repeatedly, sleeping for the delay it returns, until
/// `shutdown` is cancelled. A round in progress always completes.
pub async fn run_with_shutdown<F, Fut>(
    task_name: &'static str,
    shutdown: CancellationToken,
    mut run_once: F,
) where
    F: FnMut() -> Fut,
    Fut: Future<Output = Duration>,
{
    tracing::info!(task = task_name, "Periodic task started");
    loop {
        if shutdown.is_cancelled() {
            break;
        }
        let delay = run_once().await;
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = shutdown.cancelled() => break,
        }
    }
    tracing::info!(task = task_name, "Periodic task shutting down");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn stops_on_cancel() {
        let shutdown = CancellationToken::new();
        let rounds = Arc::new(AtomicUsize::new(0));
        let task = {
            let shutdown = shutdown.clone();
            let rounds = rounds.clone();
            tokio::spawn(run_with_shutdown("test", shutdown, move || {
                let rounds = rounds.clone();
                async move {
                    rounds.fetch_add(1, Ordering::SeqCst);
                    Duration::from_millis(5)
                }
            }))
        };
        tokio::time::sleep(Duration::from_millis(40)).await;
        shutdown.cancel();
        task.await.unwrap();
        let seen = rounds.load(Ordering::SeqCst);
        assert!(seen >= 2);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(rounds.load(Ordering::SeqCst), seen);
    }

    #[tokio::test]
    async fn cancelled_before_start_runs_nothing() {
        let shutdown = CancellationToken::new();
        shutdown.cancel();
        let rounds = Arc::new(AtomicUsize::new(0));
        let r = rounds.clone();
        run_with_shutdown("test", shutdown, move || {
            let r = r.clone();
            async move {
                r.fetch_add(1, Ordering::SeqCst);
                Duration::from_secs(60)
            }
        })
        .await;
        assert_eq!(rounds.load(Ordering::SeqCst), 0);
    }
}
