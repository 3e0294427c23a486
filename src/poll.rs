use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{info, warn};

use crate::error::SyncError;

#[derive(Debug, PartialEq, Eq)]
pub enum PollOutcome<T> {
    Done(T),
    Cancelled,
}

/// Run `check` until it yields `Some`, sleeping `interval` between
/// unsuccessful attempts. Non-fatal errors count as unsuccessful. A `true`
/// on `cancel` stops the loop at the next sleep boundary.
pub async fn poll_until<T, F, Fut>(
    interval: Duration,
    mut cancel: watch::Receiver<bool>,
    mut check: F,
) -> Result<PollOutcome<T>, SyncError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>, SyncError>>,
{
    loop {
        if *cancel.borrow() {
            return Ok(PollOutcome::Cancelled);
        }

        match check().await {
            Ok(Some(found)) => return Ok(PollOutcome::Done(found)),
            Ok(None) => info!("Nothing yet, retrying in {}s", interval.as_secs()),
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => warn!("Check failed, retrying in {}s: {}", interval.as_secs(), e),
        }

        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            changed = cancel.changed() => {
                // sender gone means nobody can cancel; keep sleeping
                if changed.is_err() {
                    tokio::time::sleep(interval).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn stops_on_success() {
        let (_tx, rx) = watch::channel(false);
        let mut attempts = 0;
        let outcome = poll_until(Duration::from_secs(60), rx, || {
            attempts += 1;
            let n = attempts;
            async move {
                match n {
                    1 => Ok(None),
                    2 => Err(SyncError::Http {
                        status: 503,
                        body: String::new(),
                    }),
                    _ => Ok(Some(n)),
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(outcome, PollOutcome::Done(3));
    }

    #[tokio::test(start_paused = true)]
    async fn fatal_error_ends_loop() {
        let (_tx, rx) = watch::channel(false);
        let result: Result<PollOutcome<()>, _> = poll_until(Duration::from_secs(1), rx, || async {
            Err(SyncError::Auth {
                service: "gmail",
                remedy: "re-authenticate".into(),
            })
        })
        .await;
        assert!(result.unwrap_err().is_fatal());
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_interrupts_sleep() {
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(poll_until(Duration::from_secs(3600), rx, || async {
            Ok::<Option<()>, SyncError>(None)
        }));
        tokio::time::sleep(Duration::from_secs(1)).await;
        tx.send(true).unwrap();
        let outcome = handle.await.unwrap().unwrap();
        assert_eq!(outcome, PollOutcome::Cancelled);
    }
}
