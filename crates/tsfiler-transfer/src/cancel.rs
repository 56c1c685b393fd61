use std::future::Future;

use tokio_util::sync::CancellationToken;
use tsfiler_core::{TsfilerError, TsfilerResult};

/// Run `fut` until it finishes or `cancel` fires, whichever comes first.
///
/// Cancellation is checked first so an already-cancelled token never starts
/// network work.
pub(crate) async fn cancellable<T, F>(cancel: Option<&CancellationToken>, fut: F) -> TsfilerResult<T>
where
    F: Future<Output = TsfilerResult<T>>,
{
    match cancel {
        None => fut.await,
        Some(token) => {
            tokio::select! {
                biased;
                _ = token.cancelled() => Err(TsfilerError::Cancelled),
                res = fut => res,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_no_token_runs_to_completion() {
        let out = cancellable(None, async { Ok::<_, TsfilerError>(7) }).await.unwrap();
        assert_eq!(out, 7);
    }

    #[tokio::test]
    async fn test_pre_cancelled_token_short_circuits() {
        let token = CancellationToken::new();
        token.cancel();
        let res = cancellable(Some(&token), async { Ok::<_, TsfilerError>(1) }).await;
        assert!(matches!(res, Err(TsfilerError::Cancelled)));
    }

    #[tokio::test]
    async fn test_cancel_interrupts_pending_future() {
        let token = CancellationToken::new();
        let trigger = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });
        let res = cancellable(Some(&token), async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok::<_, TsfilerError>(())
        })
        .await;
        assert!(matches!(res, Err(TsfilerError::Cancelled)));
    }
}
