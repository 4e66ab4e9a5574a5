//! Bounded-timeout helper.

use std::future::Future;
use std::time::Duration;
use thiserror::Error;

/// A bounded operation did not finish within its limit.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("operation timed out after {limit:?}")]
pub struct Elapsed {
    /// The limit that was exceeded.
    pub limit: Duration,
}

/// Run a future with an upper bound on wall-clock time.
pub async fn with_timeout<T, F>(limit: Duration, fut: F) -> Result<T, Elapsed>
where
    F: Future<Output = T>,
{
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| Elapsed { limit })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::sleep;

    #[tokio::test]
    async fn test_completes_within_limit() {
        let result = with_timeout(Duration::from_secs(1), async { 42 }).await;
        assert_eq!(result, Ok(42));
    }

    #[tokio::test]
    async fn test_expires() {
        let result = with_timeout(Duration::from_millis(10), async {
            sleep(Duration::from_secs(1)).await;
            42
        })
        .await;

        assert_eq!(
            result,
            Err(Elapsed {
                limit: Duration::from_millis(10)
            })
        );
    }
}
