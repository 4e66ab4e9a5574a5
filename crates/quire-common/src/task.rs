//! Detached background tasks.

use std::future::Future;

/// Spawn a task whose completion is deliberately never observed.
///
/// The join handle is dropped on purpose. Callers use this for work that
/// must stay off a response path, such as the fetch-time cache store: the
/// task's outcome cannot be allowed to affect what the caller returns, so
/// failures have to be handled (logged) inside the future itself.
pub fn detach<F>(fut: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    drop(tokio::spawn(fut));
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::oneshot;

    #[tokio::test]
    async fn test_detached_task_runs() {
        let (tx, rx) = oneshot::channel();

        detach(async move {
            let _ = tx.send(7u32);
        });

        assert_eq!(rx.await, Ok(7));
    }
}
