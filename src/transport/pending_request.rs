use std::future::Future;

use tokio::task::JoinHandle;

/// An asynchronous send or receive that was started but not yet waited for.
pub struct PendingRequest<T> {
    handle: JoinHandle<anyhow::Result<T>>,
}

impl<T: Send + 'static> PendingRequest<T> {
    pub fn spawn<F>(request: F) -> PendingRequest<T>
    where F: Future<Output = anyhow::Result<T>> + Send + 'static
    {
        PendingRequest {
            handle: tokio::spawn(request),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    pub async fn wait(self) -> anyhow::Result<T> {
        Ok(self.handle.await??)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn test_wait_returns_result() {
        let pending = PendingRequest::spawn(async { Ok(17u32) });
        assert_eq!(pending.wait().await.unwrap(), 17);
    }

    #[tokio::test]
    async fn test_wait_propagates_error() {
        let pending: PendingRequest<u32> = PendingRequest::spawn(async { anyhow::bail!("broken") });
        assert_eq!(pending.wait().await.unwrap_err().to_string(), "broken");
    }
}
