//! Bounded fan-out for remote requests.

use super::errors::{Result, SyncError};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Caps the number of in-flight requests across every future run through it.
#[derive(Debug, Clone)]
pub struct Limiter {
    semaphore: Arc<Semaphore>,
}

impl Limiter {
    pub fn new(max_in_flight: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max_in_flight.max(1))),
        }
    }

    /// Run `fut` once a permit is available.
    pub async fn run<F, T>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|e| SyncError::Internal(format!("request limiter closed: {}", e)))?;
        fut.await
    }

    /// Run `f` over every item with bounded concurrency, stopping at the first error.
    pub async fn try_for_each<I, F, Fut>(&self, items: I, f: F) -> Result<()>
    where
        I: IntoIterator,
        F: Fn(I::Item) -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        let tasks = items.into_iter().map(|item| self.run(f(item)));
        futures_util::future::try_join_all(tasks).await?;
        Ok(())
    }
}
