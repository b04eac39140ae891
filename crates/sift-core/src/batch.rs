//! Paced batch execution for rate-limited upstreams.
//!
//! Items run concurrently within a batch, batches run one after another with
//! a fixed pause between them, and every item is raced against a hard
//! wall-clock timeout.

use std::future::Future;
use std::time::Duration;

use futures::future::join_all;

#[derive(Debug, Clone)]
pub struct BatchConfig {
    pub batch_size: usize,
    /// Pause between consecutive batches.
    pub delay: Duration,
    /// Per-item limit; the item's future is dropped when it fires.
    pub hard_timeout: Duration,
}

impl BatchConfig {
    pub fn new(batch_size: usize, delay: Duration, hard_timeout: Duration) -> Self {
        Self {
            batch_size: batch_size.max(1),
            delay,
            hard_timeout,
        }
    }
}

/// Run `job` for every item. Results keep input order; `None` marks an item
/// that hit the hard timeout.
pub async fn run_paced<I, R, F, Fut>(items: Vec<I>, config: &BatchConfig, job: F) -> Vec<(I, Option<R>)>
where
    I: Clone,
    F: Fn(I) -> Fut,
    Fut: Future<Output = R>,
{
    let total = items.len();
    let mut results = Vec::with_capacity(total);
    let batch_size = config.batch_size.max(1);

    for (n, batch) in items.chunks(batch_size).enumerate() {
        if n > 0 && !config.delay.is_zero() {
            tokio::time::sleep(config.delay).await;
        }
        let outputs = join_all(batch.iter().cloned().map(|item| {
            let fut = job(item);
            async move { tokio::time::timeout(config.hard_timeout, fut).await.ok() }
        }))
        .await;
        let timed_out = outputs.iter().filter(|o| o.is_none()).count();
        if timed_out > 0 {
            tracing::debug!(batch = n, timed_out, "Batch items hit the hard timeout");
        }
        results.extend(batch.iter().cloned().zip(outputs));
    }
    results
}
