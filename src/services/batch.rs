use futures::future::join_all;
use std::future::Future;
use std::time::Duration;

use crate::error::AppResult;

/// Chunk size and inter-chunk delay for one external service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimit {
    chunk_size: usize,
    delay: Duration,
}

impl RateLimit {
    /// A chunk size of zero is treated as one.
    pub fn new(chunk_size: usize, delay: Duration) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            delay,
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Number of chunks needed for `items` work items
    pub fn chunk_count(&self, items: usize) -> usize {
        items.div_ceil(self.chunk_size)
    }
}

/// Runs `fetch` over `items` in rate-limited chunks.
///
/// Items in one chunk are issued concurrently; the next chunk starts only once
/// every item of the current chunk has finished and `limit.delay()` has
/// elapsed. No delay follows the last chunk. The output has one slot per
/// input item, in input order.
///
/// A failed item becomes `None` with a warning and never affects its siblings.
/// A fatal error (see [`crate::error::AppError::is_fatal`]) stops processing
/// after the current chunk and is returned.
pub async fn fetch_in_chunks<'a, T, R, F, Fut>(
    source: &'static str,
    items: &'a [T],
    limit: RateLimit,
    fetch: F,
) -> AppResult<Vec<Option<R>>>
where
    F: Fn(&'a T) -> Fut,
    Fut: Future<Output = AppResult<Option<R>>>,
{
    let mut outcomes = Vec::with_capacity(items.len());
    let chunks = limit.chunk_count(items.len());

    for (index, chunk) in items.chunks(limit.chunk_size()).enumerate() {
        if index > 0 {
            tokio::time::sleep(limit.delay()).await;
        }

        let results = join_all(chunk.iter().map(&fetch)).await;

        let mut fatal = None;
        for result in results {
            match result {
                Ok(value) => outcomes.push(value),
                Err(e) if e.is_fatal() => {
                    fatal.get_or_insert(e);
                    outcomes.push(None);
                }
                Err(e) => {
                    tracing::warn!(provider = source, error = %e, "Lookup degraded to no result");
                    outcomes.push(None);
                }
            }
        }

        if let Some(e) = fatal {
            tracing::error!(provider = source, chunk = index, error = %e, "Aborting batch");
            return Err(e);
        }

        tracing::debug!(provider = source, chunk = index + 1, of = chunks, "Chunk complete");
    }

    Ok(outcomes)
}
