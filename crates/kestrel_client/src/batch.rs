//! Batch engine: concurrent fan-out of independent operations.
//!
//! Two flavors, both layered on the executor:
//! - fail-fast: awaits every item, then surfaces the first (positionally
//!   earliest) error, or the full result vector;
//! - tolerant: returns a per-item result vector parallel to the inputs plus
//!   the failure count, never propagating.
//!
//! Fan-out is unbounded at this layer; backpressure comes from the bounded
//! per-session outbound queues underneath.

use std::future::Future;

use kestrel_common::{KestrelError, KestrelResult};

/// Spawn every future and gather results in input order.
pub(crate) async fn run_all<T, F>(futures: Vec<F>) -> Vec<KestrelResult<T>>
where
    T: Send + 'static,
    F: Future<Output = KestrelResult<T>> + Send + 'static,
{
    let handles: Vec<_> = futures.into_iter().map(tokio::spawn).collect();
    let mut results = Vec::with_capacity(handles.len());
    for handle in handles {
        results.push(match handle.await {
            Ok(result) => result,
            // The task was aborted (client close) or panicked.
            Err(_) => Err(KestrelError::Cancelled),
        });
    }
    results
}

/// Fail-fast reduction: the first error in input order wins.
pub(crate) fn first_error<T>(results: Vec<KestrelResult<T>>) -> KestrelResult<Vec<T>> {
    let mut values = Vec::with_capacity(results.len());
    for result in results {
        values.push(result?);
    }
    Ok(values)
}

/// Tolerant reduction: results stay positional, failures are counted.
pub(crate) fn count_failures<T>(results: &[KestrelResult<T>]) -> usize {
    results.iter().filter(|r| r.is_err()).count()
}
