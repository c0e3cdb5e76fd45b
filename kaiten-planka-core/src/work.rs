//! Units of work and their join points.
//!
//! [`WorkGroup`] spawns units onto the tokio worker pool, optionally bounded
//! by a semaphore, and [`WorkGroup::wait_all`] is the only way to collect
//! them. [`fan_out`] runs bounded concurrent futures inside the current task,
//! for small per-card fan-outs that do not need their own task.

use std::future::Future;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::error;

pub struct WorkGroup<T> {
    name: &'static str,
    set: JoinSet<T>,
    limit: Option<Arc<Semaphore>>,
}

impl<T: Send + 'static> WorkGroup<T> {
    /// Full fan-out: every spawned unit starts immediately.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            set: JoinSet::new(),
            limit: None,
        }
    }

    /// At most `max_in_flight` units run at once; the rest wait for a permit.
    pub fn bounded(name: &'static str, max_in_flight: usize) -> Self {
        Self {
            name,
            set: JoinSet::new(),
            limit: Some(Arc::new(Semaphore::new(max_in_flight.max(1)))),
        }
    }

    pub fn spawn<F>(&mut self, unit: F)
    where
        F: Future<Output = T> + Send + 'static,
    {
        match &self.limit {
            None => {
                self.set.spawn(unit);
            }
            Some(limit) => {
                let limit = Arc::clone(limit);
                self.set.spawn(async move {
                    // the semaphore is never closed
                    let _permit = limit.acquire_owned().await.ok();
                    unit.await
                });
            }
        }
    }

    pub fn len(&self) -> usize {
        self.set.len()
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty()
    }

    /// Waits for every unit. A unit that panicked is logged and left out of
    /// the result; its siblings are unaffected.
    pub async fn wait_all(mut self) -> Vec<T> {
        let mut results = Vec::with_capacity(self.set.len());
        while let Some(joined) = self.set.join_next().await {
            match joined {
                Ok(value) => results.push(value),
                Err(e) => error!(group = self.name, error = %e, "[WORK] Unit of work aborted"),
            }
        }
        results
    }
}

/// Runs `f` over `items` with at most `limit` futures in flight and waits for
/// all of them. Output order is completion order.
pub async fn fan_out<I, F, Fut>(items: I, limit: usize, f: F) -> Vec<Fut::Output>
where
    I: IntoIterator,
    F: FnMut(I::Item) -> Fut,
    Fut: Future,
{
    stream::iter(items)
        .map(f)
        .buffer_unordered(limit.max(1))
        .collect()
        .await
}
