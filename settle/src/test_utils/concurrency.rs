use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio::sync::Barrier;

/// Outer budget for tests that must finish quickly on a loaded CI machine.
pub const CI_QUICK_TIMEOUT: Duration = Duration::from_secs(5);

/// A predicate that counts its evaluations and turns true on a chosen call.
#[derive(Debug, Clone)]
pub struct CountingPredicate {
    calls: Arc<AtomicU32>,
    succeed_on: Option<u32>,
}

impl CountingPredicate {
    /// Returns true from the `call`-th evaluation onwards (1-based).
    pub fn succeeding_on(call: u32) -> Self {
        Self {
            calls: Arc::new(AtomicU32::new(0)),
            succeed_on: Some(call),
        }
    }

    /// Never returns true.
    pub fn never() -> Self {
        Self {
            calls: Arc::new(AtomicU32::new(0)),
            succeed_on: None,
        }
    }

    pub fn check(&self) -> bool {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.succeed_on.is_some_and(|target| call >= target)
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

/// Spawn `count` tasks released together by a barrier; results come back in
/// spawn order, skipping tasks that panicked.
pub async fn spawn_tasks_with_barrier<F, Fut, T>(count: usize, task_fn: F) -> Vec<T>
where
    F: Fn(usize) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    let barrier = Arc::new(Barrier::new(count));
    let task_fn = Arc::new(task_fn);

    let handles: Vec<_> = (0..count)
        .map(|i| {
            let barrier = barrier.clone();
            let task_fn = task_fn.clone();
            tokio::spawn(async move {
                // Released only once every task is spawned
                barrier.wait().await;
                task_fn(i).await
            })
        })
        .collect();

    let mut results = Vec::with_capacity(count);
    for handle in handles {
        if let Ok(result) = handle.await {
            results.push(result);
        }
    }
    results
}

/// Fail instead of hanging when `fut` outlives `budget`.
pub async fn with_ci_timeout<T, Fut>(label: &str, budget: Duration, fut: Fut) -> anyhow::Result<T>
where
    Fut: Future<Output = T>,
{
    tokio::time::timeout(budget, fut)
        .await
        .map_err(|_| anyhow::anyhow!("'{label}' still running after {budget:?}"))
}
