// Bounded worker pool: a shared task queue drained by a fixed number of workers,
// each result written into the slot of its input index.

use std::collections::VecDeque;
use std::future::Future;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::debug;

#[derive(Debug, Clone, Copy)]
pub struct WorkerPool {
    workers: usize,
    delay: Duration,
}

impl WorkerPool {
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
            delay: Duration::ZERO,
        }
    }

    pub fn sequential() -> Self {
        Self::new(1)
    }

    /// Pause each worker takes between consecutive items
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Process every input with `task`, at most `workers` at a time.
    ///
    /// The returned vector has one slot per input, in input order. A slot is `None`
    /// only when cancellation stopped the pool before that input was started;
    /// an input that was started always runs to completion.
    pub async fn run<T, R, F, Fut>(&self, inputs: Vec<T>, cancel: &CancellationToken, task: F) -> Vec<Option<R>>
    where
        F: Fn(usize, T) -> Fut,
        Fut: Future<Output = R>,
    {
        let total = inputs.len();
        let queue = Mutex::new(inputs.into_iter().enumerate().collect::<VecDeque<_>>());
        let slots = Mutex::new((0..total).map(|_| None).collect::<Vec<Option<R>>>());
        let worker_count = self.workers.min(total.max(1));

        let workers = (0..worker_count).map(|worker_id| {
            let queue = &queue;
            let slots = &slots;
            let task = &task;
            async move {
                loop {
                    if cancel.is_cancelled() {
                        debug!(worker_id, "Cancellation requested, worker stopping");
                        break;
                    }

                    let next = queue.lock().await.pop_front();
                    let Some((index, input)) = next else {
                        break;
                    };

                    let result = task(index, input).await;
                    slots.lock().await[index] = Some(result);

                    if !self.delay.is_zero() && !queue.lock().await.is_empty() {
                        tokio::select! {
                            _ = tokio::time::sleep(self.delay) => {}
                            _ = cancel.cancelled() => {}
                        }
                    }
                }
            }
        });

        futures::future::join_all(workers).await;
        slots.into_inner()
    }
}

impl Default for WorkerPool {
    fn default() -> Self {
        Self::sequential()
    }
}
