//! Cancellable FIFO queue of asynchronous jobs.
//!
//! The stream hub fans out one fetch per grid sub-cell through a
//! [`TaskQueue`]. Tasks start in push order, at most `concurrency` at a time,
//! while [`TaskQueue::run_pending`] is being driven. [`TaskQueue::clear`]
//! abandons every task that has not started yet:
//!
//! - its `run` closure is never invoked,
//! - its cancel hook fires exactly once,
//! - its [`TaskHandle`] resolves to [`TaskCanceled`].
//!
//! Tasks that already started run to completion; the queue does not abort
//! in-flight network calls.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::StreamExt;
use futures::future::BoxFuture;
use futures::stream::FuturesUnordered;
use tokio::sync::oneshot;

/// The task was removed from its queue before it started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("task canceled before it started")]
pub struct TaskCanceled;

impl From<oneshot::error::RecvError> for TaskCanceled {
    fn from(_: oneshot::error::RecvError) -> Self {
        Self
    }
}

type RunFn<T> = Box<dyn FnOnce() -> BoxFuture<'static, T> + Send>;
type CancelFn = Box<dyn FnOnce() + Send>;

/// A unit of asynchronous work plus an optional cancel hook.
pub struct Task<T> {
    run: RunFn<T>,
    on_cancel: Option<CancelFn>,
}

impl<T> Task<T> {
    /// Wrap a closure producing the task's future.
    pub fn new<F, Fut>(run: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = T> + Send + 'static,
    {
        Self {
            run: Box::new(move || Box::pin(run())),
            on_cancel: None,
        }
    }

    /// Wrap a closure that receives `params` when the task starts.
    pub fn with_params<P, F, Fut>(params: P, run: F) -> Self
    where
        P: Send + 'static,
        F: FnOnce(P) -> Fut + Send + 'static,
        Fut: Future<Output = T> + Send + 'static,
    {
        Self::new(move || run(params))
    }

    /// Hook invoked if the task is cleared before it starts.
    #[must_use]
    pub fn on_cancel<F>(mut self, hook: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        self.on_cancel = Some(Box::new(hook));
        self
    }
}

impl<T> core::fmt::Debug for Task<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Task")
            .field("has_cancel_hook", &self.on_cancel.is_some())
            .finish_non_exhaustive()
    }
}

/// Receiver side of a pushed task.
#[derive(Debug)]
pub struct TaskHandle<T> {
    rx: oneshot::Receiver<T>,
}

impl<T> TaskHandle<T> {
    /// Wait for the task's output.
    ///
    /// # Errors
    ///
    /// Returns [`TaskCanceled`] if the task was cleared before it started.
    pub async fn join(self) -> Result<T, TaskCanceled> {
        Ok(self.rx.await?)
    }
}

struct Queued<T> {
    task: Task<T>,
    reply: oneshot::Sender<T>,
}

/// Cancellable FIFO of [`Task`]s. Cloning shares the same queue.
pub struct TaskQueue<T> {
    pending: Arc<Mutex<VecDeque<Queued<T>>>>,
}

impl<T> Clone for TaskQueue<T> {
    fn clone(&self) -> Self {
        Self {
            pending: Arc::clone(&self.pending),
        }
    }
}

impl<T> Default for TaskQueue<T> {
    fn default() -> Self {
        Self {
            pending: Arc::new(Mutex::new(VecDeque::new())),
        }
    }
}

impl<T> TaskQueue<T> {
    /// Number of tasks waiting to start.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether no task is waiting to start.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn pop(&self) -> Option<Queued<T>> {
        self.lock().pop_front()
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Queued<T>>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T> core::fmt::Debug for TaskQueue<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TaskQueue")
            .field("pending", &self.len())
            .finish()
    }
}

impl<T: Send + 'static> TaskQueue<T> {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a task and return a handle to its eventual output.
    pub fn push(&self, task: Task<T>) -> TaskHandle<T> {
        let (reply, rx) = oneshot::channel();
        self.lock().push_back(Queued { task, reply });
        TaskHandle { rx }
    }

    /// Drop every task that has not started, firing its cancel hook.
    ///
    /// Returns the number of tasks canceled.
    pub fn clear(&self) -> usize {
        let drained: Vec<Queued<T>> = self.lock().drain(..).collect();
        let canceled = drained.len();
        for queued in drained {
            if let Some(hook) = queued.task.on_cancel {
                hook();
            }
            // Dropping `reply` resolves the handle to `TaskCanceled`.
        }
        canceled
    }

    /// Start queued tasks in order, keeping at most `concurrency` running,
    /// until the queue is empty and every started task has finished.
    ///
    /// A concurrent [`TaskQueue::clear`] stops further starts; tasks already
    /// running are still awaited here so their outputs reach their handles.
    pub async fn run_pending(&self, concurrency: usize) {
        let limit = concurrency.max(1);
        let mut running = FuturesUnordered::new();
        loop {
            while running.len() < limit {
                let Some(queued) = self.pop() else { break };
                running.push(start(queued));
            }
            if running.next().await.is_none() {
                break;
            }
        }
    }
}

async fn start<T>(queued: Queued<T>) {
    let Queued { task, reply } = queued;
    let output = (task.run)().await;
    // The waiter may have given up on a superseded tick.
    let _ = reply.send(output);
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use tokio::sync::Notify;

    use super::*;

    #[tokio::test]
    async fn runs_in_push_order() {
        let queue = TaskQueue::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        let handles: Vec<_> = (0..5)
            .map(|i| {
                let order = Arc::clone(&order);
                queue.push(Task::with_params(i, move |i| async move {
                    order.lock().unwrap().push(i);
                    i * 10
                }))
            })
            .collect();

        queue.run_pending(1).await;

        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3, 4]);
        for (i, handle) in handles.into_iter().enumerate() {
            assert_eq!(handle.join().await, Ok(i * 10));
        }
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn clear_cancels_only_unstarted_tasks() {
        const TOTAL: usize = 6;
        const CONCURRENCY: usize = 2;

        let queue: TaskQueue<usize> = TaskQueue::new();
        let started = Arc::new(AtomicUsize::new(0));
        let canceled = Arc::new(AtomicUsize::new(0));
        let gate = Arc::new(Notify::new());
        let started_signal = Arc::new(Notify::new());

        let handles: Vec<_> = (0..TOTAL)
            .map(|i| {
                let started = Arc::clone(&started);
                let canceled = Arc::clone(&canceled);
                let gate = Arc::clone(&gate);
                let started_signal = Arc::clone(&started_signal);
                let task = Task::new(move || async move {
                    started.fetch_add(1, Ordering::SeqCst);
                    started_signal.notify_one();
                    gate.notified().await;
                    i
                })
                .on_cancel(move || {
                    canceled.fetch_add(1, Ordering::SeqCst);
                });
                queue.push(task)
            })
            .collect();

        let runner = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.run_pending(CONCURRENCY).await })
        };

        while started.load(Ordering::SeqCst) < CONCURRENCY {
            started_signal.notified().await;
        }

        let n = started.load(Ordering::SeqCst);
        assert_eq!(queue.clear(), TOTAL - n);
        assert_eq!(canceled.load(Ordering::SeqCst), TOTAL - n);

        gate.notify_waiters();
        runner.await.unwrap();

        // Nothing new started after the clear.
        assert_eq!(started.load(Ordering::SeqCst), n);

        let mut completed = 0;
        let mut dropped = 0;
        for handle in handles {
            match handle.join().await {
                Ok(_) => completed += 1,
                Err(TaskCanceled) => dropped += 1,
            }
        }
        assert_eq!(completed, n);
        assert_eq!(dropped, TOTAL - n);
        // Cancel hooks fire exactly once.
        assert_eq!(canceled.load(Ordering::SeqCst), TOTAL - n);
    }

    #[tokio::test]
    async fn clear_before_run_starts_nothing() {
        let queue = TaskQueue::new();
        let ran = Arc::new(AtomicUsize::new(0));
        let handle = {
            let ran = Arc::clone(&ran);
            queue.push(Task::new(move || async move {
                ran.fetch_add(1, Ordering::SeqCst);
            }))
        };
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.clear(), 1);
        queue.run_pending(4).await;
        assert_eq!(ran.load(Ordering::SeqCst), 0);
        assert_eq!(handle.join().await, Err(TaskCanceled));
    }

    #[test]
    fn debug_reports_pending_count() {
        let queue: TaskQueue<std::rc::Rc<u8>> = TaskQueue::default();
        assert_eq!(format!("{queue:?}"), "TaskQueue { pending: 0 }");

        let queue = TaskQueue::new();
        let _handle = queue.push(Task::new(|| async { 1_u8 }));
        assert_eq!(format!("{queue:?}"), "TaskQueue { pending: 1 }");
    }

    #[tokio::test]
    async fn zero_concurrency_still_makes_progress() {
        let queue = TaskQueue::new();
        let handle = queue.push(Task::new(|| async { 7 }));
        queue.run_pending(0).await;
        assert_eq!(handle.join().await, Ok(7));
    }
}
