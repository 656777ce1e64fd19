//! Counting admission gate for async tasks
//!
//! Tasks are queued in submission order and started only while fewer than
//! `limit` are running. When a task finishes, successfully or not, the next
//! queued task is admitted.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll};

use thiserror::Error;
use tokio::sync::{oneshot, Notify};
use tracing::{debug, warn};
use uuid::Uuid;

type BoxedTask = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// A task did not produce a value
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LimiterError {
    /// The task panicked or was aborted
    #[error("task {0} did not complete")]
    TaskFailed(Uuid),
}

struct QueuedTask {
    id: Uuid,
    task: BoxedTask,
}

#[derive(Default)]
struct State {
    running: usize,
    queue: VecDeque<QueuedTask>,
}

struct Inner {
    limit: usize,
    state: Mutex<State>,
    idle: Notify,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, State> {
        // Bookkeeping stays consistent even if a holder panicked
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Bounds how many submitted tasks run at the same time
#[derive(Clone)]
pub struct ConcurrencyLimiter {
    inner: Arc<Inner>,
}

impl ConcurrencyLimiter {
    /// Create a limiter; a limit of zero is treated as one
    pub fn new(limit: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                limit: limit.max(1),
                state: Mutex::new(State::default()),
                idle: Notify::new(),
            }),
        }
    }

    /// Maximum number of concurrently running tasks
    pub fn limit(&self) -> usize {
        self.inner.limit
    }

    /// Tasks currently running
    pub fn running(&self) -> usize {
        self.inner.lock().running
    }

    /// Tasks waiting for a slot
    pub fn queued(&self) -> usize {
        self.inner.lock().queue.len()
    }

    /// Queue a task and get a handle resolving to its output
    ///
    /// Must be called from within a tokio runtime.
    pub fn submit<F, T>(&self, task: F) -> TaskHandle<T>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let id = Uuid::new_v4();
        let (tx, rx) = oneshot::channel();

        let task: BoxedTask = Box::pin(async move {
            // The receiver may have been dropped; the result is then unused
            let _ = tx.send(task.await);
        });

        {
            let mut state = self.inner.lock();
            state.queue.push_back(QueuedTask { id, task });
            debug!(task = %id, queued = state.queue.len(), "Task queued");
        }

        Self::admit(&self.inner);

        TaskHandle { id, rx }
    }

    /// Wait until nothing is running and nothing is queued
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let state = self.inner.lock();
                if state.running == 0 && state.queue.is_empty() {
                    return;
                }
            }

            notified.await;
        }
    }

    /// Start queued tasks while there is capacity
    fn admit(inner: &Arc<Inner>) {
        loop {
            let next = {
                let mut state = inner.lock();
                if state.running >= inner.limit {
                    return;
                }
                match state.queue.pop_front() {
                    Some(next) => {
                        state.running += 1;
                        next
                    }
                    None => return,
                }
            };

            let inner = Arc::clone(inner);
            tokio::spawn(async move {
                let QueuedTask { id, task } = next;
                debug!(task = %id, "Task started");

                // Run the task in its own tokio task so a panic is contained
                // and the slot is still released.
                if let Err(e) = tokio::spawn(task).await {
                    warn!(task = %id, error = %e, "Task did not complete");
                }

                let idle = {
                    let mut state = inner.lock();
                    state.running -= 1;
                    state.running == 0 && state.queue.is_empty()
                };
                debug!(task = %id, "Task finished");

                if idle {
                    inner.idle.notify_waiters();
                } else {
                    Self::admit(&inner);
                }
            });
        }
    }
}

impl std::fmt::Debug for ConcurrencyLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.lock();
        f.debug_struct("ConcurrencyLimiter")
            .field("limit", &self.inner.limit)
            .field("running", &state.running)
            .field("queued", &state.queue.len())
            .finish()
    }
}

/// Handle to the output of a submitted task
#[derive(Debug)]
pub struct TaskHandle<T> {
    id: Uuid,
    rx: oneshot::Receiver<T>,
}

impl<T> TaskHandle<T> {
    /// Generated identity of the task, for logging only
    pub fn id(&self) -> Uuid {
        self.id
    }
}

impl<T> Future for TaskHandle<T> {
    type Output = Result<T, LimiterError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let id = self.id;
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|result| result.map_err(|_| LimiterError::TaskFailed(id)))
    }
}
