//! Bounded-parallelism task queue.
//!
//! Submitted tasks are dispatched in submission order and at most
//! `max_concurrent` of them run at any moment. Each task reports through its
//! own [`TaskHandle`], so a failing or panicking task never affects its
//! siblings.
//!
//! # Example
//!
//! ```no_run
//! use search_pager::performance::queue::{ConcurrencyQueue, QueueConfig};
//!
//! # async fn example() -> Result<(), search_pager::performance::queue::QueueError> {
//! let queue = ConcurrencyQueue::new("products", QueueConfig::new(4));
//!
//! let handles: Vec<_> = (0..10)
//!     .map(|page| queue.submit(async move { page * 2 }))
//!     .collect();
//!
//! for handle in handles {
//!     println!("{}", handle.await?);
//! }
//! # Ok(())
//! # }
//! ```

use futures::FutureExt;
use metrics::gauge;
use search_pager_core::{Result, SearchError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Queue-related errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
    #[error("Task was cancelled")]
    Cancelled,

    #[error("Queue is shut down")]
    Closed,

    #[error("Task panicked: {0}")]
    Panicked(String),
}

impl From<QueueError> for SearchError {
    fn from(err: QueueError) -> Self {
        match err {
            QueueError::Cancelled => SearchError::Cancelled,
            other => SearchError::Internal(other.to_string()),
        }
    }
}

/// Configuration for a queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Maximum number of tasks running at once
    pub max_concurrent: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self { max_concurrent: 4 }
    }
}

impl QueueConfig {
    pub fn new(max_concurrent: usize) -> Self {
        Self { max_concurrent }
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent == 0 {
            return Err(SearchError::Configuration(
                "queue max_concurrent must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Starts a task once the dispatcher hands it a permit.
type Job = Box<dyn FnOnce(OwnedSemaphorePermit) + Send>;

#[derive(Debug, Default)]
struct QueueCounters {
    queued: AtomicUsize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

/// Keeps the in-flight count accurate however the task ends.
struct InFlightGuard {
    counters: Arc<QueueCounters>,
    name: Arc<str>,
}

impl InFlightGuard {
    fn enter(counters: Arc<QueueCounters>, name: Arc<str>) -> Self {
        let now = counters.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        counters.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        gauge!("search_queue_in_flight", "endpoint" => name.to_string()).set(now as f64);
        Self { counters, name }
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let now = self.counters.in_flight.fetch_sub(1, Ordering::SeqCst) - 1;
        gauge!("search_queue_in_flight", "endpoint" => self.name.to_string()).set(now as f64);
    }
}

/// FIFO task queue with a concurrency ceiling.
///
/// Must be created inside a Tokio runtime; the dispatcher runs as a
/// background task until the queue is dropped or shut down.
pub struct ConcurrencyQueue {
    name: Arc<str>,
    config: QueueConfig,
    sender: mpsc::UnboundedSender<Job>,
    shutdown: CancellationToken,
    counters: Arc<QueueCounters>,
}

impl ConcurrencyQueue {
    pub fn new(name: impl Into<String>, config: QueueConfig) -> Self {
        let name: Arc<str> = Arc::from(name.into());
        // a zero ceiling would park every task forever
        let permits = config.max_concurrent.max(1);
        let semaphore = Arc::new(Semaphore::new(permits));
        let (sender, receiver) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();
        let counters = Arc::new(QueueCounters::default());

        tokio::spawn(dispatch(
            receiver,
            semaphore,
            shutdown.clone(),
            Arc::clone(&counters),
        ));
        debug!("Started concurrency queue '{}' with {} slots", name, permits);

        Self {
            name,
            config,
            sender,
            shutdown,
            counters,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Tasks currently running.
    pub fn in_flight(&self) -> usize {
        self.counters.in_flight.load(Ordering::SeqCst)
    }

    /// Highest number of tasks that ever ran at once.
    pub fn peak_in_flight(&self) -> usize {
        self.counters.peak_in_flight.load(Ordering::SeqCst)
    }

    /// Tasks submitted but not yet started.
    pub fn queued(&self) -> usize {
        self.counters.queued.load(Ordering::SeqCst)
    }

    /// Queues a task. It starts once every earlier task has started and a
    /// slot is free.
    pub fn submit<F, T>(&self, task: F) -> TaskHandle<T>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let token = self.shutdown.child_token();
        let task_token = token.clone();
        let counters = Arc::clone(&self.counters);
        let name = Arc::clone(&self.name);

        let job: Job = Box::new(move |permit| {
            if task_token.is_cancelled() {
                return;
            }

            tokio::spawn(async move {
                let _permit = permit;
                let _guard = InFlightGuard::enter(counters, Arc::clone(&name));

                let outcome = tokio::select! {
                    biased;
                    _ = task_token.cancelled() => None,
                    out = AssertUnwindSafe(task).catch_unwind() => Some(out),
                };

                match outcome {
                    Some(Ok(value)) => {
                        let _ = tx.send(Ok(value));
                    }
                    Some(Err(panic)) => {
                        let message = panic_message(panic.as_ref());
                        warn!("Task in queue '{}' panicked: {}", name, message);
                        let _ = tx.send(Err(QueueError::Panicked(message)));
                    }
                    // dropping the sender reports the cancellation
                    None => debug!("Task in queue '{}' cancelled", name),
                }
            });
        });

        self.counters.queued.fetch_add(1, Ordering::SeqCst);
        if self.sender.send(job).is_err() {
            self.counters.queued.fetch_sub(1, Ordering::SeqCst);
            warn!("Queue '{}' is shut down, rejecting task", self.name);
        }

        TaskHandle {
            receiver: rx,
            token,
        }
    }

    /// Cancels every queued and running task.
    pub fn shutdown(&self) {
        debug!("Shutting down concurrency queue '{}'", self.name);
        self.shutdown.cancel();
    }
}

impl Drop for ConcurrencyQueue {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

impl fmt::Debug for ConcurrencyQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConcurrencyQueue")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("in_flight", &self.in_flight())
            .field("queued", &self.queued())
            .finish()
    }
}

async fn dispatch(
    mut receiver: mpsc::UnboundedReceiver<Job>,
    semaphore: Arc<Semaphore>,
    shutdown: CancellationToken,
    counters: Arc<QueueCounters>,
) {
    loop {
        let job = tokio::select! {
            _ = shutdown.cancelled() => break,
            job = receiver.recv() => match job {
                Some(job) => job,
                None => break,
            },
        };

        let permit = tokio::select! {
            _ = shutdown.cancelled() => break,
            permit = Arc::clone(&semaphore).acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
        };

        counters.queued.fetch_sub(1, Ordering::SeqCst);
        job(permit);
    }
    counters.queued.store(0, Ordering::SeqCst);
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Result of a submitted task. Dropping the handle cancels the task.
#[must_use = "dropping a TaskHandle cancels its task"]
pub struct TaskHandle<T> {
    receiver: oneshot::Receiver<std::result::Result<T, QueueError>>,
    token: CancellationToken,
}

impl<T> TaskHandle<T> {
    /// Cancels the task. A task that already started is stopped at its next
    /// suspension point.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Token that cancels this task.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }
}

impl<T> Future for TaskHandle<T> {
    type Output = std::result::Result<T, QueueError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.receiver).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(_)) => {
                if self.token.is_cancelled() {
                    Poll::Ready(Err(QueueError::Cancelled))
                } else {
                    Poll::Ready(Err(QueueError::Closed))
                }
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<T> Drop for TaskHandle<T> {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::time::sleep;

    #[tokio::test(start_paused = true)]
    async fn test_runs_all_tasks() {
        let queue = ConcurrencyQueue::new("test", QueueConfig::new(2));

        let handles: Vec<_> = (0..6).map(|i| queue.submit(async move { i * 10 })).collect();

        let mut results = Vec::new();
        for handle in handles {
            results.push(handle.await.unwrap());
        }
        assert_eq!(results, vec![0, 10, 20, 30, 40, 50]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_never_exceeds_max_concurrent() {
        let queue = ConcurrencyQueue::new("test", QueueConfig::new(3));
        let running = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..12)
            .map(|i| {
                let running = Arc::clone(&running);
                let max_seen = Arc::clone(&max_seen);
                queue.submit(async move {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    max_seen.fetch_max(now, Ordering::SeqCst);
                    sleep(Duration::from_millis(10 + (i % 4) * 5)).await;
                    running.fetch_sub(1, Ordering::SeqCst);
                })
            })
            .collect();

        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(max_seen.load(Ordering::SeqCst), 3);
        assert_eq!(queue.peak_in_flight(), 3);
        assert_eq!(queue.in_flight(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tasks_start_in_submission_order() {
        let queue = ConcurrencyQueue::new("test", QueueConfig::new(1));
        let started = Arc::new(Mutex::new(Vec::new()));

        let handles: Vec<_> = (0..5)
            .map(|i| {
                let started = Arc::clone(&started);
                queue.submit(async move {
                    started.lock().unwrap().push(i);
                    sleep(Duration::from_millis(5)).await;
                })
            })
            .collect();

        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(*started.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_is_isolated() {
        let queue = ConcurrencyQueue::new("test", QueueConfig::new(2));

        let failing = queue.submit(async { Err::<u32, _>("boom") });
        let panicking = queue.submit(async {
            if should_panic() {
                panic!("task exploded");
            }
            Ok::<u32, &str>(0)
        });
        let healthy = queue.submit(async { Ok::<_, &str>(7) });

        assert_eq!(failing.await.unwrap(), Err("boom"));
        assert_eq!(
            panicking.await.unwrap_err(),
            QueueError::Panicked("task exploded".to_string())
        );
        assert_eq!(healthy.await.unwrap(), Ok(7));
        assert_eq!(queue.in_flight(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_queued_and_running_tasks() {
        let queue = ConcurrencyQueue::new("test", QueueConfig::new(1));
        let ran = Arc::new(AtomicUsize::new(0));

        let blocker = {
            let ran = Arc::clone(&ran);
            queue.submit(async move {
                sleep(Duration::from_secs(60)).await;
                ran.fetch_add(1, Ordering::SeqCst);
            })
        };
        let waiting = {
            let ran = Arc::clone(&ran);
            queue.submit(async move {
                ran.fetch_add(1, Ordering::SeqCst);
            })
        };

        waiting.cancel();
        tokio::task::yield_now().await;
        blocker.cancel();

        assert_eq!(blocker.await, Err(QueueError::Cancelled));
        assert_eq!(waiting.await, Err(QueueError::Cancelled));

        let after = queue.submit(async { 1 });
        assert_eq!(after.await, Ok(1));
        assert_eq!(ran.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_cancels_everything() {
        let queue = ConcurrencyQueue::new("test", QueueConfig::new(1));
        let handle = queue.submit(async {
            sleep(Duration::from_secs(60)).await;
        });
        tokio::task::yield_now().await;

        queue.shutdown();

        assert_eq!(handle.await, Err(QueueError::Cancelled));
    }

    fn should_panic() -> bool {
        true
    }

    #[test]
    fn test_config_validation() {
        assert!(QueueConfig::default().validate().is_ok());
        assert!(QueueConfig::new(0).validate().is_err());
    }
}
