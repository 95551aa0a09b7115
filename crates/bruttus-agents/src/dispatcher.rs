//! Rate-limited, FIFO scheduler for outbound provider calls.
//!
//! Every call to an LLM provider goes through one [`Dispatcher`] so the
//! process never exceeds `max_concurrent` in-flight requests, and each slot
//! stays closed for `cooldown` after its task settles. Providers enforce
//! requests-per-minute limits; spacing calls out keeps us clear of HTTP 429s
//! without any coordination with the provider.

use std::future::Future;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bruttus_common::{Error, Result};
use bruttus_config::DispatcherConfig;
use futures::future::BoxFuture;
use tokio::sync::{Semaphore, mpsc, oneshot};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};

type Invoke = Box<dyn FnOnce() -> BoxFuture<'static, Result<String>> + Send>;

struct QueuedTask {
    seq: u64,
    invoke: Invoke,
    responder: oneshot::Sender<Result<String>>,
}

pub struct Dispatcher {
    sender: Mutex<Option<mpsc::UnboundedSender<QueuedTask>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    pending: Arc<AtomicUsize>,
    next_seq: AtomicU64,
    max_concurrent: usize,
    cooldown: Duration,
}

impl Dispatcher {
    /// Start a dispatcher and its worker task. Must be called from within a
    /// Tokio runtime.
    pub fn new(config: &DispatcherConfig) -> Self {
        Self::with_limits(config.max_concurrent, config.cooldown())
    }

    pub fn with_limits(max_concurrent: usize, cooldown: Duration) -> Self {
        let max_concurrent = max_concurrent.max(1);
        let (sender, receiver) = mpsc::unbounded_channel();
        let pending = Arc::new(AtomicUsize::new(0));
        let semaphore = Arc::new(Semaphore::new(max_concurrent));

        let worker = tokio::spawn(run_worker(
            receiver,
            semaphore,
            cooldown,
            Arc::clone(&pending),
        ));

        info!(
            max_concurrent,
            cooldown_ms = cooldown.as_millis() as u64,
            "dispatcher started"
        );

        Self {
            sender: Mutex::new(Some(sender)),
            worker: Mutex::new(Some(worker)),
            pending,
            next_seq: AtomicU64::new(0),
            max_concurrent,
            cooldown,
        }
    }

    /// Queue `task` and return a future that settles with its outcome.
    ///
    /// The task is enqueued before this returns, so queue order is the order
    /// of `submit` calls regardless of when the returned futures are polled.
    pub fn submit<F, Fut>(&self, task: F) -> impl Future<Output = Result<String>> + Send + use<F, Fut>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<String>> + Send + 'static,
    {
        let (responder, receiver) = oneshot::channel();
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        let queued = QueuedTask {
            seq,
            invoke: Box::new(move || Box::pin(task())),
            responder,
        };

        self.pending.fetch_add(1, Ordering::SeqCst);
        let enqueued = match self.sender.lock() {
            Ok(guard) => guard
                .as_ref()
                .is_some_and(|sender| sender.send(queued).is_ok()),
            Err(_) => false,
        };
        if !enqueued {
            self.pending.fetch_sub(1, Ordering::SeqCst);
            warn!(seq, "submission rejected: dispatcher is shut down");
        } else {
            debug!(seq, "task queued");
        }

        async move {
            if !enqueued {
                return Err(Error::DispatcherClosed);
            }
            // A dropped responder means the task panicked or the worker died.
            receiver.await.unwrap_or(Err(Error::DispatcherClosed))
        }
    }

    /// Tasks accepted but not yet started.
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    /// Stop accepting work, run everything already queued, and wait for the
    /// worker to finish. Idempotent.
    pub async fn shutdown(&self) {
        if let Ok(mut sender) = self.sender.lock() {
            sender.take();
        }
        let worker = self.worker.lock().ok().and_then(|mut w| w.take());
        if let Some(worker) = worker {
            if let Err(e) = worker.await {
                warn!("dispatcher worker ended abnormally: {e}");
            }
            info!("dispatcher drained");
        }
    }
}

async fn run_worker(
    mut receiver: mpsc::UnboundedReceiver<QueuedTask>,
    semaphore: Arc<Semaphore>,
    cooldown: Duration,
    pending: Arc<AtomicUsize>,
) {
    let mut running = JoinSet::new();

    while let Some(task) = receiver.recv().await {
        // Permits are handed out in request order, which keeps the queue FIFO.
        let permit = match Arc::clone(&semaphore).acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => break,
        };
        pending.fetch_sub(1, Ordering::SeqCst);

        let QueuedTask {
            seq,
            invoke,
            responder,
        } = task;

        running.spawn(async move {
            debug!(seq, "task started");
            let result = invoke().await;
            if let Err(e) = &result {
                debug!(seq, "task failed: {e}");
            }
            if responder.send(result).is_err() {
                debug!(seq, "caller went away before the task settled");
            }
            // The slot stays closed for the cooldown before the next task may use it.
            tokio::time::sleep(cooldown).await;
            drop(permit);
        });

        while let Some(finished) = running.try_join_next() {
            if let Err(e) = finished {
                warn!("dispatcher task panicked: {e}");
            }
        }
    }

    while let Some(finished) = running.join_next().await {
        if let Err(e) = finished {
            warn!("dispatcher task panicked: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[tokio::test]
    async fn zero_concurrency_is_clamped() {
        let dispatcher = Dispatcher::with_limits(0, Duration::ZERO);
        assert_eq!(dispatcher.max_concurrent(), 1);
        let out = dispatcher.submit(|| async { Ok("done".to_string()) }).await;
        assert_eq!(out.unwrap(), "done");
    }

    #[tokio::test]
    async fn submit_after_shutdown_fails() {
        let dispatcher = Dispatcher::with_limits(1, Duration::ZERO);
        dispatcher.shutdown().await;
        let out = dispatcher.submit(|| async { Ok("never".to_string()) }).await;
        assert!(matches!(out, Err(Error::DispatcherClosed)));
        assert_eq!(dispatcher.pending(), 0);
    }

    #[tokio::test]
    async fn shutdown_drains_queued_work() {
        let dispatcher = Dispatcher::with_limits(1, Duration::from_millis(5));
        let first = dispatcher.submit(|| async { Ok("a".to_string()) });
        let second = dispatcher.submit(|| async { Ok("b".to_string()) });

        dispatcher.shutdown().await;

        assert_eq!(first.await.unwrap(), "a");
        assert_eq!(second.await.unwrap(), "b");
    }

    #[tokio::test]
    async fn pending_counts_waiting_tasks() {
        let dispatcher = Dispatcher::with_limits(1, Duration::from_millis(200));
        let started = Instant::now();
        let first = dispatcher.submit(|| async { Ok("1".to_string()) });
        let second = dispatcher.submit(|| async { Ok("2".to_string()) });

        assert_eq!(first.await.unwrap(), "1");
        // second is held back by the cooldown
        assert_eq!(dispatcher.pending(), 1);
        assert_eq!(second.await.unwrap(), "2");
        assert_eq!(dispatcher.pending(), 0);
        assert!(started.elapsed() >= Duration::from_millis(200));
    }

    #[tokio::test]
    async fn panicking_task_does_not_stall_queue() {
        let dispatcher = Dispatcher::with_limits(1, Duration::ZERO);
        let bad = dispatcher.submit(|| async {
            if true {
                panic!("boom");
            }
            Ok(String::new())
        });
        let good = dispatcher.submit(|| async { Ok("still runs".to_string()) });

        assert!(matches!(bad.await, Err(Error::DispatcherClosed)));
        assert_eq!(good.await.unwrap(), "still runs");
    }
}
