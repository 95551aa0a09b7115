use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use bruttus_agents::Dispatcher;
use bruttus_common::Error;
use futures::future::join_all;

#[derive(Debug, Clone, Copy)]
struct Span {
    id: usize,
    start: Instant,
    end: Instant,
}

fn recorded_task(
    id: usize,
    work: Duration,
    log: Arc<Mutex<Vec<Span>>>,
    fail: bool,
) -> impl FnOnce() -> futures::future::BoxFuture<'static, bruttus_common::Result<String>> + Send + 'static
{
    move || {
        Box::pin(async move {
            let start = Instant::now();
            tokio::time::sleep(work).await;
            log.lock().unwrap().push(Span {
                id,
                start,
                end: Instant::now(),
            });
            if fail {
                Err(Error::ProviderHttp {
                    provider: format!("task-{id}"),
                    status: 500,
                })
            } else {
                Ok(format!("task-{id}"))
            }
        })
    }
}

#[tokio::test]
async fn tasks_run_in_fifo_order_and_failures_are_isolated() {
    let dispatcher = Dispatcher::with_limits(1, Duration::from_millis(20));
    let log = Arc::new(Mutex::new(Vec::new()));

    let futures: Vec<_> = (1..=3)
        .map(|id| {
            dispatcher.submit(recorded_task(
                id,
                Duration::from_millis(10),
                Arc::clone(&log),
                id == 2,
            ))
        })
        .collect();
    let results = join_all(futures).await;

    assert_eq!(results[0].as_deref().unwrap(), "task-1");
    assert!(matches!(results[1], Err(Error::ProviderHttp { status: 500, .. })));
    assert_eq!(results[2].as_deref().unwrap(), "task-3");

    let order: Vec<usize> = log.lock().unwrap().iter().map(|s| s.id).collect();
    assert_eq!(order, vec![1, 2, 3]);
}

#[tokio::test]
async fn cooldown_separates_consecutive_tasks() {
    let cooldown = Duration::from_millis(80);
    let dispatcher = Dispatcher::with_limits(1, cooldown);
    let log = Arc::new(Mutex::new(Vec::new()));

    let futures: Vec<_> = (0..3)
        .map(|id| {
            dispatcher.submit(recorded_task(
                id,
                Duration::from_millis(5),
                Arc::clone(&log),
                false,
            ))
        })
        .collect();
    join_all(futures).await;

    let spans = log.lock().unwrap().clone();
    assert_eq!(spans.len(), 3);
    for pair in spans.windows(2) {
        let gap = pair[1].start.duration_since(pair[0].end);
        assert!(
            gap >= cooldown,
            "task {} started {gap:?} after task {} ended",
            pair[1].id,
            pair[0].id
        );
    }
}

#[tokio::test]
async fn wider_dispatcher_runs_tasks_concurrently() {
    let work = Duration::from_millis(150);
    let dispatcher = Dispatcher::with_limits(2, Duration::ZERO);
    let log = Arc::new(Mutex::new(Vec::new()));

    let started = Instant::now();
    let futures: Vec<_> = (0..2)
        .map(|id| dispatcher.submit(recorded_task(id, work, Arc::clone(&log), false)))
        .collect();
    let results = join_all(futures).await;
    let elapsed = started.elapsed();

    assert!(results.iter().all(|r| r.is_ok()));
    assert!(
        elapsed < work * 2,
        "tasks took {elapsed:?}, expected concurrent execution"
    );
}

#[tokio::test]
async fn shutdown_finishes_queued_work_then_rejects() {
    let dispatcher = Dispatcher::with_limits(1, Duration::from_millis(10));
    let log = Arc::new(Mutex::new(Vec::new()));

    let queued: Vec<_> = (0..2)
        .map(|id| {
            dispatcher.submit(recorded_task(
                id,
                Duration::from_millis(5),
                Arc::clone(&log),
                false,
            ))
        })
        .collect();
    dispatcher.shutdown().await;

    assert_eq!(log.lock().unwrap().len(), 2);
    for result in join_all(queued).await {
        assert!(result.is_ok());
    }

    let late = dispatcher
        .submit(recorded_task(9, Duration::ZERO, Arc::clone(&log), false))
        .await;
    assert!(matches!(late, Err(Error::DispatcherClosed)));
}
