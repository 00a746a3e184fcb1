//! Bounded worker pool executing pipeline units.
//!
//! Workers are reusable tokio tasks pulling from a shared queue. The pool
//! spawns workers lazily up to its capacity and prefers waking an idle
//! worker over spawning a fresh task; a worker that receives nothing for
//! the idle timeout exits and is respawned on demand. Completion is
//! unordered: nothing is promised about the relative finish order of
//! unrelated units.
//!
//! Faults are contained twice: the pipeline boundary routes them to the
//! error handler with the unit's context, and the worker keeps a
//! catch-unwind backstop so a misbehaving unit can never take the worker
//! (or the pool) down with it.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures::FutureExt;
use parking_lot::Mutex;
use tokio::sync::{Notify, mpsc};

use resthost_http::{UnitExecutor, WorkUnit};

/// Sizing and shutdown knobs for the worker pool.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Maximum number of concurrent workers.
    pub capacity: usize,
    /// How long an idle worker lingers before it is reclaimed.
    pub idle_timeout: Duration,
    /// How long `dispose` waits for in-flight work.
    pub shutdown_timeout: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            capacity: 500,
            idle_timeout: Duration::from_secs(300),
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

struct Inner {
    config: DispatcherConfig,
    queue_tx: Mutex<Option<mpsc::UnboundedSender<WorkUnit>>>,
    queue_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<WorkUnit>>,
    workers: AtomicUsize,
    idle: AtomicUsize,
    pending: AtomicUsize,
    drained: Notify,
    disposed: Mutex<bool>,
}

/// Bounded pool of reusable workers running pipeline units.
///
/// Cheap to clone; clones share the same pool.
#[derive(Clone)]
pub struct WorkerDispatcher {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for WorkerDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerDispatcher")
            .field("capacity", &self.inner.config.capacity)
            .field("workers", &self.worker_count())
            .field("in_flight", &self.in_flight())
            .finish()
    }
}

impl WorkerDispatcher {
    /// Create a pool with the given configuration. Workers spawn on demand.
    #[must_use]
    pub fn new(config: DispatcherConfig) -> Self {
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        Self {
            inner: Arc::new(Inner {
                config,
                queue_tx: Mutex::new(Some(queue_tx)),
                queue_rx: tokio::sync::Mutex::new(queue_rx),
                workers: AtomicUsize::new(0),
                idle: AtomicUsize::new(0),
                pending: AtomicUsize::new(0),
                drained: Notify::new(),
                disposed: Mutex::new(false),
            }),
        }
    }

    /// Enqueue `unit` for asynchronous, unordered execution.
    ///
    /// A unit submitted after disposal is dropped; its transport side
    /// observes the dropped response sink.
    pub fn submit(&self, unit: WorkUnit) {
        {
            let queue_tx = self.inner.queue_tx.lock();
            let Some(tx) = queue_tx.as_ref() else {
                tracing::warn!(
                    request_id = unit.request_id(),
                    "dispatcher disposed; dropping work unit"
                );
                return;
            };
            self.inner.pending.fetch_add(1, Ordering::SeqCst);
            if tx.send(unit).is_err() {
                self.inner.pending.fetch_sub(1, Ordering::SeqCst);
                return;
            }
        }

        // Reuse idle workers when enough are waiting on the queue; only
        // spawn when pending units outnumber them and capacity allows.
        if self.inner.pending.load(Ordering::SeqCst) > self.inner.idle.load(Ordering::SeqCst)
            && self.inner.workers.load(Ordering::SeqCst) < self.inner.config.capacity
        {
            self.spawn_worker();
        }
    }

    fn spawn_worker(&self) {
        let inner = Arc::clone(&self.inner);
        inner.workers.fetch_add(1, Ordering::SeqCst);
        inner.idle.fetch_add(1, Ordering::SeqCst);
        tokio::spawn(worker_loop(inner));
    }

    /// Units submitted but not yet completed (queued or executing).
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.inner.pending.load(Ordering::SeqCst)
    }

    /// Live workers, idle or busy.
    #[must_use]
    pub fn worker_count(&self) -> usize {
        self.inner.workers.load(Ordering::SeqCst)
    }

    /// Whether the pool has been disposed.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        *self.inner.disposed.lock()
    }

    /// Tear the pool down.
    ///
    /// The first caller closes the queue and waits for in-flight units up
    /// to the shutdown timeout, after which workers exit as they drain.
    /// Concurrent and subsequent callers return immediately.
    pub async fn dispose(&self) {
        {
            let mut disposed = self.inner.disposed.lock();
            if *disposed {
                return;
            }
            *disposed = true;
        }

        // Closing the queue lets every worker finish its current unit,
        // drain what is already queued, and exit.
        self.inner.queue_tx.lock().take();

        let drain = async {
            loop {
                if self.inner.pending.load(Ordering::SeqCst) == 0 {
                    break;
                }
                let notified = self.inner.drained.notified();
                if self.inner.pending.load(Ordering::SeqCst) == 0 {
                    break;
                }
                notified.await;
            }
        };

        if tokio::time::timeout(self.inner.config.shutdown_timeout, drain)
            .await
            .is_err()
        {
            tracing::warn!(
                in_flight = self.in_flight(),
                "dispatcher drain timed out; releasing pool with work still in flight"
            );
        } else {
            tracing::debug!("dispatcher drained");
        }
    }
}

impl UnitExecutor for WorkerDispatcher {
    fn submit(&self, unit: WorkUnit) {
        WorkerDispatcher::submit(self, unit);
    }
}

async fn worker_loop(inner: Arc<Inner>) {
    loop {
        let unit = {
            let mut queue_rx = inner.queue_rx.lock().await;
            match tokio::time::timeout(inner.config.idle_timeout, queue_rx.recv()).await {
                Ok(Some(unit)) => unit,
                // Queue closed: the pool is disposing.
                Ok(None) => break,
                // Idle reclaim.
                Err(_) => break,
            }
        };

        inner.idle.fetch_sub(1, Ordering::SeqCst);

        let request_id = unit.request_id().to_owned();
        if std::panic::AssertUnwindSafe(unit.run())
            .catch_unwind()
            .await
            .is_err()
        {
            tracing::error!(
                request_id,
                "work unit panicked past the pipeline boundary"
            );
        }

        if inner.pending.fetch_sub(1, Ordering::SeqCst) == 1 {
            inner.drained.notify_waiters();
        }
        inner.idle.fetch_add(1, Ordering::SeqCst);
    }

    inner.idle.fetch_sub(1, Ordering::SeqCst);
    inner.workers.fetch_sub(1, Ordering::SeqCst);
}

#[cfg(test)]
mod tests {
    use super::*;

    use bytes::Bytes;
    use http::{HeaderMap, Method, StatusCode};
    use resthost_model::{
        RequestContext, ResponsePayload, ResponseValue, VerbSet,
    };
    use resthost_http::{
        BinderRegistry, ContentTypes, ErrorHandler, FilterRegistry, OperationRegistry,
        PipelineOptions, RequestPipeline, RouteRegistry,
    };
    use serde_json::{Value, json};
    use tokio::sync::oneshot;

    fn small_pool(shutdown_timeout: Duration) -> WorkerDispatcher {
        WorkerDispatcher::new(DispatcherConfig {
            capacity: 4,
            idle_timeout: Duration::from_secs(60),
            shutdown_timeout,
        })
    }

    /// Pipeline with a `/job` route whose handler sleeps `delay_ms` ms.
    fn job_pipeline(delay_ms: u64) -> Arc<RequestPipeline> {
        let routes = Arc::new(RouteRegistry::new());
        routes
            .register(VerbSet::parse("GET").unwrap(), "/job", "job")
            .unwrap();
        let operations = Arc::new(OperationRegistry::new());
        operations.register("job", move |_dto: Value| async move {
            if delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            }
            Ok(ResponseValue::Value(json!({"done": true})))
        });
        let types = Arc::new(ContentTypes::default());
        Arc::new(RequestPipeline::new(
            routes,
            Arc::clone(&types),
            Arc::new(FilterRegistry::new()),
            Arc::new(BinderRegistry::new()),
            operations,
            Arc::new(ErrorHandler::new(types, true)),
            PipelineOptions::default(),
        ))
    }

    fn job_unit(
        pipeline: &Arc<RequestPipeline>,
    ) -> (WorkUnit, oneshot::Receiver<ResponsePayload>) {
        let (ctx, rx) = RequestContext::new(
            "req",
            Method::GET,
            "/job",
            Vec::new(),
            HeaderMap::new(),
            Bytes::new(),
        );
        (WorkUnit::new(Arc::clone(pipeline), ctx), rx)
    }

    #[tokio::test]
    async fn test_should_execute_submitted_units() {
        let dispatcher = small_pool(Duration::from_secs(5));
        let pipeline = job_pipeline(0);

        let mut receivers = Vec::new();
        for _ in 0..8 {
            let (unit, rx) = job_unit(&pipeline);
            dispatcher.submit(unit);
            receivers.push(rx);
        }

        for rx in receivers {
            let payload = rx.await.unwrap();
            assert_eq!(payload.status, StatusCode::OK);
        }
        assert_eq!(dispatcher.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_should_cap_workers_at_capacity() {
        let dispatcher = small_pool(Duration::from_secs(5));
        let pipeline = job_pipeline(50);

        let receivers: Vec<_> = (0..16)
            .map(|_| {
                let (unit, rx) = job_unit(&pipeline);
                dispatcher.submit(unit);
                rx
            })
            .collect();

        assert!(dispatcher.worker_count() <= 4);

        for rx in receivers {
            rx.await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_should_reuse_idle_workers() {
        let dispatcher = small_pool(Duration::from_secs(5));
        let pipeline = job_pipeline(0);

        for _ in 0..4 {
            let (unit, rx) = job_unit(&pipeline);
            dispatcher.submit(unit);
            rx.await.unwrap();
        }

        // Sequential submissions keep hitting the same hot worker.
        assert_eq!(dispatcher.worker_count(), 1);
    }

    #[tokio::test]
    async fn test_should_drain_in_flight_units_on_dispose() {
        let dispatcher = small_pool(Duration::from_secs(5));
        let pipeline = job_pipeline(100);

        let receivers: Vec<_> = (0..3)
            .map(|_| {
                let (unit, rx) = job_unit(&pipeline);
                dispatcher.submit(unit);
                rx
            })
            .collect();

        dispatcher.dispose().await;

        assert_eq!(dispatcher.in_flight(), 0);
        for rx in receivers {
            let payload = rx.await.unwrap();
            assert_eq!(payload.status, StatusCode::OK);
        }
    }

    #[tokio::test]
    async fn test_should_dispose_exactly_once_under_concurrent_callers() {
        let dispatcher = small_pool(Duration::from_secs(5));
        let pipeline = job_pipeline(50);
        let (unit, rx) = job_unit(&pipeline);
        dispatcher.submit(unit);

        let d1 = dispatcher.clone();
        let d2 = dispatcher.clone();
        let (r1, r2) = tokio::join!(
            tokio::spawn(async move { d1.dispose().await }),
            tokio::spawn(async move { d2.dispose().await }),
        );
        r1.unwrap();
        r2.unwrap();

        assert!(dispatcher.is_disposed());
        rx.await.unwrap();

        // Disposing again is a no-op.
        dispatcher.dispose().await;
    }

    #[tokio::test]
    async fn test_should_drop_units_submitted_after_dispose() {
        let dispatcher = small_pool(Duration::from_secs(1));
        dispatcher.dispose().await;

        let pipeline = job_pipeline(0);
        let (unit, rx) = job_unit(&pipeline);
        dispatcher.submit(unit);

        // The unit never ran; the sink is dropped.
        assert!(rx.await.is_err());
    }

    #[tokio::test]
    async fn test_should_give_up_draining_after_shutdown_timeout() {
        let dispatcher = small_pool(Duration::from_millis(100));
        let pipeline = job_pipeline(10_000);
        let (unit, _rx) = job_unit(&pipeline);
        dispatcher.submit(unit);

        let started = std::time::Instant::now();
        dispatcher.dispose().await;

        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(dispatcher.in_flight() > 0);
    }
}
