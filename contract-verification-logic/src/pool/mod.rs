use crate::{errors::ErrorExport, types::VerificationExport};
use futures::{future::BoxFuture, stream::FuturesUnordered, StreamExt};
use serde::Deserialize;
use std::{
    collections::VecDeque,
    future::Future,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::sync::{oneshot, Notify};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

/// What a worker task resolves to. Always a plain value: native error types
/// do not survive the worker boundary, so failures travel as
/// [`ErrorExport`]s and are re-raised on the dispatcher side.
#[derive(Clone, Debug)]
pub enum TaskExport {
    Verification(Box<VerificationExport>),
    Error {
        export: ErrorExport,
        /// Set when the task failed while writing into a write-or-err sink,
        /// which is what triggers the debug input dump.
        failed_sink_write: bool,
    },
}

impl TaskExport {
    pub fn error(export: ErrorExport) -> Self {
        TaskExport::Error {
            export,
            failed_sink_write: false,
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields, default)]
pub struct WorkerPoolSettings {
    pub min_threads: Option<usize>,
    pub max_threads: Option<usize>,
    pub idle_timeout_ms: u64,
    pub concurrent_tasks_per_worker: usize,
}

impl Default for WorkerPoolSettings {
    fn default() -> Self {
        Self {
            min_threads: None,
            max_threads: None,
            idle_timeout_ms: 30_000,
            concurrent_tasks_per_worker: 5,
        }
    }
}

fn host_parallelism() -> usize {
    std::thread::available_parallelism()
        .map(|parallelism| parallelism.get())
        .unwrap_or(4)
}

/// Thread bounds derived from the host parallelism `P`: `[0.5 × P, 1.5 × P]`,
/// rounded up, unless pinned explicitly by the settings.
fn thread_bounds(settings: &WorkerPoolSettings) -> (usize, usize) {
    let parallelism = host_parallelism();
    let min_threads = settings.min_threads.unwrap_or(parallelism.div_ceil(2)).max(1);
    let max_threads = settings
        .max_threads
        .unwrap_or((parallelism * 3).div_ceil(2))
        .max(min_threads);
    (min_threads, max_threads)
}

#[derive(Debug, thiserror::Error)]
#[error("worker pool is shut down")]
pub struct PoolShutDown;

#[derive(Debug, thiserror::Error)]
#[error("verification task was aborted")]
pub struct TaskAborted;

/// Completion promise of one dispatched task. Resolves with the task's
/// export, or with [`TaskAborted`] when the pool was destroyed before the
/// task could finish.
pub struct TaskHandle {
    receiver: oneshot::Receiver<TaskExport>,
}

impl TaskHandle {
    pub async fn join(self) -> Result<TaskExport, TaskAborted> {
        self.receiver.await.map_err(|_dropped| TaskAborted)
    }
}

type Job = BoxFuture<'static, ()>;

struct PoolShared {
    queue: parking_lot::Mutex<VecDeque<Job>>,
    job_available: Notify,
    shutdown: CancellationToken,
    worker_count: AtomicUsize,
    /// queued plus running tasks; drives the scale-up decision
    load: AtomicUsize,
    min_threads: usize,
    max_threads: usize,
    concurrent_tasks_per_worker: usize,
    idle_timeout: Duration,
}

/// A bounded pool of worker threads executing compile-plus-verify tasks,
/// isolated from the request-serving runtime. The pool manages its own
/// threads: `min_threads` workers are always kept alive, further workers are
/// started on demand up to `max_threads` and retire after sitting idle for
/// `idle_timeout`. Each worker runs a current-thread runtime hosting up to
/// `concurrent_tasks_per_worker` cooperatively scheduled tasks, so I/O waits
/// overlap within a worker. Destroying the pool aborts every queued and
/// in-flight task; their completion promises then report the abort so the
/// dispatcher can persist error records.
pub struct WorkerPool {
    shared: Arc<PoolShared>,
}

impl WorkerPool {
    pub fn new(settings: &WorkerPoolSettings) -> Result<Self, anyhow::Error> {
        let (min_threads, max_threads) = thread_bounds(settings);

        let shared = Arc::new(PoolShared {
            queue: parking_lot::Mutex::new(VecDeque::new()),
            job_available: Notify::new(),
            shutdown: CancellationToken::new(),
            worker_count: AtomicUsize::new(0),
            load: AtomicUsize::new(0),
            min_threads,
            max_threads,
            concurrent_tasks_per_worker: settings.concurrent_tasks_per_worker.max(1),
            idle_timeout: Duration::from_millis(settings.idle_timeout_ms),
        });

        for _ in 0..min_threads {
            shared.worker_count.fetch_add(1, Ordering::SeqCst);
            spawn_worker(Arc::clone(&shared));
        }

        Ok(Self { shared })
    }

    /// Enqueues a task. Submission never waits for capacity: jobs queue up
    /// and saturation backpressures execution, not admission. The given span
    /// travels with the task and is installed for its whole duration,
    /// keeping worker logs correlated with the request.
    pub fn spawn<F>(
        &self,
        span: tracing::Span,
        task: F,
    ) -> Result<TaskHandle, PoolShutDown>
    where
        F: Future<Output = TaskExport> + Send + 'static,
    {
        let shared = &self.shared;
        if shared.shutdown.is_cancelled() {
            return Err(PoolShutDown);
        }

        let (sender, receiver) = oneshot::channel();
        let load_shared = Arc::clone(shared);
        let job: Job = Box::pin(
            async move {
                let _ = sender.send(task.await);
                load_shared.load.fetch_sub(1, Ordering::SeqCst);
            }
            .instrument(span),
        );

        shared.load.fetch_add(1, Ordering::SeqCst);
        shared.queue.lock().push_back(job);
        self.scale_up();
        shared.job_available.notify_one();

        Ok(TaskHandle { receiver })
    }

    /// Starts workers until the count covers the current load, bounded by
    /// `max_threads`.
    fn scale_up(&self) {
        let shared = &self.shared;
        loop {
            let load = shared.load.load(Ordering::SeqCst);
            let desired = load
                .div_ceil(shared.concurrent_tasks_per_worker)
                .clamp(shared.min_threads, shared.max_threads);
            let reserved = shared
                .worker_count
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |count| {
                    (count < desired).then_some(count + 1)
                });
            match reserved {
                Ok(_) => spawn_worker(Arc::clone(shared)),
                Err(_at_capacity) => break,
            }
        }
    }

    /// Destroys the pool. Queued jobs never start and in-flight tasks are
    /// dropped at their next suspension point; outstanding completion
    /// promises resolve with [`TaskAborted`].
    pub fn shutdown(&self) {
        self.shared.shutdown.cancel();
        self.shared.queue.lock().clear();
        self.shared.job_available.notify_waiters();
    }

    pub fn is_shut_down(&self) -> bool {
        self.shared.shutdown.is_cancelled()
    }

    pub fn worker_count(&self) -> usize {
        self.shared.worker_count.load(Ordering::SeqCst)
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn spawn_worker(shared: Arc<PoolShared>) {
    let spawned = std::thread::Builder::new()
        .name("verification-worker".to_string())
        .spawn({
            let shared = Arc::clone(&shared);
            move || worker_loop(shared)
        });
    if let Err(error) = spawned {
        shared.worker_count.fetch_sub(1, Ordering::SeqCst);
        tracing::error!(error = %error, "failed to spawn a verification worker");
    }
}

enum IdleOutcome {
    Shutdown,
    Notified,
    TimedOut,
}

/// Decrements the worker count when the thread exits, including on panics,
/// unless the worker already gave its slot up by retiring.
struct WorkerCountGuard {
    shared: Arc<PoolShared>,
    armed: bool,
}

impl Drop for WorkerCountGuard {
    fn drop(&mut self) {
        if self.armed {
            self.shared.worker_count.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

fn worker_loop(shared: Arc<PoolShared>) {
    let mut count_guard = WorkerCountGuard {
        shared: Arc::clone(&shared),
        armed: true,
    };

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(error) => {
            tracing::error!(error = %error, "failed to build a worker runtime");
            return;
        }
    };

    runtime.block_on(async {
        let mut running: FuturesUnordered<Job> = FuturesUnordered::new();
        loop {
            if shared.shutdown.is_cancelled() {
                // dropping `running` aborts the in-flight tasks
                return;
            }

            while running.len() < shared.concurrent_tasks_per_worker {
                let job = shared.queue.lock().pop_front();
                match job {
                    Some(job) => running.push(job),
                    None => break,
                }
            }

            if running.is_empty() {
                let outcome = tokio::select! {
                    _ = shared.shutdown.cancelled() => IdleOutcome::Shutdown,
                    _ = shared.job_available.notified() => IdleOutcome::Notified,
                    _ = tokio::time::sleep(shared.idle_timeout) => IdleOutcome::TimedOut,
                };
                match outcome {
                    IdleOutcome::Shutdown => return,
                    IdleOutcome::Notified => {}
                    IdleOutcome::TimedOut => {
                        // retire, unless that would drop the pool below its
                        // floor; the compare-and-swap keeps concurrent
                        // retirements from overshooting
                        let retired = shared
                            .worker_count
                            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |count| {
                                (count > shared.min_threads).then_some(count - 1)
                            })
                            .is_ok();
                        if retired {
                            count_guard.armed = false;
                            return;
                        }
                    }
                }
            } else {
                tokio::select! {
                    _ = shared.shutdown.cancelled() => return,
                    _ = running.next() => {}
                    _ = shared.job_available.notified() => {}
                }
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn success_export() -> TaskExport {
        TaskExport::Verification(Box::new(VerificationExport {
            verified_contract_id: 1,
            runtime_status: None,
            creation_status: None,
        }))
    }

    #[tokio::test]
    async fn tasks_resolve_with_their_export() {
        let pool = WorkerPool::new(&WorkerPoolSettings::default()).unwrap();
        let handle = pool
            .spawn(tracing::info_span!("test"), async { success_export() })
            .unwrap();
        let export = handle.join().await.unwrap();
        assert!(matches!(export, TaskExport::Verification(_)));
        pool.shutdown();
    }

    #[tokio::test]
    async fn concurrency_is_bounded_by_worker_capacity() {
        let settings = WorkerPoolSettings {
            min_threads: Some(1),
            max_threads: Some(1),
            concurrent_tasks_per_worker: 2,
            ..Default::default()
        };
        let pool = WorkerPool::new(&settings).unwrap();

        static RUNNING: AtomicUsize = AtomicUsize::new(0);
        static PEAK: AtomicUsize = AtomicUsize::new(0);

        let mut handles = vec![];
        for _ in 0..8 {
            let handle = pool
                .spawn(tracing::info_span!("test"), async {
                    let running = RUNNING.fetch_add(1, Ordering::SeqCst) + 1;
                    PEAK.fetch_max(running, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    RUNNING.fetch_sub(1, Ordering::SeqCst);
                    success_export()
                })
                .unwrap();
            handles.push(handle);
        }
        for handle in handles {
            handle.join().await.unwrap();
        }

        assert!(PEAK.load(Ordering::SeqCst) <= 2);
        assert_eq!(pool.worker_count(), 1);
        pool.shutdown();
    }

    #[tokio::test]
    async fn workers_scale_with_load_and_retire_when_idle() {
        let settings = WorkerPoolSettings {
            min_threads: Some(1),
            max_threads: Some(3),
            idle_timeout_ms: 100,
            concurrent_tasks_per_worker: 1,
        };
        let pool = WorkerPool::new(&settings).unwrap();
        assert_eq!(pool.worker_count(), 1);

        let mut handles = vec![];
        for _ in 0..3 {
            let handle = pool
                .spawn(tracing::info_span!("test"), async {
                    tokio::time::sleep(Duration::from_millis(200)).await;
                    success_export()
                })
                .unwrap();
            handles.push(handle);
        }
        // the load of three single-task jobs demands three workers
        assert_eq!(pool.worker_count(), 3);

        for handle in handles {
            handle.join().await.unwrap();
        }

        // idle workers retire back down to the floor
        let mut retired = false;
        for _ in 0..100 {
            if pool.worker_count() == 1 {
                retired = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert!(retired, "idle workers never retired to min_threads");
        pool.shutdown();
    }

    #[tokio::test]
    async fn shutdown_aborts_in_flight_tasks() {
        let pool = WorkerPool::new(&WorkerPoolSettings::default()).unwrap();
        let handle = pool
            .spawn(tracing::info_span!("test"), async {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                success_export()
            })
            .unwrap();

        // let the task start before tearing the pool down
        tokio::time::sleep(Duration::from_millis(50)).await;
        pool.shutdown();

        let error = handle.join().await.unwrap_err();
        assert!(matches!(error, TaskAborted));
        assert!(pool.is_shut_down());
    }

    #[tokio::test]
    async fn queued_tasks_are_aborted_by_shutdown_too() {
        let settings = WorkerPoolSettings {
            min_threads: Some(1),
            max_threads: Some(1),
            concurrent_tasks_per_worker: 1,
            ..Default::default()
        };
        let pool = WorkerPool::new(&settings).unwrap();

        let blocker = pool
            .spawn(tracing::info_span!("test"), async {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                success_export()
            })
            .unwrap();
        let queued = pool
            .spawn(tracing::info_span!("test"), async { success_export() })
            .unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        pool.shutdown();

        assert!(blocker.join().await.is_err());
        assert!(queued.join().await.is_err());
    }

    #[tokio::test]
    async fn spawning_after_shutdown_is_rejected() {
        let pool = WorkerPool::new(&WorkerPoolSettings::default()).unwrap();
        pool.shutdown();
        let result = pool.spawn(tracing::info_span!("test"), async { success_export() });
        assert!(result.is_err());
    }

    #[test]
    fn thread_bounds_scale_with_parallelism() {
        let bounds = thread_bounds(&WorkerPoolSettings::default());
        let parallelism = host_parallelism();
        assert_eq!(bounds.0, parallelism.div_ceil(2));
        assert_eq!(bounds.1, (parallelism * 3).div_ceil(2));

        let pinned = thread_bounds(&WorkerPoolSettings {
            min_threads: Some(2),
            max_threads: Some(6),
            ..Default::default()
        });
        assert_eq!(pinned, (2, 6));
    }
}
