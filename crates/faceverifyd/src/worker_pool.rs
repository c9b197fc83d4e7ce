//! Fixed-size pool of OS threads for blocking work.
//!
//! Face comparison is CPU-bound and never yields, so it must not run on the
//! async runtime. Callers hand a closure to [`WorkerPool::run`] and await the
//! reply; the closure runs on one of `size` dedicated threads.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

type Job = Box<dyn FnOnce() + Send + 'static>;

#[derive(Error, Debug)]
pub enum PoolError {
    #[error("worker panicked: {0}")]
    Panicked(String),
    #[error("worker pool saturated: {0} jobs already pending")]
    Saturated(usize),
    #[error("worker pool is shut down")]
    Closed,
    #[error("worker exited before replying")]
    WorkerLost,
}

/// Clone-safe handle to the worker threads via `Arc<WorkerPool>`.
pub struct WorkerPool {
    tx: Mutex<Option<mpsc::UnboundedSender<Job>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    pending: Arc<AtomicUsize>,
    max_pending: Option<usize>,
}

/// Counts a job as pending until the job (or its rejected submission) is dropped.
struct PendingGuard(Arc<AtomicUsize>);

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

impl WorkerPool {
    /// Spawn `size` worker threads (at least one).
    ///
    /// `max_pending` caps queued plus running jobs; `None` queues without
    /// limit and without timeout, so a stuck job holds its worker forever.
    pub fn new(size: usize, max_pending: Option<usize>) -> std::io::Result<Self> {
        let size = size.max(1);
        let (tx, rx) = mpsc::unbounded_channel::<Job>();
        let rx = Arc::new(Mutex::new(rx));

        let workers = (0..size)
            .map(|id| {
                let rx = Arc::clone(&rx);
                std::thread::Builder::new()
                    .name(format!("faceverify-worker-{id}"))
                    .spawn(move || worker_loop(id, rx))
            })
            .collect::<std::io::Result<Vec<_>>>()?;

        tracing::info!(size, ?max_pending, "worker pool started");

        Ok(Self {
            tx: Mutex::new(Some(tx)),
            workers: Mutex::new(workers),
            pending: Arc::new(AtomicUsize::new(0)),
            max_pending,
        })
    }

    /// Jobs queued or running.
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    /// Run `job` on a worker thread and wait for its result.
    ///
    /// Enqueueing never suspends; awaiting the reply is the only suspension
    /// point. A panic inside `job` comes back as [`PoolError::Panicked`]
    /// carrying the panic message. The job runs to completion even if the
    /// caller stops waiting.
    pub async fn run<F, T>(&self, job: F) -> Result<T, PoolError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let guard = self.admit()?;
        let (reply_tx, reply_rx) = oneshot::channel();

        let boxed: Job = Box::new(move || {
            let outcome = panic::catch_unwind(AssertUnwindSafe(job))
                .map_err(|payload| PoolError::Panicked(panic_message(payload.as_ref())));
            // Settle the count before the caller can observe the reply.
            drop(guard);
            let _ = reply_tx.send(outcome);
        });

        let tx = self
            .tx
            .lock()
            .map_err(|_| PoolError::Closed)?
            .clone()
            .ok_or(PoolError::Closed)?;
        tx.send(boxed).map_err(|_| PoolError::Closed)?;

        reply_rx.await.map_err(|_| PoolError::WorkerLost)?
    }

    fn admit(&self) -> Result<PendingGuard, PoolError> {
        let now_pending = self.pending.fetch_add(1, Ordering::AcqRel) + 1;
        let guard = PendingGuard(Arc::clone(&self.pending));
        match self.max_pending {
            Some(limit) if now_pending > limit => {
                tracing::warn!(limit, "worker pool saturated, rejecting job");
                Err(PoolError::Saturated(limit))
            }
            _ => Ok(guard),
        }
    }

    /// Stop accepting jobs, let queued jobs finish, and join every worker.
    /// Blocks the calling thread.
    pub fn shutdown(&self) {
        if let Ok(mut tx) = self.tx.lock() {
            tx.take();
        }
        let workers = match self.workers.lock() {
            Ok(mut workers) => std::mem::take(&mut *workers),
            Err(_) => return,
        };
        for handle in workers {
            let name = handle.thread().name().unwrap_or("worker").to_string();
            if handle.join().is_err() {
                tracing::warn!(worker = %name, "worker thread panicked during shutdown");
            }
        }
        tracing::info!("worker pool stopped");
    }
}

fn worker_loop(id: usize, rx: Arc<Mutex<mpsc::UnboundedReceiver<Job>>>) {
    tracing::debug!(worker = id, "worker thread started");
    loop {
        // Only the idle worker holding the lock waits on the queue; the
        // lock is released before the job runs.
        let job = match rx.lock() {
            Ok(mut rx) => rx.blocking_recv(),
            Err(_) => None,
        };
        let Some(job) = job else { break };
        job();
    }
    tracing::debug!(worker = id, "worker thread exiting");
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::time::Duration;

    #[tokio::test]
    async fn test_runs_off_the_calling_thread() {
        let pool = WorkerPool::new(2, None).unwrap();
        let name = pool
            .run(|| std::thread::current().name().map(str::to_string))
            .await
            .unwrap();
        assert!(name.unwrap().starts_with("faceverify-worker-"));
        pool.shutdown();
    }

    #[tokio::test]
    async fn test_result_passes_through() {
        let pool = WorkerPool::new(1, None).unwrap();
        let out: Result<u32, String> =
            pool.run(|| Err("engine said no".to_string())).await.unwrap();
        assert_eq!(out, Err("engine said no".to_string()));
        pool.shutdown();
    }

    #[tokio::test]
    async fn test_panic_message_preserved() {
        let pool = WorkerPool::new(1, None).unwrap();
        let err = pool
            .run(|| -> u32 { panic!("No face detected in frame {}", 7) })
            .await
            .unwrap_err();
        match err {
            PoolError::Panicked(msg) => assert_eq!(msg, "No face detected in frame 7"),
            other => panic!("unexpected error: {other:?}"),
        }
        // The worker survives the panic.
        assert_eq!(pool.run(|| 5).await.unwrap(), 5);
        pool.shutdown();
    }

    #[tokio::test]
    async fn test_jobs_spread_over_workers() {
        let pool = Arc::new(WorkerPool::new(4, None).unwrap());
        let barrier = Arc::new(std::sync::Barrier::new(4));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let pool = Arc::clone(&pool);
                let barrier = Arc::clone(&barrier);
                tokio::spawn(async move {
                    pool.run(move || {
                        // All four must be running at once to pass the barrier.
                        barrier.wait();
                        std::thread::current().name().map(str::to_string)
                    })
                    .await
                })
            })
            .collect();

        let mut names = HashSet::new();
        for handle in handles {
            names.insert(handle.await.unwrap().unwrap());
        }
        assert_eq!(names.len(), 4);
        pool.shutdown();
    }

    #[tokio::test]
    async fn test_saturation_rejects_when_limit_set() {
        let pool = Arc::new(WorkerPool::new(1, Some(1)).unwrap());
        let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();

        let busy = {
            let pool = Arc::clone(&pool);
            tokio::spawn(async move {
                pool.run(move || {
                    let _ = release_rx.recv();
                })
                .await
            })
        };
        while pool.pending() == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let err = pool.run(|| ()).await.unwrap_err();
        assert!(matches!(err, PoolError::Saturated(1)));
        assert_eq!(pool.pending(), 1);

        release_tx.send(()).unwrap();
        busy.await.unwrap().unwrap();
        assert_eq!(pool.pending(), 0);
        pool.shutdown();
    }

    #[tokio::test]
    async fn test_run_after_shutdown_fails() {
        let pool = WorkerPool::new(1, None).unwrap();
        pool.shutdown();
        assert!(matches!(pool.run(|| ()).await, Err(PoolError::Closed)));
    }

    #[test]
    fn test_shutdown_drains_queued_jobs() {
        let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
        let pool = Arc::new(WorkerPool::new(1, None).unwrap());
        let done = Arc::new(AtomicUsize::new(0));

        let replies: Vec<_> = (0..3)
            .map(|_| {
                let pool = Arc::clone(&pool);
                let done = Arc::clone(&done);
                runtime.spawn(async move {
                    pool.run(move || {
                        std::thread::sleep(Duration::from_millis(10));
                        done.fetch_add(1, Ordering::SeqCst);
                    })
                    .await
                })
            })
            .collect();
        runtime.block_on(async {
            while pool.pending() < 3 {
                tokio::task::yield_now().await;
            }
        });

        pool.shutdown();
        assert_eq!(done.load(Ordering::SeqCst), 3);
        for reply in replies {
            runtime.block_on(reply).unwrap().unwrap();
        }
    }
}
