//! Fixed-capacity worker pool.
//!
//! The pool owns N threads, each blocked on its own assignment channel until
//! the pool manager hands it a task. Bookkeeping partitions workers into
//! available and in-use under a single lock; at every instant
//! `available + in_use == N`. A condition variable signalled on completion
//! lets the manager wait for a free worker without spinning.

use crate::error::{ConfigError, ServerError};
use crate::pool::Task;
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, error, trace};

/// Index of a worker within the pool.
pub type WorkerId = usize;

struct PoolState {
    idle: Vec<WorkerId>,
    in_use: usize,
}

struct PoolShared {
    state: Mutex<PoolState>,
    available: Condvar,
}

impl PoolShared {
    fn get_idle(&self) -> Option<WorkerId> {
        let mut state = self.state.lock().expect("pool state lock poisoned");
        let id = state.idle.pop()?;
        state.in_use += 1;
        Some(id)
    }

    fn report_completion(&self, id: WorkerId) {
        let mut state = self.state.lock().expect("pool state lock poisoned");
        state.idle.push(id);
        state.in_use -= 1;
        self.available.notify_one();
    }
}

/// Fixed set of worker threads with idle/busy accounting.
pub struct WorkerPool {
    assignments: Vec<Sender<Task>>,
    threads: Vec<JoinHandle<()>>,
    shared: Arc<PoolShared>,
    size: usize,
}

impl WorkerPool {
    /// Spawn `size` workers, all initially idle.
    ///
    /// A pool of fewer than one thread is a configuration error.
    pub fn new(size: usize) -> Result<Self, ServerError> {
        if size < 1 {
            return Err(ConfigError::InvalidPoolSize(size).into());
        }

        let shared = Arc::new(PoolShared {
            state: Mutex::new(PoolState {
                idle: (0..size).collect(),
                in_use: 0,
            }),
            available: Condvar::new(),
        });

        let mut assignments = Vec::with_capacity(size);
        let mut threads = Vec::with_capacity(size);

        for id in 0..size {
            let (tx, rx) = unbounded();
            let shared = Arc::clone(&shared);

            let handle = std::thread::Builder::new()
                .name(format!("worker-{id}"))
                .spawn(move || worker_loop(id, rx, shared))?;

            assignments.push(tx);
            threads.push(handle);
        }

        debug!(workers = size, "Worker pool started");

        Ok(Self {
            assignments,
            threads,
            shared,
            size,
        })
    }

    /// Number of workers in the pool.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Claim an idle worker, marking it in-use. Non-blocking; returns `None`
    /// when every worker is busy and the caller should wait and retry.
    pub fn get_idle_worker(&self) -> Option<WorkerId> {
        self.shared.get_idle()
    }

    /// Hand a task to a worker previously claimed with [`get_idle_worker`].
    ///
    /// [`get_idle_worker`]: WorkerPool::get_idle_worker
    pub fn assign(&self, id: WorkerId, task: Task) {
        if self.assignments[id].send(task).is_err() {
            // Worker thread is gone; restore the accounting so the pool
            // invariant holds and the manager can make progress.
            error!(worker = id, "Worker unavailable, task dropped");
            self.shared.report_completion(id);
        }
    }

    /// Block until at least one worker is idle, or the timeout elapses.
    pub fn wait_for_idle(&self, timeout: Duration) {
        let state = self.shared.state.lock().expect("pool state lock poisoned");
        let _ = self
            .shared
            .available
            .wait_timeout_while(state, timeout, |s| s.idle.is_empty())
            .expect("pool state lock poisoned");
    }

    /// Snapshot of (available, in-use) counts, taken under one lock.
    pub fn counts(&self) -> (usize, usize) {
        let state = self.shared.state.lock().expect("pool state lock poisoned");
        (state.idle.len(), state.in_use)
    }

    /// Disconnect every worker and join the threads.
    ///
    /// Workers finish their current task first; idle workers exit
    /// immediately.
    pub fn halt(mut self) {
        self.assignments.clear();
        for handle in self.threads.drain(..) {
            let _ = handle.join();
        }
        debug!("Worker pool halted");
    }
}

fn worker_loop(id: WorkerId, assignments: Receiver<Task>, shared: Arc<PoolShared>) {
    while let Ok(task) = assignments.recv() {
        trace!(worker = id, "Task assigned");
        task.run();
        shared.report_completion(id);
    }
    trace!(worker = id, "Worker exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_zero_size_pool_rejected() {
        assert!(matches!(
            WorkerPool::new(0),
            Err(ServerError::Config(ConfigError::InvalidPoolSize(0)))
        ));
    }

    #[test]
    fn test_get_idle_exhausts_then_recovers() {
        let pool = WorkerPool::new(2).unwrap();

        let a = pool.get_idle_worker().unwrap();
        let b = pool.get_idle_worker().unwrap();
        assert_ne!(a, b);
        assert!(pool.get_idle_worker().is_none());
        assert_eq!(pool.counts(), (0, 2));

        pool.shared.report_completion(a);
        assert_eq!(pool.counts(), (1, 1));
        assert_eq!(pool.get_idle_worker(), Some(a));

        pool.shared.report_completion(a);
        pool.shared.report_completion(b);
        pool.halt();
    }

    #[test]
    fn test_assigned_tasks_execute_and_free_worker() {
        let pool = WorkerPool::new(1).unwrap();
        let ran = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let id = loop {
                match pool.get_idle_worker() {
                    Some(id) => break id,
                    None => pool.wait_for_idle(Duration::from_millis(50)),
                }
            };
            let ran = ran.clone();
            pool.assign(
                id,
                Task::Probe(Box::new(move || {
                    ran.fetch_add(1, Ordering::SeqCst);
                })),
            );
        }

        // Wait for the last task to complete before halting.
        while pool.counts() != (1, 0) {
            std::thread::yield_now();
        }
        assert_eq!(ran.load(Ordering::SeqCst), 3);
        pool.halt();
    }

    #[test]
    fn test_partition_invariant_under_concurrent_churn() {
        let pool = WorkerPool::new(3).unwrap();

        std::thread::scope(|scope| {
            for _ in 0..4 {
                scope.spawn(|| {
                    for _ in 0..500 {
                        let (available, in_use) = pool.counts();
                        assert_eq!(available + in_use, 3);
                        assert!(in_use <= 3);

                        if let Some(id) = pool.get_idle_worker() {
                            std::thread::yield_now();
                            pool.shared.report_completion(id);
                        }
                    }
                });
            }
        });

        assert_eq!(pool.counts(), (3, 0));
        pool.halt();
    }
}
