//! Pool manager: the scheduler thread between the reactor and the workers.
//!
//! Tasks arrive on an unbounded FIFO channel and are dispatched in strict
//! submission order. When the queue is empty the scheduler blocks in the
//! channel receive; when every worker is busy it blocks on the pool's
//! availability condvar. Neither branch spins. A full pool only delays
//! dispatch, it never rejects work.

use crate::pool::{Task, WorkerPool};
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::io;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, trace};

/// Bound on one availability wait; the scheduler re-checks the pool after
/// each interval, so a missed notification cannot strand the head task.
const IDLE_WAIT: Duration = Duration::from_millis(50);

/// Submission handle for the pending-task queue.
pub type TaskSender = Sender<Task>;

/// Owns the scheduler thread and the submission side of the task queue.
pub struct PoolManager {
    tasks: Option<TaskSender>,
    thread: Option<JoinHandle<()>>,
}

impl PoolManager {
    /// Take ownership of the pool and start the scheduler thread.
    pub fn start(pool: WorkerPool) -> io::Result<Self> {
        let (tx, rx) = unbounded();

        let thread = std::thread::Builder::new()
            .name("pool-manager".to_string())
            .spawn(move || scheduler_loop(rx, pool))?;

        Ok(Self {
            tasks: Some(tx),
            thread: Some(thread),
        })
    }

    /// Append a task to the tail of the pending queue, waking the scheduler
    /// if it was blocked on an empty queue.
    pub fn add_task(&self, task: Task) {
        if let Some(tasks) = &self.tasks {
            let _ = tasks.send(task);
        }
    }

    /// A cloneable submission handle for other threads (the reactor).
    pub fn sender(&self) -> TaskSender {
        self.tasks
            .as_ref()
            .expect("pool manager already shut down")
            .clone()
    }

    /// Disconnect the queue and join the scheduler, which halts the pool.
    ///
    /// Queued tasks are still dispatched before the scheduler exits;
    /// in-flight tasks finish on their workers.
    pub fn shutdown(mut self) {
        self.tasks = None;
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
        debug!("Pool manager stopped");
    }
}

fn scheduler_loop(tasks: Receiver<Task>, pool: WorkerPool) {
    while let Ok(task) = tasks.recv() {
        let worker = loop {
            match pool.get_idle_worker() {
                Some(id) => break id,
                None => pool.wait_for_idle(IDLE_WAIT),
            }
        };
        trace!(worker, "Dispatching task");
        pool.assign(worker, task);
    }

    // Queue disconnected: shutdown.
    pool.halt();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Instant;

    fn wait_until(deadline: Duration, mut done: impl FnMut() -> bool) {
        let start = Instant::now();
        while !done() {
            assert!(start.elapsed() < deadline, "condition not reached in time");
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn test_all_submitted_tasks_run_under_load() {
        let pool = WorkerPool::new(2).unwrap();
        let manager = PoolManager::start(pool).unwrap();
        let ran = Arc::new(AtomicUsize::new(0));

        for _ in 0..100 {
            let ran = ran.clone();
            manager.add_task(Task::Probe(Box::new(move || {
                // Hold the worker briefly so the queue actually backs up.
                std::thread::sleep(Duration::from_millis(1));
                ran.fetch_add(1, Ordering::SeqCst);
            })));
        }

        wait_until(Duration::from_secs(10), || {
            ran.load(Ordering::SeqCst) == 100
        });
        manager.shutdown();
    }

    #[test]
    fn test_single_worker_dispatch_is_fifo() {
        let pool = WorkerPool::new(1).unwrap();
        let manager = PoolManager::start(pool).unwrap();
        let order = Arc::new(Mutex::new(Vec::new()));

        for seq in 0..20 {
            let order = order.clone();
            manager.add_task(Task::Probe(Box::new(move || {
                order.lock().unwrap().push(seq);
            })));
        }

        wait_until(Duration::from_secs(5), || order.lock().unwrap().len() == 20);
        assert_eq!(*order.lock().unwrap(), (0..20).collect::<Vec<_>>());
        manager.shutdown();
    }

    #[test]
    fn test_interleaved_submission_and_completion_never_starves() {
        let pool = WorkerPool::new(2).unwrap();
        let manager = PoolManager::start(pool).unwrap();
        let ran = Arc::new(AtomicUsize::new(0));

        for batch in 0..10 {
            for _ in 0..5 {
                let ran = ran.clone();
                manager.add_task(Task::Probe(Box::new(move || {
                    ran.fetch_add(1, Ordering::SeqCst);
                })));
            }
            // Let some tasks drain between bursts.
            wait_until(Duration::from_secs(5), || {
                ran.load(Ordering::SeqCst) >= batch * 5 + 3
            });
        }

        wait_until(Duration::from_secs(5), || ran.load(Ordering::SeqCst) == 50);
        manager.shutdown();
    }
}
