//! Bounded worker pool and its scheduler.
//!
//! Three pieces: [`Task`] is the unit of work the reactor hands off,
//! [`WorkerPool`] owns the fixed set of execution threads, and
//! [`PoolManager`] pairs queued tasks with idle workers on its own thread.
//! The pool size bounds how many connections can be mid-I/O at once; when
//! every worker is busy, new tasks queue and wait.

mod manager;
mod task;
mod worker;

pub use manager::{PoolManager, TaskSender};
pub use task::Task;
pub use worker::{WorkerId, WorkerPool};
