//! Cross-thread interest-change queue.
//!
//! The poll registrations belong to the reactor thread alone. Tasks running
//! on worker threads request registration changes by submitting an
//! [`InterestRequest`] here; the reactor drains the queue at the top of every
//! loop iteration and applies the changes itself. Submitting also wakes the
//! poll so a blocked reactor notices the request promptly.

use crossbeam_channel::{unbounded, Receiver, Sender};
use mio::{Token, Waker};
use std::sync::Arc;

/// A requested mutation of one connection's readiness interest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterestChange {
    /// Re-arm the connection for read readiness.
    Read,
    /// Re-arm the connection for write readiness.
    Write,
    /// Drop the registration and release the connection.
    ///
    /// Connection teardown must go through the reactor like any other
    /// registration change; workers never cancel a registration directly.
    Close,
}

/// One queued change request. Consumed exactly once by the reactor.
#[derive(Debug, Clone, Copy)]
pub struct InterestRequest {
    pub token: Token,
    pub change: InterestChange,
}

/// Submission half of the queue, cloned into every task.
#[derive(Clone)]
pub struct InterestSender {
    tx: Sender<InterestRequest>,
    waker: Arc<Waker>,
}

impl InterestSender {
    /// Queue a change for `token` and wake the reactor's poll.
    ///
    /// Requests for the same token are applied in submission order. A send
    /// after the reactor has gone away is silently discarded.
    pub fn submit(&self, token: Token, change: InterestChange) {
        if self.tx.send(InterestRequest { token, change }).is_ok() {
            let _ = self.waker.wake();
        }
    }
}

/// Create the queue. The receiver belongs to the reactor; the sender is
/// cloned into tasks and the shutdown handle.
pub fn interest_queue(waker: Arc<Waker>) -> (InterestSender, Receiver<InterestRequest>) {
    let (tx, rx) = unbounded();
    (InterestSender { tx, waker }, rx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mio::{Events, Poll};
    use std::time::Duration;

    #[test]
    fn test_submit_wakes_poll() {
        let mut poll = Poll::new().unwrap();
        let waker = Arc::new(Waker::new(poll.registry(), Token(0)).unwrap());
        let (sender, rx) = interest_queue(waker);

        let submitter = std::thread::spawn(move || {
            sender.submit(Token(7), InterestChange::Write);
        });

        let mut events = Events::with_capacity(4);
        poll.poll(&mut events, Some(Duration::from_secs(5))).unwrap();
        assert!(events.iter().next().is_some());

        let req = rx.try_recv().unwrap();
        assert_eq!(req.token, Token(7));
        assert_eq!(req.change, InterestChange::Write);

        submitter.join().unwrap();
    }

    #[test]
    fn test_requests_drain_in_submission_order() {
        let poll = Poll::new().unwrap();
        let waker = Arc::new(Waker::new(poll.registry(), Token(0)).unwrap());
        let (sender, rx) = interest_queue(waker);

        sender.submit(Token(3), InterestChange::Write);
        sender.submit(Token(3), InterestChange::Read);
        sender.submit(Token(3), InterestChange::Close);

        let drained: Vec<_> = rx.try_iter().map(|r| r.change).collect();
        assert_eq!(
            drained,
            vec![
                InterestChange::Write,
                InterestChange::Read,
                InterestChange::Close
            ]
        );
    }
}
