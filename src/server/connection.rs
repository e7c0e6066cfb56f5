//! Per-connection state shared between the reactor and the worker pool.
//!
//! A `Connection` is created by the reactor on accept and handed to tasks by
//! `Arc`. The reactor keeps it registered with the poll; tasks perform the
//! actual socket reads and writes and maintain the pending-write queue. The
//! reactor itself never touches the queue.

use bytes::Bytes;
use mio::net::TcpStream;
use std::collections::VecDeque;
use std::net::{Shutdown, SocketAddr};
use std::sync::Mutex;

/// A single client connection.
///
/// The pending-write queue holds digest replies produced by read tasks until
/// a write task drains them to the socket. It is appended to and drained
/// under its own lock; the lock is never held across socket I/O.
pub struct Connection {
    stream: TcpStream,
    peer_addr: SocketAddr,
    pending_writes: Mutex<VecDeque<Bytes>>,
}

impl Connection {
    /// Wrap an accepted stream, caching the remote address.
    pub fn new(stream: TcpStream, peer_addr: SocketAddr) -> Self {
        Self {
            stream,
            peer_addr,
            pending_writes: Mutex::new(VecDeque::new()),
        }
    }

    /// The socket. Workers read and write through this reference; the
    /// reactor only uses it to derive the poll registration.
    pub fn stream(&self) -> &TcpStream {
        &self.stream
    }

    /// Remote address cached at accept time.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Append an outbound reply to the tail of the pending-write queue.
    pub fn push_write(&self, data: Bytes) {
        self.pending_writes
            .lock()
            .expect("pending-write lock poisoned")
            .push_back(data);
    }

    /// Pop the oldest pending reply, if any.
    pub fn pop_write(&self) -> Option<Bytes> {
        self.pending_writes
            .lock()
            .expect("pending-write lock poisoned")
            .pop_front()
    }

    /// Whether replies are waiting to be written.
    pub fn has_writes(&self) -> bool {
        !self
            .pending_writes
            .lock()
            .expect("pending-write lock poisoned")
            .is_empty()
    }

    /// Shut down both directions of the socket.
    ///
    /// Used by tasks on protocol error or peer close. The file descriptor
    /// itself is released when the reactor drops its registration entry.
    pub fn disconnect(&self) {
        let _ = self.stream.shutdown(Shutdown::Both);
    }
}
