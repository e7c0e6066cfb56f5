//! Units of work executed by the worker pool.
//!
//! The reactor never reads or writes a connection socket itself. When
//! readiness fires it disables further interest for that direction and
//! submits a task; the task runs to completion on a worker thread, then
//! re-arms the connection for the opposite direction through the
//! interest-change queue. A task runs exactly once and is consumed by value.

use crate::digest::digest;
use crate::protocol::FRAME_SIZE;
use crate::server::{Connection, InterestChange, InterestSender};
use bytes::Bytes;
use mio::net::TcpStream;
use mio::Token;
use std::io::{self, Read, Write};
use std::sync::Arc;
use tracing::{debug, trace};

/// Everything a task needs to advance one connection by one protocol step.
pub struct TaskContext {
    conn: Arc<Connection>,
    token: Token,
    changes: InterestSender,
}

#[cfg(test)]
pub(crate) type ProbeFn = Box<dyn FnOnce() + Send>;

/// One unit of read-or-write work bound to one connection.
pub enum Task {
    /// Read one full payload frame, digest it, queue the reply.
    Read(TaskContext),
    /// Drain the connection's pending replies to the socket.
    Write(TaskContext),
    /// Scheduling probe used by pool tests; carries no connection.
    #[cfg(test)]
    Probe(ProbeFn),
}

impl Task {
    pub fn read(conn: Arc<Connection>, token: Token, changes: InterestSender) -> Self {
        Task::Read(TaskContext {
            conn,
            token,
            changes,
        })
    }

    pub fn write(conn: Arc<Connection>, token: Token, changes: InterestSender) -> Self {
        Task::Write(TaskContext {
            conn,
            token,
            changes,
        })
    }

    /// Execute the task on the calling (worker) thread.
    ///
    /// All failure handling is local: an I/O error or peer close tears down
    /// this connection and nothing else. Nothing propagates to the caller.
    pub fn run(self) {
        match self {
            Task::Read(ctx) => run_read(ctx),
            Task::Write(ctx) => run_write(ctx),
            #[cfg(test)]
            Task::Probe(probe) => probe(),
        }
    }
}

fn run_read(ctx: TaskContext) {
    let mut frame = vec![0u8; FRAME_SIZE];

    match read_frame(ctx.conn.stream(), &mut frame) {
        Ok(true) => {}
        Ok(false) => {
            // Orderly close before a full frame arrived.
            debug!(peer = %ctx.conn.peer_addr(), "Peer closed connection");
            disconnect(&ctx);
            return;
        }
        Err(e) => {
            debug!(peer = %ctx.conn.peer_addr(), error = %e, "Read failed");
            disconnect(&ctx);
            return;
        }
    }

    let reply = digest(&frame);
    trace!(peer = %ctx.conn.peer_addr(), digest = %reply, "Frame read, digest computed");

    ctx.conn.push_write(Bytes::from(reply.into_bytes()));
    ctx.changes.submit(ctx.token, InterestChange::Write);
}

fn run_write(ctx: TaskContext) {
    while let Some(reply) = ctx.conn.pop_write() {
        if let Err(e) = write_full(ctx.conn.stream(), &reply) {
            debug!(peer = %ctx.conn.peer_addr(), error = %e, "Write failed");
            disconnect(&ctx);
            return;
        }
        trace!(peer = %ctx.conn.peer_addr(), bytes = reply.len(), "Reply written");
    }

    ctx.changes.submit(ctx.token, InterestChange::Read);
}

fn disconnect(ctx: &TaskContext) {
    ctx.conn.disconnect();
    ctx.changes.submit(ctx.token, InterestChange::Close);
}

/// Read until `buf` is full or the peer closes.
///
/// Returns `Ok(false)` on a clean close before the frame completed. The
/// socket is non-blocking; `WouldBlock` between readiness and the rest of the
/// frame is retried with a scheduler yield, so the frame is read to
/// completion on this worker regardless of how the peer paces it.
fn read_frame(stream: &TcpStream, buf: &mut [u8]) -> io::Result<bool> {
    let mut stream = stream;
    let mut filled = 0;

    while filled < buf.len() {
        match stream.read(&mut buf[filled..]) {
            Ok(0) => return Ok(false),
            Ok(n) => filled += n,
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => std::thread::yield_now(),
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }

    Ok(true)
}

/// Write all of `data`, retrying on `WouldBlock` until complete.
fn write_full(stream: &TcpStream, data: &[u8]) -> io::Result<()> {
    let mut stream = stream;
    let mut written = 0;

    while written < data.len() {
        match stream.write(&data[written..]) {
            Ok(0) => return Err(io::ErrorKind::WriteZero.into()),
            Ok(n) => written += n,
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => std::thread::yield_now(),
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }

    Ok(())
}
