//! The reactor: single-threaded readiness detection over all connections.
//!
//! One thread owns the poll and every registration. Each loop iteration
//! drains the interest-change queue, blocks for readiness, accepts new
//! connections inline, and converts readable/writable events into tasks for
//! the worker pool — clearing the fired direction's interest first so the
//! same readiness cannot be dispatched twice. Payload I/O never happens
//! here; a slow peer costs a worker, not the reactor.

use crate::pool::{Task, TaskSender};
use crate::server::connection::Connection;
use crate::server::interest::{interest_queue, InterestChange, InterestRequest, InterestSender};
use crossbeam_channel::Receiver;
use mio::event::Event;
use mio::net::TcpListener;
use mio::unix::SourceFd;
use mio::{Events, Interest, Poll, Token, Waker};
use slab::Slab;
use std::io;
use std::net::SocketAddr;
use std::os::unix::io::AsRawFd;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

const WAKER_TOKEN: Token = Token(usize::MAX);
const LISTENER_TOKEN: Token = Token(usize::MAX - 1);

const EVENTS_CAPACITY: usize = 1024;

/// Shared handle to observe and stop a running reactor.
///
/// `stop` is cooperative: it sets a flag and wakes the poll, and the loop
/// returns cleanly at the top of its next iteration.
#[derive(Clone)]
pub struct ServerHandle {
    stop: Arc<AtomicBool>,
    waker: Arc<Waker>,
    accepted: Arc<AtomicUsize>,
}

impl ServerHandle {
    /// Ask the reactor to return from `run`.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
        let _ = self.waker.wake();
    }

    /// Total connections accepted since startup.
    pub fn connections_accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }
}

/// The event loop. Owns the listener, the poll, and every registration.
pub struct Reactor {
    poll: Poll,
    listener: TcpListener,
    local_addr: SocketAddr,
    connections: Slab<Arc<Connection>>,
    changes: InterestSender,
    changes_rx: Receiver<InterestRequest>,
    tasks: TaskSender,
    max_connections: usize,
    stop: Arc<AtomicBool>,
    accepted: Arc<AtomicUsize>,
    waker: Arc<Waker>,
}

impl Reactor {
    /// Bind the listener and set up the poll, waker, and interest queue.
    pub fn bind(addr: SocketAddr, tasks: TaskSender, max_connections: usize) -> io::Result<Self> {
        let poll = Poll::new()?;
        let waker = Arc::new(Waker::new(poll.registry(), WAKER_TOKEN)?);
        let (changes, changes_rx) = interest_queue(Arc::clone(&waker));

        let listener = create_listener(addr)?;
        let local_addr = listener.local_addr()?;
        let mut listener = TcpListener::from_std(listener);
        poll.registry()
            .register(&mut listener, LISTENER_TOKEN, Interest::READABLE)?;

        Ok(Self {
            poll,
            listener,
            local_addr,
            connections: Slab::with_capacity(max_connections),
            changes,
            changes_rx,
            tasks,
            max_connections,
            stop: Arc::new(AtomicBool::new(false)),
            accepted: Arc::new(AtomicUsize::new(0)),
            waker,
        })
    }

    /// The address the listener actually bound (resolves port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn handle(&self) -> ServerHandle {
        ServerHandle {
            stop: Arc::clone(&self.stop),
            waker: Arc::clone(&self.waker),
            accepted: Arc::clone(&self.accepted),
        }
    }

    /// Run the event loop.
    ///
    /// Returns `Ok(())` only after [`ServerHandle::stop`]; any error out of
    /// the poll itself is fatal and propagated. Per-connection failures are
    /// contained: the offending connection is dropped and the loop carries
    /// on.
    pub fn run(&mut self) -> io::Result<()> {
        let mut events = Events::with_capacity(EVENTS_CAPACITY);
        info!(addr = %self.local_addr, "Reactor started");

        loop {
            self.drain_changes();

            if self.stop.load(Ordering::SeqCst) {
                info!("Reactor stopping");
                return Ok(());
            }

            match self.poll.poll(&mut events, None) {
                Ok(()) => {}
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    error!(error = %e, "Poll failed");
                    return Err(e);
                }
            }

            for event in events.iter() {
                match event.token() {
                    WAKER_TOKEN => {}
                    LISTENER_TOKEN => self.accept_connections(),
                    token => self.dispatch(token, event),
                }
            }
        }
    }

    /// Apply every queued interest change. Requests whose token no longer
    /// resolves belong to connections already torn down and are dropped.
    fn drain_changes(&mut self) {
        while let Ok(req) = self.changes_rx.try_recv() {
            match req.change {
                InterestChange::Read => self.rearm(req.token, Interest::READABLE),
                InterestChange::Write => self.rearm(req.token, Interest::WRITABLE),
                InterestChange::Close => self.remove(req.token),
            }
        }
    }

    fn rearm(&mut self, token: Token, interest: Interest) {
        let Some(conn) = self.connections.get(token.0) else {
            return;
        };

        let fd = conn.stream().as_raw_fd();
        if let Err(e) = self
            .poll
            .registry()
            .register(&mut SourceFd(&fd), token, interest)
        {
            debug!(token = token.0, error = %e, "Re-arm failed, dropping connection");
            self.remove(token);
        }
    }

    fn remove(&mut self, token: Token) {
        if let Some(conn) = self.connections.try_remove(token.0) {
            let fd = conn.stream().as_raw_fd();
            let _ = self.poll.registry().deregister(&mut SourceFd(&fd));
            debug!(peer = %conn.peer_addr(), "Connection closed");
        }
    }

    /// Accept every pending connection inline. Accept never goes through the
    /// worker pool: it is cheap and must not wait behind a busy pool.
    fn accept_connections(&mut self) {
        loop {
            match self.listener.accept() {
                Ok((stream, peer_addr)) => {
                    if self.connections.len() >= self.max_connections {
                        warn!(peer = %peer_addr, "Connection limit reached, rejecting");
                        continue;
                    }

                    let conn = Arc::new(Connection::new(stream, peer_addr));
                    let fd = conn.stream().as_raw_fd();

                    let entry = self.connections.vacant_entry();
                    let token = Token(entry.key());
                    match self
                        .poll
                        .registry()
                        .register(&mut SourceFd(&fd), token, Interest::READABLE)
                    {
                        Ok(()) => {
                            entry.insert(conn);
                            let count = self.accepted.fetch_add(1, Ordering::SeqCst) + 1;
                            info!(peer = %peer_addr, connected = count, "Accepted connection");
                        }
                        Err(e) => {
                            debug!(peer = %peer_addr, error = %e, "Registration failed");
                        }
                    }
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    error!(error = %e, "Accept error");
                    break;
                }
            }
        }
    }

    /// Turn one readiness event into a task, clearing the fired interest
    /// first so the same readiness cannot be dispatched again before the
    /// task completes and re-arms the connection.
    fn dispatch(&mut self, token: Token, event: &Event) {
        let Some(conn) = self.connections.get(token.0) else {
            return;
        };

        let fd = conn.stream().as_raw_fd();
        if let Err(e) = self.poll.registry().deregister(&mut SourceFd(&fd)) {
            debug!(token = token.0, error = %e, "Deregister failed, dropping connection");
            self.remove(token);
            return;
        }

        let conn = Arc::clone(conn);
        let task = if event.is_readable() {
            Task::read(conn, token, self.changes.clone())
        } else if event.is_writable() {
            Task::write(conn, token, self.changes.clone())
        } else if event.is_read_closed() || event.is_write_closed() {
            // Hang-up without data; the read task observes the close and
            // tears the connection down.
            Task::read(conn, token, self.changes.clone())
        } else {
            // Nothing actionable fired; put the registration back.
            self.rearm(token, Interest::READABLE);
            return;
        };

        if self.tasks.send(task).is_err() {
            error!("Pool manager unavailable, dropping task");
            self.remove(token);
        }
    }
}

/// Create the listening socket: non-blocking with address reuse, so restarts
/// do not trip over sockets in TIME_WAIT.
fn create_listener(addr: SocketAddr) -> io::Result<std::net::TcpListener> {
    let socket = socket2::Socket::new(
        match addr {
            SocketAddr::V4(_) => socket2::Domain::IPV4,
            SocketAddr::V6(_) => socket2::Domain::IPV6,
        },
        socket2::Type::STREAM,
        Some(socket2::Protocol::TCP),
    )?;

    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(1024)?;

    Ok(socket.into())
}
