//! Server engine: reactor, connection records, and interest plumbing.
//!
//! Thread layout: one reactor thread detecting readiness, one pool manager
//! thread scheduling, N workers doing payload I/O and hashing. [`Server`]
//! wires the pieces together; [`run`] is the binary entry point.

mod connection;
mod interest;
mod reactor;

pub use connection::Connection;
pub use interest::{interest_queue, InterestChange, InterestRequest, InterestSender};
pub use reactor::{Reactor, ServerHandle};

use crate::config::Config;
use crate::error::{ConfigError, ServerError};
use crate::pool::{PoolManager, WorkerPool};
use std::net::SocketAddr;
use tracing::info;

/// A fully wired server: worker pool, scheduler, and reactor.
///
/// Construction order matters: the pool is validated and spawned before any
/// socket is opened, so configuration errors surface without side effects.
pub struct Server {
    reactor: Reactor,
    manager: PoolManager,
}

impl Server {
    /// Validate the configuration, spawn the pool and scheduler, and bind
    /// the listener.
    pub fn bind(config: &Config) -> Result<Self, ServerError> {
        let pool = WorkerPool::new(config.workers)?;
        let manager = PoolManager::start(pool)?;

        let addr: SocketAddr = format!("{}:{}", config.host, config.port)
            .parse()
            .map_err(|_| ConfigError::InvalidAddress(format!("{}:{}", config.host, config.port)))?;

        let reactor = Reactor::bind(addr, manager.sender(), config.max_connections)?;

        info!(
            addr = %reactor.local_addr(),
            workers = config.workers,
            "Server ready"
        );

        Ok(Self { reactor, manager })
    }

    /// The bound listen address (resolves an ephemeral port request).
    pub fn local_addr(&self) -> SocketAddr {
        self.reactor.local_addr()
    }

    /// Handle for stopping the reactor and observing the accept count.
    pub fn handle(&self) -> ServerHandle {
        self.reactor.handle()
    }

    /// Run the reactor until it stops or fails, then shut down the
    /// scheduler and workers.
    pub fn run(self) -> Result<(), ServerError> {
        let Server {
            mut reactor,
            manager,
        } = self;

        let result = reactor.run();

        // The reactor holds a task-queue sender; release it so the
        // scheduler sees the disconnect and can drain and halt.
        drop(reactor);
        manager.shutdown();

        result.map_err(Into::into)
    }
}

/// Bind and run a server from resolved configuration.
pub fn run(config: &Config) -> Result<(), ServerError> {
    Server::bind(config)?.run()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::digest::digest;
    use crate::protocol::{DIGEST_SIZE, FRAME_SIZE};
    use std::io::{Read, Write};
    use std::net::TcpStream;
    use std::time::Duration;

    fn test_config(workers: usize) -> Config {
        Config {
            host: "127.0.0.1".to_string(),
            port: 0,
            workers,
            max_connections: 64,
            log_level: "info".to_string(),
        }
    }

    fn start_server(
        workers: usize,
    ) -> (
        SocketAddr,
        ServerHandle,
        std::thread::JoinHandle<Result<(), ServerError>>,
    ) {
        let server = Server::bind(&test_config(workers)).unwrap();
        let addr = server.local_addr();
        let handle = server.handle();
        let thread = std::thread::spawn(move || server.run());
        (addr, handle, thread)
    }

    fn exchange(stream: &mut TcpStream, frame: &[u8]) -> String {
        stream.write_all(frame).unwrap();
        let mut reply = [0u8; DIGEST_SIZE];
        stream.read_exact(&mut reply).unwrap();
        String::from_utf8(reply.to_vec()).unwrap()
    }

    #[test]
    fn test_three_clients_pool_of_two() {
        let (addr, handle, server) = start_server(2);

        let clients: Vec<_> = (0..3u8)
            .map(|i| {
                std::thread::spawn(move || {
                    let frame = vec![i; FRAME_SIZE];
                    let mut stream = TcpStream::connect(addr).unwrap();
                    stream
                        .set_read_timeout(Some(Duration::from_secs(10)))
                        .unwrap();
                    let reply = exchange(&mut stream, &frame);
                    assert_eq!(reply, digest(&frame));
                })
            })
            .collect();

        for client in clients {
            client.join().unwrap();
        }
        assert_eq!(handle.connections_accepted(), 3);

        handle.stop();
        server.join().unwrap().unwrap();
    }

    #[test]
    fn test_digests_return_in_frame_order() {
        let (addr, handle, server) = start_server(2);

        let mut stream = TcpStream::connect(addr).unwrap();
        stream
            .set_read_timeout(Some(Duration::from_secs(10)))
            .unwrap();

        let frames: Vec<Vec<u8>> = (0..3u8).map(|i| vec![i.wrapping_mul(7); FRAME_SIZE]).collect();
        for frame in &frames {
            stream.write_all(frame).unwrap();
        }

        for frame in &frames {
            let mut reply = [0u8; DIGEST_SIZE];
            stream.read_exact(&mut reply).unwrap();
            assert_eq!(String::from_utf8(reply.to_vec()).unwrap(), digest(frame));
        }

        handle.stop();
        server.join().unwrap().unwrap();
    }

    #[test]
    fn test_partial_frame_disconnect_leaves_others_unaffected() {
        let (addr, handle, server) = start_server(2);

        // Disconnect after 100 of 8192 bytes.
        let mut dropper = TcpStream::connect(addr).unwrap();
        dropper.write_all(&[0u8; 100]).unwrap();
        drop(dropper);

        let frame = vec![0x5au8; FRAME_SIZE];
        let mut stream = TcpStream::connect(addr).unwrap();
        stream
            .set_read_timeout(Some(Duration::from_secs(10)))
            .unwrap();
        assert_eq!(exchange(&mut stream, &frame), digest(&frame));

        handle.stop();
        server.join().unwrap().unwrap();
    }

    #[test]
    fn test_exactly_one_digest_per_frame() {
        let (addr, handle, server) = start_server(1);

        let frame = vec![0x11u8; FRAME_SIZE];
        let mut stream = TcpStream::connect(addr).unwrap();
        stream
            .set_read_timeout(Some(Duration::from_secs(10)))
            .unwrap();
        assert_eq!(exchange(&mut stream, &frame), digest(&frame));

        // No unsolicited or duplicate reply follows.
        stream
            .set_read_timeout(Some(Duration::from_millis(300)))
            .unwrap();
        let mut extra = [0u8; 1];
        match stream.read(&mut extra) {
            Ok(0) => panic!("server closed a healthy connection"),
            Ok(_) => panic!("server sent an unsolicited reply"),
            Err(e) => assert!(matches!(
                e.kind(),
                std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
            )),
        }

        handle.stop();
        server.join().unwrap().unwrap();
    }

    #[test]
    fn test_zero_workers_is_fatal_before_bind() {
        let err = match Server::bind(&test_config(0)) {
            Err(e) => e,
            Ok(_) => panic!("bind succeeded with an empty worker pool"),
        };
        assert!(matches!(
            err,
            ServerError::Config(ConfigError::InvalidPoolSize(0))
        ));
    }
}
