//! Client load generator.
//!
//! Workload source and sink for the server: a sender thread pushes random
//! fixed-size frames at a configured rate and records each frame's digest in
//! a shared outstanding set; the receive loop matches the server's digest
//! replies against that set. On an orderly server close the client finishes
//! cleanly. The client is deliberately simple — two threads and blocking
//! sockets — since only its wire behavior matters to the server.

use crate::digest::digest;
use crate::protocol::{DIGEST_SIZE, FRAME_SIZE};
use rand::Rng;
use std::collections::HashSet;
use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info, trace, warn};

/// Resolved client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub server: String,
    pub port: u16,
    /// Frames sent per second; the sender sleeps `1000 / rate` ms between
    /// frames.
    pub rate: u32,
}

/// Set of digests sent but not yet acknowledged by the server.
#[derive(Default)]
pub struct DigestTracker {
    outstanding: Mutex<HashSet<String>>,
}

impl DigestTracker {
    /// Record a digest for a frame about to be sent.
    pub fn record(&self, digest: String) {
        self.outstanding
            .lock()
            .expect("tracker lock poisoned")
            .insert(digest);
    }

    /// Remove an acknowledged digest. Returns whether it was outstanding.
    pub fn acknowledge(&self, digest: &str) -> bool {
        self.outstanding
            .lock()
            .expect("tracker lock poisoned")
            .remove(digest)
    }

    /// Number of frames still awaiting acknowledgement.
    pub fn outstanding(&self) -> usize {
        self.outstanding.lock().expect("tracker lock poisoned").len()
    }
}

/// Connect and exchange frames until the server closes the connection.
pub fn run(config: &ClientConfig) -> io::Result<()> {
    let stream = TcpStream::connect((config.server.as_str(), config.port))?;
    info!(peer = %stream.peer_addr()?, rate = config.rate, "Connected to server");

    let tracker = Arc::new(DigestTracker::default());

    let sender = {
        let stream = stream.try_clone()?;
        let tracker = Arc::clone(&tracker);
        let rate = config.rate;
        std::thread::Builder::new()
            .name("sender".to_string())
            .spawn(move || sender_loop(stream, tracker, rate))?
    };

    let result = receive_loop(&stream, &tracker);

    // The sender notices the dead socket on its next write and exits.
    let _ = stream.shutdown(std::net::Shutdown::Both);
    let _ = sender.join();

    result
}

fn sender_loop(mut stream: TcpStream, tracker: Arc<DigestTracker>, rate: u32) {
    let interval = Duration::from_millis(1000 / u64::from(rate.max(1)));
    let mut rng = rand::thread_rng();
    let mut frame = vec![0u8; FRAME_SIZE];

    loop {
        rng.fill(&mut frame[..]);
        tracker.record(digest(&frame));

        if let Err(e) = stream.write_all(&frame) {
            debug!(error = %e, "Send failed, stopping sender");
            return;
        }
        trace!("Frame sent");

        std::thread::sleep(interval);
    }
}

fn receive_loop(stream: &TcpStream, tracker: &DigestTracker) -> io::Result<()> {
    let mut reader = stream;
    let mut reply = [0u8; DIGEST_SIZE];

    loop {
        match reader.read_exact(&mut reply) {
            Ok(()) => {}
            Err(ref e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                info!("Server closed the connection");
                return Ok(());
            }
            Err(e) => return Err(e),
        }

        let reply = std::str::from_utf8(&reply)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "non-ASCII digest reply"))?;

        if tracker.acknowledge(reply) {
            info!(
                digest = reply,
                outstanding = tracker.outstanding(),
                "Digest acknowledged"
            );
        } else {
            warn!(digest = reply, "Unmatched digest from server");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    #[test]
    fn test_tracker_record_and_acknowledge() {
        let tracker = DigestTracker::default();

        tracker.record("aa".repeat(20));
        tracker.record("bb".repeat(20));
        assert_eq!(tracker.outstanding(), 2);

        assert!(tracker.acknowledge(&"aa".repeat(20)));
        assert!(!tracker.acknowledge(&"aa".repeat(20)));
        assert_eq!(tracker.outstanding(), 1);
    }

    #[test]
    fn test_client_completes_one_exchange_then_exits_on_close() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        // Minimal stand-in server: one frame in, its digest out, then close.
        let fake_server = std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut frame = vec![0u8; FRAME_SIZE];
            stream.read_exact(&mut frame).unwrap();
            stream.write_all(digest(&frame).as_bytes()).unwrap();
        });

        let config = ClientConfig {
            server: "127.0.0.1".to_string(),
            port: addr.port(),
            rate: 50,
        };
        run(&config).unwrap();

        fake_server.join().unwrap();
    }
}
