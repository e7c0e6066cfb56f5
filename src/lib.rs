//! hashpool: a scalable echo/hash server.
//!
//! Clients stream fixed-size binary frames; the server answers each frame
//! with its fixed-width hex digest. The interesting part is the concurrency
//! engine: a single non-blocking reactor thread detects readiness and
//! accepts connections, while a bounded pool of worker threads performs the
//! actual read/hash/write work, synchronized through a cross-thread
//! interest-change queue. CPU and thread usage stay bounded regardless of
//! connection count, and the poll registrations are only ever touched from
//! one thread.

pub mod client;
pub mod config;
pub mod digest;
pub mod error;
pub mod pool;
pub mod protocol;
pub mod server;
