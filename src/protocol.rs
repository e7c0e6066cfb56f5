//! Wire protocol constants.
//!
//! The exchange is fixed-size in both directions and repeats for the life of
//! the connection: the client sends exactly one [`FRAME_SIZE`]-byte binary
//! payload, the server answers with exactly one [`DIGEST_SIZE`]-byte ASCII
//! digest of that payload. The server never sends unsolicited data and
//! responds in receipt order.

/// Size in bytes of one client payload frame.
pub const FRAME_SIZE: usize = 8192;

/// Size in bytes of one server digest reply (lowercase hex, 160-bit hash).
pub const DIGEST_SIZE: usize = crate::digest::DIGEST_HEX_LEN;
