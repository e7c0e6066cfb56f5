//! Content digest utility.
//!
//! Pure function from a byte sequence to its fixed-width hexadecimal SHA-1
//! digest. Both the server (to acknowledge a frame) and the client (to track
//! outstanding frames) derive digests through this one function, so the two
//! sides always agree on the encoding.

use sha1::{Digest, Sha1};

/// Length of a hex-encoded digest in bytes: 160-bit hash, two hex characters
/// per byte.
pub const DIGEST_HEX_LEN: usize = 40;

/// Compute the lowercase hex SHA-1 digest of `data`.
///
/// The result is always exactly [`DIGEST_HEX_LEN`] characters: leading zero
/// bytes of the hash encode as leading `0` nibbles rather than being
/// truncated.
pub fn digest(data: &[u8]) -> String {
    hex::encode(Sha1::digest(data))
}
