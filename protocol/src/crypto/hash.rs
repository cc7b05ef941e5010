//! # Hashing Utilities
//!
//! SHA-256 is the only hash function in PAISA, used for two jobs:
//!
//! - **Identifier derivation** — account ids (UID, MMID, MID) are truncated
//!   digests over registration inputs. Truncation to 16 hex chars keeps the
//!   id space small enough to fit one token-cipher block, at the cost of
//!   collision resistance we explicitly don't claim.
//! - **Ledger block ids** — the full 64-hex digest over a block's content
//!   plus the current wall clock.
//!
//! Everything returns lowercase hex strings because that's what travels on
//! the wire and what lands in the store. Callers that want raw bytes can
//! hash themselves; nobody does.

use sha2::{Digest, Sha256};

use crate::config::ID_HEX_LEN;

/// Compute the SHA-256 digest of `data` as a 64-char lowercase hex string.
///
/// # Example
///
/// ```
/// use paisa_protocol::crypto::hash::sha256_hex;
///
/// let digest = sha256_hex(b"paisa");
/// assert_eq!(digest.len(), 64);
/// ```
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Hash multiple byte slices together without concatenation overhead.
///
/// Feeding the parts sequentially into the hasher produces the same digest
/// as hashing the concatenation, minus the temporary buffer. Used for
/// composite constructions like `sender ‖ receiver ‖ timestamp ‖ amount`.
pub fn sha256_hex_multi(parts: &[&[u8]]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    hex::encode(hasher.finalize())
}

/// Derive a short identifier: the first [`ID_HEX_LEN`] hex chars of the
/// SHA-256 digest over the given parts.
///
/// This is how every account id in the system is minted. Sixteen hex chars
/// is 64 bits — deliberately collision-prone for a digest, which is why
/// registration checks for an existing id and fails loudly instead of
/// overwriting (see the account directory).
pub fn short_id(parts: &[&[u8]]) -> String {
    let mut digest = sha256_hex_multi(parts);
    digest.truncate(ID_HEX_LEN);
    digest
}
