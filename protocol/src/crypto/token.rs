//! # Token Cipher
//!
//! Merchants never put their plain MID inside a scannable code. Instead the
//! terminal enciphers the id into an opaque token (the "VMID") with a small
//! ARX block cipher, Speck-flavored: two 16-bit words, 22 rounds of rotate,
//! add, and key-mix per 32-bit half, with the four round-key words cycled
//! out of a single 64-bit terminal key. A 64-bit identifier is processed as
//! two independent 32-bit halves and the results concatenated.
//!
//! ## Timestamp binding
//!
//! Issuance XORs the identifier with the current wall clock rendered as a
//! 14-digit decimal (`%Y%m%d%H%M%S`) *before* enciphering, and publishes
//! that timestamp string next to the token. Redemption needs the exact
//! string to reverse the XOR; a replayed token under any other timestamp
//! decodes to an id that exists nowhere, so the downstream transaction dies
//! with "merchant not found" instead of paying the wrong party.
//!
//! There is no expiry window beyond "you must hold the exact timestamp".
//! That is a known, intentional weakness of the scheme, not an oversight.

use chrono::Local;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{DEMO_TERMINAL_KEY, TOKEN_ROUNDS, TOKEN_TIMESTAMP_FORMAT};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors from token issue/redeem. Enciphering itself is total; only the
/// string-level parsing can fail.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    /// The identifier or token is not a hex string that fits 64 bits.
    #[error("expected a 64-bit hex value, got {value:?}")]
    BadHex {
        /// The string that failed to parse.
        value: String,
    },

    /// The timestamp is not a decimal string that fits 64 bits.
    #[error("expected a numeric timestamp, got {value:?}")]
    BadTimestamp {
        /// The string that failed to parse.
        value: String,
    },
}

// ---------------------------------------------------------------------------
// TokenKey
// ---------------------------------------------------------------------------

/// A terminal's 64-bit token key, pre-split into the four 16-bit round-key
/// words the cipher cycles through (`k[i % 4]`, low word first).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenKey {
    words: [u16; 4],
}

/// A freshly issued token and the timestamp string it is bound to.
///
/// Both halves travel together: the token is what gets rendered into a
/// scannable artifact, the timestamp is what the terminal keeps to redeem
/// incoming payments against it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuedToken {
    /// The enciphered identifier, 16 lowercase hex chars.
    pub token: String,
    /// The issuance wall clock, formatted `%Y%m%d%H%M%S`.
    pub issued_at: String,
}

impl TokenKey {
    /// Build a key from a raw 64-bit value.
    pub fn new(key: u64) -> Self {
        Self {
            words: [
                key as u16,
                (key >> 16) as u16,
                (key >> 32) as u16,
                (key >> 48) as u16,
            ],
        }
    }

    /// The terminal key every machine in the simulation shares.
    pub fn demo() -> Self {
        Self::new(DEMO_TERMINAL_KEY)
    }

    /// One 32-bit half-block through the forward rounds.
    fn encipher_half(&self, block: u32) -> u32 {
        let mut x = (block >> 16) as u16;
        let mut y = block as u16;
        for i in 0..TOKEN_ROUNDS {
            x = x.rotate_right(7);
            x = x.wrapping_add(y);
            x ^= self.words[i % 4];
            y = y.rotate_left(2);
            y ^= x;
        }
        (x as u32) << 16 | y as u32
    }

    /// One 32-bit half-block through the inverse rounds, in reverse order.
    fn decipher_half(&self, block: u32) -> u32 {
        let mut x = (block >> 16) as u16;
        let mut y = block as u16;
        for i in (0..TOKEN_ROUNDS).rev() {
            y ^= x;
            y = y.rotate_right(2);
            x ^= self.words[i % 4];
            x = x.wrapping_sub(y);
            x = x.rotate_left(7);
        }
        (x as u32) << 16 | y as u32
    }

    /// Encipher a 64-bit value as two independent 32-bit halves.
    pub fn encipher(&self, value: u64) -> u64 {
        let high = self.encipher_half((value >> 32) as u32);
        let low = self.encipher_half(value as u32);
        (high as u64) << 32 | low as u64
    }

    /// Exact inverse of [`encipher`](Self::encipher) for every input.
    pub fn decipher(&self, value: u64) -> u64 {
        let high = self.decipher_half((value >> 32) as u32);
        let low = self.decipher_half(value as u32);
        (high as u64) << 32 | low as u64
    }

    /// Issue a token for a 16-hex identifier, bound to the current wall
    /// clock. Returns the token and the timestamp string it must be
    /// redeemed with.
    pub fn issue(&self, id_hex: &str) -> Result<IssuedToken, TokenError> {
        let issued_at = Local::now().format(TOKEN_TIMESTAMP_FORMAT).to_string();
        let token = self.seal(id_hex, &issued_at)?;
        Ok(IssuedToken { token, issued_at })
    }

    /// Deterministic issuance core: XOR the identifier with the numeric
    /// timestamp, encipher, render as 16 hex chars.
    pub fn seal(&self, id_hex: &str, timestamp: &str) -> Result<String, TokenError> {
        let id = parse_hex64(id_hex)?;
        let stamp = parse_stamp(timestamp)?;
        Ok(format!("{:016x}", self.encipher(id ^ stamp)))
    }

    /// Redeem a token against its issuance timestamp, recovering the plain
    /// 16-hex identifier.
    ///
    /// With the wrong timestamp this still "succeeds" numerically — it just
    /// yields an identifier that was never registered. The caller's lookup
    /// failure is the enforcement point.
    pub fn redeem(&self, token_hex: &str, timestamp: &str) -> Result<String, TokenError> {
        let token = parse_hex64(token_hex)?;
        let stamp = parse_stamp(timestamp)?;
        Ok(format!("{:016x}", self.decipher(token) ^ stamp))
    }
}

fn parse_hex64(value: &str) -> Result<u64, TokenError> {
    u64::from_str_radix(value, 16).map_err(|_| TokenError::BadHex {
        value: value.to_string(),
    })
}

fn parse_stamp(value: &str) -> Result<u64, TokenError> {
    value.parse::<u64>().map_err(|_| TokenError::BadTimestamp {
        value: value.to_string(),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
