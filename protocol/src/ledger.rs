//! # Settlement Ledger
//!
//! An append-only, hash-linked record of every settled transaction. Each
//! block carries the full SHA-256 digest of its own fields as its id and
//! the id of the block before it, so any edit to history breaks every
//! link after the edit point.
//!
//! This is an audit trail, not a consensus object: one writer, no forks,
//! no proof-of-anything. The chain's only job is to make tampering loud.
//!
//! ## Tip tracking
//!
//! The ledger stores its tip explicitly instead of re-deriving it from the
//! last element on every append. An empty chain's tip is [`GENESIS_ID`],
//! and append links, pushes, and advances the tip under one lock, so two
//! racing appends can never both claim the same predecessor.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::crypto::hash::sha256_hex_multi;
use crate::directory::BranchCode;

/// The `prev` value of the first real block: sixty-four zeros.
pub const GENESIS_ID: &str = "0000000000000000000000000000000000000000000000000000000000000000";

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Integrity failures found while hydrating or auditing a chain.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LedgerError {
    /// A block's `prev` does not match its predecessor's id.
    #[error("block {height} does not link to its predecessor (expected {expected}, found {found})")]
    BrokenLink {
        /// Zero-based position of the offending block.
        height: usize,
        /// The id the block should have pointed at.
        expected: String,
        /// The id it actually points at.
        found: String,
    },

    /// A block's id does not match the digest of its own fields.
    #[error("block {height} fails its own digest check")]
    TamperedBlock {
        /// Zero-based position of the offending block.
        height: usize,
    },
}

// ---------------------------------------------------------------------------
// Block
// ---------------------------------------------------------------------------

/// One settled transaction, as recorded forever.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// SHA-256 over (sender MMID ‖ receiver MID ‖ timestamp ‖ amount).
    pub id: String,
    /// The previous block's id, or [`GENESIS_ID`] for the first block.
    pub prev: String,
    /// Settlement wall clock, RFC 3339.
    pub timestamp: String,
    /// The paying user.
    pub sender_mmid: String,
    /// The paying user's branch.
    pub sender_branch: BranchCode,
    /// The paid merchant.
    pub receiver_mid: String,
    /// The paid merchant's branch.
    pub receiver_branch: BranchCode,
    /// Amount moved, whole currency units.
    pub amount: u64,
}

impl Block {
    /// The digest a block with these fields must carry as its id.
    fn digest(sender_mmid: &str, receiver_mid: &str, timestamp: &str, amount: u64) -> String {
        sha256_hex_multi(&[
            sender_mmid.as_bytes(),
            receiver_mid.as_bytes(),
            timestamp.as_bytes(),
            amount.to_string().as_bytes(),
        ])
    }

    /// Check this block's id against its own fields.
    pub fn is_self_consistent(&self) -> bool {
        self.id == Self::digest(&self.sender_mmid, &self.receiver_mid, &self.timestamp, self.amount)
    }
}

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct LedgerInner {
    blocks: Vec<Block>,
    tip: String,
}

/// The append-only chain plus its current tip, behind one lock.
#[derive(Debug)]
pub struct Ledger {
    inner: Mutex<LedgerInner>,
}

impl Default for Ledger {
    fn default() -> Self {
        Self::new()
    }
}

impl Ledger {
    /// An empty chain whose tip is [`GENESIS_ID`].
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(LedgerInner {
                blocks: Vec::new(),
                tip: GENESIS_ID.to_string(),
            }),
        }
    }

    /// Rebuild a ledger from stored blocks, re-checking every link on the
    /// way in. The tip becomes the last block's id.
    pub fn from_blocks(blocks: Vec<Block>) -> Result<Self, LedgerError> {
        let mut expected = GENESIS_ID.to_string();
        for (height, block) in blocks.iter().enumerate() {
            if block.prev != expected {
                return Err(LedgerError::BrokenLink {
                    height,
                    expected,
                    found: block.prev.clone(),
                });
            }
            expected = block.id.clone();
        }
        Ok(Self {
            inner: Mutex::new(LedgerInner {
                tip: expected,
                blocks,
            }),
        })
    }

    /// Record a settlement at the current wall clock. Returns the block's
    /// height and the block itself.
    pub fn append(
        &self,
        sender_mmid: &str,
        sender_branch: BranchCode,
        receiver_mid: &str,
        receiver_branch: BranchCode,
        amount: u64,
    ) -> (u64, Block) {
        self.append_at(
            sender_mmid,
            sender_branch,
            receiver_mid,
            receiver_branch,
            amount,
            &chrono::Utc::now().to_rfc3339(),
        )
    }

    /// Deterministic append core: the timestamp is supplied by the caller.
    ///
    /// Linking, pushing, and advancing the tip all happen under the ledger
    /// lock, so concurrent appends serialize into one linear chain and each
    /// append learns its height with no read-back race.
    pub fn append_at(
        &self,
        sender_mmid: &str,
        sender_branch: BranchCode,
        receiver_mid: &str,
        receiver_branch: BranchCode,
        amount: u64,
        timestamp: &str,
    ) -> (u64, Block) {
        let appended: Result<_, std::convert::Infallible> = self.append_at_with(
            sender_mmid,
            sender_branch,
            receiver_mid,
            receiver_branch,
            amount,
            timestamp,
            |_, _| Ok(()),
        );
        match appended {
            Ok(committed) => committed,
            Err(never) => match never {},
        }
    }

    /// [`append`](Self::append) with a persistence hook.
    ///
    /// `persist` runs under the ledger lock, after the block is built but
    /// before it is committed. Concurrent appends therefore reach the hook
    /// in strictly increasing height order, so a write-through store sees
    /// blocks and tip updates in chain order. If the hook fails, the block
    /// is discarded and the chain is unchanged.
    pub fn append_with<E, F>(
        &self,
        sender_mmid: &str,
        sender_branch: BranchCode,
        receiver_mid: &str,
        receiver_branch: BranchCode,
        amount: u64,
        persist: F,
    ) -> Result<(u64, Block), E>
    where
        F: FnOnce(u64, &Block) -> Result<(), E>,
    {
        self.append_at_with(
            sender_mmid,
            sender_branch,
            receiver_mid,
            receiver_branch,
            amount,
            &chrono::Utc::now().to_rfc3339(),
            persist,
        )
    }

    /// [`append_at`](Self::append_at) with a persistence hook; see
    /// [`append_with`](Self::append_with).
    #[allow(clippy::too_many_arguments)]
    pub fn append_at_with<E, F>(
        &self,
        sender_mmid: &str,
        sender_branch: BranchCode,
        receiver_mid: &str,
        receiver_branch: BranchCode,
        amount: u64,
        timestamp: &str,
        persist: F,
    ) -> Result<(u64, Block), E>
    where
        F: FnOnce(u64, &Block) -> Result<(), E>,
    {
        let mut inner = self.inner.lock();
        let height = inner.blocks.len() as u64;
        let block = Block {
            id: Block::digest(sender_mmid, receiver_mid, timestamp, amount),
            prev: inner.tip.clone(),
            timestamp: timestamp.to_string(),
            sender_mmid: sender_mmid.to_string(),
            sender_branch,
            receiver_mid: receiver_mid.to_string(),
            receiver_branch,
            amount,
        };
        persist(height, &block)?;
        inner.tip = block.id.clone();
        inner.blocks.push(block.clone());
        Ok((height, block))
    }

    /// The id of the newest block, or [`GENESIS_ID`] when empty.
    pub fn tip(&self) -> String {
        self.inner.lock().tip.clone()
    }

    /// Number of blocks in the chain.
    pub fn len(&self) -> usize {
        self.inner.lock().blocks.len()
    }

    /// Whether the chain has no blocks yet.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().blocks.is_empty()
    }

    /// A snapshot of the whole chain, oldest first.
    pub fn blocks(&self) -> Vec<Block> {
        self.inner.lock().blocks.clone()
    }

    /// Audit the chain: every link intact, every block's id matching its
    /// own fields, the stored tip matching the last block.
    pub fn verify(&self) -> Result<(), LedgerError> {
        let inner = self.inner.lock();
        let mut expected = GENESIS_ID.to_string();
        for (height, block) in inner.blocks.iter().enumerate() {
            if block.prev != expected {
                return Err(LedgerError::BrokenLink {
                    height,
                    expected,
                    found: block.prev.clone(),
                });
            }
            if !block.is_self_consistent() {
                return Err(LedgerError::TamperedBlock { height });
            }
            expected = block.id.clone();
        }
        if inner.tip != expected {
            return Err(LedgerError::BrokenLink {
                height: inner.blocks.len(),
                expected,
                found: inner.tip.clone(),
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
