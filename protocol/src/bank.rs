//! # The Bank
//!
//! The central switch of the payment network. Everything of consequence
//! happens here: accounts open, credentials are unmasked, balances move,
//! and every settlement lands in the hash-linked ledger. The bank is the
//! only party that ever sees an MMID or PIN in the clear; clients mask
//! them with the published credential key and the bank unmasks them with
//! the private half it keeps.
//!
//! ## Write-through persistence
//!
//! The in-memory [`AccountDirectory`] is the working set; the [`BankStore`]
//! is the record. Every mutation writes through before the caller hears
//! about it: a registration persists the new account, a transfer persists
//! both touched accounts and the new block. Transfer writes run inside
//! the directory and ledger critical sections, so the store sees account
//! snapshots in balance-commit order and blocks in height order no matter
//! how settlements interleave. Opening a bank on an existing
//! store rehydrates the directory and rebuilds the ledger from the stored
//! chain, cross-checking the rebuilt tip against the tip the store last
//! recorded.
//!
//! ## Reply strings
//!
//! [`TransactionError`]'s `Display` output is the exact failure text
//! clients see on the wire. Those strings are protocol surface — clients
//! match on them — so they stay frozen while the structured error fields
//! underneath carry the detail worth logging.

use std::path::Path;

use thiserror::Error;
use tracing::{debug, info};

use crate::crypto::{CredentialError, CredentialKeypair, PublicKey};
use crate::directory::{
    AccountDirectory, BranchCode, DirectoryError, MerchantAccount, NewMerchant, NewUser,
    UserAccount,
};
use crate::ledger::{Block, Ledger, LedgerError};
use crate::store::{BankStore, StoreError};
use crate::wire::Amount;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Every way a bank operation can fail.
///
/// The `Display` strings are the wire-visible reply text and must not
/// drift; the fields are for logs and tests.
#[derive(Debug, Error)]
pub enum TransactionError {
    /// The branch code is not on the network's roster.
    #[error("INVALID IFSC")]
    InvalidBranch {
        /// The code the request named.
        code: String,
    },

    /// The opening balance is not a non-negative integer.
    #[error("Invalid balance")]
    InvalidBalance {
        /// The raw field as it arrived.
        raw: String,
    },

    /// A user account with this MMID already exists.
    #[error("MMID already exists")]
    DuplicateUser {
        /// The colliding identifier.
        mmid: String,
    },

    /// A merchant account with this MID already exists.
    #[error("MID already exists")]
    DuplicateMerchant {
        /// The colliding identifier.
        mid: String,
    },

    /// The masked credentials would not decode under the bank's key.
    #[error("Decryption failed")]
    DecryptFailed(#[source] CredentialError),

    /// The decoded MMID matches no user account.
    #[error("Invalid sender MMID")]
    SenderNotFound {
        /// The identifier that failed to resolve.
        mmid: String,
    },

    /// The decoded PIN does not match the sender's registered PIN.
    #[error("Incorrect Pin")]
    IncorrectPin,

    /// The receiver MID matches no merchant account.
    #[error("Merchant not found")]
    MerchantNotFound {
        /// The identifier that failed to resolve.
        mid: String,
    },

    /// The amount is not a positive integer.
    #[error("Invalid amount")]
    InvalidAmount {
        /// The raw field as it arrived.
        raw: String,
    },

    /// The sender's balance cannot cover the transfer.
    #[error("Error: Insufficient balance")]
    InsufficientFunds {
        /// The sender's balance at the time of the check.
        balance: u64,
        /// The amount the transfer asked for.
        requested: u64,
    },

    /// The persistence layer failed.
    #[error("storage failure: {0}")]
    Store(#[from] StoreError),

    /// The stored chain would not rebuild into a valid ledger.
    #[error("ledger corrupted: {0}")]
    Ledger(#[from] LedgerError),

    /// The rebuilt chain tip disagrees with the tip the store recorded.
    #[error("stored tip {stored} does not match rebuilt chain tip {rebuilt}")]
    TipMismatch {
        /// What the store's metadata claims.
        stored: String,
        /// What replaying the stored blocks produced.
        rebuilt: String,
    },
}

impl From<DirectoryError> for TransactionError {
    fn from(err: DirectoryError) -> Self {
        match err {
            DirectoryError::UnknownBranch { code } => Self::InvalidBranch { code },
            DirectoryError::DuplicateUser { mmid } => Self::DuplicateUser { mmid },
            DirectoryError::DuplicateMerchant { mid } => Self::DuplicateMerchant { mid },
            DirectoryError::UnknownUser { mmid } => Self::SenderNotFound { mmid },
            DirectoryError::UnknownMerchant { mid } => Self::MerchantNotFound { mid },
            DirectoryError::IncorrectPin => Self::IncorrectPin,
            DirectoryError::NonPositiveAmount { amount } => Self::InvalidAmount {
                raw: amount.to_string(),
            },
            DirectoryError::Insufficient { balance, requested } => {
                Self::InsufficientFunds { balance, requested }
            }
            // A credit that would overflow u64 only happens with an absurd
            // amount; refuse it the same way as any other bad amount.
            DirectoryError::Overflow { credit, .. } => Self::InvalidAmount {
                raw: credit.to_string(),
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Bank
// ---------------------------------------------------------------------------

/// One bank process: live directory, settlement ledger, credential key,
/// and the store everything writes through to.
#[derive(Debug)]
pub struct Bank {
    directory: AccountDirectory,
    ledger: Ledger,
    keypair: CredentialKeypair,
    store: BankStore,
}

impl Bank {
    /// Open a bank on the store at `path`, rehydrating accounts and
    /// rebuilding the settlement chain from disk.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, TransactionError> {
        Self::from_store(BankStore::open(path)?)
    }

    /// A bank on a throwaway store. For tests and demos.
    pub fn open_temporary() -> Result<Self, TransactionError> {
        Self::from_store(BankStore::open_temporary()?)
    }

    fn from_store(store: BankStore) -> Result<Self, TransactionError> {
        let directory = AccountDirectory::new();
        for account in store.users()? {
            directory.insert_user(account);
        }
        for account in store.merchants()? {
            directory.insert_merchant(account);
        }

        let ledger = Ledger::from_blocks(store.blocks()?)?;
        if let Some(stored) = store.ledger_tip()? {
            if stored != ledger.tip() {
                return Err(TransactionError::TipMismatch {
                    stored,
                    rebuilt: ledger.tip(),
                });
            }
        }

        info!(
            users = directory.user_count(),
            merchants = directory.merchant_count(),
            blocks = ledger.len(),
            "bank opened"
        );

        Ok(Self {
            directory,
            ledger,
            keypair: CredentialKeypair::demo(),
            store,
        })
    }

    /// The public credential key clients mask their MMID and PIN with.
    pub fn public_key(&self) -> PublicKey {
        self.keypair.public
    }

    // -----------------------------------------------------------------------
    // Registration
    // -----------------------------------------------------------------------

    /// Open a user account. Validates the branch code and opening balance,
    /// derives the identifiers, and persists the account.
    pub fn register_user(
        &self,
        name: &str,
        ifsc: &str,
        password: &str,
        pin: &str,
        mobile: &str,
        balance: &Amount,
    ) -> Result<UserAccount, TransactionError> {
        let branch: BranchCode = ifsc.parse().map_err(TransactionError::from)?;
        let deposit = parse_deposit(balance)?;

        let account = self.directory.register_user(NewUser {
            name: name.to_string(),
            branch,
            password: password.to_string(),
            pin: pin.to_string(),
            mobile: mobile.to_string(),
            deposit,
        })?;
        self.store.put_user(&account)?;

        info!(mmid = %account.mmid, branch = %account.branch, "user account opened");
        Ok(account)
    }

    /// Open a merchant account.
    pub fn register_merchant(
        &self,
        name: &str,
        ifsc: &str,
        password: &str,
        balance: &Amount,
    ) -> Result<MerchantAccount, TransactionError> {
        let branch: BranchCode = ifsc.parse().map_err(TransactionError::from)?;
        let deposit = parse_deposit(balance)?;

        let account = self.directory.register_merchant(NewMerchant {
            name: name.to_string(),
            branch,
            password: password.to_string(),
            deposit,
        })?;
        self.store.put_merchant(&account)?;

        info!(mid = %account.mid, branch = %account.branch, "merchant account opened");
        Ok(account)
    }

    // -----------------------------------------------------------------------
    // Transfers
    // -----------------------------------------------------------------------

    /// Settle a payment from a user to a merchant.
    ///
    /// Unmasks the sender's credentials, moves the funds atomically through
    /// the directory, persists both accounts, and appends the settlement
    /// block. Failures surface in a fixed order — decryption, sender
    /// lookup, PIN, receiver lookup, amount, funds — so the reply names
    /// the first thing wrong.
    pub fn transfer(
        &self,
        encrypted_mmid: &[u64],
        encrypted_pin: &[u64],
        receiver_mid: &str,
        amount: &Amount,
    ) -> Result<(u64, Block), TransactionError> {
        let mmid = self
            .keypair
            .private
            .decrypt_str(encrypted_mmid)
            .map_err(TransactionError::DecryptFailed)?;
        let pin = self
            .keypair
            .private
            .decrypt_str(encrypted_pin)
            .map_err(TransactionError::DecryptFailed)?;
        debug!(mmid = %mmid, receiver = %receiver_mid, "credentials unmasked");

        let value = amount.as_i64().ok_or_else(|| TransactionError::InvalidAmount {
            raw: amount.to_string(),
        })?;

        // Both persistence hooks run inside the matching critical section:
        // account snapshots land on disk in balance-commit order, and
        // blocks land in height order with the stored tip always naming
        // the newest persisted block.
        let settlement = self.directory.settle_with(
            &mmid,
            &pin,
            receiver_mid,
            value,
            |sender: &UserAccount, receiver: &MerchantAccount| -> Result<(), TransactionError> {
                self.store.put_user(sender)?;
                self.store.put_merchant(receiver)?;
                Ok(())
            },
        )?;

        let (height, block) = self.ledger.append_with(
            &settlement.sender.mmid,
            settlement.sender.branch,
            &settlement.receiver.mid,
            settlement.receiver.branch,
            settlement.amount,
            |height, block| self.store.put_block(height, block),
        )?;

        info!(
            height,
            id = %block.id,
            amount = settlement.amount,
            sender_branch = %block.sender_branch,
            receiver_branch = %block.receiver_branch,
            "settlement recorded"
        );
        Ok((height, block))
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// A user's balance, gated on their PIN. `None` covers both a wrong
    /// PIN and an unknown MMID.
    pub fn user_balance(&self, mmid: &str, pin: &str) -> Option<u64> {
        self.directory.user_balance(mmid, pin)
    }

    /// A merchant's balance, by MID alone.
    pub fn merchant_balance(&self, mid: &str) -> Option<u64> {
        self.directory.merchant_balance(mid)
    }

    /// Snapshot of one user account.
    pub fn user(&self, mmid: &str) -> Option<UserAccount> {
        self.directory.user(mmid)
    }

    /// Snapshot of one merchant account.
    pub fn merchant(&self, mid: &str) -> Option<MerchantAccount> {
        self.directory.merchant(mid)
    }

    /// The settlement ledger.
    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// Number of registered users.
    pub fn user_count(&self) -> usize {
        self.directory.user_count()
    }

    /// Number of registered merchants.
    pub fn merchant_count(&self) -> usize {
        self.directory.merchant_count()
    }
}

/// An opening balance must parse to a non-negative integer; anything else
/// is the legacy "Invalid balance" failure.
fn parse_deposit(balance: &Amount) -> Result<u64, TransactionError> {
    balance
        .as_i64()
        .filter(|v| *v >= 0)
        .map(|v| v as u64)
        .ok_or_else(|| TransactionError::InvalidBalance {
            raw: balance.to_string(),
        })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
