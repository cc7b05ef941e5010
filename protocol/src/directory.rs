//! # Account Directory
//!
//! The bank's in-memory registry of user and merchant accounts, keyed by
//! the short identifiers the network routes on (MMID for users, MID for
//! merchants). Registration derives those identifiers from a SHA-256
//! digest of the applicant's details plus the wall clock, so they are
//! unguessable but reproducible from the audit trail.
//!
//! Lookups are branch-agnostic: identifiers are globally unique, and a
//! settlement learns both parties' branches from the registry rather than
//! trusting anything the wire claims.
//!
//! ## Concurrency model
//!
//! Registries are [`DashMap`]s of `Arc<Mutex<Account>>`. A settlement takes
//! the sender's lock, then the receiver's; users and merchants live in
//! disjoint namespaces, so that order is global and cannot deadlock. The
//! debit and credit happen under both locks, which is what makes two
//! racing payments from one account unable to both pass the funds check.
//! [`settle_with`](AccountDirectory::settle_with) lets a write-through
//! store persist the new balances inside that same critical section, so
//! on-disk snapshots land in commit order.
//!
//! ## Identifier collisions
//!
//! Two applicants hashing to the same identifier is a digest collision and
//! essentially impossible; if it does happen, registration fails with a
//! duplicate-account error rather than silently overwriting the earlier
//! account. Nobody loses money to a hash prefix.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::crypto::hash::short_id;

// ---------------------------------------------------------------------------
// Branch codes
// ---------------------------------------------------------------------------

/// Every branch routing code the simulated network recognizes, grouped by
/// institution. Requests naming any other code are rejected up front.
pub const BRANCH_ROSTER: [&str; 9] = [
    "SBIN0001234",
    "SBIN0005678",
    "SBIN0009101",
    "HDFC0002345",
    "HDFC0006789",
    "HDFC0001122",
    "ICIC0003456",
    "ICIC0007890",
    "ICIC0002233",
];

/// A validated branch routing code (IFSC-style, 4 letters + 7 digits).
///
/// Construction goes through [`FromStr`], which only admits members of
/// [`BRANCH_ROSTER`]; holding a `BranchCode` is proof the code is real.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(into = "String")]
pub struct BranchCode(&'static str);

impl BranchCode {
    /// The code as text, e.g. `"SBIN0001234"`.
    pub fn as_str(&self) -> &'static str {
        self.0
    }

    /// The owning institution's 4-letter prefix, e.g. `"SBIN"`.
    pub fn institution(&self) -> &'static str {
        &self.0[..4]
    }
}

impl fmt::Display for BranchCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

impl FromStr for BranchCode {
    type Err = DirectoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BRANCH_ROSTER
            .iter()
            .find(|known| **known == s)
            .map(|known| BranchCode(*known))
            .ok_or_else(|| DirectoryError::UnknownBranch {
                code: s.to_string(),
            })
    }
}

// A derived impl would demand `&'static str: Deserialize<'de>`, pinning
// `'de` to `'static`. Deserialize owned text and resolve it against the
// roster through `FromStr` instead.
impl<'de> Deserialize<'de> for BranchCode {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let code = String::deserialize(deserializer)?;
        code.parse().map_err(serde::de::Error::custom)
    }
}

impl From<BranchCode> for String {
    fn from(code: BranchCode) -> Self {
        code.0.to_string()
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors from registration and settlement against the directory.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DirectoryError {
    /// The branch code is not in [`BRANCH_ROSTER`].
    #[error("unknown branch code {code:?}")]
    UnknownBranch {
        /// The code the request named.
        code: String,
    },

    /// A user account with this MMID already exists. With honest clocks
    /// this means a digest collision; either way the earlier account wins.
    #[error("a user account with MMID {mmid} already exists")]
    DuplicateUser {
        /// The colliding identifier.
        mmid: String,
    },

    /// A merchant account with this MID already exists.
    #[error("a merchant account with MID {mid} already exists")]
    DuplicateMerchant {
        /// The colliding identifier.
        mid: String,
    },

    /// No user account matches the MMID.
    #[error("no user account matches MMID {mmid}")]
    UnknownUser {
        /// The identifier that failed to resolve.
        mmid: String,
    },

    /// No merchant account matches the MID.
    #[error("no merchant account matches MID {mid}")]
    UnknownMerchant {
        /// The identifier that failed to resolve.
        mid: String,
    },

    /// The PIN does not match the sender's registered PIN.
    #[error("PIN does not match the registered PIN")]
    IncorrectPin,

    /// The transfer amount is zero or negative.
    #[error("transfer amount must be positive, got {amount}")]
    NonPositiveAmount {
        /// The offending amount.
        amount: i64,
    },

    /// The sender's balance cannot cover the transfer.
    #[error("balance {balance} cannot cover a transfer of {requested}")]
    Insufficient {
        /// The sender's current balance.
        balance: u64,
        /// The amount the transfer asked for.
        requested: u64,
    },

    /// A credit would overflow the receiver's balance. Nobody holds
    /// 18.4 quintillion rupees; this is a bug or an attack.
    #[error("crediting {credit} would overflow balance {balance}")]
    Overflow {
        /// The receiver's balance before the failed credit.
        balance: u64,
        /// The amount that caused the overflow.
        credit: u64,
    },
}

// ---------------------------------------------------------------------------
// Accounts
// ---------------------------------------------------------------------------

/// A registered user account.
///
/// Passwords and PINs are stored in the clear. That is faithful to the
/// system being simulated and exactly as unsafe as it sounds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAccount {
    /// Display name supplied at registration.
    pub name: String,
    /// The branch holding the account.
    pub branch: BranchCode,
    /// Login password, in the clear.
    pub password: String,
    /// Payment PIN, in the clear. Settlement and balance queries check
    /// against this.
    pub pin: String,
    /// Mobile number the MMID was derived from.
    pub mobile: String,
    /// Current balance in whole currency units.
    pub balance: u64,
    /// 16-hex user identifier.
    pub uid: String,
    /// 16-hex mobile money identifier; the key payments route on.
    pub mmid: String,
}

/// A registered merchant account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerchantAccount {
    /// Display name supplied at registration.
    pub name: String,
    /// The branch holding the account.
    pub branch: BranchCode,
    /// Login password, in the clear.
    pub password: String,
    /// Current balance in whole currency units.
    pub balance: u64,
    /// 16-hex merchant identifier; what payment tokens encode.
    pub mid: String,
}

/// Details of a user registration request, before identifiers exist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    /// Display name.
    pub name: String,
    /// The branch to open the account in.
    pub branch: BranchCode,
    /// Login password.
    pub password: String,
    /// Payment PIN.
    pub pin: String,
    /// Mobile number, mixed into the MMID derivation.
    pub mobile: String,
    /// Opening balance.
    pub deposit: u64,
}

/// Details of a merchant registration request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMerchant {
    /// Display name.
    pub name: String,
    /// The branch to open the account in.
    pub branch: BranchCode,
    /// Login password.
    pub password: String,
    /// Opening balance.
    pub deposit: u64,
}

/// Post-settlement snapshots of both accounts, taken while the locks were
/// still held. The ledger and the store work from these, not from live
/// registry reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settlement {
    /// The sender after the debit.
    pub sender: UserAccount,
    /// The receiver after the credit.
    pub receiver: MerchantAccount,
    /// The amount that moved.
    pub amount: u64,
}

// ---------------------------------------------------------------------------
// AccountDirectory
// ---------------------------------------------------------------------------

/// The live account registry: every user keyed by MMID, every merchant
/// keyed by MID.
#[derive(Debug, Default)]
pub struct AccountDirectory {
    users: DashMap<String, Arc<Mutex<UserAccount>>>,
    merchants: DashMap<String, Arc<Mutex<MerchantAccount>>>,
}

impl AccountDirectory {
    /// An empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    // -----------------------------------------------------------------------
    // Registration
    // -----------------------------------------------------------------------

    /// Register a user, deriving identifiers from the current wall clock.
    pub fn register_user(&self, user: NewUser) -> Result<UserAccount, DirectoryError> {
        self.register_user_at(user, &chrono::Utc::now().to_rfc3339())
    }

    /// Deterministic registration core: the issuance stamp is supplied by
    /// the caller. `uid = H(name ‖ stamp ‖ password)` truncated to 16 hex,
    /// `mmid = H(uid ‖ mobile)` truncated the same way.
    pub fn register_user_at(
        &self,
        user: NewUser,
        stamp: &str,
    ) -> Result<UserAccount, DirectoryError> {
        let uid = short_id(&[
            user.name.as_bytes(),
            stamp.as_bytes(),
            user.password.as_bytes(),
        ]);
        let mmid = short_id(&[uid.as_bytes(), user.mobile.as_bytes()]);

        let account = UserAccount {
            name: user.name,
            branch: user.branch,
            password: user.password,
            pin: user.pin,
            mobile: user.mobile,
            balance: user.deposit,
            uid,
            mmid: mmid.clone(),
        };

        match self.users.entry(mmid.clone()) {
            Entry::Occupied(_) => Err(DirectoryError::DuplicateUser { mmid }),
            Entry::Vacant(slot) => {
                debug!(mmid = %account.mmid, branch = %account.branch, "user registered");
                slot.insert(Arc::new(Mutex::new(account.clone())));
                Ok(account)
            }
        }
    }

    /// Register a merchant, deriving the MID from the current wall clock.
    pub fn register_merchant(
        &self,
        merchant: NewMerchant,
    ) -> Result<MerchantAccount, DirectoryError> {
        self.register_merchant_at(merchant, &chrono::Utc::now().to_rfc3339())
    }

    /// Deterministic registration core for merchants:
    /// `mid = H(name ‖ stamp ‖ password)` truncated to 16 hex.
    pub fn register_merchant_at(
        &self,
        merchant: NewMerchant,
        stamp: &str,
    ) -> Result<MerchantAccount, DirectoryError> {
        let mid = short_id(&[
            merchant.name.as_bytes(),
            stamp.as_bytes(),
            merchant.password.as_bytes(),
        ]);

        let account = MerchantAccount {
            name: merchant.name,
            branch: merchant.branch,
            password: merchant.password,
            balance: merchant.deposit,
            mid: mid.clone(),
        };

        match self.merchants.entry(mid.clone()) {
            Entry::Occupied(_) => Err(DirectoryError::DuplicateMerchant { mid }),
            Entry::Vacant(slot) => {
                debug!(mid = %account.mid, branch = %account.branch, "merchant registered");
                slot.insert(Arc::new(Mutex::new(account.clone())));
                Ok(account)
            }
        }
    }

    /// Insert an already-derived account, as read back from the store.
    /// Silently replaces any in-memory copy; the store is authoritative
    /// during rehydration.
    pub fn insert_user(&self, account: UserAccount) {
        self.users
            .insert(account.mmid.clone(), Arc::new(Mutex::new(account)));
    }

    /// Insert an already-derived merchant account from the store.
    pub fn insert_merchant(&self, account: MerchantAccount) {
        self.merchants
            .insert(account.mid.clone(), Arc::new(Mutex::new(account)));
    }

    // -----------------------------------------------------------------------
    // Settlement
    // -----------------------------------------------------------------------

    /// Move `amount` from a user to a merchant, atomically.
    ///
    /// Checks run in a fixed order so the first failure wins: sender
    /// lookup, PIN, receiver lookup, amount positivity, funds. On any
    /// failure neither balance moves.
    pub fn settle(
        &self,
        sender_mmid: &str,
        pin: &str,
        receiver_mid: &str,
        amount: i64,
    ) -> Result<Settlement, DirectoryError> {
        self.settle_with(sender_mmid, pin, receiver_mid, amount, |_, _| Ok(()))
    }

    /// [`settle`](Self::settle) with a persistence hook.
    ///
    /// `persist` runs with both account locks held and receives the
    /// post-settlement snapshots before they are committed to the
    /// registry. Concurrent settlements touching an account therefore
    /// reach the hook in the same order their balances move, so a
    /// write-through store can never land a stale snapshot on top of a
    /// newer one. If the hook fails, neither balance moves.
    pub fn settle_with<E, F>(
        &self,
        sender_mmid: &str,
        pin: &str,
        receiver_mid: &str,
        amount: i64,
        persist: F,
    ) -> Result<Settlement, E>
    where
        E: From<DirectoryError>,
        F: FnOnce(&UserAccount, &MerchantAccount) -> Result<(), E>,
    {
        let sender = self.user_handle(sender_mmid)?;

        // Sender lock first, then receiver. The namespaces are disjoint, so
        // the order is global and cannot deadlock.
        let mut sender = sender.lock();
        if sender.pin != pin {
            return Err(DirectoryError::IncorrectPin.into());
        }

        let receiver = self.merchant_handle(receiver_mid)?;
        let mut receiver = receiver.lock();

        if amount <= 0 {
            return Err(DirectoryError::NonPositiveAmount { amount }.into());
        }
        let amount = amount as u64;

        if sender.balance < amount {
            return Err(DirectoryError::Insufficient {
                balance: sender.balance,
                requested: amount,
            }
            .into());
        }
        // Check the credit before touching either balance, so a failure
        // at this point is still a clean refusal, never a half-applied one.
        let credited = receiver.balance.checked_add(amount).ok_or_else(|| {
            E::from(DirectoryError::Overflow {
                balance: receiver.balance,
                credit: amount,
            })
        })?;

        let mut sender_after = sender.clone();
        sender_after.balance -= amount;
        let mut receiver_after = receiver.clone();
        receiver_after.balance = credited;

        persist(&sender_after, &receiver_after)?;

        sender.balance = sender_after.balance;
        receiver.balance = receiver_after.balance;

        Ok(Settlement {
            sender: sender_after,
            receiver: receiver_after,
            amount,
        })
    }

    /// Debit a single user account. The account lock covers the whole
    /// read-modify-write; a balance that cannot cover the amount is
    /// rejected, never clamped. Returns the new balance.
    ///
    /// Settlement does not go through here — it needs both parties under
    /// lock at once and uses [`settle`](Self::settle). This is the
    /// single-account primitive.
    pub fn debit(&self, mmid: &str, amount: u64) -> Result<u64, DirectoryError> {
        let handle = self.user_handle(mmid)?;
        let mut account = handle.lock();
        if account.balance < amount {
            return Err(DirectoryError::Insufficient {
                balance: account.balance,
                requested: amount,
            });
        }
        account.balance -= amount;
        Ok(account.balance)
    }

    /// Credit a single merchant account under its lock. Returns the new
    /// balance; a credit that would overflow is refused untouched.
    pub fn credit(&self, mid: &str, amount: u64) -> Result<u64, DirectoryError> {
        let handle = self.merchant_handle(mid)?;
        let mut account = handle.lock();
        account.balance =
            account
                .balance
                .checked_add(amount)
                .ok_or(DirectoryError::Overflow {
                    balance: account.balance,
                    credit: amount,
                })?;
        Ok(account.balance)
    }

    fn user_handle(&self, mmid: &str) -> Result<Arc<Mutex<UserAccount>>, DirectoryError> {
        self.users
            .get(mmid)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| DirectoryError::UnknownUser {
                mmid: mmid.to_string(),
            })
    }

    fn merchant_handle(&self, mid: &str) -> Result<Arc<Mutex<MerchantAccount>>, DirectoryError> {
        self.merchants
            .get(mid)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| DirectoryError::UnknownMerchant {
                mid: mid.to_string(),
            })
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// A user's balance, gated on their PIN. `None` covers both a wrong
    /// PIN and an unknown MMID; callers are not told which.
    pub fn user_balance(&self, mmid: &str, pin: &str) -> Option<u64> {
        let handle = Arc::clone(self.users.get(mmid)?.value());
        let account = handle.lock();
        (account.pin == pin).then_some(account.balance)
    }

    /// A merchant's balance, by MID alone.
    pub fn merchant_balance(&self, mid: &str) -> Option<u64> {
        let handle = Arc::clone(self.merchants.get(mid)?.value());
        let balance = handle.lock().balance;
        Some(balance)
    }

    /// Snapshot of a single user account.
    pub fn user(&self, mmid: &str) -> Option<UserAccount> {
        let handle = Arc::clone(self.users.get(mmid)?.value());
        let account = handle.lock().clone();
        Some(account)
    }

    /// Snapshot of a single merchant account.
    pub fn merchant(&self, mid: &str) -> Option<MerchantAccount> {
        let handle = Arc::clone(self.merchants.get(mid)?.value());
        let account = handle.lock().clone();
        Some(account)
    }

    /// Number of registered users.
    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    /// Number of registered merchants.
    pub fn merchant_count(&self) -> usize {
        self.merchants.len()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
