//! # Bank Store
//!
//! The bank's persistence layer, built on sled's embedded key-value store.
//! Everything the bank must still know after a restart flows through here:
//! accounts and the settlement chain.
//!
//! ## Tree Layout
//!
//! | Tree        | Key               | Value                     |
//! |-------------|-------------------|---------------------------|
//! | `users`     | MMID (UTF-8)      | `bincode(UserAccount)`    |
//! | `merchants` | MID (UTF-8)       | `bincode(MerchantAccount)`|
//! | `ledger`    | height (8B BE)    | `bincode(Block)`          |
//! | `metadata`  | key (UTF-8)       | value (bytes)             |
//!
//! Ledger heights are stored big-endian so sled's lexicographic ordering
//! matches numeric ordering and a plain range scan replays the chain in
//! append order. The chain tip lives in `metadata` as well, so a reopened
//! store can cross-check the rebuilt chain against what it last recorded.
//!
//! ## Write discipline
//!
//! The bank writes through on every mutation: a registration persists the
//! new account before the caller hears about it, a settlement persists
//! both touched accounts and the new block. `put_block` flushes, so a
//! settlement the client saw confirmed is on disk. The bank drives
//! `put_block` from inside the ledger's append section, so blocks and
//! tip updates arrive strictly in height order.

use std::path::Path;

use sled::{Batch, Db, Tree};
use thiserror::Error;

use crate::directory::{MerchantAccount, UserAccount};
use crate::ledger::Block;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors from the persistence layer.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The underlying sled database failed.
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    /// A stored value failed to encode or decode.
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Shorthand for store results.
pub type StoreResult<T> = Result<T, StoreError>;

/// Well-known key in `metadata` for the ledger's tip block id.
const META_LEDGER_TIP: &[u8] = b"ledger_tip";

// ---------------------------------------------------------------------------
// BankStore
// ---------------------------------------------------------------------------

/// Persistent storage for one bank process.
///
/// sled trees support lock-free concurrent reads and serialized writes, so
/// a `BankStore` can be shared across tasks via `Arc` (or cloned; clones
/// share the same underlying database).
#[derive(Debug, Clone)]
pub struct BankStore {
    /// The underlying sled handle.
    db: Db,
    /// User accounts keyed by MMID.
    users: Tree,
    /// Merchant accounts keyed by MID.
    merchants: Tree,
    /// Settlement blocks keyed by big-endian height.
    ledger: Tree,
    /// Small key-value metadata (ledger tip).
    metadata: Tree,
}

impl BankStore {
    /// Open or create a store at the given filesystem path.
    pub fn open<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        let db = sled::open(path)?;
        Self::from_db(db)
    }

    /// Create a temporary store that vanishes when dropped. For tests.
    pub fn open_temporary() -> StoreResult<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db)
    }

    fn from_db(db: Db) -> StoreResult<Self> {
        let users = db.open_tree("users")?;
        let merchants = db.open_tree("merchants")?;
        let ledger = db.open_tree("ledger")?;
        let metadata = db.open_tree("metadata")?;

        Ok(Self {
            db,
            users,
            merchants,
            ledger,
            metadata,
        })
    }

    // -- User accounts ------------------------------------------------------

    /// Persist a user account (insert or overwrite) keyed by its MMID.
    pub fn put_user(&self, account: &UserAccount) -> StoreResult<()> {
        let bytes =
            bincode::serialize(account).map_err(|e| StoreError::Serialization(e.to_string()))?;
        self.users.insert(account.mmid.as_bytes(), bytes)?;
        Ok(())
    }

    /// Fetch one user account by MMID.
    pub fn get_user(&self, mmid: &str) -> StoreResult<Option<UserAccount>> {
        match self.users.get(mmid.as_bytes())? {
            Some(bytes) => {
                let account = bincode::deserialize(&bytes)
                    .map_err(|e| StoreError::Serialization(e.to_string()))?;
                Ok(Some(account))
            }
            None => Ok(None),
        }
    }

    /// Every stored user account, for directory rehydration.
    pub fn users(&self) -> StoreResult<Vec<UserAccount>> {
        let mut accounts = Vec::new();
        for entry in self.users.iter() {
            let (_key, bytes) = entry?;
            let account = bincode::deserialize(&bytes)
                .map_err(|e| StoreError::Serialization(e.to_string()))?;
            accounts.push(account);
        }
        Ok(accounts)
    }

    // -- Merchant accounts --------------------------------------------------

    /// Persist a merchant account (insert or overwrite) keyed by its MID.
    pub fn put_merchant(&self, account: &MerchantAccount) -> StoreResult<()> {
        let bytes =
            bincode::serialize(account).map_err(|e| StoreError::Serialization(e.to_string()))?;
        self.merchants.insert(account.mid.as_bytes(), bytes)?;
        Ok(())
    }

    /// Fetch one merchant account by MID.
    pub fn get_merchant(&self, mid: &str) -> StoreResult<Option<MerchantAccount>> {
        match self.merchants.get(mid.as_bytes())? {
            Some(bytes) => {
                let account = bincode::deserialize(&bytes)
                    .map_err(|e| StoreError::Serialization(e.to_string()))?;
                Ok(Some(account))
            }
            None => Ok(None),
        }
    }

    /// Every stored merchant account, for directory rehydration.
    pub fn merchants(&self) -> StoreResult<Vec<MerchantAccount>> {
        let mut accounts = Vec::new();
        for entry in self.merchants.iter() {
            let (_key, bytes) = entry?;
            let account = bincode::deserialize(&bytes)
                .map_err(|e| StoreError::Serialization(e.to_string()))?;
            accounts.push(account);
        }
        Ok(accounts)
    }

    // -- Ledger -------------------------------------------------------------

    /// Persist a settlement block at its chain height and advance the
    /// stored tip, then flush so the settlement survives a crash.
    pub fn put_block(&self, height: u64, block: &Block) -> StoreResult<()> {
        let bytes =
            bincode::serialize(block).map_err(|e| StoreError::Serialization(e.to_string()))?;

        let mut batch = Batch::default();
        batch.insert(&height.to_be_bytes(), bytes);
        self.ledger.apply_batch(batch)?;

        self.metadata
            .insert(META_LEDGER_TIP, block.id.as_bytes())?;
        self.db.flush()?;
        Ok(())
    }

    /// The whole stored chain, ascending by height.
    pub fn blocks(&self) -> StoreResult<Vec<Block>> {
        let mut blocks = Vec::new();
        for entry in self.ledger.iter() {
            let (_key, bytes) = entry?;
            let block = bincode::deserialize(&bytes)
                .map_err(|e| StoreError::Serialization(e.to_string()))?;
            blocks.push(block);
        }
        Ok(blocks)
    }

    /// The tip block id the store last recorded, if any block ever landed.
    pub fn ledger_tip(&self) -> StoreResult<Option<String>> {
        match self.metadata.get(META_LEDGER_TIP)? {
            Some(bytes) => {
                let tip = String::from_utf8(bytes.to_vec())
                    .map_err(|e| StoreError::Serialization(e.to_string()))?;
                Ok(Some(tip))
            }
            None => Ok(None),
        }
    }

    // -- Counters -----------------------------------------------------------

    /// Number of stored user accounts.
    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    /// Number of stored merchant accounts.
    pub fn merchant_count(&self) -> usize {
        self.merchants.len()
    }

    /// Number of stored settlement blocks.
    pub fn block_count(&self) -> usize {
        self.ledger.len()
    }

    /// Block until all pending writes are durable.
    pub fn flush(&self) -> StoreResult<()> {
        self.db.flush()?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::BranchCode;
    use crate::ledger::Ledger;

    fn sbin() -> BranchCode {
        "SBIN0001234".parse().unwrap()
    }

    fn icic() -> BranchCode {
        "ICIC0003456".parse().unwrap()
    }

    fn user(mmid: &str, balance: u64) -> UserAccount {
        UserAccount {
            name: "Alice".to_string(),
            branch: sbin(),
            password: "hunter2".to_string(),
            pin: "4321".to_string(),
            mobile: "9876543210".to_string(),
            balance,
            uid: "00112233445566aa".to_string(),
            mmid: mmid.to_string(),
        }
    }

    fn merchant(mid: &str, balance: u64) -> MerchantAccount {
        MerchantAccount {
            name: "Bob's Store".to_string(),
            branch: icic(),
            password: "s3cret".to_string(),
            balance,
            mid: mid.to_string(),
        }
    }

    fn linked_blocks(count: u64) -> Vec<(u64, Block)> {
        let ledger = Ledger::new();
        (0..count)
            .map(|i| ledger.append("8899aabbccddeeff", sbin(), "0011223344556677", icic(), i + 1))
            .collect()
    }

    #[test]
    fn open_temporary_store() {
        let store = BankStore::open_temporary().expect("temp store");
        assert_eq!(store.user_count(), 0);
        assert_eq!(store.merchant_count(), 0);
        assert_eq!(store.block_count(), 0);
        assert!(store.ledger_tip().unwrap().is_none());
    }

    #[test]
    fn open_persistent_store() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = BankStore::open(dir.path()).expect("open");
        assert_eq!(store.user_count(), 0);
        drop(store);

        let reopened = BankStore::open(dir.path()).expect("reopen");
        assert_eq!(reopened.user_count(), 0);
    }

    #[test]
    fn user_account_round_trip() {
        let store = BankStore::open_temporary().unwrap();
        let account = user("8899aabbccddeeff", 1000);

        store.put_user(&account).unwrap();
        let back = store.get_user(&account.mmid).unwrap().expect("stored user");
        assert_eq!(back, account);
        assert_eq!(store.user_count(), 1);
    }

    #[test]
    fn missing_accounts_are_none() {
        let store = BankStore::open_temporary().unwrap();
        assert!(store.get_user("ffffffffffffffff").unwrap().is_none());
        assert!(store.get_merchant("ffffffffffffffff").unwrap().is_none());
    }

    #[test]
    fn merchant_account_round_trip() {
        let store = BankStore::open_temporary().unwrap();
        let account = merchant("0011223344556677", 500);

        store.put_merchant(&account).unwrap();
        let back = store
            .get_merchant(&account.mid)
            .unwrap()
            .expect("stored merchant");
        assert_eq!(back, account);
    }

    #[test]
    fn overwrite_updates_the_balance() {
        let store = BankStore::open_temporary().unwrap();
        store.put_user(&user("8899aabbccddeeff", 1000)).unwrap();
        store.put_user(&user("8899aabbccddeeff", 700)).unwrap();

        let back = store.get_user("8899aabbccddeeff").unwrap().unwrap();
        assert_eq!(back.balance, 700);
        assert_eq!(store.user_count(), 1);
    }

    #[test]
    fn blocks_come_back_in_height_order() {
        let store = BankStore::open_temporary().unwrap();
        for (height, block) in linked_blocks(5) {
            store.put_block(height, &block).unwrap();
        }

        let blocks = store.blocks().unwrap();
        assert_eq!(blocks.len(), 5);
        let amounts: Vec<u64> = blocks.iter().map(|b| b.amount).collect();
        assert_eq!(amounts, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn tip_metadata_tracks_the_last_block() {
        let store = BankStore::open_temporary().unwrap();
        let chain = linked_blocks(3);
        for (height, block) in &chain {
            store.put_block(*height, block).unwrap();
        }

        let tip = store.ledger_tip().unwrap().expect("tip recorded");
        assert_eq!(tip, chain.last().unwrap().1.id);
    }

    #[test]
    fn reopen_preserves_everything() {
        let dir = tempfile::tempdir().unwrap();
        let chain = linked_blocks(4);
        {
            let store = BankStore::open(dir.path()).unwrap();
            store.put_user(&user("8899aabbccddeeff", 750)).unwrap();
            store.put_merchant(&merchant("0011223344556677", 250)).unwrap();
            for (height, block) in &chain {
                store.put_block(*height, block).unwrap();
            }
            store.flush().unwrap();
        }

        let store = BankStore::open(dir.path()).unwrap();
        assert_eq!(store.user_count(), 1);
        assert_eq!(store.merchant_count(), 1);
        assert_eq!(store.block_count(), 4);
        assert_eq!(store.get_user("8899aabbccddeeff").unwrap().unwrap().balance, 750);
        assert_eq!(
            store.ledger_tip().unwrap().as_deref(),
            Some(chain.last().unwrap().1.id.as_str())
        );

        // The stored chain must rebuild into a verifiable ledger.
        let ledger = Ledger::from_blocks(store.blocks().unwrap()).expect("chain links");
        assert!(ledger.verify().is_ok());
        assert_eq!(ledger.tip(), chain.last().unwrap().1.id);
    }

    #[test]
    fn racing_appends_keep_the_stored_tip_current() {
        let store = BankStore::open_temporary().unwrap();
        let ledger = std::sync::Arc::new(Ledger::new());

        let mut handles = Vec::new();
        for _ in 0..4 {
            let store = store.clone();
            let ledger = std::sync::Arc::clone(&ledger);
            handles.push(std::thread::spawn(move || {
                for amount in 1..=5 {
                    ledger
                        .append_with(
                            "8899aabbccddeeff",
                            sbin(),
                            "0011223344556677",
                            icic(),
                            amount,
                            |height, block| store.put_block(height, block),
                        )
                        .unwrap();
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        // However the writers interleaved, the stored tip names the newest
        // block and the stored chain rebuilds to the live one.
        assert_eq!(store.block_count(), 20);
        assert_eq!(store.ledger_tip().unwrap(), Some(ledger.tip()));
        let rebuilt = Ledger::from_blocks(store.blocks().unwrap()).expect("chain links");
        assert_eq!(rebuilt.tip(), ledger.tip());
        assert!(rebuilt.verify().is_ok());
    }

    #[test]
    fn rehydration_scans_return_all_accounts() {
        let store = BankStore::open_temporary().unwrap();
        store.put_user(&user("aaaaaaaaaaaaaaaa", 10)).unwrap();
        store.put_user(&user("bbbbbbbbbbbbbbbb", 20)).unwrap();
        store.put_merchant(&merchant("cccccccccccccccc", 30)).unwrap();

        assert_eq!(store.users().unwrap().len(), 2);
        assert_eq!(store.merchants().unwrap().len(), 1);
    }
}
