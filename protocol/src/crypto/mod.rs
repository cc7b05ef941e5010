//! # Cryptographic Toolkit
//!
//! Every primitive the payment flow touches, in one place:
//!
//! - [`hash`] — SHA-256 helpers and the 16-hex account identifier scheme.
//! - [`credential`] — the textbook public-key cipher that protects PINs and
//!   ids in flight.
//! - [`token`] — the ARX block cipher behind merchant payment tokens and
//!   their timestamp binding.
//! - [`shor`] — the budgeted period-finding attack that breaks
//!   [`credential`] on purpose.
//!
//! ## A note on the obvious
//!
//! Only [`hash`] is real cryptography. The ciphers are classroom-sized by
//! design: small enough to read in an afternoon, small enough to break in
//! milliseconds, which is exactly what [`shor`] is here to demonstrate.
//! Nothing in this module is fit for protecting actual money, and no
//! amount of tuning the constants will change that.

pub mod credential;
pub mod hash;
pub mod shor;
pub mod token;

// Re-export the things people actually need so they don't have to memorize
// the module hierarchy.
pub use credential::{CredentialError, CredentialKeypair, PrivateKey, PublicKey};
pub use hash::{sha256_hex, sha256_hex_multi, short_id};
pub use shor::{
    break_credentials, factor, recover_private_key, AttackOutcome, FactorBudget, Factoring,
};
pub use token::{IssuedToken, TokenError, TokenKey};
