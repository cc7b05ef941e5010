// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # PAISA Protocol — Core Library
//!
//! PAISA — Payment Authority & Instant Settlement Architecture — is a
//! self-contained simulation of a UPI-style instant payment network: one
//! bank, merchant-side payment machines, and the customers between them,
//! all speaking framed JSON over TCP.
//!
//! The cryptography is the weakest the textbook sells, and that is the
//! point. Credentials cross the wire under a public-key cipher whose
//! modulus fits in sixteen bits of honesty, payment tokens ride a
//! lightweight ARX block cipher, and the cryptanalysis module breaks the
//! former the classical-Shor way. Run the attack, watch a PIN fall out,
//! and you have learned why key sizes matter.
//!
//! ## Architecture
//!
//! The crate is split into modules that mirror the actual concerns of a
//! payment network:
//!
//! - **crypto** — Hashing, the credential cipher, the token cipher, and
//!   the attack that humbles them. Educational, not aspirational.
//! - **directory** — Accounts and the identifiers payments route on.
//! - **ledger** — Hash-linked settlement history. Tamper-evident, not
//!   distributed.
//! - **store** — sled-backed persistence. A restart is not amnesia.
//! - **bank** — The switch: registration, settlement, balance queries.
//! - **wire** — The JSON messages and the framing that carries them.
//! - **service** — The bank endpoint, the payment machine, the client.
//! - **config** — Protocol constants and network parameters.
//!
//! ## Design Philosophy
//!
//! 1. Failure text is protocol surface — clients match on it, so it is
//!    frozen, tested, and never improvised at the call site.
//! 2. No panics on the payment path. Every refusal is a typed error.
//! 3. Balances move under locks or they do not move at all.
//! 4. If it can race, there is a test that races it.

pub mod bank;
pub mod config;
pub mod crypto;
pub mod directory;
pub mod ledger;
pub mod service;
pub mod store;
pub mod wire;
