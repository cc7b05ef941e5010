//! # Service Module
//!
//! The network actors of the payment simulation: the bank endpoint, the
//! merchant-side payment machine, and the client both of them talk to.
//!
//! ## Architecture
//!
//! ```text
//! bank.rs     — TCP endpoint wrapping a Bank; one task per connection
//! machine.rs  — merchant terminal: issues the payment token, redeems
//!               scanned tokens, relays settlements to the bank
//! client.rs   — connect-per-call client; masks credentials before send
//! ```
//!
//! ## Design Decisions
//!
//! - Binding is the caller's job: every service takes an already-bound
//!   `TcpListener`. Tests bind to port 0 and read the assigned address
//!   back; the binary binds the configured one. The service never guesses.
//! - One spawned task per connection, and a connection serves any number
//!   of requests. A task that dies takes exactly one client with it.
//! - The machine opens a fresh bank connection per forwarded settlement
//!   rather than pinning one. Losing the bank mid-session then costs one
//!   payment, not the terminal.
//! - Failure text sent to clients is part of the protocol and lives next
//!   to the handlers that emit it; see the constants in `bank` and
//!   `machine`.

pub mod bank;
pub mod client;
pub mod machine;

pub use bank::BankService;
pub use client::BankClient;
pub use machine::MachineService;
