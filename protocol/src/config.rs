//! # Protocol Constants
//!
//! Every magic number in PAISA lives here. If you're hardcoding a constant
//! somewhere else, you're doing it wrong and you owe the team coffee.
//!
//! Most of these values are part of the simulated network's contract:
//! clients, terminals, and the bank all assume the same demo key material
//! and the same wire limits, so change them everywhere or nowhere.

// ---------------------------------------------------------------------------
// Protocol Version
// ---------------------------------------------------------------------------

/// The full version string, assembled at compile time so we don't allocate
/// for something this trivial at runtime.
pub const PROTOCOL_VERSION: &str = "0.1.0";

// ---------------------------------------------------------------------------
// Network Endpoints
// ---------------------------------------------------------------------------

/// Default TCP port for the bank service. Every registration, transfer,
/// and balance query lands here.
pub const DEFAULT_BANK_PORT: u16 = 5000;

/// Default TCP port for a merchant terminal (the "machine"). Payers talk
/// to the terminal; the terminal talks to the bank.
pub const DEFAULT_MACHINE_PORT: u16 = 5001;

/// Default bank listen address used by the node binary and the demo flows.
pub const DEFAULT_BANK_ADDR: &str = "127.0.0.1:5000";

/// Default merchant terminal listen address.
pub const DEFAULT_MACHINE_ADDR: &str = "127.0.0.1:5001";

// ---------------------------------------------------------------------------
// Wire Format
// ---------------------------------------------------------------------------

/// Maximum size of a single wire frame (length prefix excluded).
///
/// 64 KiB is three orders of magnitude above the largest legitimate
/// message; anything bigger is a confused client or an attack, and either
/// way we refuse to buffer it.
pub const MAX_FRAME_BYTES: usize = 64 * 1024;

/// Size of the big-endian length prefix that precedes every frame.
pub const LENGTH_PREFIX_BYTES: usize = 4;

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Length, in hex characters, of every account identifier (UID, MMID, MID)
/// and of the enciphered merchant token. 16 hex chars = 64 bits, which is
/// exactly one token-cipher block.
pub const ID_HEX_LEN: usize = 16;

// ---------------------------------------------------------------------------
// Credential Cipher (demo parameters)
// ---------------------------------------------------------------------------

/// Demo prime `p`. Yes, it's tiny. That's the entire point: the credential
/// cipher exists to be broken by the cryptanalysis module.
pub const DEMO_PRIME_P: u64 = 127;

/// Demo prime `q`.
pub const DEMO_PRIME_Q: u64 = 257;

/// Demo modulus `n = p * q`.
pub const DEMO_MODULUS: u64 = 32_639;

/// Demo public exponent `e`, coprime to `(p-1)(q-1)`.
pub const DEMO_PUBLIC_EXPONENT: u64 = 353;

/// Demo private exponent `d = e⁻¹ mod (p-1)(q-1)`.
pub const DEMO_PRIVATE_EXPONENT: u64 = 6_305;

// ---------------------------------------------------------------------------
// Token Cipher
// ---------------------------------------------------------------------------

/// Number of ARX rounds applied to each 32-bit half-block.
pub const TOKEN_ROUNDS: usize = 22;

/// Demo terminal key shared by every merchant machine in the simulation.
/// A real deployment would provision one per terminal.
pub const DEMO_TERMINAL_KEY: u64 = 0x1918_1110_0908_0100;

/// Wall-clock format baked into token issuance: the timestamp string is
/// parsed as a *decimal* integer and XORed into the identifier before
/// enciphering. 14 digits, so it always fits a u64.
pub const TOKEN_TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

// ---------------------------------------------------------------------------
// Cryptanalysis Budgets
// ---------------------------------------------------------------------------

/// Default number of random bases the factoring routine tries before
/// declaring the attack inconclusive.
pub const DEFAULT_FACTOR_ATTEMPTS: u32 = 32;

/// Default cap on the period-finding walk per base. Orders modulo the demo
/// modulus never exceed lcm(126, 256) = 16128, so 20k finds every period
/// while still bounding pathological moduli.
pub const DEFAULT_PERIOD_ITERATIONS: u32 = 20_000;
