//! # Credential Cipher
//!
//! Textbook public-key encryption over a deliberately tiny modulus. A payer's
//! MMID and PIN are masked with this cipher while they cross the wire, one
//! character at a time: each code point is raised to the public exponent
//! modulo `n`, producing a sequence of integers instead of a single value.
//!
//! Let's be clear about what this is: **a demonstration target, not
//! security**. The modulus is small enough to factor on a napkin, which is
//! exactly what [`super::shor`] does. Every warning the textbook prints next
//! to this construction applies here on purpose.
//!
//! Key generation follows the classic recipe — two small primes, `n = p*q`,
//! `φ = (p-1)(q-1)`, a public exponent coprime to `φ`, and the private
//! exponent as its modular inverse. The fixed demo keypair
//! (`p = 127, q = 257, e = 353, d = 6305`) is what every client and the bank
//! share in the simulation.

use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{DEMO_MODULUS, DEMO_PRIVATE_EXPONENT, DEMO_PUBLIC_EXPONENT};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur while decoding a masked credential.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CredentialError {
    /// A ciphertext integer is not a valid residue for this key's modulus.
    #[error("ciphertext value {value} is outside the modulus range (n = {modulus})")]
    OutOfRange {
        /// The offending ciphertext integer.
        value: u64,
        /// The key's modulus.
        modulus: u64,
    },

    /// A decoded code point is not printable ASCII. Either the ciphertext
    /// was produced under a different key or someone is feeding us noise.
    #[error("decoded code point {code} is not printable ASCII")]
    Unprintable {
        /// The decoded integer that failed the printability check.
        code: u64,
    },
}

// ---------------------------------------------------------------------------
// Modular arithmetic
// ---------------------------------------------------------------------------

/// Modular exponentiation by repeated squaring.
///
/// Intermediate products go through `u128` so the function is correct for
/// any `u64` modulus, not just the toy ones we actually use.
pub fn mod_pow(base: u64, mut exponent: u64, modulus: u64) -> u64 {
    if modulus == 1 {
        return 0;
    }
    let modulus = modulus as u128;
    let mut base = base as u128 % modulus;
    let mut result: u128 = 1;
    while exponent > 0 {
        if exponent & 1 == 1 {
            result = result * base % modulus;
        }
        base = base * base % modulus;
        exponent >>= 1;
    }
    result as u64
}

/// Iterative greatest common divisor.
pub fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

/// Modular inverse via the iterative extended Euclidean algorithm.
///
/// Returns `None` when `value` and `modulus` are not coprime, i.e. when the
/// inverse does not exist. Deliberately loop-based: the recursive version
/// reads nicer in a textbook and blows the stack everywhere else.
pub fn mod_inverse(value: u64, modulus: u64) -> Option<u64> {
    let (mut old_r, mut r) = (value as i128, modulus as i128);
    let (mut old_s, mut s) = (1i128, 0i128);

    while r != 0 {
        let quotient = old_r / r;
        (old_r, r) = (r, old_r - quotient * r);
        (old_s, s) = (s, old_s - quotient * s);
    }

    if old_r != 1 {
        return None;
    }
    Some(old_s.rem_euclid(modulus as i128) as u64)
}

// ---------------------------------------------------------------------------
// Keys
// ---------------------------------------------------------------------------

/// Primes eligible for generated keypairs. Small enough that any product
/// stays comfortably within the cryptanalysis module's factoring budget,
/// large enough that `n` exceeds every printable code point.
const KEYGEN_PRIMES: &[u64] = &[
    53, 61, 127, 131, 137, 139, 149, 151, 157, 163, 167, 173, 179, 181, 191, 193, 197, 199, 211,
    223, 227, 229, 233, 239, 241, 251, 257,
];

/// The public half of a credential keypair: `(e, n)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicKey {
    /// Public exponent.
    pub e: u64,
    /// Modulus `n = p * q`.
    pub n: u64,
}

/// The private half of a credential keypair: `(d, n)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrivateKey {
    /// Private exponent, the inverse of `e` modulo `φ(n)`.
    pub d: u64,
    /// Modulus `n = p * q`.
    pub n: u64,
}

/// A full credential keypair.
#[derive(Debug, Clone, Copy)]
pub struct CredentialKeypair {
    /// Published to clients for masking credentials.
    pub public: PublicKey,
    /// Held by the bank for unmasking them.
    pub private: PrivateKey,
}

impl CredentialKeypair {
    /// The fixed demo keypair every party in the simulation shares.
    pub fn demo() -> Self {
        Self {
            public: PublicKey {
                e: DEMO_PUBLIC_EXPONENT,
                n: DEMO_MODULUS,
            },
            private: PrivateKey {
                d: DEMO_PRIVATE_EXPONENT,
                n: DEMO_MODULUS,
            },
        }
    }

    /// Generate a fresh keypair from two distinct small primes.
    ///
    /// The exponent is drawn uniformly until it lands coprime to `φ`, which
    /// for these moduli takes a handful of tries at most.
    pub fn generate<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let p = KEYGEN_PRIMES[rng.gen_range(0..KEYGEN_PRIMES.len())];
        let q = loop {
            let candidate = KEYGEN_PRIMES[rng.gen_range(0..KEYGEN_PRIMES.len())];
            if candidate != p {
                break candidate;
            }
        };

        let n = p * q;
        let phi = (p - 1) * (q - 1);

        loop {
            let e = rng.gen_range(3..phi);
            if gcd(e, phi) != 1 {
                continue;
            }
            if let Some(d) = mod_inverse(e, phi) {
                return Self {
                    public: PublicKey { e, n },
                    private: PrivateKey { d, n },
                };
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Encrypt / Decrypt
// ---------------------------------------------------------------------------

impl PublicKey {
    /// Encode a single value: `c = m^e mod n`.
    ///
    /// Round-trip with [`PrivateKey::decrypt_value`] is guaranteed only for
    /// `m < n`; larger values alias modulo `n` exactly as the math says
    /// they must.
    pub fn encrypt_value(&self, m: u64) -> u64 {
        mod_pow(m, self.e, self.n)
    }

    /// Mask a string character by character.
    ///
    /// Each code point is encoded independently against the same key. The
    /// result is a sequence of integers, not a single ciphertext — small
    /// plaintext space, by design, so the factoring demo stays tractable.
    pub fn encrypt_str(&self, msg: &str) -> Vec<u64> {
        msg.chars().map(|c| self.encrypt_value(c as u64)).collect()
    }
}

impl PrivateKey {
    /// Decode a single value: `m = c^d mod n`.
    ///
    /// Rejects ciphertext integers outside `0..n` — those were never
    /// produced under this key.
    pub fn decrypt_value(&self, c: u64) -> Result<u64, CredentialError> {
        if c >= self.n {
            return Err(CredentialError::OutOfRange {
                value: c,
                modulus: self.n,
            });
        }
        Ok(mod_pow(c, self.d, self.n))
    }

    /// Unmask a character sequence produced by [`PublicKey::encrypt_str`].
    ///
    /// Fails with a structured error (never a panic) if any integer is out
    /// of range or decodes to something outside printable ASCII — the
    /// telltale of a wrong key or a corrupted capture.
    pub fn decrypt_str(&self, cipher: &[u64]) -> Result<String, CredentialError> {
        let mut plain = String::with_capacity(cipher.len());
        for &c in cipher {
            let code = self.decrypt_value(c)?;
            if !(0x20..=0x7E).contains(&code) {
                return Err(CredentialError::Unprintable { code });
            }
            plain.push(code as u8 as char);
        }
        Ok(plain)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
