//! # Period-Finding Attack
//!
//! Classical simulation of the quantum factoring attack against the
//! [credential cipher](crate::crypto::credential). The modulus in play is
//! 16 bits, so the "quantum" order-finding step is an honest brute-force
//! walk of `a^r mod n` — the point of the module is the narrative, not the
//! speedup: factor the public modulus, rebuild φ(n), invert the public
//! exponent, and read the victim's PIN off the wire.
//!
//! Everything here is budgeted. Random base selection gets a bounded number
//! of attempts and the period walk a bounded number of iterations; when the
//! budget runs out the caller gets an explicit [`Inconclusive`] outcome
//! instead of a hung loop.
//!
//! [`Inconclusive`]: Factoring::Inconclusive

use rand::Rng;
use tracing::{debug, warn};

use crate::config::{DEFAULT_FACTOR_ATTEMPTS, DEFAULT_PERIOD_ITERATIONS};
use crate::crypto::credential::{gcd, mod_inverse, mod_pow, PrivateKey, PublicKey};

// ---------------------------------------------------------------------------
// Budget
// ---------------------------------------------------------------------------

/// Caps on the attack's two loops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FactorBudget {
    /// Random bases to try before giving up on the modulus.
    pub attempts: u32,
    /// Multiplications allowed per period search.
    pub period_iterations: u32,
}

impl Default for FactorBudget {
    fn default() -> Self {
        Self {
            attempts: DEFAULT_FACTOR_ATTEMPTS,
            period_iterations: DEFAULT_PERIOD_ITERATIONS,
        }
    }
}

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// Result of a bounded factoring run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Factoring {
    /// Two non-trivial factors, smaller first.
    Factored {
        /// Smaller prime factor.
        p: u64,
        /// Larger cofactor.
        q: u64,
    },
    /// Every attempt in the budget failed to split the modulus.
    Inconclusive {
        /// Bases tried before giving up.
        attempts: u32,
    },
}

/// Result of a full credential break: factor, rebuild the key, decrypt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttackOutcome {
    /// The modulus split and the ciphertext decrypted.
    Recovered {
        /// Smaller prime factor of the modulus.
        p: u64,
        /// Larger prime factor of the modulus.
        q: u64,
        /// The reconstructed private key.
        private: PrivateKey,
        /// The plaintext the ciphertext concealed.
        plaintext: String,
    },
    /// The budget ran out, or the rebuilt key produced garbage.
    Inconclusive {
        /// The attempt budget that was in force.
        attempts: u32,
    },
}

// ---------------------------------------------------------------------------
// The attack
// ---------------------------------------------------------------------------

/// Find the multiplicative order of `base` modulo `modulus`: the smallest
/// `r >= 1` with `base^r == 1`. Walks at most `max_iterations` steps and
/// returns `None` when no period shows up inside the cap.
///
/// Callers must ensure `gcd(base, modulus) == 1`; otherwise no period
/// exists and the walk always exhausts its budget.
pub fn find_period(base: u64, modulus: u64, max_iterations: u32) -> Option<u64> {
    let mut value = 1u64;
    for r in 1..=u64::from(max_iterations) {
        value = (u128::from(value) * u128::from(base) % u128::from(modulus)) as u64;
        if value == 1 {
            return Some(r);
        }
    }
    None
}

/// Try to split `n` into two non-trivial factors within the budget.
///
/// Even moduli split immediately. Otherwise each attempt draws a random
/// base, takes the gcd shortcut if the base already shares a factor, and
/// runs the order-finding walk: an even period `r` with
/// `a^(r/2) != n - 1` yields a factor through `gcd(a^(r/2) ± 1, n)`.
pub fn factor(n: u64, budget: &FactorBudget) -> Factoring {
    if n < 4 {
        return Factoring::Inconclusive { attempts: 0 };
    }
    if n % 2 == 0 {
        return Factoring::Factored { p: 2, q: n / 2 };
    }

    let mut rng = rand::thread_rng();
    for attempt in 0..budget.attempts {
        let base = rng.gen_range(2..n - 1);

        // A base sharing a factor with n is already a win.
        let shortcut = gcd(base, n);
        if shortcut > 1 {
            debug!(n, base, factor = shortcut, "base shared a factor");
            return ordered(shortcut, n);
        }

        let Some(r) = find_period(base, n, budget.period_iterations) else {
            debug!(n, base, attempt, "period search exhausted its budget");
            continue;
        };
        if r % 2 != 0 {
            continue;
        }
        let y = mod_pow(base, r / 2, n);
        if y == n - 1 {
            continue;
        }
        for candidate in [gcd(y.saturating_sub(1), n), gcd(y + 1, n)] {
            if candidate > 1 && candidate < n {
                debug!(n, base, period = r, factor = candidate, "modulus split");
                return ordered(candidate, n);
            }
        }
    }
    Factoring::Inconclusive {
        attempts: budget.attempts,
    }
}

fn ordered(factor: u64, n: u64) -> Factoring {
    let other = n / factor;
    Factoring::Factored {
        p: factor.min(other),
        q: factor.max(other),
    }
}

/// Rebuild the private key behind a public key by factoring its modulus.
pub fn recover_private_key(public: &PublicKey, budget: &FactorBudget) -> Option<PrivateKey> {
    match factor(public.n, budget) {
        Factoring::Factored { p, q } => {
            let phi = (p - 1) * (q - 1);
            let d = mod_inverse(public.e, phi)?;
            Some(PrivateKey { d, n: public.n })
        }
        Factoring::Inconclusive { .. } => None,
    }
}

/// The full demonstration: factor the modulus, reconstruct the private
/// key, and decrypt an intercepted ciphertext.
pub fn break_credentials(
    public: &PublicKey,
    ciphertext: &[u64],
    budget: &FactorBudget,
) -> AttackOutcome {
    let (p, q) = match factor(public.n, budget) {
        Factoring::Factored { p, q } => (p, q),
        Factoring::Inconclusive { attempts } => {
            return AttackOutcome::Inconclusive { attempts };
        }
    };

    let phi = (p - 1) * (q - 1);
    let Some(d) = mod_inverse(public.e, phi) else {
        warn!(e = public.e, phi, "public exponent not invertible, key is not a valid credential key");
        return AttackOutcome::Inconclusive {
            attempts: budget.attempts,
        };
    };
    let private = PrivateKey { d, n: public.n };

    match private.decrypt_str(ciphertext) {
        Ok(plaintext) => AttackOutcome::Recovered {
            p,
            q,
            private,
            plaintext,
        },
        Err(err) => {
            warn!(%err, "recovered key failed to decrypt the intercepted ciphertext");
            AttackOutcome::Inconclusive {
                attempts: budget.attempts,
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
