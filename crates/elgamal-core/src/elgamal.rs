//! ElGamal formulas over a prime field of `u64` size

use crate::arith::{mod_mul, mod_pow};
use crate::types::{EncryptResponse, EphemeralSecret};

/// Public value `b = a^n mod p`
pub fn public_value(a: u64, n: &EphemeralSecret, p: u64) -> u64 {
    mod_pow(a, n.value(), p)
}

/// Recover `x = y2 * y1^(p-1-n) mod p`.
///
/// `n` must lie in `[1, p-2]`, which the sampler guarantees.
pub fn decrypt(p: u64, n: &EphemeralSecret, response: &EncryptResponse) -> u64 {
    let exponent = p - 1 - n.value();
    mod_mul(response.y2, mod_pow(response.y1, exponent, p), p)
}

/// Encrypt `m` to the public value `b` with ephemeral `k`:
/// `(a^k mod p, m * b^k mod p)`.
///
/// This is the counterparty's half of the exchange; the participant only uses
/// it through the in-memory stub service.
pub fn encrypt(a: u64, b: u64, p: u64, k: u64, m: u64) -> EncryptResponse {
    EncryptResponse {
        y1: mod_pow(a, k, p),
        y2: mod_mul(m % p, mod_pow(b, k, p), p),
    }
}
