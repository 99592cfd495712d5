//! Modular arithmetic over `u64`
//!
//! Products are widened to `u128` before reduction, so every operand up to
//! `u64::MAX` is handled without overflow.

/// Compute `(a * b) mod m`.
///
/// Operands are expected to be reduced (`a, b < m`) but this is not required.
///
/// # Panics
/// Panics if `m` is zero.
#[inline]
pub fn mod_mul(a: u64, b: u64, m: u64) -> u64 {
    ((a as u128 * b as u128) % m as u128) as u64
}

/// Compute `base^exp mod m` by square-and-multiply.
///
/// Walks the bits of `exp` from least to most significant. `exp == 0` yields
/// `1 mod m`, and `m == 1` yields `0` for every input.
///
/// # Panics
/// Panics if `m` is zero.
pub fn mod_pow(base: u64, exp: u64, m: u64) -> u64 {
    let mut result = 1 % m;
    let mut base = base % m;
    let mut exp = exp;

    while exp > 0 {
        if exp & 1 == 1 {
            result = mod_mul(result, base, m);
        }
        base = mod_mul(base, base, m);
        exp >>= 1;
    }

    result
}
