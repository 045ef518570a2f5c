//! Modular arithmetic over 256-bit integers
//!
//! Every function takes the modulus explicitly so the same code serves the
//! base field (`P`) and the scalar field (`N`). Operands are expected to be
//! reduced. For moduli above `2^255` (both secp256k1 moduli) a value in
//! `[m, 2^256)` is folded with one subtraction; smaller moduli take a full
//! remainder.

use k256::elliptic_curve::bigint::U256;

/// secp256k1 base field prime `p = 2^256 - 2^32 - 977`
pub const P: U256 =
    U256::from_be_hex("FFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFEFFFFFC2F");

/// secp256k1 group order `n`
pub const N: U256 =
    U256::from_be_hex("FFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFEBAAEDCE6AF48A03BBFD25E8CD0364141");

/// Curve constant `b` in `y^2 = x^3 + b`
pub const B: U256 = U256::from_u64(7);

fn assert_modulus(m: &U256) {
    assert!(*m != U256::ZERO, "modulus must be non-zero");
}

/// Reduce `a` into `[0, m)`
pub fn reduce(a: &U256, m: &U256) -> U256 {
    assert_modulus(m);
    if a < m {
        *a
    } else if m.bit_vartime(U256::BITS - 1) {
        a.wrapping_sub(m)
    } else {
        let (rem, _) = a.const_rem(m);
        rem
    }
}

/// `(a + b) mod m`
pub fn add(a: &U256, b: &U256, m: &U256) -> U256 {
    reduce(a, m).add_mod(&reduce(b, m), m)
}

/// `(a - b) mod m`
pub fn sub(a: &U256, b: &U256, m: &U256) -> U256 {
    reduce(a, m).sub_mod(&reduce(b, m), m)
}

/// `(-a) mod m`
pub fn neg(a: &U256, m: &U256) -> U256 {
    sub(&U256::ZERO, a, m)
}

/// `(a * b) mod m`
pub fn mul(a: &U256, b: &U256, m: &U256) -> U256 {
    assert_modulus(m);
    let (lo, hi) = a.mul_wide(b);
    let (rem, _) = U256::const_rem_wide((lo, hi), m);
    rem
}

/// `base^exp mod m`, square-and-multiply over all 256 exponent bits
pub fn pow(base: &U256, exp: &U256, m: &U256) -> U256 {
    let base = reduce(base, m);
    let mut acc = reduce(&U256::ONE, m);
    for i in (0..U256::BITS).rev() {
        acc = mul(&acc, &acc, m);
        if exp.bit_vartime(i) {
            acc = mul(&acc, &base, m);
        }
    }
    acc
}

/// Multiplicative inverse via Fermat's little theorem: `a^(m-2) mod m`.
///
/// # Panics
///
/// Panics if `a ≡ 0 (mod m)` or `m == 0`. Both are programming errors; no
/// caller may feed unchecked input here.
pub fn invert(a: &U256, m: &U256) -> U256 {
    assert_modulus(m);
    let a = reduce(a, m);
    assert!(a != U256::ZERO, "attempted to invert zero");
    pow(&a, &m.wrapping_sub(&U256::from_u64(2)), m)
}

/// `(a / b) mod m`
pub fn div(a: &U256, b: &U256, m: &U256) -> U256 {
    mul(a, &invert(b, m), m)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_wraps_around_modulus() {
        let a = P.wrapping_sub(&U256::ONE);
        assert_eq!(add(&a, &U256::from_u64(2), &P), U256::ONE);
        assert_eq!(add(&U256::from_u64(3), &U256::from_u64(4), &P), U256::from_u64(7));
    }

    #[test]
    fn test_sub_and_neg() {
        assert_eq!(sub(&U256::ONE, &U256::from_u64(2), &N), N.wrapping_sub(&U256::ONE));
        assert_eq!(neg(&U256::ZERO, &N), U256::ZERO);
        assert_eq!(add(&neg(&U256::from_u64(5), &P), &U256::from_u64(5), &P), U256::ZERO);
    }

    #[test]
    fn test_reduce_folds_values_above_modulus() {
        assert_eq!(reduce(&P, &P), U256::ZERO);
        assert_eq!(reduce(&U256::MAX, &P), U256::MAX.wrapping_sub(&P));
    }

    #[test]
    fn test_small_modulus_reduces_fully() {
        let seven = U256::from_u64(7);
        assert_eq!(reduce(&U256::from_u64(100), &seven), U256::from_u64(2));
        assert_eq!(add(&U256::from_u64(100), &U256::ZERO, &seven), U256::from_u64(2));
        assert_eq!(sub(&U256::from_u64(3), &U256::from_u64(100), &seven), U256::from_u64(1));
        assert_eq!(pow(&U256::from_u64(10), &U256::from_u64(3), &seven), U256::from_u64(6));
        assert_eq!(reduce(&U256::MAX, &U256::ONE), U256::ZERO);
    }

    #[test]
    fn test_mul_matches_small_values() {
        assert_eq!(mul(&U256::from_u64(6), &U256::from_u64(7), &N), U256::from_u64(42));
        // (p-1)^2 = 1 mod p
        let minus_one = P.wrapping_sub(&U256::ONE);
        assert_eq!(mul(&minus_one, &minus_one, &P), U256::ONE);
    }

    #[test]
    fn test_invert_round_trip() {
        for modulus in [P, N] {
            for v in [2u64, 3, 7, 977, 0xdead_beef] {
                let a = U256::from_u64(v);
                assert_eq!(mul(&a, &invert(&a, &modulus), &modulus), U256::ONE);
            }
        }
    }

    #[test]
    fn test_div() {
        let q = div(&U256::from_u64(42), &U256::from_u64(6), &N);
        assert_eq!(q, U256::from_u64(7));
    }

    #[test]
    fn test_pow_fermat() {
        let a = U256::from_u64(123_456_789);
        assert_eq!(pow(&a, &P.wrapping_sub(&U256::ONE), &P), U256::ONE);
    }

    #[test]
    #[should_panic(expected = "attempted to invert zero")]
    fn test_invert_zero_panics() {
        invert(&U256::ZERO, &P);
    }

    #[test]
    #[should_panic(expected = "attempted to invert zero")]
    fn test_invert_multiple_of_modulus_panics() {
        invert(&N, &N);
    }

    #[test]
    #[should_panic(expected = "modulus must be non-zero")]
    fn test_zero_modulus_panics() {
        mul(&U256::ONE, &U256::ONE, &U256::ZERO);
    }
}
