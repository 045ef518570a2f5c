//! secp256k1 point arithmetic on raw coordinates
//!
//! The affine formulas are the reference operations. Scalar multiplication
//! runs a fixed-length double-and-add-always ladder whose accumulator lives
//! in Jacobian coordinates, so a whole multiplication costs one inversion.
//!
//! Branches inside the ladder still depend on the scalar bits (the selection
//! and the special cases of the addition law). That is acceptable for public
//! scalars in the verifier; do not feed long-lived secrets through this code
//! outside a trusted environment.

use super::field::{self, B, P};
use crate::{Error, Result};
use k256::elliptic_curve::bigint::{Encoding, U256};
use subtle::{Choice, ConstantTimeEq};

/// Generator x-coordinate
pub const GX: U256 =
    U256::from_be_hex("79BE667EF9DCBBAC55A06295CE870B07029BFCDB2DCE28D959F2815B16F81798");

/// Generator y-coordinate
pub const GY: U256 =
    U256::from_be_hex("483ADA7726A3C4655DA4FBFC0E1108A8FD17B448A68554199C47D08FFB10D4B8");

/// Affine point. The identity is encoded as `(0, 0)`, which is not on the curve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Point {
    pub x: U256,
    pub y: U256,
}

impl Point {
    pub const IDENTITY: Point = Point {
        x: U256::ZERO,
        y: U256::ZERO,
    };

    pub const GENERATOR: Point = Point { x: GX, y: GY };

    pub fn is_identity(&self) -> bool {
        self.x == U256::ZERO && self.y == U256::ZERO
    }

    /// `y^2 == x^3 + 7 (mod p)` with both coordinates already below `p`
    pub fn is_on_curve(&self) -> bool {
        if self.x >= P || self.y >= P {
            return false;
        }
        let y2 = field::mul(&self.y, &self.y, &P);
        let x3 = field::mul(&field::mul(&self.x, &self.x, &P), &self.x, &P);
        y2 == field::add(&x3, &B, &P)
    }

    /// Parse `x || y` (two 32-byte big-endian coordinates).
    ///
    /// Rejects coordinates `>= p`, points off the curve and the identity.
    pub fn from_uncompressed(bytes: &[u8; 64]) -> Result<Self> {
        let x = U256::from_be_slice(&bytes[..32]);
        let y = U256::from_be_slice(&bytes[32..]);
        if x >= P || y >= P {
            return Err(Error::MalformedInput(
                "point coordinate is not below the field prime".into(),
            ));
        }
        let point = Point { x, y };
        if point.is_identity() {
            return Err(Error::MalformedInput("point at infinity".into()));
        }
        if !point.is_on_curve() {
            return Err(Error::MalformedInput("point is not on secp256k1".into()));
        }
        Ok(point)
    }

    /// Encode as `x || y`. The identity encodes as 64 zero bytes.
    pub fn to_uncompressed(&self) -> [u8; 64] {
        let mut out = [0u8; 64];
        out[..32].copy_from_slice(&self.x.to_be_bytes());
        out[32..].copy_from_slice(&self.y.to_be_bytes());
        out
    }

    pub fn negate(&self) -> Point {
        if self.is_identity() {
            return *self;
        }
        Point {
            x: self.x,
            y: field::neg(&self.y, &P),
        }
    }
}

impl ConstantTimeEq for Point {
    fn ct_eq(&self, other: &Self) -> Choice {
        self.to_uncompressed().ct_eq(&other.to_uncompressed())
    }
}

/// Affine addition with the identity and doubling special cases.
pub fn add(a: &Point, b: &Point) -> Point {
    if a.is_identity() {
        return *b;
    }
    if b.is_identity() {
        return *a;
    }
    if a.x == b.x {
        if a.y == b.y {
            return double(a);
        }
        return Point::IDENTITY;
    }

    let slope = field::div(&field::sub(&b.y, &a.y, &P), &field::sub(&b.x, &a.x, &P), &P);
    let x3 = field::sub(
        &field::sub(&field::mul(&slope, &slope, &P), &a.x, &P),
        &b.x,
        &P,
    );
    let y3 = field::sub(
        &field::mul(&slope, &field::sub(&a.x, &x3, &P), &P),
        &a.y,
        &P,
    );
    Point { x: x3, y: y3 }
}

/// Affine doubling with slope `3x^2 / 2y`.
pub fn double(a: &Point) -> Point {
    if a.is_identity() || a.y == U256::ZERO {
        return Point::IDENTITY;
    }

    let x2 = field::mul(&a.x, &a.x, &P);
    let numerator = field::mul(&U256::from_u64(3), &x2, &P);
    let denominator = field::add(&a.y, &a.y, &P);
    let slope = field::div(&numerator, &denominator, &P);

    let x3 = field::sub(&field::mul(&slope, &slope, &P), &field::add(&a.x, &a.x, &P), &P);
    let y3 = field::sub(
        &field::mul(&slope, &field::sub(&a.x, &x3, &P), &P),
        &a.y,
        &P,
    );
    Point { x: x3, y: y3 }
}

/// `k * point` over exactly 256 ladder steps, most significant bit first.
///
/// `k` is not reduced; multiples of the group order land on the identity.
pub fn scalar_mul(k: &U256, point: &Point) -> Point {
    let mut acc = Jacobian::IDENTITY;
    for i in (0..U256::BITS).rev() {
        acc = acc.double();
        let sum = acc.add_affine(point);
        if k.bit_vartime(i) {
            acc = sum;
        }
    }
    acc.to_affine()
}

/// `k * G`
pub fn mul_generator(k: &U256) -> Point {
    scalar_mul(k, &Point::GENERATOR)
}

/// `(X, Y, Z)` representing `(X / Z^2, Y / Z^3)`; `Z == 0` is the identity.
#[derive(Debug, Clone, Copy)]
struct Jacobian {
    x: U256,
    y: U256,
    z: U256,
}

impl Jacobian {
    const IDENTITY: Jacobian = Jacobian {
        x: U256::ONE,
        y: U256::ONE,
        z: U256::ZERO,
    };

    fn is_identity(&self) -> bool {
        self.z == U256::ZERO
    }

    fn from_affine(p: &Point) -> Self {
        if p.is_identity() {
            return Self::IDENTITY;
        }
        Jacobian {
            x: p.x,
            y: p.y,
            z: U256::ONE,
        }
    }

    fn to_affine(&self) -> Point {
        if self.is_identity() {
            return Point::IDENTITY;
        }
        let z_inv = field::invert(&self.z, &P);
        let z_inv2 = field::mul(&z_inv, &z_inv, &P);
        let z_inv3 = field::mul(&z_inv2, &z_inv, &P);
        Point {
            x: field::mul(&self.x, &z_inv2, &P),
            y: field::mul(&self.y, &z_inv3, &P),
        }
    }

    // dbl-2009-l (a = 0)
    fn double(&self) -> Self {
        if self.is_identity() || self.y == U256::ZERO {
            return Self::IDENTITY;
        }
        let a = field::mul(&self.x, &self.x, &P);
        let b = field::mul(&self.y, &self.y, &P);
        let c = field::mul(&b, &b, &P);
        let xb = field::add(&self.x, &b, &P);
        let d = field::sub(&field::sub(&field::mul(&xb, &xb, &P), &a, &P), &c, &P);
        let d = field::add(&d, &d, &P);
        let e = field::add(&field::add(&a, &a, &P), &a, &P);
        let f = field::mul(&e, &e, &P);

        let x3 = field::sub(&f, &field::add(&d, &d, &P), &P);
        let c8 = field::mul(&U256::from_u64(8), &c, &P);
        let y3 = field::sub(&field::mul(&e, &field::sub(&d, &x3, &P), &P), &c8, &P);
        let yz = field::mul(&self.y, &self.z, &P);
        let z3 = field::add(&yz, &yz, &P);
        Jacobian { x: x3, y: y3, z: z3 }
    }

    // Mixed addition with an affine operand
    fn add_affine(&self, q: &Point) -> Self {
        if q.is_identity() {
            return *self;
        }
        if self.is_identity() {
            return Self::from_affine(q);
        }
        let z1z1 = field::mul(&self.z, &self.z, &P);
        let u2 = field::mul(&q.x, &z1z1, &P);
        let s2 = field::mul(&q.y, &field::mul(&self.z, &z1z1, &P), &P);
        let h = field::sub(&u2, &self.x, &P);
        let r = field::sub(&s2, &self.y, &P);

        if h == U256::ZERO {
            if r == U256::ZERO {
                return self.double();
            }
            return Self::IDENTITY;
        }

        let hh = field::mul(&h, &h, &P);
        let hhh = field::mul(&h, &hh, &P);
        let v = field::mul(&self.x, &hh, &P);

        let x3 = field::sub(
            &field::sub(&field::mul(&r, &r, &P), &hhh, &P),
            &field::add(&v, &v, &P),
            &P,
        );
        let y3 = field::sub(
            &field::mul(&r, &field::sub(&v, &x3, &P), &P),
            &field::mul(&self.y, &hhh, &P),
            &P,
        );
        let z3 = field::mul(&self.z, &h, &P);
        Jacobian { x: x3, y: y3, z: z3 }
    }
}

#[cfg(test)]
mod tests {
    use super::super::field::N;
    use super::*;
    use k256::elliptic_curve::sec1::ToEncodedPoint;
    use k256::{ProjectivePoint, Scalar};

    fn k256_mul_generator(k: u64) -> Point {
        let affine = (ProjectivePoint::GENERATOR * Scalar::from(k)).to_affine();
        let encoded = affine.to_encoded_point(false);
        let mut bytes = [0u8; 64];
        bytes.copy_from_slice(&encoded.as_bytes()[1..]);
        Point::from_uncompressed(&bytes).unwrap()
    }

    #[test]
    fn test_generator_on_curve() {
        assert!(Point::GENERATOR.is_on_curve());
        assert!(!Point::IDENTITY.is_on_curve());
    }

    #[test]
    fn test_one_times_generator() {
        assert_eq!(mul_generator(&U256::ONE), Point::GENERATOR);
    }

    #[test]
    fn test_order_times_generator_is_identity() {
        assert!(mul_generator(&N).is_identity());
        assert!(mul_generator(&U256::ZERO).is_identity());
    }

    #[test]
    fn test_order_minus_one_is_negation() {
        let minus_g = mul_generator(&N.wrapping_sub(&U256::ONE));
        assert_eq!(minus_g, Point::GENERATOR.negate());
        assert!(add(&minus_g, &Point::GENERATOR).is_identity());
    }

    #[test]
    fn test_double_matches_add() {
        let g = Point::GENERATOR;
        assert_eq!(double(&g), add(&g, &g));
        assert_eq!(double(&g), mul_generator(&U256::from_u64(2)));
    }

    #[test]
    fn test_identity_is_neutral() {
        let g = Point::GENERATOR;
        assert_eq!(add(&g, &Point::IDENTITY), g);
        assert_eq!(add(&Point::IDENTITY, &g), g);
        assert!(double(&Point::IDENTITY).is_identity());
    }

    #[test]
    fn test_ladder_matches_k256() {
        for k in [2u64, 3, 7, 255, 256, 0xffff_ffff, 0x1234_5678_9abc_def0] {
            assert_eq!(mul_generator(&U256::from_u64(k)), k256_mul_generator(k), "k = {k}");
        }
    }

    #[test]
    fn test_ladder_matches_affine_chain() {
        let g = Point::GENERATOR;
        let mut expected = Point::IDENTITY;
        for k in 1..=12u64 {
            expected = add(&expected, &g);
            assert_eq!(scalar_mul(&U256::from_u64(k), &g), expected);
        }
    }

    #[test]
    fn test_uncompressed_round_trip_and_rejection() {
        let p = mul_generator(&U256::from_u64(99));
        assert_eq!(Point::from_uncompressed(&p.to_uncompressed()).unwrap(), p);

        assert!(Point::from_uncompressed(&[0u8; 64]).is_err());

        let mut off_curve = p.to_uncompressed();
        off_curve[63] ^= 1;
        assert!(Point::from_uncompressed(&off_curve).is_err());

        let mut too_large = [0xffu8; 64];
        too_large[32..].copy_from_slice(&p.to_uncompressed()[32..]);
        assert!(Point::from_uncompressed(&too_large).is_err());
    }

    #[test]
    fn test_constant_time_eq() {
        let g = Point::GENERATOR;
        assert!(bool::from(g.ct_eq(&g)));
        assert!(!bool::from(g.ct_eq(&g.negate())));
    }
}
