//! Finite-field and secp256k1 curve arithmetic kernel
//!
//! Pure functions over [`U256`] with no dependency on any signature library.
//! The verifier runs entirely on this module; the signing side uses `k256`
//! and converts at the boundary with [`scalar_to_uint`] and [`point_from_affine`].

pub mod field;
pub mod lagrange;
pub mod point;

pub use field::{N, P};
pub use point::{mul_generator, scalar_mul, Point};

use k256::elliptic_curve::bigint::U256;
use k256::elliptic_curve::ops::Reduce;
use k256::elliptic_curve::sec1::ToEncodedPoint;
use k256::{AffinePoint, Scalar};

/// Big-endian integer value of a `k256` scalar
pub fn scalar_to_uint(scalar: &Scalar) -> U256 {
    U256::from_be_slice(scalar.to_bytes().as_slice())
}

/// Reduce an integer into a `k256` scalar
pub fn uint_to_scalar(value: &U256) -> Scalar {
    <Scalar as Reduce<U256>>::reduce(*value)
}

/// Lagrange coefficient at zero as a `k256` scalar
pub fn lagrange_scalar(index: u32, indices: &[u32]) -> crate::Result<Scalar> {
    lagrange::coefficient_at_zero(index, indices).map(|l| uint_to_scalar(&l))
}

/// Raw coordinates of a `k256` affine point; the identity maps to `(0, 0)`
pub fn point_from_affine(affine: &AffinePoint) -> Point {
    let encoded = affine.to_encoded_point(false);
    match (encoded.x(), encoded.y()) {
        (Some(x), Some(y)) => Point {
            x: U256::from_be_slice(x.as_slice()),
            y: U256::from_be_slice(y.as_slice()),
        },
        _ => Point::IDENTITY,
    }
}
