//! Lagrange interpolation at zero over the scalar field

use super::field::{self, N};
use crate::{Error, Result};
use k256::elliptic_curve::bigint::U256;

/// Lagrange coefficient for `index` interpolating at `x = 0` over `indices`:
///
/// `L_i = Π_{j ≠ i} (0 - x_j) / (x_i - x_j) mod n`
///
/// `indices` must contain `index`, must not contain zero and must not repeat.
pub fn coefficient_at_zero(index: u32, indices: &[u32]) -> Result<U256> {
    if index == 0 || indices.contains(&0) {
        return Err(Error::InvalidConfig("participant index 0 is reserved".into()));
    }
    if !indices.contains(&index) {
        return Err(Error::InvalidConfig(format!(
            "index {index} is not part of the interpolation set"
        )));
    }

    let mut sorted = indices.to_vec();
    sorted.sort_unstable();
    if sorted.windows(2).any(|w| w[0] == w[1]) {
        return Err(Error::InvalidConfig("duplicate index in interpolation set".into()));
    }

    let x_i = U256::from_u64(u64::from(index));
    let mut numerator = U256::ONE;
    let mut denominator = U256::ONE;

    for &j in indices.iter().filter(|&&j| j != index) {
        let x_j = U256::from_u64(u64::from(j));
        numerator = field::mul(&numerator, &field::neg(&x_j, &N), &N);
        denominator = field::mul(&denominator, &field::sub(&x_i, &x_j, &N), &N);
    }

    Ok(field::div(&numerator, &denominator, &N))
}
