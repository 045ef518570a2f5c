//! Secret polynomials over the scalar field

use crate::types::PublicPoint;
use crate::{Error, Result};
use k256::elliptic_curve::Field;
use k256::{ProjectivePoint, Scalar};
use rand_core::CryptoRngCore;
use zeroize::Zeroize;

/// Polynomial `f(x) = a_0 + a_1 x + ... + a_{t-1} x^{t-1}` with secret
/// coefficients. Coefficients are wiped when the polynomial is dropped.
pub struct Polynomial {
    coefficients: Vec<Scalar>,
}

impl Polynomial {
    /// Random polynomial with `size` coefficients (degree `size - 1`).
    pub fn random(rng: &mut impl CryptoRngCore, size: usize) -> Result<Self> {
        if size == 0 {
            return Err(Error::InvalidConfig("polynomial needs at least one coefficient".into()));
        }
        let coefficients = (0..size).map(|_| Scalar::random(&mut *rng)).collect();
        Ok(Self { coefficients })
    }

    /// Random polynomial of `size` coefficients whose constant term is `constant`.
    pub fn with_constant(rng: &mut impl CryptoRngCore, size: usize, constant: &Scalar) -> Result<Self> {
        if size == 0 {
            return Err(Error::InvalidConfig("polynomial needs at least one coefficient".into()));
        }
        let mut coefficients = Vec::with_capacity(size);
        coefficients.push(*constant);
        for _ in 1..size {
            coefficients.push(Scalar::random(&mut *rng));
        }
        Ok(Self { coefficients })
    }

    /// Number of coefficients, i.e. the reconstruction threshold
    pub fn size(&self) -> usize {
        self.coefficients.len()
    }

    /// `f(0)`
    pub fn constant(&self) -> &Scalar {
        &self.coefficients[0]
    }

    /// Evaluate at a participant index with Horner's rule.
    pub fn evaluate(&self, x: u32) -> Scalar {
        let x = Scalar::from(u64::from(x));
        self.coefficients
            .iter()
            .rev()
            .fold(Scalar::ZERO, |acc, coef| acc * x + coef)
    }

    /// Feldman commitments `C_k = a_k * G`
    pub fn commitments(&self) -> Result<Vec<PublicPoint>> {
        self.coefficients
            .iter()
            .map(|coef| PublicPoint::from_projective(&(ProjectivePoint::GENERATOR * coef)))
            .collect()
    }
}

impl Drop for Polynomial {
    fn drop(&mut self) {
        self.coefficients.zeroize();
    }
}

/// `Σ C_k * x^k`, the public image of `f(x)`
pub fn evaluate_commitments(commitments: &[PublicPoint], x: u32) -> Result<ProjectivePoint> {
    let x = Scalar::from(u64::from(x));
    let mut acc = ProjectivePoint::IDENTITY;
    for commitment in commitments.iter().rev() {
        acc = acc * x + commitment.to_projective()?;
    }
    Ok(acc)
}
