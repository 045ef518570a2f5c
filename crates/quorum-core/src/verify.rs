//! Stateless, metered Schnorr verification
//!
//! Checks `s·G == R + e·P` with `e = H(R_x, R_y, P_x, P_y, m)` using only the
//! arithmetic kernel. Nothing here depends on signing-session state, so any
//! party can verify a signature after the fact.

use crate::arith::{self, Point, N};
use crate::encoding;
use crate::metering::{ComputeBudget, Op};
use crate::types::SIGNATURE_LEN;
use crate::{Error, Result};
use k256::elliptic_curve::bigint::U256;
use subtle::ConstantTimeEq;
use tracing::debug;

/// Largest number of signatures accepted by [`verify_batch`]
pub const MAX_BATCH_SIZE: usize = 64;

/// Verify `signature` (96 bytes) over `message_hash` (32 bytes) against
/// `public_key` (64 bytes).
///
/// Never panics: malformed input of any kind returns `false`.
pub fn verify(message_hash: &[u8], signature: &[u8], public_key: &[u8]) -> bool {
    match check(message_hash, signature, public_key) {
        Ok(valid) => valid,
        Err(e) => {
            debug!(error = %e, "Rejecting verification input");
            false
        }
    }
}

/// Like [`verify`], but malformed input is reported as an error so callers
/// can tell a client bug from a forged signature (`Ok(false)`).
pub fn check(message_hash: &[u8], signature: &[u8], public_key: &[u8]) -> Result<bool> {
    verify_metered(message_hash, signature, public_key, &mut ComputeBudget::default())
}

/// Verify under a caller-provided compute budget.
///
/// Every well-formed input costs exactly
/// [`verification_cost`](crate::metering::verification_cost) units.
pub fn verify_metered(
    message_hash: &[u8],
    signature: &[u8],
    public_key: &[u8],
    budget: &mut ComputeBudget,
) -> Result<bool> {
    let message_hash: &[u8; 32] = message_hash.try_into().map_err(|_| {
        Error::MalformedInput(format!(
            "expected 32-byte message hash, got {} bytes",
            message_hash.len()
        ))
    })?;
    if signature.len() != SIGNATURE_LEN {
        return Err(Error::MalformedInput(format!(
            "expected {SIGNATURE_LEN}-byte signature, got {} bytes",
            signature.len()
        )));
    }
    let public_key: &[u8; 64] = public_key.try_into().map_err(|_| {
        Error::MalformedInput(format!(
            "expected 64-byte public key, got {} bytes",
            public_key.len()
        ))
    })?;

    budget.charge(Op::RangeCheck, 5)?;
    budget.charge(Op::CurveCheck, 2)?;
    let r = decode_point(&signature[..64], "R")?;
    let s = U256::from_be_slice(&signature[64..]);
    if s >= N {
        return Err(Error::MalformedInput("s is not below the group order".into()));
    }
    let p = decode_point(public_key, "public key")?;

    budget.charge(Op::HashWord, 5)?;
    budget.charge(Op::RangeCheck, 1)?;
    let e = encoding::challenge(&r, &p, message_hash);

    budget.charge_scalar_mul()?;
    let lhs = arith::mul_generator(&s);

    budget.charge_scalar_mul()?;
    budget.charge(Op::PointAdd, 1)?;
    let rhs = arith::point::add(&r, &arith::scalar_mul(&e, &p));

    Ok(bool::from(lhs.ct_eq(&rhs)))
}

fn decode_point(bytes: &[u8], what: &str) -> Result<Point> {
    let array: &[u8; 64] = bytes
        .try_into()
        .map_err(|_| Error::MalformedInput(format!("{what} must be 64 bytes")))?;
    Point::from_uncompressed(array).map_err(|e| Error::MalformedInput(format!("{what}: {e}")))
}

/// One entry of a batch verification
#[derive(Debug, Clone, Copy)]
pub struct BatchItem<'a> {
    pub message_hash: &'a [u8],
    pub signature: &'a [u8],
    pub public_key: &'a [u8],
}

/// Verify up to [`MAX_BATCH_SIZE`] independent signatures.
///
/// Each item is checked on its own; the result vector lines up with `items`.
pub fn verify_batch(items: &[BatchItem<'_>]) -> Result<Vec<bool>> {
    if items.len() > MAX_BATCH_SIZE {
        return Err(Error::MalformedInput(format!(
            "batch of {} exceeds the limit of {MAX_BATCH_SIZE}",
            items.len()
        )));
    }

    let verify_item = |item: &BatchItem<'_>| verify(item.message_hash, item.signature, item.public_key);

    #[cfg(feature = "multi-thread")]
    {
        use rayon::prelude::*;
        Ok(items.par_iter().map(verify_item).collect())
    }

    #[cfg(not(feature = "multi-thread"))]
    {
        Ok(items.iter().map(verify_item).collect())
    }
}
