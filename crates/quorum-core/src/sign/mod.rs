//! Two-round threshold Schnorr signing
//!
//! Round 1: every chosen signer publishes a nonce commitment `R_i`.
//! Round 2: the coordinator fixes `R = Σ R_i` and `e`, each signer answers
//! with `s_i = k_i + e * L_i * y_i`, and the coordinator checks every partial
//! before summing them into `(R, s)`.

mod coordinator;
mod messages;
mod protocol;
mod session;
mod signer;

pub use coordinator::{CommitmentRegistry, Coordinator};
pub use messages::*;
pub use protocol::{run_coordinator, run_signer, run_signing, COORDINATOR_ID, DEFAULT_ROUND_TIMEOUT};
pub use session::{SessionState, SigningSession};
pub use signer::{Signer, SigningNonce};

use crate::arith;
use crate::encoding;
use crate::types::{GroupPublicKey, ParticipantId, PublicPoint};
use crate::{Error, Result};
use k256::{ProjectivePoint, Scalar};
use std::collections::BTreeMap;
use tracing::error;

/// Aggregate commitment `R = Σ R_i` and challenge
/// `e = H(R_x || R_y || P_x || P_y || m) mod n`.
pub(crate) fn aggregate_and_challenge(
    commitments: &BTreeMap<ParticipantId, PublicPoint>,
    group_key: &GroupPublicKey,
    message_hash: &[u8; 32],
) -> Result<(PublicPoint, Scalar)> {
    let mut sum = ProjectivePoint::IDENTITY;
    for commitment in commitments.values() {
        sum += commitment.to_projective()?;
    }
    if sum == ProjectivePoint::IDENTITY {
        error!("Nonce commitments cancel to the identity");
        return Err(Error::SecurityViolation(
            "aggregate nonce commitment is the identity".into(),
        ));
    }

    let aggregate = PublicPoint::from_projective(&sum)?;
    let e = encoding::challenge(&aggregate.to_kernel()?, &group_key.to_kernel()?, message_hash);
    Ok((aggregate, arith::uint_to_scalar(&e)))
}
