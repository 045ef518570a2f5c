//! Proactive resharing
//!
//! A quorum of current holders re-deals the group secret to a new participant
//! set and threshold without ever reconstructing it. Holder `i` deals a fresh
//! polynomial `g_i` with `g_i(0) = L_i * y_i`; the new share of participant
//! `j` is `Σ_i g_i(j)`. Since `Σ_i L_i * y_i` is the group secret, the group
//! key is unchanged while every share value is re-randomized.

use super::dealer::{issue_share, DealerOutput};
use super::polynomial::Polynomial;
use crate::arith;
use crate::types::{GroupConfig, KeyEpoch, KeyShare, PublicPoint};
use crate::{Error, Result};
use k256::{ProjectivePoint, Scalar};
use rand_core::CryptoRngCore;
use std::collections::BTreeMap;
use tracing::{debug, error, info, instrument};

/// Re-deal the secret held by `old_shares` to `new_config`.
///
/// `old_shares` must come from one epoch of one group and number at least
/// that epoch's threshold. The returned shares belong to `epoch`.
#[instrument(skip_all, fields(holders = old_shares.len(), new_threshold = new_config.threshold, %epoch))]
pub fn reshare(
    old_shares: &[&KeyShare],
    new_config: &GroupConfig,
    epoch: KeyEpoch,
    rng: &mut impl CryptoRngCore,
) -> Result<DealerOutput> {
    new_config.validate()?;

    let first = old_shares.first().ok_or(Error::ThresholdNotMet {
        required: 1,
        actual: 0,
    })?;
    let group_key = first.group_key;
    let old_epoch = first.epoch;
    if old_shares.len() < first.threshold {
        return Err(Error::ThresholdNotMet {
            required: first.threshold,
            actual: old_shares.len(),
        });
    }
    if epoch <= old_epoch {
        return Err(Error::InvalidConfig(format!(
            "new epoch {epoch} must follow {old_epoch}"
        )));
    }
    for share in old_shares {
        if share.group_key != group_key || share.epoch != old_epoch {
            return Err(Error::InvalidConfig(format!(
                "share of {} belongs to a different group or epoch",
                share.participant
            )));
        }
    }

    info!(
        from_epoch = %old_epoch,
        to_epoch = %epoch,
        holders = old_shares.len(),
        n_participants = new_config.participants.len(),
        threshold = new_config.threshold,
        "Starting resharing"
    );

    let holder_indices: Vec<u32> = old_shares.iter().map(|s| s.index).collect();
    let new_indices = new_config
        .participants
        .iter()
        .map(|id| {
            new_config
                .index_of(id)
                .ok_or_else(|| Error::Internal(format!("no index for {id}")))
        })
        .collect::<Result<Vec<u32>>>()?;

    let mut sums = vec![Scalar::ZERO; new_indices.len()];
    let mut commitments = vec![ProjectivePoint::IDENTITY; new_config.threshold];

    for holder in old_shares {
        let lambda = arith::lagrange_scalar(holder.index, &holder_indices)?;
        let weighted = holder.secret_share * lambda;

        // The holder's constant commitment must equal L_i * Y_i, otherwise it
        // is not dealing its real share.
        let expected = holder.public_share_point()? * lambda;
        if ProjectivePoint::GENERATOR * weighted != expected {
            error!(participant = %holder.participant, "Holder share does not match its public share");
            return Err(Error::SecurityViolation(format!(
                "share of {} is inconsistent with its public share",
                holder.participant
            )));
        }

        let polynomial = Polynomial::with_constant(rng, new_config.threshold, &weighted)?;
        for (acc, commitment) in commitments.iter_mut().zip(polynomial.commitments()?) {
            *acc += commitment.to_projective()?;
        }
        for (sum, &index) in sums.iter_mut().zip(&new_indices) {
            *sum += polynomial.evaluate(index);
        }
        debug!(participant = %holder.participant, index = holder.index, "Dealt sub-shares");
    }

    let commitments = commitments
        .iter()
        .map(PublicPoint::from_projective)
        .collect::<Result<Vec<_>>>()?;
    if commitments[0] != group_key {
        error!(expected = %group_key, found = %commitments[0], "Resharing changed the group key");
        return Err(Error::SecurityViolation(
            "resharing did not preserve the group key".into(),
        ));
    }

    let mut shares = BTreeMap::new();
    for ((participant, &index), secret) in new_config.participants.iter().zip(&new_indices).zip(sums) {
        let share = issue_share(
            participant.clone(),
            index,
            new_config.threshold,
            epoch,
            secret,
            group_key,
        )?;
        shares.insert(participant.clone(), share);
    }

    info!(group_key = %group_key, %epoch, "Resharing completed");

    Ok(DealerOutput {
        group_key,
        commitments,
        shares,
    })
}
