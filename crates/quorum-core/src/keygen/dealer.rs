//! Trusted-dealer key generation with Feldman commitments

use super::polynomial::{evaluate_commitments, Polynomial};
use crate::arith;
use crate::types::{GroupConfig, GroupPublicKey, KeyEpoch, KeyShare, ParticipantId, PublicPoint};
use crate::{Error, Result};
use k256::{ProjectivePoint, Scalar};
use rand::rngs::OsRng;
use rand_core::CryptoRngCore;
use std::collections::BTreeMap;
use tracing::{debug, error, info, instrument};

/// Everything the dealer hands out: the group key, the public coefficient
/// commitments and one share per participant.
#[derive(Debug, Clone)]
pub struct DealerOutput {
    pub group_key: GroupPublicKey,
    /// `C_k = a_k * G` for every coefficient, `C_0` is the group key
    pub commitments: Vec<PublicPoint>,
    pub shares: BTreeMap<ParticipantId, KeyShare>,
}

impl DealerOutput {
    pub fn share(&self, participant: &ParticipantId) -> Option<&KeyShare> {
        self.shares.get(participant)
    }
}

/// Run key generation with the operating system RNG
pub fn run_dkg(config: &GroupConfig) -> Result<DealerOutput> {
    deal(config, KeyEpoch::GENESIS, &mut OsRng)
}

/// Split a fresh random secret into `config.participants.len()` shares with
/// reconstruction threshold `config.threshold`.
///
/// The secret itself only exists as the constant term of the polynomial and
/// is wiped when this function returns.
#[instrument(skip(config, rng), fields(threshold = config.threshold, n = config.participants.len()))]
pub fn deal(config: &GroupConfig, epoch: KeyEpoch, rng: &mut impl CryptoRngCore) -> Result<DealerOutput> {
    config.validate()?;

    info!(
        threshold = config.threshold,
        n_participants = config.participants.len(),
        %epoch,
        "Starting key generation"
    );

    let polynomial = Polynomial::random(rng, config.threshold)?;
    let commitments = polynomial.commitments()?;
    let group_key = commitments[0];

    let mut shares = BTreeMap::new();
    for participant in &config.participants {
        let index = config
            .index_of(participant)
            .ok_or_else(|| Error::Internal(format!("no index for {participant}")))?;
        let share = issue_share(
            participant.clone(),
            index,
            config.threshold,
            epoch,
            polynomial.evaluate(index),
            group_key,
        )?;
        debug!(participant = %participant, index, "Issued share");
        shares.insert(participant.clone(), share);
    }

    info!(group_key = %group_key, "Key generation completed");

    Ok(DealerOutput {
        group_key,
        commitments,
        shares,
    })
}

pub(crate) fn issue_share(
    participant: ParticipantId,
    index: u32,
    threshold: usize,
    epoch: KeyEpoch,
    secret_share: Scalar,
    group_key: GroupPublicKey,
) -> Result<KeyShare> {
    let public_share = PublicPoint::from_projective(&(ProjectivePoint::GENERATOR * secret_share))?;
    Ok(KeyShare {
        participant,
        index,
        threshold,
        epoch,
        secret_share,
        public_share,
        group_key,
    })
}

/// Check a received share against the dealer's published commitments:
/// `y_i * G == Σ C_k * i^k` and `C_0 == P`.
pub fn verify_share(share: &KeyShare, commitments: &[PublicPoint]) -> Result<()> {
    let constant = commitments
        .first()
        .ok_or_else(|| Error::MalformedInput("empty commitment vector".into()))?;
    if commitments.len() != share.threshold {
        return Err(Error::MalformedInput(format!(
            "expected {} commitments, got {}",
            share.threshold,
            commitments.len()
        )));
    }
    if *constant != share.group_key {
        error!(participant = %share.participant, "Commitments do not match the group key");
        return Err(Error::SecurityViolation(format!(
            "commitments for {} do not commit to the group key",
            share.participant
        )));
    }

    let expected = evaluate_commitments(commitments, share.index)?;
    let actual = ProjectivePoint::GENERATOR * share.secret_share;
    if expected != actual || !share.is_consistent() {
        error!(participant = %share.participant, index = share.index, "Share does not match commitments");
        return Err(Error::SecurityViolation(format!(
            "share of {} does not match the dealer commitments",
            share.participant
        )));
    }
    Ok(())
}

/// Interpolate the group secret from at least `threshold` shares.
///
/// Recovery drills and tests only; signing never reconstructs the secret.
pub fn reconstruct_secret(shares: &[&KeyShare]) -> Result<Scalar> {
    let first = shares
        .first()
        .ok_or(Error::ThresholdNotMet {
            required: 1,
            actual: 0,
        })?;
    if shares.len() < first.threshold {
        return Err(Error::ThresholdNotMet {
            required: first.threshold,
            actual: shares.len(),
        });
    }

    let indices: Vec<u32> = shares.iter().map(|s| s.index).collect();
    let mut secret = Scalar::ZERO;
    for share in shares {
        secret += share.secret_share * arith::lagrange_scalar(share.index, &indices)?;
    }
    Ok(secret)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    fn config(t: usize, n: usize) -> GroupConfig {
        GroupConfig::new(t, (1..=n).map(|i| ParticipantId::new(format!("p{i}"))).collect()).unwrap()
    }

    #[test]
    fn test_deal_issues_consistent_shares() {
        let cfg = config(3, 5);
        let output = run_dkg(&cfg).unwrap();
        assert_eq!(output.shares.len(), 5);
        assert_eq!(output.commitments.len(), 3);

        for (id, share) in &output.shares {
            assert_eq!(Some(share.index), cfg.index_of(id));
            assert_eq!(share.group_key, output.group_key);
            assert_eq!(share.epoch, KeyEpoch::GENESIS);
            verify_share(share, &output.commitments).unwrap();
        }
    }

    #[test]
    fn test_any_threshold_subset_reconstructs() {
        let mut rng = ChaCha20Rng::seed_from_u64(7);
        let output = deal(&config(3, 5), KeyEpoch::GENESIS, &mut rng).unwrap();
        let shares: Vec<&KeyShare> = output.shares.values().collect();
        let expected = output.group_key.to_projective().unwrap();

        for subset in [[0, 1, 2], [0, 2, 4], [1, 3, 4], [2, 3, 4]] {
            let picked: Vec<&KeyShare> = subset.iter().map(|&i| shares[i]).collect();
            let secret = reconstruct_secret(&picked).unwrap();
            assert_eq!(ProjectivePoint::GENERATOR * secret, expected);
        }
    }

    #[test]
    fn test_reconstruct_below_threshold_fails() {
        let output = run_dkg(&config(3, 5)).unwrap();
        let shares: Vec<&KeyShare> = output.shares.values().take(2).collect();
        assert!(matches!(
            reconstruct_secret(&shares),
            Err(Error::ThresholdNotMet { required: 3, actual: 2 })
        ));
    }

    #[test]
    fn test_tampered_share_detected() {
        let output = run_dkg(&config(2, 3)).unwrap();
        let mut share = output.shares.values().next().unwrap().clone();
        share.secret_share += Scalar::ONE;
        assert!(matches!(
            verify_share(&share, &output.commitments),
            Err(Error::SecurityViolation(_))
        ));
    }

    #[test]
    fn test_foreign_commitments_detected() {
        let a = run_dkg(&config(2, 3)).unwrap();
        let b = run_dkg(&config(2, 3)).unwrap();
        let share = a.shares.values().next().unwrap();
        assert!(verify_share(share, &b.commitments).is_err());
    }

    #[test]
    fn test_deterministic_with_seed() {
        let cfg = config(2, 3);
        let a = deal(&cfg, KeyEpoch::GENESIS, &mut ChaCha20Rng::seed_from_u64(1)).unwrap();
        let b = deal(&cfg, KeyEpoch::GENESIS, &mut ChaCha20Rng::seed_from_u64(1)).unwrap();
        assert_eq!(a.group_key, b.group_key);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let bad = GroupConfig {
            threshold: 1,
            participants: (1..=5).map(|i| ParticipantId::new(format!("p{i}"))).collect(),
        };
        assert!(matches!(run_dkg(&bad), Err(Error::SecurityViolation(_))));
    }
}
