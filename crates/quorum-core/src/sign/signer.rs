//! Participant side of a signing session

use super::{aggregate_and_challenge, CommitmentMessage, PartialMessage, SigningPackage};
use crate::arith;
use crate::types::{KeyShare, ParticipantId, PublicPoint, SessionId};
use crate::{Error, Result};
use dashmap::DashMap;
use k256::elliptic_curve::Field;
use k256::{ProjectivePoint, Scalar};
use rand_core::CryptoRngCore;
use std::fmt;
use tracing::{debug, error, instrument};
use zeroize::Zeroize;

/// One-time nonce `k_i` together with its commitment.
///
/// Not `Clone`: [`Signer::sign`] takes it by value, so a nonce cannot be
/// presented twice. The secret is wiped on drop.
pub struct SigningNonce {
    session_id: SessionId,
    secret: Scalar,
    commitment: PublicPoint,
}

impl SigningNonce {
    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub fn commitment(&self) -> &PublicPoint {
        &self.commitment
    }
}

impl fmt::Debug for SigningNonce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningNonce")
            .field("session_id", &hex::encode(self.session_id))
            .field("commitment", &self.commitment)
            .finish_non_exhaustive()
    }
}

impl Drop for SigningNonce {
    fn drop(&mut self) {
        self.secret.zeroize();
    }
}

/// Holds one participant's share and the commitments it has handed out
pub struct Signer {
    share: KeyShare,
    /// Outstanding commitments; an entry is removed when its nonce is spent
    issued: DashMap<PublicPoint, SessionId>,
}

impl Signer {
    pub fn new(share: KeyShare) -> Self {
        Self {
            share,
            issued: DashMap::new(),
        }
    }

    pub fn id(&self) -> &ParticipantId {
        &self.share.participant
    }

    pub fn share(&self) -> &KeyShare {
        &self.share
    }

    /// Number of commitments issued but not yet used
    pub fn outstanding(&self) -> usize {
        self.issued.len()
    }

    /// Round 1: draw a fresh nonce for `session_id` and publish `R_i = k_i * G`
    pub fn commit(
        &self,
        session_id: SessionId,
        rng: &mut impl CryptoRngCore,
    ) -> Result<(SigningNonce, CommitmentMessage)> {
        let secret = Scalar::random(&mut *rng);
        if bool::from(secret.is_zero()) {
            return Err(Error::Internal("RNG produced a zero nonce".into()));
        }
        let commitment = PublicPoint::from_projective(&(ProjectivePoint::GENERATOR * secret))?;

        if self.issued.insert(commitment, session_id).is_some() {
            error!(participant = %self.id(), "Nonce commitment issued twice");
            return Err(Error::SecurityViolation(format!(
                "{} drew a nonce it had already committed to",
                self.id()
            )));
        }

        debug!(participant = %self.id(), session = %hex::encode(session_id), "Issued nonce commitment");
        let message = CommitmentMessage {
            session_id,
            from: self.id().clone(),
            commitment,
        };
        Ok((
            SigningNonce {
                session_id,
                secret,
                commitment,
            },
            message,
        ))
    }

    /// Give up on a nonce that will never be used, e.g. after the session
    /// timed out before its package arrived.
    ///
    /// The commitment stays unusable: the nonce is consumed and wiped.
    pub fn abandon(&self, nonce: SigningNonce) {
        let released = self
            .issued
            .remove_if(&nonce.commitment, |_, session| *session == nonce.session_id)
            .is_some();
        debug!(
            participant = %self.id(),
            session = %hex::encode(nonce.session_id),
            released,
            "Abandoned nonce"
        );
    }

    /// Round 2: `s_i = k_i + e * L_i * y_i`.
    ///
    /// The nonce is consumed whether or not signing succeeds.
    #[instrument(skip_all, fields(participant = %self.id()))]
    pub fn sign(&self, nonce: SigningNonce, package: &SigningPackage) -> Result<PartialMessage> {
        match self.issued.remove(&nonce.commitment) {
            Some((_, session)) if session == nonce.session_id => {}
            _ => {
                error!("Nonce presented for signing twice");
                return Err(Error::SecurityViolation(format!(
                    "{} attempted to reuse a nonce",
                    self.id()
                )));
            }
        }

        if package.session_id != nonce.session_id {
            return Err(Error::MalformedInput("package is for a different session".into()));
        }
        if package.epoch != self.share.epoch {
            return Err(Error::InactiveSigner(self.id().to_string()));
        }
        if package.group_key != self.share.group_key {
            return Err(Error::InvalidConfig("package is for a different group key".into()));
        }
        if package.indices.len() < self.share.threshold {
            return Err(Error::ThresholdNotMet {
                required: self.share.threshold,
                actual: package.indices.len(),
            });
        }
        if package.indices.get(self.id()) != Some(&self.share.index)
            || package.commitments.get(self.id()) != Some(&nonce.commitment)
        {
            error!("Package misstates this signer's index or commitment");
            return Err(Error::SecurityViolation(format!(
                "package does not carry the commitment of {}",
                self.id()
            )));
        }
        if package.commitments.len() != package.indices.len()
            || package.commitments.keys().ne(package.indices.keys())
        {
            return Err(Error::MalformedInput("package signer sets disagree".into()));
        }

        let (aggregate, challenge) =
            aggregate_and_challenge(&package.commitments, &package.group_key, &package.message_hash)?;
        if aggregate != package.aggregate || challenge != package.challenge {
            error!("Package aggregate or challenge does not match its commitments");
            return Err(Error::SecurityViolation(
                "coordinator sent an inconsistent aggregate commitment".into(),
            ));
        }

        let indices: Vec<u32> = package.indices.values().copied().collect();
        let lambda = arith::lagrange_scalar(self.share.index, &indices)?;
        let partial = nonce.secret + challenge * lambda * self.share.secret_share;

        debug!(index = self.share.index, "Produced partial signature");
        Ok(PartialMessage {
            session_id: package.session_id,
            from: self.id().clone(),
            partial,
        })
    }
}
