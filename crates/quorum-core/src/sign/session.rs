//! Coordinator-side state machine for one signing session

use super::coordinator::CommitmentRegistry;
use super::{aggregate_and_challenge, CommitmentMessage, PartialMessage, SignRequest, SigningPackage};
use crate::arith;
use crate::manager::{GroupSnapshot, ParticipantInfo};
use crate::types::{GroupPublicKey, KeyEpoch, ParticipantId, PublicPoint, SessionId, Signature};
use crate::{Error, Result};
use k256::{ProjectivePoint, Scalar};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Signing session states. `Done` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    CollectNonces,
    AggregateCommitment,
    ComputeChallenge,
    CollectPartials,
    AggregateSignature,
    Done,
    Failed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::CollectNonces => "COLLECT_NONCES",
            SessionState::AggregateCommitment => "AGGREGATE_COMMITMENT",
            SessionState::ComputeChallenge => "COMPUTE_CHALLENGE",
            SessionState::CollectPartials => "COLLECT_PARTIALS",
            SessionState::AggregateSignature => "AGGREGATE_SIGNATURE",
            SessionState::Done => "DONE",
            SessionState::Failed => "FAILED",
        };
        f.write_str(name)
    }
}

/// One signing session over a fixed signer subset.
///
/// Created by [`Coordinator::open_session`](super::Coordinator::open_session),
/// which has already checked the subset size and membership.
pub struct SigningSession {
    id: SessionId,
    message_hash: [u8; 32],
    group_key: GroupPublicKey,
    epoch: KeyEpoch,
    signers: BTreeMap<ParticipantId, ParticipantInfo>,
    commitments: BTreeMap<ParticipantId, PublicPoint>,
    package: Option<SigningPackage>,
    partials: BTreeMap<ParticipantId, Scalar>,
    state: SessionState,
    failure: Option<String>,
    registry: Arc<CommitmentRegistry>,
}

impl SigningSession {
    pub(crate) fn new(
        id: SessionId,
        message_hash: [u8; 32],
        group: &GroupSnapshot,
        signers: BTreeMap<ParticipantId, ParticipantInfo>,
        registry: Arc<CommitmentRegistry>,
    ) -> Self {
        Self {
            id,
            message_hash,
            group_key: group.group_key,
            epoch: group.epoch,
            signers,
            commitments: BTreeMap::new(),
            package: None,
            partials: BTreeMap::new(),
            state: SessionState::CollectNonces,
            failure: None,
            registry,
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn epoch(&self) -> KeyEpoch {
        self.epoch
    }

    pub fn message_hash(&self) -> &[u8; 32] {
        &self.message_hash
    }

    /// Reason the session failed, if it did
    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    pub fn signers(&self) -> impl Iterator<Item = &ParticipantId> {
        self.signers.keys()
    }

    pub fn signer_count(&self) -> usize {
        self.signers.len()
    }

    /// Announcement handed to the chosen signers
    pub fn request(&self) -> SignRequest {
        SignRequest {
            session_id: self.id,
            message_hash: self.message_hash,
            epoch: self.epoch,
            signers: self.signers.keys().cloned().collect(),
        }
    }

    /// Signers whose commitment has not arrived yet
    pub fn missing_commitments(&self) -> Vec<ParticipantId> {
        self.signers
            .keys()
            .filter(|id| !self.commitments.contains_key(*id))
            .cloned()
            .collect()
    }

    /// Move to `FAILED`. Later calls keep the first reason.
    pub fn fail(&mut self, reason: impl Into<String>) {
        if self.state == SessionState::Failed {
            return;
        }
        let reason = reason.into();
        warn!(session = %hex::encode(self.id), from = %self.state, %reason, "Signing session failed");
        self.state = SessionState::Failed;
        self.failure = Some(reason);
    }

    fn expect_state(&self, expected: SessionState) -> Result<()> {
        if self.state == SessionState::Failed {
            return Err(Error::SessionFailed(
                self.failure.clone().unwrap_or_else(|| "unknown".into()),
            ));
        }
        if self.state != expected {
            return Err(Error::SessionState {
                expected: expected.to_string(),
                found: self.state.to_string(),
            });
        }
        Ok(())
    }

    /// Fail the session on errors that make it unrecoverable
    fn check<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            if e.is_security_violation() || matches!(e, Error::InactiveSigner(_)) {
                error!(session = %hex::encode(self.id), error = %e, "Aborting signing session");
                self.fail(e.to_string());
            }
        }
        result
    }

    fn signer(&self, id: &ParticipantId) -> Result<&ParticipantInfo> {
        self.signers
            .get(id)
            .ok_or_else(|| Error::UnknownParticipant(format!("{id} is not a signer in this session")))
    }

    /// Round 1 input: record `R_i` from one signer
    pub fn add_commitment(&mut self, message: CommitmentMessage) -> Result<()> {
        self.expect_state(SessionState::CollectNonces)?;
        if message.session_id != self.id {
            return Err(Error::MalformedInput("commitment for a different session".into()));
        }
        self.signer(&message.from)?;
        message.commitment.to_projective()?;

        if let Some(existing) = self.commitments.get(&message.from) {
            let result = if *existing == message.commitment {
                Err(Error::MalformedInput(format!("duplicate commitment from {}", message.from)))
            } else {
                Err(Error::SecurityViolation(format!(
                    "{} sent two different commitments",
                    message.from
                )))
            };
            return self.check(result);
        }

        let recorded = self.registry.record(&message.from, &message.commitment);
        self.check(recorded)?;

        debug!(from = %message.from, "Received nonce commitment");
        self.commitments.insert(message.from, message.commitment);
        if self.commitments.len() == self.signers.len() {
            self.state = SessionState::AggregateCommitment;
        }
        Ok(())
    }

    /// `R = Σ R_i` and the challenge; produces the package every signer needs
    pub fn aggregate(&mut self) -> Result<SigningPackage> {
        self.expect_state(SessionState::AggregateCommitment)?;
        self.state = SessionState::ComputeChallenge;
        let (aggregate, challenge) =
            match aggregate_and_challenge(&self.commitments, &self.group_key, &self.message_hash) {
                Ok(computed) => computed,
                Err(e) => {
                    if e.is_security_violation() {
                        error!(session = %hex::encode(self.id), error = %e, "Aborting signing session");
                    }
                    self.fail(e.to_string());
                    return Err(e);
                }
            };

        let package = SigningPackage {
            session_id: self.id,
            message_hash: self.message_hash,
            group_key: self.group_key,
            epoch: self.epoch,
            indices: self
                .signers
                .iter()
                .map(|(id, info)| (id.clone(), info.index))
                .collect(),
            commitments: self.commitments.clone(),
            aggregate,
            challenge,
        };
        self.package = Some(package.clone());
        self.state = SessionState::CollectPartials;
        Ok(package)
    }

    /// Round 2 input: check `s_i * G == R_i + (e * L_i) * Y_i` and record it
    pub fn add_partial(&mut self, message: PartialMessage) -> Result<()> {
        self.expect_state(SessionState::CollectPartials)?;
        if message.session_id != self.id {
            return Err(Error::MalformedInput("partial for a different session".into()));
        }
        if self.partials.contains_key(&message.from) {
            return Err(Error::MalformedInput(format!("duplicate partial from {}", message.from)));
        }
        let result = self.check_partial(&message);
        self.check(result)?;

        debug!(from = %message.from, "Accepted partial signature");
        self.partials.insert(message.from, message.partial);
        if self.partials.len() == self.signers.len() {
            self.state = SessionState::AggregateSignature;
        }
        Ok(())
    }

    fn check_partial(&self, message: &PartialMessage) -> Result<()> {
        let package = self
            .package
            .as_ref()
            .ok_or_else(|| Error::Internal("no package in COLLECT_PARTIALS".into()))?;
        let info = self.signer(&message.from)?;
        let commitment = self
            .commitments
            .get(&message.from)
            .ok_or_else(|| Error::Internal(format!("no commitment from {}", message.from)))?;

        let indices: Vec<u32> = self.signers.values().map(|s| s.index).collect();
        let lambda = arith::lagrange_scalar(info.index, &indices)?;

        let lhs = ProjectivePoint::GENERATOR * message.partial;
        let rhs = commitment.to_projective()?
            + info.public_share.to_projective()? * (package.challenge * lambda);
        if lhs != rhs {
            return Err(Error::InvalidPartial(message.from.to_string()));
        }
        Ok(())
    }

    /// `s = Σ s_i`, after confirming the group has not moved on.
    ///
    /// `group` is the key manager's current view; if the epoch changed or a
    /// signer was evicted since the session opened, the session fails.
    pub fn finalize(&mut self, group: &GroupSnapshot) -> Result<Signature> {
        self.expect_state(SessionState::AggregateSignature)?;

        if group.epoch != self.epoch || group.group_key != self.group_key {
            let result = Err(Error::InactiveSigner(format!(
                "session epoch {} superseded by {}",
                self.epoch, group.epoch
            )));
            return self.check(result);
        }
        if let Some(evicted) = self.signers.keys().find(|id| !group.is_active(id)) {
            let result = Err(Error::InactiveSigner(evicted.to_string()));
            return self.check(result);
        }

        let package = self
            .package
            .as_ref()
            .ok_or_else(|| Error::Internal("no package in AGGREGATE_SIGNATURE".into()))?;
        let s = self.partials.values().fold(Scalar::ZERO, |acc, s_i| acc + s_i);
        let signature = Signature::new(&package.aggregate, &s);

        self.state = SessionState::Done;
        info!(
            session = %hex::encode(self.id),
            signers = self.signers.len(),
            "Signing session completed"
        );
        Ok(signature)
    }
}

impl fmt::Debug for SigningSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningSession")
            .field("id", &hex::encode(self.id))
            .field("epoch", &self.epoch)
            .field("state", &self.state)
            .field("signers", &self.signers.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}
