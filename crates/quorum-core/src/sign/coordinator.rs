//! Session factory and nonce-commitment registry

use super::session::SigningSession;
use crate::manager::{GroupSnapshot, ParticipantInfo};
use crate::types::{ParticipantId, PublicPoint, SessionId};
use crate::{Error, Result};
use dashmap::DashMap;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::{error, info, instrument};

/// Every nonce commitment seen from every participant, across sessions.
///
/// A commitment showing up twice means the nonce behind it was reused.
#[derive(Debug, Default)]
pub struct CommitmentRegistry {
    seen: DashMap<ParticipantId, HashSet<PublicPoint>>,
}

impl CommitmentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `commitment` for `from`; fails if it was seen before
    pub fn record(&self, from: &ParticipantId, commitment: &PublicPoint) -> Result<()> {
        let mut seen = self.seen.entry(from.clone()).or_default();
        if !seen.insert(*commitment) {
            error!(participant = %from, commitment = %commitment, "Nonce commitment reused");
            return Err(Error::SecurityViolation(format!(
                "{from} reused a nonce commitment"
            )));
        }
        Ok(())
    }

    pub fn contains(&self, from: &ParticipantId, commitment: &PublicPoint) -> bool {
        self.seen
            .get(from)
            .map(|seen| seen.contains(commitment))
            .unwrap_or(false)
    }
}

/// Opens signing sessions against a group snapshot.
///
/// Sessions for different messages are independent and can run in
/// parallel; they share only the commitment registry.
#[derive(Debug, Default, Clone)]
pub struct Coordinator {
    registry: Arc<CommitmentRegistry>,
}

impl Coordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn registry(&self) -> &CommitmentRegistry {
        &self.registry
    }

    /// Start a session for `signers` over `message_hash`.
    ///
    /// Fewer than `threshold` signers is rejected here, before any nonce is
    /// drawn.
    #[instrument(skip(self, group, message_hash), fields(epoch = %group.epoch, n_signers = signers.len()))]
    pub fn open_session(
        &self,
        group: &GroupSnapshot,
        signers: &[ParticipantId],
        message_hash: [u8; 32],
    ) -> Result<SigningSession> {
        if signers.len() < group.threshold {
            return Err(Error::ThresholdNotMet {
                required: group.threshold,
                actual: signers.len(),
            });
        }

        let mut chosen: BTreeMap<ParticipantId, ParticipantInfo> = BTreeMap::new();
        for id in signers {
            let info = group
                .participant(id)
                .ok_or_else(|| Error::InactiveSigner(id.to_string()))?;
            if chosen.insert(id.clone(), info.clone()).is_some() {
                return Err(Error::InvalidConfig(format!("{id} listed twice as signer")));
            }
        }

        let session_id: SessionId = rand::random();
        info!(
            session = %hex::encode(session_id),
            threshold = group.threshold,
            signers = ?signers,
            "Opening signing session"
        );
        Ok(SigningSession::new(
            session_id,
            message_hash,
            group,
            chosen,
            Arc::clone(&self.registry),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::GroupConfig;
    use crate::KeyManager;
    use k256::ProjectivePoint;

    #[test]
    fn test_registry_flags_repeats_per_participant() {
        let registry = CommitmentRegistry::new();
        let point = PublicPoint::from_projective(&ProjectivePoint::GENERATOR).unwrap();
        let alice = ParticipantId::from("alice");

        registry.record(&alice, &point).unwrap();
        assert!(registry.contains(&alice, &point));
        assert!(matches!(registry.record(&alice, &point), Err(Error::SecurityViolation(_))));

        // Another participant has its own history.
        registry.record(&"bob".into(), &point).unwrap();
    }

    #[tokio::test]
    async fn test_open_session_checks() {
        let config = GroupConfig::new(2, vec!["a".into(), "b".into(), "c".into()]).unwrap();
        let manager = KeyManager::generate(config).unwrap();
        let snapshot = manager.snapshot().await;
        let coordinator = Coordinator::new();

        let session = coordinator
            .open_session(&snapshot, &[ParticipantId::from("c"), ParticipantId::from("a")], [0u8; 32])
            .unwrap();
        assert_eq!(session.signer_count(), 2);
        assert_eq!(session.epoch(), snapshot.epoch);
        assert_eq!(session.missing_commitments().len(), 2);

        assert!(matches!(
            coordinator.open_session(&snapshot, &[ParticipantId::from("a")], [0u8; 32]),
            Err(Error::ThresholdNotMet { required: 2, actual: 1 })
        ));
    }
}
