//! Key manager: the single writer for one group's shares
//!
//! Every membership or threshold change runs under the write lock:
//! validate, reshare, then commit. Readers (signing sessions) take
//! snapshots and never see a half-applied change.

use crate::keygen::{self, DealerOutput};
use crate::lifecycle::{Change, Lifecycle};
use crate::types::{GroupConfig, GroupPublicKey, KeyEpoch, KeyShare, ParticipantId, PublicPoint};
use crate::{Error, Result};
use rand::rngs::OsRng;
use rand_core::CryptoRngCore;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tokio::sync::RwLock;
use tracing::{info, instrument};

/// Everything the manager holds, in a form that can be persisted
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupState {
    pub lifecycle: Lifecycle,
    pub group_key: GroupPublicKey,
    /// Feldman commitments of the current epoch
    pub commitments: Vec<PublicPoint>,
    pub shares: BTreeMap<ParticipantId, KeyShare>,
}

impl GroupState {
    fn from_output(lifecycle: Lifecycle, output: DealerOutput) -> Self {
        Self {
            lifecycle,
            group_key: output.group_key,
            commitments: output.commitments,
            shares: output.shares,
        }
    }

    /// Check that shares, commitments and membership agree
    pub fn validate(&self) -> Result<()> {
        let config = self.lifecycle.config();
        config.validate()?;

        if self.shares.len() != config.participants.len() {
            return Err(Error::InvalidConfig(format!(
                "{} shares for {} participants",
                self.shares.len(),
                config.participants.len()
            )));
        }
        for id in &config.participants {
            let share = self
                .shares
                .get(id)
                .ok_or_else(|| Error::UnknownParticipant(id.to_string()))?;
            if Some(share.index) != config.index_of(id)
                || share.epoch != self.lifecycle.epoch()
                || share.threshold != config.threshold
                || share.group_key != self.group_key
            {
                return Err(Error::InvalidConfig(format!(
                    "share of {id} does not belong to epoch {}",
                    self.lifecycle.epoch()
                )));
            }
            keygen::verify_share(share, &self.commitments)?;
        }
        Ok(())
    }
}

/// Public view of one participant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantInfo {
    pub id: ParticipantId,
    pub index: u32,
    pub public_share: PublicPoint,
}

/// Read-only view of the group at one epoch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupSnapshot {
    pub epoch: KeyEpoch,
    pub threshold: usize,
    pub group_key: GroupPublicKey,
    pub participants: Vec<ParticipantInfo>,
}

impl GroupSnapshot {
    pub fn participant(&self, id: &ParticipantId) -> Option<&ParticipantInfo> {
        self.participants.iter().find(|p| &p.id == id)
    }

    pub fn is_active(&self, id: &ParticipantId) -> bool {
        self.participant(id).is_some()
    }
}

/// Owns the shares of one group and serializes every mutation
pub struct KeyManager {
    state: RwLock<GroupState>,
}

impl KeyManager {
    /// Deal a fresh group key for `config`
    pub fn generate(config: GroupConfig) -> Result<Self> {
        Self::generate_with_rng(config, &mut OsRng)
    }

    pub fn generate_with_rng(config: GroupConfig, rng: &mut impl CryptoRngCore) -> Result<Self> {
        let lifecycle = Lifecycle::new(config)?;
        let output = keygen::deal(lifecycle.config(), lifecycle.epoch(), rng)?;
        Ok(Self {
            state: RwLock::new(GroupState::from_output(lifecycle, output)),
        })
    }

    /// Resume from persisted state
    pub fn from_state(state: GroupState) -> Result<Self> {
        state.validate()?;
        Ok(Self {
            state: RwLock::new(state),
        })
    }

    pub async fn export(&self) -> GroupState {
        self.state.read().await.clone()
    }

    pub async fn add(&self, id: impl Into<ParticipantId>) -> Result<KeyEpoch> {
        self.apply(Change::Add(id.into())).await
    }

    pub async fn remove(&self, id: impl Into<ParticipantId>) -> Result<KeyEpoch> {
        self.apply(Change::Remove(id.into())).await
    }

    pub async fn set_threshold(&self, threshold: usize) -> Result<KeyEpoch> {
        self.apply(Change::SetThreshold(threshold)).await
    }

    /// Re-randomize every share without changing members or threshold
    pub async fn refresh(&self) -> Result<KeyEpoch> {
        self.apply(Change::Refresh).await
    }

    #[instrument(skip(self), fields(change = %change))]
    async fn apply(&self, change: Change) -> Result<KeyEpoch> {
        let mut state = self.state.write().await;
        let next = state.lifecycle.propose(&change)?;
        let epoch = state.lifecycle.epoch().next();

        let output = {
            let threshold = state.lifecycle.threshold();
            // A removed participant does not take part in dealing its successors' shares.
            let holders: Vec<&KeyShare> = state
                .lifecycle
                .get_active()
                .iter()
                .filter(|id| !matches!(&change, Change::Remove(removed) if removed == *id))
                .filter_map(|id| state.shares.get(id))
                .take(threshold)
                .collect();
            keygen::reshare(&holders, &next, epoch, &mut OsRng)?
        };

        state.group_key = output.group_key;
        state.commitments = output.commitments;
        state.shares = output.shares;
        let committed = state.lifecycle.commit(next);

        let (threshold, total) = state.lifecycle.get_config();
        info!(%committed, threshold, total, "Applied lifecycle change");
        Ok(committed)
    }

    /// `(threshold, total active)`
    pub async fn get_config(&self) -> (usize, usize) {
        self.state.read().await.lifecycle.get_config()
    }

    pub async fn get_active(&self) -> Vec<ParticipantId> {
        self.state.read().await.lifecycle.get_active().to_vec()
    }

    pub async fn is_active(&self, id: &ParticipantId) -> bool {
        self.state.read().await.lifecycle.is_active(id)
    }

    pub async fn epoch(&self) -> KeyEpoch {
        self.state.read().await.lifecycle.epoch()
    }

    pub async fn group_key(&self) -> GroupPublicKey {
        self.state.read().await.group_key
    }

    /// Current share of `id`
    pub async fn share(&self, id: &ParticipantId) -> Result<KeyShare> {
        self.state
            .read()
            .await
            .shares
            .get(id)
            .cloned()
            .ok_or_else(|| Error::UnknownParticipant(id.to_string()))
    }

    pub async fn snapshot(&self) -> GroupSnapshot {
        let state = self.state.read().await;
        let participants = state
            .lifecycle
            .get_active()
            .iter()
            .filter_map(|id| state.shares.get(id))
            .map(|share| ParticipantInfo {
                id: share.participant.clone(),
                index: share.index,
                public_share: share.public_share,
            })
            .collect();
        GroupSnapshot {
            epoch: state.lifecycle.epoch(),
            threshold: state.lifecycle.threshold(),
            group_key: state.group_key,
            participants,
        }
    }
}
