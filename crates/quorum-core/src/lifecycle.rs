//! Threshold and participant lifecycle
//!
//! Validates membership changes against the majority rules before anything
//! is mutated. Applying a change (and resharing) is the key manager's job.

use crate::types::{check_threshold, GroupConfig, KeyEpoch, ParticipantId};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

/// A requested membership or threshold change
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change {
    Add(ParticipantId),
    Remove(ParticipantId),
    SetThreshold(usize),
    /// Re-randomize shares, same members and threshold
    Refresh,
}

impl fmt::Display for Change {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Change::Add(id) => write!(f, "add {id}"),
            Change::Remove(id) => write!(f, "remove {id}"),
            Change::SetThreshold(t) => write!(f, "set threshold {t}"),
            Change::Refresh => f.write_str("refresh"),
        }
    }
}

/// Active participants, threshold and epoch of one group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lifecycle {
    config: GroupConfig,
    epoch: KeyEpoch,
}

impl Lifecycle {
    pub fn new(config: GroupConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            epoch: KeyEpoch::GENESIS,
        })
    }

    /// `(threshold, total active)`
    pub fn get_config(&self) -> (usize, usize) {
        (self.config.threshold, self.config.participants.len())
    }

    pub fn get_active(&self) -> &[ParticipantId] {
        &self.config.participants
    }

    pub fn is_active(&self, id: &ParticipantId) -> bool {
        self.config.participants.contains(id)
    }

    pub fn index_of(&self, id: &ParticipantId) -> Option<u32> {
        self.config.index_of(id)
    }

    pub fn threshold(&self) -> usize {
        self.config.threshold
    }

    pub fn epoch(&self) -> KeyEpoch {
        self.epoch
    }

    pub fn config(&self) -> &GroupConfig {
        &self.config
    }

    /// Configuration the group would have after `change`.
    ///
    /// Nothing is mutated; a rejected change leaves the lifecycle as it was.
    pub fn propose(&self, change: &Change) -> Result<GroupConfig> {
        let threshold = self.config.threshold;
        let mut participants = self.config.participants.clone();

        let next_threshold = match change {
            Change::Add(id) => {
                if self.is_active(id) {
                    return Err(Error::InvalidConfig(format!("{id} is already a participant")));
                }
                participants.push(id.clone());
                threshold
            }
            Change::Remove(id) => {
                let pos = participants
                    .iter()
                    .position(|p| p == id)
                    .ok_or_else(|| Error::UnknownParticipant(id.to_string()))?;
                if participants.len() - 1 < threshold {
                    return Err(Error::InvalidConfig(format!(
                        "removing {id} would leave {} participants for threshold {threshold}",
                        participants.len() - 1
                    )));
                }
                participants.remove(pos);
                threshold
            }
            Change::SetThreshold(t) => *t,
            Change::Refresh => threshold,
        };

        if let Err(e) = check_threshold(next_threshold, participants.len()) {
            warn!(%change, error = %e, "Rejected lifecycle change");
            return Err(e);
        }
        GroupConfig::new(next_threshold, participants)
    }

    /// Install a configuration produced by [`propose`](Self::propose) and
    /// move to the next epoch.
    pub fn commit(&mut self, config: GroupConfig) -> KeyEpoch {
        self.config = config;
        self.epoch = self.epoch.next();
        self.epoch
    }
}
