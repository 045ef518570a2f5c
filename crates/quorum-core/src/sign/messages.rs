//! Signing protocol messages

use crate::types::{scalar_serde, GroupPublicKey, KeyEpoch, ParticipantId, PublicPoint, SessionId};
use k256::Scalar;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Signing request announced by the coordinator (round 0)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignRequest {
    #[serde(with = "crate::types::hex_array")]
    pub session_id: SessionId,
    #[serde(with = "crate::types::hex_array")]
    pub message_hash: [u8; 32],
    pub epoch: KeyEpoch,
    pub signers: Vec<ParticipantId>,
}

/// Round 1: nonce commitment `R_i = k_i * G`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitmentMessage {
    #[serde(with = "crate::types::hex_array")]
    pub session_id: SessionId,
    pub from: ParticipantId,
    pub commitment: PublicPoint,
}

/// Everything a signer needs to produce its partial signature.
///
/// Signers recompute `R` and `e` from the commitments instead of trusting
/// the coordinator's values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SigningPackage {
    #[serde(with = "crate::types::hex_array")]
    pub session_id: SessionId,
    #[serde(with = "crate::types::hex_array")]
    pub message_hash: [u8; 32],
    pub group_key: GroupPublicKey,
    pub epoch: KeyEpoch,
    /// Share index of every signer
    pub indices: BTreeMap<ParticipantId, u32>,
    /// `R_i` of every signer
    pub commitments: BTreeMap<ParticipantId, PublicPoint>,
    /// `R = Σ R_i`
    pub aggregate: PublicPoint,
    /// `e` as a canonical scalar
    #[serde(with = "scalar_serde")]
    pub challenge: Scalar,
}

/// Round 2: partial signature `s_i = k_i + e * L_i * y_i`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartialMessage {
    #[serde(with = "crate::types::hex_array")]
    pub session_id: SessionId,
    pub from: ParticipantId,
    #[serde(with = "scalar_serde")]
    pub partial: Scalar,
}
