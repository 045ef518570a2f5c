//! Core types for threshold Schnorr key management and signing

use crate::arith::{self, Point};
use crate::{Error, Result};
use k256::elliptic_curve::sec1::{FromEncodedPoint, ToEncodedPoint};
use k256::{AffinePoint, EncodedPoint, FieldBytes, ProjectivePoint, Scalar};
use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::Zeroize;

/// Opaque participant identity
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParticipantId(String);

impl ParticipantId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ParticipantId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for ParticipantId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Unique identifier for a signing session
pub type SessionId = [u8; 32];

/// Identifies one share set. Every refresh or membership change moves to the
/// next epoch; the group key stays the same across epochs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyEpoch(pub u64);

impl KeyEpoch {
    pub const GENESIS: KeyEpoch = KeyEpoch(0);

    pub fn next(self) -> KeyEpoch {
        KeyEpoch(self.0 + 1)
    }
}

impl fmt::Display for KeyEpoch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Uncompressed curve point encoding `x || y`, 32-byte big-endian coordinates,
/// no SEC1 prefix.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PublicPoint(pub [u8; 64]);

/// The 64-byte verification anchor handed to the authorization collaborator
pub type GroupPublicKey = PublicPoint;

impl PublicPoint {
    pub fn from_projective(point: &ProjectivePoint) -> Result<Self> {
        let encoded = point.to_affine().to_encoded_point(false);
        let bytes: [u8; 64] = encoded
            .as_bytes()
            .get(1..)
            .and_then(|raw| raw.try_into().ok())
            .ok_or_else(|| Error::Internal("cannot encode the point at infinity".into()))?;
        Ok(Self(bytes))
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let array: [u8; 64] = bytes.try_into().map_err(|_| {
            Error::MalformedInput(format!("expected 64-byte point, got {} bytes", bytes.len()))
        })?;
        Ok(Self(array))
    }

    /// Decode into a `k256` point, rejecting anything off the curve
    pub fn to_projective(&self) -> Result<ProjectivePoint> {
        let encoded = EncodedPoint::from_affine_coordinates(
            FieldBytes::from_slice(&self.0[..32]),
            FieldBytes::from_slice(&self.0[32..]),
            false,
        );
        let affine: AffinePoint = Option::from(AffinePoint::from_encoded_point(&encoded))
            .ok_or_else(|| Error::MalformedInput("point is not on secp256k1".into()))?;
        Ok(ProjectivePoint::from(affine))
    }

    /// Decode into raw kernel coordinates with range and curve checks
    pub fn to_kernel(&self) -> Result<Point> {
        Point::from_uncompressed(&self.0)
    }

    pub fn as_bytes(&self) -> &[u8; 64] {
        &self.0
    }
}

impl From<&Point> for PublicPoint {
    fn from(point: &Point) -> Self {
        Self(point.to_uncompressed())
    }
}

impl fmt::Debug for PublicPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicPoint({})", hex::encode(self.0))
    }
}

impl fmt::Display for PublicPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl Serialize for PublicPoint {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        hex_array::serialize(&self.0, serializer)
    }
}

impl<'de> Deserialize<'de> for PublicPoint {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        hex_array::deserialize(deserializer).map(Self)
    }
}

/// Size of an encoded signature
pub const SIGNATURE_LEN: usize = 96;

/// Aggregate Schnorr signature `(R_x, R_y, s)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    /// R x-coordinate
    #[serde(with = "hex_array")]
    pub r_x: [u8; 32],
    /// R y-coordinate
    #[serde(with = "hex_array")]
    pub r_y: [u8; 32],
    /// Response scalar
    #[serde(with = "hex_array")]
    pub s: [u8; 32],
}

impl Signature {
    pub fn new(r: &PublicPoint, s: &Scalar) -> Self {
        let mut r_x = [0u8; 32];
        let mut r_y = [0u8; 32];
        r_x.copy_from_slice(&r.0[..32]);
        r_y.copy_from_slice(&r.0[32..]);
        let mut s_bytes = [0u8; 32];
        s_bytes.copy_from_slice(s.to_bytes().as_slice());
        Self { r_x, r_y, s: s_bytes }
    }

    /// Convert to bytes (R_x || R_y || s)
    pub fn to_bytes(&self) -> [u8; SIGNATURE_LEN] {
        let mut bytes = [0u8; SIGNATURE_LEN];
        bytes[..32].copy_from_slice(&self.r_x);
        bytes[32..64].copy_from_slice(&self.r_y);
        bytes[64..].copy_from_slice(&self.s);
        bytes
    }

    /// Split a 96-byte encoding. Only the length is checked here; ranges are
    /// checked by the verifier.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != SIGNATURE_LEN {
            return Err(Error::MalformedInput(format!(
                "expected {SIGNATURE_LEN}-byte signature, got {} bytes",
                bytes.len()
            )));
        }
        let mut sig = Self {
            r_x: [0u8; 32],
            r_y: [0u8; 32],
            s: [0u8; 32],
        };
        sig.r_x.copy_from_slice(&bytes[..32]);
        sig.r_y.copy_from_slice(&bytes[32..64]);
        sig.s.copy_from_slice(&bytes[64..]);
        Ok(sig)
    }

    /// Commitment `R` as an encoded point
    pub fn r_point(&self) -> PublicPoint {
        let mut bytes = [0u8; 64];
        bytes[..32].copy_from_slice(&self.r_x);
        bytes[32..].copy_from_slice(&self.r_y);
        PublicPoint(bytes)
    }
}

/// Validated group configuration: ordered participants and threshold.
///
/// Position in `participants` determines the 1-based share index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupConfig {
    pub threshold: usize,
    pub participants: Vec<ParticipantId>,
}

impl GroupConfig {
    pub fn new(threshold: usize, participants: Vec<ParticipantId>) -> Result<Self> {
        let config = Self {
            threshold,
            participants,
        };
        config.validate()?;
        Ok(config)
    }

    /// Enforce `1 <= t <= n`, `t >= ceil(n / 2)` and unique ids
    pub fn validate(&self) -> Result<()> {
        check_threshold(self.threshold, self.participants.len())?;

        let mut sorted: Vec<&ParticipantId> = self.participants.iter().collect();
        sorted.sort();
        if let Some(pair) = sorted.windows(2).find(|w| w[0] == w[1]) {
            return Err(Error::InvalidConfig(format!(
                "duplicate participant {}",
                pair[0]
            )));
        }
        if u32::try_from(self.participants.len()).is_err() {
            return Err(Error::InvalidConfig("too many participants".into()));
        }
        Ok(())
    }

    /// 1-based share index of a participant
    pub fn index_of(&self, id: &ParticipantId) -> Option<u32> {
        self.participants
            .iter()
            .position(|p| p == id)
            .and_then(|pos| u32::try_from(pos + 1).ok())
    }
}

/// Smallest threshold that still requires a majority of `active` participants
pub fn majority(active: usize) -> usize {
    active.div_ceil(2).max(1)
}

/// Threshold invariants checked before any mutation or key generation
pub fn check_threshold(threshold: usize, active: usize) -> Result<()> {
    if threshold == 0 {
        return Err(Error::InvalidConfig("Threshold must be at least 1".into()));
    }
    if threshold > active {
        return Err(Error::InvalidConfig(format!(
            "Threshold {threshold} exceeds {active} active participants"
        )));
    }
    if threshold < majority(active) {
        return Err(Error::SecurityViolation(format!(
            "Threshold {threshold} is below the majority of {active} participants ({})",
            majority(active)
        )));
    }
    Ok(())
}

/// Share held by one participant after dealing or resharing
#[derive(Clone, Serialize, Deserialize)]
pub struct KeyShare {
    /// Participant identity
    pub participant: ParticipantId,

    /// 1-based evaluation point of this share
    pub index: u32,

    /// Threshold of the epoch this share belongs to
    pub threshold: usize,

    /// Epoch the share was issued in
    pub epoch: KeyEpoch,

    /// Secret share `y_i = f(x_i)`
    #[serde(with = "scalar_serde")]
    pub secret_share: Scalar,

    /// Public share `Y_i = y_i * G`
    pub public_share: PublicPoint,

    /// Group public key `P`
    pub group_key: GroupPublicKey,
}

impl KeyShare {
    /// Public share as a `k256` point
    pub fn public_share_point(&self) -> Result<ProjectivePoint> {
        self.public_share.to_projective()
    }

    /// Group key as a `k256` point
    pub fn group_key_point(&self) -> Result<ProjectivePoint> {
        self.group_key.to_projective()
    }

    /// Check that the secret share matches the published public share
    pub fn is_consistent(&self) -> bool {
        PublicPoint::from_projective(&(ProjectivePoint::GENERATOR * self.secret_share))
            .map(|expected| expected == self.public_share)
            .unwrap_or(false)
    }
}

impl fmt::Debug for KeyShare {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyShare")
            .field("participant", &self.participant)
            .field("index", &self.index)
            .field("threshold", &self.threshold)
            .field("epoch", &self.epoch)
            .field("public_share", &self.public_share)
            .field("group_key", &self.group_key)
            .finish_non_exhaustive()
    }
}

impl Drop for KeyShare {
    fn drop(&mut self) {
        self.secret_share.zeroize();
    }
}

/// Scalar encoded as a canonical 32-byte big-endian hex string
pub(crate) mod scalar_serde {
    use k256::elliptic_curve::PrimeField;
    use k256::{FieldBytes, Scalar};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(scalar: &Scalar, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&hex::encode(scalar.to_bytes()))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Scalar, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded = String::deserialize(deserializer)?;
        let bytes = hex::decode(encoded).map_err(serde::de::Error::custom)?;
        let array: [u8; 32] = bytes
            .try_into()
            .map_err(|_| serde::de::Error::custom("Invalid scalar length"))?;
        Option::<Scalar>::from(Scalar::from_repr(FieldBytes::from(array)))
            .ok_or_else(|| serde::de::Error::custom("Scalar is not below the group order"))
    }
}

/// Fixed-size byte arrays as hex strings
pub(crate) mod hex_array {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S, const LEN: usize>(bytes: &[u8; LEN], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D, const LEN: usize>(deserializer: D) -> Result<[u8; LEN], D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded = String::deserialize(deserializer)?;
        let bytes = hex::decode(encoded).map_err(serde::de::Error::custom)?;
        bytes
            .try_into()
            .map_err(|_| serde::de::Error::custom(format!("expected {LEN} bytes")))
    }
}

/// Kernel point of a `k256` projective point
pub(crate) fn kernel_point(point: &ProjectivePoint) -> Point {
    arith::point_from_affine(&point.to_affine())
}

#[cfg(test)]
mod tests {
    use super::*;
    use k256::elliptic_curve::Field;
    use rand::rngs::OsRng;

    fn ids(n: usize) -> Vec<ParticipantId> {
        (1..=n).map(|i| ParticipantId::new(format!("p{i}"))).collect()
    }

    #[test]
    fn test_majority() {
        assert_eq!(majority(1), 1);
        assert_eq!(majority(2), 1);
        assert_eq!(majority(3), 2);
        assert_eq!(majority(4), 2);
        assert_eq!(majority(5), 3);
    }

    #[test]
    fn test_group_config_validation() {
        assert!(GroupConfig::new(3, ids(5)).is_ok());
        assert!(GroupConfig::new(5, ids(5)).is_ok());
        assert!(matches!(GroupConfig::new(0, ids(5)), Err(Error::InvalidConfig(_))));
        assert!(matches!(GroupConfig::new(6, ids(5)), Err(Error::InvalidConfig(_))));
        assert!(matches!(GroupConfig::new(2, ids(5)), Err(Error::SecurityViolation(_))));

        let mut dup = ids(3);
        dup.push(ParticipantId::from("p1"));
        assert!(GroupConfig::new(3, dup).is_err());
    }

    #[test]
    fn test_index_is_positional() {
        let config = GroupConfig::new(2, ids(3)).unwrap();
        assert_eq!(config.index_of(&"p1".into()), Some(1));
        assert_eq!(config.index_of(&"p3".into()), Some(3));
        assert_eq!(config.index_of(&"p9".into()), None);
    }

    #[test]
    fn test_signature_encoding() {
        let mut bytes = [0u8; SIGNATURE_LEN];
        for (i, b) in bytes.iter_mut().enumerate() {
            *b = i as u8;
        }
        let sig = Signature::from_slice(&bytes).unwrap();
        assert_eq!(sig.to_bytes(), bytes);
        assert_eq!(sig.r_point().0[..], bytes[..64]);
        assert!(Signature::from_slice(&bytes[..95]).is_err());
    }

    #[test]
    fn test_public_point_conversions() {
        let scalar = Scalar::random(&mut OsRng);
        let point = ProjectivePoint::GENERATOR * scalar;
        let encoded = PublicPoint::from_projective(&point).unwrap();
        assert_eq!(encoded.to_projective().unwrap(), point);
        assert_eq!(PublicPoint::from(&encoded.to_kernel().unwrap()), encoded);
        assert!(PublicPoint::from_projective(&ProjectivePoint::IDENTITY).is_err());
        assert!(PublicPoint([1u8; 64]).to_projective().is_err());
    }

    #[test]
    fn test_key_share_json_round_trip() {
        let secret = Scalar::random(&mut OsRng);
        let public = PublicPoint::from_projective(&(ProjectivePoint::GENERATOR * secret)).unwrap();
        let share = KeyShare {
            participant: "p1".into(),
            index: 1,
            threshold: 2,
            epoch: KeyEpoch::GENESIS,
            secret_share: secret,
            public_share: public,
            group_key: public,
        };
        let json = serde_json::to_string(&share).unwrap();
        let decoded: KeyShare = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded.secret_share, secret);
        assert_eq!(decoded.public_share, public);
        assert!(decoded.is_consistent());
        assert!(!format!("{share:?}").contains(&hex::encode(secret.to_bytes())));
    }
}
