//! # Quorum Core
//!
//! Threshold Schnorr signatures over secp256k1 for quorum-approved access
//! decisions.
//!
//! This crate provides:
//! - An arithmetic kernel (field, curve, Lagrange) with no signature-library dependency
//! - Trusted-dealer key generation with Feldman commitments
//! - Proactive resharing that keeps the group key across membership changes
//! - A two-round signing coordinator with per-partial checks
//! - A stateless verifier that runs under a fixed compute budget
//!
//! ## Example
//!
//! ```rust,ignore
//! use quorum_core::{encoding, sign, verify, GroupConfig, KeyManager};
//!
//! let manager = KeyManager::generate(GroupConfig::new(3, participants)?)?;
//! let signature = sign::run_signing(&manager, &coordinator, &signers, hash, &relay, window).await?;
//! assert!(verify::verify(&hash, &signature.to_bytes(), manager.group_key().await.as_bytes()));
//! ```

pub mod arith;
pub mod encoding;
pub mod error;
pub mod keygen;
pub mod lifecycle;
pub mod manager;
pub mod metering;
pub mod mpc;
pub mod sign;
pub mod types;
pub mod verify;

pub use error::{Error, Result};
pub use manager::{GroupSnapshot, GroupState, KeyManager};
pub use types::{
    GroupConfig, GroupPublicKey, KeyEpoch, KeyShare, ParticipantId, PublicPoint, SessionId,
    Signature,
};

/// Protocol version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
