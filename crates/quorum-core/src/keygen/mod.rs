//! Key generation and resharing
//!
//! A trusted dealer splits a random group secret into Shamir shares with
//! Feldman commitments. Resharing moves the same secret to a new participant
//! set or threshold and is also used for plain refreshes.

mod dealer;
mod polynomial;
mod refresh;

pub use dealer::{deal, reconstruct_secret, run_dkg, verify_share, DealerOutput};
pub use polynomial::{evaluate_commitments, Polynomial};
pub use refresh::reshare;
