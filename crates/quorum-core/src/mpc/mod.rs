//! Message transport for the signing rounds
//!
//! Every message is addressed by session id and round number. A session's
//! traffic lives in the relay until [`Relay::discard`] is called for it;
//! [`crate::sign::run_signing`] does that once a session settles, whatever the
//! outcome.

use crate::types::{ParticipantId, SessionId};
use crate::Result;
use serde::{de::DeserializeOwned, Serialize};

pub use ::async_trait::async_trait;

/// Transport between a coordinator and the signers of its sessions
#[async_trait]
pub trait Relay: Send + Sync {
    /// Publish `message` to every member of the session
    async fn broadcast<T: Serialize + Send + Sync>(
        &self,
        session_id: &SessionId,
        round: u32,
        message: &T,
    ) -> Result<()>;

    async fn send_direct<T: Serialize + Send + Sync>(
        &self,
        session_id: &SessionId,
        round: u32,
        to: &ParticipantId,
        message: &T,
    ) -> Result<()>;

    /// Resolve once `count` broadcasts of `round` have arrived, in arrival order.
    ///
    /// Never times out on its own; callers bound it.
    async fn collect_broadcasts<T: DeserializeOwned + Send>(
        &self,
        session_id: &SessionId,
        round: u32,
        count: usize,
    ) -> Result<Vec<T>>;

    /// Same as [`Relay::collect_broadcasts`] for messages addressed to `recipient`
    async fn collect_direct<T: DeserializeOwned + Send>(
        &self,
        session_id: &SessionId,
        round: u32,
        recipient: &ParticipantId,
        count: usize,
    ) -> Result<Vec<T>>;

    /// Forget all traffic of a session
    async fn discard(&self, session_id: &SessionId) -> Result<()>;
}

pub mod memory;

pub use memory::MemoryRelay;
