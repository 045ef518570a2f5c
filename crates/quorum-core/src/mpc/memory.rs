//! Single-process relay

use super::{async_trait, Relay};
use crate::types::{ParticipantId, SessionId};
use crate::{Error, Result};
use dashmap::DashMap;
use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

/// Upper bound on how long a waiting collector goes without re-checking
const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Mailbox {
    Broadcast(u32),
    Direct(u32, ParticipantId),
}

/// Serialized messages of one session, per mailbox, in arrival order
type SessionMail = HashMap<Mailbox, Vec<Vec<u8>>>;

/// Relay for a coordinator and signers sharing one process.
///
/// Clones share the same mail. Messages are stored as JSON so that every
/// payload crosses the same serialization boundary a networked relay would
/// impose.
#[derive(Clone, Default)]
pub struct MemoryRelay {
    sessions: Arc<DashMap<SessionId, SessionMail>>,
    arrived: Arc<Notify>,
}

impl MemoryRelay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages currently held for a session
    pub fn pending(&self, session_id: &SessionId) -> usize {
        self.sessions
            .get(session_id)
            .map(|mail| mail.values().map(Vec::len).sum())
            .unwrap_or(0)
    }

    /// Sessions with any mail held
    pub fn sessions(&self) -> usize {
        self.sessions.len()
    }

    fn deliver<T: Serialize>(&self, session_id: &SessionId, mailbox: Mailbox, message: &T) -> Result<()> {
        let bytes = serde_json::to_vec(message).map_err(|e| Error::Serialization(e.to_string()))?;
        self.sessions
            .entry(*session_id)
            .or_default()
            .entry(mailbox)
            .or_default()
            .push(bytes);
        self.arrived.notify_waiters();
        Ok(())
    }

    /// First `count` messages of a mailbox, if that many have arrived
    fn ready<T: DeserializeOwned>(
        &self,
        session_id: &SessionId,
        mailbox: &Mailbox,
        count: usize,
    ) -> Option<Result<Vec<T>>> {
        let mail = self.sessions.get(session_id)?;
        let messages = mail.get(mailbox)?;
        if messages.len() < count {
            return None;
        }
        Some(
            messages[..count]
                .iter()
                .map(|bytes| {
                    serde_json::from_slice(bytes).map_err(|e| Error::Deserialization(e.to_string()))
                })
                .collect(),
        )
    }

    async fn wait_for<T: DeserializeOwned>(
        &self,
        session_id: &SessionId,
        mailbox: Mailbox,
        count: usize,
    ) -> Result<Vec<T>> {
        loop {
            // Registered before the check so a delivery in between still wakes us.
            let arrived = self.arrived.notified();
            if let Some(messages) = self.ready(session_id, &mailbox, count) {
                return messages;
            }
            let _ = tokio::time::timeout(POLL_INTERVAL, arrived).await;
        }
    }
}

#[async_trait]
impl Relay for MemoryRelay {
    async fn broadcast<T: Serialize + Send + Sync>(
        &self,
        session_id: &SessionId,
        round: u32,
        message: &T,
    ) -> Result<()> {
        self.deliver(session_id, Mailbox::Broadcast(round), message)
    }

    async fn send_direct<T: Serialize + Send + Sync>(
        &self,
        session_id: &SessionId,
        round: u32,
        to: &ParticipantId,
        message: &T,
    ) -> Result<()> {
        self.deliver(session_id, Mailbox::Direct(round, to.clone()), message)
    }

    async fn collect_broadcasts<T: DeserializeOwned + Send>(
        &self,
        session_id: &SessionId,
        round: u32,
        count: usize,
    ) -> Result<Vec<T>> {
        self.wait_for(session_id, Mailbox::Broadcast(round), count).await
    }

    async fn collect_direct<T: DeserializeOwned + Send>(
        &self,
        session_id: &SessionId,
        round: u32,
        recipient: &ParticipantId,
        count: usize,
    ) -> Result<Vec<T>> {
        self.wait_for(session_id, Mailbox::Direct(round, recipient.clone()), count)
            .await
    }

    async fn discard(&self, session_id: &SessionId) -> Result<()> {
        self.sessions.remove(session_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    struct Note {
        value: u32,
    }

    #[tokio::test]
    async fn test_broadcast_keeps_arrival_order() {
        let relay = MemoryRelay::new();
        let session_id = [0u8; 32];

        relay.broadcast(&session_id, 1, &Note { value: 42 }).await.unwrap();
        relay.broadcast(&session_id, 1, &Note { value: 43 }).await.unwrap();

        let notes: Vec<Note> = relay.collect_broadcasts(&session_id, 1, 2).await.unwrap();
        assert_eq!(notes, vec![Note { value: 42 }, Note { value: 43 }]);
    }

    #[tokio::test]
    async fn test_direct_is_per_recipient() {
        let relay = MemoryRelay::new();
        let session_id = [1u8; 32];
        let alice = ParticipantId::from("alice");

        relay.send_direct(&session_id, 2, &alice, &Note { value: 100 }).await.unwrap();
        relay
            .send_direct(&session_id, 2, &"bob".into(), &Note { value: 200 })
            .await
            .unwrap();

        let notes: Vec<Note> = relay.collect_direct(&session_id, 2, &alice, 1).await.unwrap();
        assert_eq!(notes, vec![Note { value: 100 }]);
    }

    #[tokio::test]
    async fn test_rounds_do_not_mix() {
        let relay = MemoryRelay::new();
        let session_id = [5u8; 32];

        relay.broadcast(&session_id, 1, &Note { value: 1 }).await.unwrap();
        relay.broadcast(&session_id, 2, &Note { value: 2 }).await.unwrap();

        let notes: Vec<Note> = relay.collect_broadcasts(&session_id, 2, 1).await.unwrap();
        assert_eq!(notes, vec![Note { value: 2 }]);
    }

    #[tokio::test]
    async fn test_collect_waits_for_late_message() {
        let relay = MemoryRelay::new();
        let session_id = [2u8; 32];
        let sender = relay.clone();

        let late = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            sender.broadcast(&session_id, 1, &Note { value: 7 }).await.unwrap();
        });

        let notes: Vec<Note> = relay.collect_broadcasts(&session_id, 1, 1).await.unwrap();
        assert_eq!(notes[0].value, 7);
        late.await.unwrap();
    }

    #[tokio::test]
    async fn test_discard_session() {
        let relay = MemoryRelay::new();
        let kept = [3u8; 32];
        let dropped = [4u8; 32];

        relay.broadcast(&kept, 1, &Note { value: 1 }).await.unwrap();
        relay.broadcast(&dropped, 1, &Note { value: 2 }).await.unwrap();
        relay
            .send_direct(&dropped, 3, &"coordinator".into(), &Note { value: 3 })
            .await
            .unwrap();
        assert_eq!(relay.pending(&dropped), 2);
        assert_eq!(relay.sessions(), 2);

        relay.discard(&dropped).await.unwrap();
        assert_eq!(relay.pending(&dropped), 0);
        assert_eq!(relay.pending(&kept), 1);
        assert_eq!(relay.sessions(), 1);
    }
}
