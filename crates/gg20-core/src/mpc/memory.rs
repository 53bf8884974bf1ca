//! In-memory relay implementation for testing

use super::{async_trait, Relay};
use crate::{Error, PartyIndex, Result, SessionId};
use dashmap::DashMap;
use serde::{de::DeserializeOwned, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::warn;

/// Default time a party waits for one round before giving up
pub const DEFAULT_ROUND_TIMEOUT: Duration = Duration::from_secs(300);

type BroadcastKey = (SessionId, u32);
type DirectKey = (SessionId, u32, PartyIndex);

/// In-memory message relay for local testing
pub struct MemoryRelay {
    /// Broadcast messages: (session_id, round) -> sender -> message_bytes
    broadcasts: Arc<DashMap<BroadcastKey, BTreeMap<PartyIndex, Vec<u8>>>>,
    /// Direct messages: (session_id, round, to) -> sender -> message_bytes
    directs: Arc<DashMap<DirectKey, BTreeMap<PartyIndex, Vec<u8>>>>,
    /// Notification channel
    notify: broadcast::Sender<()>,
    round_timeout: Duration,
}

impl MemoryRelay {
    /// Create a new in-memory relay
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_ROUND_TIMEOUT)
    }

    /// Create a relay whose `collect_*` calls fail after `round_timeout`
    pub fn with_timeout(round_timeout: Duration) -> Self {
        let (notify, _) = broadcast::channel(100);
        Self {
            broadcasts: Arc::new(DashMap::new()),
            directs: Arc::new(DashMap::new()),
            notify,
            round_timeout,
        }
    }
}

impl Default for MemoryRelay {
    fn default() -> Self {
        Self::new()
    }
}

fn serialize<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| Error::Serialization(e.to_string()))
}

/// Decode the messages of `from`, naming every sender whose payload is malformed
fn deserialize_all<T: DeserializeOwned>(
    messages: &BTreeMap<PartyIndex, Vec<u8>>,
    round: u32,
    from: &[PartyIndex],
) -> Result<BTreeMap<PartyIndex, T>> {
    let mut decoded = BTreeMap::new();
    let mut malformed = Vec::new();
    let mut reason = String::new();
    for j in from {
        match serde_json::from_slice(&messages[j]) {
            Ok(msg) => {
                decoded.insert(*j, msg);
            }
            Err(e) => {
                warn!(round, from = j, error = %e, "Malformed message");
                if malformed.is_empty() {
                    reason = e.to_string();
                }
                malformed.push(*j);
            }
        }
    }
    if malformed.is_empty() {
        Ok(decoded)
    } else {
        Err(Error::MalformedMessage {
            round,
            from: malformed,
            reason,
        })
    }
}

/// Store a message; a second message from the same sender is ignored
fn store<K>(map: &DashMap<K, BTreeMap<PartyIndex, Vec<u8>>>, key: K, from: PartyIndex, bytes: Vec<u8>)
where
    K: std::hash::Hash + Eq,
{
    let mut slot = map.entry(key).or_default();
    if slot.contains_key(&from) {
        warn!(from, "Dropping duplicate message");
        return;
    }
    slot.insert(from, bytes);
}

impl MemoryRelay {
    async fn wait_for<K, T>(
        &self,
        map: &DashMap<K, BTreeMap<PartyIndex, Vec<u8>>>,
        key: K,
        round: u32,
        from: &[PartyIndex],
    ) -> Result<BTreeMap<PartyIndex, T>>
    where
        K: std::hash::Hash + Eq,
        T: DeserializeOwned,
    {
        let mut rx = self.notify.subscribe();
        let deadline = Instant::now() + self.round_timeout;

        loop {
            let missing: Vec<PartyIndex> = match map.get(&key) {
                Some(messages) => {
                    let missing: Vec<PartyIndex> = from
                        .iter()
                        .filter(|j| !messages.contains_key(j))
                        .copied()
                        .collect();
                    if missing.is_empty() {
                        return deserialize_all(&messages, round, from);
                    }
                    missing
                }
                None => from.to_vec(),
            };

            if Instant::now() >= deadline {
                return Err(Error::Timeout { round, missing });
            }

            // Wait for notification with timeout
            tokio::select! {
                _ = rx.recv() => continue,
                _ = tokio::time::sleep(Duration::from_millis(100)) => continue,
            }
        }
    }
}

#[async_trait]
impl Relay for MemoryRelay {
    async fn broadcast<T: Serialize + Send + Sync>(
        &self,
        session_id: &SessionId,
        round: u32,
        from: PartyIndex,
        message: &T,
    ) -> Result<()> {
        let bytes = serialize(message)?;
        store(&self.broadcasts, (*session_id, round), from, bytes);

        let _ = self.notify.send(());
        Ok(())
    }

    async fn send_direct<T: Serialize + Send + Sync>(
        &self,
        session_id: &SessionId,
        round: u32,
        from: PartyIndex,
        to: PartyIndex,
        message: &T,
    ) -> Result<()> {
        let bytes = serialize(message)?;
        store(&self.directs, (*session_id, round, to), from, bytes);

        let _ = self.notify.send(());
        Ok(())
    }

    async fn collect_broadcasts<T: DeserializeOwned + Send>(
        &self,
        session_id: &SessionId,
        round: u32,
        from: &[PartyIndex],
    ) -> Result<BTreeMap<PartyIndex, T>> {
        self.wait_for(&self.broadcasts, (*session_id, round), round, from)
            .await
    }

    async fn collect_direct<T: DeserializeOwned + Send>(
        &self,
        session_id: &SessionId,
        round: u32,
        to: PartyIndex,
        from: &[PartyIndex],
    ) -> Result<BTreeMap<PartyIndex, T>> {
        self.wait_for(&self.directs, (*session_id, round, to), round, from)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    struct TestMessage {
        value: u32,
    }

    #[tokio::test]
    async fn test_broadcast() {
        let relay = MemoryRelay::new();
        let session_id = [0u8; 32];

        relay.broadcast(&session_id, 1, 2, &TestMessage { value: 42 }).await.unwrap();
        relay.broadcast(&session_id, 1, 1, &TestMessage { value: 43 }).await.unwrap();

        let messages: BTreeMap<PartyIndex, TestMessage> =
            relay.collect_broadcasts(&session_id, 1, &[1, 2]).await.unwrap();

        assert_eq!(messages.len(), 2);
        assert_eq!(messages[&1].value, 43);
        assert_eq!(messages[&2].value, 42);
    }

    #[tokio::test]
    async fn test_direct() {
        let relay = MemoryRelay::new();
        let session_id = [0u8; 32];

        relay.send_direct(&session_id, 1, 3, 1, &TestMessage { value: 100 }).await.unwrap();

        let messages: BTreeMap<PartyIndex, TestMessage> =
            relay.collect_direct(&session_id, 1, 1, &[3]).await.unwrap();

        assert_eq!(messages.len(), 1);
        assert_eq!(messages[&3].value, 100);
    }

    #[tokio::test]
    async fn test_duplicate_sender_ignored() {
        let relay = MemoryRelay::new();
        let session_id = [1u8; 32];

        relay.broadcast(&session_id, 2, 1, &TestMessage { value: 1 }).await.unwrap();
        relay.broadcast(&session_id, 2, 1, &TestMessage { value: 2 }).await.unwrap();

        let messages: BTreeMap<PartyIndex, TestMessage> =
            relay.collect_broadcasts(&session_id, 2, &[1]).await.unwrap();
        assert_eq!(messages[&1].value, 1);
    }

    #[tokio::test]
    async fn test_timeout_names_missing_senders() {
        let relay = MemoryRelay::with_timeout(Duration::from_millis(250));
        let session_id = [2u8; 32];

        relay.broadcast(&session_id, 3, 1, &TestMessage { value: 7 }).await.unwrap();

        let err = relay
            .collect_broadcasts::<TestMessage>(&session_id, 3, &[1, 2, 4])
            .await
            .unwrap_err();
        match err {
            Error::Timeout { round, missing } => {
                assert_eq!(round, 3);
                assert_eq!(missing, vec![2, 4]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_malformed_payload_names_sender() {
        let relay = MemoryRelay::new();
        let session_id = [3u8; 32];

        relay.broadcast(&session_id, 4, 1, &TestMessage { value: 1 }).await.unwrap();
        relay.broadcast(&session_id, 4, 2, &"not a message").await.unwrap();
        relay.broadcast(&session_id, 4, 3, &TestMessage { value: 3 }).await.unwrap();

        let err = relay
            .collect_broadcasts::<TestMessage>(&session_id, 4, &[1, 2, 3])
            .await
            .unwrap_err();
        match err {
            Error::MalformedMessage { round, ref from, .. } => {
                assert_eq!(round, 4);
                assert_eq!(from, &vec![2]);
            }
            ref other => panic!("unexpected error: {other}"),
        }

        let err = err.at_stage(crate::Stage::Sign(5));
        assert_eq!(err.culprits(), &[2]);
        assert!(err.is_protocol_violation());
    }
}
