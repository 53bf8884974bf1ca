//! MPC coordination utilities
//!
//! The protocol stages never touch the network; the async drivers in
//! `keygen::dkg` and `sign::dsg` move messages through a [`Relay`].

use crate::{PartyIndex, Result, SessionId};
use serde::{de::DeserializeOwned, Serialize};
use std::collections::BTreeMap;

pub use ::async_trait::async_trait;

/// Message relay trait for MPC communication.
///
/// Every message is tagged with its sender. `collect_*` calls act as a round
/// barrier: they return once a message from every listed sender is present.
#[async_trait]
pub trait Relay: Send + Sync {
    /// Broadcast a message to all parties
    async fn broadcast<T: Serialize + Send + Sync>(
        &self,
        session_id: &SessionId,
        round: u32,
        from: PartyIndex,
        message: &T,
    ) -> Result<()>;

    /// Send a direct message to a specific party
    async fn send_direct<T: Serialize + Send + Sync>(
        &self,
        session_id: &SessionId,
        round: u32,
        from: PartyIndex,
        to: PartyIndex,
        message: &T,
    ) -> Result<()>;

    /// Collect the broadcasts of `from` for a round
    async fn collect_broadcasts<T: DeserializeOwned + Send>(
        &self,
        session_id: &SessionId,
        round: u32,
        from: &[PartyIndex],
    ) -> Result<BTreeMap<PartyIndex, T>>;

    /// Collect direct messages sent by `from` to `to`
    async fn collect_direct<T: DeserializeOwned + Send>(
        &self,
        session_id: &SessionId,
        round: u32,
        to: PartyIndex,
        from: &[PartyIndex],
    ) -> Result<BTreeMap<PartyIndex, T>>;
}

/// In-memory relay for testing
pub mod memory;

pub use memory::MemoryRelay;
