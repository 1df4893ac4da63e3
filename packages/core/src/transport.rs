//! Message-board transport: the only component that talks to the network.
//!
//! A real HTTP/WebSocket client binding to a concrete message-board deployment is a
//! platform shim outside this core; this module specifies the trait and a
//! deterministic in-memory reference implementation used by the test harness.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::{CoreResult, TransportError};
use crate::model::Seeker;

/// One filled message-board slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedSlot {
    pub seeker: Seeker,
    pub ciphertext: Vec<u8>,
}

/// One posted first-contact announcement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedAnnouncement {
    pub announcement: Vec<u8>,
    pub counter: u64,
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Returns any slots currently filled matching the given seekers.
    async fn fetch(&self, seekers: &[Seeker]) -> CoreResult<Vec<FetchedSlot>>;

    /// Writes one slot. Idempotent on retry with the same seeker.
    async fn send(&self, seeker: &Seeker, ciphertext: &[u8]) -> CoreResult<()>;

    /// Posts a first-contact blob, returning its assigned counter.
    async fn post_announcement(&self, bytes: &[u8]) -> CoreResult<u64>;

    /// Lists announcements posted after `cursor`, newest batch capped at `limit`.
    async fn fetch_announcements(
        &self,
        cursor: u64,
        limit: u32,
    ) -> CoreResult<Vec<FetchedAnnouncement>>;
}

#[derive(Default)]
struct MemoryTransportState {
    slots: HashMap<Seeker, Vec<u8>>,
    announcements: Vec<Vec<u8>>,
}

/// Deterministic in-memory reference [`Transport`], suitable for the test harness
/// and single-process deployments; never fails unless explicitly instructed to.
pub struct MemoryTransport {
    state: Mutex<MemoryTransportState>,
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MemoryTransportState::default()),
        }
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn fetch(&self, seekers: &[Seeker]) -> CoreResult<Vec<FetchedSlot>> {
        let state = self
            .state
            .lock()
            .map_err(|_| TransportError::NetworkError("transport state poisoned".to_string()))?;
        Ok(seekers
            .iter()
            .filter_map(|s| {
                state.slots.get(s).map(|ciphertext| FetchedSlot {
                    seeker: s.clone(),
                    ciphertext: ciphertext.clone(),
                })
            })
            .collect())
    }

    async fn send(&self, seeker: &Seeker, ciphertext: &[u8]) -> CoreResult<()> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| TransportError::NetworkError("transport state poisoned".to_string()))?;
        state.slots.insert(seeker.clone(), ciphertext.to_vec());
        Ok(())
    }

    async fn post_announcement(&self, bytes: &[u8]) -> CoreResult<u64> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| TransportError::NetworkError("transport state poisoned".to_string()))?;
        state.announcements.push(bytes.to_vec());
        Ok(state.announcements.len() as u64 - 1)
    }

    async fn fetch_announcements(
        &self,
        cursor: u64,
        limit: u32,
    ) -> CoreResult<Vec<FetchedAnnouncement>> {
        let state = self
            .state
            .lock()
            .map_err(|_| TransportError::NetworkError("transport state poisoned".to_string()))?;
        Ok(state
            .announcements
            .iter()
            .enumerate()
            .skip(cursor as usize)
            .take(limit as usize)
            .map(|(i, a)| FetchedAnnouncement {
                announcement: a.clone(),
                counter: i as u64,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_then_fetch_returns_the_slot() {
        let transport = MemoryTransport::new();
        let seeker = vec![1u8; 34];
        transport.send(&seeker, b"ciphertext").await.unwrap();
        let fetched = transport.fetch(&[seeker.clone()]).await.unwrap();
        assert_eq!(fetched.len(), 1);
        assert_eq!(fetched[0].ciphertext, b"ciphertext");
    }

    #[tokio::test]
    async fn fetch_missing_seeker_returns_empty() {
        let transport = MemoryTransport::new();
        let fetched = transport.fetch(&[vec![9u8; 34]]).await.unwrap();
        assert!(fetched.is_empty());
    }

    #[tokio::test]
    async fn announcements_respect_cursor_and_limit() {
        let transport = MemoryTransport::new();
        for i in 0..5u8 {
            transport.post_announcement(&[i]).await.unwrap();
        }
        let page = transport.fetch_announcements(2, 2).await.unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].announcement, vec![2]);
        assert_eq!(page[1].announcement, vec![3]);
    }

    #[tokio::test]
    async fn send_is_idempotent_for_the_same_seeker() {
        let transport = MemoryTransport::new();
        let seeker = vec![5u8; 34];
        transport.send(&seeker, b"first").await.unwrap();
        transport.send(&seeker, b"first").await.unwrap();
        let fetched = transport.fetch(&[seeker]).await.unwrap();
        assert_eq!(fetched.len(), 1);
    }
}
