//! In-memory reference [`Store`] implementation.
//!
//! One `tokio::sync::Mutex` guards every table, matching the single global writer
//! the design calls for. Suitable for the test harness and single-process
//! deployments; a durable backend is a platform shim left unimplemented.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::Mutex;

use super::Store;
use crate::error::CoreResult;
use crate::model::{
    ActiveSeeker, Contact, Discussion, Message, MessageDirection, MessageId, MessageStatus,
    OwnerUserId, PendingEncryptedMessage, Seeker, UserId,
};

#[derive(Default)]
struct Tables {
    discussions: HashMap<(OwnerUserId, UserId), Discussion>,
    contacts: HashMap<(OwnerUserId, UserId), Contact>,
    /// Primary index: a message keeps the same row across its whole lifecycle,
    /// from the seeker-less `WaitingSession`/`Ready` row `send_message` first
    /// persists through to its seeker-bearing `Sent`/`Delivered` updates.
    messages_by_id: HashMap<(OwnerUserId, UserId, MessageId), usize>,
    /// Secondary index, populated once a message has a seeker. Used by the
    /// receive path, which only ever has a seeker to look up by.
    messages_by_seeker: HashMap<(OwnerUserId, Seeker), usize>,
    messages: Vec<Message>,
    active_seekers: HashMap<OwnerUserId, Vec<ActiveSeeker>>,
    pending_encrypted: HashMap<OwnerUserId, Vec<PendingEncryptedMessage>>,
    announcement_cursors: HashMap<OwnerUserId, u64>,
}

/// In-memory, single-process [`Store`].
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            tables: Mutex::new(Tables::default()),
        }
    }
}

/// Keys primarily on `(owner, peer, message_id)`, the identity a message keeps
/// for its whole lifecycle, so a later `put_message` call that only just
/// learned the seeker (§4.5's admit→encrypt→transmit stages) updates the same
/// row instead of inserting an orphaned duplicate. The seeker index is kept as
/// a secondary lookup for the receive path, which has no `message_id` to key
/// on until the payload is decoded.
fn upsert_message(tables: &mut Tables, message: Message) {
    let id_key = message
        .message_id
        .map(|message_id| (message.owner, message.peer, message_id));
    let seeker_key = message.seeker.clone().map(|seeker| (message.owner, seeker));

    let existing_idx = id_key
        .and_then(|key| tables.messages_by_id.get(&key).copied())
        .or_else(|| seeker_key.as_ref().and_then(|key| tables.messages_by_seeker.get(key).copied()));

    let idx = existing_idx.unwrap_or(tables.messages.len());

    if let Some(key) = id_key {
        tables.messages_by_id.insert(key, idx);
    }
    if let Some(key) = seeker_key {
        tables.messages_by_seeker.insert(key, idx);
    }

    if idx == tables.messages.len() {
        tables.messages.push(message);
    } else {
        tables.messages[idx] = message;
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get_discussion(
        &self,
        owner: OwnerUserId,
        peer: UserId,
    ) -> CoreResult<Option<Discussion>> {
        let tables = self.tables.lock().await;
        Ok(tables.discussions.get(&(owner, peer)).cloned())
    }

    async fn put_discussion(&self, discussion: Discussion) -> CoreResult<()> {
        let mut tables = self.tables.lock().await;
        tables
            .discussions
            .insert((discussion.owner, discussion.peer), discussion);
        Ok(())
    }

    async fn get_contact(&self, owner: OwnerUserId, peer: UserId) -> CoreResult<Option<Contact>> {
        let tables = self.tables.lock().await;
        Ok(tables.contacts.get(&(owner, peer)).cloned())
    }

    async fn put_contact(&self, contact: Contact) -> CoreResult<()> {
        let mut tables = self.tables.lock().await;
        tables.contacts.insert((contact.owner, contact.peer), contact);
        Ok(())
    }

    async fn get_message_by_seeker(
        &self,
        owner: OwnerUserId,
        seeker: &Seeker,
    ) -> CoreResult<Option<Message>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .messages_by_seeker
            .get(&(owner, seeker.clone()))
            .map(|&idx| tables.messages[idx].clone()))
    }

    async fn query_messages_by_status(
        &self,
        owner: OwnerUserId,
        peer: UserId,
        status: MessageStatus,
    ) -> CoreResult<Vec<Message>> {
        self.query_messages_by_statuses(owner, peer, &[status]).await
    }

    async fn query_messages_by_statuses(
        &self,
        owner: OwnerUserId,
        peer: UserId,
        statuses: &[MessageStatus],
    ) -> CoreResult<Vec<Message>> {
        let tables = self.tables.lock().await;
        let mut matched: Vec<Message> = tables
            .messages
            .iter()
            .filter(|m| m.owner == owner && m.peer == peer && statuses.contains(&m.status))
            .cloned()
            .collect();
        matched.sort_by_key(|m| m.timestamp);
        Ok(matched)
    }

    async fn query_messages_by_direction_status(
        &self,
        owner: OwnerUserId,
        direction: MessageDirection,
        status: MessageStatus,
    ) -> CoreResult<Vec<Message>> {
        let tables = self.tables.lock().await;
        let mut matched: Vec<Message> = tables
            .messages
            .iter()
            .filter(|m| m.owner == owner && m.direction == direction && m.status == status)
            .cloned()
            .collect();
        matched.sort_by_key(|m| m.timestamp);
        Ok(matched)
    }

    async fn put_message_and_discussion(
        &self,
        message: Message,
        discussion: Discussion,
    ) -> CoreResult<()> {
        let mut tables = self.tables.lock().await;
        upsert_message(&mut tables, message);
        tables
            .discussions
            .insert((discussion.owner, discussion.peer), discussion);
        Ok(())
    }

    async fn put_message(&self, message: Message) -> CoreResult<()> {
        let mut tables = self.tables.lock().await;
        upsert_message(&mut tables, message);
        Ok(())
    }

    async fn mark_delivered_by_seekers(
        &self,
        owner: OwnerUserId,
        seekers: &[Seeker],
    ) -> CoreResult<Vec<Message>> {
        let mut tables = self.tables.lock().await;
        let mut updated = Vec::new();
        for msg in tables.messages.iter_mut() {
            if msg.owner != owner || msg.status != MessageStatus::Sent {
                continue;
            }
            let is_target = msg
                .seeker
                .as_ref()
                .map(|s| seekers.contains(s))
                .unwrap_or(false);
            if is_target {
                msg.status = MessageStatus::Delivered;
                updated.push(msg.clone());
            }
        }
        Ok(updated)
    }

    async fn delete_delivered_keep_alives(&self, owner: OwnerUserId) -> CoreResult<()> {
        let mut tables = self.tables.lock().await;
        let keep: Vec<Message> = tables
            .messages
            .drain(..)
            .filter(|m| {
                !(m.owner == owner
                    && m.status == MessageStatus::Delivered
                    && m.message_type == crate::model::MessageType::KeepAlive)
            })
            .collect();
        tables.messages = keep;
        // Rebuild both indexes after compaction.
        let mut rebuilt_by_seeker = HashMap::new();
        let mut rebuilt_by_id = HashMap::new();
        for (idx, m) in tables.messages.iter().enumerate() {
            if let Some(seeker) = &m.seeker {
                rebuilt_by_seeker.insert((m.owner, seeker.clone()), idx);
            }
            if let Some(message_id) = m.message_id {
                rebuilt_by_id.insert((m.owner, m.peer, message_id), idx);
            }
        }
        tables.messages_by_seeker = rebuilt_by_seeker;
        tables.messages_by_id = rebuilt_by_id;
        Ok(())
    }

    async fn replace_active_seekers(
        &self,
        owner: OwnerUserId,
        seekers: Vec<ActiveSeeker>,
    ) -> CoreResult<()> {
        let mut tables = self.tables.lock().await;
        tables.active_seekers.insert(owner, seekers);
        Ok(())
    }

    async fn active_seekers(&self, owner: OwnerUserId) -> CoreResult<Vec<ActiveSeeker>> {
        let tables = self.tables.lock().await;
        Ok(tables.active_seekers.get(&owner).cloned().unwrap_or_default())
    }

    async fn put_pending_encrypted(&self, pending: PendingEncryptedMessage) -> CoreResult<()> {
        let mut tables = self.tables.lock().await;
        tables
            .pending_encrypted
            .entry(pending.owner)
            .or_default()
            .push(pending);
        Ok(())
    }

    async fn take_pending_encrypted(
        &self,
        owner: OwnerUserId,
    ) -> CoreResult<Vec<PendingEncryptedMessage>> {
        let mut tables = self.tables.lock().await;
        Ok(tables.pending_encrypted.remove(&owner).unwrap_or_default())
    }

    async fn all_discussions(&self, owner: OwnerUserId) -> CoreResult<Vec<Discussion>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .discussions
            .values()
            .filter(|d| d.owner == owner)
            .cloned()
            .collect())
    }

    async fn get_announcement_cursor(&self, owner: OwnerUserId) -> CoreResult<u64> {
        let tables = self.tables.lock().await;
        Ok(tables.announcement_cursors.get(&owner).copied().unwrap_or(0))
    }

    async fn put_announcement_cursor(&self, owner: OwnerUserId, cursor: u64) -> CoreResult<()> {
        let mut tables = self.tables.lock().await;
        tables.announcement_cursors.insert(owner, cursor);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DiscussionDirection, DiscussionStatus, MessageType};

    fn sample_discussion(owner: OwnerUserId, peer: UserId) -> Discussion {
        Discussion {
            owner,
            peer,
            direction: DiscussionDirection::Initiated,
            status: DiscussionStatus::Active,
            we_accepted: true,
            next_seeker: None,
            initiation_announcement: None,
            last_message_id: None,
            last_message_content: None,
            last_message_timestamp: None,
            unread_count: 0,
            created_at: 0,
            updated_at: 0,
            last_sync_timestamp: None,
        }
    }

    fn sample_message(owner: OwnerUserId, peer: UserId, seeker: Option<Seeker>, status: MessageStatus, ts: i64) -> Message {
        let ciphertext = seeker.is_some().then(|| b"ct".to_vec());
        Message {
            owner,
            peer,
            direction: MessageDirection::Out,
            status,
            message_type: MessageType::Regular,
            content: "hi".to_string(),
            serialized_content: None,
            seeker,
            ciphertext,
            message_id: Some([1u8; 12]),
            reply_to: None,
            forward_of: None,
            timestamp: ts,
            when_to_send: None,
        }
    }

    #[tokio::test]
    async fn discussion_round_trips() {
        let store = MemoryStore::new();
        let owner = [1u8; 32];
        let peer = [2u8; 32];
        store.put_discussion(sample_discussion(owner, peer)).await.unwrap();
        let loaded = store.get_discussion(owner, peer).await.unwrap();
        assert!(loaded.is_some());
    }

    #[tokio::test]
    async fn query_by_status_is_sorted_by_timestamp() {
        let store = MemoryStore::new();
        let owner = [1u8; 32];
        let peer = [2u8; 32];
        store
            .put_message(sample_message(owner, peer, Some(vec![2u8; 34]), MessageStatus::Ready, 200))
            .await
            .unwrap();
        store
            .put_message(sample_message(owner, peer, Some(vec![1u8; 34]), MessageStatus::Ready, 100))
            .await
            .unwrap();
        let msgs = store
            .query_messages_by_status(owner, peer, MessageStatus::Ready)
            .await
            .unwrap();
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[0].timestamp, 100);
        assert_eq!(msgs[1].timestamp, 200);
    }

    #[tokio::test]
    async fn mark_delivered_by_seekers_updates_only_sent() {
        let store = MemoryStore::new();
        let owner = [1u8; 32];
        let peer = [2u8; 32];
        let seeker = vec![9u8; 34];
        store
            .put_message(sample_message(owner, peer, Some(seeker.clone()), MessageStatus::Sent, 10))
            .await
            .unwrap();
        let updated = store.mark_delivered_by_seekers(owner, &[seeker.clone()]).await.unwrap();
        assert_eq!(updated.len(), 1);
        let msg = store.get_message_by_seeker(owner, &seeker).await.unwrap().unwrap();
        assert_eq!(msg.status, MessageStatus::Delivered);
    }

    #[tokio::test]
    async fn delete_delivered_keep_alives_removes_only_matching() {
        let store = MemoryStore::new();
        let owner = [1u8; 32];
        let peer = [2u8; 32];
        let mut keep_alive = sample_message(owner, peer, Some(vec![3u8; 34]), MessageStatus::Delivered, 1);
        keep_alive.message_type = MessageType::KeepAlive;
        store.put_message(keep_alive).await.unwrap();
        store
            .put_message(sample_message(owner, peer, Some(vec![4u8; 34]), MessageStatus::Delivered, 2))
            .await
            .unwrap();
        store.delete_delivered_keep_alives(owner).await.unwrap();
        let remaining = store
            .query_messages_by_status(owner, peer, MessageStatus::Delivered)
            .await
            .unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].message_type, MessageType::Regular);
    }

    #[tokio::test]
    async fn put_message_with_newly_assigned_seeker_overwrites_its_waiting_row() {
        let store = MemoryStore::new();
        let owner = [1u8; 32];
        let peer = [2u8; 32];
        let message_id = [9u8; 12];

        let waiting = Message {
            message_id: Some(message_id),
            ..sample_message(owner, peer, None, MessageStatus::Ready, 10)
        };
        store.put_message(waiting).await.unwrap();

        let mut sent = store
            .query_messages_by_status(owner, peer, MessageStatus::Ready)
            .await
            .unwrap()
            .remove(0);
        sent.status = MessageStatus::Sent;
        sent.seeker = Some(vec![4u8; 34]);
        sent.ciphertext = Some(b"ct".to_vec());
        store.put_message(sent).await.unwrap();

        let ready = store
            .query_messages_by_status(owner, peer, MessageStatus::Ready)
            .await
            .unwrap();
        assert!(ready.is_empty(), "the seeker-less row must be overwritten, not orphaned");

        let sent_rows = store
            .query_messages_by_status(owner, peer, MessageStatus::Sent)
            .await
            .unwrap();
        assert_eq!(sent_rows.len(), 1);
    }

    #[tokio::test]
    async fn announcement_cursor_defaults_to_zero_and_persists() {
        let store = MemoryStore::new();
        let owner = [1u8; 32];
        assert_eq!(store.get_announcement_cursor(owner).await.unwrap(), 0);
        store.put_announcement_cursor(owner, 7).await.unwrap();
        assert_eq!(store.get_announcement_cursor(owner).await.unwrap(), 7);
    }
}
