//! Persistent store abstraction.
//!
//! Typed CRUD plus the small number of compound queries the rest of the core
//! depends on, behind a single global write lock (§5 of the design: one writer at
//! a time, enforced with a `tokio::sync::Mutex` rather than thread-local state).
//! [`memory`] supplies the one reference implementation this repository ships;
//! a durable backend (sled/sqlite) is a platform shim left unimplemented.

pub mod memory;

use async_trait::async_trait;

use crate::error::CoreResult;
use crate::model::{
    ActiveSeeker, Contact, Discussion, Message, MessageDirection, MessageStatus,
    OwnerUserId, PendingEncryptedMessage, Seeker, UserId,
};

#[async_trait]
pub trait Store: Send + Sync {
    async fn get_discussion(&self, owner: OwnerUserId, peer: UserId) -> CoreResult<Option<Discussion>>;
    async fn put_discussion(&self, discussion: Discussion) -> CoreResult<()>;

    async fn get_contact(&self, owner: OwnerUserId, peer: UserId) -> CoreResult<Option<Contact>>;
    async fn put_contact(&self, contact: Contact) -> CoreResult<()>;

    async fn get_message_by_seeker(
        &self,
        owner: OwnerUserId,
        seeker: &Seeker,
    ) -> CoreResult<Option<Message>>;

    /// Ordered by `timestamp` ascending.
    async fn query_messages_by_status(
        &self,
        owner: OwnerUserId,
        peer: UserId,
        status: MessageStatus,
    ) -> CoreResult<Vec<Message>>;

    /// Ordered by `timestamp` ascending. Used by the sender pipeline, which loads
    /// `{WAITING_SESSION, READY}` together and relies on strict FIFO order.
    async fn query_messages_by_statuses(
        &self,
        owner: OwnerUserId,
        peer: UserId,
        statuses: &[MessageStatus],
    ) -> CoreResult<Vec<Message>>;

    async fn query_messages_by_direction_status(
        &self,
        owner: OwnerUserId,
        direction: MessageDirection,
        status: MessageStatus,
    ) -> CoreResult<Vec<Message>>;

    /// Atomically insert/update a message and its owning discussion.
    async fn put_message_and_discussion(
        &self,
        message: Message,
        discussion: Discussion,
    ) -> CoreResult<()>;

    async fn put_message(&self, message: Message) -> CoreResult<()>;

    /// Mark every outgoing `SENT` message whose seeker is in `seekers` as
    /// `DELIVERED`, for this owner. Returns the updated messages.
    async fn mark_delivered_by_seekers(
        &self,
        owner: OwnerUserId,
        seekers: &[Seeker],
    ) -> CoreResult<Vec<Message>>;

    /// Delete every delivered `KEEP_ALIVE` message for this owner.
    async fn delete_delivered_keep_alives(&self, owner: OwnerUserId) -> CoreResult<()>;

    async fn replace_active_seekers(
        &self,
        owner: OwnerUserId,
        seekers: Vec<ActiveSeeker>,
    ) -> CoreResult<()>;

    async fn active_seekers(&self, owner: OwnerUserId) -> CoreResult<Vec<ActiveSeeker>>;

    async fn put_pending_encrypted(&self, pending: PendingEncryptedMessage) -> CoreResult<()>;
    async fn take_pending_encrypted(&self, owner: OwnerUserId) -> CoreResult<Vec<PendingEncryptedMessage>>;

    /// All discussions for an owner, used by the orchestrator's keep-alive sweep.
    async fn all_discussions(&self, owner: OwnerUserId) -> CoreResult<Vec<Discussion>>;

    /// Last announcement-board counter this owner has fully processed. Defaults
    /// to 0 when never set, so a fresh account starts at the head of the board.
    async fn get_announcement_cursor(&self, owner: OwnerUserId) -> CoreResult<u64>;
    async fn put_announcement_cursor(&self, owner: OwnerUserId, cursor: u64) -> CoreResult<()>;
}
