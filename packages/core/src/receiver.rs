//! Fetch loop (§4.4): pulls every ciphertext currently addressable by any of our
//! read-seekers, including ones that only become visible once earlier messages
//! advance the ratchet.

use std::sync::Arc;

use crate::config::Config;
use crate::error::CoreResult;
use crate::events::{emit, CoreEvent, EventSender};
use crate::model::{
    ActiveSeeker, Discussion, ForwardOf, Message, MessageDirection, MessageId, MessageStatus,
    MessageType, OwnerUserId, ReplyTo,
};
use crate::ratchet::CryptoProvider;
use crate::session_adapter::SessionAdapter;
use crate::store::Store;
use crate::time::now_unix_millis;
use crate::transport::Transport;
use crate::wire;

/// One decoded, not-yet-stored incoming message.
struct Decrypted {
    content: String,
    sender: crate::model::UserId,
    timestamp: i64,
    message_type: MessageType,
    message_id: Option<MessageId>,
    reply_to: Option<ReplyTo>,
    forward_of: Option<ForwardOf>,
}

pub struct Receiver<P: CryptoProvider> {
    owner: OwnerUserId,
    sessions: Arc<SessionAdapter<P>>,
    store: Arc<dyn Store>,
    transport: Arc<dyn Transport>,
    events: EventSender,
}

impl<P: CryptoProvider> Receiver<P> {
    pub fn new(
        owner: OwnerUserId,
        sessions: Arc<SessionAdapter<P>>,
        store: Arc<dyn Store>,
        transport: Arc<dyn Transport>,
        events: EventSender,
    ) -> Self {
        Self {
            owner,
            sessions,
            store,
            transport,
            events,
        }
    }

    /// Drives the bounded, convergent fetch loop described in §4.4. Returns the
    /// number of iterations performed, mainly for test assertions about
    /// convergence.
    pub async fn fetch(&self) -> CoreResult<u32> {
        let max_iterations = Config::global().messages.max_fetch_iterations;
        let fetch_delay = Config::global().messages.fetch_delay_ms;

        let mut previous: Vec<Vec<u8>> = Vec::new();
        let mut iterations = 0u32;
        let mut current: Vec<Vec<u8>> = Vec::new();

        loop {
            current = self.sessions.read_seekers();
            if current == previous || iterations >= max_iterations {
                break;
            }

            let batch = self.transport.fetch(&current).await?;
            previous = current.clone();

            if batch.is_empty() {
                iterations += 1;
                tokio::time::sleep(std::time::Duration::from_millis(fetch_delay)).await;
                continue;
            }

            let (decrypted, acked) = self.decrypt_batch(batch).await;
            if !decrypted.is_empty() {
                self.store_decrypted(decrypted).await?;
            }
            if !acked.is_empty() {
                self.acknowledge(acked).await?;
            }

            iterations += 1;
            tokio::time::sleep(std::time::Duration::from_millis(fetch_delay)).await;
        }

        let active = current
            .into_iter()
            .map(|seeker| ActiveSeeker {
                owner: self.owner,
                seeker,
            })
            .collect();
        self.store.replace_active_seekers(self.owner, active).await?;

        Ok(iterations)
    }

    /// §4.4.1. `feed_incoming` is keyed per-peer in the adapter, but the
    /// transport only gives us `(seeker, ciphertext)`; since seekers aren't
    /// peer-tagged on the wire, we try every peer with an active session until
    /// one decodes — the first successful decrypt is the genuine sender, since a
    /// MAC failure against any other peer's ratchet state is cryptographically
    /// certain.
    async fn decrypt_batch(
        &self,
        batch: Vec<crate::transport::FetchedSlot>,
    ) -> (Vec<Decrypted>, Vec<Vec<u8>>) {
        let mut decrypted = Vec::new();
        let mut acked = Vec::new();

        for slot in batch {
            let Some(incoming) = self.sessions.feed_incoming_any(&slot.ciphertext, now_unix_millis())
            else {
                tracing::debug!(target: "receiver::fetch", "dropping ciphertext: no session could decrypt it");
                continue;
            };

            let payload = match wire::deserialize(&incoming.plaintext) {
                Ok(p) => p,
                Err(e) => {
                    tracing::warn!(target: "receiver::fetch", error = %e, "dropping malformed plaintext");
                    continue;
                }
            };

            acked.extend(payload.acknowledged_seekers);
            self.sessions.queue_ack(incoming.sender, slot.seeker);

            if payload.message_type == MessageType::KeepAlive {
                continue;
            }

            decrypted.push(Decrypted {
                content: payload.content,
                sender: incoming.sender,
                timestamp: incoming.timestamp,
                message_type: payload.message_type,
                message_id: payload.message_id,
                reply_to: payload.reply_to,
                forward_of: payload.forward_of,
            });
        }

        (decrypted, acked)
    }

    /// §4.4.2.
    async fn store_decrypted(&self, items: Vec<Decrypted>) -> CoreResult<()> {
        let window = Config::global().messages.deduplication_window_ms;

        for item in items {
            let Some(mut discussion) = self.store.get_discussion(self.owner, item.sender).await?
            else {
                tracing::info!(target: "receiver::fetch", sender = ?item.sender, "dropping message from unknown peer");
                continue;
            };

            if self.is_duplicate(item.sender, &item.content, item.timestamp, window).await? {
                continue;
            }

            let reply_to = match item.reply_to {
                Some(mut reply) => {
                    let resolved = self
                        .store
                        .query_messages_by_direction_status(
                            self.owner,
                            MessageDirection::Out,
                            MessageStatus::Delivered,
                        )
                        .await?
                        .into_iter()
                        .any(|m| m.message_id == Some(reply.original_msg_id));
                    if resolved {
                        reply.original_content = None;
                    }
                    Some(reply)
                }
                None => None,
            };

            let message = Message {
                owner: self.owner,
                peer: item.sender,
                direction: MessageDirection::In,
                status: MessageStatus::Delivered,
                message_type: item.message_type,
                content: item.content.clone(),
                serialized_content: None,
                seeker: None,
                ciphertext: None,
                message_id: item.message_id,
                reply_to,
                forward_of: item.forward_of,
                timestamp: item.timestamp,
                when_to_send: None,
            };

            discussion.last_message_id = item.message_id;
            discussion.last_message_content = Some(item.content);
            discussion.last_message_timestamp = Some(item.timestamp);
            discussion.unread_count += 1;
            discussion.updated_at = now_unix_millis();
            discussion.last_sync_timestamp = Some(now_unix_millis());

            self.store.put_message_and_discussion(message, discussion).await?;
            emit(
                &self.events,
                CoreEvent::OnMessageReceived {
                    peer: item.sender,
                    message_id: item.message_id,
                },
            );
        }

        Ok(())
    }

    async fn is_duplicate(
        &self,
        peer: crate::model::UserId,
        content: &str,
        timestamp: i64,
        window_ms: i64,
    ) -> CoreResult<bool> {
        let existing = self
            .store
            .query_messages_by_direction_status(self.owner, MessageDirection::In, MessageStatus::Delivered)
            .await?;
        Ok(existing.into_iter().any(|m| {
            m.peer == peer && m.content == content && (m.timestamp - timestamp).abs() <= window_ms
        }))
    }

    /// §4.4.3.
    async fn acknowledge(&self, acked: Vec<Vec<u8>>) -> CoreResult<()> {
        self.store.mark_delivered_by_seekers(self.owner, &acked).await?;
        self.store.delete_delivered_keep_alives(self.owner).await?;
        Ok(())
    }
}
