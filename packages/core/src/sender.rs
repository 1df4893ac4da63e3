//! Outgoing send pipeline (§4.5): admit → encrypt → transmit, as three durable
//! stages. Per-peer FIFO; messages for distinct peers proceed independently.

use std::sync::Arc;

use crate::config::Config;
use crate::discussion::is_stable;
use crate::error::{CoreResult, ValidationError};
use crate::events::{emit, CoreEvent, EventSender};
use crate::model::{
    is_reserved_peer, ForwardOf, Message, MessageDirection, MessageId, MessageStatus, MessageType,
    OwnerUserId, ReplyTo, UserId,
};
use crate::ratchet::CryptoProvider;
use crate::session_adapter::{SessionAdapter, SessionStatus};
use crate::store::Store;
use crate::time::now_unix_millis;
use crate::transport::Transport;
use crate::wire::{self, Payload};

pub struct Sender<P: CryptoProvider> {
    owner: OwnerUserId,
    sessions: Arc<SessionAdapter<P>>,
    store: Arc<dyn Store>,
    transport: Arc<dyn Transport>,
    events: EventSender,
}

impl<P: CryptoProvider> Sender<P> {
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

    /// §4.5.1 `send_message`.
    pub async fn send_message(
        &self,
        peer: UserId,
        content: String,
        message_id: MessageId,
    ) -> CoreResult<()> {
        self.admit(peer, content, message_id, MessageType::Regular, None, None)
            .await
    }

    /// Send a message that cites an earlier one. `reply_to.original_content`
    /// should already carry the fallback text if the caller can't be sure the
    /// peer still has the original locally.
    pub async fn send_reply(
        &self,
        peer: UserId,
        content: String,
        message_id: MessageId,
        reply_to: ReplyTo,
    ) -> CoreResult<()> {
        self.admit(
            peer,
            content,
            message_id,
            MessageType::Reply,
            Some(reply_to),
            None,
        )
        .await
    }

    /// Send a message forwarded from another discussion.
    pub async fn send_forward(
        &self,
        peer: UserId,
        content: String,
        message_id: MessageId,
        forward_of: ForwardOf,
    ) -> CoreResult<()> {
        self.admit(
            peer,
            content,
            message_id,
            MessageType::Forward,
            None,
            Some(forward_of),
        )
        .await
    }

    /// Shared admission path for every outgoing message type: validates the
    /// peer, encodes the plaintext payload (piggybacking any acks queued for
    /// this peer since our last send), and persists the durable `WAITING_
    /// SESSION`/`READY` row §4.5.1 describes.
    async fn admit(
        &self,
        peer: UserId,
        content: String,
        message_id: MessageId,
        message_type: MessageType,
        reply_to: Option<ReplyTo>,
        forward_of: Option<ForwardOf>,
    ) -> CoreResult<()> {
        if is_reserved_peer(&peer) {
            return Err(ValidationError::InvalidPeer.into());
        }

        let Some(discussion) = self.store.get_discussion(self.owner, peer).await? else {
            return Err(ValidationError::NoDiscussion.into());
        };

        let payload = Payload {
            message_type,
            message_id: Some(message_id),
            content: content.clone(),
            reply_to: reply_to.clone(),
            forward_of: forward_of.clone(),
            acknowledged_seekers: self.sessions.take_pending_acks(peer),
        };
        let serialized = wire::serialize(&payload);

        let status = self.sessions.peer_session_status(peer);
        let now = now_unix_millis();

        let message_status = match status {
            SessionStatus::Unknown | SessionStatus::NoSession => {
                emit(&self.events, CoreEvent::OnSessionRenewalNeeded { peer });
                MessageStatus::WaitingSession
            }
            SessionStatus::Killed => {
                emit(&self.events, CoreEvent::OnSessionRenewalNeeded { peer });
                MessageStatus::WaitingSession
            }
            SessionStatus::PeerRequested => {
                emit(&self.events, CoreEvent::OnSessionAcceptNeeded { peer });
                MessageStatus::WaitingSession
            }
            SessionStatus::SelfRequested | SessionStatus::Saturated => MessageStatus::WaitingSession,
            SessionStatus::Active if is_stable(&discussion, status) => MessageStatus::Ready,
            SessionStatus::Active => MessageStatus::WaitingSession,
        };

        let message = Message {
            owner: self.owner,
            peer,
            direction: MessageDirection::Out,
            status: message_status,
            message_type,
            content,
            serialized_content: Some(serialized),
            seeker: None,
            ciphertext: None,
            message_id: Some(message_id),
            reply_to,
            forward_of,
            timestamp: now,
            when_to_send: None,
        };

        self.store.put_message(message).await?;

        if message_status == MessageStatus::Ready {
            self.process_send_queue_for_peer(peer).await?;
        }

        Ok(())
    }

    /// §4.5.2 `process_send_queue_for_peer`. Returns the number of messages
    /// successfully transitioned to `SENT`.
    pub async fn process_send_queue_for_peer(&self, peer: UserId) -> CoreResult<u32> {
        if self.sessions.peer_session_status(peer) != SessionStatus::Active {
            return Ok(0);
        }

        let queued = self
            .store
            .query_messages_by_statuses(
                self.owner,
                peer,
                &[MessageStatus::WaitingSession, MessageStatus::Ready],
            )
            .await?;

        let mut sent_count = 0;

        for mut message in queued {
            let serialized = match &message.serialized_content {
                Some(bytes) => bytes.clone(),
                None => {
                    let payload = Payload {
                        message_type: message.message_type,
                        message_id: message.message_id,
                        content: message.content.clone(),
                        reply_to: message.reply_to.clone(),
                        forward_of: message.forward_of.clone(),
                        acknowledged_seekers: self.sessions.take_pending_acks(peer),
                    };
                    let bytes = wire::serialize(&payload);
                    message.serialized_content = Some(bytes.clone());
                    bytes
                }
            };

            let (seeker, ciphertext) = match self.sessions.encrypt(peer, &serialized) {
                Ok(pair) => pair,
                Err(e) => {
                    tracing::warn!(target: "sender::pipeline", peer = ?peer, error = %e, "encrypt failed, stopping peer queue");
                    message.status = MessageStatus::Failed;
                    self.store.put_message(message).await?;
                    break;
                }
            };

            message.seeker = Some(seeker.clone());
            message.ciphertext = Some(ciphertext.clone());
            message.status = MessageStatus::Sending;
            self.store.put_message(message.clone()).await?;

            match self.transport.send(&seeker, &ciphertext).await {
                Ok(()) => {
                    message.status = MessageStatus::Sent;
                    message.when_to_send = None;
                    self.store.put_message(message.clone()).await?;
                    emit(
                        &self.events,
                        CoreEvent::OnMessageSent {
                            peer,
                            message_id: message.message_id,
                        },
                    );
                    sent_count += 1;
                }
                Err(e) => {
                    tracing::warn!(target: "sender::pipeline", peer = ?peer, error = %e, "transport send failed");
                    message.status = MessageStatus::Failed;
                    message.when_to_send =
                        Some(now_unix_millis() + Config::global().messages.retry_delay_ms);
                    self.store.put_message(message.clone()).await?;
                    emit(
                        &self.events,
                        CoreEvent::OnMessageFailed {
                            peer,
                            message_id: message.message_id,
                        },
                    );
                    break;
                }
            }
        }

        Ok(sent_count)
    }

    /// §4.5.3 `resend_messages`.
    pub async fn resend_messages(&self, peer: UserId, now: i64) -> CoreResult<()> {
        let failed = self
            .store
            .query_messages_by_status(self.owner, peer, MessageStatus::Failed)
            .await?;

        let due: Vec<Message> = failed
            .into_iter()
            .filter(|m| m.when_to_send.map(|t| t <= now).unwrap_or(true))
            .collect();

        if due.is_empty() {
            return Ok(());
        }

        match self.sessions.peer_session_status(peer) {
            SessionStatus::Killed | SessionStatus::Saturated | SessionStatus::NoSession | SessionStatus::Unknown => {
                emit(&self.events, CoreEvent::OnSessionRenewalNeeded { peer });
                return Ok(());
            }
            SessionStatus::PeerRequested => {
                emit(&self.events, CoreEvent::OnSessionAcceptNeeded { peer });
                return Ok(());
            }
            SessionStatus::SelfRequested => return Ok(()),
            SessionStatus::Active => {}
        }

        for mut message in due {
            match (&message.seeker, &message.ciphertext) {
                (Some(seeker), Some(ciphertext)) => match self.transport.send(seeker, ciphertext).await {
                    Ok(()) => {
                        message.status = MessageStatus::Sent;
                        message.when_to_send = None;
                        self.store.put_message(message.clone()).await?;
                        emit(
                            &self.events,
                            CoreEvent::OnMessageSent {
                                peer,
                                message_id: message.message_id,
                            },
                        );
                    }
                    Err(_) => {
                        message.when_to_send =
                            Some(now + Config::global().messages.retry_delay_ms);
                        self.store.put_message(message.clone()).await?;
                    }
                },
                _ => {
                    // Crash happened before the seeker/ciphertext were persisted;
                    // re-enter the full encrypt+transmit pipeline for this peer.
                    self.process_send_queue_for_peer(peer).await?;
                    break;
                }
            }
        }

        Ok(())
    }
}
