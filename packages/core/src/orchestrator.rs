//! Periodic task orchestration (§4.6).
//!
//! Four independently-scheduled tokio tasks drive the core when nothing is
//! actively calling `send_message`: poll for new messages, poll for new
//! announcements, refresh sessions that need renewing, and retry failed sends.
//! Each tick acquires the store's single writer lock only for the critical
//! section it needs.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::discussion;
use crate::error::CoreResult;
use crate::events::EventSender;
use crate::model::{Contact, MessageDirection, MessageStatus, OwnerUserId};
use crate::ratchet::CryptoProvider;
use crate::receiver::Receiver;
use crate::sender::Sender;
use crate::session_adapter::{SessionAdapter, SessionStatus};
use crate::store::Store;
use crate::time::now_unix_millis;
use crate::transport::Transport;

/// Owns the four periodic tasks for one local account. Dropping this value
/// asks every task to stop at its next loop iteration, then aborts whatever
/// hasn't exited after a short grace period.
pub struct Orchestrator {
    handles: Vec<tokio::task::JoinHandle<()>>,
    stop: Arc<AtomicBool>,
}

impl Orchestrator {
    /// Spawns the four polling tasks if [`Config::global`]'s `polling.enabled`
    /// is set; otherwise returns an `Orchestrator` with nothing running, so
    /// test harnesses can drive `Receiver`/`Sender` by hand without a clock.
    pub fn spawn<P>(
        owner: OwnerUserId,
        sessions: Arc<SessionAdapter<P>>,
        store: Arc<dyn Store>,
        transport: Arc<dyn Transport>,
        events: EventSender,
    ) -> Self
    where
        P: CryptoProvider + 'static,
    {
        let config = Config::global();
        let stop = Arc::new(AtomicBool::new(false));
        if !config.polling.enabled {
            return Self { handles: Vec::new(), stop };
        }

        let receiver = Arc::new(Receiver::new(
            owner,
            sessions.clone(),
            store.clone(),
            transport.clone(),
            events.clone(),
        ));
        let sender = Arc::new(Sender::new(owner, sessions.clone(), store.clone(), transport.clone(), events.clone()));

        let mut handles = Vec::new();

        handles.push(tokio::spawn(messages_task(
            receiver.clone(),
            events.clone(),
            config.polling.messages_interval_ms,
            stop.clone(),
        )));
        handles.push(tokio::spawn(announcements_task(
            owner,
            sessions.clone(),
            store.clone(),
            transport.clone(),
            events.clone(),
            config.polling.announcements_interval_ms,
            stop.clone(),
        )));
        handles.push(tokio::spawn(session_refresh_task(
            owner,
            sessions.clone(),
            store.clone(),
            sender.clone(),
            events.clone(),
            config.polling.session_refresh_interval_ms,
            stop.clone(),
        )));
        handles.push(tokio::spawn(resend_task(
            owner,
            sender,
            store,
            events,
            config.polling.resend_interval_ms,
            stop.clone(),
        )));

        Self { handles, stop }
    }
}

impl Drop for Orchestrator {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        for handle in &self.handles {
            handle.abort();
        }
    }
}

async fn messages_task<P: CryptoProvider + 'static>(
    receiver: Arc<Receiver<P>>,
    events: EventSender,
    interval_ms: u64,
    stop: Arc<AtomicBool>,
) {
    while !stop.load(Ordering::Relaxed) {
        if let Err(e) = receiver.fetch().await {
            crate::events::emit_error(&events, &e);
        }
        tokio::time::sleep(Duration::from_millis(interval_ms)).await;
    }
}

/// Polls for new announcements and, for peers we've self-requested, moves
/// them to `Active` once the peer's matching offer appears; for peers we
/// haven't seen before, records the offer for the application to surface
/// through `OnSessionAcceptNeeded`. The fetch cursor is persisted after every
/// batch so a restart resumes from where it left off instead of replaying the
/// whole board.
async fn announcements_task<P: CryptoProvider + 'static>(
    owner: OwnerUserId,
    sessions: Arc<SessionAdapter<P>>,
    store: Arc<dyn Store>,
    transport: Arc<dyn Transport>,
    events: EventSender,
    interval_ms: u64,
    stop: Arc<AtomicBool>,
) {
    let limit = Config::global().announcements.fetch_limit;

    while !stop.load(Ordering::Relaxed) {
        let cursor = match store.get_announcement_cursor(owner).await {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!(target: "orchestrator::announcements", error = %e, "failed to load announcement cursor");
                tokio::time::sleep(Duration::from_millis(interval_ms)).await;
                continue;
            }
        };

        match transport.fetch_announcements(cursor, limit).await {
            Ok(batch) => {
                let mut next_cursor = cursor;
                for item in &batch {
                    next_cursor = next_cursor.max(item.counter + 1);
                }
                if let Err(e) = process_announcements(owner, &sessions, &store, &events, batch).await {
                    tracing::warn!(target: "orchestrator::announcements", error = %e, "failed to process announcement batch");
                }
                if next_cursor != cursor {
                    if let Err(e) = store.put_announcement_cursor(owner, next_cursor).await {
                        tracing::warn!(target: "orchestrator::announcements", error = %e, "failed to persist announcement cursor");
                    }
                }
            }
            Err(e) => {
                tracing::warn!(target: "orchestrator::announcements", error = %e, "fetch_announcements failed");
            }
        }
        tokio::time::sleep(Duration::from_millis(interval_ms)).await;
    }
}

async fn process_announcements<P: CryptoProvider>(
    owner: OwnerUserId,
    sessions: &Arc<SessionAdapter<P>>,
    store: &Arc<dyn Store>,
    events: &EventSender,
    batch: Vec<crate::transport::FetchedAnnouncement>,
) -> CoreResult<()> {
    for item in batch {
        // The wire format here carries no sender tag (mirrors `read_seekers`'
        // peer-blind addressing); a real deployment would look the peer up by
        // the announcement's own identity key. We key discussions by the
        // bundle's embedded identity bytes as a stand-in peer id.
        let Ok(bundle) = bincode::deserialize::<crate::ratchet::handshake::x3dh::X3DHPublicKeyBundle>(&item.announcement) else {
            continue;
        };
        let mut peer = [0u8; 32];
        let take = bundle.identity_public.len().min(32);
        peer[..take].copy_from_slice(&bundle.identity_public[..take]);

        if sessions.peer_session_status(peer) != SessionStatus::Unknown {
            continue;
        }

        if let Some(offer) = sessions.feed_incoming_announcement(peer, &item.announcement)? {
            let contact = Contact {
                owner,
                peer,
                display_name: String::new(),
                public_keys_blob: bincode::serialize(&offer.bundle).unwrap_or_default(),
            };
            store.put_contact(contact).await?;

            if store.get_discussion(owner, peer).await?.is_none() {
                store.put_discussion(discussion::new_received(owner, peer)).await?;
            }
            crate::events::emit(events, crate::events::CoreEvent::OnSessionAcceptNeeded { peer });
        }
    }
    Ok(())
}

async fn session_refresh_task<P: CryptoProvider + 'static>(
    owner: OwnerUserId,
    sessions: Arc<SessionAdapter<P>>,
    store: Arc<dyn Store>,
    sender: Arc<Sender<P>>,
    events: EventSender,
    interval_ms: u64,
    stop: Arc<AtomicBool>,
) {
    while !stop.load(Ordering::Relaxed) {
        sessions.refresh();

        for peer in sessions.renewal_due_peers(now_unix_millis()) {
            crate::events::emit(&events, crate::events::CoreEvent::OnSessionRenewalNeeded { peer });
        }

        if let Err(e) = promote_active_discussions(owner, &sessions, &store, &sender).await {
            tracing::warn!(target: "orchestrator::session_refresh", error = %e, "failed to sync discussion status");
        }
        tokio::time::sleep(Duration::from_millis(interval_ms)).await;
    }
}

async fn promote_active_discussions<P: CryptoProvider>(
    owner: OwnerUserId,
    sessions: &Arc<SessionAdapter<P>>,
    store: &Arc<dyn Store>,
    sender: &Arc<Sender<P>>,
) -> CoreResult<()> {
    for discussion in store.all_discussions(owner).await? {
        let status = sessions.peer_session_status(discussion.peer);
        if status == SessionStatus::Active && discussion.status != crate::model::DiscussionStatus::Active {
            let peer = discussion.peer;
            let mut updated = discussion;
            discussion::on_session_active(&mut updated);
            store.put_discussion(updated).await?;
            sender.process_send_queue_for_peer(peer).await?;
        }
    }
    Ok(())
}

async fn resend_task<P: CryptoProvider + 'static>(
    owner: OwnerUserId,
    sender: Arc<Sender<P>>,
    store: Arc<dyn Store>,
    events: EventSender,
    interval_ms: u64,
    stop: Arc<AtomicBool>,
) {
    while !stop.load(Ordering::Relaxed) {
        if let Err(e) = resend_tick(owner, &sender, &store).await {
            crate::events::emit_error(&events, &e);
        }
        tokio::time::sleep(Duration::from_millis(interval_ms)).await;
    }
}

async fn resend_tick<P: CryptoProvider>(
    owner: OwnerUserId,
    sender: &Arc<Sender<P>>,
    store: &Arc<dyn Store>,
) -> CoreResult<()> {
    let now = now_unix_millis();
    let failed = store
        .query_messages_by_direction_status(owner, MessageDirection::Out, MessageStatus::Failed)
        .await?;

    let mut peers: Vec<_> = failed.iter().map(|m| m.peer).collect();
    peers.sort_unstable();
    peers.dedup();

    for peer in peers {
        sender.resend_messages(peer, now).await?;
    }
    Ok(())
}
