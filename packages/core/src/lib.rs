//! seekerboard-core: the end-to-end-encrypted messenger core.
//!
//! Wires together the vendored ratchet engine ([`ratchet`]), the seeker-aware
//! session layer ([`session_adapter`]), the discussion state machine
//! ([`discussion`]), the plaintext wire codec ([`wire`]), persistence
//! ([`store`]), the message-board transport ([`transport`]), and the
//! send/receive pipelines ([`sender`], [`receiver`]) behind the periodic
//! driver in [`orchestrator`].

pub mod config;
pub mod discussion;
pub mod error;
pub mod events;
pub mod model;
pub mod orchestrator;
pub mod ratchet;
pub mod receiver;
pub mod sender;
pub mod session_adapter;
pub mod store;
pub mod time;
pub mod transport;
pub mod wire;

pub use error::{CoreError, CoreResult};
pub use ratchet::CryptoProvider;

use std::sync::Arc;

use error::ValidationError;
use model::{is_reserved_peer, OwnerUserId, UserId};
use orchestrator::Orchestrator;
use receiver::Receiver;
use sender::Sender;
use session_adapter::SessionAdapter;
use store::Store;
use transport::Transport;

/// Ties the adapter, store, transport, and pipelines together for one local
/// account, plus the periodic tasks driving them. This is the type an
/// application binds its UI to; everything above this point is its own
/// dependency-free module, usable in isolation.
pub struct Client<P: CryptoProvider + 'static> {
    pub owner: OwnerUserId,
    pub sessions: Arc<SessionAdapter<P>>,
    pub store: Arc<dyn Store>,
    pub transport: Arc<dyn Transport>,
    pub events: events::EventSender,
    pub receiver: Receiver<P>,
    pub sender: Sender<P>,
    orchestrator: Orchestrator,
}

impl<P: CryptoProvider + 'static> Client<P> {
    pub fn new(
        owner: UserId,
        store: Arc<dyn Store>,
        transport: Arc<dyn Transport>,
        events: events::EventSender,
    ) -> CoreResult<Self> {
        let sessions = Arc::new(SessionAdapter::<P>::new()?);
        let receiver = Receiver::new(owner, sessions.clone(), store.clone(), transport.clone(), events.clone());
        let sender = Sender::new(owner, sessions.clone(), store.clone(), transport.clone(), events.clone());
        let orchestrator = Orchestrator::spawn(owner, sessions.clone(), store.clone(), transport.clone(), events.clone());

        Ok(Self {
            owner,
            sessions,
            store,
            transport,
            events,
            receiver,
            sender,
            orchestrator,
        })
    }

    /// The local user starts a conversation with `peer` for the first time:
    /// creates the pending, we-accepted discussion, establishes our side of
    /// the session, and posts the announcement for `peer` to discover. A
    /// failed session establishment or transport post marks the discussion
    /// `SendFailed`/`Broken` via the same path a retried send failure takes,
    /// rather than leaving nothing behind.
    pub async fn initiate_conversation(&self, peer: UserId) -> CoreResult<()> {
        if is_reserved_peer(&peer) {
            return Err(ValidationError::InvalidPeer.into());
        }

        let mut convo = discussion::new_initiated(self.owner, peer);

        let announcement = match self.sessions.establish_outgoing(peer) {
            Ok(bytes) => bytes,
            Err(e) => {
                discussion::on_announcement_send_failed(&mut convo);
                self.store.put_discussion(convo).await?;
                return Err(e);
            }
        };

        match self.transport.post_announcement(&announcement).await {
            Ok(_) => {
                self.store.put_discussion(convo).await?;
                Ok(())
            }
            Err(e) => {
                discussion::on_announcement_send_failed(&mut convo);
                self.store.put_discussion(convo).await?;
                Err(e)
            }
        }
    }
}
