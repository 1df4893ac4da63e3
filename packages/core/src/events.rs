//! Outbound notifications emitted by the core, drained by the embedding application.
//!
//! Always emitted after releasing any store write lock, so a handler that calls
//! back into the core cannot deadlock against it.

use crate::error::CoreError;
use crate::model::{MessageId, UserId};

#[derive(Debug, Clone)]
pub enum CoreEvent {
    OnMessageReceived {
        peer: UserId,
        message_id: Option<MessageId>,
    },
    OnMessageSent {
        peer: UserId,
        message_id: Option<MessageId>,
    },
    OnMessageFailed {
        peer: UserId,
        message_id: Option<MessageId>,
    },
    OnSessionRenewalNeeded {
        peer: UserId,
    },
    OnSessionAcceptNeeded {
        peer: UserId,
    },
    OnError {
        error: String,
    },
}

/// Sink the rest of the core emits [`CoreEvent`]s into.
pub type EventSender = tokio::sync::mpsc::UnboundedSender<CoreEvent>;

pub(crate) fn emit(sender: &EventSender, event: CoreEvent) {
    if sender.send(event).is_err() {
        tracing::warn!(target: "events", "event receiver dropped, discarding event");
    }
}

pub(crate) fn emit_error(sender: &EventSender, err: &CoreError) {
    tracing::error!(target: "events", error = %err, "core error");
    emit(
        sender,
        CoreEvent::OnError {
            error: err.to_string(),
        },
    );
}
