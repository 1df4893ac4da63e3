//! Persisted data model.
//!
//! Every enum that the original design calls a "closed enumeration" — message
//! status, discussion status, session status, message type — is modeled as a sum
//! type here rather than a string, so the compiler enforces exhaustive handling at
//! every match site.

use serde::{Deserialize, Serialize};

/// Opaque 32-byte account identifier.
pub type UserId = [u8; 32];

/// The local account's own [`UserId`]; used to partition every row.
pub type OwnerUserId = UserId;

/// Opaque ~34-byte token produced by the ratchet, addressing a message-board slot.
pub type Seeker = Vec<u8>;

/// 12-byte random token embedded in a plaintext payload, used to resolve replies.
pub type MessageId = [u8; 12];

/// A known peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    pub owner: OwnerUserId,
    pub peer: UserId,
    pub display_name: String,
    /// Serialized X3DH registration bundle for this peer.
    pub public_keys_blob: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiscussionDirection {
    Initiated,
    Received,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiscussionStatus {
    Pending,
    Active,
    SendFailed,
    Broken,
}

/// A conversation with exactly one peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Discussion {
    pub owner: OwnerUserId,
    pub peer: UserId,
    pub direction: DiscussionDirection,
    pub status: DiscussionStatus,
    pub we_accepted: bool,
    pub next_seeker: Option<Seeker>,
    pub initiation_announcement: Option<Vec<u8>>,
    pub last_message_id: Option<MessageId>,
    pub last_message_content: Option<String>,
    pub last_message_timestamp: Option<i64>,
    pub unread_count: u32,
    pub created_at: i64,
    pub updated_at: i64,
    pub last_sync_timestamp: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageDirection {
    In,
    Out,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageType {
    KeepAlive,
    Regular,
    Reply,
    Forward,
}

/// Lifecycle of an outgoing message (§4.5); incoming messages are created
/// directly in `Delivered` and never transition further.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageStatus {
    WaitingSession,
    Ready,
    Sending,
    Sent,
    Delivered,
    Failed,
}

/// Resolved or fallback reply reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyTo {
    pub original_msg_id: MessageId,
    /// Populated only when `original_msg_id` could not be resolved locally.
    pub original_content: Option<String>,
}

/// Forwarded-content reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForwardOf {
    pub cited_contact_id: UserId,
    pub forwarded_content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub owner: OwnerUserId,
    pub peer: UserId,
    pub direction: MessageDirection,
    pub status: MessageStatus,
    pub message_type: MessageType,
    pub content: String,
    /// Encoded plaintext payload (§6), cached so retries don't re-serialize.
    pub serialized_content: Option<Vec<u8>>,
    pub seeker: Option<Seeker>,
    pub ciphertext: Option<Vec<u8>>,
    pub message_id: Option<MessageId>,
    pub reply_to: Option<ReplyTo>,
    pub forward_of: Option<ForwardOf>,
    pub timestamp: i64,
    pub when_to_send: Option<i64>,
}

impl Message {
    pub fn is_outgoing(&self) -> bool {
        matches!(self.direction, MessageDirection::Out)
    }
}

/// Intermediate buffer for ciphertexts pulled by the receiver but not yet decrypted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingEncryptedMessage {
    pub owner: OwnerUserId,
    pub seeker: Seeker,
    pub ciphertext: Vec<u8>,
    pub fetched_at: i64,
}

/// The current read-seeker set last observed from the ratchet, wholly replaced
/// at the end of each fetch round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveSeeker {
    pub owner: OwnerUserId,
    pub seeker: Seeker,
}

/// `true` for the reserved all-zero identifier, which can't name a real account
/// and is rejected at the send/initiate boundary.
pub fn is_reserved_peer(peer: &UserId) -> bool {
    *peer == [0u8; 32]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_peer_is_reserved() {
        assert!(is_reserved_peer(&[0u8; 32]));
        assert!(!is_reserved_peer(&[1u8; 32]));
    }

    #[test]
    fn message_direction_roundtrips_through_bincode() {
        let msg = Message {
            owner: [1u8; 32],
            peer: [2u8; 32],
            direction: MessageDirection::Out,
            status: MessageStatus::Ready,
            message_type: MessageType::Regular,
            content: "hi".to_string(),
            serialized_content: None,
            seeker: None,
            ciphertext: None,
            message_id: Some([3u8; 12]),
            reply_to: None,
            forward_of: None,
            timestamp: 1000,
            when_to_send: None,
        };
        let bytes = bincode::serialize(&msg).expect("serialize");
        let decoded: Message = bincode::deserialize(&bytes).expect("deserialize");
        assert_eq!(decoded, msg);
    }

    #[test]
    fn is_outgoing_matches_direction() {
        let mut msg = Message {
            owner: [0u8; 32],
            peer: [0u8; 32],
            direction: MessageDirection::In,
            status: MessageStatus::Delivered,
            message_type: MessageType::Regular,
            content: String::new(),
            serialized_content: None,
            seeker: None,
            ciphertext: None,
            message_id: None,
            reply_to: None,
            forward_of: None,
            timestamp: 0,
            when_to_send: None,
        };
        assert!(!msg.is_outgoing());
        msg.direction = MessageDirection::Out;
        assert!(msg.is_outgoing());
    }
}
