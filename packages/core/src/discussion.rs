//! Discussion state machine.
//!
//! `Discussion.status` combined with [`SessionStatus`](crate::session_adapter::SessionStatus)
//! drives observable behaviour per the trigger table: which queue an outgoing
//! message lands in, when a session renewal is due, and when a discussion is
//! considered permanently broken.

use crate::config::Config;
use crate::model::{Discussion, DiscussionDirection, DiscussionStatus};
use crate::session_adapter::SessionStatus;
use crate::time::now_unix_millis;

/// `true` exactly when the sender pipeline may hand outgoing messages to the
/// network rather than queueing them as `WAITING_SESSION`.
pub fn is_stable(discussion: &Discussion, session_status: SessionStatus) -> bool {
    discussion.status == DiscussionStatus::Active && session_status == SessionStatus::Active
}

/// Local user initiates a conversation for the first time.
pub fn new_initiated(owner: crate::model::OwnerUserId, peer: crate::model::UserId) -> Discussion {
    let now = now_unix_millis();
    Discussion {
        owner,
        peer,
        direction: DiscussionDirection::Initiated,
        status: DiscussionStatus::Pending,
        we_accepted: true,
        next_seeker: None,
        initiation_announcement: None,
        last_message_id: None,
        last_message_content: None,
        last_message_timestamp: None,
        unread_count: 0,
        created_at: now,
        updated_at: now,
        last_sync_timestamp: None,
    }
}

/// An announcement arrives from a peer we have not initiated with.
pub fn new_received(owner: crate::model::OwnerUserId, peer: crate::model::UserId) -> Discussion {
    let now = now_unix_millis();
    Discussion {
        owner,
        peer,
        direction: DiscussionDirection::Received,
        status: DiscussionStatus::Pending,
        we_accepted: false,
        next_seeker: None,
        initiation_announcement: None,
        last_message_id: None,
        last_message_content: None,
        last_message_timestamp: None,
        unread_count: 0,
        created_at: now,
        updated_at: now,
        last_sync_timestamp: None,
    }
}

/// The user accepts a received offer, or the ratchet independently reports
/// `Active`: promote the discussion.
pub fn on_session_active(discussion: &mut Discussion) {
    discussion.status = DiscussionStatus::Active;
    discussion.we_accepted = true;
    discussion.updated_at = now_unix_millis();
}

/// Encrypt attempt failed with an unrecoverable ratchet error.
pub fn on_unrecoverable_crypto_failure(discussion: &mut Discussion) {
    discussion.status = DiscussionStatus::Broken;
    discussion.updated_at = now_unix_millis();
}

/// An announcement (re)send failed. `brokenThreshold` is measured at the start
/// of this retry attempt against the `updatedAt` written by the previous
/// attempt — the resolved reading of the open question in the design notes.
pub fn on_announcement_send_failed(discussion: &mut Discussion) {
    let now = now_unix_millis();
    let elapsed = now - discussion.updated_at;
    if elapsed > Config::global().announcements.broken_threshold_ms {
        discussion.status = DiscussionStatus::Broken;
    } else {
        discussion.status = DiscussionStatus::SendFailed;
    }
    discussion.updated_at = now;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_initiated_discussion_is_pending_and_we_accepted() {
        let d = new_initiated([1u8; 32], [2u8; 32]);
        assert_eq!(d.status, DiscussionStatus::Pending);
        assert!(d.we_accepted);
        assert_eq!(d.direction, DiscussionDirection::Initiated);
    }

    #[test]
    fn new_received_discussion_awaits_consent() {
        let d = new_received([1u8; 32], [2u8; 32]);
        assert_eq!(d.status, DiscussionStatus::Pending);
        assert!(!d.we_accepted);
    }

    #[test]
    fn is_stable_requires_both_active() {
        let mut d = new_initiated([1u8; 32], [2u8; 32]);
        assert!(!is_stable(&d, SessionStatus::Active));
        d.status = DiscussionStatus::Active;
        assert!(is_stable(&d, SessionStatus::Active));
        assert!(!is_stable(&d, SessionStatus::Killed));
    }

    #[test]
    fn announcement_failure_within_threshold_is_send_failed() {
        let mut d = new_initiated([1u8; 32], [2u8; 32]);
        d.updated_at = now_unix_millis();
        on_announcement_send_failed(&mut d);
        assert_eq!(d.status, DiscussionStatus::SendFailed);
    }

    #[test]
    fn announcement_failure_past_threshold_is_broken() {
        let mut d = new_initiated([1u8; 32], [2u8; 32]);
        d.updated_at = now_unix_millis() - Config::global().announcements.broken_threshold_ms - 1;
        on_announcement_send_failed(&mut d);
        assert_eq!(d.status, DiscussionStatus::Broken);
    }
}
