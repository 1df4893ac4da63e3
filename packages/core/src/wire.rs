//! Plaintext payload codec.
//!
//! This is the byte format `Session::encrypt` receives and `feed_incoming` yields —
//! a length-prefixed tagged structure, independent of the ratchet's own wire framing
//! in `crate::ratchet::messaging::double_ratchet::EncryptedRatchetMessage`.

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::model::{ForwardOf, MessageId, MessageType, ReplyTo};

const TAG_MESSAGE_TYPE: u8 = 1;
const TAG_MESSAGE_ID: u8 = 2;
const TAG_CONTENT: u8 = 3;
const TAG_CITED_MSG_ID: u8 = 4;
const TAG_CITED_CONTACT_ID: u8 = 5;
const TAG_FORWARDED_CONTENT: u8 = 6;
const TAG_REPLY_FALLBACK_CONTENT: u8 = 7;
const TAG_ACKNOWLEDGED_SEEKER: u8 = 8;

/// A fully decoded plaintext payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload {
    pub message_type: MessageType,
    pub message_id: Option<MessageId>,
    pub content: String,
    pub reply_to: Option<ReplyTo>,
    pub forward_of: Option<ForwardOf>,
    /// Seekers this account has received and stored since its last outgoing
    /// message to this peer, piggybacked so the peer can promote its own
    /// matching `Sent` rows to `Delivered` (§4.4.3). Repeated field, tag 8.
    pub acknowledged_seekers: Vec<Vec<u8>>,
}

fn message_type_tag(t: MessageType) -> u8 {
    match t {
        MessageType::KeepAlive => 0,
        MessageType::Regular => 1,
        MessageType::Reply => 2,
        MessageType::Forward => 3,
    }
}

fn message_type_from_tag(tag: u8) -> CoreResult<MessageType> {
    match tag {
        0 => Ok(MessageType::KeepAlive),
        1 => Ok(MessageType::Regular),
        2 => Ok(MessageType::Reply),
        3 => Ok(MessageType::Forward),
        other => Err(CoreError::Validation(ValidationError::MalformedPlaintext(
            format!("unknown messageType tag {other}"),
        ))),
    }
}

fn write_varint(out: &mut Vec<u8>, mut value: u64) {
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            out.push(byte);
            break;
        }
        out.push(byte | 0x80);
    }
}

fn read_varint(buf: &[u8], pos: &mut usize) -> CoreResult<u64> {
    let mut result: u64 = 0;
    let mut shift = 0;
    loop {
        let byte = *buf.get(*pos).ok_or_else(|| {
            CoreError::Validation(ValidationError::MalformedPlaintext(
                "truncated varint".to_string(),
            ))
        })?;
        *pos += 1;
        result |= ((byte & 0x7f) as u64) << shift;
        if byte & 0x80 == 0 {
            break;
        }
        shift += 7;
    }
    Ok(result)
}

fn write_field_bytes(out: &mut Vec<u8>, tag: u8, bytes: &[u8]) {
    out.push(tag);
    write_varint(out, bytes.len() as u64);
    out.extend_from_slice(bytes);
}

fn read_field_bytes<'a>(buf: &'a [u8], pos: &mut usize) -> CoreResult<&'a [u8]> {
    let len = read_varint(buf, pos)? as usize;
    let end = pos
        .checked_add(len)
        .filter(|&e| e <= buf.len())
        .ok_or_else(|| {
            CoreError::Validation(ValidationError::MalformedPlaintext(
                "field length exceeds buffer".to_string(),
            ))
        })?;
    let slice = &buf[*pos..end];
    *pos = end;
    Ok(slice)
}

/// Encode a payload into the wire format. Never fails: the caller is responsible
/// for constructing a payload consistent with its `message_type`.
pub fn serialize(payload: &Payload) -> Vec<u8> {
    let mut out = Vec::new();

    out.push(TAG_MESSAGE_TYPE);
    write_varint(&mut out, message_type_tag(payload.message_type) as u64);

    if let Some(id) = payload.message_id {
        write_field_bytes(&mut out, TAG_MESSAGE_ID, &id);
    }

    write_field_bytes(&mut out, TAG_CONTENT, payload.content.as_bytes());

    if let Some(reply) = &payload.reply_to {
        write_field_bytes(&mut out, TAG_CITED_MSG_ID, &reply.original_msg_id);
        if let Some(fallback) = &reply.original_content {
            write_field_bytes(&mut out, TAG_REPLY_FALLBACK_CONTENT, fallback.as_bytes());
        }
    }

    if let Some(fwd) = &payload.forward_of {
        write_field_bytes(&mut out, TAG_CITED_CONTACT_ID, &fwd.cited_contact_id);
        write_field_bytes(
            &mut out,
            TAG_FORWARDED_CONTENT,
            fwd.forwarded_content.as_bytes(),
        );
    }

    for seeker in &payload.acknowledged_seekers {
        write_field_bytes(&mut out, TAG_ACKNOWLEDGED_SEEKER, seeker);
    }

    out
}

/// Decode a payload from the wire format. Strict: a REPLY without a 12-byte
/// `citedMsgId`, or a FORWARD missing either `forwardedContent` or a 32-byte
/// `citedContactId`, is rejected. Unknown tags are ignored.
pub fn deserialize(buf: &[u8]) -> CoreResult<Payload> {
    let mut pos = 0usize;
    let mut message_type: Option<MessageType> = None;
    let mut message_id: Option<MessageId> = None;
    let mut content: Option<String> = None;
    let mut cited_msg_id: Option<Vec<u8>> = None;
    let mut cited_contact_id: Option<Vec<u8>> = None;
    let mut forwarded_content: Option<String> = None;
    let mut reply_fallback_content: Option<String> = None;
    let mut acknowledged_seekers: Vec<Vec<u8>> = Vec::new();

    while pos < buf.len() {
        let tag = buf[pos];
        pos += 1;
        match tag {
            TAG_MESSAGE_TYPE => {
                let v = read_varint(buf, &mut pos)?;
                message_type = Some(message_type_from_tag(v as u8)?);
            }
            TAG_MESSAGE_ID => {
                message_id = Some(
                    read_field_bytes(buf, &mut pos)?
                        .try_into()
                        .map_err(|_| malformed("messageId must be 12 bytes"))?,
                );
            }
            TAG_CONTENT => {
                let bytes = read_field_bytes(buf, &mut pos)?;
                content = Some(
                    String::from_utf8(bytes.to_vec())
                        .map_err(|_| malformed("content is not valid utf-8"))?,
                );
            }
            TAG_CITED_MSG_ID => {
                cited_msg_id = Some(read_field_bytes(buf, &mut pos)?.to_vec());
            }
            TAG_CITED_CONTACT_ID => {
                cited_contact_id = Some(read_field_bytes(buf, &mut pos)?.to_vec());
            }
            TAG_REPLY_FALLBACK_CONTENT => {
                let bytes = read_field_bytes(buf, &mut pos)?;
                reply_fallback_content = Some(
                    String::from_utf8(bytes.to_vec())
                        .map_err(|_| malformed("replyFallbackContent is not valid utf-8"))?,
                );
            }
            TAG_FORWARDED_CONTENT => {
                let bytes = read_field_bytes(buf, &mut pos)?;
                forwarded_content = Some(
                    String::from_utf8(bytes.to_vec())
                        .map_err(|_| malformed("forwardedContent is not valid utf-8"))?,
                );
            }
            TAG_ACKNOWLEDGED_SEEKER => {
                acknowledged_seekers.push(read_field_bytes(buf, &mut pos)?.to_vec());
            }
            _ => {
                // Unknown tag: skip a length-prefixed field if present, otherwise bail.
                read_field_bytes(buf, &mut pos)?;
            }
        }
    }

    let message_type = message_type.ok_or_else(|| malformed("missing messageType"))?;
    let content = content.unwrap_or_default();

    let reply_to = match message_type {
        MessageType::Reply => {
            let raw = cited_msg_id.ok_or_else(|| malformed("REPLY missing citedMsgId"))?;
            let original_msg_id: MessageId = raw
                .try_into()
                .map_err(|_| malformed("citedMsgId must be 12 bytes"))?;
            Some(ReplyTo {
                original_msg_id,
                original_content: reply_fallback_content,
            })
        }
        _ => None,
    };

    let forward_of = match message_type {
        MessageType::Forward => {
            let raw =
                cited_contact_id.ok_or_else(|| malformed("FORWARD missing citedContactId"))?;
            let cited_contact_id: crate::model::UserId = raw
                .try_into()
                .map_err(|_| malformed("citedContactId must be 32 bytes"))?;
            let forwarded_content =
                forwarded_content.ok_or_else(|| malformed("FORWARD missing forwardedContent"))?;
            Some(ForwardOf {
                cited_contact_id,
                forwarded_content,
            })
        }
        _ => None,
    };

    Ok(Payload {
        message_type,
        message_id,
        content,
        reply_to,
        forward_of,
        acknowledged_seekers,
    })
}

fn malformed(msg: &str) -> CoreError {
    CoreError::Validation(ValidationError::MalformedPlaintext(msg.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn regular_message_round_trips() {
        let payload = Payload {
            message_type: MessageType::Regular,
            message_id: Some([7u8; 12]),
            content: "hello there".to_string(),
            reply_to: None,
            forward_of: None,
            acknowledged_seekers: Vec::new(),
        };
        let bytes = serialize(&payload);
        assert_eq!(deserialize(&bytes).unwrap(), payload);
    }

    #[test]
    fn keep_alive_has_no_message_id() {
        let payload = Payload {
            message_type: MessageType::KeepAlive,
            message_id: None,
            content: String::new(),
            reply_to: None,
            forward_of: None,
            acknowledged_seekers: Vec::new(),
        };
        let bytes = serialize(&payload);
        let decoded = deserialize(&bytes).unwrap();
        assert_eq!(decoded.message_id, None);
    }

    #[test]
    fn empty_content_round_trips() {
        let payload = Payload {
            message_type: MessageType::Regular,
            message_id: Some([1u8; 12]),
            content: String::new(),
            reply_to: None,
            forward_of: None,
            acknowledged_seekers: Vec::new(),
        };
        let bytes = serialize(&payload);
        assert_eq!(deserialize(&bytes).unwrap().content, "");
    }

    #[test]
    fn large_utf8_content_round_trips() {
        let content: String = "héllo wörld 日本語 🎉".repeat(2000);
        let payload = Payload {
            message_type: MessageType::Regular,
            message_id: Some([2u8; 12]),
            content: content.clone(),
            reply_to: None,
            forward_of: None,
            acknowledged_seekers: Vec::new(),
        };
        let bytes = serialize(&payload);
        assert_eq!(deserialize(&bytes).unwrap().content, content);
    }

    #[test]
    fn reply_fallback_content_round_trips_when_present() {
        let payload = Payload {
            message_type: MessageType::Reply,
            message_id: Some([5u8; 12]),
            content: "as I was saying".to_string(),
            reply_to: Some(ReplyTo {
                original_msg_id: [6u8; 12],
                original_content: Some("the original text".to_string()),
            }),
            forward_of: None,
            acknowledged_seekers: Vec::new(),
        };
        let bytes = serialize(&payload);
        let decoded = deserialize(&bytes).unwrap();
        assert_eq!(
            decoded.reply_to.unwrap().original_content.as_deref(),
            Some("the original text")
        );
    }

    #[test]
    fn reply_without_fallback_content_decodes_to_none() {
        let payload = Payload {
            message_type: MessageType::Reply,
            message_id: Some([5u8; 12]),
            content: "as I was saying".to_string(),
            reply_to: Some(ReplyTo {
                original_msg_id: [6u8; 12],
                original_content: None,
            }),
            forward_of: None,
            acknowledged_seekers: Vec::new(),
        };
        let bytes = serialize(&payload);
        let decoded = deserialize(&bytes).unwrap();
        assert_eq!(decoded.reply_to.unwrap().original_content, None);
    }

    #[test]
    fn acknowledged_seekers_round_trip() {
        let payload = Payload {
            message_type: MessageType::Regular,
            message_id: Some([1u8; 12]),
            content: "hi".to_string(),
            reply_to: None,
            forward_of: None,
            acknowledged_seekers: vec![vec![1u8; 34], vec![2u8; 34]],
        };
        let bytes = serialize(&payload);
        let decoded = deserialize(&bytes).unwrap();
        assert_eq!(decoded.acknowledged_seekers, payload.acknowledged_seekers);
    }

    #[test]
    fn payload_without_acks_decodes_to_empty_vec() {
        let payload = Payload {
            message_type: MessageType::Regular,
            message_id: Some([1u8; 12]),
            content: "hi".to_string(),
            reply_to: None,
            forward_of: None,
            acknowledged_seekers: Vec::new(),
        };
        let bytes = serialize(&payload);
        let decoded = deserialize(&bytes).unwrap();
        assert!(decoded.acknowledged_seekers.is_empty());
    }

    #[test]
    fn reply_without_cited_msg_id_is_rejected() {
        let mut out = Vec::new();
        out.push(TAG_MESSAGE_TYPE);
        write_varint(&mut out, 2);
        write_field_bytes(&mut out, TAG_CONTENT, b"hi");
        assert!(deserialize(&out).is_err());
    }

    #[test]
    fn forward_missing_contact_id_is_rejected() {
        let mut out = Vec::new();
        out.push(TAG_MESSAGE_TYPE);
        write_varint(&mut out, 3);
        write_field_bytes(&mut out, TAG_CONTENT, b"");
        write_field_bytes(&mut out, TAG_FORWARDED_CONTENT, b"fwd");
        assert!(deserialize(&out).is_err());
    }

    #[test]
    fn unknown_tag_is_ignored() {
        let mut out = Vec::new();
        out.push(TAG_MESSAGE_TYPE);
        write_varint(&mut out, 1);
        write_field_bytes(&mut out, TAG_MESSAGE_ID, &[9u8; 12]);
        write_field_bytes(&mut out, TAG_CONTENT, b"hi");
        write_field_bytes(&mut out, 42, b"ignore me");
        let decoded = deserialize(&out).unwrap();
        assert_eq!(decoded.content, "hi");
    }
}
