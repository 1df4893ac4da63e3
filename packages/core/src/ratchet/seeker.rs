//! Seeker derivation.
//!
//! Message-board addressing has no notion of a connection-routed recipient id;
//! the slot a ciphertext is posted under must be computable by
//! both peers without exchanging anything beyond what the ratchet already carries,
//! so it is derived with HKDF-SHA256 from the session id, the sender's current DH
//! ratchet public key, and the chain position — the same three pieces of state
//! both sides of a Double Ratchet conversation already hold in lockstep.

use hkdf::Hkdf;
use sha2::Sha256;

/// Length of a derived seeker, matching the ~34-byte opaque token the design calls
/// for (32-byte HKDF output plus a 2-byte chain-position tag for collision spread
/// across ratchet steps).
pub const SEEKER_LEN: usize = 34;

/// Derive the seeker a message posted at `chain_length` in the sender's sending
/// chain — or expected at `chain_length` in the receiver's matching receiving
/// chain — would be addressed under.
///
/// `dh_public` is the sender's DH ratchet public key at the time of the send (the
/// receiver recovers the same bytes from the peer's last-known ratchet key, or
/// from the `dh_public_key` field carried on the wire message itself).
pub fn derive_seeker(session_id: &str, dh_public: &[u8], chain_length: u32) -> Vec<u8> {
    let hk = Hkdf::<Sha256>::new(Some(session_id.as_bytes()), dh_public);
    let mut okm = [0u8; 32];
    let info = b"seekerboard-seeker-v1";
    hk.expand(info, &mut okm)
        .expect("32 is a valid HKDF-SHA256 output length");

    let mut seeker = Vec::with_capacity(SEEKER_LEN);
    seeker.extend_from_slice(&okm);
    seeker.extend_from_slice(&chain_length.to_be_bytes()[2..]);
    seeker
}
