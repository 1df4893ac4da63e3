//! Vendored ratchet engine: X3DH handshake + Double Ratchet messaging.
//!
//! ```text
//! Session<P, H, M>
//!   ├── H: KeyAgreement<P>     (X3DH)
//!   └── M: SecureMessaging<P>  (Double Ratchet)
//!         └── P: CryptoProvider (Classic: X25519 / Ed25519 / ChaCha20Poly1305 / HKDF-SHA256)
//! ```
//!
//! This module is treated as a consumed dependency by the rest of the crate: the
//! `session_adapter` module wraps `Session` and adds seeker derivation, but nothing
//! here knows about seekers, discussions, or the message-board transport.

pub mod provider;
pub mod keys;
pub mod handshake;
pub mod messaging;
pub mod seeker;
pub mod session_api;
pub mod suites;

pub use provider::CryptoProvider;
pub use seeker::derive_seeker;
pub use session_api::{ClassicSession, Session};

/// Identifies which concrete cipher suite produced a given session or message.
pub type SuiteID = u16;

pub const CLASSIC_SUITE_ID: SuiteID = 1;
