//! Process-wide time helpers.
//!
//! Kept as one small module rather than folded into `utils::` since nothing else
//! in this crate needs a `utils` namespace once the platform/UI shims are gone.

use std::time::{SystemTime, UNIX_EPOCH};

/// Current time as Unix seconds.
pub fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock is before the Unix epoch")
        .as_secs() as i64
}

/// Current time as Unix milliseconds, used for message/discussion timestamps.
pub fn now_unix_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock is before the Unix epoch")
        .as_millis() as i64
}
