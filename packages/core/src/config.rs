//! Centralized configuration for the core.
//!
//! Every tunable documented in the external-interfaces configuration surface lives
//! here, grouped by concern, behind a single process-wide singleton — the same
//! `OnceLock`-backed pattern used throughout this crate's ratchet module.

use std::sync::OnceLock;

static GLOBAL_CONFIG: OnceLock<Config> = OnceLock::new();

/// Message-board transport parameters.
#[derive(Debug, Clone)]
pub struct ProtocolConfig {
    pub base_url: String,
    pub timeout_ms: u64,
    pub retry_attempts: u32,
}

/// Orchestrator task cadence.
#[derive(Debug, Clone)]
pub struct PollingConfig {
    pub enabled: bool,
    pub messages_interval_ms: u64,
    pub announcements_interval_ms: u64,
    pub session_refresh_interval_ms: u64,
    pub resend_interval_ms: u64,
}

/// Receiver fetch-loop and duplicate-suppression parameters.
#[derive(Debug, Clone)]
pub struct MessagesConfig {
    pub fetch_delay_ms: u64,
    pub max_fetch_iterations: u32,
    pub deduplication_window_ms: i64,
    pub retry_delay_ms: i64,
}

/// Announcement polling and discussion-break parameters.
#[derive(Debug, Clone)]
pub struct AnnouncementsConfig {
    pub fetch_limit: u32,
    pub broken_threshold_ms: i64,
    pub retry_delay_ms: i64,
}

/// Session-renewal backoff parameters.
#[derive(Debug, Clone)]
pub struct SessionRecoveryConfig {
    pub killed_retry_delay_ms: i64,
    pub jitter_ms: i64,
    pub saturated_retry_delay_ms: i64,
}

/// Top-level configuration record.
#[derive(Debug, Clone)]
pub struct Config {
    pub protocol: ProtocolConfig,
    pub polling: PollingConfig,
    pub messages: MessagesConfig,
    pub announcements: AnnouncementsConfig,
    pub session_recovery: SessionRecoveryConfig,

    // Ratchet crypto parameters (read by `crate::ratchet` via `Config::global()`).
    pub pbkdf2_iterations: u32,
    pub salt_length: usize,
    pub key_length: usize,
    pub nonce_length: usize,
    pub chacha_nonce_length: usize,
    pub gcm_tag_length: usize,
    pub public_key_size: usize,
    pub signature_size: usize,
    pub classic_suite_id: u16,
    pub max_skipped_messages: u32,
    pub max_skipped_message_age_seconds: i64,
    pub prekey_cleanup_period_secs: i64,
}

impl Config {
    pub fn default() -> Self {
        Self {
            protocol: ProtocolConfig {
                base_url: String::new(),
                timeout_ms: 10_000,
                retry_attempts: 3,
            },
            polling: PollingConfig {
                enabled: false,
                messages_interval_ms: 5_000,
                announcements_interval_ms: 10_000,
                session_refresh_interval_ms: 30_000,
                resend_interval_ms: 3_000,
            },
            messages: MessagesConfig {
                fetch_delay_ms: 100,
                max_fetch_iterations: 30,
                deduplication_window_ms: 30_000,
                retry_delay_ms: 5_000,
            },
            announcements: AnnouncementsConfig {
                fetch_limit: 500,
                broken_threshold_ms: 3_600_000,
                retry_delay_ms: 15_000,
            },
            session_recovery: SessionRecoveryConfig {
                killed_retry_delay_ms: 900_000,
                jitter_ms: 120_000,
                saturated_retry_delay_ms: 300_000,
            },

            pbkdf2_iterations: 100_000,
            salt_length: 32,
            key_length: 32,
            nonce_length: 12,
            chacha_nonce_length: 12,
            gcm_tag_length: 16,
            public_key_size: 32,
            signature_size: 64,
            classic_suite_id: 1,
            max_skipped_messages: 1000,
            max_skipped_message_age_seconds: 7 * 24 * 60 * 60,
            prekey_cleanup_period_secs: 30 * 24 * 60 * 60,
        }
    }

    /// Build a configuration from defaults, overridden by recognised environment
    /// variables. Unset or unparsable variables leave the default in place.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("SEEKERBOARD_PROTOCOL_BASE_URL") {
            config.protocol.base_url = val;
        }
        if let Ok(val) = env_parse("SEEKERBOARD_PROTOCOL_TIMEOUT_MS") {
            config.protocol.timeout_ms = val;
        }
        if let Ok(val) = env_parse("SEEKERBOARD_PROTOCOL_RETRY_ATTEMPTS") {
            config.protocol.retry_attempts = val;
        }
        if let Ok(val) = env_parse("SEEKERBOARD_POLLING_ENABLED") {
            config.polling.enabled = val;
        }
        if let Ok(val) = env_parse("SEEKERBOARD_MESSAGES_MAX_FETCH_ITERATIONS") {
            config.messages.max_fetch_iterations = val;
        }
        if let Ok(val) = env_parse("SEEKERBOARD_MESSAGES_DEDUPLICATION_WINDOW_MS") {
            config.messages.deduplication_window_ms = val;
        }
        if let Ok(val) = env_parse("SEEKERBOARD_MAX_SKIPPED_MESSAGES") {
            config.max_skipped_messages = val;
        }
        if let Ok(val) = env_parse("SEEKERBOARD_MAX_SKIPPED_MESSAGE_AGE_SECONDS") {
            config.max_skipped_message_age_seconds = val;
        }
        if let Ok(val) = env_parse("SEEKERBOARD_PBKDF2_ITERATIONS") {
            config.pbkdf2_iterations = val;
        }

        config
    }

    /// Get the global instance, initializing it with defaults on first access.
    pub fn global() -> &'static Config {
        GLOBAL_CONFIG.get_or_init(Config::default)
    }

    /// Initialize the global configuration with defaults.
    ///
    /// # Errors
    /// Returns an error if the configuration was already initialized.
    pub fn init() -> Result<(), &'static str> {
        GLOBAL_CONFIG
            .set(Self::default())
            .map_err(|_| "Config already initialized")
    }

    /// Initialize the global configuration from environment variables.
    ///
    /// # Errors
    /// Returns an error if the configuration was already initialized.
    pub fn init_from_env() -> Result<(), &'static str> {
        GLOBAL_CONFIG
            .set(Self::from_env())
            .map_err(|_| "Config already initialized")
    }

    /// Initialize the global configuration with a caller-supplied instance.
    ///
    /// # Errors
    /// Returns an error if the configuration was already initialized.
    pub fn init_with(config: Config) -> Result<(), &'static str> {
        GLOBAL_CONFIG
            .set(config)
            .map_err(|_| "Config already initialized")
    }

    pub fn is_initialized() -> bool {
        GLOBAL_CONFIG.get().is_some()
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> std::result::Result<T, ()> {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).ok_or(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.protocol.timeout_ms, 10_000);
        assert_eq!(config.protocol.retry_attempts, 3);
        assert_eq!(config.polling.messages_interval_ms, 5_000);
        assert_eq!(config.polling.announcements_interval_ms, 10_000);
        assert_eq!(config.polling.session_refresh_interval_ms, 30_000);
        assert_eq!(config.messages.fetch_delay_ms, 100);
        assert_eq!(config.messages.max_fetch_iterations, 30);
        assert_eq!(config.messages.deduplication_window_ms, 30_000);
        assert_eq!(config.announcements.fetch_limit, 500);
        assert_eq!(config.announcements.broken_threshold_ms, 3_600_000);
        assert_eq!(config.session_recovery.killed_retry_delay_ms, 900_000);
        assert_eq!(config.session_recovery.jitter_ms, 120_000);
        assert_eq!(config.session_recovery.saturated_retry_delay_ms, 300_000);
        assert_eq!(config.max_skipped_messages, 1000);
        assert_eq!(config.classic_suite_id, 1);
    }

    #[test]
    fn env_override_parses_recognised_variables() {
        std::env::set_var("SEEKERBOARD_MESSAGES_MAX_FETCH_ITERATIONS", "7");
        let config = Config::from_env();
        assert_eq!(config.messages.max_fetch_iterations, 7);
        std::env::remove_var("SEEKERBOARD_MESSAGES_MAX_FETCH_ITERATIONS");
    }
}
