use serde::{Deserialize, Serialize};
use std::time::Duration;
use validator::Validate;

/// Stored payload of a pending confirmation token.
///
/// The code itself is the lookup key and is never part of the payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmationToken {
    pub uid: u64,
    pub email: String,
}

/// Options for sending a validation email
#[derive(Debug, Clone, Default, Validate)]
pub struct SendOptions {
    /// Overrides email retrieval from the account record
    #[validate(email)]
    pub email: Option<String>,
    /// Send even if it is too soon to send another
    pub force: bool,
    /// Overrides the mail subject
    pub subject: Option<String>,
    /// Changes the template used for rendering
    pub template: Option<String>,
}

impl SendOptions {
    /// Target an explicit address instead of the account's current email
    pub fn with_email(email: impl Into<String>) -> Self {
        Self {
            email: Some(email.into()),
            ..Default::default()
        }
    }

    /// Bypass the resend throttle
    pub fn forced() -> Self {
        Self {
            force: true,
            ..Default::default()
        }
    }
}

/// Outgoing verification payload, passed through the verify hooks before
/// rendering and delivery
#[derive(Debug, Clone, Serialize)]
pub struct VerifyPayload {
    pub uid: u64,
    pub username: Option<String>,
    pub email: String,
    pub confirm_code: String,
    pub confirm_link: String,
    pub subject: String,
    pub template: String,
}

/// One confirmed address in an account's append-only email history
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailHistoryEntry {
    pub email: String,
    /// Milliseconds since the Unix epoch
    pub recorded_at: i64,
}

const MINUTE: u64 = 60;
const DAY: u64 = 24 * 60 * 60;

/// Configuration for the confirmation subsystem
#[derive(Debug, Clone)]
pub struct ConfirmConfig {
    /// Confirmation token lifetime
    pub expiry: Duration,
    /// Minimum spacing between validation emails for the same account
    pub interval: Duration,
    /// Master switch for outgoing validation emails
    pub send_validation_email: bool,
    /// Base URL used to build confirmation links
    pub base_url: String,
}

impl ConfirmConfig {
    pub fn new(expiry_days: u64, interval_minutes: u64) -> Self {
        Self {
            expiry: Duration::from_secs(expiry_days * DAY),
            interval: Duration::from_secs(interval_minutes * MINUTE),
            ..Default::default()
        }
    }

    /// Load configuration from environment variables, falling back to the
    /// defaults for anything unset.
    ///
    /// Environment variables: `EMAIL_CONFIRM_EXPIRY_DAYS`,
    /// `EMAIL_CONFIRM_INTERVAL_MINUTES`, `SEND_VALIDATION_EMAIL`, `BASE_URL`.
    pub fn from_env() -> Self {
        let expiry_days: u64 = std::env::var("EMAIL_CONFIRM_EXPIRY_DAYS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(1);
        let interval_minutes: u64 = std::env::var("EMAIL_CONFIRM_INTERVAL_MINUTES")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(10);
        let send_validation_email = std::env::var("SEND_VALIDATION_EMAIL")
            .map(|v| v != "0" && v != "false")
            .unwrap_or(true);
        let base_url =
            std::env::var("BASE_URL").unwrap_or_else(|_| "http://localhost:3000".to_string());

        Self {
            expiry: Duration::from_secs(expiry_days * DAY),
            interval: Duration::from_secs(interval_minutes * MINUTE),
            send_validation_email,
            base_url,
        }
    }

    /// The configured send interval, in whole minutes (for user messaging)
    pub fn interval_minutes(&self) -> u64 {
        self.interval.as_secs() / MINUTE
    }

    /// Build the confirmation link for a code
    pub fn confirm_link(&self, code: &str) -> String {
        format!("{}/confirm/{}", self.base_url.trim_end_matches('/'), code)
    }
}

impl Default for ConfirmConfig {
    fn default() -> Self {
        Self {
            expiry: Duration::from_secs(DAY),
            interval: Duration::from_secs(10 * MINUTE),
            send_validation_email: true,
            base_url: "http://localhost:3000".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ConfirmConfig::default();
        assert_eq!(config.expiry, Duration::from_secs(24 * 60 * 60));
        assert_eq!(config.interval_minutes(), 10);
        assert!(config.send_validation_email);
    }

    #[test]
    fn test_confirm_link_trims_trailing_slash() {
        let config = ConfirmConfig {
            base_url: "https://forum.example.com/".to_string(),
            ..Default::default()
        };
        assert_eq!(
            config.confirm_link("abc123"),
            "https://forum.example.com/confirm/abc123"
        );
    }

    #[test]
    fn test_send_options_validation() {
        use validator::Validate;

        assert!(SendOptions::with_email("user@example.com").validate().is_ok());
        assert!(SendOptions::with_email("not-an-email").validate().is_err());
        // No explicit email is fine; the account's own address is used
        assert!(SendOptions::default().validate().is_ok());
    }
}
