//! Audit logging for campaign and delivery events
//!
//! ## Audit Events
//!
//! - `CampaignTransition`: A campaign was launched, paused, resumed, completed or reopened
//! - `JobRetried`: A failed or skipped job was put back on the schedule
//! - `SendAttempt`: The dispatcher handed a job to the mail session
//! - `SendSuccess`: The mail session accepted the message
//! - `SendFailure`: The message could not be sent
//! - `SessionChanged`: The mail session changed state
//!
//! Recipient addresses can be redacted through [`AuditConfig`].

use std::sync::{Arc, OnceLock};

use serde::{Deserialize, Serialize};

/// Audit logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    /// Enable audit logging
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Redact the local part of recipient addresses
    #[serde(default)]
    pub redact_recipients: bool,

    /// Redact the connected sending identity
    #[serde(default)]
    pub redact_identity: bool,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            redact_recipients: false,
            redact_identity: false,
        }
    }
}

const fn default_true() -> bool {
    true
}

static AUDIT_CONFIG: OnceLock<Arc<AuditConfig>> = OnceLock::new();

/// Initialize audit logging with configuration
pub fn init(config: AuditConfig) {
    AUDIT_CONFIG.get_or_init(|| Arc::new(config));
}

/// Get the current audit configuration
#[must_use]
pub fn config() -> Arc<AuditConfig> {
    AUDIT_CONFIG
        .get()
        .cloned()
        .unwrap_or_else(|| Arc::new(AuditConfig::default()))
}

/// Redact email address if redaction is enabled
#[must_use]
pub fn redact_email(email: &str, redact: bool) -> String {
    if redact {
        // Keep domain but redact local part
        if let Some((_, domain)) = email.split_once('@') {
            format!("[REDACTED]@{domain}")
        } else {
            "[REDACTED]".to_string()
        }
    } else {
        email.to_string()
    }
}

pub fn log_campaign_transition(campaign_id: &str, action: &str, status: &str) {
    let config = config();
    if !config.enabled {
        return;
    }

    tracing::event!(
        tracing::Level::INFO,
        event = "CampaignTransition",
        campaign_id = %campaign_id,
        action = %action,
        status = %status,
        "Audit: Campaign {action}"
    );
}

pub fn log_job_retried(job_id: &str, campaign_id: &str) {
    let config = config();
    if !config.enabled {
        return;
    }

    tracing::event!(
        tracing::Level::INFO,
        event = "JobRetried",
        job_id = %job_id,
        campaign_id = %campaign_id,
        "Audit: Job retried"
    );
}

pub fn log_send_attempt(job_id: &str, recipient: &str, step: u32) {
    let config = config();
    if !config.enabled {
        return;
    }

    tracing::event!(
        tracing::Level::INFO,
        event = "SendAttempt",
        job_id = %job_id,
        recipient = %redact_email(recipient, config.redact_recipients),
        step = step,
        "Audit: Send attempt"
    );
}

pub fn log_send_success(job_id: &str, recipient: &str, duration_ms: u128) {
    let config = config();
    if !config.enabled {
        return;
    }

    tracing::event!(
        tracing::Level::INFO,
        event = "SendSuccess",
        job_id = %job_id,
        recipient = %redact_email(recipient, config.redact_recipients),
        duration_ms = duration_ms,
        "Audit: Send successful"
    );
}

/// `kind` distinguishes a failure of the message from a failure of the session
pub fn log_send_failure(job_id: &str, recipient: &str, error: &str, kind: &str) {
    let config = config();
    if !config.enabled {
        return;
    }

    tracing::event!(
        tracing::Level::WARN,
        event = "SendFailure",
        job_id = %job_id,
        recipient = %redact_email(recipient, config.redact_recipients),
        error = %error,
        kind = %kind,
        "Audit: Send failed"
    );
}

pub fn log_session_changed(state: &str, identity: Option<&str>, error: Option<&str>) {
    let config = config();
    if !config.enabled {
        return;
    }

    let identity = identity.map(|i| redact_email(i, config.redact_identity));

    tracing::event!(
        tracing::Level::INFO,
        event = "SessionChanged",
        state = %state,
        identity = ?identity,
        error = ?error,
        "Audit: Mail session {state}"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redact_email() {
        assert_eq!(
            redact_email("user@example.com", true),
            "[REDACTED]@example.com"
        );
        assert_eq!(redact_email("user@example.com", false), "user@example.com");
        assert_eq!(redact_email("invalid", true), "[REDACTED]");
    }

    #[test]
    fn test_default_config() {
        let config = AuditConfig::default();
        assert!(config.enabled);
        assert!(!config.redact_recipients);
        assert!(!config.redact_identity);
    }

    #[test]
    fn test_audit_disabled() {
        init(AuditConfig {
            enabled: false,
            redact_recipients: true,
            redact_identity: true,
        });

        log_campaign_transition("c", "launch", "active");
        log_job_retried("j", "c");
        log_send_attempt("j", "rcpt@example.com", 1);
        log_send_success("j", "rcpt@example.com", 12);
        log_send_failure("j", "rcpt@example.com", "timeout", "transport");
        log_session_changed("connected", Some("me@example.com"), None);
    }
}
