//! The single authenticated sending identity
//!
//! [`MailSession`] is a plain value. Only the session manager owns the live
//! copy; everyone else observes snapshots. Every transition bumps `version`,
//! which lets the manager discard the outcome of a login attempt that was
//! superseded while it was running.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailSession {
    pub state: SessionState,
    pub identity: Option<String>,
    pub established_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub version: u64,
}

impl Default for MailSession {
    fn default() -> Self {
        Self {
            state: SessionState::Disconnected,
            identity: None,
            established_at: None,
            last_error: None,
            version: 0,
        }
    }
}

impl MailSession {
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state == SessionState::Connected
    }

    #[must_use]
    pub fn is_connecting(&self) -> bool {
        self.state == SessionState::Connecting
    }

    /// A login attempt has started
    #[must_use]
    pub fn connecting(&self) -> Self {
        Self {
            state: SessionState::Connecting,
            identity: None,
            established_at: None,
            last_error: None,
            version: self.version + 1,
        }
    }

    /// A login attempt or session import succeeded
    #[must_use]
    pub fn connected(&self, identity: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            state: SessionState::Connected,
            identity: Some(identity.into()),
            established_at: Some(now),
            last_error: None,
            version: self.version + 1,
        }
    }

    /// The session ended, either on request (`error` is `None`) or because
    /// the login failed or the identity stopped being authenticated.
    #[must_use]
    pub fn disconnected(&self, error: Option<String>) -> Self {
        Self {
            state: SessionState::Disconnected,
            identity: None,
            established_at: None,
            last_error: error,
            version: self.version + 1,
        }
    }

    /// A human readable summary of the session
    #[must_use]
    pub fn message(&self) -> String {
        match (self.state, &self.last_error) {
            (SessionState::Connecting, _) => {
                "Login in progress. Complete the sign-in in the opened window.".to_string()
            }
            (SessionState::Connected, _) => {
                "Session is active. Emails will be sent using the saved session.".to_string()
            }
            (SessionState::Disconnected, Some(error)) => format!("Last attempt failed: {error}"),
            (SessionState::Disconnected, None) => {
                "No mail session. Connect to log in.".to_string()
            }
        }
    }
}
