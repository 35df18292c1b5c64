use std::{path::PathBuf, sync::Arc};

use serde::Deserialize;

use crate::{
    transport::MailTransport,
    transports::{OutboxTransport, TestTransport},
};

const fn default_connect_timeout() -> u64 {
    120
}

/// Which transport the daemon sends through
///
/// ```ron
/// transport: Outbox(
///     directory: "/var/lib/outreach/outbox",
///     identity: "sender@example.com",
/// ),
/// ```
#[derive(Debug, Clone, Deserialize)]
pub enum TransportConfig {
    /// Write every message as an `.eml` file into a directory
    Outbox {
        directory: PathBuf,
        /// Identity used when a session artifact does not name one
        identity: String,
    },
    /// Accept everything and keep it in memory (development only)
    Test,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self::Outbox {
            directory: PathBuf::from("/tmp/outreach/outbox"),
            identity: "outreach@localhost".to_string(),
        }
    }
}

impl TransportConfig {
    #[must_use]
    pub fn build(&self) -> Arc<dyn MailTransport> {
        match self {
            Self::Outbox {
                directory,
                identity,
            } => Arc::new(OutboxTransport::new(directory.clone(), identity.clone())),
            Self::Test => Arc::new(TestTransport::new("test@localhost")),
        }
    }
}

/// Session manager configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// How long an interactive login may take before it is abandoned (in seconds)
    ///
    /// Default: 120 seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Where the captured session is kept between restarts
    ///
    /// When unset, sessions are never persisted.
    #[serde(default)]
    pub artifact_path: Option<PathBuf>,

    #[serde(default)]
    pub transport: TransportConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout(),
            artifact_path: None,
            transport: TransportConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config: SessionConfig = ron::from_str("()").unwrap();
        assert_eq!(config.connect_timeout_secs, 120);
        assert!(config.artifact_path.is_none());
        assert!(matches!(config.transport, TransportConfig::Outbox { .. }));
    }

    #[test]
    fn test_parse_full() {
        let config: SessionConfig = ron::from_str(
            r#"(
                connect_timeout_secs: 30,
                artifact_path: Some("/var/lib/outreach/session.json"),
                transport: Outbox(
                    directory: "/var/lib/outreach/outbox",
                    identity: "sender@example.com",
                ),
            )"#,
        )
        .unwrap();

        assert_eq!(config.connect_timeout_secs, 30);
        assert_eq!(
            config.artifact_path,
            Some(PathBuf::from("/var/lib/outreach/session.json"))
        );
        assert!(matches!(
            config.transport,
            TransportConfig::Outbox { ref identity, .. } if identity == "sender@example.com"
        ));
    }
}
