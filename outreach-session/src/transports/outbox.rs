use std::path::PathBuf;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;

use crate::{
    artifact::{SessionArtifact, StorageState},
    error::TransportError,
    transport::{LoginOutcome, MailTransport, OutboundMessage},
};

/// Transport that drops every message into a directory as an `.eml` file
///
/// Logging in needs no interaction; the resulting artifact only records the
/// identity. Restoring accepts any storage-state artifact.
#[derive(Debug)]
pub struct OutboxTransport {
    directory: PathBuf,
    default_identity: String,
    identity: RwLock<Option<String>>,
}

impl OutboxTransport {
    #[must_use]
    pub fn new(directory: PathBuf, default_identity: String) -> Self {
        Self {
            directory,
            default_identity,
            identity: RwLock::new(None),
        }
    }

    fn file_name(reference: &str) -> String {
        let stem: String = reference
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
            .collect();

        if stem.is_empty() {
            format!("{}.eml", timestamp_stem())
        } else {
            format!("{stem}.eml")
        }
    }

    fn render(from: &str, message: &OutboundMessage) -> String {
        format!(
            "From: {from}\r\nTo: {}\r\nSubject: {}\r\nDate: {}\r\nX-Outreach-Reference: {}\r\nContent-Type: text/plain; charset=utf-8\r\n\r\n{}\r\n",
            message.to,
            message.subject,
            Utc::now().to_rfc2822(),
            message.reference,
            message.body.replace('\n', "\r\n"),
        )
    }
}

fn timestamp_stem() -> String {
    Utc::now().format("%Y%m%d%H%M%S%f").to_string()
}

#[async_trait]
impl MailTransport for OutboxTransport {
    async fn login(&self) -> Result<LoginOutcome, TransportError> {
        tokio::fs::create_dir_all(&self.directory)
            .await
            .map_err(|e| TransportError::Login(format!("Cannot create outbox: {e}")))?;

        let artifact = SessionArtifact::from_state(&StorageState {
            identity: Some(self.default_identity.clone()),
            ..StorageState::default()
        })
        .map_err(|e| TransportError::Login(e.to_string()))?;

        *self.identity.write() = Some(self.default_identity.clone());

        Ok(LoginOutcome {
            identity: self.default_identity.clone(),
            artifact,
        })
    }

    async fn restore(&self, artifact: &SessionArtifact) -> Result<String, TransportError> {
        let state = artifact
            .storage_state()
            .map_err(|e| TransportError::InvalidArtifact(e.to_string()))?;
        let identity = state
            .identity
            .unwrap_or_else(|| self.default_identity.clone());

        *self.identity.write() = Some(identity.clone());
        Ok(identity)
    }

    async fn send(&self, message: &OutboundMessage) -> Result<(), TransportError> {
        let Some(from) = self.identity.read().clone() else {
            return Err(TransportError::SessionInvalid(
                "No identity is logged in".to_string(),
            ));
        };

        if !tokio::fs::try_exists(&self.directory).await.unwrap_or(false) {
            return Err(TransportError::Delivery(format!(
                "Outbox directory {} does not exist",
                self.directory.display()
            )));
        }

        let path = self.directory.join(Self::file_name(&message.reference));
        tokio::fs::write(&path, Self::render(&from, message))
            .await
            .map_err(|e| TransportError::Delivery(format!("{}: {e}", path.display())))
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.identity.write().take();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn message(reference: &str) -> OutboundMessage {
        OutboundMessage {
            reference: reference.to_string(),
            to: "ada@example.com".to_string(),
            subject: "Hello".to_string(),
            body: "Line one\nLine two".to_string(),
        }
    }

    #[tokio::test]
    async fn test_send_requires_login() {
        let dir = tempfile::tempdir().unwrap();
        let transport = OutboxTransport::new(dir.path().to_path_buf(), "me@example.com".into());

        assert!(matches!(
            transport.send(&message("job-1")).await,
            Err(TransportError::SessionInvalid(_))
        ));
    }

    #[tokio::test]
    async fn test_login_send_close() {
        let dir = tempfile::tempdir().unwrap();
        let outbox = dir.path().join("outbox");
        let transport = OutboxTransport::new(outbox.clone(), "me@example.com".into());

        let outcome = transport.login().await.unwrap();
        assert_eq!(outcome.identity, "me@example.com");

        transport.send(&message("job-1")).await.unwrap();
        let written = std::fs::read_to_string(outbox.join("job-1.eml")).unwrap();
        assert!(written.starts_with("From: me@example.com\r\nTo: ada@example.com\r\n"));
        assert!(written.contains("Line one\r\nLine two"));

        transport.close().await.unwrap();
        assert!(transport.send(&message("job-2")).await.is_err());
    }

    #[tokio::test]
    async fn test_restore_uses_artifact_identity() {
        let dir = tempfile::tempdir().unwrap();
        let transport = OutboxTransport::new(dir.path().to_path_buf(), "default@example.com".into());

        let named = SessionArtifact::new(r#"{"cookies":[],"identity":"named@example.com"}"#);
        assert_eq!(transport.restore(&named).await.unwrap(), "named@example.com");

        let anonymous = SessionArtifact::new(r#"{"cookies":[]}"#);
        assert_eq!(
            transport.restore(&anonymous).await.unwrap(),
            "default@example.com"
        );

        assert!(matches!(
            transport.restore(&SessionArtifact::new("garbage")).await,
            Err(TransportError::InvalidArtifact(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_directory_is_a_delivery_failure() {
        let dir = tempfile::tempdir().unwrap();
        let transport =
            OutboxTransport::new(dir.path().join("never-created"), "me@example.com".into());
        transport
            .restore(&SessionArtifact::new(r#"{"cookies":[]}"#))
            .await
            .unwrap();

        assert!(matches!(
            transport.send(&message("job-1")).await,
            Err(TransportError::Delivery(_))
        ));
    }

    #[test]
    fn test_file_name_is_sanitised() {
        assert_eq!(OutboxTransport::file_name("../../etc/passwd"), "etcpasswd.eml");
        assert_eq!(OutboxTransport::file_name("01ARZ3NDEK"), "01ARZ3NDEK.eml");
    }
}
