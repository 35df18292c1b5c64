//! The session manager and its worker task

use std::{path::PathBuf, sync::Arc, time::Duration};

use chrono::Utc;
use outreach_common::{MailSession, SessionState, audit, internal, outgoing};
use tokio::{
    sync::{mpsc, oneshot, watch},
    task::JoinHandle,
};

use crate::{
    artifact::SessionArtifact,
    config::SessionConfig,
    error::{SessionError, TransportError},
    transport::{LoginOutcome, MailTransport, OutboundMessage},
};

const COMMAND_BUFFER: usize = 64;

enum Command {
    Connect {
        reply: oneshot::Sender<MailSession>,
    },
    Import {
        artifact: SessionArtifact,
        reply: oneshot::Sender<Result<MailSession, SessionError>>,
    },
    RestorePersisted {
        reply: oneshot::Sender<Result<MailSession, SessionError>>,
    },
    Send {
        message: OutboundMessage,
        reply: oneshot::Sender<Result<(), SessionError>>,
    },
    Disconnect {
        reply: oneshot::Sender<MailSession>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// Outcome of a background login, tagged with the session version it was started for
struct LoginFinished {
    version: u64,
    result: Result<LoginOutcome, String>,
}

/// Handle to the session worker
///
/// Cheap to clone. Every mutating call is queued to the worker and answered
/// once the worker has processed it; [`SessionManager::status`] reads the
/// last published snapshot without queueing.
#[derive(Debug, Clone)]
pub struct SessionManager {
    commands: mpsc::Sender<Command>,
    status: watch::Receiver<MailSession>,
}

impl SessionManager {
    /// Start the worker on the current tokio runtime
    #[must_use]
    pub fn spawn(transport: Arc<dyn MailTransport>, config: &SessionConfig) -> Self {
        let (commands_tx, commands_rx) = mpsc::channel(COMMAND_BUFFER);
        let (logins_tx, logins_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(MailSession::default());

        let worker = Worker {
            transport,
            connect_timeout: Duration::from_secs(config.connect_timeout_secs),
            artifact_path: config.artifact_path.clone(),
            session: MailSession::default(),
            status: status_tx,
            login: None,
            logins: logins_tx,
        };
        tokio::spawn(worker.run(commands_rx, logins_rx));

        Self {
            commands: commands_tx,
            status: status_rx,
        }
    }

    /// Latest session snapshot
    #[must_use]
    pub fn status(&self) -> MailSession {
        self.status.borrow().clone()
    }

    /// Watch session changes
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<MailSession> {
        self.status.clone()
    }

    /// Start an interactive login and return immediately
    ///
    /// The returned snapshot is `Connecting` for a fresh attempt. While an
    /// attempt is already running, or a session is already connected, nothing
    /// new is started and the current snapshot is returned.
    pub async fn connect(&self) -> Result<MailSession, SessionError> {
        self.request(|reply| Command::Connect { reply }).await
    }

    /// Restore a captured session directly into `Connected`, superseding any
    /// login still in progress
    pub async fn import_session(
        &self,
        artifact: SessionArtifact,
    ) -> Result<MailSession, SessionError> {
        self.request(|reply| Command::Import { artifact, reply })
            .await?
    }

    /// Restore the session saved by a previous run, if there is one
    pub async fn restore_persisted(&self) -> Result<MailSession, SessionError> {
        self.request(|reply| Command::RestorePersisted { reply })
            .await?
    }

    /// Send one message as the connected identity
    ///
    /// # Errors
    ///
    /// - [`SessionError::NotConnected`] if there is no connected session
    /// - [`SessionError::SessionInvalid`] if the identity turned out to be
    ///   logged out; the session is `Disconnected` afterwards
    /// - [`SessionError::Transport`] if only this message failed
    pub async fn send(&self, message: OutboundMessage) -> Result<(), SessionError> {
        self.request(|reply| Command::Send { message, reply })
            .await?
    }

    /// End the session. Always succeeds, and is a no-op when already disconnected.
    pub async fn disconnect(&self) -> Result<MailSession, SessionError> {
        self.request(|reply| Command::Disconnect { reply }).await
    }

    /// Stop the worker, abandoning any login in progress
    pub async fn shutdown(&self) -> Result<(), SessionError> {
        self.request(|reply| Command::Shutdown { reply }).await
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, SessionError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(make(reply))
            .await
            .map_err(|_| SessionError::WorkerGone)?;
        response.await.map_err(|_| SessionError::WorkerGone)
    }
}

struct Worker {
    transport: Arc<dyn MailTransport>,
    connect_timeout: Duration,
    artifact_path: Option<PathBuf>,
    session: MailSession,
    status: watch::Sender<MailSession>,
    login: Option<JoinHandle<()>>,
    logins: mpsc::UnboundedSender<LoginFinished>,
}

impl Worker {
    #[tracing::instrument(level = "trace", skip_all)]
    async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut logins: mpsc::UnboundedReceiver<LoginFinished>,
    ) {
        internal!("Session worker started");

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Shutdown { reply }) => {
                        let _ = reply.send(());
                        break;
                    }
                    Some(command) => self.handle(command).await,
                    None => break,
                },
                Some(finished) = logins.recv() => self.login_finished(finished).await,
            }
        }

        self.abort_login();
        internal!("Session worker stopped");
    }

    async fn handle(&mut self, command: Command) {
        match command {
            Command::Connect { reply } => {
                let _ = reply.send(self.connect());
            }
            Command::Import { artifact, reply } => {
                let _ = reply.send(self.import(artifact).await);
            }
            Command::RestorePersisted { reply } => {
                let _ = reply.send(self.restore_persisted().await);
            }
            Command::Send { message, reply } => {
                let _ = reply.send(self.send(message).await);
            }
            Command::Disconnect { reply } => {
                let _ = reply.send(self.disconnect().await);
            }
            Command::Shutdown { reply } => {
                let _ = reply.send(());
            }
        }
    }

    fn publish(&mut self, next: MailSession) {
        internal!(
            level = DEBUG,
            "Mail session {} -> {} (version {})",
            self.session.state,
            next.state,
            next.version
        );
        audit::log_session_changed(
            &next.state.to_string(),
            next.identity.as_deref(),
            next.last_error.as_deref(),
        );

        self.session = next;
        self.status.send_replace(self.session.clone());
    }

    fn abort_login(&mut self) {
        if let Some(login) = self.login.take() {
            login.abort();
        }
    }

    fn connect(&mut self) -> MailSession {
        if self.session.state != SessionState::Disconnected {
            return self.session.clone();
        }

        self.publish(self.session.connecting());

        let version = self.session.version;
        let transport = self.transport.clone();
        let timeout = self.connect_timeout;
        let logins = self.logins.clone();

        self.login = Some(tokio::spawn(async move {
            let result = match tokio::time::timeout(timeout, transport.login()).await {
                Ok(Ok(outcome)) => Ok(outcome),
                Ok(Err(e)) => Err(e.to_string()),
                Err(_) => Err(format!(
                    "Login timed out after {}s. Connect again and complete the sign-in.",
                    timeout.as_secs()
                )),
            };
            let _ = logins.send(LoginFinished { version, result });
        }));

        self.session.clone()
    }

    async fn login_finished(&mut self, finished: LoginFinished) {
        if finished.version != self.session.version || !self.session.is_connecting() {
            internal!(
                level = DEBUG,
                "Ignoring login result for superseded session version {}",
                finished.version
            );
            return;
        }

        self.login = None;

        match finished.result {
            Ok(outcome) => {
                self.persist(&outcome.artifact).await;
                self.publish(self.session.connected(outcome.identity, Utc::now()));
            }
            Err(error) => {
                tracing::warn!("Login failed: {error}");
                self.publish(self.session.disconnected(Some(error)));
            }
        }
    }

    async fn import(&mut self, artifact: SessionArtifact) -> Result<MailSession, SessionError> {
        let was_connecting = self.session.is_connecting();
        self.abort_login();

        match self.transport.restore(&artifact).await {
            Ok(identity) => {
                self.persist(&artifact).await;
                self.publish(self.session.connected(identity, Utc::now()));
                Ok(self.session.clone())
            }
            Err(e) => {
                if was_connecting || self.session.state == SessionState::Disconnected {
                    self.publish(self.session.disconnected(Some(e.to_string())));
                }
                Err(e.into())
            }
        }
    }

    async fn restore_persisted(&mut self) -> Result<MailSession, SessionError> {
        let Some(path) = self.artifact_path.clone() else {
            return Ok(self.session.clone());
        };
        if self.session.state != SessionState::Disconnected
            || !tokio::fs::try_exists(&path).await.unwrap_or(false)
        {
            return Ok(self.session.clone());
        }

        let artifact = SessionArtifact::new(tokio::fs::read_to_string(&path).await?);
        match self.transport.restore(&artifact).await {
            Ok(identity) => {
                internal!(
                    level = INFO,
                    "Restored saved mail session from {}",
                    path.display()
                );
                self.publish(self.session.connected(identity, Utc::now()));
                Ok(self.session.clone())
            }
            Err(e) => {
                self.forget_artifact().await;
                self.publish(
                    self.session
                        .disconnected(Some(format!("Saved session could not be restored: {e}"))),
                );
                Err(e.into())
            }
        }
    }

    async fn send(&mut self, message: OutboundMessage) -> Result<(), SessionError> {
        if !self.session.is_connected() {
            return Err(SessionError::NotConnected(self.session.state));
        }

        outgoing!(
            level = DEBUG,
            "Sending {} to {}",
            message.reference,
            message.to
        );

        match self.transport.send(&message).await {
            Ok(()) => Ok(()),
            Err(TransportError::SessionInvalid(reason)) => {
                tracing::warn!("Mail session was invalidated while sending: {reason}");
                if let Err(e) = self.transport.close().await {
                    tracing::debug!("Closing invalidated session failed: {e}");
                }
                self.forget_artifact().await;
                self.publish(self.session.disconnected(Some(reason.clone())));
                Err(SessionError::SessionInvalid(reason))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn disconnect(&mut self) -> MailSession {
        self.abort_login();
        self.forget_artifact().await;

        if self.session.state == SessionState::Disconnected {
            return self.session.clone();
        }

        if self.session.is_connected()
            && let Err(e) = self.transport.close().await
        {
            tracing::warn!("Closing mail session failed: {e}");
        }

        self.publish(self.session.disconnected(None));
        self.session.clone()
    }

    async fn persist(&self, artifact: &SessionArtifact) {
        let Some(path) = &self.artifact_path else {
            return;
        };

        if let Err(e) = write_artifact(path, artifact).await {
            tracing::warn!(
                "Unable to save mail session to {}: {e}",
                path.display()
            );
        }
    }

    async fn forget_artifact(&self) {
        let Some(path) = &self.artifact_path else {
            return;
        };

        match tokio::fs::remove_file(path).await {
            Ok(()) => internal!("Removed saved mail session {}", path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(
                "Unable to remove saved mail session {}: {e}",
                path.display()
            ),
        }
    }
}

async fn write_artifact(path: &std::path::Path, artifact: &SessionArtifact) -> std::io::Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent).await?;
    }

    tokio::fs::write(path, artifact.as_str()).await?;

    // The artifact grants access to the mailbox
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)).await?;
    }

    Ok(())
}
