use std::{
    path::PathBuf,
    sync::{Arc, LazyLock},
};

use outreach_common::{Signal, audit, internal, logging};
use outreach_control::{ControlServer, DEFAULT_CONTROL_SOCKET};
use outreach_delivery::{CampaignService, Dispatcher};
use outreach_session::{SessionConfig, SessionManager};
use outreach_store::StoreConfig;
use serde::Deserialize;
use tokio::sync::broadcast;

use crate::control_handler::OutreachControlHandler;

fn default_control_socket() -> PathBuf {
    PathBuf::from(DEFAULT_CONTROL_SOCKET)
}

/// The whole daemon, as read from `outreach.config.ron`
#[derive(Debug, Deserialize)]
pub struct Outreach {
    #[serde(default)]
    pub dispatcher: Dispatcher,

    #[serde(default)]
    pub session: SessionConfig,

    #[serde(default)]
    pub store: StoreConfig,

    /// Path of the Unix socket `outreachctl` talks to
    #[serde(default = "default_control_socket")]
    pub control_socket: PathBuf,

    #[serde(default)]
    pub audit: audit::AuditConfig,
}

impl Default for Outreach {
    fn default() -> Self {
        Self {
            dispatcher: Dispatcher::default(),
            session: SessionConfig::default(),
            store: StoreConfig::default(),
            control_socket: default_control_socket(),
            audit: audit::AuditConfig::default(),
        }
    }
}

pub static SHUTDOWN_BROADCAST: LazyLock<broadcast::Sender<Signal>> = LazyLock::new(|| {
    let (sender, _receiver) = broadcast::channel(64);
    sender
});

/// Wait for CTRL+C or SIGTERM, then tell everything to stop
#[tracing::instrument(level = "trace")]
async fn shutdown() -> anyhow::Result<()> {
    let mut terminate = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            internal!("CTRL+C entered, shutting down");
        }
        _ = terminate.recv() => {
            internal!("Terminate Signal received, shutting down");
        }
    };

    SHUTDOWN_BROADCAST
        .send(Signal::Shutdown)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Interrupted, e.to_string()))?;

    Ok(())
}

impl Outreach {
    /// Run the daemon until CTRL+C or SIGTERM
    ///
    /// # Errors
    ///
    /// This function will return an error if the store cannot be opened or the
    /// control socket cannot be bound.
    #[tracing::instrument(level = "trace", skip_all, err)]
    pub async fn run(self) -> anyhow::Result<()> {
        logging::init();
        audit::init(self.audit.clone());

        internal!("Controller running");

        let serving = self.serve(SHUTDOWN_BROADCAST.clone());
        tokio::pin!(serving);

        tokio::select! {
            r = &mut serving => return r,
            r = shutdown() => r?,
        }

        // Let the dispatcher finish the tick it is in
        let ret = serving.await;
        internal!("Shutting down...");
        ret
    }

    /// Start every component and serve until `shutdown` carries a signal
    ///
    /// # Errors
    ///
    /// Returns an error if any component fails to start.
    pub async fn serve(mut self, shutdown: broadcast::Sender<Signal>) -> anyhow::Result<()> {
        let dispatcher_shutdown = shutdown.subscribe();
        let control_shutdown = shutdown.subscribe();

        let store = self.store.build()?;
        let campaigns = Arc::new(CampaignService::new(store));

        let session = SessionManager::spawn(self.session.transport.build(), &self.session);
        match session.restore_persisted().await {
            Ok(status) if status.is_connected() => {
                internal!(level = INFO, "{}", status.message());
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!("Saved mail session was discarded: {e}");
            }
        }

        self.dispatcher.init(campaigns.clone(), session.clone())?;
        let dispatcher = Arc::new(self.dispatcher);

        let handler = Arc::new(OutreachControlHandler::new(
            campaigns,
            session.clone(),
            dispatcher.clone(),
        ));
        let control = ControlServer::new(self.control_socket, handler)?;

        let ret = tokio::try_join!(
            async {
                dispatcher
                    .serve(dispatcher_shutdown)
                    .await
                    .map_err(anyhow::Error::from)
            },
            async {
                control
                    .serve(control_shutdown)
                    .await
                    .map_err(anyhow::Error::from)
            },
        );

        if let Err(e) = session.shutdown().await {
            tracing::debug!("Session worker already stopped: {e}");
        }

        ret.map(|_| ())
    }
}
