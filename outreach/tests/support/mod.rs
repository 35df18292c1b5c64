//! End-to-end test harness for the outreach daemon
//!
//! Starts a complete daemon in-process, with a snapshot store, an outbox
//! transport and a control socket inside a temporary directory, and drives it
//! the way `outreachctl` does.

#![allow(dead_code)]

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use outreach::controller::Outreach;
use outreach_common::{SessionState, Signal};
use outreach_control::{
    ControlClient, Request, RequestCommand, ResponseData, SessionCommand, SystemCommand,
};
use outreach_session::{SessionConfig, TransportConfig};
use outreach_store::StoreConfig;
use tempfile::TempDir;
use tokio::{sync::broadcast, task::JoinHandle};

pub const IDENTITY: &str = "outreach@example.com";

pub struct Harness {
    dir: TempDir,
    pub client: ControlClient,
    shutdown: broadcast::Sender<Signal>,
    handle: JoinHandle<anyhow::Result<()>>,
}

impl Harness {
    pub async fn start() -> Self {
        Self::start_in(TempDir::new().expect("Failed to create temp dir")).await
    }

    async fn start_in(dir: TempDir) -> Self {
        let socket = dir.path().join("control.sock");
        let outreach = Outreach {
            session: SessionConfig {
                connect_timeout_secs: 5,
                artifact_path: Some(dir.path().join("session.json")),
                transport: TransportConfig::Outbox {
                    directory: dir.path().join("outbox"),
                    identity: IDENTITY.to_string(),
                },
            },
            store: StoreConfig::Snapshot {
                path: dir.path().join("store.bin"),
            },
            control_socket: socket.clone(),
            ..Outreach::default()
        };

        let (shutdown, _) = broadcast::channel(8);
        let handle = tokio::spawn(outreach.serve(shutdown.clone()));

        let client = ControlClient::new(&socket).with_timeout(Duration::from_secs(5));
        let harness = Self {
            dir,
            client,
            shutdown,
            handle,
        };
        harness.wait_until_listening().await;
        harness
    }

    async fn wait_until_listening(&self) {
        let ping = || {
            self.client
                .send_request(Request::new(RequestCommand::System(SystemCommand::Ping)))
        };

        for _ in 0..100 {
            if ping().await.is_ok() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("daemon did not start listening");
    }

    /// Stop the daemon, keeping its directory
    pub async fn stop(self) -> TempDir {
        self.shutdown
            .send(Signal::Shutdown)
            .expect("daemon is not listening for shutdown");
        tokio::time::timeout(Duration::from_secs(5), self.handle)
            .await
            .expect("daemon did not stop")
            .expect("daemon task panicked")
            .expect("daemon failed");
        self.dir
    }

    /// Stop the daemon and start a fresh one on the same files
    pub async fn restart(self) -> Self {
        let dir = self.stop().await;
        Self::start_in(dir).await
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn outbox(&self) -> PathBuf {
        self.dir.path().join("outbox")
    }

    /// Every `.eml` file written so far, as text
    pub fn delivered(&self) -> Vec<String> {
        let Ok(entries) = std::fs::read_dir(self.outbox()) else {
            return Vec::new();
        };
        entries
            .filter_map(Result::ok)
            .filter(|entry| entry.path().extension().is_some_and(|ext| ext == "eml"))
            .map(|entry| std::fs::read_to_string(entry.path()).unwrap())
            .collect()
    }

    /// Run `command` and return its data, failing the test on any error
    pub async fn execute(&self, command: RequestCommand) -> ResponseData {
        self.client
            .execute(command)
            .await
            .expect("command failed")
            .expect("command returned no data")
    }

    pub async fn wait_for_session(&self, state: SessionState) {
        for _ in 0..100 {
            if let ResponseData::Session(status) = self
                .execute(RequestCommand::Session(SessionCommand::Status))
                .await
                && status.session.state == state
            {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("session never became {state}");
    }
}
