//! Control server implementation

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;
use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use async_trait::async_trait;
use outreach_common::Signal;
use outreach_delivery::ErrorKind;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{UnixListener, UnixStream},
    sync::broadcast,
};
use tracing::{debug, error, info, trace, warn};

use crate::{ControlError, PROTOCOL_VERSION, Request, Response, Result};

/// Largest request the server will read
const MAX_REQUEST_SIZE: u32 = 1_000_000;

const IO_TIMEOUT: Duration = Duration::from_secs(30);

/// Handler trait for processing control requests
#[async_trait]
pub trait CommandHandler: Send + Sync {
    /// Handle a request and return a response
    ///
    /// Rejections the caller should see belong in an error [`Response`];
    /// an `Err` is reported to the client as a system error.
    ///
    /// # Errors
    ///
    /// Returns an error if the command cannot be processed at all
    async fn handle_request(&self, request: Request) -> Result<Response>;
}

/// Control server for managing the engine via a Unix domain socket
pub struct ControlServer {
    socket_path: PathBuf,
    handler: Arc<dyn CommandHandler>,
}

impl ControlServer {
    /// Create a new control server
    ///
    /// # Errors
    ///
    /// Returns an error if the socket path is empty
    pub fn new(socket_path: impl Into<PathBuf>, handler: Arc<dyn CommandHandler>) -> Result<Self> {
        let socket_path = socket_path.into();
        if socket_path.as_os_str().is_empty() {
            return Err(ControlError::InvalidSocketPath(
                "Control socket path is empty".to_string(),
            ));
        }

        Ok(Self {
            socket_path,
            handler,
        })
    }

    #[must_use]
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Remove a socket file left behind by a process that is gone
    async fn claim_socket(&self) -> Result<()> {
        if !self.socket_path.exists() {
            return Ok(());
        }

        if UnixStream::connect(&self.socket_path).await.is_ok() {
            return Err(ControlError::Io(std::io::Error::new(
                std::io::ErrorKind::AddrInUse,
                format!(
                    "Socket already in use by running instance: {}",
                    self.socket_path.display()
                ),
            )));
        }

        info!("Removing stale socket file: {}", self.socket_path.display());
        tokio::fs::remove_file(&self.socket_path).await?;
        Ok(())
    }

    /// Start the control server
    ///
    /// This function runs until a shutdown signal is received.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Another running instance owns the socket
    /// - The socket cannot be bound
    pub async fn serve(&self, mut shutdown: broadcast::Receiver<Signal>) -> Result<()> {
        self.claim_socket().await?;

        if let Some(parent) = self.socket_path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }

        let listener = UnixListener::bind(&self.socket_path)?;

        // Owner read/write only
        #[cfg(unix)]
        {
            let metadata = tokio::fs::metadata(&self.socket_path).await?;
            let mut perms = metadata.permissions();
            perms.set_mode(0o600);
            tokio::fs::set_permissions(&self.socket_path, perms).await?;
        }
        info!("Control server listening on: {}", self.socket_path.display());

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, _addr)) => {
                            let handler = Arc::clone(&self.handler);
                            tokio::spawn(async move {
                                if let Err(e) = Self::handle_connection(stream, handler).await {
                                    error!("Error handling control connection: {e}");
                                }
                            });
                        }
                        Err(e) => {
                            error!("Error accepting control connection: {e}");
                        }
                    }
                }
                sig = shutdown.recv() => {
                    match sig {
                        Ok(Signal::Shutdown | Signal::Finalised) => {
                            info!("Control server shutting down");
                            break;
                        }
                        Err(e) => {
                            error!("Control server shutdown channel error: {e}");
                            break;
                        }
                    }
                }
            }
        }

        if self.socket_path.exists() {
            debug!("Removing socket file: {}", self.socket_path.display());
            let _ = tokio::fs::remove_file(&self.socket_path).await;
        }

        Ok(())
    }

    async fn handle_connection(
        mut stream: UnixStream,
        handler: Arc<dyn CommandHandler>,
    ) -> Result<()> {
        let request = tokio::time::timeout(IO_TIMEOUT, Self::read_request(&mut stream))
            .await
            .map_err(|_| ControlError::Timeout)??;

        trace!("Received request: {request:?}");

        let response = if request.is_version_compatible() {
            match handler.handle_request(request).await {
                Ok(response) => response,
                Err(e) => {
                    warn!("Error handling request: {e}");
                    Response::error(ErrorKind::System, e.to_string())
                }
            }
        } else {
            Response::error(
                ErrorKind::Validation,
                ControlError::IncompatibleVersion {
                    expected: PROTOCOL_VERSION,
                    actual: request.version,
                }
                .to_string(),
            )
        };

        trace!("Sending response: {response:?}");

        tokio::time::timeout(IO_TIMEOUT, Self::write_response(&mut stream, &response))
            .await
            .map_err(|_| ControlError::Timeout)??;

        Ok(())
    }

    async fn read_request(stream: &mut UnixStream) -> Result<Request> {
        let mut len_buf = [0u8; 4];
        stream.read_exact(&mut len_buf).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                ControlError::ConnectionClosed
            } else {
                ControlError::Io(e)
            }
        })?;

        let request_len = u32::from_be_bytes(len_buf);
        if request_len > MAX_REQUEST_SIZE {
            return Err(ControlError::ProtocolDeserialization(
                bincode::error::DecodeError::OtherString(format!(
                    "Request too large: {request_len} bytes"
                )),
            ));
        }

        let mut request_bytes = vec![0u8; request_len as usize];
        stream.read_exact(&mut request_bytes).await?;

        let (request, _): (Request, _) =
            bincode::serde::decode_from_slice(request_bytes.as_slice(), bincode::config::legacy())?;
        Ok(request)
    }

    async fn write_response(stream: &mut UnixStream, response: &Response) -> Result<()> {
        let response_bytes = bincode::serde::encode_to_vec(response, bincode::config::legacy())?;
        let response_len = u32::try_from(response_bytes.len())
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

        stream.write_all(&response_len.to_be_bytes()).await?;
        stream.write_all(&response_bytes).await?;
        stream.flush().await?;

        Ok(())
    }
}
