//! Client for connecting to the control socket

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::UnixStream,
};
use tracing::{debug, trace};

use crate::{
    ControlError, PROTOCOL_VERSION, Request, RequestCommand, Response, ResponseData,
    ResponsePayload, Result,
};

/// Largest response the client will accept
const MAX_RESPONSE_SIZE: u32 = 10_000_000;

/// Client for communicating with the outreach control server
///
/// Every request uses a fresh connection.
#[derive(Debug, Clone)]
pub struct ControlClient {
    socket_path: PathBuf,
    timeout: Duration,
}

impl ControlClient {
    #[must_use]
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
            timeout: Duration::from_secs(10),
        }
    }

    /// Set the request timeout
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Send a request and receive a response
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Connection fails
    /// - Protocol error occurs
    /// - Request times out
    /// - Server rejects the request ([`ControlError::ServerError`])
    pub async fn send_request(&self, request: Request) -> Result<Response> {
        tokio::time::timeout(self.timeout, self.send_request_internal(request))
            .await
            .map_err(|_| ControlError::Timeout)?
    }

    /// Send `command` and return the data it produced, if any
    ///
    /// # Errors
    ///
    /// See [`ControlClient::send_request`].
    pub async fn execute(&self, command: RequestCommand) -> Result<Option<ResponseData>> {
        let response = self.send_request(Request::new(command)).await?;
        match response.payload {
            ResponsePayload::Data(data) => Ok(Some(*data)),
            ResponsePayload::Ok | ResponsePayload::Error { .. } => Ok(None),
        }
    }

    async fn send_request_internal(&self, request: Request) -> Result<Response> {
        debug!("Connecting to control socket: {}", self.socket_path.display());
        let mut stream = UnixStream::connect(&self.socket_path).await?;

        let request_bytes = bincode::serde::encode_to_vec(&request, bincode::config::legacy())?;
        let request_len = u32::try_from(request_bytes.len())
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

        trace!("Sending request: {request_len} bytes");
        stream.write_all(&request_len.to_be_bytes()).await?;
        stream.write_all(&request_bytes).await?;
        stream.flush().await?;

        let mut len_buf = [0u8; 4];
        stream.read_exact(&mut len_buf).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                ControlError::ConnectionClosed
            } else {
                ControlError::Io(e)
            }
        })?;
        let response_len = u32::from_be_bytes(len_buf);

        if response_len > MAX_RESPONSE_SIZE {
            return Err(ControlError::ProtocolDeserialization(
                bincode::error::DecodeError::OtherString(format!(
                    "Response too large: {response_len} bytes (max {MAX_RESPONSE_SIZE})"
                )),
            ));
        }

        trace!("Receiving response: {response_len} bytes");
        let mut response_bytes = vec![0u8; response_len as usize];
        stream.read_exact(&mut response_bytes).await?;

        let (response, _): (Response, _) = bincode::serde::decode_from_slice(
            response_bytes.as_slice(),
            bincode::config::legacy(),
        )?;

        if !response.is_version_compatible() {
            return Err(ControlError::IncompatibleVersion {
                expected: PROTOCOL_VERSION,
                actual: response.version,
            });
        }

        if let ResponsePayload::Error { kind, message } = response.payload {
            return Err(ControlError::ServerError { kind, message });
        }

        Ok(response)
    }

    /// Check that the control socket exists
    ///
    /// # Errors
    ///
    /// Returns an error if the socket doesn't exist
    pub fn check_socket_exists(&self) -> Result<()> {
        if !Path::new(&self.socket_path).exists() {
            return Err(ControlError::InvalidSocketPath(format!(
                "Socket does not exist: {}",
                self.socket_path.display()
            )));
        }
        Ok(())
    }
}
