//! TCP session with the server's RPC port.

use crate::cli::ParsedRequest;
use crate::client::RpcOutcome;
use crate::protocol::framing::{self, FrameError};
use crate::protocol::{Request, Response, RpcError};
use serde_json::{Map, Value};
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tracing::debug;

/// Failures of a single call, before classification.
#[derive(Debug, Error)]
pub enum CallError {
    #[error("failed to connect: {0}")]
    Connect(#[source] std::io::Error),
    #[error("connection error: {0}")]
    Io(#[source] std::io::Error),
    #[error("connection closed before a reply arrived")]
    Closed,
    #[error("no reply within {0:?}")]
    TimedOut(Duration),
    #[error("reply of {size}+ bytes exceeds the {max} byte limit")]
    TooLarge { size: usize, max: usize },
    #[error("malformed reply: {0}")]
    Malformed(#[source] serde_json::Error),
    #[error("{0}")]
    Rpc(RpcError),
    #[error("reply carried neither a result nor an error")]
    EmptyReply,
}

impl From<FrameError> for CallError {
    fn from(err: FrameError) -> Self {
        match err {
            FrameError::Io(e) => CallError::Io(e),
            FrameError::Closed => CallError::Closed,
            FrameError::TooLarge { size, max } => CallError::TooLarge { size, max },
            FrameError::Json(e) => CallError::Malformed(e),
        }
    }
}

/// Performs one request per invocation against `host`.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    host: String,
    max_frame_size: usize,
}

impl Dispatcher {
    /// Create a dispatcher for `host`. Replies of any size are accepted.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            max_frame_size: framing::UNLIMITED,
        }
    }

    /// Reject replies larger than `max` bytes.
    #[cfg(test)]
    pub fn with_max_frame_size(mut self, max: usize) -> Self {
        self.max_frame_size = max;
        self
    }

    /// Send `request` and classify how the round trip ended.
    ///
    /// Connect, send and receive together are bounded by the request's
    /// timeout. When the deadline fires the in-flight exchange is dropped,
    /// which closes the connection.
    pub async fn dispatch(&self, request: &ParsedRequest) -> RpcOutcome {
        let limit = request.timeout();
        let outcome = match tokio::time::timeout(limit, self.call(request)).await {
            Ok(Ok(result)) => RpcOutcome::Success(result),
            Ok(Err(e)) => {
                debug!("{} failed: {}", request.method, e);
                RpcOutcome::from(e)
            }
            Err(_) => {
                debug!("{} timed out after {:?}", request.method, limit);
                RpcOutcome::Timeout
            }
        };
        debug!(method = %request.method, success = outcome.is_success(), "request finished");
        outcome
    }

    async fn call(&self, request: &ParsedRequest) -> Result<Value, CallError> {
        let stream = TcpStream::connect((self.host.as_str(), request.port))
            .await
            .map_err(CallError::Connect)?;
        debug!("Connected to {}:{}", self.host, request.port);

        let mut session = Session::new(stream, self.max_frame_size, request.timeout());
        let reply = session
            .send_request(&request.method, request.params.clone())
            .await;
        session.close().await;
        reply
    }
}

/// An open connection with its framing state.
struct Session {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    next_id: u64,
    max_frame_size: usize,
    request_timeout: Duration,
}

impl Session {
    fn new(stream: TcpStream, max_frame_size: usize, request_timeout: Duration) -> Self {
        let (reader, writer) = stream.into_split();
        Self {
            reader: BufReader::new(reader),
            writer,
            next_id: 0,
            max_frame_size,
            request_timeout,
        }
    }

    /// Send a call and wait for the reply carrying the same id.
    async fn send_request(
        &mut self,
        method: &str,
        params: Map<String, Value>,
    ) -> Result<Value, CallError> {
        let id = self.next_id;
        self.next_id += 1;

        let request = Request::new(id, method, params);
        framing::write_message(&mut self.writer, &request).await?;
        debug!("Sent {} (id {})", method, id);

        tokio::time::timeout(self.request_timeout, self.await_reply(id))
            .await
            .map_err(|_| CallError::TimedOut(self.request_timeout))?
    }

    async fn await_reply(&mut self, id: u64) -> Result<Value, CallError> {
        loop {
            let response: Response =
                framing::read_message(&mut self.reader, self.max_frame_size).await?;
            if !response.answers(id) {
                debug!("Skipping unrelated message: {:?}", response.method);
                continue;
            }
            debug!("Received reply to id {}", id);
            return match (response.error, response.result) {
                (Some(error), _) => Err(CallError::Rpc(error)),
                (None, Some(result)) => Ok(result),
                (None, None) => Err(CallError::EmptyReply),
            };
        }
    }

    async fn close(mut self) {
        if let Err(e) = self.writer.shutdown().await {
            debug!("Failed to shut down connection: {}", e);
        }
    }
}
