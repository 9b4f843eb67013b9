//! Client side of a single RPC round trip.
//!
//! The dispatcher:
//! - Connects to the server's RPC port
//! - Sends one JSON-RPC request and waits for its reply
//! - Bounds the whole exchange by the request's timeout
//! - Classifies the result as an [`RpcOutcome`]

pub mod session;

pub use session::{CallError, Dispatcher};

use serde_json::Value;

/// How a round trip ended.
#[derive(Debug, Clone, PartialEq)]
pub enum RpcOutcome {
    /// The server replied with a result.
    Success(Value),
    /// The connection could not be established or was lost.
    ConnectFailure(String),
    /// No reply arrived before the deadline.
    Timeout,
    /// The exchange failed for any other reason.
    ProtocolFailure(String),
}

impl RpcOutcome {
    /// Whether the call produced a result.
    pub fn is_success(&self) -> bool {
        matches!(self, RpcOutcome::Success(_))
    }
}

impl From<CallError> for RpcOutcome {
    fn from(err: CallError) -> Self {
        match err {
            CallError::Connect(_) | CallError::Io(_) | CallError::Closed => {
                RpcOutcome::ConnectFailure(err.to_string())
            }
            CallError::TimedOut(_) => RpcOutcome::Timeout,
            CallError::TooLarge { .. }
            | CallError::Malformed(_)
            | CallError::Rpc(_)
            | CallError::EmptyReply => RpcOutcome::ProtocolFailure(err.to_string()),
        }
    }
}
