//! Wire protocol spoken with the server's RPC port.
//!
//! Messages are JSON-RPC 2.0 objects, one per line.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Protocol version tag carried by every message.
pub const JSONRPC_VERSION: &str = "2.0";

/// A method call sent to the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub jsonrpc: String,
    pub method: String,
    /// Named arguments of the call.
    pub params: Map<String, Value>,
    pub id: u64,
}

impl Request {
    /// Create a request with named params.
    pub fn new(id: u64, method: impl Into<String>, params: Map<String, Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: method.into(),
            params,
            id,
        }
    }
}

/// Error object returned in place of a result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Error)]
#[error("{message} (code {code})")]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Any message received from the server.
///
/// Replies carry an `id`; server-initiated notifications carry a `method`
/// instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jsonrpc: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    /// `Some(Value::Null)` when the server returned a null result.
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

fn present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

impl Response {
    /// Create a successful reply.
    #[cfg(test)]
    pub fn success(id: u64, result: Value) -> Self {
        Self {
            jsonrpc: Some(JSONRPC_VERSION.to_string()),
            id: Some(Value::from(id)),
            method: None,
            result: Some(result),
            error: None,
        }
    }

    /// Create an error reply.
    #[cfg(test)]
    pub fn error(id: u64, code: i64, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: Some(JSONRPC_VERSION.to_string()),
            id: Some(Value::from(id)),
            method: None,
            result: None,
            error: Some(RpcError {
                code,
                message: message.into(),
                data: None,
            }),
        }
    }

    /// Whether this message answers the request with `id`.
    pub fn answers(&self, id: u64) -> bool {
        self.method.is_none() && self.id.as_ref().and_then(Value::as_u64) == Some(id)
    }
}

/// Framing for messages: newline-delimited JSON.
pub mod framing {
    use serde::de::DeserializeOwned;
    use serde::Serialize;
    use thiserror::Error;
    use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

    /// `max_size` value that disables the frame size check.
    pub const UNLIMITED: usize = 0;

    /// Errors raised while moving frames over the connection.
    #[derive(Debug, Error)]
    pub enum FrameError {
        #[error("connection error: {0}")]
        Io(#[from] std::io::Error),
        #[error("connection closed by peer")]
        Closed,
        #[error("incoming message of {size}+ bytes exceeds the {max} byte limit")]
        TooLarge { size: usize, max: usize },
        #[error("malformed message: {0}")]
        Json(#[from] serde_json::Error),
    }

    /// Write one message followed by a newline.
    pub async fn write_message<W, T>(writer: &mut W, message: &T) -> Result<(), FrameError>
    where
        W: AsyncWrite + Unpin,
        T: Serialize,
    {
        let mut json = serde_json::to_vec(message)?;
        json.push(b'\n');
        writer.write_all(&json).await?;
        writer.flush().await?;
        Ok(())
    }

    /// Read the next non-blank line and decode it.
    ///
    /// Lines longer than `max_size` bytes are rejected unless `max_size` is
    /// [`UNLIMITED`].
    pub async fn read_message<R, T>(reader: &mut R, max_size: usize) -> Result<T, FrameError>
    where
        R: AsyncBufRead + Unpin,
        T: DeserializeOwned,
    {
        loop {
            let mut buf = Vec::new();
            let read = if max_size == UNLIMITED {
                reader.read_until(b'\n', &mut buf).await?
            } else {
                let cap = u64::try_from(max_size).unwrap_or(u64::MAX).saturating_add(1);
                (&mut *reader).take(cap).read_until(b'\n', &mut buf).await?
            };
            if read == 0 {
                return Err(FrameError::Closed);
            }

            let complete = buf.last() == Some(&b'\n');
            if complete {
                buf.pop();
            }
            if max_size != UNLIMITED && buf.len() > max_size {
                return Err(FrameError::TooLarge {
                    size: buf.len(),
                    max: max_size,
                });
            }
            if !complete {
                return Err(FrameError::Closed);
            }
            if buf.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            return Ok(serde_json::from_slice(&buf)?);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::framing::{read_message, write_message, FrameError, UNLIMITED};
    use super::*;
    use serde_json::json;
    use tokio::io::BufReader;

    #[test]
    fn test_request_serialization() {
        let mut params = Map::new();
        params.insert("limit".into(), json!(5));
        let req = Request::new(0, "query", params);
        let value = serde_json::to_value(&req).unwrap();
        assert_eq!(
            value,
            json!({"jsonrpc": "2.0", "method": "query", "params": {"limit": 5}, "id": 0})
        );
    }

    #[test]
    fn test_null_result_is_present() {
        let resp: Response = serde_json::from_str(r#"{"id": 0, "result": null}"#).unwrap();
        assert_eq!(resp.result, Some(Value::Null));
        assert!(resp.answers(0));

        let resp: Response = serde_json::from_str(r#"{"id": 0}"#).unwrap();
        assert_eq!(resp.result, None);
    }

    #[test]
    fn test_notification_answers_nothing() {
        let resp: Response =
            serde_json::from_str(r#"{"method": "blockchain.headers.subscribe", "params": []}"#)
                .unwrap();
        assert!(!resp.answers(0));
    }

    #[test]
    fn test_response_error() {
        let resp = Response::error(3, -32601, "unknown method");
        assert!(resp.answers(3));
        let err = resp.error.unwrap();
        assert_eq!(err.to_string(), "unknown method (code -32601)");
    }

    #[tokio::test]
    async fn test_framing_round_trip() {
        let mut wire = Vec::new();
        write_message(&mut wire, &Response::success(1, json!(["a", "b"])))
            .await
            .unwrap();
        assert_eq!(wire.last(), Some(&b'\n'));

        let mut reader = BufReader::new(wire.as_slice());
        let resp: Response = read_message(&mut reader, UNLIMITED).await.unwrap();
        assert_eq!(resp.result, Some(json!(["a", "b"])));
        assert!(matches!(
            read_message::<_, Response>(&mut reader, UNLIMITED).await,
            Err(FrameError::Closed)
        ));
    }

    #[tokio::test]
    async fn test_framing_skips_blank_lines() {
        let wire = b"\n  \n{\"id\":0,\"result\":1}\n".to_vec();
        let mut reader = BufReader::new(wire.as_slice());
        let resp: Response = read_message(&mut reader, UNLIMITED).await.unwrap();
        assert_eq!(resp.result, Some(json!(1)));
    }

    #[tokio::test]
    async fn test_framing_size_limit() {
        let line = format!("{{\"id\":0,\"result\":\"{}\"}}\n", "x".repeat(64));
        let mut reader = BufReader::new(line.as_bytes());
        let err = read_message::<_, Response>(&mut reader, 16).await.unwrap_err();
        assert!(matches!(err, FrameError::TooLarge { max: 16, .. }));

        let mut reader = BufReader::new(line.as_bytes());
        let resp: Response = read_message(&mut reader, line.len() - 1).await.unwrap();
        assert_eq!(resp.result, Some(json!("x".repeat(64))));
    }

    #[tokio::test]
    async fn test_framing_truncated_message() {
        let wire = b"{\"id\":0,\"res".to_vec();
        let mut reader = BufReader::new(wire.as_slice());
        assert!(matches!(
            read_message::<_, Response>(&mut reader, UNLIMITED).await,
            Err(FrameError::Closed)
        ));
    }

    #[tokio::test]
    async fn test_framing_malformed_message() {
        let wire = b"not json\n".to_vec();
        let mut reader = BufReader::new(wire.as_slice());
        assert!(matches!(
            read_message::<_, Response>(&mut reader, UNLIMITED).await,
            Err(FrameError::Json(_))
        ));
    }
}
