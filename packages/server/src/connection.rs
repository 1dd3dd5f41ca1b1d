//! Length-prefixed JSON framing shared by the listener and the client.
//!
//! Every message is a 4-byte big-endian length followed by that many bytes of
//! JSON.

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Frame size limit used when none is configured (1 MiB).
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 1024 * 1024;

/// Connection error types.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("empty message")]
    Empty,

    #[error("message too large: {size} > {max}")]
    TooLarge { size: usize, max: usize },

    /// The frame was read completely but its body is not a valid message.
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl ConnectionError {
    /// True when the stream is still positioned at a frame boundary.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, ConnectionError::Json(_))
    }
}

/// A framed message stream.
pub struct Connection<S> {
    stream: S,
    max_message_size: usize,
    read_buffer: Vec<u8>,
}

impl<S: AsyncRead + AsyncWrite + Unpin> Connection<S> {
    pub fn new(stream: S, max_message_size: usize) -> Self {
        Self {
            stream,
            max_message_size,
            read_buffer: Vec::with_capacity(4096),
        }
    }

    /// Read one message.
    ///
    /// Returns `Ok(None)` if the peer closed the connection between frames.
    pub async fn read_message<T: DeserializeOwned>(
        &mut self,
    ) -> Result<Option<T>, ConnectionError> {
        let mut len_buf = [0u8; 4];
        match self.stream.read_exact(&mut len_buf).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e.into()),
        }

        let len = u32::from_be_bytes(len_buf) as usize;
        if len == 0 {
            return Err(ConnectionError::Empty);
        }
        if len > self.max_message_size {
            return Err(ConnectionError::TooLarge {
                size: len,
                max: self.max_message_size,
            });
        }

        self.read_buffer.clear();
        self.read_buffer.resize(len, 0);
        self.stream.read_exact(&mut self.read_buffer).await?;

        Ok(Some(serde_json::from_slice(&self.read_buffer)?))
    }

    /// Write one message and flush it.
    pub async fn send_message<T: Serialize>(&mut self, msg: &T) -> Result<(), ConnectionError> {
        let json = serde_json::to_vec(msg)?;
        if json.len() > self.max_message_size {
            return Err(ConnectionError::TooLarge {
                size: json.len(),
                max: self.max_message_size,
            });
        }

        let len = json.len() as u32;
        self.stream.write_all(&len.to_be_bytes()).await?;
        self.stream.write_all(&json).await?;
        self.stream.flush().await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn messages_cross_a_duplex_pipe() {
        let (a, b) = tokio::io::duplex(1024);
        let mut left = Connection::new(a, DEFAULT_MAX_MESSAGE_SIZE);
        let mut right = Connection::new(b, DEFAULT_MAX_MESSAGE_SIZE);

        left.send_message(&json!({"type": "list"})).await.unwrap();
        let got: Option<serde_json::Value> = right.read_message().await.unwrap();
        assert_eq!(got, Some(json!({"type": "list"})));
    }

    #[tokio::test]
    async fn closed_stream_reads_none() {
        let (a, b) = tokio::io::duplex(64);
        drop(a);
        let mut conn = Connection::new(b, DEFAULT_MAX_MESSAGE_SIZE);
        let got: Option<serde_json::Value> = conn.read_message().await.unwrap();
        assert!(got.is_none());
    }

    #[tokio::test]
    async fn oversized_frames_rejected() {
        let (a, b) = tokio::io::duplex(1024);
        let mut raw = a;
        raw.write_all(&1000u32.to_be_bytes()).await.unwrap();

        let mut conn = Connection::new(b, 100);
        let err = conn.read_message::<serde_json::Value>().await.unwrap_err();
        assert!(matches!(err, ConnectionError::TooLarge { size: 1000, max: 100 }));
        assert!(!err.is_recoverable());
    }

    #[tokio::test]
    async fn bad_json_leaves_stream_usable() {
        let (a, b) = tokio::io::duplex(1024);
        let mut raw = a;
        raw.write_all(&3u32.to_be_bytes()).await.unwrap();
        raw.write_all(b"{{{").await.unwrap();
        let mut writer = Connection::new(raw, DEFAULT_MAX_MESSAGE_SIZE);
        writer.send_message(&json!(7)).await.unwrap();

        let mut conn = Connection::new(b, DEFAULT_MAX_MESSAGE_SIZE);
        let err = conn.read_message::<serde_json::Value>().await.unwrap_err();
        assert!(err.is_recoverable());
        let next: Option<serde_json::Value> = conn.read_message().await.unwrap();
        assert_eq!(next, Some(json!(7)));
    }

    #[tokio::test]
    async fn empty_frames_rejected() {
        let (a, b) = tokio::io::duplex(64);
        let mut raw = a;
        raw.write_all(&0u32.to_be_bytes()).await.unwrap();

        let mut conn = Connection::new(b, DEFAULT_MAX_MESSAGE_SIZE);
        assert!(matches!(
            conn.read_message::<serde_json::Value>().await,
            Err(ConnectionError::Empty)
        ));
    }
}
