use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{lookup_host, TcpStream};

use crate::protocol::error::{PoolError, Result};
use crate::transport::codec::{FrameBuffer, FrameCodec};

/// Size of a single socket read.
const READ_CHUNK: usize = 16 * 1024;

/// Upper bound on an unterminated frame (100 MB).
///
/// A peer that streams this much without a sentinel is dropped instead of
/// growing the carry buffer without limit.
const MAX_FRAME_SIZE: usize = 100 * 1024 * 1024;

/// Connects to a remote endpoint.
///
/// Resolves the address (which may yield several socket addresses) and
/// tries each until one accepts.
///
/// # Errors
///
/// Returns `PoolError::Connection` if the address does not resolve or every
/// resolved address refuses the connection.
pub async fn connect(addr: &str) -> Result<TcpStream> {
    let socket_addrs = lookup_host(addr)
        .await
        .map_err(|e| PoolError::Connection(format!("Invalid address '{}': {}", addr, e)))?;

    let mut last_err = None;
    for socket_addr in socket_addrs {
        match TcpStream::connect(socket_addr).await {
            Ok(stream) => {
                stream.set_nodelay(true)?;
                return Ok(stream);
            }
            Err(e) => last_err = Some(e),
        }
    }

    Err(PoolError::Connection(format!(
        "Failed to connect to {}: {}",
        addr,
        last_err
            .map(|e| e.to_string())
            .unwrap_or_else(|| "no addresses resolved".to_string())
    )))
}

/// Reading half of a framed connection.
///
/// Every call to [`FrameReader::next_batch`] performs one socket read and
/// returns the frames that read completed, mirroring how data arrives on
/// the wire. Frames are returned in the order they were sent.
pub struct FrameReader<R> {
    inner: R,
    buffer: FrameBuffer,
    chunk: Vec<u8>,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            buffer: FrameBuffer::new(),
            chunk: vec![0u8; READ_CHUNK],
        }
    }

    /// Reads once and decodes the completed frames.
    ///
    /// Returns `Ok(None)` when the peer closed the connection. A frame that
    /// fails to parse is returned as an `Err` in its slot.
    pub async fn next_batch<T: DeserializeOwned>(&mut self) -> Result<Option<Vec<Result<T>>>> {
        let n = self
            .inner
            .read(&mut self.chunk)
            .await
            .map_err(|e| map_io_error(e, "reading frame"))?;

        if n == 0 {
            if !self.buffer.pending().is_empty() {
                tracing::warn!(
                    bytes = self.buffer.pending().len(),
                    "Connection closed with an unterminated frame"
                );
            }
            return Ok(None);
        }

        let frames = self.buffer.decode(&self.chunk[..n]);

        if self.buffer.pending().len() > MAX_FRAME_SIZE {
            return Err(PoolError::InvalidResponse(format!(
                "Frame too large: more than {} bytes without a delimiter",
                MAX_FRAME_SIZE
            )));
        }

        Ok(Some(frames))
    }
}

/// Writing half of a framed connection.
pub struct FrameWriter<W> {
    inner: W,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    /// Encodes `message`, appends the sentinel and flushes it to the peer.
    pub async fn send<T: Serialize>(&mut self, message: &T) -> Result<()> {
        let encoded = FrameCodec::encode(message)?;
        self.inner
            .write_all(&encoded)
            .await
            .map_err(|e| map_io_error(e, "writing frame"))?;
        self.inner
            .flush()
            .await
            .map_err(|e| map_io_error(e, "flushing frame"))?;
        Ok(())
    }

    /// Shuts down the write side of the connection.
    pub async fn shutdown(&mut self) -> Result<()> {
        self.inner.shutdown().await?;
        Ok(())
    }
}

/// Splits a TCP stream into framed halves.
pub fn framed(
    stream: TcpStream,
) -> (
    FrameReader<tokio::net::tcp::OwnedReadHalf>,
    FrameWriter<tokio::net::tcp::OwnedWriteHalf>,
) {
    let (read, write) = stream.into_split();
    (FrameReader::new(read), FrameWriter::new(write))
}

/// Map IO errors to the transport error variants
///
/// - Connection reset / aborted / not connected -> `Connection`
/// - Everything else -> `Io`
fn map_io_error(err: std::io::Error, context: &str) -> PoolError {
    match err.kind() {
        std::io::ErrorKind::ConnectionReset
        | std::io::ErrorKind::ConnectionAborted
        | std::io::ErrorKind::NotConnected
        | std::io::ErrorKind::BrokenPipe => {
            PoolError::Connection(format!("{}: connection lost", context))
        }
        _ => PoolError::Io(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    #[tokio::test]
    async fn test_frames_round_trip_over_duplex() {
        let (client, server) = tokio::io::duplex(64);
        let mut writer = FrameWriter::new(client);
        let mut reader = FrameReader::new(server);

        tokio::spawn(async move {
            writer.send(&json!({"messageSeq": 1})).await.unwrap();
            writer.send(&json!({"messageSeq": 2})).await.unwrap();
            writer.shutdown().await.unwrap();
        });

        let mut received = Vec::new();
        while let Some(batch) = reader.next_batch::<Value>().await.unwrap() {
            received.extend(batch.into_iter().map(|f| f.unwrap()));
        }
        assert_eq!(received, vec![json!({"messageSeq": 1}), json!({"messageSeq": 2})]);
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let result = connect(&addr.to_string()).await;
        assert!(matches!(result, Err(PoolError::Connection(_))));
    }

    #[tokio::test]
    async fn test_connect_invalid_address() {
        let result = connect("not an address").await;
        assert!(matches!(result, Err(PoolError::Connection(_))));
    }
}
