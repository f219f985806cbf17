use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::protocol::error::Result;

/// Delimiter placed after every frame on the wire: `NUL LF NUL`.
///
/// JSON text never contains a raw NUL byte, so the sentinel cannot occur
/// inside a payload.
pub const SENTINEL: &[u8; 3] = b"\0\n\0";

/// Sentinel-delimited JSON codec.
///
/// # Example
///
/// ```
/// use rpcpool_common::transport::{FrameBuffer, FrameCodec};
/// use serde_json::{json, Value};
///
/// let bytes = FrameCodec::encode(&json!({"n": 1})).unwrap();
/// let mut buffer = FrameBuffer::new();
/// let (head, tail) = bytes.split_at(4);
///
/// assert!(buffer.decode::<Value>(head).is_empty());
/// let frames = buffer.decode::<Value>(tail);
/// assert_eq!(frames.len(), 1);
/// ```
pub struct FrameCodec;

impl FrameCodec {
    /// Encodes a message followed by the sentinel.
    pub fn encode<T: Serialize>(message: &T) -> Result<Vec<u8>> {
        let mut bytes = serde_json::to_vec(message)?;
        bytes.extend_from_slice(SENTINEL);
        Ok(bytes)
    }
}

/// Per-socket reassembly state.
///
/// Holds the unterminated tail of the previous read so a frame split across
/// two deliveries is completed by the next one. The tail is kept as raw
/// bytes, so a multi-byte UTF-8 character split by the network is restored
/// before it is parsed.
#[derive(Debug, Default)]
pub struct FrameBuffer {
    carry: Vec<u8>,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds a chunk and returns every frame it completes, in wire order.
    ///
    /// The carry is prepended to the chunk, the result is split on the
    /// sentinel, every fragment but the last is a complete frame, and the
    /// last fragment (possibly empty) becomes the new carry.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Vec<u8>> {
        // The carry holds no complete sentinel, only possibly its first bytes
        let mut search_from = self.carry.len().saturating_sub(SENTINEL.len() - 1);
        self.carry.extend_from_slice(chunk);

        let mut frames = Vec::new();
        let mut start = 0;
        while let Some(offset) = find_sentinel(&self.carry[search_from..]) {
            let end = search_from + offset;
            frames.push(self.carry[start..end].to_vec());
            start = end + SENTINEL.len();
            search_from = start;
        }

        self.carry.drain(..start);
        frames
    }

    /// Feeds a chunk and parses every completed frame.
    ///
    /// A frame that is not valid JSON for `T` yields an `Err` in its slot;
    /// the remaining frames are unaffected.
    pub fn decode<T: DeserializeOwned>(&mut self, chunk: &[u8]) -> Vec<Result<T>> {
        self.push(chunk)
            .into_iter()
            .map(|frame| serde_json::from_slice(&frame).map_err(Into::into))
            .collect()
    }

    /// Bytes received after the last sentinel.
    pub fn pending(&self) -> &[u8] {
        &self.carry
    }
}

fn find_sentinel(haystack: &[u8]) -> Option<usize> {
    haystack
        .windows(SENTINEL.len())
        .position(|window| window == SENTINEL)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn encode_all(messages: &[Value]) -> Vec<u8> {
        messages
            .iter()
            .flat_map(|m| FrameCodec::encode(m).unwrap())
            .collect()
    }

    #[test]
    fn test_encode_appends_sentinel() {
        let bytes = FrameCodec::encode(&json!({"a": 1})).unwrap();
        assert!(bytes.ends_with(SENTINEL));
        assert_eq!(&bytes[..bytes.len() - 3], br#"{"a":1}"#);
    }

    #[test]
    fn test_chunk_ending_on_boundary_leaves_empty_carry() {
        let mut buffer = FrameBuffer::new();
        let frames = buffer.decode::<Value>(&encode_all(&[json!(1), json!(2)]));
        let frames: Vec<Value> = frames.into_iter().map(|f| f.unwrap()).collect();

        assert_eq!(frames, vec![json!(1), json!(2)]);
        assert!(buffer.pending().is_empty());
    }

    #[test]
    fn test_split_mid_json() {
        let mut buffer = FrameBuffer::new();
        let bytes = encode_all(&[json!({"messageSeq": 1, "args": ["a"]})]);

        assert!(buffer.push(&bytes[..5]).is_empty());
        assert_eq!(buffer.pending(), &bytes[..5]);

        let frames = buffer.decode::<Value>(&bytes[5..]);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].as_ref().unwrap()["messageSeq"], json!(1));
    }

    #[test]
    fn test_split_mid_sentinel() {
        let mut buffer = FrameBuffer::new();
        let bytes = encode_all(&[json!("x"), json!("y")]);
        // `"x"` is three bytes, so the first sentinel spans 3..6
        let (head, tail) = bytes.split_at(4);

        assert!(buffer.push(head).is_empty());
        let frames: Vec<Value> = buffer.decode(tail).into_iter().map(|f| f.unwrap()).collect();
        assert_eq!(frames, vec![json!("x"), json!("y")]);
    }

    #[test]
    fn test_every_split_point_preserves_sequence() {
        let messages = vec![
            json!({"id": 1, "result": "héllo"}),
            json!({"id": 2, "error": {"code": -32603, "message": "boom"}}),
            json!([1, 2, 3]),
        ];
        let bytes = encode_all(&messages);

        for a in 0..bytes.len() {
            for b in a..bytes.len() {
                let mut buffer = FrameBuffer::new();
                let mut decoded = Vec::new();
                for chunk in [&bytes[..a], &bytes[a..b], &bytes[b..]] {
                    decoded.extend(buffer.decode::<Value>(chunk).into_iter().map(|f| f.unwrap()));
                }
                assert_eq!(decoded, messages, "split at {a}/{b}");
                assert!(buffer.pending().is_empty());
            }
        }
    }

    #[test]
    fn test_malformed_frame_does_not_poison_neighbours() {
        let mut buffer = FrameBuffer::new();
        let mut bytes = b"{not json".to_vec();
        bytes.extend_from_slice(SENTINEL);
        bytes.extend(FrameCodec::encode(&json!(5)).unwrap());

        let frames = buffer.decode::<Value>(&bytes);
        assert_eq!(frames.len(), 2);
        assert!(frames[0].is_err());
        assert_eq!(frames[1].as_ref().unwrap(), &json!(5));
    }

    #[test]
    fn test_empty_frames_are_errors_in_place() {
        let mut buffer = FrameBuffer::new();
        let mut bytes = SENTINEL.to_vec();
        bytes.extend(FrameCodec::encode(&json!("v")).unwrap());

        let frames = buffer.decode::<Value>(&bytes);
        assert_eq!(frames.len(), 2);
        assert!(frames[0].is_err());
        assert_eq!(frames[1].as_ref().unwrap(), &json!("v"));
        assert!(buffer.pending().is_empty());

        // Adjacent sentinels between two frames
        let mut bytes = FrameCodec::encode(&json!(1)).unwrap();
        bytes.extend_from_slice(SENTINEL);
        bytes.extend(FrameCodec::encode(&json!(2)).unwrap());

        let frames = buffer.decode::<Value>(&bytes);
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0].as_ref().unwrap(), &json!(1));
        assert!(frames[1].is_err());
        assert_eq!(frames[2].as_ref().unwrap(), &json!(2));
        assert!(buffer.pending().is_empty());
    }

    #[test]
    fn test_large_frame_in_small_chunks_is_linear() {
        let payload = "x".repeat(8 * 1024 * 1024);
        let bytes = FrameCodec::encode(&json!(payload)).unwrap();

        let started = std::time::Instant::now();
        let mut buffer = FrameBuffer::new();
        let mut frames = Vec::new();
        for chunk in bytes.chunks(16 * 1024) {
            frames.extend(buffer.push(chunk));
        }
        let elapsed = started.elapsed();

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].len(), bytes.len() - SENTINEL.len());
        assert!(buffer.pending().is_empty());
        assert!(elapsed < std::time::Duration::from_secs(5), "took {:?}", elapsed);
    }

    #[test]
    fn test_sentinel_split_across_three_pushes() {
        let mut buffer = FrameBuffer::new();
        let bytes = FrameCodec::encode(&json!(7)).unwrap();
        let (body, sentinel) = bytes.split_at(bytes.len() - 3);

        assert!(buffer.push(body).is_empty());
        assert!(buffer.push(&sentinel[..1]).is_empty());
        assert!(buffer.push(&sentinel[1..2]).is_empty());
        let frames = buffer.push(&sentinel[2..]);
        assert_eq!(frames, vec![b"7".to_vec()]);
        assert!(buffer.pending().is_empty());
    }
}
