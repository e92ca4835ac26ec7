//! Length-delimited framing for tap request and response bodies.
//!
//! Every message on the wire is preceded by a 4-byte big-endian length.
//! Frames never exceed [`MAX_FRAME_LEN`]; a peer announcing a larger frame
//! is misbehaving and the stream is torn down rather than buffered.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use prost::Message;

/// Response header set when an error frame is written before any event
/// frame, so clients can distinguish an error body from an empty stream.
pub const ERROR_HEADER: &str = "l5d-err";

pub const MAX_FRAME_LEN: usize = 4 * 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("truncated frame")]
    Truncated,

    #[error("frame of {0} bytes exceeds the {MAX_FRAME_LEN} byte limit")]
    Oversize(usize),

    #[error(transparent)]
    Decode(#[from] prost::DecodeError),
}

/// Serializes a message as a single length-prefixed frame.
pub fn encode_frame<M: Message>(msg: &M) -> Bytes {
    let len = msg.encoded_len();
    let mut buf = BytesMut::with_capacity(4 + len);
    buf.put_u32(len as u32);
    msg.encode(&mut buf)
        .expect("BytesMut growth makes encoding infallible");
    buf.freeze()
}

/// Consumes one frame from the front of `buf`.
pub fn decode_frame<M: Message + Default>(buf: &mut Bytes) -> Result<M, CodecError> {
    if buf.remaining() < 4 {
        return Err(CodecError::Truncated);
    }
    let len = buf.get_u32() as usize;
    if len > MAX_FRAME_LEN {
        return Err(CodecError::Oversize(len));
    }
    if buf.remaining() < len {
        return Err(CodecError::Truncated);
    }
    let frame = buf.split_to(len);
    M::decode(frame).map_err(Into::into)
}
