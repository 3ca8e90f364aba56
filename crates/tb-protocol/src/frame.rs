//! Frame length prefix encoding/decoding
//!
//! Each frame on the wire is a 4-byte little-endian u32 length prefix
//! followed by exactly that many bytes of UTF-8 JSON.

use bytes::{Buf, BufMut, BytesMut};

use crate::error::FramingError;

/// Size of the length prefix in bytes
pub const LEN_PREFIX_SIZE: usize = 4;

/// Maximum payload size (16MB - 1)
pub const MAX_PAYLOAD_SIZE: usize = 0x00FF_FFFF;

/// Encode a length prefix into a byte buffer
pub fn encode_prefix(dst: &mut BytesMut, payload_length: usize) -> Result<(), FramingError> {
    if payload_length > MAX_PAYLOAD_SIZE {
        return Err(FramingError::PayloadTooLarge {
            size: payload_length,
            max: MAX_PAYLOAD_SIZE,
        });
    }
    dst.reserve(LEN_PREFIX_SIZE);
    dst.put_u32_le(payload_length as u32);
    Ok(())
}

/// Decode a length prefix from a byte buffer
///
/// Returns None if there aren't enough bytes in the buffer yet.
/// Returns Err if the declared length exceeds the payload cap.
pub fn decode_prefix(src: &mut BytesMut) -> Result<Option<usize>, FramingError> {
    if src.len() < LEN_PREFIX_SIZE {
        return Ok(None);
    }

    let payload_length = src.get_u32_le() as usize;
    if payload_length > MAX_PAYLOAD_SIZE {
        return Err(FramingError::PayloadTooLarge {
            size: payload_length,
            max: MAX_PAYLOAD_SIZE,
        });
    }

    Ok(Some(payload_length))
}
