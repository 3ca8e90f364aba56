//! Tokio codec for length-prefixed JSON frames

use std::marker::PhantomData;

use bytes::BytesMut;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio_util::codec::{Decoder, Encoder};

use crate::error::FramingError;
use crate::frame;
use crate::message::{ClientRequest, ServerResponse};

/// Codec for encoding/decoding length-prefixed JSON frames
///
/// `Rx` is the message type decoded from the stream, `Tx` the type encoded
/// onto it. The broker decodes requests and encodes responses; a caller
/// instantiates the mirror image.
#[derive(Debug)]
pub struct JsonFrameCodec<Rx, Tx> {
    /// Payload length from a prefix whose payload has not fully arrived yet
    pending_len: Option<usize>,
    _marker: PhantomData<fn(Tx) -> Rx>,
}

/// Server-side codec: reads requests, writes responses
pub type BrokerCodec = JsonFrameCodec<ClientRequest, ServerResponse>;

/// Client-side codec: writes requests, reads responses
pub type CallerCodec = JsonFrameCodec<ServerResponse, ClientRequest>;

impl<Rx, Tx> JsonFrameCodec<Rx, Tx> {
    /// Create a new codec
    pub fn new() -> Self {
        Self {
            pending_len: None,
            _marker: PhantomData,
        }
    }
}

impl<Rx, Tx> Default for JsonFrameCodec<Rx, Tx> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Rx: DeserializeOwned, Tx> Decoder for JsonFrameCodec<Rx, Tx> {
    type Item = Rx;
    type Error = FramingError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        // Try to decode the length prefix if we don't have one
        let payload_len = match self.pending_len.take() {
            Some(n) => n,
            None => match frame::decode_prefix(src)? {
                Some(n) => n,
                None => return Ok(None), // Need more data
            },
        };

        // Check if the full payload has arrived
        if src.len() < payload_len {
            // Save the length and wait for more data
            self.pending_len = Some(payload_len);
            return Ok(None);
        }

        // Extract exactly the declared payload, leaving any following frame
        let payload = src.split_to(payload_len);

        let message: Rx = serde_json::from_slice(&payload)?;
        Ok(Some(message))
    }
}

impl<Rx, Tx: Serialize> Encoder<Tx> for JsonFrameCodec<Rx, Tx> {
    type Error = FramingError;

    fn encode(&mut self, item: Tx, dst: &mut BytesMut) -> Result<(), FramingError> {
        let payload = serde_json::to_vec(&item)?;

        frame::encode_prefix(dst, payload.len())?;
        dst.extend_from_slice(&payload);

        Ok(())
    }
}
