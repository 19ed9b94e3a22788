//! Bolt protocol codec for tokio_util.
//!
//! Implements chunked message framing. Each message is split into chunks with
//! a 2-byte big-endian length prefix and terminated by a zero-length chunk.

use std::sync::Arc;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use super::message::{BoltRequest, BoltResponse};
use super::packstream::{encode_structure, PackStreamDecoder, DEFAULT_MAX_DEPTH};
use super::registry::StructRegistry;
use super::BoltError;

/// Maximum chunk size (16KB)
pub const MAX_CHUNK_SIZE: usize = 16384;

/// Default maximum message size (16MB)
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// End of message marker (0x00 0x00)
pub const END_MARKER: [u8; 2] = [0x00, 0x00];

/// Chunk framing codec. Yields the payload of each complete message.
///
/// Empty messages (a bare end marker) are NOOP keep-alives and are skipped.
#[derive(Debug)]
pub struct BoltCodec {
    max_message_size: usize,
    message_buffer: BytesMut,
}

impl BoltCodec {
    /// Create a new codec with default settings.
    pub fn new() -> Self {
        Self::with_max_size(DEFAULT_MAX_MESSAGE_SIZE)
    }

    /// Create a codec with custom max message size.
    pub fn with_max_size(max_message_size: usize) -> Self {
        Self {
            max_message_size,
            message_buffer: BytesMut::with_capacity(4096),
        }
    }

    /// Write `data` as one chunked message.
    pub fn write_message(data: &[u8], dst: &mut BytesMut) {
        dst.reserve(data.len() + 2 * (data.len() / MAX_CHUNK_SIZE + 2));
        for chunk in data.chunks(MAX_CHUNK_SIZE) {
            dst.put_u16(chunk.len() as u16);
            dst.put_slice(chunk);
        }
        dst.put_slice(&END_MARKER);
    }
}

impl Default for BoltCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for BoltCodec {
    type Item = Bytes;
    type Error = BoltError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            if src.len() < 2 {
                return Ok(None);
            }

            let chunk_size = u16::from_be_bytes([src[0], src[1]]) as usize;

            if chunk_size == 0 {
                src.advance(2);
                if self.message_buffer.is_empty() {
                    continue;
                }
                return Ok(Some(self.message_buffer.split().freeze()));
            }

            if self.message_buffer.len() + chunk_size > self.max_message_size {
                return Err(BoltError::MessageTooLarge {
                    size: self.message_buffer.len() + chunk_size,
                    max: self.max_message_size,
                });
            }

            if src.len() < 2 + chunk_size {
                src.reserve(2 + chunk_size - src.len());
                return Ok(None);
            }

            src.advance(2);
            self.message_buffer.extend_from_slice(&src[..chunk_size]);
            src.advance(chunk_size);
        }
    }
}

impl Encoder<Bytes> for BoltCodec {
    type Error = BoltError;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<(), Self::Error> {
        Self::write_message(&item, dst);
        Ok(())
    }
}

/// Server-side codec: decodes requests through the negotiated registry and
/// encodes responses through its encoders.
#[derive(Debug)]
pub struct BoltServerCodec {
    framing: BoltCodec,
    registry: Arc<StructRegistry>,
    max_depth: usize,
    scratch: Vec<u8>,
}

impl BoltServerCodec {
    /// Create a codec bound to a negotiated registry.
    pub fn new(registry: Arc<StructRegistry>) -> Self {
        Self {
            framing: BoltCodec::new(),
            registry,
            max_depth: DEFAULT_MAX_DEPTH,
            scratch: Vec::with_capacity(256),
        }
    }

    /// Set the largest accepted message.
    pub fn with_max_message_size(mut self, max: usize) -> Self {
        self.framing = BoltCodec::with_max_size(max);
        self
    }

    /// Set the deepest accepted value nesting.
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }
}

impl Decoder for BoltServerCodec {
    type Item = BoltRequest;
    type Error = BoltError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.framing.decode(src)? {
            Some(payload) => self.registry.decode(&payload, self.max_depth).map(Some),
            None => Ok(None),
        }
    }
}

impl Encoder<BoltResponse> for BoltServerCodec {
    type Error = BoltError;

    fn encode(&mut self, item: BoltResponse, dst: &mut BytesMut) -> Result<(), Self::Error> {
        self.scratch.clear();
        self.registry.encode(&item, &mut self.scratch)?;
        BoltCodec::write_message(&self.scratch, dst);
        Ok(())
    }
}

/// Client-side codec: encodes requests in their newest shape and decodes responses.
#[derive(Debug, Default)]
pub struct BoltClientCodec {
    framing: BoltCodec,
}

impl BoltClientCodec {
    /// Create a new client codec.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Decoder for BoltClientCodec {
    type Item = BoltResponse;
    type Error = BoltError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let Some(payload) = self.framing.decode(src)? else {
            return Ok(None);
        };
        let mut decoder = PackStreamDecoder::new(&payload);
        let (count, tag) = decoder.read_struct_header()?;
        let fields = decoder.decode_fields(count)?;
        let structure = crate::bolt::packstream::PackStreamStructure::new(tag, fields);
        Ok(Some(BoltResponse::from_structure(structure)?))
    }
}

impl Encoder<BoltRequest> for BoltClientCodec {
    type Error = BoltError;

    fn encode(&mut self, item: BoltRequest, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let bytes = encode_structure(&item.to_structure())?;
        BoltCodec::write_message(&bytes, dst);
        Ok(())
    }
}
