//! Message framing over a byte stream.
//!
//! The same codec frames the TCP stream from a live sonar and the contents of a
//! capture file, so replay sees exactly the message boundaries the live path saw.

use bytes::{Buf, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::{trace, warn};

use super::format::{MAX_PAYLOAD_SIZE, MESSAGE_HEADER_SIZE, MessageHeader, OCULUS_ID, SimpleFire};
use crate::{Result, SonarError};

const ID_BYTES: [u8; 2] = OCULUS_ID.to_le_bytes();

/// Splits a byte stream into complete messages.
#[derive(Debug, Clone)]
pub struct MessageCodec {
    max_payload: usize,
    discarded: u64,
}

impl Default for MessageCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageCodec {
    pub fn new() -> Self {
        Self::with_max_payload(MAX_PAYLOAD_SIZE)
    }

    pub fn with_max_payload(max_payload: usize) -> Self {
        Self { max_payload, discarded: 0 }
    }

    /// Total bytes skipped while searching for a message start.
    pub fn discarded(&self) -> u64 {
        self.discarded
    }

    /// Drop everything before the next message id. Keeps a trailing first id byte,
    /// which may be the start of a header split across reads.
    fn resync(&mut self, src: &mut BytesMut) {
        let skip = match src.windows(2).position(|w| w == ID_BYTES) {
            Some(pos) => pos,
            None if src.last() == Some(&ID_BYTES[0]) => src.len() - 1,
            None => src.len(),
        };

        if skip > 0 {
            trace!(skipped = skip, "Discarded bytes while searching for message start");
            src.advance(skip);
            self.discarded += skip as u64;
        }
    }
}

impl Decoder for MessageCodec {
    type Item = Bytes;
    type Error = SonarError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>> {
        self.resync(src);

        if src.len() < MESSAGE_HEADER_SIZE {
            src.reserve(MESSAGE_HEADER_SIZE - src.len());
            return Ok(None);
        }

        let header = MessageHeader::parse(&src[..MESSAGE_HEADER_SIZE])?;
        let payload_size = header.payload_size as usize;
        if payload_size > self.max_payload {
            // Step past this id so the next call resynchronises on the following message.
            src.advance(ID_BYTES.len());
            self.discarded += ID_BYTES.len() as u64;
            return Err(SonarError::protocol(
                "Message framing",
                format!("payload of {} bytes exceeds limit of {}", payload_size, self.max_payload),
            ));
        }

        let total = header.message_len();
        if src.len() < total {
            src.reserve(total - src.len());
            return Ok(None);
        }

        Ok(Some(src.split_to(total).freeze()))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>> {
        match self.decode(src)? {
            Some(message) => Ok(Some(message)),
            None => {
                if !src.is_empty() {
                    warn!("Discarding {} trailing bytes of a partial message", src.len());
                    self.discarded += src.len() as u64;
                    src.clear();
                }
                Ok(None)
            }
        }
    }
}

impl Encoder<SimpleFire> for MessageCodec {
    type Error = SonarError;

    fn encode(&mut self, item: SimpleFire, dst: &mut BytesMut) -> Result<()> {
        item.encode(dst);
        Ok(())
    }
}
