//! Wire structures for the sonar's binary message protocol.
//!
//! Every message on the wire (and every record in a capture file) starts with the same
//! 16-byte header followed by `payload_size` bytes of payload:
//!
//! 1. **Message Header** (16 bytes) - id, device ids, message id, version, payload size
//! 2. **Payload** - layout selected by the message id
//!
//! The only payload the controller cares about is the *simple ping result*:
//!
//! ```text
//! offset  type      field
//!      0  u32       ping_id
//!      4  u32       status
//!      8  f64       frequency
//!     16  f64       temperature
//!     24  f64       pressure
//!     32  f64       speed_of_sound
//!     40  u32       ping_start_time
//!     44  u8        data_size (0 = 8-bit)
//!     45  u8        master_mode
//!     46  u16       reserved
//!     48  f64       range_resolution
//!     56  u16       n_ranges
//!     58  u16       n_beams
//!     60  u32       image_offset (from message start)
//!     64  u32       image_size
//!     68  u32       message_size
//!     72  i16 * n   bearings (hundredths of a degree)
//! ```
//!
//! All integers and floats are little-endian.

use bytes::{BufMut, BytesMut};
use std::net::Ipv4Addr;
use tracing::trace;

use crate::types::PingRate;
use crate::{Result, SonarError};

/// Magic value in the first two bytes of every message.
pub const OCULUS_ID: u16 = 0x4f53;
/// Size of [`MessageHeader`] on the wire.
pub const MESSAGE_HEADER_SIZE: usize = 16;
/// Fixed part of the simple ping result payload, before the bearing table.
pub const SIMPLE_PING_FIXED_SIZE: usize = 72;
/// Simple fire payload size.
pub const SIMPLE_FIRE_PAYLOAD_SIZE: usize = 37;
/// Status broadcast payload size.
pub const STATUS_PAYLOAD_SIZE: usize = 20;
/// Largest payload the framing layer accepts.
pub const MAX_PAYLOAD_SIZE: usize = 16 * 1024 * 1024;
/// TCP port the sonar serves ping data on.
pub const DATA_PORT: u16 = 52100;
/// UDP port the sonar broadcasts status messages on.
pub const STATUS_PORT: u16 = 52102;

/// Message identifiers carried in [`MessageHeader::msg_id`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageId {
    SimpleFire,
    PingResult,
    SimplePingResult,
    UserConfig,
    Status,
    Dummy,
    Unknown(u16),
}

impl MessageId {
    pub fn from_u16(value: u16) -> Self {
        match value {
            0x15 => MessageId::SimpleFire,
            0x22 => MessageId::PingResult,
            0x23 => MessageId::SimplePingResult,
            0x55 => MessageId::UserConfig,
            0x61 => MessageId::Status,
            0xff => MessageId::Dummy,
            other => MessageId::Unknown(other),
        }
    }

    pub fn as_u16(self) -> u16 {
        match self {
            MessageId::SimpleFire => 0x15,
            MessageId::PingResult => 0x22,
            MessageId::SimplePingResult => 0x23,
            MessageId::UserConfig => 0x55,
            MessageId::Status => 0x61,
            MessageId::Dummy => 0xff,
            MessageId::Unknown(other) => other,
        }
    }
}

/// Common header at the start of every message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHeader {
    pub oculus_id: u16,
    pub src_device_id: u16,
    pub dst_device_id: u16,
    pub msg_id: MessageId,
    pub msg_version: u16,
    pub payload_size: u32,
}

impl MessageHeader {
    pub const SIZE: usize = MESSAGE_HEADER_SIZE;

    /// Header for a message originating from this client.
    pub fn new(msg_id: MessageId, payload_size: u32) -> Self {
        Self {
            oculus_id: OCULUS_ID,
            src_device_id: 0,
            dst_device_id: 0,
            msg_id,
            msg_version: 0,
            payload_size,
        }
    }

    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < MESSAGE_HEADER_SIZE {
            return Err(SonarError::protocol(
                "Message header",
                format!("need {} bytes, have {}", MESSAGE_HEADER_SIZE, data.len()),
            ));
        }

        Ok(Self {
            oculus_id: parse_u16_le(data, 0)?,
            src_device_id: parse_u16_le(data, 2)?,
            dst_device_id: parse_u16_le(data, 4)?,
            msg_id: MessageId::from_u16(parse_u16_le(data, 6)?),
            msg_version: parse_u16_le(data, 8)?,
            payload_size: parse_u32_le(data, 10)?,
        })
    }

    pub fn has_valid_id(&self) -> bool {
        self.oculus_id == OCULUS_ID
    }

    /// Total length of the message this header introduces.
    pub fn message_len(&self) -> usize {
        MESSAGE_HEADER_SIZE + self.payload_size as usize
    }

    pub fn encode(&self, dst: &mut BytesMut) {
        dst.reserve(MESSAGE_HEADER_SIZE);
        dst.put_u16_le(self.oculus_id);
        dst.put_u16_le(self.src_device_id);
        dst.put_u16_le(self.dst_device_id);
        dst.put_u16_le(self.msg_id.as_u16());
        dst.put_u16_le(self.msg_version);
        dst.put_u32_le(self.payload_size);
        dst.put_u16_le(0);
    }
}

/// Fixed fields of a simple ping result payload.
#[derive(Debug, Clone, PartialEq)]
pub struct SimplePingFields {
    pub ping_id: u32,
    pub status: u32,
    pub frequency: f64,
    pub temperature: f64,
    pub pressure: f64,
    pub speed_of_sound: f64,
    pub ping_start_time: u32,
    pub data_size: u8,
    pub master_mode: u8,
    pub range_resolution: f64,
    pub n_ranges: u16,
    pub n_beams: u16,
    pub image_offset: u32,
    pub image_size: u32,
    pub message_size: u32,
}

impl SimplePingFields {
    /// Parse the fixed part of a simple ping payload (header already stripped).
    pub fn parse(payload: &[u8]) -> Result<Self> {
        if payload.len() < SIMPLE_PING_FIXED_SIZE {
            return Err(SonarError::protocol(
                "Simple ping payload",
                format!("need {} bytes, have {}", SIMPLE_PING_FIXED_SIZE, payload.len()),
            ));
        }

        let fields = Self {
            ping_id: parse_u32_le(payload, 0)?,
            status: parse_u32_le(payload, 4)?,
            frequency: parse_f64_le(payload, 8)?,
            temperature: parse_f64_le(payload, 16)?,
            pressure: parse_f64_le(payload, 24)?,
            speed_of_sound: parse_f64_le(payload, 32)?,
            ping_start_time: parse_u32_le(payload, 40)?,
            data_size: payload[44],
            master_mode: payload[45],
            range_resolution: parse_f64_le(payload, 48)?,
            n_ranges: parse_u16_le(payload, 56)?,
            n_beams: parse_u16_le(payload, 58)?,
            image_offset: parse_u32_le(payload, 60)?,
            image_size: parse_u32_le(payload, 64)?,
            message_size: parse_u32_le(payload, 68)?,
        };

        trace!(
            ping_id = fields.ping_id,
            n_ranges = fields.n_ranges,
            n_beams = fields.n_beams,
            "Parsed simple ping fields"
        );

        Ok(fields)
    }

    pub fn encode(&self, dst: &mut BytesMut) {
        dst.reserve(SIMPLE_PING_FIXED_SIZE);
        dst.put_u32_le(self.ping_id);
        dst.put_u32_le(self.status);
        dst.put_f64_le(self.frequency);
        dst.put_f64_le(self.temperature);
        dst.put_f64_le(self.pressure);
        dst.put_f64_le(self.speed_of_sound);
        dst.put_u32_le(self.ping_start_time);
        dst.put_u8(self.data_size);
        dst.put_u8(self.master_mode);
        dst.put_u16_le(0);
        dst.put_f64_le(self.range_resolution);
        dst.put_u16_le(self.n_ranges);
        dst.put_u16_le(self.n_beams);
        dst.put_u32_le(self.image_offset);
        dst.put_u32_le(self.image_size);
        dst.put_u32_le(self.message_size);
    }
}

/// Configuration message that tells the sonar how (and whether) to ping.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimpleFire {
    pub master_mode: u8,
    pub ping_rate: PingRate,
    pub network_speed: u8,
    pub gamma: u8,
    pub flags: u8,
    pub range: f64,
    pub gain: f64,
    pub speed_of_sound: f64,
    pub salinity: f64,
}

impl SimpleFire {
    /// Encode header and payload.
    pub fn encode(&self, dst: &mut BytesMut) {
        MessageHeader::new(MessageId::SimpleFire, SIMPLE_FIRE_PAYLOAD_SIZE as u32).encode(dst);
        dst.reserve(SIMPLE_FIRE_PAYLOAD_SIZE);
        dst.put_u8(self.master_mode);
        dst.put_u8(self.ping_rate.wire_code());
        dst.put_u8(self.network_speed);
        dst.put_u8(self.gamma);
        dst.put_u8(self.flags);
        dst.put_f64_le(self.range);
        dst.put_f64_le(self.gain);
        dst.put_f64_le(self.speed_of_sound);
        dst.put_f64_le(self.salinity);
    }

    /// Parse a complete simple fire message.
    pub fn parse(message: &[u8]) -> Result<Self> {
        let header = MessageHeader::parse(message)?;
        if header.msg_id != MessageId::SimpleFire {
            return Err(SonarError::protocol(
                "Simple fire",
                format!("unexpected message id {:?}", header.msg_id),
            ));
        }
        let payload = &message[MESSAGE_HEADER_SIZE..];
        if payload.len() < SIMPLE_FIRE_PAYLOAD_SIZE {
            return Err(SonarError::protocol(
                "Simple fire",
                format!("need {} payload bytes, have {}", SIMPLE_FIRE_PAYLOAD_SIZE, payload.len()),
            ));
        }

        Ok(Self {
            master_mode: payload[0],
            ping_rate: PingRate::from_wire_code(payload[1])?,
            network_speed: payload[2],
            gamma: payload[3],
            flags: payload[4],
            range: parse_f64_le(payload, 5)?,
            gain: parse_f64_le(payload, 13)?,
            speed_of_sound: parse_f64_le(payload, 21)?,
            salinity: parse_f64_le(payload, 29)?,
        })
    }
}

/// Periodic UDP status broadcast, used for auto-discovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusMessage {
    pub device_id: u32,
    pub device_type: u16,
    pub part_number: u16,
    pub status: u32,
    pub ip_addr: Ipv4Addr,
    pub subnet_mask: Ipv4Addr,
}

impl StatusMessage {
    pub fn parse(message: &[u8]) -> Result<Self> {
        let header = MessageHeader::parse(message)?;
        if !header.has_valid_id() || header.msg_id != MessageId::Status {
            return Err(SonarError::protocol(
                "Status message",
                format!("not a status message (id {:#06x}, {:?})", header.oculus_id, header.msg_id),
            ));
        }
        let payload = &message[MESSAGE_HEADER_SIZE..];
        if payload.len() < STATUS_PAYLOAD_SIZE {
            return Err(SonarError::protocol(
                "Status message",
                format!("need {} payload bytes, have {}", STATUS_PAYLOAD_SIZE, payload.len()),
            ));
        }

        Ok(Self {
            device_id: parse_u32_le(payload, 0)?,
            device_type: parse_u16_le(payload, 4)?,
            part_number: parse_u16_le(payload, 6)?,
            status: parse_u32_le(payload, 8)?,
            ip_addr: Ipv4Addr::new(payload[12], payload[13], payload[14], payload[15]),
            subnet_mask: Ipv4Addr::new(payload[16], payload[17], payload[18], payload[19]),
        })
    }

    pub fn encode(&self, dst: &mut BytesMut) {
        MessageHeader::new(MessageId::Status, STATUS_PAYLOAD_SIZE as u32).encode(dst);
        dst.put_u32_le(self.device_id);
        dst.put_u16_le(self.device_type);
        dst.put_u16_le(self.part_number);
        dst.put_u32_le(self.status);
        dst.put_slice(&self.ip_addr.octets());
        dst.put_slice(&self.subnet_mask.octets());
    }
}

pub(crate) fn parse_u16_le(data: &[u8], offset: usize) -> Result<u16> {
    let bytes = field_bytes::<2>(data, offset, "u16")?;
    Ok(u16::from_le_bytes(bytes))
}

pub(crate) fn parse_i16_le(data: &[u8], offset: usize) -> Result<i16> {
    let bytes = field_bytes::<2>(data, offset, "i16")?;
    Ok(i16::from_le_bytes(bytes))
}

pub(crate) fn parse_u32_le(data: &[u8], offset: usize) -> Result<u32> {
    let bytes = field_bytes::<4>(data, offset, "u32")?;
    Ok(u32::from_le_bytes(bytes))
}

pub(crate) fn parse_f64_le(data: &[u8], offset: usize) -> Result<f64> {
    let bytes = field_bytes::<8>(data, offset, "f64")?;
    Ok(f64::from_le_bytes(bytes))
}

fn field_bytes<const N: usize>(data: &[u8], offset: usize, kind: &str) -> Result<[u8; N]> {
    let end = offset.checked_add(N);
    end.and_then(|end| data.get(offset..end))
        .and_then(|slice| slice.try_into().ok())
        .ok_or_else(|| {
            SonarError::protocol(
                "Integer parsing",
                format!(
                    "Insufficient data for {} at offset {} (need {} bytes, have {})",
                    kind,
                    offset,
                    N,
                    data.len().saturating_sub(offset)
                ),
            )
        })
}
