//! Decoded sonar pings

use bytes::Bytes;
use std::f32::consts::PI;
use thiserror::Error;
use tracing::debug;

use crate::protocol::format::{
    MESSAGE_HEADER_SIZE, MessageHeader, MessageId, SIMPLE_PING_FIXED_SIZE, SimplePingFields,
    parse_i16_le,
};
use crate::render::SonarImage;

/// Why a message did not decode into a usable ping.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidPing {
    #[error("message shorter than its header or fixed fields")]
    Truncated,

    #[error("bad message id {0:#06x}")]
    BadId(u16),

    #[error("message length mismatch: declared {declared}, actual {actual}")]
    LengthMismatch { declared: usize, actual: usize },

    #[error("not a ping result ({0:?})")]
    NotAPing(MessageId),

    #[error("unsupported image data size {0}")]
    UnsupportedDataSize(u8),

    #[error("ping has no beams or no range bins")]
    EmptyImage,

    #[error("image of {size} bytes at offset {offset} does not fit the message")]
    ImageOutOfBounds { offset: usize, size: usize },
}

/// One decoded sonar return.
///
/// The raw bytes are always kept, valid or not. Geometry is only present on a
/// valid ping, so bearing/range/intensity access on an invalid ping is not possible.
#[derive(Debug, Clone)]
pub struct Ping {
    raw: Bytes,
    header: Option<MessageHeader>,
    content: Result<PingGeometry, InvalidPing>,
}

/// Beam geometry and image of a valid ping.
#[derive(Debug, Clone, PartialEq)]
pub struct PingGeometry {
    pub ping_id: u32,
    pub status: u32,
    pub frequency: f64,
    pub temperature: f64,
    pub pressure: f64,
    pub speed_of_sound: f64,
    pub ping_start_time: u32,
    pub master_mode: u8,
    pub range_resolution: f64,
    pub n_ranges: usize,
    /// Hundredths of a degree, as carried on the wire
    pub bearings: Vec<i16>,
    /// `n_ranges * n_beams` bytes, bearings varying fastest
    pub image: Bytes,
}

impl Ping {
    /// Decode one complete message. Never fails; problems produce an invalid ping.
    pub fn decode(raw: Bytes) -> Self {
        let header = MessageHeader::parse(&raw).ok();
        let content = match header {
            Some(header) => decode_simple_ping(&raw, &header),
            None => Err(InvalidPing::Truncated),
        };
        Self { raw, header, content }
    }

    pub fn valid(&self) -> bool {
        self.content.is_ok()
    }

    /// Exact bytes of the message this ping was decoded from.
    pub fn raw(&self) -> &Bytes {
        &self.raw
    }

    pub fn size(&self) -> usize {
        self.raw.len()
    }

    pub fn header(&self) -> Option<&MessageHeader> {
        self.header.as_ref()
    }

    pub fn geometry(&self) -> Option<&PingGeometry> {
        self.content.as_ref().ok()
    }

    pub fn invalid_reason(&self) -> Option<&InvalidPing> {
        self.content.as_ref().err()
    }

    /// Log ping metadata at debug level.
    pub fn log_summary(&self) {
        match &self.content {
            Ok(geometry) => debug!(
                ping_id = geometry.ping_id,
                frequency = geometry.frequency,
                temperature = geometry.temperature,
                pressure = geometry.pressure,
                speed_of_sound = geometry.speed_of_sound,
                n_ranges = geometry.n_ranges,
                n_beams = geometry.bearings.len(),
                range_resolution = geometry.range_resolution,
                bytes = self.raw.len(),
                "Ping"
            ),
            Err(reason) => debug!(bytes = self.raw.len(), %reason, "Invalid ping"),
        }
    }
}

impl PingGeometry {
    pub fn n_beams(&self) -> usize {
        self.bearings.len()
    }

    /// Furthest range covered by the image in metres.
    pub fn max_range(&self) -> f64 {
        self.range_resolution * self.n_ranges as f64
    }
}

impl SonarImage for PingGeometry {
    fn n_bearings(&self) -> usize {
        self.bearings.len()
    }

    fn bearing(&self, n: usize) -> f32 {
        self.bearings[n] as f32 / 100.0 * PI / 180.0
    }

    fn n_ranges(&self) -> usize {
        self.n_ranges
    }

    fn range(&self, n: usize) -> f32 {
        (self.range_resolution * n as f64) as f32
    }

    fn intensity(&self, i: usize) -> u8 {
        let n_beams = self.bearings.len();
        let (beam, range_bin) = (i % n_beams, i / n_beams);
        self.image[range_bin * n_beams + beam]
    }
}

fn decode_simple_ping(raw: &Bytes, header: &MessageHeader) -> Result<PingGeometry, InvalidPing> {
    if !header.has_valid_id() {
        return Err(InvalidPing::BadId(header.oculus_id));
    }
    if header.message_len() != raw.len() {
        return Err(InvalidPing::LengthMismatch {
            declared: header.message_len(),
            actual: raw.len(),
        });
    }
    if header.msg_id != MessageId::SimplePingResult {
        return Err(InvalidPing::NotAPing(header.msg_id));
    }

    let payload = &raw[MESSAGE_HEADER_SIZE..];
    let fields = SimplePingFields::parse(payload).map_err(|_| InvalidPing::Truncated)?;

    if fields.data_size != 0 {
        return Err(InvalidPing::UnsupportedDataSize(fields.data_size));
    }
    if fields.n_beams == 0 || fields.n_ranges == 0 {
        return Err(InvalidPing::EmptyImage);
    }
    if fields.message_size as usize != raw.len() {
        return Err(InvalidPing::LengthMismatch {
            declared: fields.message_size as usize,
            actual: raw.len(),
        });
    }

    let n_beams = fields.n_beams as usize;
    let bearings = (0..n_beams)
        .map(|i| parse_i16_le(payload, SIMPLE_PING_FIXED_SIZE + i * 2))
        .collect::<crate::Result<Vec<i16>>>()
        .map_err(|_| InvalidPing::Truncated)?;

    let offset = fields.image_offset as usize;
    let size = fields.image_size as usize;
    if size != n_beams * fields.n_ranges as usize || offset.saturating_add(size) > raw.len() {
        return Err(InvalidPing::ImageOutOfBounds { offset, size });
    }

    Ok(PingGeometry {
        ping_id: fields.ping_id,
        status: fields.status,
        frequency: fields.frequency,
        temperature: fields.temperature,
        pressure: fields.pressure,
        speed_of_sound: fields.speed_of_sound,
        ping_start_time: fields.ping_start_time,
        master_mode: fields.master_mode,
        range_resolution: fields.range_resolution,
        n_ranges: fields.n_ranges as usize,
        bearings,
        image: raw.slice(offset..offset + size),
    })
}
