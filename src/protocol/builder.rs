//! Construction of well-formed (or deliberately malformed) messages.
//!
//! Used by simulators, benchmarks and tests to produce byte-exact sonar traffic
//! without a device.

use bytes::{BufMut, Bytes, BytesMut};

use super::format::{
    MESSAGE_HEADER_SIZE, MessageHeader, MessageId, SIMPLE_PING_FIXED_SIZE, SimplePingFields,
};

/// Wrap an arbitrary payload in a message header.
pub fn build_message(msg_id: MessageId, payload: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(MESSAGE_HEADER_SIZE + payload.len());
    MessageHeader::new(msg_id, payload.len() as u32).encode(&mut buf);
    buf.put_slice(payload);
    buf.freeze()
}

/// Builder for simple ping result messages.
///
/// Bearings are spread evenly across the aperture, intensities default to a
/// range-proportional ramp.
#[derive(Debug, Clone)]
pub struct SimplePingBuilder {
    ping_id: u32,
    n_ranges: u16,
    n_beams: u16,
    range_resolution: f64,
    aperture_deg: f64,
    frequency: f64,
    speed_of_sound: f64,
    data_size: u8,
    intensities: Option<Vec<u8>>,
}

impl Default for SimplePingBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SimplePingBuilder {
    pub fn new() -> Self {
        Self {
            ping_id: 0,
            n_ranges: 16,
            n_beams: 8,
            range_resolution: 0.05,
            aperture_deg: 130.0,
            frequency: 1.2e6,
            speed_of_sound: 1500.0,
            data_size: 0,
            intensities: None,
        }
    }

    pub fn ping_id(mut self, ping_id: u32) -> Self {
        self.ping_id = ping_id;
        self
    }

    pub fn dimensions(mut self, n_ranges: u16, n_beams: u16) -> Self {
        self.n_ranges = n_ranges;
        self.n_beams = n_beams;
        self
    }

    pub fn range_resolution(mut self, range_resolution: f64) -> Self {
        self.range_resolution = range_resolution;
        self
    }

    pub fn aperture_deg(mut self, aperture_deg: f64) -> Self {
        self.aperture_deg = aperture_deg;
        self
    }

    /// Override the image data format byte. Anything but 0 decodes as invalid.
    pub fn data_size(mut self, data_size: u8) -> Self {
        self.data_size = data_size;
        self
    }

    /// Explicit intensities, range-major with bearings varying fastest.
    pub fn intensities(mut self, intensities: Vec<u8>) -> Self {
        self.intensities = Some(intensities);
        self
    }

    /// Bearing table in hundredths of a degree.
    pub fn bearings(&self) -> Vec<i16> {
        let n = self.n_beams as usize;
        if n == 0 {
            return Vec::new();
        }
        let half = self.aperture_deg / 2.0;
        let step = if n > 1 { self.aperture_deg / (n - 1) as f64 } else { 0.0 };
        (0..n)
            .map(|i| {
                let deg = if n > 1 { -half + step * i as f64 } else { 0.0 };
                (deg * 100.0).round() as i16
            })
            .collect()
    }

    pub fn build(&self) -> Bytes {
        let n_cells = self.n_ranges as usize * self.n_beams as usize;
        let image = match &self.intensities {
            Some(values) => values.clone(),
            None => (0..n_cells)
                .map(|i| {
                    let range_bin = i / (self.n_beams.max(1) as usize);
                    ((range_bin * 255) / (self.n_ranges.max(1) as usize)) as u8
                })
                .collect(),
        };

        let bearings = self.bearings();
        let image_offset = MESSAGE_HEADER_SIZE + SIMPLE_PING_FIXED_SIZE + bearings.len() * 2;
        let message_size = image_offset + image.len();

        let fields = SimplePingFields {
            ping_id: self.ping_id,
            status: 0,
            frequency: self.frequency,
            temperature: 12.5,
            pressure: 1.0,
            speed_of_sound: self.speed_of_sound,
            ping_start_time: self.ping_id.wrapping_mul(100),
            data_size: self.data_size,
            master_mode: 2,
            range_resolution: self.range_resolution,
            n_ranges: self.n_ranges,
            n_beams: self.n_beams,
            image_offset: image_offset as u32,
            image_size: image.len() as u32,
            message_size: message_size as u32,
        };

        let mut buf = BytesMut::with_capacity(message_size);
        MessageHeader::new(MessageId::SimplePingResult, (message_size - MESSAGE_HEADER_SIZE) as u32)
            .encode(&mut buf);
        fields.encode(&mut buf);
        for bearing in bearings {
            buf.put_i16_le(bearing);
        }
        buf.put_slice(&image);
        buf.freeze()
    }
}
