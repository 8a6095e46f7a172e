//! Fan-shaped rendering of a polar sonar image into an RGB buffer.

use tracing::trace;

use super::{Renderer, SonarImage};

/// Pixels per range bin used by [`FanRenderer::default`].
pub const DEFAULT_PIX_PER_RANGE_BIN: u32 = 2;

/// Largest frame [`FanRenderer`] will allocate unless told otherwise.
pub const DEFAULT_MAX_SIZE: ImageSize = ImageSize::new(4096, 4096);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImageSize {
    pub width: u32,
    pub height: u32,
}

impl ImageSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn pixels(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

/// Caller-owned RGB8 image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageBuffer {
    size: ImageSize,
    data: Vec<u8>,
}

impl ImageBuffer {
    pub fn new(size: ImageSize) -> Self {
        Self { size, data: vec![0; size.pixels() * 3] }
    }

    pub fn size(&self) -> ImageSize {
        self.size
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn pixel(&self, x: u32, y: u32) -> [u8; 3] {
        let i = self.index(x, y);
        [self.data[i], self.data[i + 1], self.data[i + 2]]
    }

    pub fn clear(&mut self) {
        self.data.fill(0);
    }

    /// Overwrite with `other`, which must have the same size.
    pub(crate) fn copy_from(&mut self, other: &ImageBuffer) {
        debug_assert_eq!(self.size, other.size);
        self.data.copy_from_slice(&other.data);
    }

    fn put(&mut self, x: u32, y: u32, rgb: [u8; 3]) {
        let i = self.index(x, y);
        self.data[i..i + 3].copy_from_slice(&rgb);
    }

    fn index(&self, x: u32, y: u32) -> usize {
        (y as usize * self.size.width as usize + x as usize) * 3
    }
}

/// Size of the fan image for `image`, never smaller than `min_size` nor larger than
/// `max_size`.
///
/// Height covers every range bin at `pix_per_range_bin`; width is the chord spanned
/// by the widest beam. A ping too large for `max_size` is scaled down as a whole, so
/// the fan keeps its shape.
pub fn calculate_image_size(
    image: &dyn SonarImage,
    min_size: ImageSize,
    max_size: ImageSize,
    pix_per_range_bin: u32,
) -> ImageSize {
    let max_bearing = (0..image.n_bearings())
        .map(|n| image.bearing(n).abs())
        .fold(0.0f32, f32::max)
        .min(std::f32::consts::FRAC_PI_2);
    let aspect = 2.0 * f64::from(max_bearing.sin());

    let mut height = image.n_ranges() as f64 * f64::from(pix_per_range_bin);
    height = height.min(f64::from(max_size.height));
    if height * aspect > f64::from(max_size.width) {
        height = f64::from(max_size.width) / aspect;
    }
    let height = height.floor() as u32;
    let width = ((height as f64 * aspect).ceil() as u32).max(1);

    ImageSize::new(
        width.max(min_size.width).min(max_size.width),
        height.max(min_size.height).min(max_size.height),
    )
}

/// Draw `image` into `out` as a fan with its apex at the bottom centre.
///
/// Bearings are expected in ascending order. Pixels outside the fan are left black.
pub fn draw_sonar(image: &dyn SonarImage, out: &mut ImageBuffer) {
    out.clear();

    let n_bearings = image.n_bearings();
    let n_ranges = image.n_ranges();
    let size = out.size();
    if n_bearings == 0 || n_ranges == 0 || size.height == 0 || size.width == 0 {
        return;
    }

    let bearings: Vec<f32> = (0..n_bearings).map(|n| image.bearing(n)).collect();
    let (min_bearing, max_bearing) = (bearings[0], bearings[n_bearings - 1]);
    let half_beam = if n_bearings > 1 {
        (max_bearing - min_bearing) / (n_bearings - 1) as f32 / 2.0
    } else {
        0.0
    };

    let origin_x = size.width as f32 / 2.0;
    let bin_height = size.height as f32 / n_ranges as f32;

    for y in 0..size.height {
        for x in 0..size.width {
            let dx = x as f32 + 0.5 - origin_x;
            let dy = size.height as f32 - (y as f32 + 0.5);

            let range_bin = ((dx * dx + dy * dy).sqrt() / bin_height) as usize;
            if range_bin >= n_ranges {
                continue;
            }

            let azimuth = dx.atan2(dy);
            if azimuth < min_bearing - half_beam || azimuth > max_bearing + half_beam {
                continue;
            }

            let beam = nearest_bearing(&bearings, azimuth);
            let value = image.intensity(range_bin * n_bearings + beam);
            out.put(x, y, colormap(value));
        }
    }
}

fn nearest_bearing(bearings: &[f32], azimuth: f32) -> usize {
    let upper = bearings.partition_point(|&b| b < azimuth);
    if upper == 0 {
        0
    } else if upper == bearings.len() {
        bearings.len() - 1
    } else if (azimuth - bearings[upper - 1]) <= (bearings[upper] - azimuth) {
        upper - 1
    } else {
        upper
    }
}

/// Dark blue through cyan to white.
fn colormap(value: u8) -> [u8; 3] {
    let v = value as u16;
    let r = v.saturating_sub(128) * 2;
    let g = v;
    let b = (64 + v).min(255);
    if value == 0 { [0, 0, 32] } else { [r.min(255) as u8, g as u8, b as u8] }
}

/// Renders every ping into an owned frame buffer and keeps the latest frame.
#[derive(Debug)]
pub struct FanRenderer {
    pix_per_range_bin: u32,
    min_size: ImageSize,
    max_size: ImageSize,
    frame: Option<ImageBuffer>,
    frames_rendered: u64,
}

impl Default for FanRenderer {
    fn default() -> Self {
        Self::new(DEFAULT_PIX_PER_RANGE_BIN)
    }
}

impl FanRenderer {
    pub fn new(pix_per_range_bin: u32) -> Self {
        Self {
            pix_per_range_bin: pix_per_range_bin.max(1),
            min_size: ImageSize::default(),
            max_size: DEFAULT_MAX_SIZE,
            frame: None,
            frames_rendered: 0,
        }
    }

    pub fn with_min_size(mut self, min_size: ImageSize) -> Self {
        self.min_size = min_size;
        self
    }

    /// Cap on the frame size; pings that would exceed it are drawn at a coarser scale.
    pub fn with_max_size(mut self, max_size: ImageSize) -> Self {
        self.max_size = ImageSize::new(max_size.width.max(1), max_size.height.max(1));
        self
    }

    pub fn latest(&self) -> Option<&ImageBuffer> {
        self.frame.as_ref()
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered
    }
}

impl Renderer for FanRenderer {
    fn render(&mut self, image: &dyn SonarImage) {
        let size =
            calculate_image_size(image, self.min_size, self.max_size, self.pix_per_range_bin);
        if self.frame.as_ref().map(ImageBuffer::size) != Some(size) {
            self.frame = Some(ImageBuffer::new(size));
        }
        let frame = self.frame.get_or_insert_with(|| ImageBuffer::new(size));

        draw_sonar(image, frame);
        self.frames_rendered += 1;
        trace!(width = size.width, height = size.height, "Rendered sonar frame");
    }
}
