//! Renderer boundary.
//!
//! The pipeline hands every valid ping to a [`Renderer`] through the [`SonarImage`]
//! view. Rendering is a side effect; nothing it produces flows back into the pipeline.

mod fan;
mod publish;
pub mod snapshot;

pub use fan::{
    DEFAULT_MAX_SIZE, DEFAULT_PIX_PER_RANGE_BIN, FanRenderer, ImageBuffer, ImageSize,
    calculate_image_size, draw_sonar,
};
pub use publish::{LatestFrame, PublishingRenderer};

/// Polar image as seen by a renderer.
pub trait SonarImage {
    /// Number of beams.
    fn n_bearings(&self) -> usize;

    /// Beam angle in radians, zero straight ahead, positive to starboard.
    fn bearing(&self, n: usize) -> f32;

    /// Number of range bins.
    fn n_ranges(&self) -> usize;

    /// Range of bin `n` in metres.
    fn range(&self, n: usize) -> f32;

    /// Intensity of cell `i`, where `i = range_bin * n_bearings + beam`.
    fn intensity(&self, i: usize) -> u8;
}

/// Consumer of rendered pings.
pub trait Renderer: Send + 'static {
    fn render(&mut self, image: &dyn SonarImage);
}

impl<R: Renderer + ?Sized> Renderer for Box<R> {
    fn render(&mut self, image: &dyn SonarImage) {
        (**self).render(image)
    }
}
