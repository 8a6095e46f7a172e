//! Hand-off of rendered frames to a display on another thread.

use std::sync::{Arc, Mutex, TryLockError};

use super::{FanRenderer, ImageBuffer, Renderer, SonarImage};

/// Latest rendered frame, shared between the renderer and whoever shows it.
#[derive(Debug, Clone, Default)]
pub struct LatestFrame {
    slot: Arc<Mutex<Published>>,
}

#[derive(Debug, Default)]
struct Published {
    frame: Option<ImageBuffer>,
    sequence: u64,
}

impl LatestFrame {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the held frame.
    ///
    /// Never waits on a reader. If the slot is busy the frame is skipped and false is
    /// returned; the next ping brings a fresh one.
    pub fn publish(&self, frame: &ImageBuffer) -> bool {
        let mut published = match self.slot.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => return false,
        };

        match &mut published.frame {
            Some(held) if held.size() == frame.size() => held.copy_from(frame),
            held => *held = Some(frame.clone()),
        }
        published.sequence += 1;
        true
    }

    /// Copy of the frame if one was published after `seen`, updating `seen`.
    pub fn fetch_newer(&self, seen: &mut u64) -> Option<ImageBuffer> {
        let published = self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if published.sequence <= *seen {
            return None;
        }
        *seen = published.sequence;
        published.frame.clone()
    }

    /// Copy of the most recent frame.
    pub fn latest(&self) -> Option<ImageBuffer> {
        let published = self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        published.frame.clone()
    }

    /// Number of frames published so far.
    pub fn sequence(&self) -> u64 {
        self.slot.lock().map(|published| published.sequence).unwrap_or(0)
    }
}

/// [`FanRenderer`] that also publishes each frame to a [`LatestFrame`].
#[derive(Debug)]
pub struct PublishingRenderer {
    fan: FanRenderer,
    frames: LatestFrame,
}

impl PublishingRenderer {
    pub fn new(fan: FanRenderer, frames: LatestFrame) -> Self {
        Self { fan, frames }
    }

    pub fn fan(&self) -> &FanRenderer {
        &self.fan
    }

    pub fn frames(&self) -> &LatestFrame {
        &self.frames
    }
}

impl Renderer for PublishingRenderer {
    fn render(&mut self, image: &dyn SonarImage) {
        self.fan.render(image);
        if let Some(frame) = self.fan.latest() {
            self.frames.publish(frame);
        }
    }
}
