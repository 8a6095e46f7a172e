//! Window showing the latest rendered ping.
//!
//! The viewer owns the main thread while the session runs on a worker. It polls a
//! [`LatestFrame`] for new frames, closes itself once the session has finished, and
//! turns a user closing the window into an interrupt.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tracing::info;

use crate::render::{ImageBuffer, LatestFrame};
use crate::signal::ProcessControl;

const WINDOW_TITLE: &str = "sonarlink";
const REPAINT_INTERVAL: Duration = Duration::from_millis(30);

pub struct SonarViewer {
    frames: LatestFrame,
    control: ProcessControl,
    finished: Arc<AtomicBool>,
    texture: Option<egui::TextureHandle>,
    seen: u64,
}

impl SonarViewer {
    pub fn new(frames: LatestFrame, control: ProcessControl, finished: Arc<AtomicBool>) -> Self {
        Self { frames, control, finished, texture: None, seen: 0 }
    }

    fn refresh_texture(&mut self, ctx: &egui::Context) {
        let Some(frame) = self.frames.fetch_newer(&mut self.seen) else {
            return;
        };
        let image = color_image(&frame);
        match &mut self.texture {
            Some(texture) => texture.set(image, egui::TextureOptions::LINEAR),
            None => {
                self.texture = Some(ctx.load_texture("sonar", image, egui::TextureOptions::LINEAR))
            }
        }
    }
}

fn color_image(frame: &ImageBuffer) -> egui::ColorImage {
    let size = frame.size();
    egui::ColorImage::from_rgb([size.width as usize, size.height as usize], frame.as_bytes())
}

impl eframe::App for SonarViewer {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        if self.finished.load(Ordering::Acquire) {
            ctx.send_viewport_cmd(egui::ViewportCommand::Close);
        }
        self.refresh_texture(ctx);

        egui::TopBottomPanel::bottom("status").show(ctx, |ui| {
            ui.label(format!("{} frames", self.seen));
        });

        egui::CentralPanel::default().show(ctx, |ui| {
            ui.centered_and_justified(|ui| match &self.texture {
                Some(texture) => {
                    ui.add(egui::Image::new(texture).shrink_to_fit());
                }
                None => {
                    ui.label("Waiting for pings");
                }
            });
        });

        ctx.request_repaint_after(REPAINT_INTERVAL);
    }

    fn on_exit(&mut self, _gl: Option<&eframe::glow::Context>) {
        if !self.finished.load(Ordering::Acquire) {
            info!("Viewer closed, stopping session");
            self.control.interrupt();
        }
    }
}

/// Open the viewer window and block until it closes.
pub fn run(
    frames: LatestFrame,
    control: ProcessControl,
    finished: Arc<AtomicBool>,
) -> eframe::Result<()> {
    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([800.0, 600.0])
            .with_title(WINDOW_TITLE),
        ..Default::default()
    };

    eframe::run_native(
        WINDOW_TITLE,
        options,
        Box::new(move |_cc| Ok(Box::new(SonarViewer::new(frames, control, finished)))),
    )
}
