//! Display window
//!
//! The window owns the capture loop and drives one tick per repaint, so
//! capture, inference and drawing all stay on the UI thread.

use std::cell::RefCell;
use std::rc::Rc;

use anyhow::{anyhow, Result};
use camera_capture::{PixelFormat, VideoFrame};
use dms::{CaptureLoop, DmsError, LoopState, LoopStats, TickOutcome};
use eframe::egui;
use tracing::{error, info, warn};

/// How the window session ended
#[derive(Debug, Default)]
pub struct SessionResult {
    pub stats: LoopStats,
    pub error: Option<DmsError>,
}

struct MonitorWindow {
    capture: CaptureLoop,
    quit_key: Option<egui::Key>,
    texture: Option<egui::TextureHandle>,
    result: Rc<RefCell<SessionResult>>,
}

impl MonitorWindow {
    fn upload(&mut self, ctx: &egui::Context, frame: &VideoFrame) {
        let rgb = match frame.format {
            PixelFormat::Rgb24 => frame.data.clone(),
            PixelFormat::Bgr24 => frame.to_format(PixelFormat::Rgb24).data,
        };
        let image = egui::ColorImage::from_rgb([frame.width as usize, frame.height as usize], &rgb);

        match &mut self.texture {
            Some(texture) => texture.set(image, egui::TextureOptions::default()),
            None => {
                self.texture = Some(ctx.load_texture("camera-frame", image, egui::TextureOptions::default()));
            }
        }
    }

    fn finish(&mut self, ctx: &egui::Context) {
        self.capture.stop();
        self.result.borrow_mut().stats = self.capture.stats();
        ctx.send_viewport_cmd(egui::ViewportCommand::Close);
    }
}

impl eframe::App for MonitorWindow {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        let quit = self.quit_key.is_some_and(|key| ctx.input(|i| i.key_pressed(key)));
        if quit || ctx.input(|i| i.viewport().close_requested()) {
            self.finish(ctx);
            return;
        }

        match self.capture.tick() {
            Ok(TickOutcome::Rendered { frame, .. }) => self.upload(ctx, &frame),
            Ok(TickOutcome::Skipped) => {}
            Ok(TickOutcome::Stopped) => {
                self.finish(ctx);
                return;
            }
            Err(e) => {
                error!("Frame processing failed: {}", e);
                self.result.borrow_mut().error = Some(e);
                self.finish(ctx);
                return;
            }
        }

        egui::CentralPanel::default()
            .frame(egui::Frame::none())
            .show(ctx, |ui| match &self.texture {
                Some(texture) => {
                    ui.image(egui::load::SizedTexture::from_handle(texture));
                }
                None => {
                    ui.label("Waiting for camera...");
                }
            });

        if self.capture.state() == LoopState::Running {
            ctx.request_repaint();
        }
    }
}

/// Map the configured quit character to a key
pub fn quit_key(c: char) -> Option<egui::Key> {
    egui::Key::from_name(&c.to_uppercase().to_string())
}

/// Open the window and block until it closes
pub fn run_window(
    title: &str,
    size: [f32; 2],
    quit: char,
    capture: CaptureLoop,
) -> Result<SessionResult> {
    let quit_key = quit_key(quit);
    if quit_key.is_none() {
        warn!("Quit key `{}` cannot be mapped, close the window to stop", quit);
    }

    let result = Rc::new(RefCell::new(SessionResult::default()));
    let window = MonitorWindow {
        capture,
        quit_key,
        texture: None,
        result: Rc::clone(&result),
    };

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_title(title)
            .with_inner_size(size),
        ..Default::default()
    };

    info!("Opening display window `{}`", title);
    eframe::run_native(title, options, Box::new(|_cc| Box::new(window)))
        .map_err(|e| anyhow!("Display window failed: {}", e))?;

    let session = std::mem::take(&mut *result.borrow_mut());
    Ok(session)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quit_key_mapping() {
        assert_eq!(quit_key('q'), Some(egui::Key::Q));
        assert_eq!(quit_key('Q'), Some(egui::Key::Q));
        assert_eq!(quit_key('é'), None);
    }
}
