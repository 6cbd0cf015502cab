//! Overlay rendering
//!
//! Rendering is split in two: [`OverlayRenderer::plan`] turns an analysis into
//! draw operations, [`OverlayRenderer::apply`] rasterizes them onto the frame.

use std::path::Path;

use ab_glyph::{FontArc, PxScale};
use camera_capture::{PixelFormat, VideoFrame};
use image::{ImageBuffer, Rgb};
use imageproc::drawing::{draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect;
use tracing::{debug, info};

use crate::analysis::FrameAnalysis;
use crate::policy::RgbColor;
use crate::DmsError;

const LABEL_SCALE: f32 = 30.0;
const WARNING_SCALE: f32 = 21.0;
const ALERT_SCALE: f32 = 60.0;
const FACE_SCALE: f32 = 16.0;
const ALERT_BORDER: u32 = 5;
const FACE_BORDER: u32 = 2;

/// DejaVu Sans, used when no font file is configured
static BUNDLED_FONT: &[u8] = include_bytes!("../assets/DejaVuSans.ttf");

/// One primitive to draw, coordinates in frame pixels
#[derive(Debug, Clone, PartialEq)]
pub enum DrawOp {
    /// Hollow rectangle, `thickness` pixels drawn inward
    Rect {
        x: i32,
        y: i32,
        width: u32,
        height: u32,
        thickness: u32,
        color: RgbColor,
    },
    /// Text with its top-left corner at (x, y)
    Text {
        x: i32,
        y: i32,
        scale: f32,
        color: RgbColor,
        text: String,
    },
}

/// Draws face boxes, the classification label and alert overlays
#[derive(Clone)]
pub struct OverlayRenderer {
    font: Option<FontArc>,
}

impl OverlayRenderer {
    /// Renderer that draws shapes only
    pub fn without_text() -> Self {
        Self { font: None }
    }

    pub fn with_font(font: FontArc) -> Self {
        Self { font: Some(font) }
    }

    /// Renderer using the font compiled into the crate
    pub fn bundled() -> Result<Self, DmsError> {
        let font = FontArc::try_from_slice(BUNDLED_FONT)
            .map_err(|e| DmsError::Config(format!("bundled font: {}", e)))?;
        Ok(Self::with_font(font))
    }

    /// Load a TrueType/OpenType font for overlay text
    pub fn from_font_file(path: impl AsRef<Path>) -> Result<Self, DmsError> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)
            .map_err(|e| DmsError::Config(format!("font {}: {}", path.display(), e)))?;
        let font = FontArc::try_from_vec(bytes)
            .map_err(|e| DmsError::Config(format!("font {}: {}", path.display(), e)))?;
        info!("Loaded overlay font {}", path.display());
        Ok(Self::with_font(font))
    }

    pub fn draws_text(&self) -> bool {
        self.font.is_some()
    }

    /// Draw operations for a frame of the given size
    pub fn plan(&self, width: u32, height: u32, analysis: &FrameAnalysis) -> Vec<DrawOp> {
        let mut ops = Vec::new();

        for face in &analysis.faces {
            let x = face.x.round() as i32;
            let y = face.y.round() as i32;
            ops.push(DrawOp::Rect {
                x,
                y,
                width: face.width.round().max(1.0) as u32,
                height: face.height.round().max(1.0) as u32,
                thickness: FACE_BORDER,
                color: RgbColor::LIGHT_GRAY,
            });
            ops.push(DrawOp::Text {
                x,
                y: (y - FACE_SCALE as i32 - 2).max(0),
                scale: FACE_SCALE,
                color: RgbColor::LIGHT_GRAY,
                text: format!("{:.0}%", face.confidence * 100.0),
            });
        }

        let directive = &analysis.directive;
        ops.push(DrawOp::Text {
            x: 10,
            y: 28,
            scale: LABEL_SCALE,
            color: directive.color,
            text: analysis.label_text(),
        });

        if directive.face_missing_warning {
            ops.push(DrawOp::Text {
                x: 10,
                y: 84,
                scale: WARNING_SCALE,
                color: RgbColor::YELLOW,
                text: "WARNING: NO FACE DETECTED".to_string(),
            });
        }

        if directive.alert_banner {
            ops.push(DrawOp::Rect {
                x: 0,
                y: 0,
                width,
                height,
                thickness: ALERT_BORDER,
                color: RgbColor::RED,
            });
            ops.push(DrawOp::Text {
                x: width as i32 / 2 - 50,
                y: height as i32 / 2 - 45,
                scale: ALERT_SCALE,
                color: RgbColor::RED,
                text: "ALERT!".to_string(),
            });
        }

        ops
    }

    /// Plan and draw the overlays for `analysis` onto `frame`
    pub fn render(&self, frame: &mut VideoFrame, analysis: &FrameAnalysis) -> Result<(), DmsError> {
        let ops = self.plan(frame.width, frame.height, analysis);
        self.apply(frame, &ops)
    }

    /// Rasterize draw operations in place. Text is skipped without a font.
    pub fn apply(&self, frame: &mut VideoFrame, ops: &[DrawOp]) -> Result<(), DmsError> {
        let format = frame.format;
        let (width, height) = (frame.width, frame.height);
        let mut canvas: ImageBuffer<Rgb<u8>, &mut [u8]> =
            ImageBuffer::from_raw(width, height, frame.data.as_mut_slice())
                .ok_or_else(|| DmsError::ImageProcessing("frame buffer does not match its size".into()))?;

        for op in ops {
            match op {
                DrawOp::Rect {
                    x,
                    y,
                    width,
                    height,
                    thickness,
                    color,
                } => {
                    let pixel = to_pixel(*color, format);
                    for t in 0..*thickness {
                        let inset = 2 * t;
                        if *width <= inset || *height <= inset {
                            break;
                        }
                        let rect = Rect::at(x + t as i32, y + t as i32).of_size(width - inset, height - inset);
                        draw_hollow_rect_mut(&mut canvas, rect, pixel);
                    }
                }
                DrawOp::Text {
                    x,
                    y,
                    scale,
                    color,
                    text,
                } => match &self.font {
                    Some(font) => {
                        draw_text_mut(
                            &mut canvas,
                            to_pixel(*color, format),
                            *x,
                            *y,
                            PxScale::from(*scale),
                            font,
                            text,
                        );
                    }
                    None => debug!("No overlay font, skipping text `{}`", text),
                },
            }
        }

        Ok(())
    }
}

fn to_pixel(color: RgbColor, format: PixelFormat) -> Rgb<u8> {
    match format {
        PixelFormat::Rgb24 => Rgb([color.r, color.g, color.b]),
        PixelFormat::Bgr24 => Rgb([color.b, color.g, color.r]),
    }
}
