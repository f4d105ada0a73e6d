//! Visual capture: camera/screen sources and JPEG frame sampling.
//!
//! A visual source exposes whatever frame it most recently produced; a
//! session-side timer samples it at a low fixed rate (2 Hz by default),
//! downscales by half, and JPEG-encodes for transport. Sources that have
//! not produced a frame yet simply skip the tick.

use std::io::Cursor;
use std::sync::Arc;

use async_trait::async_trait;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;

use crate::capture::CaptureHandle;
use crate::error::{ClientError, ClientResult};

/// The active visual source kind. At most one may be open at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisualMode {
    Camera,
    Screen,
}

impl VisualMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            VisualMode::Camera => "camera",
            VisualMode::Screen => "screen",
        }
    }
}

impl std::fmt::Display for VisualMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One uncompressed frame from a visual source, packed RGB8.
#[derive(Debug, Clone, PartialEq)]
pub struct RawFrame {
    pub width: u32,
    pub height: u32,
    pub rgb: Vec<u8>,
}

/// Access to the most recent frame a source has produced.
pub trait FrameGrab: Send + Sync {
    /// Latest frame, or `None` while the source is still warming up.
    fn latest_frame(&self) -> Option<RawFrame>;
}

/// Source of camera or screen-share video.
#[async_trait]
pub trait VisualSource: Send + Sync {
    async fn open(&self, mode: VisualMode) -> ClientResult<VisualStream>;
}

/// An open visual stream.
///
/// `handle.is_stopped()` flips on its own when the user ends a screen
/// share from the OS UI; the session's sampler notices and tears the
/// stream down.
pub struct VisualStream {
    pub mode: VisualMode,
    pub frames: Arc<dyn FrameGrab>,
    pub handle: Arc<dyn CaptureHandle>,
}

/// Downscale and JPEG-encode one frame for transport.
///
/// A frame whose buffer does not match its stated dimensions is treated
/// the same as a source with no frame ready: the caller skips this tick.
pub fn encode_visual_frame(frame: &RawFrame, scale: f32, quality: u8) -> ClientResult<Vec<u8>> {
    if frame.width == 0 || frame.height == 0 {
        return Err(ClientError::CaptureStall);
    }
    let expected = frame.width as usize * frame.height as usize * 3;
    if frame.rgb.len() != expected {
        return Err(ClientError::CaptureStall);
    }
    let image = image::RgbImage::from_raw(frame.width, frame.height, frame.rgb.clone())
        .ok_or(ClientError::CaptureStall)?;

    let target_w = ((frame.width as f32 * scale).round() as u32).max(1);
    let target_h = ((frame.height as f32 * scale).round() as u32).max(1);
    let resized = if target_w == frame.width && target_h == frame.height {
        image
    } else {
        image::imageops::resize(&image, target_w, target_h, FilterType::Triangle)
    };

    let mut jpeg = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(Cursor::new(&mut jpeg), quality);
    encoder
        .encode_image(&resized)
        .map_err(|_| ClientError::CaptureStall)?;
    Ok(jpeg)
}
