//! Capture pipeline: microphone blocks and throttled visual frames.
//!
//! Hardware sits behind small traits so the session core stays testable and
//! portable: hosts inject a [`MicrophoneSource`] and a [`VisualSource`], and
//! the session owns the resulting stream handles. Feature-gated native
//! backends (`native-mic` for cpal, `native-camera` for nokhwa) provide
//! ready-made implementations for desktop embedding.
//!
//! Camera and screen share are mutually exclusive; the session enforces
//! that by fully stopping one stream's handle and sampler before opening
//! the other.

pub mod audio;
pub mod visual;

#[cfg(feature = "native-mic")]
pub mod cpal_mic;
#[cfg(feature = "native-camera")]
pub mod nokhwa_camera;

pub use audio::{BlockFramer, MicStream, MicrophoneSource};
pub use visual::{FrameGrab, RawFrame, VisualMode, VisualSource, VisualStream, encode_visual_frame};

#[cfg(feature = "native-mic")]
pub use cpal_mic::CpalMicrophone;
#[cfg(feature = "native-camera")]
pub use nokhwa_camera::NokhwaCamera;

/// Handle to live capture hardware. Stopping releases the underlying
/// tracks; both calls are safe after the stream is already stopped.
pub trait CaptureHandle: Send + Sync {
    /// Release the underlying hardware. Idempotent.
    fn stop(&self);

    /// Whether the hardware has been released, either through [`stop`] or
    /// by the user ending the stream from outside (screen-share UI).
    ///
    /// [`stop`]: CaptureHandle::stop
    fn is_stopped(&self) -> bool;
}
