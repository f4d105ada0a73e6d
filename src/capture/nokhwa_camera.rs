//! nokhwa-backed camera source for desktop embedding.
//!
//! The camera runs on its own thread, polling frames into a shared slot
//! that the session's 2 Hz sampler reads from. Only `VisualMode::Camera`
//! is served here; screen capture stays host-provided.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use async_trait::async_trait;
use nokhwa::Camera;
use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{ApiBackend, RequestedFormat, RequestedFormatType};
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::{info, warn};

use crate::capture::{CaptureHandle, FrameGrab, RawFrame, VisualMode, VisualSource, VisualStream};
use crate::error::{ClientError, ClientResult};

/// How often the device thread refreshes the shared frame slot. Faster
/// than the 2 Hz transport sampler so a tick never reads a stale frame.
const FRAME_POLL: Duration = Duration::from_millis(250);

/// Camera source backed by the first nokhwa device.
#[derive(Debug, Default)]
pub struct NokhwaCamera;

impl NokhwaCamera {
    pub fn new() -> Self {
        Self
    }
}

#[derive(Default)]
struct SharedFrame {
    slot: Mutex<Option<RawFrame>>,
}

impl FrameGrab for SharedFrame {
    fn latest_frame(&self) -> Option<RawFrame> {
        self.slot.lock().clone()
    }
}

struct NokhwaCameraHandle {
    stop_tx: std::sync::mpsc::Sender<()>,
    stopped: Arc<AtomicBool>,
}

impl CaptureHandle for NokhwaCameraHandle {
    fn stop(&self) {
        if !self.stopped.swap(true, Ordering::SeqCst) {
            let _ = self.stop_tx.send(());
        }
    }

    fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VisualSource for NokhwaCamera {
    async fn open(&self, mode: VisualMode) -> ClientResult<VisualStream> {
        if mode != VisualMode::Camera {
            return Err(ClientError::DeviceUnavailable(
                "screen capture requires a host-provided source".to_string(),
            ));
        }

        let shared = Arc::new(SharedFrame::default());
        let (ready_tx, ready_rx) = oneshot::channel();
        let (stop_tx, stop_rx) = std::sync::mpsc::channel();
        let stopped = Arc::new(AtomicBool::new(false));

        let thread_shared = shared.clone();
        let thread_stopped = stopped.clone();
        thread::Builder::new()
            .name("camera-capture".to_string())
            .spawn(move || {
                camera_thread_main(thread_shared, ready_tx, stop_rx, thread_stopped);
            })
            .map_err(|e| ClientError::DeviceUnavailable(format!("capture thread: {e}")))?;

        ready_rx
            .await
            .map_err(|_| ClientError::DeviceUnavailable("capture thread exited".to_string()))??;

        Ok(VisualStream {
            mode: VisualMode::Camera,
            frames: shared,
            handle: Arc::new(NokhwaCameraHandle { stop_tx, stopped }),
        })
    }
}

fn camera_thread_main(
    shared: Arc<SharedFrame>,
    ready_tx: oneshot::Sender<ClientResult<()>>,
    stop_rx: std::sync::mpsc::Receiver<()>,
    stopped: Arc<AtomicBool>,
) {
    let mut camera = match open_first_camera() {
        Ok(camera) => camera,
        Err(e) => {
            let _ = ready_tx.send(Err(e));
            stopped.store(true, Ordering::SeqCst);
            return;
        }
    };
    if let Err(e) = camera.open_stream() {
        let _ = ready_tx.send(Err(ClientError::DeviceUnavailable(format!(
            "failed to open camera stream: {e}"
        ))));
        stopped.store(true, Ordering::SeqCst);
        return;
    }
    let _ = ready_tx.send(Ok(()));

    loop {
        match stop_rx.recv_timeout(FRAME_POLL) {
            // Stopped explicitly or the handle was dropped.
            Ok(()) | Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => break,
            Err(std::sync::mpsc::RecvTimeoutError::Timeout) => {}
        }
        match camera.frame().and_then(|b| b.decode_image::<RgbFormat>()) {
            Ok(image) => {
                let frame = RawFrame {
                    width: image.width(),
                    height: image.height(),
                    rgb: image.into_raw(),
                };
                *shared.slot.lock() = Some(frame);
            }
            Err(e) => warn!("camera frame failed: {e}"),
        }
    }

    if let Err(e) = camera.stop_stream() {
        warn!("stopping camera stream: {e}");
    }
    stopped.store(true, Ordering::SeqCst);
    info!("camera released");
}

fn open_first_camera() -> ClientResult<Camera> {
    let cameras = nokhwa::query(ApiBackend::Auto)
        .map_err(|e| ClientError::DeviceUnavailable(format!("camera query failed: {e}")))?;
    let info = cameras
        .first()
        .ok_or_else(|| ClientError::DeviceUnavailable("no cameras found".to_string()))?;
    info!(camera = %info.human_name(), "opening camera");

    Camera::new(
        info.index().clone(),
        RequestedFormat::new::<RgbFormat>(RequestedFormatType::AbsoluteHighestFrameRate),
    )
    .map_err(|e| ClientError::DeviceUnavailable(format!("failed to initialize camera: {e}")))
}
