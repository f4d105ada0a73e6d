//! Owned resources of one live session.
//!
//! Everything a connected session holds open lives in one bundle so release
//! is a single call: capture handles, spawned tasks, queued playback, and
//! the cancellation token the tasks watch. Callers keep the bundle inside
//! an `Option` and `take()` it for teardown, which makes teardown naturally
//! idempotent.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::audio::{PlaybackScheduler, VolumeMeter};
use crate::capture::{CaptureHandle, VisualMode};
use crate::live::LiveSender;

/// Active visual capture: its stop handle and the sampler pushing frames.
pub(crate) struct VisualAttachment {
    pub mode: VisualMode,
    pub handle: Arc<dyn CaptureHandle>,
    pub sampler: JoinHandle<()>,
}

/// Resource bundle for a connected session.
pub(crate) struct SessionResources {
    pub sender: LiveSender,
    pub mic_handle: Arc<dyn CaptureHandle>,
    pub scheduler: Arc<PlaybackScheduler>,
    pub meter: Arc<VolumeMeter>,
    pub cancel: CancellationToken,
    pub pump_task: JoinHandle<()>,
    pub io_task: JoinHandle<()>,
    pub visual: Option<VisualAttachment>,
}

impl SessionResources {
    pub fn visual_mode(&self) -> Option<VisualMode> {
        self.visual.as_ref().map(|attachment| attachment.mode)
    }

    /// Stop and drop the active visual attachment, if any.
    pub fn detach_visual(&mut self) -> Option<VisualMode> {
        self.visual.take().map(|attachment| {
            attachment.handle.stop();
            attachment.sampler.abort();
            attachment.mode
        })
    }

    /// Swap in a new attachment. At most one visual source is live at a
    /// time, so the previous one is stopped first.
    pub fn attach_visual(&mut self, attachment: VisualAttachment) {
        self.detach_visual();
        self.visual = Some(attachment);
    }

    /// Forget the attachment whose sampler noticed an external stop, but
    /// only if it is still the attached one. The sampler is exiting on its
    /// own, so it must not be aborted from here.
    pub fn clear_visual_if(&mut self, handle: &Arc<dyn CaptureHandle>) -> bool {
        let matches = self
            .visual
            .as_ref()
            .is_some_and(|attachment| Arc::ptr_eq(&attachment.handle, handle));
        if matches {
            self.visual = None;
        }
        matches
    }

    /// Release everything: cancel tasks, stop capture, flush playback.
    pub fn teardown(mut self) {
        self.cancel.cancel();
        self.detach_visual();
        self.mic_handle.stop();
        self.pump_task.abort();
        self.io_task.abort();
        self.scheduler.flush_and_reset();
        self.meter.reset();
        tracing::debug!("session resources released");
    }
}
