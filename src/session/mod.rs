//! Realtime session manager.
//!
//! Owns the lifecycle `Idle → Connecting → Connected → {Idle, Error}` and
//! the tasks of a live session: the microphone pump, the optional visual
//! sampler, and the event loop draining the ordered [`LiveEvent`] stream.
//! Every inbound event is processed fully before the next one, so an
//! interruption always flushes queued playback before any audio of the new
//! turn is scheduled.
//!
//! All hardware and transport access goes through injected traits
//! ([`LiveConnector`], [`MicrophoneSource`], [`VisualSource`], playback sink
//! and clock), which is what makes the whole lifecycle testable without a
//! socket or a sound card.

mod resources;

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::audio::{
    OutputClock, PlaybackScheduler, PlaybackSink, VolumeMeter, decode_frame, encode_frame,
    to_transport_text,
};
use crate::capture::{
    BlockFramer, CaptureHandle, FrameGrab, MicrophoneSource, VisualMode, VisualSource,
    encode_visual_frame,
};
use crate::config::LiveConfig;
use crate::error::{ClientError, ClientResult};
use crate::live::{ClientMessage, LiveConnector, LiveEvent, LiveSender, SessionSetup};
use crate::memory::MemoryStore;
use crate::tools::{DeviceCommandSink, HealthReader, ToolDispatcher, ToolEffect};

use resources::{SessionResources, VisualAttachment};

// =============================================================================
// States and Updates
// =============================================================================

/// Connection state of the session manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No session, nothing held open
    Idle,
    /// Connect in progress, resources partially acquired
    Connecting,
    /// Live session, media flowing
    Connected,
    /// A failure ended the session; resources are released
    Error,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Idle => "Idle",
            SessionState::Connecting => "Connecting",
            SessionState::Connected => "Connected",
            SessionState::Error => "Error",
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Host-facing notification from the session.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionUpdate {
    /// State transition with a human-readable status line
    StateChanged {
        state: SessionState,
        status: String,
    },
    /// Text part of a model turn
    Text(String),
    /// The model changed its mood tag
    MoodChanged(String),
    /// Visual capture started, switched, or stopped
    VisualChanged { mode: Option<VisualMode> },
}

// =============================================================================
// Dependencies
// =============================================================================

/// Injected backends for one [`SessionManager`].
pub struct SessionDeps {
    /// Transport to the Inference Session
    pub connector: Arc<dyn LiveConnector>,
    /// Microphone access
    pub microphone: Arc<dyn MicrophoneSource>,
    /// Camera / screen access
    pub visual: Arc<dyn VisualSource>,
    /// Playback output
    pub sink: Arc<dyn PlaybackSink>,
    /// Output timeline for the playback scheduler
    pub clock: Arc<dyn OutputClock>,
    /// Target for control-type tool calls
    pub device_sink: Arc<dyn DeviceCommandSink>,
    /// Smart-watch metrics
    pub health: Arc<dyn HealthReader>,
    /// Long-term memory store
    pub memories: MemoryStore,
}

/// State shared between the manager, the event loop, and the samplers.
struct SessionShared {
    config: LiveConfig,
    visual_source: Arc<dyn VisualSource>,
    scheduler: Arc<PlaybackScheduler>,
    meter: Arc<VolumeMeter>,
    dispatcher: Arc<ToolDispatcher>,
    state: RwLock<SessionState>,
    resources: Mutex<Option<SessionResources>>,
    updates: mpsc::UnboundedSender<SessionUpdate>,
}

impl SessionShared {
    fn state(&self) -> SessionState {
        *self.state.read()
    }

    fn set_state(&self, next: SessionState, status: impl Into<String>) {
        *self.state.write() = next;
        let _ = self.updates.send(SessionUpdate::StateChanged {
            state: next,
            status: status.into(),
        });
    }

    fn send_update(&self, update: SessionUpdate) {
        let _ = self.updates.send(update);
    }

    fn visual_mode(&self) -> Option<VisualMode> {
        self.resources.lock().as_ref().and_then(|r| r.visual_mode())
    }

    /// Single teardown path. Taking the bundle out of the option makes
    /// repeated calls no-ops.
    fn teardown_now(&self) {
        if let Some(resources) = self.resources.lock().take() {
            resources.teardown();
        }
    }

    /// Bring visual capture to `target`: `None` stops the active source,
    /// `Some(mode)` starts it, replacing whatever ran before. Quietly does
    /// nothing when no session is active.
    async fn set_visual(self: &Arc<Self>, target: Option<VisualMode>) -> ClientResult<()> {
        let current = self.visual_mode();
        if current == target {
            return Ok(());
        }

        let Some(mode) = target else {
            if let Some(resources) = self.resources.lock().as_mut() {
                resources.detach_visual();
            }
            self.send_update(SessionUpdate::VisualChanged { mode: None });
            return Ok(());
        };

        // The sources are mutually exclusive: whichever is active must be
        // fully stopped before the replacement opens.
        let detached = {
            let mut guard = self.resources.lock();
            guard.as_mut().map(|resources| {
                let replaced = resources.detach_visual();
                (resources.sender.clone(), resources.cancel.child_token(), replaced)
            })
        };
        let Some((sender, cancel, replaced)) = detached else {
            debug!(%mode, "visual toggle ignored, no active session");
            return Ok(());
        };

        let stream = match self.visual_source.open(mode).await {
            Ok(stream) => stream,
            Err(e) => {
                // The previous source is already stopped; tell the host.
                if replaced.is_some() {
                    self.send_update(SessionUpdate::VisualChanged { mode: None });
                }
                return Err(e);
            }
        };
        let handle = stream.handle.clone();
        let sampler = tokio::spawn(run_visual_sampler(
            Arc::clone(self),
            mode,
            stream.frames,
            handle.clone(),
            sender,
            cancel,
        ));
        let attachment = VisualAttachment {
            mode,
            handle,
            sampler,
        };

        let mut guard = self.resources.lock();
        match guard.as_mut() {
            Some(resources) => {
                resources.attach_visual(attachment);
                drop(guard);
                self.send_update(SessionUpdate::VisualChanged { mode: Some(mode) });
                Ok(())
            }
            // Session ended while the source was opening.
            None => {
                drop(guard);
                attachment.handle.stop();
                attachment.sampler.abort();
                debug!(%mode, "session ended while opening visual source");
                Ok(())
            }
        }
    }
}

// =============================================================================
// Session Manager
// =============================================================================

/// Drives one companion session end to end.
pub struct SessionManager {
    shared: Arc<SessionShared>,
    connector: Arc<dyn LiveConnector>,
    microphone: Arc<dyn MicrophoneSource>,
    memories: MemoryStore,
    /// Serializes connect/disconnect/toggles from caller context
    lifecycle: tokio::sync::Mutex<()>,
    event_task: Mutex<Option<JoinHandle<()>>>,
}

impl SessionManager {
    /// Build a manager and the update stream the host listens on.
    pub fn new(
        config: LiveConfig,
        deps: SessionDeps,
    ) -> (Self, mpsc::UnboundedReceiver<SessionUpdate>) {
        let (updates_tx, updates_rx) = mpsc::unbounded_channel();
        let scheduler = Arc::new(PlaybackScheduler::new(deps.clock, deps.sink));
        let meter = Arc::new(VolumeMeter::new());
        let dispatcher = Arc::new(ToolDispatcher::new(
            deps.device_sink,
            deps.health,
            deps.memories.clone(),
        ));
        let shared = Arc::new(SessionShared {
            config,
            visual_source: deps.visual,
            scheduler,
            meter,
            dispatcher,
            state: RwLock::new(SessionState::Idle),
            resources: Mutex::new(None),
            updates: updates_tx,
        });
        let manager = Self {
            shared,
            connector: deps.connector,
            microphone: deps.microphone,
            memories: deps.memories,
            lifecycle: tokio::sync::Mutex::new(()),
            event_task: Mutex::new(None),
        };
        (manager, updates_rx)
    }

    pub fn state(&self) -> SessionState {
        self.shared.state()
    }

    /// Current input/output volume levels, polled by the host.
    pub fn levels(&self) -> crate::audio::AudioLevels {
        self.shared.meter.levels()
    }

    /// Active visual capture mode, if any.
    pub fn visual_mode(&self) -> Option<VisualMode> {
        self.shared.visual_mode()
    }

    /// Chunks currently queued for playback.
    pub fn pending_playback(&self) -> usize {
        self.shared.scheduler.pending_chunks()
    }

    pub fn memories(&self) -> &MemoryStore {
        &self.memories
    }

    /// Open a session: microphone, transport, setup handshake, pumps.
    ///
    /// Valid from Idle or Error; a no-op when already connecting or
    /// connected. Any failure lands in Error with resources released.
    pub async fn connect(&self) -> ClientResult<()> {
        let _guard = self.lifecycle.lock().await;

        match self.shared.state() {
            SessionState::Connecting | SessionState::Connected => {
                debug!("connect ignored, session already active");
                return Ok(());
            }
            SessionState::Idle | SessionState::Error => {}
        }
        // Settle anything a previous failure left behind.
        self.shared.teardown_now();

        if let Err(e) = self.shared.config.validate() {
            self.shared.set_state(SessionState::Error, e.user_message());
            return Err(e);
        }

        self.shared
            .set_state(SessionState::Connecting, "Connecting...");

        let mic = match self
            .microphone
            .open(self.shared.config.capture.input_sample_rate)
            .await
        {
            Ok(stream) => stream,
            Err(e) => {
                warn!(error = %e, "microphone unavailable");
                self.shared.set_state(SessionState::Error, e.user_message());
                return Err(e);
            }
        };

        let setup = SessionSetup::for_session(&self.shared.config, &self.memories.context());
        let mut connection = match self.connector.connect(&self.shared.config, setup).await {
            Ok(connection) => connection,
            Err(e) => {
                warn!(error = %e, "transport connect failed");
                mic.handle.stop();
                self.shared.set_state(SessionState::Error, e.user_message());
                return Err(e);
            }
        };

        // Connected only after the remote acknowledges the setup frame.
        loop {
            match connection.next_event().await {
                Some(LiveEvent::Opened) => break,
                Some(LiveEvent::Error(message)) => {
                    mic.handle.stop();
                    let err = ClientError::ConnectError(message);
                    self.shared
                        .set_state(SessionState::Error, err.user_message());
                    return Err(err);
                }
                Some(LiveEvent::Closed) | None => {
                    mic.handle.stop();
                    let err = ClientError::ConnectError("closed during setup".to_string());
                    self.shared
                        .set_state(SessionState::Error, err.user_message());
                    return Err(err);
                }
                Some(other) => debug!(?other, "event before open acknowledgment ignored"),
            }
        }

        let (sender, events, io_task) = connection.into_parts();
        let cancel = CancellationToken::new();

        self.shared.meter.reset();
        self.shared.scheduler.flush_and_reset();

        let pump_task = tokio::spawn(run_audio_pump(
            mic.samples,
            self.shared.config.capture.block_size,
            self.shared.meter.clone(),
            sender.clone(),
            cancel.child_token(),
        ));

        *self.shared.resources.lock() = Some(SessionResources {
            sender: sender.clone(),
            mic_handle: mic.handle,
            scheduler: self.shared.scheduler.clone(),
            meter: self.shared.meter.clone(),
            cancel,
            pump_task,
            io_task,
            visual: None,
        });

        self.shared.set_state(SessionState::Connected, "Connected");
        info!("session connected");

        let loop_task = tokio::spawn(run_event_loop(self.shared.clone(), sender, events));
        if let Some(previous) = self.event_task.lock().replace(loop_task) {
            previous.abort();
        }

        Ok(())
    }

    /// Close the session. Valid from any state, idempotent, always ends in
    /// Idle with every resource released.
    pub async fn disconnect(&self) {
        let _guard = self.lifecycle.lock().await;

        self.shared.teardown_now();
        if let Some(task) = self.event_task.lock().take() {
            task.abort();
        }
        if self.shared.state() != SessionState::Idle {
            self.shared.set_state(SessionState::Idle, "Disconnected");
            info!("session disconnected");
        }
    }

    /// Toggle camera capture. Camera and screen share are mutually
    /// exclusive; starting one stops the other.
    pub async fn toggle_video(&self) -> ClientResult<()> {
        let _guard = self.lifecycle.lock().await;
        self.toggle_visual(VisualMode::Camera).await
    }

    /// Toggle screen share, same exclusivity rules as [`toggle_video`].
    ///
    /// [`toggle_video`]: SessionManager::toggle_video
    pub async fn toggle_screen_share(&self) -> ClientResult<()> {
        let _guard = self.lifecycle.lock().await;
        self.toggle_visual(VisualMode::Screen).await
    }

    async fn toggle_visual(&self, mode: VisualMode) -> ClientResult<()> {
        if self.shared.state() != SessionState::Connected {
            debug!(%mode, "visual toggle ignored while not connected");
            return Ok(());
        }
        let target = if self.shared.visual_mode() == Some(mode) {
            None
        } else {
            Some(mode)
        };
        self.shared.set_visual(target).await
    }
}

// =============================================================================
// Session Tasks
// =============================================================================

/// Forwards microphone bursts as fixed-size encoded chunks.
async fn run_audio_pump(
    mut samples: mpsc::Receiver<Vec<f32>>,
    block_size: usize,
    meter: Arc<VolumeMeter>,
    sender: LiveSender,
    cancel: CancellationToken,
) {
    let mut framer = BlockFramer::new(block_size);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            burst = samples.recv() => {
                let Some(burst) = burst else { break };
                for block in framer.push(&burst) {
                    meter.record_input(&block);
                    let encoded = to_transport_text(&encode_frame(&block));
                    if sender.send(ClientMessage::audio_chunk(encoded)).await.is_err() {
                        debug!("audio pump stopping, connection gone");
                        return;
                    }
                }
            }
        }
    }
    debug!("audio pump finished");
}

/// Sends the newest visual frame on a fixed timer, independent of audio.
async fn run_visual_sampler(
    shared: Arc<SessionShared>,
    mode: VisualMode,
    frames: Arc<dyn FrameGrab>,
    handle: Arc<dyn CaptureHandle>,
    sender: LiveSender,
    cancel: CancellationToken,
) {
    let capture = shared.config.capture.clone();
    let mut ticker = tokio::time::interval(capture.frame_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                // The user can end a share from the host side; notice and
                // fold the attachment without being told.
                if handle.is_stopped() {
                    info!(%mode, "visual source stopped externally");
                    let cleared = shared
                        .resources
                        .lock()
                        .as_mut()
                        .is_some_and(|r| r.clear_visual_if(&handle));
                    if cleared {
                        shared.send_update(SessionUpdate::VisualChanged { mode: None });
                    }
                    break;
                }

                let Some(frame) = frames.latest_frame() else {
                    // Source still warming up.
                    continue;
                };
                match encode_visual_frame(&frame, capture.frame_scale, capture.jpeg_quality) {
                    Ok(jpeg) => {
                        let encoded = to_transport_text(&jpeg);
                        if sender.send(ClientMessage::jpeg_frame(encoded)).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => debug!(error = %e, "visual frame skipped"),
                }
            }
        }
    }
    debug!(%mode, "visual sampler finished");
}

/// Consumes the ordered event stream until close or error.
async fn run_event_loop(
    shared: Arc<SessionShared>,
    sender: LiveSender,
    mut events: mpsc::Receiver<LiveEvent>,
) {
    while let Some(event) = events.recv().await {
        match event {
            // Consumed during connect; a duplicate is harmless.
            LiveEvent::Opened => {}

            LiveEvent::Audio { data, sample_rate } => {
                match decode_frame(&data, sample_rate, 1) {
                    Ok(frame) => {
                        shared.meter.record_output(&frame.samples);
                        shared.scheduler.enqueue(frame);
                    }
                    Err(e) => warn!(error = %e, "dropping malformed audio chunk"),
                }
            }

            LiveEvent::Text(text) => shared.send_update(SessionUpdate::Text(text)),

            LiveEvent::Interrupted => {
                shared.scheduler.flush_and_reset();
                shared.meter.reset_output();
                debug!("queued playback flushed on interruption");
            }

            LiveEvent::TurnComplete => debug!("model turn complete"),

            LiveEvent::ToolCalls(batch) => {
                let outcome = shared.dispatcher.dispatch_batch(&batch);
                // The remote expects a response even for an empty batch.
                if sender
                    .send(ClientMessage::tool_results(outcome.results))
                    .await
                    .is_err()
                {
                    warn!("tool results not sent, connection closing");
                }
                for effect in outcome.effects {
                    apply_effect(&shared, effect).await;
                }
            }

            LiveEvent::Error(message) => {
                warn!(error = %message, "session transport error");
                shared.teardown_now();
                if !matches!(shared.state(), SessionState::Idle) {
                    shared.set_state(SessionState::Error, "Connection error");
                }
                break;
            }

            LiveEvent::Closed => {
                info!("session closed by remote");
                shared.teardown_now();
                if !matches!(shared.state(), SessionState::Idle) {
                    shared.set_state(SessionState::Idle, "Disconnected");
                }
                break;
            }
        }
    }
    debug!("session event loop finished");
}

/// Applies a tool side effect on the session.
async fn apply_effect(shared: &Arc<SessionShared>, effect: ToolEffect) {
    match effect {
        ToolEffect::MoodChanged(mood) => {
            shared.send_update(SessionUpdate::MoodChanged(mood));
        }
        ToolEffect::CameraToggle(enabled) => {
            let current = shared.visual_mode();
            let target = if enabled {
                Some(VisualMode::Camera)
            } else if current == Some(VisualMode::Camera) {
                None
            } else {
                // Disabling an already-off camera must not stop a screen share.
                return;
            };
            if let Err(e) = shared.set_visual(target).await {
                warn!(error = %e, "camera toggle from model failed");
            }
        }
    }
}
