//! Shared test doubles for session integration tests.
//!
//! Everything the session manager touches through a trait has a scripted
//! stand-in here: transport, microphone, visual source, playback sink and
//! clock, device callback. Tests drive the session purely through these.

// Allow dead code in test infrastructure - not every test uses every helper
#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use mommy_live::audio::{OutputClock, PlaybackSink, ScheduledChunk};
use mommy_live::capture::{
    CaptureHandle, FrameGrab, MicStream, MicrophoneSource, RawFrame, VisualMode, VisualSource,
    VisualStream,
};
use mommy_live::config::LiveConfig;
use mommy_live::error::{ClientError, ClientResult};
use mommy_live::live::{
    ClientMessage, LiveConnection, LiveConnector, LiveEvent, SessionSetup,
};
use mommy_live::memory::MemoryStore;
use mommy_live::session::{SessionDeps, SessionManager, SessionState, SessionUpdate};
use mommy_live::tools::{DeviceCommandSink, HealthSnapshot, StaticHealth, StressLevel};

// =============================================================================
// Clock and Sink
// =============================================================================

/// Clock the test advances by hand.
#[derive(Default)]
pub struct ManualClock {
    now: Mutex<f64>,
}

impl ManualClock {
    pub fn advance(&self, seconds: f64) {
        *self.now.lock() += seconds;
    }
}

impl OutputClock for ManualClock {
    fn now(&self) -> f64 {
        *self.now.lock()
    }
}

/// Sink recording every begun chunk and every stop.
#[derive(Default)]
pub struct RecordingSink {
    pub begun: Mutex<Vec<ScheduledChunk>>,
    pub stops: AtomicUsize,
}

impl RecordingSink {
    pub fn begun_count(&self) -> usize {
        self.begun.lock().len()
    }

    pub fn stop_count(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

impl PlaybackSink for RecordingSink {
    fn begin(&self, chunk: &ScheduledChunk) {
        self.begun.lock().push(chunk.clone());
    }

    fn stop_all(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }
}

// =============================================================================
// Capture Fakes
// =============================================================================

/// Stop-flag handle shared between the session and the test.
#[derive(Default)]
pub struct StubHandle {
    stopped: AtomicBool,
}

impl StubHandle {
    /// Simulates the user ending capture from the host side.
    pub fn stop_externally(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }
}

impl CaptureHandle for StubHandle {
    fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

/// Microphone producing whatever sample bursts the test feeds in.
pub struct FakeMicrophone {
    denied: AtomicBool,
    feeds: Mutex<Vec<mpsc::Sender<Vec<f32>>>>,
    handles: Mutex<Vec<Arc<StubHandle>>>,
}

impl FakeMicrophone {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            denied: AtomicBool::new(false),
            feeds: Mutex::new(Vec::new()),
            handles: Mutex::new(Vec::new()),
        })
    }

    pub fn deny(&self) {
        self.denied.store(true, Ordering::SeqCst);
    }

    /// Feed for the most recent open, for pushing sample bursts.
    pub fn feed(&self) -> mpsc::Sender<Vec<f32>> {
        self.feeds.lock().last().expect("microphone never opened").clone()
    }

    /// Stop handle of the most recent open.
    pub fn handle(&self) -> Arc<StubHandle> {
        self.handles
            .lock()
            .last()
            .expect("microphone never opened")
            .clone()
    }

    pub fn open_count(&self) -> usize {
        self.handles.lock().len()
    }
}

#[async_trait]
impl MicrophoneSource for FakeMicrophone {
    async fn open(&self, _sample_rate: u32) -> ClientResult<MicStream> {
        if self.denied.load(Ordering::SeqCst) {
            return Err(ClientError::PermissionDenied("microphone".to_string()));
        }
        let (tx, rx) = mpsc::channel(64);
        let handle = Arc::new(StubHandle::default());
        self.feeds.lock().push(tx);
        self.handles.lock().push(handle.clone());
        Ok(MicStream {
            samples: rx,
            handle,
        })
    }
}

/// Frame grab returning one constant test pattern.
pub struct FakeFrames {
    frame: Mutex<Option<RawFrame>>,
}

impl FakeFrames {
    pub fn with_test_pattern() -> Arc<Self> {
        Arc::new(Self {
            frame: Mutex::new(Some(RawFrame {
                width: 16,
                height: 12,
                rgb: vec![200; 16 * 12 * 3],
            })),
        })
    }
}

impl FrameGrab for FakeFrames {
    fn latest_frame(&self) -> Option<RawFrame> {
        self.frame.lock().clone()
    }
}

/// Visual source recording every open and handing out stub handles.
pub struct FakeVisualSource {
    fail: AtomicBool,
    pub opened: Mutex<Vec<VisualMode>>,
    handles: Mutex<Vec<Arc<StubHandle>>>,
    prior_stopped: Mutex<Vec<Option<bool>>>,
}

impl FakeVisualSource {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            fail: AtomicBool::new(false),
            opened: Mutex::new(Vec::new()),
            handles: Mutex::new(Vec::new()),
            prior_stopped: Mutex::new(Vec::new()),
        })
    }

    pub fn fail_next(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }

    pub fn opened_modes(&self) -> Vec<VisualMode> {
        self.opened.lock().clone()
    }

    /// Stopped-state of the previously handed-out handle, captured at the
    /// moment of each open. `None` for the first open.
    pub fn prior_stopped_at_open(&self) -> Vec<Option<bool>> {
        self.prior_stopped.lock().clone()
    }

    /// Stop handle of the most recent open.
    pub fn handle(&self) -> Arc<StubHandle> {
        self.handles
            .lock()
            .last()
            .expect("visual source never opened")
            .clone()
    }

    pub fn handle_at(&self, index: usize) -> Arc<StubHandle> {
        self.handles.lock()[index].clone()
    }
}

#[async_trait]
impl VisualSource for FakeVisualSource {
    async fn open(&self, mode: VisualMode) -> ClientResult<VisualStream> {
        if self.fail.swap(false, Ordering::SeqCst) {
            return Err(ClientError::DeviceUnavailable(format!("{mode} unavailable")));
        }
        let prior = self.handles.lock().last().map(|handle| handle.is_stopped());
        self.prior_stopped.lock().push(prior);
        let handle = Arc::new(StubHandle::default());
        self.opened.lock().push(mode);
        self.handles.lock().push(handle.clone());
        Ok(VisualStream {
            mode,
            frames: FakeFrames::with_test_pattern(),
            handle,
        })
    }
}

// =============================================================================
// Transport Fake
// =============================================================================

/// Scripted transport. Each connect yields a fresh in-memory connection;
/// outgoing messages accumulate in `outbound`, and the test injects inbound
/// events through [`push`].
///
/// [`push`]: FakeConnector::push
pub struct FakeConnector {
    fail_next: AtomicBool,
    /// Events delivered immediately on connect, before anything else
    pub on_connect: Mutex<Vec<LiveEvent>>,
    pub connect_count: AtomicUsize,
    pub outbound: Arc<Mutex<Vec<ClientMessage>>>,
    pub setups: Mutex<Vec<SessionSetup>>,
    events_tx: Mutex<Option<mpsc::Sender<LiveEvent>>>,
}

impl FakeConnector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            fail_next: AtomicBool::new(false),
            on_connect: Mutex::new(vec![LiveEvent::Opened]),
            connect_count: AtomicUsize::new(0),
            outbound: Arc::new(Mutex::new(Vec::new())),
            setups: Mutex::new(Vec::new()),
            events_tx: Mutex::new(None),
        })
    }

    pub fn fail_next(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    /// Replace the events scripted for the next connect.
    pub fn script_on_connect(&self, events: Vec<LiveEvent>) {
        *self.on_connect.lock() = events;
    }

    /// Inject one inbound event into the current session.
    pub async fn push(&self, event: LiveEvent) {
        let tx = self
            .events_tx
            .lock()
            .clone()
            .expect("no active fake session");
        tx.send(event).await.expect("session event receiver gone");
    }

    /// Outbound messages serialized to JSON for easy assertions.
    pub fn outbound_json(&self) -> Vec<serde_json::Value> {
        self.outbound
            .lock()
            .iter()
            .map(|message| serde_json::to_value(message).expect("client message serializes"))
            .collect()
    }

    pub fn outbound_count(&self) -> usize {
        self.outbound.lock().len()
    }

    pub fn last_setup(&self) -> SessionSetup {
        self.setups.lock().last().expect("no setup captured").clone()
    }
}

#[async_trait]
impl LiveConnector for FakeConnector {
    async fn connect(
        &self,
        _config: &LiveConfig,
        setup: SessionSetup,
    ) -> ClientResult<LiveConnection> {
        self.connect_count.fetch_add(1, Ordering::SeqCst);
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(ClientError::ConnectError("scripted failure".to_string()));
        }
        self.setups.lock().push(setup);

        let (events_tx, events_rx) = mpsc::channel(64);
        for event in self.on_connect.lock().iter().cloned() {
            events_tx.try_send(event).expect("scripted event fits channel");
        }
        *self.events_tx.lock() = Some(events_tx);

        let (outbound_tx, mut outbound_rx) = mpsc::channel(64);
        let log = self.outbound.clone();
        let io_task = tokio::spawn(async move {
            while let Some(message) = outbound_rx.recv().await {
                log.lock().push(message);
            }
        });

        Ok(LiveConnection::new(outbound_tx, events_rx, io_task))
    }
}

// =============================================================================
// Harness
// =============================================================================

type DeviceLog = Arc<Mutex<Vec<(String, String, Option<String>, Option<String>)>>>;

/// Fully faked session manager plus every observation point a test needs.
pub struct Harness {
    pub manager: SessionManager,
    pub updates: mpsc::UnboundedReceiver<SessionUpdate>,
    pub connector: Arc<FakeConnector>,
    pub mic: Arc<FakeMicrophone>,
    pub visual: Arc<FakeVisualSource>,
    pub clock: Arc<ManualClock>,
    pub sink: Arc<RecordingSink>,
    pub device_log: DeviceLog,
    pub memories: MemoryStore,
}

pub fn connected_health() -> HealthSnapshot {
    HealthSnapshot {
        is_connected: true,
        heart_rate: 72,
        steps: 8421,
        sleep_hours: 7.5,
        blood_oxygen: 98.0,
        stress_level: StressLevel::Normal,
        last_sync: 1_700_000_000_000,
    }
}

pub fn harness() -> Harness {
    harness_with_health(HealthSnapshot::default())
}

pub fn harness_with_health(health: HealthSnapshot) -> Harness {
    let connector = FakeConnector::new();
    let mic = FakeMicrophone::new();
    let visual = FakeVisualSource::new();
    let clock = Arc::new(ManualClock::default());
    let sink = Arc::new(RecordingSink::default());
    let memories = MemoryStore::new();

    let device_log: DeviceLog = Arc::new(Mutex::new(Vec::new()));
    let log = device_log.clone();
    let device_sink: Arc<dyn DeviceCommandSink> = Arc::new(
        move |target: &str, action: &str, extra: Option<&str>, extra2: Option<&str>| {
            log.lock().push((
                target.to_string(),
                action.to_string(),
                extra.map(str::to_string),
                extra2.map(str::to_string),
            ));
        },
    );

    let deps = SessionDeps {
        connector: connector.clone(),
        microphone: mic.clone(),
        visual: visual.clone(),
        sink: sink.clone(),
        clock: clock.clone(),
        device_sink,
        health: Arc::new(StaticHealth(health)),
        memories: memories.clone(),
    };
    let (manager, updates) = SessionManager::new(LiveConfig::new("test-key"), deps);

    Harness {
        manager,
        updates,
        connector,
        mic,
        visual,
        clock,
        sink,
        device_log,
        memories,
    }
}

// =============================================================================
// Waiting Helpers
// =============================================================================

/// Polls `condition` until it holds or two seconds pass.
pub async fn wait_until<F: Fn() -> bool>(condition: F, what: &str) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {what}");
}

/// Next update or panic after two seconds.
pub async fn next_update(updates: &mut mpsc::UnboundedReceiver<SessionUpdate>) -> SessionUpdate {
    let recv = tokio::time::timeout(Duration::from_secs(2), updates.recv()).await;
    tokio_test::assert_ok!(recv, "timed out waiting for session update")
        .expect("update stream ended")
}

/// Drains updates until the wanted state change appears.
pub async fn wait_for_state(
    updates: &mut mpsc::UnboundedReceiver<SessionUpdate>,
    wanted: SessionState,
) -> String {
    loop {
        if let SessionUpdate::StateChanged { state, status } = next_update(updates).await {
            if state == wanted {
                return status;
            }
        }
    }
}
