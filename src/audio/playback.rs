//! Gapless playback scheduling for synthesized speech.
//!
//! Output audio arrives as a stream of decoded PCM chunks that must play
//! back-to-back with no gap or overlap, even when chunks arrive faster or
//! slower than real time. The scheduler keeps a "next available start"
//! cursor on the output clock: each chunk starts at the later of now and the
//! previous chunk's scheduled end. An interruption flush silences everything
//! still pending and snaps the cursor back to now so the next turn starts
//! immediately.
//!
//! The clock and the output device sit behind traits. Hosts provide a real
//! sink wired to their audio stack; a missing output device is represented
//! by [`NullSink`], which degrades playback to silence without ever raising
//! an error. The active set is pruned against the clock whenever it is
//! observed, which is how finished chunks remove themselves.

use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tracing::debug;

use crate::audio::codec::DecodedFrame;

/// Monotonic clock for the output path, in seconds.
pub trait OutputClock: Send + Sync {
    fn now(&self) -> f64;
}

/// Wall clock anchored at construction time.
#[derive(Debug)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl OutputClock for SystemClock {
    fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }
}

/// A chunk admitted to the schedule, with its absolute start time.
#[derive(Debug, Clone)]
pub struct ScheduledChunk {
    pub id: u64,
    pub samples: Arc<Vec<f32>>,
    pub sample_rate: u32,
    /// Absolute start on the output clock, seconds
    pub start: f64,
    /// Playback length, seconds
    pub duration: f64,
}

impl ScheduledChunk {
    pub fn end(&self) -> f64 {
        self.start + self.duration
    }
}

/// Output device abstraction. `begin` is called once per chunk with its
/// absolute start time; `stop_all` must silence everything immediately.
/// Both run outside the scheduler's internal lock, so a sink is free to
/// query the scheduler from either.
pub trait PlaybackSink: Send + Sync {
    fn begin(&self, chunk: &ScheduledChunk);
    fn stop_all(&self);
}

/// Sink for hosts without an output device. Every operation is a no-op, so
/// a session keeps running with playback silently degraded.
#[derive(Debug, Default)]
pub struct NullSink;

impl PlaybackSink for NullSink {
    fn begin(&self, _chunk: &ScheduledChunk) {}
    fn stop_all(&self) {}
}

struct SchedulerState {
    cursor: f64,
    active: Vec<ScheduledChunk>,
    next_id: u64,
}

/// FIFO scheduler guaranteeing non-overlapping, back-to-back playback.
pub struct PlaybackScheduler {
    clock: Arc<dyn OutputClock>,
    sink: Arc<dyn PlaybackSink>,
    state: Mutex<SchedulerState>,
}

impl PlaybackScheduler {
    pub fn new(clock: Arc<dyn OutputClock>, sink: Arc<dyn PlaybackSink>) -> Self {
        let cursor = clock.now();
        Self {
            clock,
            sink,
            state: Mutex::new(SchedulerState {
                cursor,
                active: Vec::new(),
                next_id: 0,
            }),
        }
    }

    /// Scheduler without an output device; playback is tracked but silent.
    pub fn silent(clock: Arc<dyn OutputClock>) -> Self {
        Self::new(clock, Arc::new(NullSink))
    }

    /// Admit a decoded chunk. Returns its scheduled absolute start time.
    ///
    /// Start time is the later of the clock's now and the previous chunk's
    /// scheduled end, which keeps playback gapless under arrival jitter and
    /// avoids overlap when chunks arrive early.
    pub fn enqueue(&self, frame: DecodedFrame) -> f64 {
        let now = self.clock.now();
        let mut state = self.state.lock();
        Self::reap(&mut state, now);

        let start = now.max(state.cursor);
        let duration = frame.duration_secs();
        let chunk = ScheduledChunk {
            id: state.next_id,
            samples: Arc::new(frame.samples),
            sample_rate: frame.sample_rate,
            start,
            duration,
        };
        state.next_id += 1;
        state.cursor = start + duration;
        state.active.push(chunk.clone());
        drop(state);

        debug!(
            chunk_id = chunk.id,
            start, duration, "scheduled playback chunk"
        );
        // Guard released first; a sink may observe the scheduler from begin.
        self.sink.begin(&chunk);
        start
    }

    /// Silence and discard everything still pending, then reset the cursor
    /// to now. Called on the interruption signal; the next enqueued chunk
    /// starts immediately instead of after stale scheduled audio. With
    /// nothing unfinished there is nothing to silence and the sink is left
    /// untouched.
    pub fn flush_and_reset(&self) {
        let now = self.clock.now();
        let mut state = self.state.lock();
        Self::reap(&mut state, now);
        let dropped = state.active.len();
        state.active.clear();
        state.cursor = now;
        drop(state);

        if dropped > 0 {
            self.sink.stop_all();
            debug!(dropped, "flushed pending playback");
        }
    }

    /// Number of chunks scheduled but not yet finished.
    pub fn pending_chunks(&self) -> usize {
        let now = self.clock.now();
        let mut state = self.state.lock();
        Self::reap(&mut state, now);
        state.active.len()
    }

    /// Whether any scheduled audio has not yet finished playing. Drives the
    /// host's "is speaking" indication together with the volume meter.
    pub fn is_active(&self) -> bool {
        self.pending_chunks() > 0
    }

    /// The cursor: absolute time the next enqueued chunk would start if it
    /// arrived right now or later.
    pub fn next_available_start(&self) -> f64 {
        let now = self.clock.now();
        let state = self.state.lock();
        state.cursor.max(now)
    }

    fn reap(state: &mut SchedulerState, now: f64) {
        state.active.retain(|chunk| chunk.end() > now);
    }
}
