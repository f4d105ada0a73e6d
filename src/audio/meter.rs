//! Input/output volume metering for UI feedback.
//!
//! A read-only observer of the audio graph: the capture path records each
//! microphone block, the session records each decoded output chunk, and the
//! host polls [`VolumeMeter::levels`] once per animation tick. Levels are
//! RMS over the most recently recorded block, normalized to [0, 1], with a
//! short exponential decay after updates stop so the needle falls back to
//! zero when a path goes quiet. Each channel is a pair of atomic cells, so
//! recording from an audio callback thread never takes a lock and never
//! touches scheduling.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Instant;

/// Decay half-life applied from the last recorded block.
const DECAY_HALF_LIFE_SECS: f64 = 0.15;

/// Latest input/output level pair in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AudioLevels {
    pub input: f32,
    pub output: f32,
}

/// One metered path: the level as f32 bits plus the milliseconds since the
/// meter's origin at which it was recorded. The two cells are not read as a
/// pair; a read between the stores only misdates the decay by one block.
#[derive(Debug)]
struct Channel {
    level_bits: AtomicU32,
    updated_ms: AtomicU64,
}

impl Channel {
    fn new() -> Self {
        Self {
            level_bits: AtomicU32::new(0.0f32.to_bits()),
            updated_ms: AtomicU64::new(0),
        }
    }

    fn record(&self, samples: &[f32], now_ms: u64) {
        self.level_bits.store(rms(samples).to_bits(), Ordering::Relaxed);
        self.updated_ms.store(now_ms, Ordering::Relaxed);
    }

    fn read(&self, now_ms: u64) -> f32 {
        let level = f32::from_bits(self.level_bits.load(Ordering::Relaxed));
        let elapsed_ms = now_ms.saturating_sub(self.updated_ms.load(Ordering::Relaxed));
        let decayed =
            level as f64 * 0.5f64.powf(elapsed_ms as f64 / 1000.0 / DECAY_HALF_LIFE_SECS);
        if decayed < 1e-4 { 0.0 } else { decayed as f32 }
    }

    fn reset(&self, now_ms: u64) {
        self.level_bits.store(0.0f32.to_bits(), Ordering::Relaxed);
        self.updated_ms.store(now_ms, Ordering::Relaxed);
    }
}

/// Shared level meter for the input and output audio paths.
#[derive(Debug)]
pub struct VolumeMeter {
    origin: Instant,
    input: Channel,
    output: Channel,
}

impl VolumeMeter {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            input: Channel::new(),
            output: Channel::new(),
        }
    }

    fn now_ms(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }

    /// Record one microphone block.
    pub fn record_input(&self, samples: &[f32]) {
        self.input.record(samples, self.now_ms());
    }

    /// Record one decoded output chunk.
    pub fn record_output(&self, samples: &[f32]) {
        self.output.record(samples, self.now_ms());
    }

    /// Zero the output level immediately (interruption flush).
    pub fn reset_output(&self) {
        self.output.reset(self.now_ms());
    }

    /// Zero both levels (session teardown).
    pub fn reset(&self) {
        let now_ms = self.now_ms();
        self.input.reset(now_ms);
        self.output.reset(now_ms);
    }

    /// Latest levels with decay applied.
    pub fn levels(&self) -> AudioLevels {
        let now_ms = self.now_ms();
        AudioLevels {
            input: self.input.read(now_ms),
            output: self.output.read(now_ms),
        }
    }
}

impl Default for VolumeMeter {
    fn default() -> Self {
        Self::new()
    }
}

fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f64 = samples.iter().map(|&s| (s as f64) * (s as f64)).sum();
    ((sum / samples.len() as f64).sqrt() as f32).clamp(0.0, 1.0)
}
