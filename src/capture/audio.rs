//! Microphone capture and fixed-size block framing.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::capture::CaptureHandle;
use crate::error::ClientResult;

/// Source of live microphone audio.
///
/// `open` requests exclusive access to the device and starts streaming.
/// Implementations surface refusal as `PermissionDenied` and missing
/// hardware as `DeviceUnavailable`.
#[async_trait]
pub trait MicrophoneSource: Send + Sync {
    async fn open(&self, sample_rate: u32) -> ClientResult<MicStream>;
}

/// An open microphone stream: sample bursts of arbitrary size plus the
/// handle that releases the device.
pub struct MicStream {
    pub samples: mpsc::Receiver<Vec<f32>>,
    pub handle: Arc<dyn CaptureHandle>,
}

/// Accumulates arbitrary sample bursts into fixed-size blocks.
///
/// Hardware delivers whatever burst sizes it likes; the session sends
/// exactly `block_size` samples per frame. Residual samples stay buffered
/// until the next burst; a partial block at teardown is simply dropped.
#[derive(Debug)]
pub struct BlockFramer {
    block_size: usize,
    buffer: Vec<f32>,
}

impl BlockFramer {
    pub fn new(block_size: usize) -> Self {
        Self {
            block_size,
            buffer: Vec::with_capacity(block_size),
        }
    }

    /// Feed a burst, returning every completed block.
    pub fn push(&mut self, samples: &[f32]) -> Vec<Vec<f32>> {
        self.buffer.extend_from_slice(samples);
        let mut blocks = Vec::new();
        while self.buffer.len() >= self.block_size {
            let rest = self.buffer.split_off(self.block_size);
            blocks.push(std::mem::replace(&mut self.buffer, rest));
        }
        blocks
    }

    /// Samples currently buffered below one block.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }
}
