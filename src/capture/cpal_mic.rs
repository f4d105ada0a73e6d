//! cpal-backed microphone source for desktop embedding.
//!
//! The cpal stream is created and kept on a dedicated thread (streams are
//! not `Send`); captured bursts are forwarded into the session over a
//! bounded channel. Stereo devices are downmixed to mono by averaging.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, StreamConfig};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info};

use crate::capture::{CaptureHandle, MicStream, MicrophoneSource};
use crate::error::{ClientError, ClientResult};

/// Bursts buffered between the device thread and the session.
const BURST_CHANNEL_CAPACITY: usize = 16;

/// Microphone source backed by the default cpal input device.
#[derive(Debug, Default)]
pub struct CpalMicrophone;

impl CpalMicrophone {
    pub fn new() -> Self {
        Self
    }
}

struct CpalMicHandle {
    stop_tx: std::sync::mpsc::Sender<()>,
    stopped: Arc<AtomicBool>,
}

impl CaptureHandle for CpalMicHandle {
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
impl MicrophoneSource for CpalMicrophone {
    async fn open(&self, sample_rate: u32) -> ClientResult<MicStream> {
        let (burst_tx, burst_rx) = mpsc::channel(BURST_CHANNEL_CAPACITY);
        let (ready_tx, ready_rx) = oneshot::channel();
        let (stop_tx, stop_rx) = std::sync::mpsc::channel();
        let stopped = Arc::new(AtomicBool::new(false));
        let thread_stopped = stopped.clone();

        thread::Builder::new()
            .name("mic-capture".to_string())
            .spawn(move || {
                mic_thread_main(sample_rate, burst_tx, ready_tx, stop_rx, thread_stopped);
            })
            .map_err(|e| ClientError::DeviceUnavailable(format!("capture thread: {e}")))?;

        ready_rx
            .await
            .map_err(|_| ClientError::DeviceUnavailable("capture thread exited".to_string()))??;

        Ok(MicStream {
            samples: burst_rx,
            handle: Arc::new(CpalMicHandle { stop_tx, stopped }),
        })
    }
}

fn mic_thread_main(
    sample_rate: u32,
    burst_tx: mpsc::Sender<Vec<f32>>,
    ready_tx: oneshot::Sender<ClientResult<()>>,
    stop_rx: std::sync::mpsc::Receiver<()>,
    stopped: Arc<AtomicBool>,
) {
    let stream = match build_stream(sample_rate, burst_tx) {
        Ok(stream) => stream,
        Err(e) => {
            let _ = ready_tx.send(Err(e));
            stopped.store(true, Ordering::SeqCst);
            return;
        }
    };
    if let Err(e) = stream.play() {
        let _ = ready_tx.send(Err(classify(format!("failed to start input stream: {e}"))));
        stopped.store(true, Ordering::SeqCst);
        return;
    }
    let _ = ready_tx.send(Ok(()));

    // Parked until stop() fires or the handle is dropped.
    let _ = stop_rx.recv();
    drop(stream);
    stopped.store(true, Ordering::SeqCst);
    info!("microphone released");
}

fn build_stream(
    sample_rate: u32,
    burst_tx: mpsc::Sender<Vec<f32>>,
) -> ClientResult<cpal::Stream> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| ClientError::DeviceUnavailable("no input device available".to_string()))?;
    info!(device = %device.name().unwrap_or_default(), "opening microphone");

    let supported = device
        .supported_input_configs()
        .map_err(|e| classify(format!("querying input configs: {e}")))?
        .filter(|c| c.channels() == 1 || c.channels() == 2)
        .find(|c| {
            c.min_sample_rate().0 <= sample_rate && c.max_sample_rate().0 >= sample_rate
        })
        .map(|c| c.with_sample_rate(SampleRate(sample_rate)))
        .ok_or_else(|| {
            ClientError::DeviceUnavailable(format!(
                "no input configuration supports {sample_rate} Hz"
            ))
        })?;

    let config = StreamConfig {
        channels: supported.channels(),
        sample_rate: supported.sample_rate(),
        buffer_size: cpal::BufferSize::Default,
    };
    info!(
        channels = config.channels,
        rate = config.sample_rate.0,
        "microphone configuration"
    );

    let channels = config.channels;
    let stream = device
        .build_input_stream(
            &config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                let burst = if channels == 2 {
                    data.chunks(2)
                        .map(|pair| (pair[0] + pair.get(1).copied().unwrap_or(pair[0])) / 2.0)
                        .collect()
                } else {
                    data.to_vec()
                };
                // Never block the audio callback; a full channel drops the
                // burst (the session has fallen behind, no drain required).
                if let Err(mpsc::error::TrySendError::Full(_)) = burst_tx.try_send(burst) {
                    debug!("dropping microphone burst, session is behind");
                }
            },
            |err| error!("input stream error: {err}"),
            None,
        )
        .map_err(|e| classify(format!("building input stream: {e}")))?;
    Ok(stream)
}

/// OS privacy refusals surface as opaque backend errors; keep the
/// user-correctable ones distinguishable from missing hardware.
fn classify(message: String) -> ClientError {
    let lower = message.to_lowercase();
    if lower.contains("permission") || lower.contains("denied") || lower.contains("not allowed") {
        ClientError::PermissionDenied(message)
    } else {
        ClientError::DeviceUnavailable(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_permission_messages() {
        assert!(matches!(
            classify("access denied by the OS".to_string()),
            ClientError::PermissionDenied(_)
        ));
        assert!(matches!(
            classify("device disconnected".to_string()),
            ClientError::DeviceUnavailable(_)
        ));
    }
}
