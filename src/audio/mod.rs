//! Audio path: PCM codec, gapless playback scheduling, and level metering.
//!
//! The session feeds 16 kHz mono microphone blocks out and 24 kHz mono
//! synthesized speech back in; everything here is sample-format plumbing
//! around that stream.

pub mod codec;
pub mod meter;
pub mod playback;

pub use codec::{DecodedFrame, decode_frame, encode_frame, from_transport_text, to_transport_text};
pub use meter::{AudioLevels, VolumeMeter};
pub use playback::{
    NullSink, OutputClock, PlaybackScheduler, PlaybackSink, ScheduledChunk, SystemClock,
};
