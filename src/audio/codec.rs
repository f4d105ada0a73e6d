//! PCM16 codec and transport text encoding.
//!
//! The session carries raw PCM: 16 kHz mono in, 24 kHz mono out, signed
//! 16-bit little-endian either way, wrapped in base64 for the JSON
//! transport. Encoding is deterministic and lossy only through quantization;
//! decoding rejects byte streams that cannot hold whole samples.

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64_STANDARD};

use crate::error::{ClientError, ClientResult};

/// A decoded audio buffer, playable at its stated rate.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedFrame {
    /// Interleaved samples in [-1, 1]
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u16,
}

impl DecodedFrame {
    /// Playback duration in seconds.
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 || self.channels == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / (self.sample_rate as f64 * self.channels as f64)
    }
}

/// Encode float samples as PCM16 little-endian.
///
/// Samples are clamped to [-1, 1] before scaling, so hot input cannot wrap.
pub fn encode_frame(samples: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        let clamped = sample.clamp(-1.0, 1.0);
        // `as` saturates, mapping +1.0 to 32767 and -1.0 to -32768.
        let quantized = (clamped * 32768.0) as i16;
        bytes.extend_from_slice(&quantized.to_le_bytes());
    }
    bytes
}

/// Decode PCM16 little-endian bytes into float samples at the stated rate.
///
/// Fails with a decode error when the byte length cannot hold whole frames
/// (not a multiple of 2 bytes per sample times the channel count).
pub fn decode_frame(bytes: &[u8], sample_rate: u32, channels: u16) -> ClientResult<DecodedFrame> {
    if channels == 0 {
        return Err(ClientError::DecodeError(
            "channel count must be non-zero".to_string(),
        ));
    }
    let frame_bytes = 2 * channels as usize;
    if bytes.len() % frame_bytes != 0 {
        return Err(ClientError::DecodeError(format!(
            "PCM byte length {} is not a multiple of {} (16-bit x {} channels)",
            bytes.len(),
            frame_bytes,
            channels
        )));
    }
    let samples = bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / 32768.0)
        .collect();
    Ok(DecodedFrame {
        samples,
        sample_rate,
        channels,
    })
}

/// Encode bytes as transport text (standard padded base64).
pub fn to_transport_text(bytes: &[u8]) -> String {
    BASE64_STANDARD.encode(bytes)
}

/// Decode transport text back to bytes. Exact inverse of
/// [`to_transport_text`].
pub fn from_transport_text(text: &str) -> ClientResult<Vec<u8>> {
    BASE64_STANDARD
        .decode(text)
        .map_err(|e| ClientError::DecodeError(format!("invalid transport text: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_within_one_quantization_step() {
        let samples: Vec<f32> = vec![0.0, 0.25, -0.25, 0.5, -0.5, 0.9999, -0.9999, 1.0, -1.0];
        let encoded = encode_frame(&samples);
        let decoded = decode_frame(&encoded, 16_000, 1).unwrap();
        assert_eq!(decoded.samples.len(), samples.len());
        for (original, restored) in samples.iter().zip(decoded.samples.iter()) {
            assert!(
                (original - restored).abs() <= 1.0 / 32768.0,
                "sample {original} decoded to {restored}"
            );
        }
    }

    #[test]
    fn test_encode_clamps_out_of_range() {
        let encoded = encode_frame(&[2.0, -3.5]);
        let decoded = decode_frame(&encoded, 16_000, 1).unwrap();
        assert!((decoded.samples[0] - (32767.0 / 32768.0)).abs() < f32::EPSILON);
        assert!((decoded.samples[1] - (-1.0)).abs() < f32::EPSILON);
    }

    #[test]
    fn test_decode_rejects_odd_length() {
        let err = decode_frame(&[0x01, 0x02, 0x03], 24_000, 1);
        assert!(matches!(err, Err(ClientError::DecodeError(_))));

        // Six bytes hold three mono samples but only one and a half stereo
        // frames.
        let err = decode_frame(&[0; 6], 24_000, 2);
        assert!(matches!(err, Err(ClientError::DecodeError(_))));
    }

    #[test]
    fn test_decode_empty_is_empty() {
        let decoded = decode_frame(&[], 24_000, 1).unwrap();
        assert!(decoded.samples.is_empty());
        assert_eq!(decoded.duration_secs(), 0.0);
    }

    #[test]
    fn test_duration() {
        let decoded = decode_frame(&vec![0u8; 24_000 * 2], 24_000, 1).unwrap();
        assert!((decoded.duration_secs() - 1.0).abs() < 1e-9);

        let half_second = decode_frame(&vec![0u8; 24_000], 24_000, 1).unwrap();
        assert!((half_second.duration_secs() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_transport_round_trip() {
        let cases: Vec<Vec<u8>> = vec![
            vec![],
            vec![0x00],
            vec![0x00, 0x01],
            vec![0xff, 0xfe, 0xfd],
            (0..=255).collect(),
        ];
        for bytes in cases {
            let text = to_transport_text(&bytes);
            let restored = from_transport_text(&text).unwrap();
            assert_eq!(restored, bytes);
        }
    }

    #[test]
    fn test_transport_rejects_garbage() {
        assert!(matches!(
            from_transport_text("not base64!!!"),
            Err(ClientError::DecodeError(_))
        ));
    }
}
