//! Client configuration.
//!
//! Configuration is code-first: hosts construct a [`LiveConfig`] directly or
//! load the API key from the environment (honoring a `.env` file via
//! `dotenvy`). Everything else has defaults matching the companion product:
//! the native-audio Gemini model, the `Kore` voice, 16 kHz capture, 24 kHz
//! playback, and 2 Hz visual frames.

use std::time::Duration;

use crate::error::{ClientError, ClientResult};

/// Default model for the live session.
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash-native-audio-preview-09-2025";

/// Default prebuilt voice for synthesized speech.
pub const DEFAULT_VOICE: &str = "Kore";

/// Microphone capture rate in Hz.
pub const INPUT_SAMPLE_RATE: u32 = 16_000;

/// Synthesized speech playback rate in Hz.
pub const OUTPUT_SAMPLE_RATE: u32 = 24_000;

/// Samples per captured audio block (~256 ms at 16 kHz).
pub const CAPTURE_BLOCK_SIZE: usize = 4096;

/// Period between visual frames while a camera or screen source is active.
pub const VISUAL_FRAME_INTERVAL: Duration = Duration::from_millis(500);

/// Linear downscale applied to visual frames before JPEG encoding.
pub const VISUAL_FRAME_SCALE: f32 = 0.5;

/// JPEG quality for visual frames (0-100).
pub const VISUAL_JPEG_QUALITY: u8 = 60;

/// Persona preamble sent as the system instruction, ahead of the memory
/// context block.
const DEFAULT_PERSONA: &str = "You are Mommy, a caring, warm, and highly intelligent AI companion.

CAPABILITIES:
1. VISUAL: You can see the user/camera OR their SCREEN if they share it.
   - If you see a desktop screen, analyze the user's work, productivity, or help them find things.
2. MEMORY: You can REMEMBER facts using 'remember_info'.
3. CONTROL:
   - Control smart home devices using 'control_device'.
   - Control DESKTOP/COMPUTER using 'control_desktop' (Open/Close apps, Focus Mode, Performance).
   - Manage Wi-Fi with 'manage_wifi', drivers with 'check_drivers', downloads with 'start_download'.
   - Keep the user's task list with 'manage_tasks'.
4. HEALTH: Check health status using 'get_health_status'.
5. BLUETOOTH: Connect devices using 'scan_bluetooth_devices'.
6. PRESENCE: Reflect how you feel with 'set_mood'; use 'toggle_camera' when you need to see the user.

If the user asks to \"Open Chrome\", \"Boost performance\", or \"Turn on Focus Mode\", use 'control_desktop'.
If the user shares their screen, comment on what you see. If they are working hard, praise them.
Always be nurturing. You are a top-class AI agent.";

/// Capture tuning knobs.
///
/// Defaults match the reference client; hosts only override these for
/// constrained embeddings (for example a longer frame interval on a metered
/// connection).
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Samples per audio block handed to the session
    pub block_size: usize,
    /// Microphone sample rate in Hz
    pub input_sample_rate: u32,
    /// Playback sample rate in Hz
    pub output_sample_rate: u32,
    /// Period between visual frames
    pub frame_interval: Duration,
    /// Linear downscale factor applied before JPEG encoding, in (0, 1]
    pub frame_scale: f32,
    /// JPEG quality, 1-100
    pub jpeg_quality: u8,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            block_size: CAPTURE_BLOCK_SIZE,
            input_sample_rate: INPUT_SAMPLE_RATE,
            output_sample_rate: OUTPUT_SAMPLE_RATE,
            frame_interval: VISUAL_FRAME_INTERVAL,
            frame_scale: VISUAL_FRAME_SCALE,
            jpeg_quality: VISUAL_JPEG_QUALITY,
        }
    }
}

/// Configuration for one live session client.
#[derive(Debug, Clone)]
pub struct LiveConfig {
    /// API key for the inference service
    pub api_key: String,
    /// Model identifier (without the `models/` prefix)
    pub model: String,
    /// Prebuilt voice name for speech output
    pub voice: String,
    /// Endpoint override; `None` uses the public Gemini Live endpoint
    pub endpoint: Option<String>,
    /// Persona preamble for the system instruction
    pub persona: String,
    /// Capture tuning
    pub capture: CaptureConfig,
}

impl LiveConfig {
    /// Create a configuration with product defaults and the given API key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            voice: DEFAULT_VOICE.to_string(),
            endpoint: None,
            persona: DEFAULT_PERSONA.to_string(),
            capture: CaptureConfig::default(),
        }
    }

    /// Load the API key from `GEMINI_API_KEY` (falling back to `API_KEY`),
    /// honoring a `.env` file in the working directory.
    pub fn from_env() -> ClientResult<Self> {
        dotenvy::dotenv().ok();
        let api_key = std::env::var("GEMINI_API_KEY")
            .or_else(|_| std::env::var("API_KEY"))
            .map_err(|_| {
                ClientError::InvalidConfiguration(
                    "GEMINI_API_KEY environment variable is not set".to_string(),
                )
            })?;
        let config = Self::new(api_key);
        config.validate()?;
        Ok(config)
    }

    /// Load the API key from a specific env file without touching the
    /// process environment. Used by desktop embeddings that ship a config
    /// file next to the binary.
    pub fn from_env_file(path: impl AsRef<std::path::Path>) -> ClientResult<Self> {
        let iter = dotenvy::from_path_iter(path.as_ref()).map_err(|e| {
            ClientError::InvalidConfiguration(format!("failed to read env file: {e}"))
        })?;
        let mut api_key: Option<String> = None;
        for item in iter {
            let (key, value) = item.map_err(|e| {
                ClientError::InvalidConfiguration(format!("malformed env file entry: {e}"))
            })?;
            match key.as_str() {
                "GEMINI_API_KEY" => api_key = Some(value),
                "API_KEY" if api_key.is_none() => api_key = Some(value),
                _ => {}
            }
        }
        let api_key = api_key.ok_or_else(|| {
            ClientError::InvalidConfiguration(
                "env file does not define GEMINI_API_KEY".to_string(),
            )
        })?;
        let config = Self::new(api_key);
        config.validate()?;
        Ok(config)
    }

    /// Override the model identifier.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Override the speech voice.
    pub fn with_voice(mut self, voice: impl Into<String>) -> Self {
        self.voice = voice.into();
        self
    }

    /// Override the session endpoint (used by tests and private deployments).
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Replace the persona preamble.
    pub fn with_persona(mut self, persona: impl Into<String>) -> Self {
        self.persona = persona.into();
        self
    }

    /// Override capture tuning.
    pub fn with_capture(mut self, capture: CaptureConfig) -> Self {
        self.capture = capture;
        self
    }

    /// Assemble the system instruction from the persona preamble and the
    /// current memory context block.
    pub fn system_instruction(&self, memory_context: &str) -> String {
        if memory_context.is_empty() {
            self.persona.clone()
        } else {
            format!("{}\n\n{}", self.persona, memory_context)
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> ClientResult<()> {
        if self.api_key.trim().is_empty() {
            return Err(ClientError::InvalidConfiguration(
                "API key must not be empty".to_string(),
            ));
        }
        if self.model.trim().is_empty() {
            return Err(ClientError::InvalidConfiguration(
                "model must not be empty".to_string(),
            ));
        }
        if self.capture.block_size == 0 {
            return Err(ClientError::InvalidConfiguration(
                "capture block size must be non-zero".to_string(),
            ));
        }
        if self.capture.input_sample_rate == 0 || self.capture.output_sample_rate == 0 {
            return Err(ClientError::InvalidConfiguration(
                "sample rates must be non-zero".to_string(),
            ));
        }
        if self.capture.frame_interval.is_zero() {
            return Err(ClientError::InvalidConfiguration(
                "visual frame interval must be non-zero".to_string(),
            ));
        }
        if !(self.capture.frame_scale > 0.0 && self.capture.frame_scale <= 1.0) {
            return Err(ClientError::InvalidConfiguration(
                "frame scale must be in (0, 1]".to_string(),
            ));
        }
        if self.capture.jpeg_quality == 0 || self.capture.jpeg_quality > 100 {
            return Err(ClientError::InvalidConfiguration(
                "JPEG quality must be in 1..=100".to_string(),
            ));
        }
        Ok(())
    }
}
