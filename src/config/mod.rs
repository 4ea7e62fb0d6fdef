//! Configuration management for the attune voice loop
//!
//! One immutable [`Config`] value is constructed at startup and passed
//! explicitly into each component's constructor. Sources are layered
//! env > TOML file > defaults.

pub mod file;

use std::path::PathBuf;

use crate::{Error, Result};

/// Voice loop configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Wake word gate settings
    pub wake: WakeConfig,

    /// Turn capture and end-of-speech settings
    pub turn: TurnConfig,

    /// Playback ring settings
    pub playback: PlaybackConfig,

    /// Round-trip latency classification bands
    pub latency: LatencyConfig,

    /// Transcription backend settings
    pub stt: SttConfig,

    /// Synthesis backend settings
    pub tts: TtsConfig,

    /// API keys for external services
    pub api_keys: ApiKeys,

    /// Path to the answer book TOML file (embedded default if unset)
    pub answers_path: Option<PathBuf>,
}

/// Wake word gate configuration
#[derive(Debug, Clone)]
pub struct WakeConfig {
    /// Wake phrase, lowercase (e.g. "hey attune")
    pub phrase: String,

    /// Cooldown between repeat detections, in milliseconds
    pub debounce_ms: u64,

    /// RMS energy threshold for phrase spotting
    pub energy_threshold: f32,
}

/// Turn capture and end-of-speech configuration
#[derive(Debug, Clone)]
pub struct TurnConfig {
    /// Samples per frame (320 = 20ms at 16kHz)
    pub frame_size: usize,

    /// RMS energy above which a frame counts as speech
    pub speech_threshold: f32,

    /// Sustained silence that ends the turn, in milliseconds
    pub silence_duration_ms: u64,

    /// Hard cap on a single turn, in milliseconds
    pub max_speech_duration_ms: u64,

    /// Cooldown after playback ends before re-arming, in milliseconds
    pub cooldown_ms: u64,

    /// Backoff after a recoverable error, in milliseconds
    pub error_backoff_ms: u64,
}

impl TurnConfig {
    /// Duration of one frame in milliseconds
    #[must_use]
    pub const fn frame_duration_ms(&self) -> u64 {
        (self.frame_size * 1000 / crate::audio::SAMPLE_RATE as usize) as u64
    }

    /// Consecutive silent frames that end the turn
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn required_silence_frames(&self) -> u32 {
        (self.silence_duration_ms / self.frame_duration_ms()) as u32
    }
}

/// Playback ring configuration
#[derive(Debug, Clone)]
pub struct PlaybackConfig {
    /// Samples buffered before playback starts (1920 = 120ms at 16kHz)
    pub jitter_threshold: usize,

    /// Ring capacity in samples (32000 = 2s at 16kHz)
    pub ring_capacity: usize,
}

/// Latency classification bands, in milliseconds
#[derive(Debug, Clone, Copy)]
pub struct LatencyConfig {
    pub target_ms: u64,
    pub warning_ms: u64,
    pub critical_ms: u64,
}

/// Transcription provider backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SttProvider {
    Whisper,
    Deepgram,
}

/// Transcription backend configuration
#[derive(Debug, Clone)]
pub struct SttConfig {
    /// Provider backend
    pub provider: SttProvider,

    /// Model identifier (e.g. "whisper-1", "nova-2")
    pub model: String,

    /// Reconnect attempts before surfacing a fatal error
    pub reconnect_attempts: u32,

    /// Fixed delay between reconnect attempts, in milliseconds
    pub reconnect_delay_ms: u64,
}

/// Synthesis provider backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TtsProvider {
    OpenAi,
    ElevenLabs,
}

/// Synthesis backend configuration
#[derive(Debug, Clone)]
pub struct TtsConfig {
    /// Provider backend
    pub provider: TtsProvider,

    /// Model identifier (e.g. "tts-1")
    pub model: String,

    /// Voice identifier
    pub voice: String,

    /// Speed multiplier (0.25 to 4.0)
    pub speed: f64,
}

/// API keys for external services
#[derive(Debug, Clone, Default)]
pub struct ApiKeys {
    /// `OpenAI` API key (Whisper STT and `OpenAI` TTS)
    pub openai: Option<String>,

    /// `Deepgram` API key (optional STT)
    pub deepgram: Option<String>,

    /// `ElevenLabs` API key (optional TTS)
    pub elevenlabs: Option<String>,
}

impl Config {
    /// Load configuration from env, TOML file, and defaults
    ///
    /// # Errors
    ///
    /// Returns error if a provider name in the config is unrecognized
    pub fn load() -> Result<Self> {
        let fc = file::load_config_file();

        let api_keys = ApiKeys {
            openai: std::env::var("OPENAI_API_KEY").ok().or(fc.api_keys.openai),
            deepgram: std::env::var("DEEPGRAM_API_KEY")
                .ok()
                .or(fc.api_keys.deepgram),
            elevenlabs: std::env::var("ELEVENLABS_API_KEY")
                .ok()
                .or(fc.api_keys.elevenlabs),
        };

        let wake = WakeConfig {
            phrase: std::env::var("ATTUNE_WAKE_PHRASE")
                .ok()
                .or(fc.wake.phrase)
                .unwrap_or_else(|| "hey attune".to_string())
                .to_lowercase(),
            debounce_ms: fc.wake.debounce_ms.unwrap_or(1000),
            energy_threshold: fc.wake.energy_threshold.unwrap_or(0.03),
        };

        let turn = TurnConfig {
            frame_size: 320,
            speech_threshold: fc.turn.speech_threshold.unwrap_or(0.01),
            silence_duration_ms: fc.turn.silence_duration_ms.unwrap_or(600),
            max_speech_duration_ms: fc.turn.max_speech_duration_ms.unwrap_or(2000),
            cooldown_ms: fc.turn.cooldown_ms.unwrap_or(500),
            error_backoff_ms: fc.turn.error_backoff_ms.unwrap_or(1000),
        };

        let playback = PlaybackConfig {
            jitter_threshold: fc.playback.jitter_threshold.unwrap_or(1920),
            ring_capacity: fc.playback.ring_capacity.unwrap_or(32000),
        };

        let latency = LatencyConfig {
            target_ms: fc.latency.target_ms.unwrap_or(800),
            warning_ms: fc.latency.warning_ms.unwrap_or(1200),
            critical_ms: fc.latency.critical_ms.unwrap_or(1500),
        };

        let stt_provider = match std::env::var("ATTUNE_STT_PROVIDER")
            .ok()
            .or(fc.stt.provider)
            .as_deref()
        {
            None | Some("whisper") => SttProvider::Whisper,
            Some("deepgram") => SttProvider::Deepgram,
            Some(other) => {
                return Err(Error::Config(format!("unknown STT provider: {other}")));
            }
        };
        let stt = SttConfig {
            provider: stt_provider,
            model: std::env::var("ATTUNE_STT_MODEL")
                .ok()
                .or(fc.stt.model)
                .unwrap_or_else(|| match stt_provider {
                    SttProvider::Whisper => "whisper-1".to_string(),
                    SttProvider::Deepgram => "nova-2".to_string(),
                }),
            reconnect_attempts: fc.stt.reconnect_attempts.unwrap_or(3),
            reconnect_delay_ms: fc.stt.reconnect_delay_ms.unwrap_or(2000),
        };

        let tts_provider = match std::env::var("ATTUNE_TTS_PROVIDER")
            .ok()
            .or(fc.tts.provider)
            .as_deref()
        {
            None | Some("openai") => TtsProvider::OpenAi,
            Some("elevenlabs") => TtsProvider::ElevenLabs,
            Some(other) => {
                return Err(Error::Config(format!("unknown TTS provider: {other}")));
            }
        };
        let tts = TtsConfig {
            provider: tts_provider,
            model: std::env::var("ATTUNE_TTS_MODEL")
                .ok()
                .or(fc.tts.model)
                .unwrap_or_else(|| match tts_provider {
                    TtsProvider::OpenAi => "tts-1".to_string(),
                    TtsProvider::ElevenLabs => "eleven_monolingual_v1".to_string(),
                }),
            voice: fc.tts.voice.unwrap_or_else(|| "alloy".to_string()),
            speed: fc.tts.speed.unwrap_or(1.0),
        };

        let answers_path = std::env::var("ATTUNE_ANSWERS_PATH")
            .ok()
            .or(fc.answers_path)
            .map(PathBuf::from);

        Ok(Self {
            wake,
            turn,
            playback,
            latency,
            stt,
            tts,
            api_keys,
            answers_path,
        })
    }
}
