//! TOML configuration file loading
//!
//! Supports `~/.config/attune/config.toml` as a persistent config source.
//! All fields are optional — the file is a partial overlay on top of defaults.

use std::path::PathBuf;

use serde::Deserialize;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct AttuneConfigFile {
    /// Wake word configuration
    #[serde(default)]
    pub wake: WakeFileConfig,

    /// Capture/endpointing configuration
    #[serde(default)]
    pub turn: TurnFileConfig,

    /// Playback configuration
    #[serde(default)]
    pub playback: PlaybackFileConfig,

    /// Round-trip latency thresholds
    #[serde(default)]
    pub latency: LatencyFileConfig,

    /// Transcription backend configuration
    #[serde(default)]
    pub stt: SttFileConfig,

    /// Synthesis backend configuration
    #[serde(default)]
    pub tts: TtsFileConfig,

    /// API keys for external services
    #[serde(default)]
    pub api_keys: ApiKeysFileConfig,

    /// Path to the answer book TOML file
    pub answers_path: Option<String>,
}

/// Wake word configuration
#[derive(Debug, Default, Deserialize)]
pub struct WakeFileConfig {
    /// Wake phrase (e.g. "hey attune")
    pub phrase: Option<String>,

    /// Cooldown between repeat detections, in milliseconds
    pub debounce_ms: Option<u64>,

    /// RMS energy threshold for phrase spotting
    pub energy_threshold: Option<f32>,
}

/// Turn capture and end-of-speech configuration
#[derive(Debug, Default, Deserialize)]
pub struct TurnFileConfig {
    /// RMS energy above which a frame counts as speech
    pub speech_threshold: Option<f32>,

    /// Sustained silence that ends the turn, in milliseconds
    pub silence_duration_ms: Option<u64>,

    /// Hard cap on a single turn, in milliseconds
    pub max_speech_duration_ms: Option<u64>,

    /// Cooldown after playback ends before re-arming, in milliseconds
    pub cooldown_ms: Option<u64>,

    /// Backoff after a recoverable error, in milliseconds
    pub error_backoff_ms: Option<u64>,
}

/// Playback ring configuration
#[derive(Debug, Default, Deserialize)]
pub struct PlaybackFileConfig {
    /// Samples buffered before playback starts
    pub jitter_threshold: Option<usize>,

    /// Ring capacity in samples
    pub ring_capacity: Option<usize>,
}

/// Latency classification bands, in milliseconds
#[derive(Debug, Default, Deserialize)]
pub struct LatencyFileConfig {
    pub target_ms: Option<u64>,
    pub warning_ms: Option<u64>,
    pub critical_ms: Option<u64>,
}

/// Transcription backend configuration
#[derive(Debug, Default, Deserialize)]
pub struct SttFileConfig {
    /// Provider name ("whisper" or "deepgram")
    pub provider: Option<String>,

    /// Model identifier (e.g. "whisper-1", "nova-2")
    pub model: Option<String>,

    /// Reconnect attempts before surfacing a fatal error
    pub reconnect_attempts: Option<u32>,

    /// Fixed delay between reconnect attempts, in milliseconds
    pub reconnect_delay_ms: Option<u64>,
}

/// Synthesis backend configuration
#[derive(Debug, Default, Deserialize)]
pub struct TtsFileConfig {
    /// Provider name ("openai" or "elevenlabs")
    pub provider: Option<String>,

    /// Model identifier (e.g. "tts-1")
    pub model: Option<String>,

    /// Voice identifier (e.g. "alloy", or an ElevenLabs voice id)
    pub voice: Option<String>,

    /// Speed multiplier
    pub speed: Option<f64>,
}

/// API keys configuration
#[derive(Debug, Default, Deserialize)]
pub struct ApiKeysFileConfig {
    pub openai: Option<String>,
    pub deepgram: Option<String>,
    pub elevenlabs: Option<String>,
}

/// Load the TOML config file from the standard path
///
/// Returns `AttuneConfigFile::default()` if the file doesn't exist or can't
/// be parsed.
pub fn load_config_file() -> AttuneConfigFile {
    let Some(path) = config_file_path() else {
        return AttuneConfigFile::default();
    };

    if !path.exists() {
        return AttuneConfigFile::default();
    }

    match std::fs::read_to_string(&path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                AttuneConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            AttuneConfigFile::default()
        }
    }
}

/// Return the config file path: `~/.config/attune/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("attune").join("config.toml"))
}
