//! Shared test utilities

// Each test binary uses a different subset of these helpers
#![allow(dead_code)]

use attune::config::{
    ApiKeys, Config, LatencyConfig, PlaybackConfig, SttConfig, SttProvider, TtsConfig,
    TtsProvider, TurnConfig, WakeConfig,
};
use attune::SAMPLE_RATE;

/// Generate sine wave audio samples
#[must_use]
#[allow(clippy::cast_precision_loss, clippy::cast_sign_loss, clippy::cast_possible_truncation)]
pub fn sine_samples(frequency: f32, duration_secs: f32, amplitude: f32) -> Vec<f32> {
    let num_samples = (SAMPLE_RATE as f32 * duration_secs) as usize;
    (0..num_samples)
        .map(|i| {
            let t = i as f32 / SAMPLE_RATE as f32;
            amplitude * (2.0 * std::f32::consts::PI * frequency * t).sin()
        })
        .collect()
}

/// Generate silence
#[must_use]
#[allow(clippy::cast_precision_loss, clippy::cast_sign_loss, clippy::cast_possible_truncation)]
pub fn silence_samples(duration_secs: f32) -> Vec<f32> {
    let num_samples = (SAMPLE_RATE as f32 * duration_secs) as usize;
    vec![0.0; num_samples]
}

/// Default-valued configuration for tests, no env or file involved
#[must_use]
pub fn test_config() -> Config {
    Config {
        wake: WakeConfig {
            phrase: "hey attune".to_string(),
            debounce_ms: 1000,
            energy_threshold: 0.03,
        },
        turn: TurnConfig {
            frame_size: 320,
            speech_threshold: 0.01,
            silence_duration_ms: 600,
            max_speech_duration_ms: 2000,
            cooldown_ms: 500,
            error_backoff_ms: 1000,
        },
        playback: PlaybackConfig {
            jitter_threshold: 1920,
            ring_capacity: 32000,
        },
        latency: LatencyConfig {
            target_ms: 800,
            warning_ms: 1200,
            critical_ms: 1500,
        },
        stt: SttConfig {
            provider: SttProvider::Whisper,
            model: "whisper-1".to_string(),
            reconnect_attempts: 3,
            reconnect_delay_ms: 2000,
        },
        tts: TtsConfig {
            provider: TtsProvider::OpenAi,
            model: "tts-1".to_string(),
            voice: "alloy".to_string(),
            speed: 1.0,
        },
        api_keys: ApiKeys::default(),
        answers_path: None,
    }
}
