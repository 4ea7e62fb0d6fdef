//! Wake phrase gate
//!
//! Energy-based keyword spotting over the capture frame stream. While armed,
//! a sustained run of speech-energy frames fires the wake event; repeat
//! firings inside the debounce window are suppressed.

use std::time::Instant;

use crate::audio::{frame_energy, AudioFrame};
use crate::config::WakeConfig;

/// Consecutive speech frames required to fire (15 frames = 300ms at 20ms)
const MIN_SPEECH_FRAMES: u32 = 15;

/// Gates the pipeline on the wake phrase
///
/// Owned and driven by the orchestrator; frames are only routed here while
/// the system is in the listening state.
#[derive(Debug)]
pub struct WakeWordGate {
    phrase: String,
    energy_threshold: f32,
    debounce_ms: u64,
    armed: bool,
    consecutive_speech_frames: u32,
    last_fired_at: Option<Instant>,
}

impl WakeWordGate {
    /// Create a gate from wake configuration, initially disarmed
    #[must_use]
    pub fn new(config: &WakeConfig) -> Self {
        tracing::debug!(
            phrase = %config.phrase,
            energy_threshold = config.energy_threshold,
            debounce_ms = config.debounce_ms,
            "wake gate initialized"
        );

        Self {
            phrase: config.phrase.clone(),
            energy_threshold: config.energy_threshold,
            debounce_ms: config.debounce_ms,
            armed: false,
            consecutive_speech_frames: 0,
            last_fired_at: None,
        }
    }

    /// Arm the gate; frames start counting toward a detection
    pub fn start(&mut self) {
        self.armed = true;
        self.consecutive_speech_frames = 0;
        tracing::trace!("wake gate armed");
    }

    /// Disarm the gate and discard any partial detection run
    pub fn stop(&mut self) {
        self.armed = false;
        self.consecutive_speech_frames = 0;
        tracing::trace!("wake gate disarmed");
    }

    /// Whether the gate is currently armed
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.armed
    }

    /// The configured wake phrase
    #[must_use]
    pub fn phrase(&self) -> &str {
        &self.phrase
    }

    /// Feed one captured frame; returns true when the wake phrase fires
    ///
    /// A detection requires a consecutive run of frames above the energy
    /// threshold; a single quiet frame resets the run. Firings within the
    /// debounce window of the previous one are swallowed.
    pub fn on_frame(&mut self, frame: &AudioFrame, now: Instant) -> bool {
        if !self.armed {
            return false;
        }

        let energy = frame_energy(frame);
        if energy > self.energy_threshold {
            self.consecutive_speech_frames += 1;
        } else {
            self.consecutive_speech_frames = 0;
            return false;
        }

        if self.consecutive_speech_frames < MIN_SPEECH_FRAMES {
            return false;
        }

        if let Some(last) = self.last_fired_at {
            let since_ms = now.saturating_duration_since(last).as_millis();
            if since_ms < u128::from(self.debounce_ms) {
                tracing::trace!(since_ms, "wake detection debounced");
                self.consecutive_speech_frames = 0;
                return false;
            }
        }

        self.last_fired_at = Some(now);
        self.consecutive_speech_frames = 0;
        tracing::info!(phrase = %self.phrase, energy, "wake phrase detected");
        true
    }
}
