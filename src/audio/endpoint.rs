//! End-of-turn detection
//!
//! A small state machine over the frame stream that decides when the user
//! has finished speaking: sustained silence after confirmed speech, or a
//! hard max-duration timeout driven by a wall-clock timer outside this
//! module.

use crate::session::TurnEndReason;

use super::frame::AudioFrame;
use super::level::frame_energy;

/// State of the end-of-turn detector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointState {
    /// No speech heard yet this turn
    AwaitingSpeech,
    /// Speech confirmed, counting consecutive silent frames
    InSpeech,
    /// Turn over; terminal for the session
    Ended,
}

/// Decides when the user's turn is over
#[derive(Debug)]
pub struct EndOfTurnDetector {
    speech_threshold: f32,
    required_silence_frames: u32,
    state: EndpointState,
    consecutive_silence_frames: u32,
    speech_seen: bool,
    end_reason: Option<TurnEndReason>,
}

impl EndOfTurnDetector {
    /// Create a detector for one turn
    ///
    /// `required_silence_frames` is `silence_duration_ms / frame_duration_ms`
    /// (default 600ms / 20ms = 30 frames).
    #[must_use]
    pub const fn new(speech_threshold: f32, required_silence_frames: u32) -> Self {
        Self {
            speech_threshold,
            required_silence_frames,
            state: EndpointState::AwaitingSpeech,
            consecutive_silence_frames: 0,
            speech_seen: false,
            end_reason: None,
        }
    }

    /// Feed one frame; returns the end reason on the frame that ends the turn
    ///
    /// A single speech frame resets the silence counter to zero, even deep
    /// into a silence run. After `Ended` no further frames are processed.
    pub fn on_frame(&mut self, frame: &AudioFrame) -> Option<TurnEndReason> {
        if self.state == EndpointState::Ended {
            return None;
        }

        let energy = frame_energy(frame);
        let is_speech = energy > self.speech_threshold;

        match self.state {
            EndpointState::AwaitingSpeech => {
                if is_speech {
                    self.state = EndpointState::InSpeech;
                    self.speech_seen = true;
                    self.consecutive_silence_frames = 0;
                    tracing::trace!(seq = frame.seq, energy, "speech started");
                }
                None
            }
            EndpointState::InSpeech => {
                if is_speech {
                    self.consecutive_silence_frames = 0;
                    None
                } else {
                    self.consecutive_silence_frames += 1;
                    if self.consecutive_silence_frames >= self.required_silence_frames {
                        self.end(TurnEndReason::SilenceTimeout);
                        tracing::debug!(seq = frame.seq, "turn ended on sustained silence");
                        Some(TurnEndReason::SilenceTimeout)
                    } else {
                        None
                    }
                }
            }
            EndpointState::Ended => None,
        }
    }

    /// Force the turn to end (max-duration timer or cancellation)
    ///
    /// Returns false if the detector already reached `Ended`.
    pub fn force_end(&mut self, reason: TurnEndReason) -> bool {
        if self.state == EndpointState::Ended {
            return false;
        }
        self.end(reason);
        true
    }

    fn end(&mut self, reason: TurnEndReason) {
        self.state = EndpointState::Ended;
        self.end_reason = Some(reason);
    }

    /// Current state
    #[must_use]
    pub const fn state(&self) -> EndpointState {
        self.state
    }

    /// Whether any speech was confirmed this turn
    #[must_use]
    pub const fn speech_detected(&self) -> bool {
        self.speech_seen
    }

    /// Consecutive silent frames counted so far
    #[must_use]
    pub const fn consecutive_silence_frames(&self) -> u32 {
        self.consecutive_silence_frames
    }

    /// The reason the turn ended, if it has
    #[must_use]
    pub const fn end_reason(&self) -> Option<TurnEndReason> {
        self.end_reason
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn speech_frame(seq: u64) -> AudioFrame {
        AudioFrame {
            seq,
            samples: vec![16384; 320], // RMS 0.5
        }
    }

    fn silent_frame(seq: u64) -> AudioFrame {
        AudioFrame {
            seq,
            samples: vec![16; 320], // RMS ~0.0005
        }
    }

    #[test]
    fn ends_exactly_at_required_silence_boundary() {
        let mut detector = EndOfTurnDetector::new(0.01, 30);

        // Frames 1-10: speech
        for seq in 1..=10 {
            assert_eq!(detector.on_frame(&speech_frame(seq)), None);
        }
        assert_eq!(detector.state(), EndpointState::InSpeech);

        // Frames 11-39: silence, not yet ended
        for seq in 11..=39 {
            assert_eq!(detector.on_frame(&silent_frame(seq)), None, "frame {seq}");
        }

        // Frame 40: 30th consecutive silent frame ends the turn
        assert_eq!(
            detector.on_frame(&silent_frame(40)),
            Some(TurnEndReason::SilenceTimeout)
        );
        assert_eq!(detector.state(), EndpointState::Ended);
    }

    #[test]
    fn speech_resets_silence_counter() {
        let mut detector = EndOfTurnDetector::new(0.01, 30);
        detector.on_frame(&speech_frame(0));

        for seq in 1..=29 {
            detector.on_frame(&silent_frame(seq));
        }
        assert_eq!(detector.consecutive_silence_frames(), 29);

        // One speech frame deep into the silence run resets the count
        detector.on_frame(&speech_frame(30));
        assert_eq!(detector.consecutive_silence_frames(), 0);
        assert_eq!(detector.state(), EndpointState::InSpeech);
    }

    #[test]
    fn silence_before_speech_does_not_count() {
        let mut detector = EndOfTurnDetector::new(0.01, 5);

        for seq in 0..100 {
            assert_eq!(detector.on_frame(&silent_frame(seq)), None);
        }
        assert_eq!(detector.state(), EndpointState::AwaitingSpeech);
    }

    #[test]
    fn force_end_is_terminal() {
        let mut detector = EndOfTurnDetector::new(0.01, 30);

        assert!(detector.force_end(TurnEndReason::MaxDurationTimeout));
        assert_eq!(detector.state(), EndpointState::Ended);
        assert_eq!(detector.end_reason(), Some(TurnEndReason::MaxDurationTimeout));

        // Second force is a no-op, frames are ignored
        assert!(!detector.force_end(TurnEndReason::Cancelled));
        assert_eq!(detector.on_frame(&speech_frame(0)), None);
        assert_eq!(detector.end_reason(), Some(TurnEndReason::MaxDurationTimeout));
    }
}
