//! Turn sessions and round-trip latency bookkeeping
//!
//! A [`TurnSession`] exists for exactly one wake-to-response cycle; the
//! orchestrator enforces that no two are concurrently active.

use std::time::Instant;

use uuid::Uuid;

use crate::config::LatencyConfig;

/// Why a turn ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnEndReason {
    /// Sustained silence after confirmed speech
    SilenceTimeout,
    /// Hard cap on turn duration reached
    MaxDurationTimeout,
    /// Stopped or torn down externally
    Cancelled,
}

impl std::fmt::Display for TurnEndReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SilenceTimeout => write!(f, "silence_timeout"),
            Self::MaxDurationTimeout => write!(f, "max_duration_timeout"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// One wake-to-response cycle
///
/// Created when the wake word fires; mutated only by the orchestrator;
/// discarded when the orchestrator returns to listening.
#[derive(Debug)]
pub struct TurnSession {
    /// Session id, used for staleness checks on late callbacks
    pub id: Uuid,
    /// When the wake word fired
    pub started_at: Instant,
    /// Whether any speech was confirmed this turn
    pub speech_detected: bool,
    /// Why the capture phase ended, once it has
    pub turn_ended_reason: Option<TurnEndReason>,
    /// When the user stopped speaking
    pub speech_end_at: Option<Instant>,
    /// When the response became audible
    pub response_start_at: Option<Instant>,
}

impl TurnSession {
    /// Create a session starting now
    #[must_use]
    pub fn new(now: Instant) -> Self {
        Self {
            id: Uuid::new_v4(),
            started_at: now,
            speech_detected: false,
            turn_ended_reason: None,
            speech_end_at: None,
            response_start_at: None,
        }
    }

    /// Derive the latency sample once both endpoints are recorded
    #[must_use]
    pub fn latency_sample(&self, thresholds: &LatencyConfig) -> Option<LatencySample> {
        let speech_end = self.speech_end_at?;
        let response_start = self.response_start_at?;
        let elapsed_ms = u64::try_from(
            response_start
                .saturating_duration_since(speech_end)
                .as_millis(),
        )
        .unwrap_or(u64::MAX);

        Some(LatencySample {
            turn_id: self.id,
            elapsed_ms,
            class: LatencyClass::classify(elapsed_ms, thresholds),
            met_target: elapsed_ms <= thresholds.target_ms,
        })
    }
}

/// Latency band for one turn's speech-end to response-start gap
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LatencyClass {
    /// At or under the target threshold
    Target,
    /// Over the warning threshold but under critical
    Warning,
    /// Over the critical threshold
    Critical,
}

impl LatencyClass {
    /// Classify an elapsed time against the configured bands
    #[must_use]
    pub const fn classify(elapsed_ms: u64, thresholds: &LatencyConfig) -> Self {
        if elapsed_ms > thresholds.critical_ms {
            Self::Critical
        } else if elapsed_ms > thresholds.warning_ms {
            Self::Warning
        } else {
            Self::Target
        }
    }
}

impl std::fmt::Display for LatencyClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Target => write!(f, "target"),
            Self::Warning => write!(f, "warning"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

/// Read-only latency measurement for one turn
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LatencySample {
    /// Which turn this measures
    pub turn_id: Uuid,
    /// Speech end to response start, in milliseconds
    pub elapsed_ms: u64,
    /// Band classification
    pub class: LatencyClass,
    /// Whether the target threshold was met
    pub met_target: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    const THRESHOLDS: LatencyConfig = LatencyConfig {
        target_ms: 800,
        warning_ms: 1200,
        critical_ms: 1500,
    };

    #[test]
    fn classification_bands() {
        assert_eq!(LatencyClass::classify(799, &THRESHOLDS), LatencyClass::Target);
        assert_eq!(LatencyClass::classify(1201, &THRESHOLDS), LatencyClass::Warning);
        assert_eq!(LatencyClass::classify(1501, &THRESHOLDS), LatencyClass::Critical);
    }

    #[test]
    fn target_flag_tracks_target_threshold() {
        let now = Instant::now();
        let mut session = TurnSession::new(now);
        session.speech_end_at = Some(now);
        session.response_start_at = Some(now + Duration::from_millis(799));

        let sample = session.latency_sample(&THRESHOLDS).unwrap();
        assert_eq!(sample.class, LatencyClass::Target);
        assert!(sample.met_target);
        assert_eq!(sample.elapsed_ms, 799);
    }

    #[test]
    fn sample_requires_both_timestamps() {
        let session = TurnSession::new(Instant::now());
        assert!(session.latency_sample(&THRESHOLDS).is_none());
    }
}
