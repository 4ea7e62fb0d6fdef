//! Turn orchestrator
//!
//! The top-level state machine sequencing wake detection, capture,
//! end-of-turn detection, transcription, answer lookup, synthesis, and
//! playback, with round-trip latency bookkeeping.
//!
//! The engine is pure with respect to I/O: it consumes [`EngineEvent`]s from
//! a single serialized queue and emits [`EngineAction`]s for the daemon to
//! execute, so every transition is testable without devices or network.
//! Events from cancelled turns carry a stale session id and are dropped.

use std::time::Instant;

use uuid::Uuid;

use crate::answers::AnswerBook;
use crate::audio::{AudioFrame, EndOfTurnDetector};
use crate::config::Config;
use crate::events::{Observer, ObserverEvent};
use crate::session::{TurnEndReason, TurnSession};
use crate::wake::WakeWordGate;

/// Orchestrator states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// Not running; no capture, no session
    Idle,
    /// Wake gate armed (or waiting out a cooldown/backoff before re-arming)
    Listening,
    /// Capturing a turn and waiting for its transcript
    ProcessingSpeech,
    /// Pushing synthesized audio through the playback ring
    Speaking,
}

impl std::fmt::Display for EngineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Listening => write!(f, "listening"),
            Self::ProcessingSpeech => write!(f, "processing_speech"),
            Self::Speaking => write!(f, "speaking"),
        }
    }
}

/// Inputs to the engine, funneled through one dispatch point
#[derive(Debug)]
pub enum EngineEvent {
    /// Begin listening for the wake phrase
    Start,
    /// Stop everything and return to idle
    Stop,
    /// One captured frame
    Frame(AudioFrame),
    /// Transcript arrived for a turn
    TranscriptReady { session: Uuid, transcript: String },
    /// Transcription failed after its bounded retries
    TranscriptFailed { session: Uuid, message: String },
    /// One decoded synthesis chunk for a turn
    SynthesisChunk { session: Uuid, samples: Vec<f32> },
    /// All synthesis chunks delivered for a turn
    SynthesisComplete { session: Uuid },
    /// Synthesis failed
    SynthesisFailed { session: Uuid, message: String },
    /// Playback ring crossed its jitter threshold
    PlaybackStarted,
    /// Playback ring drained to empty
    PlaybackEnded,
    /// The max-turn-duration timer fired
    MaxTurnElapsed { session: Uuid },
    /// The post-playback cooldown timer fired
    CooldownElapsed { token: Uuid },
    /// The post-error backoff timer fired
    BackoffElapsed { token: Uuid },
}

/// Side effects for the daemon to execute
#[derive(Debug, Clone, PartialEq)]
pub enum EngineAction {
    /// Open the transcription stream for the new turn
    OpenTranscription,
    /// Forward one frame to the transcription stream
    ForwardFrame(AudioFrame),
    /// Finalize the transcription stream and request the transcript
    FinalizeTranscription { session: Uuid },
    /// Synthesize and stream the answer text
    Speak { session: Uuid, text: String },
    /// Write decoded samples into the playback ring
    WriteAudio(Vec<f32>),
    /// Start draining the playback ring even below the jitter threshold
    FlushPlayback,
    /// Arm the wall-clock max-turn timer for a session
    StartMaxTurnTimer { session: Uuid, delay_ms: u64 },
    /// Arm the post-playback cooldown timer
    StartCooldown { token: Uuid, delay_ms: u64 },
    /// Arm the post-error backoff timer
    StartBackoff { token: Uuid, delay_ms: u64 },
    /// Abort any in-flight transcription/synthesis tasks
    CancelStreams,
    /// Clear the playback ring
    ResetPlayback,
}

/// The turn-taking state machine
pub struct TurnEngine {
    config: Config,
    answers: AnswerBook,
    observer: Observer,
    state: EngineState,
    gate: WakeWordGate,
    session: Option<TurnSession>,
    detector: Option<EndOfTurnDetector>,
    /// Samples written to the playback ring this turn
    samples_written: usize,
    /// Token for the cooldown/backoff wait currently re-arming the gate
    pending_wait: Option<Uuid>,
}

impl TurnEngine {
    /// Create an engine in the idle state
    #[must_use]
    pub fn new(config: Config, answers: AnswerBook, observer: Observer) -> Self {
        let gate = WakeWordGate::new(&config.wake);
        Self {
            config,
            answers,
            observer,
            state: EngineState::Idle,
            gate,
            session: None,
            detector: None,
            samples_written: 0,
            pending_wait: None,
        }
    }

    /// Current state
    #[must_use]
    pub const fn state(&self) -> EngineState {
        self.state
    }

    /// Id of the active session, if any
    #[must_use]
    pub fn session_id(&self) -> Option<Uuid> {
        self.session.as_ref().map(|s| s.id)
    }

    /// Process one event, returning the actions it demands
    ///
    /// `now` is passed in so transitions are deterministic under test.
    pub fn handle_event(&mut self, event: EngineEvent, now: Instant) -> Vec<EngineAction> {
        match event {
            EngineEvent::Start => self.on_start(),
            EngineEvent::Stop => self.on_stop(),
            EngineEvent::Frame(frame) => self.on_frame(frame, now),
            EngineEvent::TranscriptReady {
                session,
                transcript,
            } => self.on_transcript(session, &transcript, now),
            EngineEvent::TranscriptFailed { session, message } => {
                self.on_stage_error(session, "transcription", message)
            }
            EngineEvent::SynthesisChunk { session, samples } => {
                self.on_synthesis_chunk(session, samples)
            }
            EngineEvent::SynthesisComplete { session } => self.on_synthesis_complete(session),
            EngineEvent::SynthesisFailed { session, message } => {
                self.on_stage_error(session, "synthesis", message)
            }
            EngineEvent::PlaybackStarted => self.on_playback_started(now),
            EngineEvent::PlaybackEnded => self.on_playback_ended(),
            EngineEvent::MaxTurnElapsed { session } => self.on_max_turn_elapsed(session, now),
            EngineEvent::CooldownElapsed { token } | EngineEvent::BackoffElapsed { token } => {
                self.on_wait_elapsed(token)
            }
        }
    }

    fn on_start(&mut self) -> Vec<EngineAction> {
        if self.state != EngineState::Idle {
            return Vec::new();
        }
        self.set_state(EngineState::Listening);
        self.gate.start();
        Vec::new()
    }

    fn on_stop(&mut self) -> Vec<EngineAction> {
        if self.state == EngineState::Idle {
            return Vec::new();
        }
        self.teardown_session(TurnEndReason::Cancelled);
        self.gate.stop();
        self.pending_wait = None;
        self.set_state(EngineState::Idle);
        vec![EngineAction::CancelStreams, EngineAction::ResetPlayback]
    }

    fn on_frame(&mut self, frame: AudioFrame, now: Instant) -> Vec<EngineAction> {
        match self.state {
            EngineState::Listening => {
                if self.gate.on_frame(&frame, now) {
                    self.begin_turn(now)
                } else {
                    Vec::new()
                }
            }
            EngineState::ProcessingSpeech => self.on_capture_frame(frame, now),
            // Frames during playback or while idle are discarded
            EngineState::Idle | EngineState::Speaking => Vec::new(),
        }
    }

    fn begin_turn(&mut self, now: Instant) -> Vec<EngineAction> {
        let session = TurnSession::new(now);
        let session_id = session.id;
        tracing::info!(turn_id = %session_id, "turn started");

        self.gate.stop();
        self.detector = Some(EndOfTurnDetector::new(
            self.config.turn.speech_threshold,
            self.config.turn.required_silence_frames(),
        ));
        self.samples_written = 0;
        self.session = Some(session);
        self.set_state(EngineState::ProcessingSpeech);

        vec![
            EngineAction::OpenTranscription,
            EngineAction::StartMaxTurnTimer {
                session: session_id,
                delay_ms: self.config.turn.max_speech_duration_ms,
            },
        ]
    }

    fn on_capture_frame(&mut self, frame: AudioFrame, now: Instant) -> Vec<EngineAction> {
        let Some(detector) = self.detector.as_mut() else {
            return Vec::new();
        };

        // A finished detector means frames arriving while the transcript is
        // pending; they are no longer forwarded
        let ended = detector.on_frame(&frame);
        if detector.speech_detected() {
            if let Some(session) = self.session.as_mut() {
                session.speech_detected = true;
            }
        }

        match ended {
            Some(reason) => self.end_capture(reason, now),
            None => {
                if detector.state() == crate::audio::EndpointState::Ended {
                    Vec::new()
                } else {
                    vec![EngineAction::ForwardFrame(frame)]
                }
            }
        }
    }

    fn on_max_turn_elapsed(&mut self, session: Uuid, now: Instant) -> Vec<EngineAction> {
        if self.session_id() != Some(session) || self.state != EngineState::ProcessingSpeech {
            return Vec::new();
        }
        let Some(detector) = self.detector.as_mut() else {
            return Vec::new();
        };
        if detector.force_end(TurnEndReason::MaxDurationTimeout) {
            self.end_capture(TurnEndReason::MaxDurationTimeout, now)
        } else {
            Vec::new()
        }
    }

    fn end_capture(&mut self, reason: TurnEndReason, now: Instant) -> Vec<EngineAction> {
        let Some(session) = self.session.as_mut() else {
            return Vec::new();
        };
        session.turn_ended_reason = Some(reason);
        session.speech_end_at = Some(now);

        tracing::info!(turn_id = %session.id, %reason, "turn capture ended");
        self.observer.publish(ObserverEvent::TurnEnded {
            turn_id: session.id,
            reason,
        });

        vec![EngineAction::FinalizeTranscription {
            session: session.id,
        }]
    }

    fn on_transcript(
        &mut self,
        session: Uuid,
        transcript: &str,
        _now: Instant,
    ) -> Vec<EngineAction> {
        if self.session_id() != Some(session) || self.state != EngineState::ProcessingSpeech {
            tracing::debug!(turn_id = %session, "stale transcript dropped");
            return Vec::new();
        }

        if transcript.trim().is_empty() {
            // Not an error: abort the turn and go straight back to listening
            tracing::info!(turn_id = %session, "empty transcript, aborting turn");
            self.session = None;
            self.detector = None;
            self.set_state(EngineState::Listening);
            self.gate.start();
            return Vec::new();
        }

        let answer = self.answers.get_answer(transcript).to_string();
        tracing::info!(turn_id = %session, transcript, answer = %answer, "answer selected");

        self.set_state(EngineState::Speaking);
        vec![EngineAction::Speak {
            session,
            text: answer,
        }]
    }

    fn on_synthesis_chunk(&mut self, session: Uuid, samples: Vec<f32>) -> Vec<EngineAction> {
        if self.session_id() != Some(session) || self.state != EngineState::Speaking {
            return Vec::new();
        }
        self.samples_written += samples.len();
        vec![EngineAction::WriteAudio(samples)]
    }

    fn on_synthesis_complete(&mut self, session: Uuid) -> Vec<EngineAction> {
        if self.session_id() != Some(session) || self.state != EngineState::Speaking {
            return Vec::new();
        }
        if self.samples_written == 0 {
            // Nothing ever reached the ring, so no playback-ended event will
            // come; finish the turn here
            tracing::warn!(turn_id = %session, "synthesis produced no audio");
            return self.on_playback_ended();
        }
        if self.samples_written < self.config.playback.jitter_threshold {
            // Too little audio to prime the ring on its own; force it to
            // drain so the playback lifecycle events still fire
            tracing::debug!(
                turn_id = %session,
                samples = self.samples_written,
                "synthesis ended below the jitter threshold, flushing playback"
            );
            return vec![EngineAction::FlushPlayback];
        }
        Vec::new()
    }

    fn on_playback_started(&mut self, now: Instant) -> Vec<EngineAction> {
        if self.state != EngineState::Speaking {
            return Vec::new();
        }
        let Some(session) = self.session.as_mut() else {
            return Vec::new();
        };
        session.response_start_at = Some(now);

        if let Some(sample) = session.latency_sample(&self.config.latency) {
            tracing::info!(
                turn_id = %sample.turn_id,
                elapsed_ms = sample.elapsed_ms,
                class = %sample.class,
                met_target = sample.met_target,
                "round-trip latency"
            );
            self.observer.publish(ObserverEvent::Latency(sample));
        }
        Vec::new()
    }

    fn on_playback_ended(&mut self) -> Vec<EngineAction> {
        if self.state != EngineState::Speaking {
            return Vec::new();
        }

        // Reset-then-wait: tear the session down immediately, hold the gate
        // disarmed for the cooldown, re-arm when the timer fires
        self.session = None;
        self.detector = None;
        self.set_state(EngineState::Listening);

        let token = Uuid::new_v4();
        self.pending_wait = Some(token);
        vec![EngineAction::StartCooldown {
            token,
            delay_ms: self.config.turn.cooldown_ms,
        }]
    }

    fn on_stage_error(
        &mut self,
        session: Uuid,
        stage: &'static str,
        message: String,
    ) -> Vec<EngineAction> {
        if self.session_id() != Some(session) {
            tracing::debug!(turn_id = %session, stage, "stale stage error dropped");
            return Vec::new();
        }

        tracing::error!(turn_id = %session, stage, %message, "stage failed, aborting turn");
        self.observer.publish(ObserverEvent::StageError {
            turn_id: Some(session),
            stage,
            message,
        });

        self.teardown_session(TurnEndReason::Cancelled);
        self.set_state(EngineState::Listening);

        let token = Uuid::new_v4();
        self.pending_wait = Some(token);
        vec![
            EngineAction::CancelStreams,
            EngineAction::ResetPlayback,
            EngineAction::StartBackoff {
                token,
                delay_ms: self.config.turn.error_backoff_ms,
            },
        ]
    }

    fn on_wait_elapsed(&mut self, token: Uuid) -> Vec<EngineAction> {
        if self.pending_wait != Some(token) {
            return Vec::new();
        }
        self.pending_wait = None;
        if self.state == EngineState::Listening {
            self.gate.start();
            tracing::debug!("wake gate re-armed");
        }
        Vec::new()
    }

    fn teardown_session(&mut self, reason: TurnEndReason) {
        if let Some(session) = self.session.take() {
            if session.turn_ended_reason.is_none() {
                self.observer.publish(ObserverEvent::TurnEnded {
                    turn_id: session.id,
                    reason,
                });
            }
        }
        self.detector = None;
        self.samples_written = 0;
    }

    fn set_state(&mut self, to: EngineState) {
        if self.state == to {
            return;
        }
        let from = self.state;
        self.state = to;
        tracing::debug!(%from, %to, "state transition");
        self.observer.publish(ObserverEvent::StateChanged { from, to });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::audio::sample_to_pcm;
    use crate::config::{
        ApiKeys, LatencyConfig, PlaybackConfig, SttConfig, SttProvider, TtsConfig, TtsProvider,
        TurnConfig, WakeConfig,
    };

    fn test_config() -> Config {
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

    fn test_book() -> AnswerBook {
        AnswerBook::embedded().unwrap()
    }

    fn engine() -> TurnEngine {
        TurnEngine::new(test_config(), test_book(), Observer::new())
    }

    fn frame(seq: u64, amplitude: f32) -> AudioFrame {
        AudioFrame {
            seq,
            samples: vec![sample_to_pcm(amplitude); 320],
        }
    }

    /// Drive the engine from Listening into an active turn via the wake gate
    fn wake(engine: &mut TurnEngine, now: Instant) -> Uuid {
        for seq in 0..15 {
            let actions = engine.handle_event(EngineEvent::Frame(frame(seq, 0.5)), now);
            if !actions.is_empty() {
                assert!(actions.contains(&EngineAction::OpenTranscription));
                assert_eq!(engine.state(), EngineState::ProcessingSpeech);
                return engine.session_id().unwrap();
            }
        }
        panic!("wake gate never fired");
    }

    #[test]
    fn start_arms_listening() {
        let mut engine = engine();
        assert_eq!(engine.state(), EngineState::Idle);

        engine.handle_event(EngineEvent::Start, Instant::now());
        assert_eq!(engine.state(), EngineState::Listening);
    }

    #[test]
    fn silence_ends_turn_after_required_frames() {
        let mut engine = engine();
        let now = Instant::now();
        engine.handle_event(EngineEvent::Start, now);
        let session = wake(&mut engine, now);

        // 10 speech frames forward to transcription
        let mut seq = 100;
        for _ in 0..10 {
            let actions = engine.handle_event(EngineEvent::Frame(frame(seq, 0.5)), now);
            assert_eq!(actions.len(), 1);
            assert!(matches!(actions[0], EngineAction::ForwardFrame(_)));
            seq += 1;
        }

        // 29 silent frames keep capturing
        for _ in 0..29 {
            let actions = engine.handle_event(EngineEvent::Frame(frame(seq, 0.001)), now);
            assert!(matches!(actions[0], EngineAction::ForwardFrame(_)));
            seq += 1;
        }

        // The 30th consecutive silent frame finalizes
        let actions = engine.handle_event(EngineEvent::Frame(frame(seq, 0.001)), now);
        assert_eq!(
            actions,
            vec![EngineAction::FinalizeTranscription { session }]
        );
        assert_eq!(engine.state(), EngineState::ProcessingSpeech);
    }

    #[test]
    fn empty_transcript_returns_directly_to_listening() {
        let mut engine = engine();
        let now = Instant::now();
        engine.handle_event(EngineEvent::Start, now);
        let session = wake(&mut engine, now);

        let actions = engine.handle_event(
            EngineEvent::TranscriptReady {
                session,
                transcript: "   \n".to_string(),
            },
            now,
        );

        // No synthesis, no cooldown, gate re-armed immediately
        assert!(actions.is_empty());
        assert_eq!(engine.state(), EngineState::Listening);
        assert!(engine.session_id().is_none());
    }

    #[test]
    fn transcript_triggers_answer_synthesis() {
        let mut engine = engine();
        let now = Instant::now();
        engine.handle_event(EngineEvent::Start, now);
        let session = wake(&mut engine, now);

        let actions = engine.handle_event(
            EngineEvent::TranscriptReady {
                session,
                transcript: "what is this".to_string(),
            },
            now,
        );

        assert_eq!(engine.state(), EngineState::Speaking);
        match &actions[..] {
            [EngineAction::Speak { session: s, text }] => {
                assert_eq!(*s, session);
                assert!(!text.is_empty());
            }
            other => panic!("unexpected actions: {other:?}"),
        }
    }

    #[test]
    fn stale_transcript_is_dropped() {
        let mut engine = engine();
        let now = Instant::now();
        engine.handle_event(EngineEvent::Start, now);
        wake(&mut engine, now);

        let actions = engine.handle_event(
            EngineEvent::TranscriptReady {
                session: Uuid::new_v4(),
                transcript: "what is this".to_string(),
            },
            now,
        );
        assert!(actions.is_empty());
        assert_eq!(engine.state(), EngineState::ProcessingSpeech);
    }

    #[test]
    fn playback_cycle_records_latency_and_cools_down() {
        let observer = Observer::new();
        let mut rx = observer.subscribe();
        let mut engine = TurnEngine::new(test_config(), test_book(), observer);

        let t0 = Instant::now();
        engine.handle_event(EngineEvent::Start, t0);
        let session = wake(&mut engine, t0);

        // End capture via silence at t0 + 800ms
        let speech_end = t0 + Duration::from_millis(800);
        let mut seq = 100;
        for _ in 0..10 {
            engine.handle_event(EngineEvent::Frame(frame(seq, 0.5)), speech_end);
            seq += 1;
        }
        for _ in 0..30 {
            engine.handle_event(EngineEvent::Frame(frame(seq, 0.001)), speech_end);
            seq += 1;
        }

        engine.handle_event(
            EngineEvent::TranscriptReady {
                session,
                transcript: "what is this".to_string(),
            },
            speech_end,
        );
        assert_eq!(engine.state(), EngineState::Speaking);

        let actions = engine.handle_event(
            EngineEvent::SynthesisChunk {
                session,
                samples: vec![0.2; 1600],
            },
            speech_end,
        );
        assert!(matches!(actions[0], EngineAction::WriteAudio(_)));

        // Ring primes 300ms after speech end
        let response_start = speech_end + Duration::from_millis(300);
        engine.handle_event(EngineEvent::PlaybackStarted, response_start);

        // Playback drains; reset-then-wait cooldown
        let actions = engine.handle_event(EngineEvent::PlaybackEnded, response_start);
        assert_eq!(engine.state(), EngineState::Listening);
        let token = match &actions[..] {
            [EngineAction::StartCooldown { token, delay_ms }] => {
                assert_eq!(*delay_ms, 500);
                *token
            }
            other => panic!("unexpected actions: {other:?}"),
        };

        // Gate stays disarmed until the cooldown elapses
        let actions = engine.handle_event(
            EngineEvent::Frame(frame(seq, 0.5)),
            response_start,
        );
        assert!(actions.is_empty());
        engine.handle_event(EngineEvent::CooldownElapsed { token }, response_start);

        // Latency event was published with the 300ms measurement
        let mut latency_seen = false;
        while let Ok(event) = rx.try_recv() {
            if let ObserverEvent::Latency(sample) = event {
                assert_eq!(sample.turn_id, session);
                assert_eq!(sample.elapsed_ms, 300);
                assert!(sample.met_target);
                latency_seen = true;
            }
        }
        assert!(latency_seen);
    }

    #[test]
    fn max_turn_timer_forces_end_without_speech() {
        let mut engine = engine();
        let now = Instant::now();
        engine.handle_event(EngineEvent::Start, now);
        let session = wake(&mut engine, now);

        // No frames at all; the wall-clock timer still ends the turn
        let actions = engine.handle_event(
            EngineEvent::MaxTurnElapsed { session },
            now + Duration::from_millis(2000),
        );
        assert_eq!(
            actions,
            vec![EngineAction::FinalizeTranscription { session }]
        );
    }

    #[test]
    fn synthesis_failure_backs_off_then_rearms() {
        let mut engine = engine();
        let now = Instant::now();
        engine.handle_event(EngineEvent::Start, now);
        let session = wake(&mut engine, now);

        engine.handle_event(
            EngineEvent::TranscriptReady {
                session,
                transcript: "hello".to_string(),
            },
            now,
        );

        let actions = engine.handle_event(
            EngineEvent::SynthesisFailed {
                session,
                message: "boom".to_string(),
            },
            now,
        );

        assert_eq!(engine.state(), EngineState::Listening);
        assert!(actions.contains(&EngineAction::CancelStreams));
        assert!(actions.contains(&EngineAction::ResetPlayback));
        let token = actions
            .iter()
            .find_map(|a| match a {
                EngineAction::StartBackoff { token, delay_ms } => {
                    assert_eq!(*delay_ms, 1000);
                    Some(*token)
                }
                _ => None,
            })
            .expect("backoff not started");

        // Disarmed during backoff, armed after
        assert!(engine
            .handle_event(EngineEvent::Frame(frame(0, 0.5)), now)
            .is_empty());
        engine.handle_event(EngineEvent::BackoffElapsed { token }, now);

        // Past the gate's debounce window from the original detection
        let later = now + Duration::from_millis(1100);
        let mut fired = false;
        for seq in 1..=15 {
            fired |= !engine
                .handle_event(EngineEvent::Frame(frame(seq, 0.5)), later)
                .is_empty();
        }
        assert!(fired);
    }

    #[test]
    fn stop_from_any_state_lands_idle() {
        let now = Instant::now();

        // From listening
        let mut e = engine();
        e.handle_event(EngineEvent::Start, now);
        let actions = e.handle_event(EngineEvent::Stop, now);
        assert_eq!(e.state(), EngineState::Idle);
        assert!(actions.contains(&EngineAction::CancelStreams));
        assert!(actions.contains(&EngineAction::ResetPlayback));

        // From an active turn
        let mut e = engine();
        e.handle_event(EngineEvent::Start, now);
        let session = wake(&mut e, now);
        let actions = e.handle_event(EngineEvent::Stop, now);
        assert_eq!(e.state(), EngineState::Idle);
        assert!(actions.contains(&EngineAction::CancelStreams));
        assert!(e.session_id().is_none());

        // A late transcript for the cancelled session is dropped
        let actions = e.handle_event(
            EngineEvent::TranscriptReady {
                session,
                transcript: "too late".to_string(),
            },
            now,
        );
        assert!(actions.is_empty());
        assert_eq!(e.state(), EngineState::Idle);
    }

    #[test]
    fn short_synthesis_flushes_playback_and_completes_the_turn() {
        let mut engine = engine();
        let now = Instant::now();
        engine.handle_event(EngineEvent::Start, now);
        let session = wake(&mut engine, now);

        engine.handle_event(
            EngineEvent::TranscriptReady {
                session,
                transcript: "hello".to_string(),
            },
            now,
        );

        // One 800-sample chunk: under the 1920-sample jitter threshold, so
        // the ring will never prime on its own
        let actions = engine.handle_event(
            EngineEvent::SynthesisChunk {
                session,
                samples: vec![0.2; 800],
            },
            now,
        );
        assert!(matches!(actions[0], EngineAction::WriteAudio(_)));

        let actions = engine.handle_event(EngineEvent::SynthesisComplete { session }, now);
        assert_eq!(actions, vec![EngineAction::FlushPlayback]);
        assert_eq!(engine.state(), EngineState::Speaking);

        // The forced drain then runs the normal playback lifecycle
        engine.handle_event(EngineEvent::PlaybackStarted, now);
        let actions = engine.handle_event(EngineEvent::PlaybackEnded, now);
        assert_eq!(engine.state(), EngineState::Listening);
        assert!(matches!(actions[..], [EngineAction::StartCooldown { .. }]));
    }

    #[test]
    fn synthesis_with_no_audio_still_finishes_the_turn() {
        let mut engine = engine();
        let now = Instant::now();
        engine.handle_event(EngineEvent::Start, now);
        let session = wake(&mut engine, now);

        engine.handle_event(
            EngineEvent::TranscriptReady {
                session,
                transcript: "hello".to_string(),
            },
            now,
        );
        assert_eq!(engine.state(), EngineState::Speaking);

        // Complete with zero chunks: no ring events will ever fire
        let actions = engine.handle_event(EngineEvent::SynthesisComplete { session }, now);
        assert_eq!(engine.state(), EngineState::Listening);
        assert!(matches!(
            actions[..],
            [EngineAction::StartCooldown { .. }]
        ));
    }
}
