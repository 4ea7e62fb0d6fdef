//! Attune - a latency-sensitive, turn-based voice interaction loop
//!
//! Detects a wake phrase, streams captured audio to a transcription backend,
//! ends the user's turn on sustained silence, looks up a reply, and streams
//! synthesized speech back through a jitter-buffered playback ring.
//!
//! # Architecture
//!
//! ```text
//! mic frames ─> chunker ─┬─> level detector ─> end-of-turn detector
//!                        └─> transcription client ─> transcript
//! transcript ─> answer lookup ─> synthesis client ─> playback ring ─> speakers
//! ```
//!
//! The [`daemon::Daemon`] owns the only cross-cutting view: a single-consumer
//! event loop that drives the [`orchestrator::TurnEngine`] state machine.

pub mod answers;
pub mod audio;
pub mod config;
pub mod daemon;
pub mod error;
pub mod events;
pub mod orchestrator;
pub mod session;
pub mod stream;
pub mod wake;

pub use answers::AnswerBook;
pub use audio::{
    AudioCapture, AudioFrame, AudioOutput, FrameChunker, PlaybackEvent, PlaybackRing, FRAME_SIZE,
    SAMPLE_RATE, EndOfTurnDetector, EndpointState, frame_energy, pcm_to_sample, sample_to_pcm,
};
pub use config::Config;
pub use daemon::Daemon;
pub use error::{Error, Result};
pub use events::{Observer, ObserverEvent};
pub use orchestrator::{EngineAction, EngineEvent, EngineState, TurnEngine};
pub use session::{LatencyClass, LatencySample, TurnEndReason, TurnSession};
pub use wake::WakeWordGate;
