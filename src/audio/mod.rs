//! Real-time audio pipeline
//!
//! Capture chunking, energy-based speech detection, end-of-turn
//! endpointing, and the jitter-buffered playback ring. Everything here is
//! hardware-free except [`capture`] and [`output`], which own the cpal
//! devices.

mod capture;
mod endpoint;
mod frame;
mod level;
mod output;
mod ring;

pub use capture::AudioCapture;
pub use endpoint::{EndOfTurnDetector, EndpointState};
pub use frame::{AudioFrame, FrameChunker, pcm_to_sample, sample_to_pcm};
pub use level::frame_energy;
pub use output::AudioOutput;
pub use ring::{PlaybackEvent, PlaybackRing};

/// Sample rate for the whole pipeline (16kHz mono for speech)
pub const SAMPLE_RATE: u32 = 16000;

/// Samples per frame (20ms at 16kHz)
pub const FRAME_SIZE: usize = 320;
