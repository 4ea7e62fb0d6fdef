//! Streaming clients for the transcription and synthesis backends
//!
//! Both backends are remote HTTP services; these clients adapt them to the
//! pipeline's streaming contracts. Audio leaves as 16kHz mono WAV and comes
//! back as MP3, decoded and resampled to the pipeline format before chunked
//! delivery into the playback ring.

mod stt;
mod tts;

pub use stt::{pcm_to_wav, TranscriptionBackend, TranscriptionClient};
pub use tts::{SynthesisBackend, SynthesisClient, SynthesisEvent};
