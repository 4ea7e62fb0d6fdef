//! Synthesis stream client
//!
//! Sends answer text to the configured backend, decodes the returned MP3 to
//! 16kHz mono f32, and delivers it as a sequence of fixed-size chunk events
//! followed by exactly one completion or error event.

use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc::UnboundedSender;

use crate::audio::SAMPLE_RATE;
use crate::config::{ApiKeys, TtsConfig, TtsProvider};
use crate::{Error, Result};

/// Samples per delivered chunk (1600 = 100ms at 16kHz)
const CHUNK_SAMPLES: usize = 1600;

/// Wall-clock duration of one full chunk
const CHUNK_DURATION: Duration = Duration::from_millis(100);

/// Chunks sent immediately before pacing kicks in (400ms of lead, enough to
/// cross the playback ring's jitter threshold with margin)
const LEAD_CHUNKS: usize = 4;

/// Events emitted while speaking one answer
#[derive(Debug, Clone)]
pub enum SynthesisEvent {
    /// One chunk of 16kHz mono samples, in order
    Chunk(Vec<f32>),
    /// All chunks delivered
    Complete,
    /// Synthesis or decode failed; no further events follow
    Failed(String),
}

/// A backend that turns text into MP3 audio
#[async_trait]
pub trait SynthesisBackend: Send + Sync {
    /// Synthesize text, returning MP3 bytes
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>>;

    /// Backend name for logging
    fn name(&self) -> &'static str;
}

/// `OpenAI` speech synthesis backend
pub struct OpenAiBackend {
    client: reqwest::Client,
    api_key: String,
    model: String,
    voice: String,
    speed: f64,
}

#[async_trait]
impl SynthesisBackend for OpenAiBackend {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
        #[derive(serde::Serialize)]
        struct SpeechRequest<'a> {
            model: &'a str,
            input: &'a str,
            voice: &'a str,
            speed: f64,
        }

        let request = SpeechRequest {
            model: &self.model,
            input: text,
            voice: &self.voice,
            speed: self.speed,
        };

        let response = self
            .client
            .post("https://api.openai.com/v1/audio/speech")
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "OpenAI TTS error");
            return Err(Error::Tts(format!("OpenAI TTS error {status}: {body}")));
        }

        Ok(response.bytes().await?.to_vec())
    }

    fn name(&self) -> &'static str {
        "openai"
    }
}

/// `ElevenLabs` speech synthesis backend
pub struct ElevenLabsBackend {
    client: reqwest::Client,
    api_key: String,
    model: String,
    voice_id: String,
}

#[async_trait]
impl SynthesisBackend for ElevenLabsBackend {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
        #[derive(serde::Serialize)]
        struct SpeechRequest<'a> {
            text: &'a str,
            model_id: &'a str,
        }

        let url = format!(
            "https://api.elevenlabs.io/v1/text-to-speech/{}",
            self.voice_id
        );

        let request = SpeechRequest {
            text,
            model_id: &self.model,
        };

        let response = self
            .client
            .post(&url)
            .header("xi-api-key", &self.api_key)
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "ElevenLabs TTS error");
            return Err(Error::Tts(format!("ElevenLabs TTS error {status}: {body}")));
        }

        Ok(response.bytes().await?.to_vec())
    }

    fn name(&self) -> &'static str {
        "elevenlabs"
    }
}

/// Client delivering synthesized speech as pipeline-format chunks
#[derive(Clone)]
pub struct SynthesisClient {
    backend: Arc<dyn SynthesisBackend>,
}

impl SynthesisClient {
    /// Build a client for the configured backend
    ///
    /// # Errors
    ///
    /// Returns error if the selected provider's API key is missing
    pub fn new(config: &TtsConfig, keys: &ApiKeys) -> Result<Self> {
        let backend: Arc<dyn SynthesisBackend> = match config.provider {
            TtsProvider::OpenAi => {
                let key = keys.openai.clone().ok_or_else(|| {
                    Error::Config("OpenAI API key required for TTS".to_string())
                })?;
                Arc::new(OpenAiBackend {
                    client: reqwest::Client::new(),
                    api_key: key,
                    model: config.model.clone(),
                    voice: config.voice.clone(),
                    speed: config.speed,
                })
            }
            TtsProvider::ElevenLabs => {
                let key = keys.elevenlabs.clone().ok_or_else(|| {
                    Error::Config("ElevenLabs API key required for TTS".to_string())
                })?;
                Arc::new(ElevenLabsBackend {
                    client: reqwest::Client::new(),
                    api_key: key,
                    model: config.model.clone(),
                    voice_id: config.voice.clone(),
                })
            }
        };

        tracing::debug!(
            backend = backend.name(),
            model = %config.model,
            voice = %config.voice,
            "synthesis client initialized"
        );

        Ok(Self { backend })
    }

    /// Speak one answer, emitting chunk events then one terminal event
    ///
    /// Returns a detached future the caller spawns; cancellation (dropping
    /// the task) simply stops event delivery.
    pub fn speak(
        &self,
        text: String,
        events: UnboundedSender<SynthesisEvent>,
    ) -> impl std::future::Future<Output = ()> + Send + 'static {
        let backend = Arc::clone(&self.backend);

        async move {
            let mp3 = match backend.synthesize(&text).await {
                Ok(bytes) => bytes,
                Err(err) => {
                    let _ = events.send(SynthesisEvent::Failed(err.to_string()));
                    return;
                }
            };

            tracing::debug!(
                backend = backend.name(),
                mp3_bytes = mp3.len(),
                "synthesis response received"
            );

            let samples = match decode_to_pipeline_rate(&mp3) {
                Ok(samples) => samples,
                Err(err) => {
                    let _ = events.send(SynthesisEvent::Failed(err.to_string()));
                    return;
                }
            };

            emit_chunks(samples, events).await;
        }
    }
}

/// Deliver decoded audio as chunk events at approximately real-time pace
///
/// The first few chunks go out immediately so the playback ring primes
/// without delay; the rest follow at the playback cadence, keeping ring
/// occupancy bounded no matter how long the utterance is.
async fn emit_chunks(samples: Vec<f32>, events: UnboundedSender<SynthesisEvent>) {
    for (i, chunk) in samples.chunks(CHUNK_SAMPLES).enumerate() {
        if i >= LEAD_CHUNKS {
            tokio::time::sleep(CHUNK_DURATION).await;
        }
        if events.send(SynthesisEvent::Chunk(chunk.to_vec())).is_err() {
            // Receiver gone, the turn was cancelled
            return;
        }
    }
    let _ = events.send(SynthesisEvent::Complete);
}

/// Decode MP3 bytes to mono f32 at the pipeline sample rate
fn decode_to_pipeline_rate(mp3: &[u8]) -> Result<Vec<f32>> {
    let mut decoder = minimp3::Decoder::new(Cursor::new(mp3));
    let mut samples: Vec<f32> = Vec::new();
    let mut source_rate = SAMPLE_RATE;

    loop {
        match decoder.next_frame() {
            Ok(frame) => {
                #[allow(clippy::cast_sign_loss)]
                {
                    source_rate = frame.sample_rate as u32;
                }
                if frame.channels == 2 {
                    // Stereo: average channels
                    for chunk in frame.data.chunks(2) {
                        let left = f32::from(chunk[0]) / 32768.0;
                        let right =
                            f32::from(chunk.get(1).copied().unwrap_or(chunk[0])) / 32768.0;
                        samples.push(f32::midpoint(left, right));
                    }
                } else {
                    samples.extend(frame.data.iter().map(|&s| f32::from(s) / 32768.0));
                }
            }
            Err(minimp3::Error::Eof) => break,
            Err(e) => return Err(Error::Audio(format!("MP3 decode error: {e}"))),
        }
    }

    if source_rate == SAMPLE_RATE {
        Ok(samples)
    } else {
        resample(&samples, source_rate, SAMPLE_RATE)
    }
}

/// Resample mono audio between rates
#[allow(clippy::cast_possible_truncation)]
fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Result<Vec<f32>> {
    use rubato::{FftFixedIn, Resampler};

    let chunk_size = 1024;
    let sub_chunks = 2;

    let mut resampler =
        FftFixedIn::<f64>::new(from_rate as usize, to_rate as usize, chunk_size, sub_chunks, 1)
            .map_err(|e| Error::Audio(format!("resampler init failed: {e}")))?;

    let input: Vec<f64> = samples.iter().map(|&s| f64::from(s)).collect();
    let mut output = Vec::new();

    for chunk in input.chunks(chunk_size) {
        let result = if chunk.len() == chunk_size {
            resampler.process(&[chunk], None)
        } else {
            // Final partial chunk is zero-padded internally
            resampler.process_partial(Some(&[chunk]), None)
        }
        .map_err(|e| Error::Audio(format!("resample failed: {e}")))?;
        output.extend_from_slice(&result[0]);
    }

    // Push the FFT delay line out so the end of the utterance is not clipped
    let tail = resampler
        .process_partial(None::<&[&[f64]]>, None)
        .map_err(|e| Error::Audio(format!("resample flush failed: {e}")))?;
    output.extend_from_slice(&tail[0]);

    Ok(output.iter().map(|&s| s as f32).collect())
}
