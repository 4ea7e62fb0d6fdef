//! Transcription stream client
//!
//! Buffers a turn's frames, and on end-of-turn encodes them as WAV and posts
//! to the configured backend. Transport failures retry a bounded number of
//! times with a fixed delay before surfacing to the orchestrator.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::audio::{AudioFrame, SAMPLE_RATE};
use crate::config::{ApiKeys, SttConfig, SttProvider};
use crate::{Error, Result};

/// A backend that turns one utterance of WAV audio into text
#[async_trait]
pub trait TranscriptionBackend: Send + Sync {
    /// Transcribe WAV bytes to text
    async fn transcribe(&self, wav: &[u8]) -> Result<String>;

    /// Backend name for logging
    fn name(&self) -> &'static str;
}

/// Response from the `OpenAI` Whisper transcription API
#[derive(serde::Deserialize)]
struct WhisperResponse {
    text: String,
}

/// Response from the `Deepgram` transcription API
#[derive(serde::Deserialize)]
struct DeepgramResponse {
    results: DeepgramResults,
}

#[derive(serde::Deserialize)]
struct DeepgramResults {
    channels: Vec<DeepgramChannel>,
}

#[derive(serde::Deserialize)]
struct DeepgramChannel {
    alternatives: Vec<DeepgramAlternative>,
}

#[derive(serde::Deserialize)]
struct DeepgramAlternative {
    transcript: String,
}

/// `OpenAI` Whisper backend
pub struct WhisperBackend {
    client: reqwest::Client,
    api_key: String,
    model: String,
}

impl WhisperBackend {
    fn new(api_key: String, model: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            model,
        }
    }
}

#[async_trait]
impl TranscriptionBackend for WhisperBackend {
    async fn transcribe(&self, wav: &[u8]) -> Result<String> {
        tracing::debug!(audio_bytes = wav.len(), "starting Whisper transcription");

        let form = reqwest::multipart::Form::new()
            .part(
                "file",
                reqwest::multipart::Part::bytes(wav.to_vec())
                    .file_name("audio.wav")
                    .mime_str("audio/wav")
                    .map_err(|e| Error::Stt(e.to_string()))?,
            )
            .text("model", self.model.clone());

        let response = self
            .client
            .post("https://api.openai.com/v1/audio/transcriptions")
            .header("Authorization", format!("Bearer {}", self.api_key))
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "Whisper API error");
            return Err(Error::Stt(format!("Whisper API error {status}: {body}")));
        }

        let result: WhisperResponse = response.json().await?;
        tracing::info!(transcript = %result.text, "transcription complete");
        Ok(result.text)
    }

    fn name(&self) -> &'static str {
        "whisper"
    }
}

/// `Deepgram` backend
pub struct DeepgramBackend {
    client: reqwest::Client,
    api_key: String,
    model: String,
}

impl DeepgramBackend {
    fn new(api_key: String, model: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            model,
        }
    }
}

#[async_trait]
impl TranscriptionBackend for DeepgramBackend {
    async fn transcribe(&self, wav: &[u8]) -> Result<String> {
        tracing::debug!(audio_bytes = wav.len(), "starting Deepgram transcription");

        let url = format!(
            "https://api.deepgram.com/v1/listen?model={}&punctuate=true",
            self.model
        );

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Token {}", self.api_key))
            .header("Content-Type", "audio/wav")
            .body(wav.to_vec())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "Deepgram API error");
            return Err(Error::Stt(format!("Deepgram API error {status}: {body}")));
        }

        let result: DeepgramResponse = response.json().await?;
        let transcript = result
            .results
            .channels
            .first()
            .and_then(|c| c.alternatives.first())
            .map(|a| a.transcript.clone())
            .unwrap_or_default();

        tracing::info!(transcript = %transcript, "transcription complete");
        Ok(transcript)
    }

    fn name(&self) -> &'static str {
        "deepgram"
    }
}

/// Client for one turn's worth of transcription at a time
///
/// Frames sent between `open` and `end_turn` accumulate into one utterance;
/// `end_turn` hands back a future resolving to the transcript so the caller
/// can await it off the audio path.
pub struct TranscriptionClient {
    backend: Arc<dyn TranscriptionBackend>,
    batch: Vec<i16>,
    open: bool,
    reconnect_attempts: u32,
    reconnect_delay: Duration,
}

impl TranscriptionClient {
    /// Build a client for the configured backend
    ///
    /// # Errors
    ///
    /// Returns error if the selected provider's API key is missing
    pub fn new(config: &SttConfig, keys: &ApiKeys) -> Result<Self> {
        let backend: Arc<dyn TranscriptionBackend> = match config.provider {
            SttProvider::Whisper => {
                let key = keys.openai.clone().ok_or_else(|| {
                    Error::Config("OpenAI API key required for Whisper".to_string())
                })?;
                Arc::new(WhisperBackend::new(key, config.model.clone()))
            }
            SttProvider::Deepgram => {
                let key = keys.deepgram.clone().ok_or_else(|| {
                    Error::Config("Deepgram API key required".to_string())
                })?;
                Arc::new(DeepgramBackend::new(key, config.model.clone()))
            }
        };

        tracing::debug!(
            backend = backend.name(),
            model = %config.model,
            "transcription client initialized"
        );

        Ok(Self {
            backend,
            batch: Vec::new(),
            open: false,
            reconnect_attempts: config.reconnect_attempts,
            reconnect_delay: Duration::from_millis(config.reconnect_delay_ms),
        })
    }

    /// Begin a new utterance, discarding any previous buffered audio
    pub fn open(&mut self) {
        self.batch.clear();
        self.open = true;
        tracing::trace!("transcription stream opened");
    }

    /// Buffer one captured frame; ignored when no utterance is open
    pub fn send_frame(&mut self, frame: &AudioFrame) {
        if self.open {
            self.batch.extend_from_slice(&frame.samples);
        }
    }

    /// Finalize the utterance and request its transcript
    ///
    /// Takes the buffered audio and returns a detached future the caller
    /// awaits (or spawns). Retries transport failures up to the configured
    /// attempt count with a fixed delay between tries.
    pub fn end_turn(
        &mut self,
    ) -> impl std::future::Future<Output = Result<String>> + Send + 'static {
        let samples = std::mem::take(&mut self.batch);
        self.open = false;

        let backend = Arc::clone(&self.backend);
        let attempts = self.reconnect_attempts.max(1);
        let delay = self.reconnect_delay;

        async move {
            let wav = pcm_to_wav(&samples, SAMPLE_RATE)?;

            let mut last_err = None;
            for attempt in 1..=attempts {
                match backend.transcribe(&wav).await {
                    Ok(transcript) => return Ok(transcript),
                    Err(err) => {
                        tracing::warn!(
                            backend = backend.name(),
                            attempt,
                            attempts,
                            error = %err,
                            "transcription attempt failed"
                        );
                        last_err = Some(err);
                        if attempt < attempts {
                            tokio::time::sleep(delay).await;
                        }
                    }
                }
            }

            Err(last_err
                .unwrap_or_else(|| Error::Stt("transcription failed".to_string())))
        }
    }

    /// Abandon the current utterance
    pub fn close(&mut self) {
        self.batch.clear();
        self.open = false;
        tracing::trace!("transcription stream closed");
    }

    /// Samples buffered for the current utterance
    #[must_use]
    pub fn buffered_samples(&self) -> usize {
        self.batch.len()
    }
}

/// Encode 16-bit PCM samples as a mono WAV byte buffer
///
/// # Errors
///
/// Returns error if the WAV writer fails
pub fn pcm_to_wav(samples: &[i16], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer =
            hound::WavWriter::new(&mut cursor, spec).map_err(|e| Error::Audio(e.to_string()))?;

        for &sample in samples {
            writer
                .write_sample(sample)
                .map_err(|e| Error::Audio(e.to_string()))?;
        }

        writer.finalize().map_err(|e| Error::Audio(e.to_string()))?;
    }

    Ok(cursor.into_inner())
}
