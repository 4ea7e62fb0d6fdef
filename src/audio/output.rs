//! Audio output to speakers
//!
//! A long-lived cpal output stream pulling mono samples from the playback
//! ring at the render cadence. Ring edge events (started/ended) observed in
//! the render callback are forwarded to the orchestrator's event queue; the
//! callback itself never blocks.

use std::sync::Arc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleRate, Stream, StreamConfig};
use tokio::sync::mpsc::UnboundedSender;

use crate::{Error, Result};

use super::ring::{PlaybackEvent, PlaybackRing};
use super::SAMPLE_RATE;

/// Renders the playback ring to the default output device
pub struct AudioOutput {
    #[allow(dead_code)]
    device: Device,
    config: StreamConfig,
    ring: Arc<PlaybackRing>,
    events: UnboundedSender<PlaybackEvent>,
    stream: Option<Stream>,
}

impl AudioOutput {
    /// Create a new audio output instance
    ///
    /// # Errors
    ///
    /// Returns error if no output device supports the pipeline sample rate
    pub fn new(ring: Arc<PlaybackRing>, events: UnboundedSender<PlaybackEvent>) -> Result<Self> {
        let host = cpal::default_host();

        let device = host
            .default_output_device()
            .ok_or_else(|| Error::Audio("no output device available".to_string()))?;

        let supported_config = device
            .supported_output_configs()
            .map_err(|e| Error::Audio(e.to_string()))?
            .find(|c| {
                c.channels() == 1
                    && c.min_sample_rate() <= SampleRate(SAMPLE_RATE)
                    && c.max_sample_rate() >= SampleRate(SAMPLE_RATE)
            })
            .or_else(|| {
                // Fallback: try stereo
                device.supported_output_configs().ok()?.find(|c| {
                    c.channels() == 2
                        && c.min_sample_rate() <= SampleRate(SAMPLE_RATE)
                        && c.max_sample_rate() >= SampleRate(SAMPLE_RATE)
                })
            })
            .ok_or_else(|| Error::Audio("no suitable output config found".to_string()))?;

        let config = supported_config
            .with_sample_rate(SampleRate(SAMPLE_RATE))
            .config();

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate = SAMPLE_RATE,
            channels = config.channels,
            "audio output initialized"
        );

        Ok(Self {
            device,
            config,
            ring,
            events,
            stream: None,
        })
    }

    /// Start the render stream
    ///
    /// # Errors
    ///
    /// Returns error if the output stream cannot be built or started
    pub fn start(&mut self) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| Error::Audio("no output device".to_string()))?;

        let config = self.config.clone();
        let channels = config.channels as usize;
        let ring = Arc::clone(&self.ring);
        let events = self.events.clone();
        let mut mono = Vec::new();

        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    let frames = data.len() / channels;
                    mono.resize(frames, 0.0);

                    let event = ring.read(&mut mono);

                    for (frame, &sample) in data.chunks_mut(channels).zip(mono.iter()) {
                        for out in frame.iter_mut() {
                            *out = sample;
                        }
                    }

                    if let Some(event) = event {
                        // Unbounded send never blocks the render thread
                        let _ = events.send(event);
                    }
                },
                |err| {
                    tracing::error!(error = %err, "audio output error");
                },
                None,
            )
            .map_err(|e| Error::Audio(e.to_string()))?;

        stream.play().map_err(|e| Error::Audio(e.to_string()))?;
        self.stream = Some(stream);

        tracing::debug!("audio output started");
        Ok(())
    }

    /// Stop the render stream
    pub fn stop(&mut self) {
        if let Some(stream) = self.stream.take() {
            drop(stream);
            tracing::debug!("audio output stopped");
        }
    }

    /// Check if the render stream is live
    #[must_use]
    pub const fn is_playing(&self) -> bool {
        self.stream.is_some()
    }
}
