//! Daemon - the attune voice loop service
//!
//! Owns the audio devices and network clients, pumps captured audio through
//! the frame chunker, and runs the orchestrator's serialized event loop,
//! executing the actions it emits. All engine state changes happen on this
//! loop; spawned network tasks and timers only feed events back in.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::answers::AnswerBook;
use crate::audio::{AudioCapture, AudioOutput, FrameChunker, PlaybackEvent, PlaybackRing};
use crate::events::Observer;
use crate::orchestrator::{EngineAction, EngineEvent, TurnEngine};
use crate::stream::{SynthesisClient, SynthesisEvent, TranscriptionClient};
use crate::{Config, Result};

/// Capture pump cadence, matching the frame duration
const CAPTURE_TICK: Duration = Duration::from_millis(20);

/// The attune daemon
pub struct Daemon {
    config: Config,
    observer: Observer,
}

impl Daemon {
    /// Create a new daemon instance
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self {
            config,
            observer: Observer::new(),
        }
    }

    /// Handle for subscribing to observer events before the loop starts
    #[must_use]
    pub fn observer(&self) -> Observer {
        self.observer.clone()
    }

    /// Run the voice loop until interrupted
    ///
    /// Runs on the calling task; cpal streams are not `Send`, so the devices
    /// and the engine stay here while network work is spawned off.
    ///
    /// # Errors
    ///
    /// Returns error if devices or clients fail to initialize
    #[allow(clippy::future_not_send, clippy::too_many_lines)]
    pub async fn run(self) -> Result<()> {
        let answers = match &self.config.answers_path {
            Some(path) => AnswerBook::from_path(path)?,
            None => AnswerBook::embedded()?,
        };

        let mut stt = TranscriptionClient::new(&self.config.stt, &self.config.api_keys)?;
        let tts = SynthesisClient::new(&self.config.tts, &self.config.api_keys)?;

        let ring = Arc::new(PlaybackRing::new(
            self.config.playback.ring_capacity,
            self.config.playback.jitter_threshold,
        ));

        let (playback_tx, mut playback_rx) = mpsc::unbounded_channel::<PlaybackEvent>();
        let (engine_tx, mut engine_rx) = mpsc::unbounded_channel::<EngineEvent>();

        let mut capture = AudioCapture::new()?;
        let mut output = AudioOutput::new(Arc::clone(&ring), playback_tx)?;

        let mut chunker = FrameChunker::new(self.config.turn.frame_size);
        let mut engine = TurnEngine::new(self.config.clone(), answers, self.observer.clone());
        let mut tasks: Vec<JoinHandle<()>> = Vec::new();

        capture.start()?;
        output.start()?;

        let actions = engine.handle_event(EngineEvent::Start, Instant::now());
        dispatch(actions, &mut stt, &tts, &ring, &engine_tx, &mut tasks);

        tracing::info!(phrase = %self.config.wake.phrase, "listening for wake phrase");

        let mut capture_tick = tokio::time::interval(CAPTURE_TICK);
        capture_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("shutdown requested");
                    let actions = engine.handle_event(EngineEvent::Stop, Instant::now());
                    dispatch(actions, &mut stt, &tts, &ring, &engine_tx, &mut tasks);
                    break;
                }
                _ = capture_tick.tick() => {
                    let samples = capture.take_buffer();
                    if samples.is_empty() {
                        continue;
                    }
                    let now = Instant::now();
                    for frame in chunker.push(&samples) {
                        let actions = engine.handle_event(EngineEvent::Frame(frame), now);
                        dispatch(actions, &mut stt, &tts, &ring, &engine_tx, &mut tasks);
                    }
                }
                Some(event) = engine_rx.recv() => {
                    let actions = engine.handle_event(event, Instant::now());
                    dispatch(actions, &mut stt, &tts, &ring, &engine_tx, &mut tasks);
                }
                Some(event) = playback_rx.recv() => {
                    let engine_event = match event {
                        PlaybackEvent::Started => EngineEvent::PlaybackStarted,
                        PlaybackEvent::Ended => EngineEvent::PlaybackEnded,
                    };
                    let actions = engine.handle_event(engine_event, Instant::now());
                    dispatch(actions, &mut stt, &tts, &ring, &engine_tx, &mut tasks);
                }
            }
        }

        for task in &tasks {
            task.abort();
        }
        capture.stop();
        output.stop();
        tracing::info!("daemon stopped");
        Ok(())
    }
}

/// Execute the actions one engine transition demanded
fn dispatch(
    actions: Vec<EngineAction>,
    stt: &mut TranscriptionClient,
    tts: &SynthesisClient,
    ring: &Arc<PlaybackRing>,
    engine_tx: &mpsc::UnboundedSender<EngineEvent>,
    tasks: &mut Vec<JoinHandle<()>>,
) {
    tasks.retain(|t| !t.is_finished());

    for action in actions {
        match action {
            EngineAction::OpenTranscription => stt.open(),
            EngineAction::ForwardFrame(frame) => stt.send_frame(&frame),
            EngineAction::FinalizeTranscription { session } => {
                let fut = stt.end_turn();
                let tx = engine_tx.clone();
                tasks.push(tokio::spawn(async move {
                    let event = match fut.await {
                        Ok(transcript) => EngineEvent::TranscriptReady {
                            session,
                            transcript,
                        },
                        Err(err) => EngineEvent::TranscriptFailed {
                            session,
                            message: err.to_string(),
                        },
                    };
                    let _ = tx.send(event);
                }));
            }
            EngineAction::Speak { session, text } => {
                let (chunk_tx, mut chunk_rx) = mpsc::unbounded_channel::<SynthesisEvent>();
                tasks.push(tokio::spawn(tts.speak(text, chunk_tx)));

                let tx = engine_tx.clone();
                tasks.push(tokio::spawn(async move {
                    while let Some(event) = chunk_rx.recv().await {
                        let engine_event = match event {
                            SynthesisEvent::Chunk(samples) => {
                                EngineEvent::SynthesisChunk { session, samples }
                            }
                            SynthesisEvent::Complete => {
                                EngineEvent::SynthesisComplete { session }
                            }
                            SynthesisEvent::Failed(message) => {
                                EngineEvent::SynthesisFailed { session, message }
                            }
                        };
                        if tx.send(engine_event).is_err() {
                            break;
                        }
                    }
                }));
            }
            EngineAction::WriteAudio(samples) => {
                if let Some(event) = ring.write(&samples) {
                    let engine_event = match event {
                        PlaybackEvent::Started => EngineEvent::PlaybackStarted,
                        PlaybackEvent::Ended => EngineEvent::PlaybackEnded,
                    };
                    let _ = engine_tx.send(engine_event);
                }
            }
            EngineAction::FlushPlayback => {
                if let Some(PlaybackEvent::Started) = ring.flush() {
                    let _ = engine_tx.send(EngineEvent::PlaybackStarted);
                }
            }
            EngineAction::StartMaxTurnTimer { session, delay_ms } => {
                let tx = engine_tx.clone();
                tasks.push(tokio::spawn(async move {
                    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                    let _ = tx.send(EngineEvent::MaxTurnElapsed { session });
                }));
            }
            EngineAction::StartCooldown { token, delay_ms } => {
                let tx = engine_tx.clone();
                tasks.push(tokio::spawn(async move {
                    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                    let _ = tx.send(EngineEvent::CooldownElapsed { token });
                }));
            }
            EngineAction::StartBackoff { token, delay_ms } => {
                let tx = engine_tx.clone();
                tasks.push(tokio::spawn(async move {
                    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                    let _ = tx.send(EngineEvent::BackoffElapsed { token });
                }));
            }
            EngineAction::CancelStreams => {
                for task in tasks.iter() {
                    task.abort();
                }
                tasks.clear();
                stt.close();
            }
            EngineAction::ResetPlayback => ring.reset(),
        }
    }
}
