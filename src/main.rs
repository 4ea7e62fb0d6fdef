use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use attune::{
    AnswerBook, AudioCapture, AudioOutput, Config, Daemon, FrameChunker, PlaybackRing,
    frame_energy,
};

/// Attune - latency-sensitive turn-based voice assistant
#[derive(Parser)]
#[command(name = "attune", version, about)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Test microphone input
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
    },
    /// Test speaker output
    TestSpeaker,
    /// Look up an answer for a transcript without audio
    Ask {
        /// Transcript text to look up
        text: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,attune=info",
        1 => "info,attune=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

#[allow(clippy::future_not_send)]
async fn run(cli: Cli) -> anyhow::Result<()> {
    if let Some(cmd) = cli.command {
        return match cmd {
            Command::TestMic { duration } => test_mic(duration).await,
            Command::TestSpeaker => test_speaker().await,
            Command::Ask { text } => ask(&text),
        };
    }

    let config = Config::load()?;
    tracing::info!(
        wake_phrase = %config.wake.phrase,
        stt = ?config.stt.provider,
        tts = ?config.tts.provider,
        "starting attune"
    );

    let daemon = Daemon::new(config);
    daemon.run().await?;

    Ok(())
}

/// Test microphone input with a live level meter
#[allow(clippy::future_not_send)]
async fn test_mic(duration: u64) -> anyhow::Result<()> {
    println!("Testing microphone for {duration} seconds...");
    println!("Speak into your microphone!\n");

    let mut capture = AudioCapture::new()?;
    capture.start()?;

    let sample_rate = capture.sample_rate();
    println!("Sample rate: {sample_rate} Hz");
    println!("---");

    let mut chunker = FrameChunker::new(attune::FRAME_SIZE);

    for i in 0..duration {
        tokio::time::sleep(Duration::from_secs(1)).await;

        let samples = capture.take_buffer();
        let frames = chunker.push(&samples);
        let energy = frames
            .iter()
            .map(frame_energy)
            .fold(0.0f32, f32::max);
        let peak = samples.iter().map(|s| s.abs()).fold(0.0f32, f32::max);

        // Visual meter
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let meter_len = (energy * 100.0).min(50.0) as usize;
        let meter: String = "#".repeat(meter_len) + &" ".repeat(50 - meter_len);

        println!(
            "[{:2}s] RMS: {:.4} | Peak: {:.4} | [{}]",
            i + 1,
            energy,
            peak,
            meter
        );
    }

    capture.stop();

    println!("\n---");
    println!("If you saw movement in the meter, your mic is working!");
    println!("If RMS stayed near 0, check:");
    println!("  1. Is your mic plugged in?");
    println!("  2. Run: pactl info | grep 'Default Source'");
    println!("  3. Run: arecord -l (to list devices)");

    Ok(())
}

/// Test speaker output with a sine wave through the playback ring
async fn test_speaker() -> anyhow::Result<()> {
    println!("Testing speaker output...");
    println!("You should hear a 440Hz tone for 2 seconds\n");

    let sample_rate = attune::SAMPLE_RATE;
    let frequency = 440.0_f32;
    let duration_secs = 2.0_f32;
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let num_samples = (sample_rate as f32 * duration_secs) as usize;

    #[allow(clippy::cast_precision_loss)]
    let samples: Vec<f32> = (0..num_samples)
        .map(|i| {
            let t = i as f32 / sample_rate as f32;
            (2.0 * std::f32::consts::PI * frequency * t).sin() * 0.3 // 30% volume
        })
        .collect();

    let ring = Arc::new(PlaybackRing::new(num_samples, 1920));
    let (events_tx, mut events_rx) = tokio::sync::mpsc::unbounded_channel();

    let mut output = AudioOutput::new(Arc::clone(&ring), events_tx)?;
    output.start()?;

    println!("Playing {} samples at {} Hz...", samples.len(), sample_rate);
    ring.write(&samples);

    // Wait for the ring to drain
    loop {
        match tokio::time::timeout(Duration::from_secs(5), events_rx.recv()).await {
            Ok(Some(attune::PlaybackEvent::Ended)) | Ok(None) | Err(_) => break,
            Ok(Some(attune::PlaybackEvent::Started)) => {}
        }
    }
    // Let the last buffer reach the speaker
    tokio::time::sleep(Duration::from_millis(100)).await;
    output.stop();

    println!("\n---");
    println!("If you heard the tone, your speakers are working!");
    println!("If you didn't hear anything, check:");
    println!("  1. Run: pactl info | grep 'Default Sink'");
    println!("  2. Run: pactl list sinks short");

    Ok(())
}

/// Look up an answer for a transcript without audio
fn ask(text: &str) -> anyhow::Result<()> {
    let config = Config::load()?;
    let book = match &config.answers_path {
        Some(path) => AnswerBook::from_path(path)?,
        None => AnswerBook::embedded()?,
    };

    let answer = book.get_answer(text);
    if book.has_answer(text) {
        println!("{answer}");
    } else {
        println!("(default) {answer}");
    }

    Ok(())
}
