//! Voice loop binary: wire the components from the environment and run until
//! Ctrl-C.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use voxloop::{
    shared_classifier, AudioCapture, FrameQueue, HttpDialogue, InterruptionMonitor,
    PlaybackController, RodioPlayer, SpeakingFlag, SpeechSegmenter, TurnOrchestrator,
    VoiceConfig, WebRtcClassifier,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (before any env::var calls)
    if let Err(e) = dotenvy::dotenv() {
        eprintln!("[voxloop] .env not loaded: {e} (using system environment)");
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = VoiceConfig::from_env();
    config.validate()?;
    let vad_mode = std::env::var("VOXLOOP_VAD_MODE")
        .ok()
        .and_then(|s| s.parse::<u8>().ok())
        .unwrap_or(2);

    let queue = Arc::new(FrameQueue::new());
    let classifier = shared_classifier(WebRtcClassifier::new(
        config.sample_rate,
        config.frame_samples,
        vad_mode,
    )?);
    let speaking = Arc::new(SpeakingFlag::default());
    let listening = Arc::new(AtomicBool::new(true));

    let segmenter = SpeechSegmenter::new(
        Arc::clone(&queue),
        Arc::clone(&classifier),
        Arc::clone(&speaking),
        Arc::clone(&listening),
        config.vad_threshold,
        config.poll_interval,
        config.silence_frames(),
        config.min_speech_frames(),
    );
    let monitor = InterruptionMonitor::new(
        Arc::clone(&queue),
        classifier,
        speaking,
        config.vad_threshold,
    );
    let playback = PlaybackController::new(Box::new(RodioPlayer::new()?), config.playback_poll);
    let capture = AudioCapture::new(&config, queue);

    let mut orchestrator = TurnOrchestrator::new(
        capture,
        segmenter,
        monitor,
        playback,
        voxloop::stt::best_available()?,
        voxloop::tts::best_available()?,
        Box::new(HttpDialogue::from_env()?),
        Arc::clone(&listening),
    );

    // Ctrl-C ends the session: stop listening, cut any reply mid-play.
    let playback_handle = orchestrator.playback_handle();
    let shutdown_listening = Arc::clone(&listening);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("shutdown requested");
            shutdown_listening.store(false, Ordering::Relaxed);
            playback_handle.stop();
        }
    });

    let stats = orchestrator.run().await?;
    println!("Session summary: {stats}");
    Ok(())
}
