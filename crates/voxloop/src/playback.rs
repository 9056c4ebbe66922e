//! Reply playback with the interruption kill-switch.
//!
//! Each `speak` call synthesizes into a fresh scoped temp artifact, plays it,
//! and polls for an explicit stop or a barge-in on a fixed interval. The
//! artifact is removed on every exit path by ownership.

use crate::error::{VoiceError, VoiceResult};
use crate::monitor::InterruptionMonitor;
use crate::tts::SynthesisEngine;
use rodio::{Decoder, OutputStream, OutputStreamHandle, Sink};
use std::fs::File;
use std::io::{BufReader, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::NamedTempFile;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Outcome of one synthesis-and-playback attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackStatus {
    Completed,
    Interrupted,
    Error,
}

/// Output-device seam so the controller logic is testable without hardware.
pub trait AudioPlayer {
    /// Begin playing the artifact at `path`; returns once queued.
    fn play(&mut self, path: &Path) -> VoiceResult<()>;

    /// Whether audio is still playing or pending.
    fn is_playing(&self) -> bool;

    /// Cut playback immediately.
    fn stop(&mut self);
}

/// Default output device via rodio.
pub struct RodioPlayer {
    _stream: OutputStream,
    _handle: OutputStreamHandle,
    sink: Sink,
}

impl RodioPlayer {
    pub fn new() -> VoiceResult<Self> {
        let (stream, handle) =
            OutputStream::try_default().map_err(|e| VoiceError::Playback(e.to_string()))?;
        let sink = Sink::try_new(&handle).map_err(|e| VoiceError::Playback(e.to_string()))?;
        info!("🔊 output device ready");
        Ok(Self {
            _stream: stream,
            _handle: handle,
            sink,
        })
    }
}

impl AudioPlayer for RodioPlayer {
    fn play(&mut self, path: &Path) -> VoiceResult<()> {
        let file = BufReader::new(File::open(path)?);
        let source =
            Decoder::new(file).map_err(|e| VoiceError::Playback(format!("decode failed: {e}")))?;
        self.sink.append(source);
        self.sink.play();
        Ok(())
    }

    fn is_playing(&self) -> bool {
        !self.sink.empty()
    }

    fn stop(&mut self) {
        self.sink.stop();
    }
}

/// Clonable stop switch, usable from the shutdown handler while a reply plays.
#[derive(Clone)]
pub struct PlaybackHandle {
    stop_requested: Arc<AtomicBool>,
}

impl PlaybackHandle {
    /// Request that any active playback stops. Safe with no active session;
    /// the request is observed within one poll interval.
    pub fn stop(&self) {
        self.stop_requested.store(true, Ordering::Relaxed);
    }
}

/// Synthesizes and plays one reply at a time, preemptible by [`PlaybackHandle::stop`]
/// or by the interruption monitor.
pub struct PlaybackController {
    player: Box<dyn AudioPlayer>,
    stop_requested: Arc<AtomicBool>,
    poll: Duration,
}

impl PlaybackController {
    pub fn new(player: Box<dyn AudioPlayer>, poll: Duration) -> Self {
        Self {
            player,
            stop_requested: Arc::new(AtomicBool::new(false)),
            poll,
        }
    }

    pub fn handle(&self) -> PlaybackHandle {
        PlaybackHandle {
            stop_requested: Arc::clone(&self.stop_requested),
        }
    }

    /// See [`PlaybackHandle::stop`].
    pub fn stop(&self) {
        self.stop_requested.store(true, Ordering::Relaxed);
    }

    fn write_artifact(bytes: &[u8]) -> VoiceResult<NamedTempFile> {
        let mut artifact = tempfile::Builder::new()
            .prefix("voxloop-reply-")
            .suffix(".wav")
            .tempfile()?;
        artifact.write_all(bytes)?;
        artifact.flush()?;
        Ok(artifact)
    }

    /// Synthesize `text` and play it to completion, interruption, or error.
    ///
    /// Blank text and empty synthesis output complete immediately without
    /// creating an artifact. The artifact of a real playback is a scoped temp
    /// file, removed exactly once whichever way this returns.
    pub async fn speak(
        &mut self,
        text: &str,
        synthesizer: &dyn SynthesisEngine,
        monitor: &InterruptionMonitor,
    ) -> PlaybackStatus {
        if text.trim().is_empty() {
            debug!("blank reply, nothing to speak");
            return PlaybackStatus::Completed;
        }
        self.stop_requested.store(false, Ordering::Relaxed);

        let bytes = match synthesizer.synthesize(text).await {
            Ok(b) => b,
            Err(e) => {
                warn!(error = %e, "synthesis failed");
                return PlaybackStatus::Error;
            }
        };
        if bytes.is_empty() {
            debug!("synthesizer produced no audio");
            return PlaybackStatus::Completed;
        }

        let artifact = match Self::write_artifact(&bytes) {
            Ok(a) => a,
            Err(e) => {
                warn!(error = %e, "could not stage reply audio");
                return PlaybackStatus::Error;
            }
        };
        info!(bytes = bytes.len(), "speaking reply");
        if let Err(e) = self.player.play(artifact.path()) {
            warn!(error = %e, "playback failed to start");
            return PlaybackStatus::Error;
        }

        loop {
            if self.stop_requested.load(Ordering::Relaxed) || monitor.poll() {
                self.player.stop();
                info!("⏹️ playback interrupted");
                return PlaybackStatus::Interrupted;
            }
            if !self.player.is_playing() {
                break;
            }
            sleep(self.poll).await;
        }

        debug!("playback finished");
        PlaybackStatus::Completed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::FrameQueue;
    use crate::segment::SpeakingFlag;
    use crate::vad::{shared_classifier, SpeechClassifier};
    use async_trait::async_trait;
    use std::path::PathBuf;
    use std::sync::atomic::AtomicI64;
    use std::sync::Mutex;

    struct NullClassifier;

    impl SpeechClassifier for NullClassifier {
        fn speech_probability(
            &mut self,
            _frame: &crate::audio::AudioFrame,
        ) -> VoiceResult<f32> {
            Ok(0.0)
        }

        fn reset(&mut self) {}
    }

    fn quiet_monitor() -> InterruptionMonitor {
        InterruptionMonitor::new(
            Arc::new(FrameQueue::new()),
            shared_classifier(NullClassifier),
            Arc::new(SpeakingFlag::default()),
            0.5,
        )
    }

    #[derive(Default)]
    struct FakeState {
        busy_polls: AtomicI64,
        stopped: AtomicBool,
        played: Mutex<Option<PathBuf>>,
    }

    struct FakePlayer {
        state: Arc<FakeState>,
    }

    impl FakePlayer {
        fn with_busy_polls(polls: i64) -> (Self, Arc<FakeState>) {
            let state = Arc::new(FakeState {
                busy_polls: AtomicI64::new(polls),
                ..Default::default()
            });
            (
                Self {
                    state: Arc::clone(&state),
                },
                state,
            )
        }
    }

    impl AudioPlayer for FakePlayer {
        fn play(&mut self, path: &Path) -> VoiceResult<()> {
            *self.state.played.lock().unwrap() = Some(path.to_path_buf());
            Ok(())
        }

        fn is_playing(&self) -> bool {
            if self.state.stopped.load(Ordering::Relaxed) {
                return false;
            }
            self.state.busy_polls.fetch_sub(1, Ordering::Relaxed) > 0
        }

        fn stop(&mut self) {
            self.state.stopped.store(true, Ordering::Relaxed);
        }
    }

    struct FakeTts {
        bytes: Vec<u8>,
        calls: AtomicI64,
    }

    impl FakeTts {
        fn new(bytes: Vec<u8>) -> Self {
            Self {
                bytes,
                calls: AtomicI64::new(0),
            }
        }
    }

    #[async_trait]
    impl SynthesisEngine for FakeTts {
        async fn synthesize(&self, _text: &str) -> VoiceResult<Vec<u8>> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            Ok(self.bytes.clone())
        }
    }

    struct FailingTts;

    #[async_trait]
    impl SynthesisEngine for FailingTts {
        async fn synthesize(&self, _text: &str) -> VoiceResult<Vec<u8>> {
            Err(VoiceError::Synthesis("engine offline".into()))
        }
    }

    #[tokio::test]
    async fn blank_text_completes_without_synthesis() {
        let (player, _) = FakePlayer::with_busy_polls(0);
        let mut controller =
            PlaybackController::new(Box::new(player), Duration::from_millis(1));
        let tts = FakeTts::new(vec![1, 2, 3]);

        let status = controller.speak("   ", &tts, &quiet_monitor()).await;
        assert_eq!(status, PlaybackStatus::Completed);
        assert_eq!(tts.calls.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn natural_completion_removes_artifact() {
        let (player, state) = FakePlayer::with_busy_polls(2);
        let mut controller =
            PlaybackController::new(Box::new(player), Duration::from_millis(1));
        let tts = FakeTts::new(vec![0u8; 64]);

        let status = controller.speak("hi there", &tts, &quiet_monitor()).await;
        assert_eq!(status, PlaybackStatus::Completed);

        let played = state.played.lock().unwrap().clone().expect("artifact played");
        assert!(!played.exists(), "artifact should be removed after playback");
    }

    #[tokio::test]
    async fn stop_mid_playback_interrupts_and_removes_artifact() {
        let (player, state) = FakePlayer::with_busy_polls(i64::MAX);
        let mut controller =
            PlaybackController::new(Box::new(player), Duration::from_millis(1));
        let handle = controller.handle();
        let tts = FakeTts::new(vec![0u8; 64]);

        let stopper = tokio::spawn(async move {
            sleep(Duration::from_millis(20)).await;
            handle.stop();
        });
        let status = controller.speak("hi there", &tts, &quiet_monitor()).await;
        stopper.await.unwrap();

        assert_eq!(status, PlaybackStatus::Interrupted);
        assert!(state.stopped.load(Ordering::Relaxed), "player was stopped");
        let played = state.played.lock().unwrap().clone().expect("artifact played");
        assert!(!played.exists(), "artifact should be removed after interruption");
    }

    #[tokio::test]
    async fn synthesis_failure_reports_error() {
        let (player, state) = FakePlayer::with_busy_polls(0);
        let mut controller =
            PlaybackController::new(Box::new(player), Duration::from_millis(1));

        let status = controller.speak("hi there", &FailingTts, &quiet_monitor()).await;
        assert_eq!(status, PlaybackStatus::Error);
        assert!(state.played.lock().unwrap().is_none());
    }

    #[tokio::test]
    async fn stop_with_no_active_session_is_harmless() {
        let (player, _) = FakePlayer::with_busy_polls(1);
        let mut controller =
            PlaybackController::new(Box::new(player), Duration::from_millis(1));
        controller.stop();

        // The stale request is cleared when the next reply starts.
        let tts = FakeTts::new(vec![0u8; 8]);
        let status = controller.speak("hi there", &tts, &quiet_monitor()).await;
        assert_eq!(status, PlaybackStatus::Completed);
    }

    /// Requires an output device; run manually.
    #[test]
    #[ignore]
    fn rodio_player_opens_default_device() {
        let player = RodioPlayer::new();
        assert!(player.is_ok());
    }
}
