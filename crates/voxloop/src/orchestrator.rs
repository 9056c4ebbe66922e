//! The turn loop: capture → transcribe → converse → speak, with accounting.
//!
//! Everything here runs on the orchestration task. Capture and classifier
//! handles are not `Send`, so the orchestrator is driven from `block_on`
//! rather than a spawned task; cancellation arrives through the shared
//! listening flag and the playback handle.

use crate::audio::AudioCapture;
use crate::dialogue::DialogueBackend;
use crate::error::VoiceResult;
use crate::monitor::InterruptionMonitor;
use crate::playback::{PlaybackController, PlaybackStatus};
use crate::segment::SpeechSegmenter;
use crate::stt::TranscriptionEngine;
use crate::tts::SynthesisEngine;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// How one turn ended. `Interrupted` is a normal outcome, not a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnOutcome {
    Completed,
    Interrupted,
    FailedCapture,
    FailedTranscription,
    FailedDialogue,
    FailedPlayback,
}

/// Per-session turn counters. Accounting only; nothing is persisted.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SessionStats {
    pub completed: u32,
    pub interrupted: u32,
    pub failed_capture: u32,
    pub failed_transcription: u32,
    pub failed_dialogue: u32,
    pub failed_playback: u32,
}

impl SessionStats {
    pub fn record(&mut self, outcome: TurnOutcome) {
        match outcome {
            TurnOutcome::Completed => self.completed += 1,
            TurnOutcome::Interrupted => self.interrupted += 1,
            TurnOutcome::FailedCapture => self.failed_capture += 1,
            TurnOutcome::FailedTranscription => self.failed_transcription += 1,
            TurnOutcome::FailedDialogue => self.failed_dialogue += 1,
            TurnOutcome::FailedPlayback => self.failed_playback += 1,
        }
    }

    pub fn total(&self) -> u32 {
        self.completed
            + self.interrupted
            + self.failed_capture
            + self.failed_transcription
            + self.failed_dialogue
            + self.failed_playback
    }

    pub fn failed(&self) -> u32 {
        self.failed_capture + self.failed_transcription + self.failed_dialogue + self.failed_playback
    }
}

impl fmt::Display for SessionStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} turns ({} completed, {} interrupted, {} failed)",
            self.total(),
            self.completed,
            self.interrupted,
            self.failed()
        )
    }
}

/// Drives the full conversation loop over the assembled components.
pub struct TurnOrchestrator {
    capture: AudioCapture,
    segmenter: SpeechSegmenter,
    monitor: InterruptionMonitor,
    playback: PlaybackController,
    stt: Box<dyn TranscriptionEngine>,
    tts: Box<dyn SynthesisEngine>,
    dialogue: Box<dyn DialogueBackend>,
    listening: Arc<AtomicBool>,
    session_id: Option<String>,
    stats: SessionStats,
}

impl TurnOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        capture: AudioCapture,
        segmenter: SpeechSegmenter,
        monitor: InterruptionMonitor,
        playback: PlaybackController,
        stt: Box<dyn TranscriptionEngine>,
        tts: Box<dyn SynthesisEngine>,
        dialogue: Box<dyn DialogueBackend>,
        listening: Arc<AtomicBool>,
    ) -> Self {
        Self {
            capture,
            segmenter,
            monitor,
            playback,
            stt,
            tts,
            dialogue,
            listening,
            session_id: None,
            stats: SessionStats::default(),
        }
    }

    /// Stop switch for any reply currently playing, usable from a shutdown
    /// handler while the orchestration task owns `self`.
    pub fn playback_handle(&self) -> crate::playback::PlaybackHandle {
        self.playback.handle()
    }

    /// Session id carried from the last successful dialogue exchange.
    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    /// Run one turn. `None` means the session ended (listening flag cleared
    /// with no utterance pending); any `Some` outcome has been recorded.
    pub async fn run_turn(&mut self) -> Option<TurnOutcome> {
        let outcome = self.execute_turn().await?;
        self.stats.record(outcome);
        debug!(?outcome, "turn recorded");
        Some(outcome)
    }

    async fn execute_turn(&mut self) -> Option<TurnOutcome> {
        let Some(utterance) = self.segmenter.wait_for_utterance().await else {
            if self.listening.load(Ordering::Relaxed) {
                warn!("listening stopped without an utterance");
                return Some(TurnOutcome::FailedCapture);
            }
            return None;
        };

        let transcript = match self.stt.transcribe(&utterance).await {
            Ok(t) => t,
            Err(e) => {
                warn!(error = %e, "transcription failed");
                return Some(TurnOutcome::FailedTranscription);
            }
        };
        if transcript.text.trim().is_empty() {
            debug!("nothing understood in the utterance");
            return Some(TurnOutcome::FailedTranscription);
        }
        info!(text = %transcript.text, "🗣️ you said");

        let reply = match self
            .dialogue
            .converse(&transcript.text, self.session_id.as_deref())
            .await
        {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "dialogue backend failed");
                return Some(TurnOutcome::FailedDialogue);
            }
        };
        if let Some(id) = &reply.session_id {
            self.session_id = Some(id.clone());
        }
        info!(reply = %reply.reply, "💬 reply");
        if let Some(gloss) = &reply.gloss {
            debug!(%gloss, "reply gloss");
        }

        match self
            .playback
            .speak(&reply.reply, self.tts.as_ref(), &self.monitor)
            .await
        {
            PlaybackStatus::Completed => Some(TurnOutcome::Completed),
            // The backend already recorded the exchange; we only cut the audio.
            PlaybackStatus::Interrupted => Some(TurnOutcome::Interrupted),
            PlaybackStatus::Error => Some(TurnOutcome::FailedPlayback),
        }
    }

    /// Start capture and loop turns until the listening flag clears, then
    /// tear down and return the final accounting.
    pub async fn run(&mut self) -> VoiceResult<SessionStats> {
        self.capture.start()?;
        info!("🎧 voice loop running, speak when ready");

        while let Some(outcome) = self.run_turn().await {
            if outcome == TurnOutcome::Interrupted {
                info!("reply interrupted, listening again");
            }
        }

        self.capture.stop();
        self.playback.stop();
        info!(stats = %self.stats, "session over");
        Ok(self.stats)
    }
}
