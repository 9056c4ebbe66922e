//! Endpoint detection: turning a classified frame stream into utterances.
//!
//! [`EndpointDetector`] is the pure state machine (unit-testable without audio
//! or timers); [`SpeechSegmenter`] drives it against the live frame queue with
//! bounded polls so the listening flag is observed promptly.

use crate::audio::{AudioFrame, FrameQueue};
use crate::vad::SharedClassifier;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info, warn};

/// One continuous user turn: speech frames plus the trailing silence that
/// ended it, concatenated in capture order.
#[derive(Debug, Clone)]
pub struct Utterance {
    /// PCM samples, f32 mono.
    pub samples: Vec<f32>,
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// How many of the buffered frames were classified as speech.
    pub speech_frames: u32,
    /// When the trailing silence threshold was reached.
    pub captured_at: DateTime<Utc>,
}

impl Utterance {
    fn from_frames(frames: Vec<AudioFrame>, speech_frames: u32) -> Self {
        let sample_rate = frames.first().map_or(0, |f| f.sample_rate);
        let mut samples = Vec::with_capacity(frames.iter().map(|f| f.samples.len()).sum());
        for frame in frames {
            samples.extend_from_slice(&frame.samples);
        }
        Self {
            samples,
            sample_rate,
            speech_frames,
            captured_at: Utc::now(),
        }
    }

    /// Total buffered duration, trailing silence included.
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.samples.len() as f64 / self.sample_rate as f64)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Speaking,
}

/// Frame-counting endpoint state machine.
///
/// Idle until a speech frame arrives; while speaking, every frame is buffered
/// (silence included, so the output keeps its natural tail). A run of
/// `silence_limit` non-speech frames finalizes the buffer: emitted as an
/// utterance when at least `min_speech` speech frames were seen, discarded as
/// noise otherwise. Either way the detector returns to idle.
pub struct EndpointDetector {
    phase: Phase,
    silence_run: u32,
    speech_frames: u32,
    buffer: Vec<AudioFrame>,
    silence_limit: u32,
    min_speech: u32,
}

impl EndpointDetector {
    pub fn new(silence_limit: u32, min_speech: u32) -> Self {
        Self {
            phase: Phase::Idle,
            silence_run: 0,
            speech_frames: 0,
            buffer: Vec::new(),
            silence_limit,
            min_speech,
        }
    }

    /// Feed one classified frame; returns a finished utterance when the
    /// trailing-silence threshold is met with enough speech behind it.
    pub fn push(&mut self, frame: AudioFrame, is_speech: bool) -> Option<Utterance> {
        match self.phase {
            Phase::Idle => {
                if is_speech {
                    self.phase = Phase::Speaking;
                    self.silence_run = 0;
                    self.speech_frames = 1;
                    self.buffer.clear();
                    self.buffer.push(frame);
                }
                None
            }
            Phase::Speaking => {
                self.buffer.push(frame);
                if is_speech {
                    self.speech_frames += 1;
                    self.silence_run = 0;
                    return None;
                }
                self.silence_run += 1;
                if self.silence_run < self.silence_limit {
                    return None;
                }

                let qualified = self.speech_frames >= self.min_speech;
                let speech_frames = self.speech_frames;
                let frames = std::mem::take(&mut self.buffer);
                self.phase = Phase::Idle;
                self.silence_run = 0;
                self.speech_frames = 0;

                if qualified {
                    Some(Utterance::from_frames(frames, speech_frames))
                } else {
                    debug!(speech_frames, "speech burst too short, discarded as noise");
                    None
                }
            }
        }
    }

    pub fn is_speaking(&self) -> bool {
        self.phase == Phase::Speaking
    }
}

/// Mutex-guarded "user is speaking right now" flag, written by the
/// classification paths and read by playback-side pollers.
#[derive(Default)]
pub struct SpeakingFlag(Mutex<bool>);

impl SpeakingFlag {
    pub fn set(&self, speaking: bool) {
        if let Ok(mut guard) = self.0.lock() {
            *guard = speaking;
        }
    }

    pub fn get(&self) -> bool {
        self.0.lock().map(|guard| *guard).unwrap_or(false)
    }
}

/// Blocks the orchestration task until one utterance completes or the
/// session ends.
pub struct SpeechSegmenter {
    queue: Arc<FrameQueue>,
    classifier: SharedClassifier,
    speaking: Arc<SpeakingFlag>,
    listening: Arc<AtomicBool>,
    threshold: f32,
    poll: Duration,
    silence_limit: u32,
    min_speech: u32,
}

impl SpeechSegmenter {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        queue: Arc<FrameQueue>,
        classifier: SharedClassifier,
        speaking: Arc<SpeakingFlag>,
        listening: Arc<AtomicBool>,
        threshold: f32,
        poll: Duration,
        silence_limit: u32,
        min_speech: u32,
    ) -> Self {
        Self {
            queue,
            classifier,
            speaking,
            listening,
            threshold,
            poll,
            silence_limit,
            min_speech,
        }
    }

    /// Wait for the next complete utterance. Returns `None` when the
    /// listening flag clears — a session end, not a failed turn.
    ///
    /// The classifier is reset once per call; a classification failure on an
    /// individual frame downgrades that frame to non-speech.
    pub async fn wait_for_utterance(&self) -> Option<Utterance> {
        let mut detector = EndpointDetector::new(self.silence_limit, self.min_speech);
        if let Ok(mut classifier) = self.classifier.lock() {
            classifier.reset();
        }
        debug!("waiting for speech");

        while self.listening.load(Ordering::Relaxed) {
            let Some(frame) = self.queue.recv_timeout(self.poll).await else {
                continue;
            };

            let probability = match self.classifier.lock() {
                Ok(mut classifier) => match classifier.speech_probability(&frame) {
                    Ok(p) => p,
                    Err(e) => {
                        warn!(error = %e, "classification failed, treating frame as silence");
                        0.0
                    }
                },
                Err(_) => {
                    warn!("classifier lock poisoned, treating frame as silence");
                    0.0
                }
            };
            let is_speech = probability > self.threshold;

            let was_speaking = detector.is_speaking();
            if let Some(utterance) = detector.push(frame, is_speech) {
                self.speaking.set(false);
                info!(
                    duration_s = utterance.duration().as_secs_f32(),
                    speech_frames = utterance.speech_frames,
                    "utterance complete"
                );
                return Some(utterance);
            }
            if detector.is_speaking() != was_speaking {
                self.speaking.set(detector.is_speaking());
                if detector.is_speaking() {
                    debug!("speech detected");
                }
            }
        }

        self.speaking.set(false);
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::VoiceResult;
    use crate::vad::{shared_classifier, SpeechClassifier};

    fn frame(amplitude: f32) -> AudioFrame {
        AudioFrame::new(vec![amplitude; 512], 16000)
    }

    #[test]
    fn emits_one_utterance_with_trailing_silence() {
        let mut detector = EndpointDetector::new(25, 8);
        for _ in 0..60 {
            assert!(detector.push(frame(0.9), true).is_none());
        }
        let mut emitted = None;
        for i in 0..25 {
            let out = detector.push(frame(0.0), false);
            if i < 24 {
                assert!(out.is_none());
            } else {
                emitted = out;
            }
        }
        let utterance = emitted.expect("utterance at the silence threshold");
        assert_eq!(utterance.samples.len(), (60 + 25) * 512);
        assert_eq!(utterance.speech_frames, 60);
        assert_eq!(utterance.sample_rate, 16000);
        assert!(!detector.is_speaking());
    }

    #[test]
    fn short_burst_is_rejected_and_detector_reusable() {
        let mut detector = EndpointDetector::new(25, 8);
        for _ in 0..3 {
            detector.push(frame(0.9), true);
        }
        for _ in 0..25 {
            assert!(detector.push(frame(0.0), false).is_none());
        }
        assert!(!detector.is_speaking());

        // A qualifying burst afterwards still comes through.
        for _ in 0..10 {
            assert!(detector.push(frame(0.9), true).is_none());
        }
        let mut emitted = None;
        for _ in 0..25 {
            emitted = detector.push(frame(0.0), false).or(emitted);
        }
        assert!(emitted.is_some());
    }

    #[test]
    fn silence_alone_never_starts_buffering() {
        let mut detector = EndpointDetector::new(25, 8);
        for _ in 0..100 {
            assert!(detector.push(frame(0.0), false).is_none());
        }
        assert!(!detector.is_speaking());
    }

    /// Test double: reads the frame's first sample as the probability.
    struct AmplitudeClassifier;

    impl SpeechClassifier for AmplitudeClassifier {
        fn speech_probability(&mut self, frame: &AudioFrame) -> VoiceResult<f32> {
            Ok(frame.samples.first().copied().unwrap_or(0.0).abs())
        }

        fn reset(&mut self) {}
    }

    fn segmenter(
        queue: Arc<FrameQueue>,
        listening: Arc<AtomicBool>,
    ) -> SpeechSegmenter {
        SpeechSegmenter::new(
            queue,
            shared_classifier(AmplitudeClassifier),
            Arc::new(SpeakingFlag::default()),
            listening,
            0.5,
            Duration::from_millis(5),
            25,
            8,
        )
    }

    #[tokio::test]
    async fn sub_threshold_stream_yields_nothing_until_cancelled() {
        let queue = Arc::new(FrameQueue::new());
        let listening = Arc::new(AtomicBool::new(true));
        for _ in 0..40 {
            queue.push(frame(0.1));
        }

        let seg = segmenter(Arc::clone(&queue), Arc::clone(&listening));
        let waited =
            tokio::time::timeout(Duration::from_millis(100), seg.wait_for_utterance()).await;
        assert!(waited.is_err(), "no utterance should surface from silence");

        listening.store(false, Ordering::Relaxed);
        assert!(seg.wait_for_utterance().await.is_none());
    }

    #[tokio::test]
    async fn speech_then_silence_yields_one_utterance() {
        let queue = Arc::new(FrameQueue::new());
        let listening = Arc::new(AtomicBool::new(true));
        for _ in 0..60 {
            queue.push(frame(0.9));
        }
        for _ in 0..30 {
            queue.push(frame(0.1));
        }

        let seg = segmenter(Arc::clone(&queue), listening);
        let utterance = seg.wait_for_utterance().await.expect("one utterance");
        assert_eq!(utterance.speech_frames, 60);
        // 60 speech + 25 trailing silence frames of 32ms each.
        let secs = utterance.duration().as_secs_f32();
        assert!((2.6..=2.9).contains(&secs), "duration was {secs}");
        // The remaining silence frames stay queued for the next consumer.
        assert!(queue.try_recv().is_some());
    }
}
