//! Barge-in detection while a reply is playing.

use crate::audio::FrameQueue;
use crate::segment::SpeakingFlag;
use crate::vad::SharedClassifier;
use std::sync::Arc;
use tracing::debug;

/// One-shot speech gate polled by the playback loop. No state machine: each
/// poll classifies at most one queued frame and compares it to the threshold.
pub struct InterruptionMonitor {
    queue: Arc<FrameQueue>,
    classifier: SharedClassifier,
    speaking: Arc<SpeakingFlag>,
    threshold: f32,
}

impl InterruptionMonitor {
    pub fn new(
        queue: Arc<FrameQueue>,
        classifier: SharedClassifier,
        speaking: Arc<SpeakingFlag>,
        threshold: f32,
    ) -> Self {
        Self {
            queue,
            classifier,
            speaking,
            threshold,
        }
    }

    /// Non-blocking check for user speech. An empty queue is not an error;
    /// it simply means no signal this poll.
    pub fn poll(&self) -> bool {
        let Some(frame) = self.queue.try_recv() else {
            return false;
        };
        let probability = match self.classifier.lock() {
            Ok(mut classifier) => match classifier.speech_probability(&frame) {
                Ok(p) => p,
                Err(e) => {
                    debug!(error = %e, "interruption check could not classify frame");
                    return false;
                }
            },
            Err(_) => return false,
        };
        if probability > self.threshold {
            self.speaking.set(true);
            return true;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::AudioFrame;
    use crate::error::VoiceResult;
    use crate::vad::{shared_classifier, SpeechClassifier};

    struct AmplitudeClassifier;

    impl SpeechClassifier for AmplitudeClassifier {
        fn speech_probability(&mut self, frame: &AudioFrame) -> VoiceResult<f32> {
            Ok(frame.samples.first().copied().unwrap_or(0.0).abs())
        }

        fn reset(&mut self) {}
    }

    fn monitor(queue: Arc<FrameQueue>, speaking: Arc<SpeakingFlag>) -> InterruptionMonitor {
        InterruptionMonitor::new(queue, shared_classifier(AmplitudeClassifier), speaking, 0.5)
    }

    #[test]
    fn empty_queue_reports_no_interruption() {
        let queue = Arc::new(FrameQueue::new());
        let speaking = Arc::new(SpeakingFlag::default());
        assert!(!monitor(queue, Arc::clone(&speaking)).poll());
        assert!(!speaking.get());
    }

    #[test]
    fn speech_frame_reports_interruption_and_marks_speaking() {
        let queue = Arc::new(FrameQueue::new());
        let speaking = Arc::new(SpeakingFlag::default());
        queue.push(AudioFrame::new(vec![0.9; 512], 16000));

        assert!(monitor(Arc::clone(&queue), Arc::clone(&speaking)).poll());
        assert!(speaking.get());
    }

    #[test]
    fn silence_frame_is_consumed_without_interruption() {
        let queue = Arc::new(FrameQueue::new());
        let speaking = Arc::new(SpeakingFlag::default());
        queue.push(AudioFrame::new(vec![0.1; 512], 16000));

        let m = monitor(Arc::clone(&queue), speaking);
        assert!(!m.poll());
        assert!(queue.try_recv().is_none(), "frame was consumed by the poll");
    }
}
