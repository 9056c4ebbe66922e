//! Per-frame speech classification.
//!
//! The segmenter and the interruption monitor only ever see a probability in
//! [0, 1]; whatever smoothing the underlying engine does is its own business.
//! The production implementation wraps WebRTC VAD.

use crate::audio::AudioFrame;
use crate::error::{VoiceError, VoiceResult};
use std::sync::{Arc, Mutex};
use tracing::info;
use webrtc_vad::{SampleRate, Vad, VadMode};

/// External probability engine: frame in, speech probability out.
///
/// Implementations may keep internal smoothing state; `reset` is invoked once
/// at the start of each fresh listening episode.
pub trait SpeechClassifier {
    /// Speech probability for one frame, in [0, 1].
    fn speech_probability(&mut self, frame: &AudioFrame) -> VoiceResult<f32>;

    /// Drop any internal smoothing state.
    fn reset(&mut self);
}

/// Classifier shared between the segmentation path and the interruption
/// poller. The two phases alternate, so the lock is never contended.
pub type SharedClassifier = Arc<Mutex<Box<dyn SpeechClassifier>>>;

pub fn shared_classifier(classifier: impl SpeechClassifier + 'static) -> SharedClassifier {
    Arc::new(Mutex::new(Box::new(classifier)))
}

fn vad_mode(mode: u8) -> VadMode {
    match mode {
        0 => VadMode::Quality,
        1 => VadMode::LowBitrate,
        2 => VadMode::Aggressive,
        _ => VadMode::VeryAggressive,
    }
}

fn vad_rate(sample_rate: u32) -> VoiceResult<SampleRate> {
    match sample_rate {
        8000 => Ok(SampleRate::Rate8kHz),
        16000 => Ok(SampleRate::Rate16kHz),
        32000 => Ok(SampleRate::Rate32kHz),
        48000 => Ok(SampleRate::Rate48kHz),
        other => Err(VoiceError::Config(format!(
            "WebRTC VAD supports 8000/16000/32000/48000 Hz, got {other}"
        ))),
    }
}

/// WebRTC VAD behind the [`SpeechClassifier`] contract. The verdict is
/// boolean, mapped to probability 0.0 / 1.0.
pub struct WebRtcClassifier {
    vad: Vad,
    mode: u8,
    sample_rate: u32,
    frame_samples: usize,
}

impl WebRtcClassifier {
    /// `mode` 0-3, most aggressive last. Frame size must be 10, 20, or 30ms
    /// worth of samples at the given rate.
    pub fn new(sample_rate: u32, frame_samples: usize, mode: u8) -> VoiceResult<Self> {
        let rate = vad_rate(sample_rate)?;
        if mode > 3 {
            return Err(VoiceError::Config(format!("VAD mode must be 0-3, got {mode}")));
        }
        let frame_ms = frame_samples as u64 * 1000 / sample_rate as u64;
        if !matches!(frame_ms, 10 | 20 | 30)
            || frame_samples as u64 * 1000 % sample_rate as u64 != 0
        {
            return Err(VoiceError::Config(format!(
                "WebRTC VAD frames must be exactly 10/20/30ms; {frame_samples} samples at {sample_rate}Hz is not"
            )));
        }

        let mut vad = Vad::new();
        vad.set_mode(vad_mode(mode));
        vad.set_sample_rate(rate);
        info!(sample_rate, frame_samples, mode, "WebRTC VAD ready");

        Ok(Self {
            vad,
            mode,
            sample_rate,
            frame_samples,
        })
    }

    pub fn frame_samples(&self) -> usize {
        self.frame_samples
    }
}

impl SpeechClassifier for WebRtcClassifier {
    fn speech_probability(&mut self, frame: &AudioFrame) -> VoiceResult<f32> {
        if frame.samples.len() != self.frame_samples {
            return Err(VoiceError::Classification(format!(
                "expected {} samples, got {}",
                self.frame_samples,
                frame.samples.len()
            )));
        }
        if frame.sample_rate != self.sample_rate {
            return Err(VoiceError::Classification(format!(
                "expected {}Hz, got {}Hz",
                self.sample_rate, frame.sample_rate
            )));
        }

        let pcm: Vec<i16> = frame
            .samples
            .iter()
            .map(|&s| (s.clamp(-1.0, 1.0) * 32767.0) as i16)
            .collect();
        let is_speech = self
            .vad
            .is_voice_segment(&pcm)
            .map_err(|e| VoiceError::Classification(format!("VAD rejected frame: {e:?}")))?;
        Ok(if is_speech { 1.0 } else { 0.0 })
    }

    fn reset(&mut self) {
        // WebRTC VAD has no explicit reset; recreate the detector.
        let mut vad = Vad::new();
        vad.set_mode(vad_mode(self.mode));
        if let Ok(rate) = vad_rate(self.sample_rate) {
            vad.set_sample_rate(rate);
        }
        self.vad = vad;
    }
}
