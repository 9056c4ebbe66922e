//! Voice loop configuration, validated once at startup.
//!
//! Defaults follow the classic 16 kHz mono setup: 30 ms frames, 800 ms of
//! trailing silence to end a turn, 250 ms minimum speech to count as one.
//! Every knob can be overridden through `VOXLOOP_*` environment variables.

use crate::error::{VoiceError, VoiceResult};
use std::time::Duration;

/// Configuration for capture, segmentation, and playback polling.
#[derive(Debug, Clone)]
pub struct VoiceConfig {
    /// Sample rate in Hz (default: 16000).
    pub sample_rate: u32,

    /// Number of input channels (default: 1, mono).
    pub channels: u16,

    /// Samples per captured frame (default: 480 = 30ms at 16kHz, a WebRTC VAD frame).
    pub frame_samples: usize,

    /// Speech probability above this is classified as speech (default: 0.5).
    pub vad_threshold: f32,

    /// Trailing silence that ends an utterance, in milliseconds (default: 800).
    pub silence_ms: u64,

    /// Minimum total speech for a valid utterance, in milliseconds (default: 250).
    pub min_speech_ms: u64,

    /// Bounded wait per frame-queue poll while listening (default: 100ms).
    pub poll_interval: Duration,

    /// Interval between stop/interruption checks during playback (default: 50ms).
    pub playback_poll: Duration,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16000,
            channels: 1,
            frame_samples: 480,
            vad_threshold: 0.5,
            silence_ms: 800,
            min_speech_ms: 250,
            poll_interval: Duration::from_millis(100),
            playback_poll: Duration::from_millis(50),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

impl VoiceConfig {
    /// Defaults overridden by `VOXLOOP_SAMPLE_RATE`, `VOXLOOP_FRAME_SAMPLES`,
    /// `VOXLOOP_VAD_THRESHOLD`, `VOXLOOP_SILENCE_MS`, `VOXLOOP_MIN_SPEECH_MS`,
    /// `VOXLOOP_POLL_MS`, and `VOXLOOP_PLAYBACK_POLL_MS`.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Some(v) = env_parse("VOXLOOP_SAMPLE_RATE") {
            cfg.sample_rate = v;
        }
        if let Some(v) = env_parse("VOXLOOP_FRAME_SAMPLES") {
            cfg.frame_samples = v;
        }
        if let Some(v) = env_parse("VOXLOOP_VAD_THRESHOLD") {
            cfg.vad_threshold = v;
        }
        if let Some(v) = env_parse("VOXLOOP_SILENCE_MS") {
            cfg.silence_ms = v;
        }
        if let Some(v) = env_parse("VOXLOOP_MIN_SPEECH_MS") {
            cfg.min_speech_ms = v;
        }
        if let Some(v) = env_parse::<u64>("VOXLOOP_POLL_MS") {
            cfg.poll_interval = Duration::from_millis(v);
        }
        if let Some(v) = env_parse::<u64>("VOXLOOP_PLAYBACK_POLL_MS") {
            cfg.playback_poll = Duration::from_millis(v);
        }
        cfg
    }

    /// Duration of one frame in milliseconds.
    pub fn frame_ms(&self) -> u64 {
        self.frame_samples as u64 * 1000 / self.sample_rate as u64
    }

    /// Consecutive silence frames that end an utterance.
    pub fn silence_frames(&self) -> u32 {
        self.silence_ms.div_ceil(self.frame_ms()) as u32
    }

    /// Minimum speech frames for an utterance to qualify.
    pub fn min_speech_frames(&self) -> u32 {
        self.min_speech_ms.div_ceil(self.frame_ms()) as u32
    }

    /// Reject configurations the pipeline cannot run with.
    pub fn validate(&self) -> VoiceResult<()> {
        if self.sample_rate == 0 {
            return Err(VoiceError::Config("sample_rate must be non-zero".into()));
        }
        if self.channels == 0 {
            return Err(VoiceError::Config("channels must be non-zero".into()));
        }
        if self.frame_samples == 0 {
            return Err(VoiceError::Config("frame_samples must be non-zero".into()));
        }
        if self.frame_ms() == 0 {
            return Err(VoiceError::Config(format!(
                "frame of {} samples at {}Hz is shorter than 1ms",
                self.frame_samples, self.sample_rate
            )));
        }
        if !(0.0..=1.0).contains(&self.vad_threshold) {
            return Err(VoiceError::Config(format!(
                "vad_threshold must be within [0, 1], got {}",
                self.vad_threshold
            )));
        }
        if self.silence_ms < self.frame_ms() {
            return Err(VoiceError::Config(format!(
                "silence_ms ({}) is shorter than one frame ({}ms)",
                self.silence_ms,
                self.frame_ms()
            )));
        }
        if self.min_speech_ms == 0 {
            return Err(VoiceError::Config("min_speech_ms must be non-zero".into()));
        }
        if self.poll_interval.is_zero() || self.playback_poll.is_zero() {
            return Err(VoiceError::Config("poll intervals must be non-zero".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let cfg = VoiceConfig::default();
        cfg.validate().unwrap();
        assert_eq!(cfg.sample_rate, 16000);
        assert_eq!(cfg.frame_ms(), 30);
    }

    #[test]
    fn frame_thresholds_round_up() {
        // 512 samples at 16kHz = 32ms frames: 800ms -> 25, 250ms -> 8.
        let cfg = VoiceConfig {
            frame_samples: 512,
            ..Default::default()
        };
        assert_eq!(cfg.frame_ms(), 32);
        assert_eq!(cfg.silence_frames(), 25);
        assert_eq!(cfg.min_speech_frames(), 8);
    }

    #[test]
    fn rejects_bad_threshold() {
        let cfg = VoiceConfig {
            vad_threshold: 1.5,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_silence_shorter_than_frame() {
        let cfg = VoiceConfig {
            silence_ms: 10,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_zero_frame() {
        let cfg = VoiceConfig {
            frame_samples: 0,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }
}
