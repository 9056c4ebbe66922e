//! Microphone capture and the shared frame queue.
//!
//! One cpal callback thread produces fixed-size [`AudioFrame`]s; a single
//! consumer (the segmenter while listening, the interruption monitor while a
//! reply plays) takes them in arrival order through [`FrameQueue`].

use crate::config::VoiceConfig;
use crate::error::{VoiceError, VoiceResult};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, Stream, StreamConfig};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// One fixed-length block of mono samples, a private copy owned by the queue.
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// PCM samples, f32 in -1.0..1.0.
    pub samples: Vec<f32>,
    /// Sample rate in Hz.
    pub sample_rate: u32,
}

impl AudioFrame {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// Wall-clock duration covered by this frame.
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.samples.len() as f64 / self.sample_rate as f64)
    }
}

/// Append-only / pop-only frame channel between the capture callback and the
/// orchestration side. The receiver sits behind a mutex so the segmenter and
/// the interruption monitor can share it; the two never run concurrently.
pub struct FrameQueue {
    tx: UnboundedSender<AudioFrame>,
    rx: Mutex<UnboundedReceiver<AudioFrame>>,
}

impl FrameQueue {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Mutex::new(rx),
        }
    }

    /// Append one frame. Called from the capture callback (and from tests).
    pub fn push(&self, frame: AudioFrame) {
        // The queue owns the receiver, so the send only fails on shutdown races.
        let _ = self.tx.send(frame);
    }

    /// Pop the next frame, waiting at most `wait`. `None` means the poll
    /// timed out; callers re-check their cancellation flag and poll again.
    pub async fn recv_timeout(&self, wait: Duration) -> Option<AudioFrame> {
        let mut rx = self.rx.lock().await;
        match tokio::time::timeout(wait, rx.recv()).await {
            Ok(frame) => frame,
            Err(_) => None,
        }
    }

    /// Non-blocking pop used by the interruption monitor.
    pub fn try_recv(&self) -> Option<AudioFrame> {
        let mut rx = self.rx.try_lock().ok()?;
        rx.try_recv().ok()
    }

    /// Discard everything buffered so the next listening episode starts empty.
    pub fn clear(&self) {
        if let Ok(mut rx) = self.rx.try_lock() {
            let mut dropped = 0usize;
            while rx.try_recv().is_ok() {
                dropped += 1;
            }
            if dropped > 0 {
                debug!(dropped, "cleared unconsumed audio frames");
            }
        }
    }
}

impl Default for FrameQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// Continuous microphone acquisition feeding the shared [`FrameQueue`].
///
/// `start()` is idempotent; `stop()` halts the stream and drains buffered
/// frames. Failing to open the device is fatal at startup, while mid-stream
/// callback errors are logged and capture continues best-effort.
pub struct AudioCapture {
    sample_rate: u32,
    channels: u16,
    frame_samples: usize,
    queue: Arc<FrameQueue>,
    stream: Option<Stream>,
}

impl AudioCapture {
    pub fn new(config: &VoiceConfig, queue: Arc<FrameQueue>) -> Self {
        Self {
            sample_rate: config.sample_rate,
            channels: config.channels,
            frame_samples: config.frame_samples,
            queue,
            stream: None,
        }
    }

    /// Open the default input device and begin pushing frames. Returns
    /// immediately if acquisition is already running.
    pub fn start(&mut self) -> VoiceResult<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        let device = cpal::default_host()
            .default_input_device()
            .ok_or_else(|| VoiceError::AudioDevice("no input device available".to_string()))?;
        info!(
            device = %device.name().unwrap_or_else(|_| "unknown".to_string()),
            "🎤 opening input device"
        );
        debug!(config = ?device.default_input_config()?, "device default input config");

        let stream_config = StreamConfig {
            channels: self.channels,
            sample_rate: SampleRate(self.sample_rate),
            buffer_size: cpal::BufferSize::Fixed(self.frame_samples as u32),
        };

        let frame_samples = self.frame_samples;
        let sample_rate = self.sample_rate;
        let queue = Arc::clone(&self.queue);
        let mut pending: Vec<f32> = Vec::with_capacity(frame_samples);

        let stream = device.build_input_stream(
            &stream_config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                // Device callbacks may deliver odd sizes; re-block into exact frames.
                for &sample in data {
                    pending.push(sample);
                    if pending.len() == frame_samples {
                        let samples = std::mem::replace(
                            &mut pending,
                            Vec::with_capacity(frame_samples),
                        );
                        queue.push(AudioFrame::new(samples, sample_rate));
                    }
                }
            },
            move |err| {
                // Log-and-continue policy for mid-stream device errors.
                warn!(error = %err, "audio stream error");
            },
            None,
        )?;
        stream.play()?;

        info!(
            sample_rate = self.sample_rate,
            frame_samples = self.frame_samples,
            "audio capture started"
        );
        self.stream = Some(stream);
        Ok(())
    }

    /// Stop acquisition and discard any frames nobody consumed.
    pub fn stop(&mut self) {
        if self.stream.take().is_some() {
            info!("audio capture stopped");
        }
        self.queue.clear();
    }

    pub fn is_running(&self) -> bool {
        self.stream.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_duration() {
        let frame = AudioFrame::new(vec![0.0; 512], 16000);
        assert_eq!(frame.duration(), Duration::from_millis(32));
    }

    #[tokio::test]
    async fn queue_preserves_order() {
        let queue = FrameQueue::new();
        queue.push(AudioFrame::new(vec![0.1], 16000));
        queue.push(AudioFrame::new(vec![0.2], 16000));

        let first = queue.recv_timeout(Duration::from_millis(10)).await.unwrap();
        let second = queue.try_recv().unwrap();
        assert!((first.samples[0] - 0.1).abs() < 1e-6);
        assert!((second.samples[0] - 0.2).abs() < 1e-6);
        assert!(queue.try_recv().is_none());
    }

    #[tokio::test]
    async fn recv_timeout_elapses_on_empty_queue() {
        let queue = FrameQueue::new();
        assert!(queue.recv_timeout(Duration::from_millis(5)).await.is_none());
    }

    #[tokio::test]
    async fn clear_discards_buffered_frames() {
        let queue = FrameQueue::new();
        for _ in 0..4 {
            queue.push(AudioFrame::new(vec![0.0; 8], 16000));
        }
        queue.clear();
        assert!(queue.try_recv().is_none());
    }
}
