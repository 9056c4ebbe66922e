//! Error types for the voice loop.

use thiserror::Error;

/// Result type alias for voice operations.
pub type VoiceResult<T> = Result<T, VoiceError>;

/// Errors that can occur while running the voice loop.
///
/// Only `AudioDevice` raised during startup is treated as fatal; everything
/// else degrades the current turn and the session loop carries on.
#[derive(Error, Debug)]
pub enum VoiceError {
    #[error("audio device error: {0}")]
    AudioDevice(String),

    #[error("audio stream error: {0}")]
    AudioStream(String),

    #[error("speech classification error: {0}")]
    Classification(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("transcription error: {0}")]
    Transcription(String),

    #[error("synthesis error: {0}")]
    Synthesis(String),

    #[error("playback error: {0}")]
    Playback(String),

    #[error("dialogue backend error: {0}")]
    Dialogue(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<cpal::DevicesError> for VoiceError {
    fn from(err: cpal::DevicesError) -> Self {
        VoiceError::AudioDevice(err.to_string())
    }
}

impl From<cpal::DefaultStreamConfigError> for VoiceError {
    fn from(err: cpal::DefaultStreamConfigError) -> Self {
        VoiceError::AudioDevice(err.to_string())
    }
}

impl From<cpal::BuildStreamError> for VoiceError {
    fn from(err: cpal::BuildStreamError) -> Self {
        VoiceError::AudioStream(err.to_string())
    }
}

impl From<cpal::PlayStreamError> for VoiceError {
    fn from(err: cpal::PlayStreamError) -> Self {
        VoiceError::AudioStream(err.to_string())
    }
}
