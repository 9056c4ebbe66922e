//! Speech-to-text: convert an [`Utterance`] into a transcript.
//!
//! `HttpTranscriber` targets OpenAI-compatible `/audio/transcriptions`
//! endpoints; `PlaceholderStt` lets the loop run without credentials.

use crate::error::{VoiceError, VoiceResult};
use crate::segment::Utterance;
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

/// Transcription result. `language` is the engine's detection, if it reports one.
#[derive(Debug, Clone)]
pub struct Transcript {
    pub text: String,
    pub language: Option<String>,
}

/// External transcription engine.
#[async_trait]
pub trait TranscriptionEngine: Send + Sync {
    /// Transcribe one utterance. An empty string means nothing was understood.
    async fn transcribe(&self, utterance: &Utterance) -> VoiceResult<Transcript>;
}

/// Encode f32 mono PCM as 16-bit WAV bytes for API upload.
fn pcm_to_wav(samples: &[f32], sample_rate: u32) -> Vec<u8> {
    let data_len = (samples.len() * 2) as u32;
    let mut buf = Vec::with_capacity(44 + data_len as usize);

    buf.extend_from_slice(b"RIFF");
    buf.extend_from_slice(&(36 + data_len).to_le_bytes());
    buf.extend_from_slice(b"WAVE");
    buf.extend_from_slice(b"fmt ");
    buf.extend_from_slice(&16u32.to_le_bytes());
    buf.extend_from_slice(&1u16.to_le_bytes()); // PCM
    buf.extend_from_slice(&1u16.to_le_bytes()); // mono
    buf.extend_from_slice(&sample_rate.to_le_bytes());
    buf.extend_from_slice(&(sample_rate * 2).to_le_bytes()); // byte rate
    buf.extend_from_slice(&2u16.to_le_bytes()); // block align
    buf.extend_from_slice(&16u16.to_le_bytes()); // bits per sample
    buf.extend_from_slice(b"data");
    buf.extend_from_slice(&data_len.to_le_bytes());
    for &s in samples {
        let i = (s.clamp(-1.0, 1.0) * 32767.0).round() as i16;
        buf.extend_from_slice(&i.to_le_bytes());
    }
    buf
}

/// Placeholder STT: returns a fixed string. Use for wiring tests without an API key.
#[derive(Debug, Default)]
pub struct PlaceholderStt {
    /// If set, return this instead of the default message.
    pub response: Option<String>,
}

impl PlaceholderStt {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_response(s: impl Into<String>) -> Self {
        Self {
            response: Some(s.into()),
        }
    }
}

#[async_trait]
impl TranscriptionEngine for PlaceholderStt {
    async fn transcribe(&self, utterance: &Utterance) -> VoiceResult<Transcript> {
        let text = self.response.clone().unwrap_or_else(|| {
            format!(
                "[STT placeholder: {} samples, {:.1}s]",
                utterance.samples.len(),
                utterance.duration().as_secs_f32()
            )
        });
        Ok(Transcript {
            text,
            language: None,
        })
    }
}

/// Production STT: OpenAI-compatible transcription API.
///
/// Reads `STT_API_URL` (default `https://api.openai.com/v1`), `STT_API_KEY`,
/// and `STT_MODEL` (default `whisper-1`).
#[derive(Debug, Clone)]
pub struct HttpTranscriber {
    base_url: String,
    api_key: String,
    model: String,
    client: reqwest::Client,
}

impl HttpTranscriber {
    pub fn from_env() -> VoiceResult<Self> {
        let base_url =
            std::env::var("STT_API_URL").unwrap_or_else(|_| "https://api.openai.com/v1".into());
        let api_key = std::env::var("STT_API_KEY")
            .map_err(|_| VoiceError::Config("STT_API_KEY not set".into()))?;
        let model = std::env::var("STT_MODEL").unwrap_or_else(|_| "whisper-1".into());
        Self::new(base_url, api_key, model)
    }

    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> VoiceResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| VoiceError::Transcription(e.to_string()))?;
        Ok(Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
            client,
        })
    }
}

#[async_trait]
impl TranscriptionEngine for HttpTranscriber {
    async fn transcribe(&self, utterance: &Utterance) -> VoiceResult<Transcript> {
        if utterance.samples.is_empty() {
            return Ok(Transcript {
                text: String::new(),
                language: None,
            });
        }

        let wav = pcm_to_wav(&utterance.samples, utterance.sample_rate);
        let url = format!(
            "{}/audio/transcriptions",
            self.base_url.trim_end_matches('/')
        );
        let part = reqwest::multipart::Part::bytes(wav)
            .file_name("utterance.wav")
            .mime_str("audio/wav")
            .map_err(|e| VoiceError::Transcription(e.to_string()))?;
        let form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("model", self.model.clone())
            .text("response_format", "verbose_json");

        let res = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| VoiceError::Transcription(e.to_string()))?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(VoiceError::Transcription(format!(
                "STT API error {status}: {body}"
            )));
        }

        let json: serde_json::Value = res
            .json()
            .await
            .map_err(|e| VoiceError::Transcription(e.to_string()))?;
        let text = json
            .get("text")
            .and_then(|t| t.as_str())
            .unwrap_or("")
            .trim()
            .to_string();
        let language = json
            .get("language")
            .and_then(|l| l.as_str())
            .map(str::to_string);
        debug!(chars = text.len(), ?language, "transcription received");
        Ok(Transcript { text, language })
    }
}

/// Best available transcription engine: HTTP when `STT_API_KEY` is set,
/// placeholder otherwise.
pub fn best_available() -> VoiceResult<Box<dyn TranscriptionEngine>> {
    match HttpTranscriber::from_env() {
        Ok(http) => Ok(Box::new(http)),
        Err(_) => Ok(Box::new(PlaceholderStt::new())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn utterance(samples: Vec<f32>) -> Utterance {
        Utterance {
            samples,
            sample_rate: 16000,
            speech_frames: 1,
            captured_at: Utc::now(),
        }
    }

    #[test]
    fn wav_header_is_well_formed() {
        let wav = pcm_to_wav(&[0.0, 0.5, -0.5, 1.0], 16000);
        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(&wav[8..12], b"WAVE");
        assert_eq!(wav.len(), 44 + 8);
        // data length field
        assert_eq!(u32::from_le_bytes([wav[40], wav[41], wav[42], wav[43]]), 8);
        // full-scale sample clamps to i16 max
        assert_eq!(i16::from_le_bytes([wav[50], wav[51]]), i16::MAX);
    }

    #[tokio::test]
    async fn placeholder_reports_sample_count() {
        let stt = PlaceholderStt::new();
        let t = stt.transcribe(&utterance(vec![0.0; 480])).await.unwrap();
        assert!(t.text.contains("480"));
    }

    #[tokio::test]
    async fn placeholder_with_fixed_response() {
        let stt = PlaceholderStt::with_response("hello world");
        let t = stt.transcribe(&utterance(vec![])).await.unwrap();
        assert_eq!(t.text, "hello world");
        assert!(t.language.is_none());
    }
}
