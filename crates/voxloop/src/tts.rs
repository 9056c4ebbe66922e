//! Text-to-speech synthesis.
//!
//! `HttpSynthesizer` targets OpenAI-compatible `/audio/speech` endpoints and
//! asks for WAV so the playback decoder needs no extra codecs;
//! `PlaceholderTts` returns no audio, which playback treats as a silent
//! completed reply.

use crate::error::{VoiceError, VoiceResult};
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

/// External synthesis engine: text in, playable audio bytes out.
#[async_trait]
pub trait SynthesisEngine: Send + Sync {
    /// Synthesize `text`. An empty vec means nothing to play.
    async fn synthesize(&self, text: &str) -> VoiceResult<Vec<u8>>;
}

/// Placeholder TTS: returns empty audio so nothing plays.
#[derive(Debug, Default)]
pub struct PlaceholderTts;

#[async_trait]
impl SynthesisEngine for PlaceholderTts {
    async fn synthesize(&self, _text: &str) -> VoiceResult<Vec<u8>> {
        Ok(Vec::new())
    }
}

/// Production TTS: OpenAI-compatible speech API.
///
/// Reads `TTS_API_URL` (default `https://api.openai.com/v1`), `TTS_API_KEY`,
/// `TTS_MODEL` (default `tts-1`), and `TTS_VOICE` (default `shimmer`).
#[derive(Debug, Clone)]
pub struct HttpSynthesizer {
    base_url: String,
    api_key: String,
    model: String,
    voice: String,
    client: reqwest::Client,
}

impl HttpSynthesizer {
    pub fn from_env() -> VoiceResult<Self> {
        let base_url =
            std::env::var("TTS_API_URL").unwrap_or_else(|_| "https://api.openai.com/v1".into());
        let api_key = std::env::var("TTS_API_KEY")
            .map_err(|_| VoiceError::Config("TTS_API_KEY not set".into()))?;
        let model = std::env::var("TTS_MODEL").unwrap_or_else(|_| "tts-1".into());
        let voice = std::env::var("TTS_VOICE").unwrap_or_else(|_| "shimmer".into());
        Self::new(base_url, api_key, model, voice)
    }

    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        voice: impl Into<String>,
    ) -> VoiceResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| VoiceError::Synthesis(e.to_string()))?;
        Ok(Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
            voice: voice.into(),
            client,
        })
    }
}

#[async_trait]
impl SynthesisEngine for HttpSynthesizer {
    async fn synthesize(&self, text: &str) -> VoiceResult<Vec<u8>> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/audio/speech", self.base_url.trim_end_matches('/'));
        let body = serde_json::json!({
            "model": self.model,
            "input": text,
            "voice": self.voice,
            "response_format": "wav",
        });
        let res = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| VoiceError::Synthesis(e.to_string()))?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(VoiceError::Synthesis(format!(
                "TTS API error {status}: {body}"
            )));
        }

        let bytes = res
            .bytes()
            .await
            .map_err(|e| VoiceError::Synthesis(e.to_string()))?;
        debug!(bytes = bytes.len(), "synthesized reply audio");
        Ok(bytes.to_vec())
    }
}

/// Best available synthesis engine: HTTP when `TTS_API_KEY` is set,
/// placeholder otherwise.
pub fn best_available() -> VoiceResult<Box<dyn SynthesisEngine>> {
    match HttpSynthesizer::from_env() {
        Ok(http) => Ok(Box::new(http)),
        Err(_) => Ok(Box::new(PlaceholderTts)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn placeholder_returns_empty() {
        let tts = PlaceholderTts;
        assert!(tts.synthesize("hello").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn http_synthesizer_skips_blank_text() {
        let tts = HttpSynthesizer::new("http://localhost:1", "key", "tts-1", "shimmer").unwrap();
        assert!(tts.synthesize("   ").await.unwrap().is_empty());
    }
}
