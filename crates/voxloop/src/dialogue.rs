//! Client for the text dialogue backend.
//!
//! One POST per turn; conversation continuity is carried by the session id
//! the backend returns, echoed back on the next call.

use crate::error::{VoiceError, VoiceResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// One backend reply.
#[derive(Debug, Clone)]
pub struct DialogueReply {
    pub reply: String,
    /// Session id to carry into the next turn.
    pub session_id: Option<String>,
    /// Optional gloss of the reply (the backend may answer in another
    /// language and attach a translation). Informational only.
    pub gloss: Option<String>,
}

/// External dialogue backend. Each call is independent; no streaming.
#[async_trait]
pub trait DialogueBackend: Send + Sync {
    async fn converse(
        &self,
        message: &str,
        session_id: Option<&str>,
    ) -> VoiceResult<DialogueReply>;
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    message: &'a str,
    session_id: Option<&'a str>,
}

#[derive(Deserialize)]
struct ChatResponse {
    reply: String,
    session_id: Option<String>,
    #[serde(default)]
    english_meaning: Option<String>,
}

/// HTTP dialogue backend speaking the `/api/chat` JSON contract.
#[derive(Debug, Clone)]
pub struct HttpDialogue {
    endpoint: String,
    client: reqwest::Client,
}

impl HttpDialogue {
    /// Reads `CHAT_API_URL` (default `http://localhost:8000/api/chat`) and
    /// `CHAT_API_TIMEOUT_SECS` (default 30).
    pub fn from_env() -> VoiceResult<Self> {
        let endpoint = std::env::var("CHAT_API_URL")
            .unwrap_or_else(|_| "http://localhost:8000/api/chat".into());
        let timeout = std::env::var("CHAT_API_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(30);
        Self::new(endpoint, Duration::from_secs(timeout))
    }

    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> VoiceResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| VoiceError::Dialogue(e.to_string()))?;
        Ok(Self {
            endpoint: endpoint.into(),
            client,
        })
    }
}

#[async_trait]
impl DialogueBackend for HttpDialogue {
    async fn converse(
        &self,
        message: &str,
        session_id: Option<&str>,
    ) -> VoiceResult<DialogueReply> {
        let res = self
            .client
            .post(&self.endpoint)
            .json(&ChatRequest {
                message,
                session_id,
            })
            .send()
            .await
            .map_err(|e| VoiceError::Dialogue(format!("request failed: {e}")))?;
        if !res.status().is_success() {
            return Err(VoiceError::Dialogue(format!(
                "backend returned {}",
                res.status()
            )));
        }

        let body: ChatResponse = res
            .json()
            .await
            .map_err(|e| VoiceError::Dialogue(format!("bad response body: {e}")))?;
        debug!(session_id = ?body.session_id, "dialogue reply received");
        Ok(DialogueReply {
            reply: body.reply,
            session_id: body.session_id,
            gloss: body.english_meaning,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_parses_with_and_without_gloss() {
        let full: ChatResponse = serde_json::from_str(
            r#"{"reply":"hi there","session_id":"s-1","english_meaning":"hello"}"#,
        )
        .unwrap();
        assert_eq!(full.reply, "hi there");
        assert_eq!(full.session_id.as_deref(), Some("s-1"));
        assert_eq!(full.english_meaning.as_deref(), Some("hello"));

        let bare: ChatResponse =
            serde_json::from_str(r#"{"reply":"hi","session_id":null}"#).unwrap();
        assert!(bare.session_id.is_none());
        assert!(bare.english_meaning.is_none());
    }

    #[test]
    fn request_serializes_null_session() {
        let json = serde_json::to_string(&ChatRequest {
            message: "hello",
            session_id: None,
        })
        .unwrap();
        assert_eq!(json, r#"{"message":"hello","session_id":null}"#);
    }
}
