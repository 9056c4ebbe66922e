//! # Voxloop - Voice Turn-Taking Loop
//!
//! Real-time voice conversation plumbing: microphone capture, VAD-driven
//! utterance segmentation, speech-to-text, a text dialogue backend, and
//! interruptible reply playback, orchestrated as a strict turn loop.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      Turn Orchestrator                        │
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────┐       │
//! │  │   Audio In   │→ │  VAD gate    │→ │  Segmenter   │       │
//! │  │    (cpal)    │  │ (webrtc-vad) │  │ (800ms gap)  │       │
//! │  └──────────────┘  └──────────────┘  └──────┬───────┘       │
//! │         ↓                                    ↓               │
//! │  ┌──────────────┐                   ┌──────────────┐        │
//! │  │  Audio Out   │←──────────────────│  STT → Chat  │        │
//! │  │   (rodio)    │   Barge-in stop   │   (reqwest)  │        │
//! │  └──────────────┘                   └──────────────┘        │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! While a reply plays, the same frame queue feeds the interruption monitor:
//! one detected speech frame cuts playback and hands the turn back to the
//! user.

pub mod audio;
pub mod config;
pub mod dialogue;
pub mod error;
pub mod monitor;
pub mod orchestrator;
pub mod playback;
pub mod segment;
pub mod stt;
pub mod tts;
pub mod vad;

pub use audio::{AudioCapture, AudioFrame, FrameQueue};
pub use config::VoiceConfig;
pub use dialogue::{DialogueBackend, DialogueReply, HttpDialogue};
pub use error::{VoiceError, VoiceResult};
pub use monitor::InterruptionMonitor;
pub use orchestrator::{SessionStats, TurnOrchestrator, TurnOutcome};
pub use playback::{
    AudioPlayer, PlaybackController, PlaybackHandle, PlaybackStatus, RodioPlayer,
};
pub use segment::{EndpointDetector, SpeakingFlag, SpeechSegmenter, Utterance};
pub use stt::{HttpTranscriber, PlaceholderStt, Transcript, TranscriptionEngine};
pub use tts::{HttpSynthesizer, PlaceholderTts, SynthesisEngine};
pub use vad::{shared_classifier, SharedClassifier, SpeechClassifier, WebRtcClassifier};
