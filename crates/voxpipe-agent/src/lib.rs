//! # Voxpipe Agent - Real-Time Conversation Pipeline
//!
//! This crate implements the conversation pipeline controller for a
//! spoken-dialogue agent: voice activity detection, end-of-utterance
//! decisioning, streamed text generation, response trimming, synthesis
//! playout, and barge-in.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                       Turn Controller                            │
//! │  ┌───────────┐  ┌─────────────┐  ┌─────────────┐  ┌──────────┐  │
//! │  │ Audio In  │→ │ WebRTC VAD  │→ │ End-of-Turn │→ │ STT      │  │
//! │  │ (cpal)    │  │ + Segmenter │  │ Estimator   │  │ (HTTP)   │  │
//! │  └───────────┘  └─────────────┘  └─────────────┘  └──────────┘  │
//! │        ↓ barge-in                                      ↓         │
//! │  ┌───────────┐  ┌─────────────┐  ┌─────────────┐  ┌──────────┐  │
//! │  │ Audio Out │← │ SpeechHandle│← │ Trimmer     │← │ LLM      │  │
//! │  │ (rodio)   │  │ (cancel)    │  │ (/flask-api)│  │ (stream) │  │
//! │  └───────────┘  └─────────────┘  └─────────────┘  └──────────┘  │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The controller serializes all state transitions; adapters run as
//! cancellable tasks. User speech detected while the assistant is
//! generating or speaking preempts the current output and returns the
//! pipeline to transcription.

pub mod audio;
pub mod chat;
pub mod config;
pub mod eou;
pub mod error;
pub mod llm;
pub mod metrics;
pub mod session;
pub mod speech;
pub mod stt;
pub mod transport;
pub mod trim;
pub mod tts;
pub mod turn;
pub mod vad;

pub use audio::{AudioCapture, AudioConfig, AudioFrame};
pub use chat::{ChatRole, ChatTurn, ConversationContext};
pub use config::{AgentConfig, EngineConfig, DEFAULT_TRIM_ENDPOINT};
pub use eou::{EndpointDecision, EndpointEstimator};
pub use error::{AgentError, AgentResult};
pub use llm::{GenerationStream, HttpLlm, LlmEngine, PlaceholderLlm};
pub use metrics::{MetricsEvent, SessionSummary, UsageCollector, UsageRecord};
pub use session::{Session, ShutdownCallback};
pub use speech::SpeechHandle;
pub use stt::{HttpStt, PlaceholderStt, SttEngine};
pub use transport::{AudioSink, LocalTransport, Participant, RoomTransport};
pub use trim::{ResponseTrimmer, TRIM_FALLBACK};
pub use tts::{HttpTts, PlaceholderTts, SynthesizedAudio, TtsEngine};
pub use turn::{EngineSet, TurnController, TurnState, FALLBACK_UTTERANCE};
pub use vad::{spawn_vad_task, SpeechEvent, SpeechSegmenter, VadConfig, VadDetector};
