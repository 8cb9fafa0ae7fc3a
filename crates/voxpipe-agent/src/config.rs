//! Pipeline configuration loaded from the environment.
//!
//! Binaries load `.env.local`/`.env` via dotenvy before calling
//! `from_env()`; the library itself never reads files. No ambient
//! globals: the structs are built once at startup and passed by
//! reference into the turn controller and post-processor.

use crate::error::{AgentError, AgentResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default trimming-capability endpoint (the Flask-compatible service).
pub const DEFAULT_TRIM_ENDPOINT: &str = "http://127.0.0.1:5000/flask-api";

fn default_min_endpointing() -> f32 {
    0.5
}

fn default_max_endpointing() -> f32 {
    5.0
}

fn default_true() -> bool {
    true
}

fn default_eou_threshold() -> f32 {
    0.7
}

fn default_sample_rate() -> u32 {
    16000
}

fn default_trim_endpoint() -> String {
    DEFAULT_TRIM_ENDPOINT.to_string()
}

fn default_system_prompt() -> String {
    "You are a voice assistant. Your interface with users is voice: \
     use short and concise responses, and avoid unpronounceable punctuation."
        .to_string()
}

fn default_greeting() -> String {
    "Hey, how can I help you today?".to_string()
}

/// Behavior of the conversation pipeline.
///
/// | Env | Default | Description |
/// |-----|---------|-------------|
/// | VOXPIPE_MIN_ENDPOINTING_DELAY | 0.5 | Seconds of silence before commit when the end-of-turn estimator is confident. |
/// | VOXPIPE_MAX_ENDPOINTING_DELAY | 5.0 | Absolute silence ceiling before commit regardless of confidence. |
/// | VOXPIPE_ALLOW_INTERRUPTIONS | true | User speech preempts generation and playback. |
/// | VOXPIPE_EOU_THRESHOLD | 0.7 | Estimator confidence at or above which the short delay applies. |
/// | VOXPIPE_TRIM_ENDPOINT | http://127.0.0.1:5000/flask-api | Trimming capability URL. |
/// | VOXPIPE_SAMPLE_RATE | 16000 | PCM sample rate for the whole pipeline. |
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_min_endpointing")]
    pub min_endpointing_delay: f32,
    #[serde(default = "default_max_endpointing")]
    pub max_endpointing_delay: f32,
    #[serde(default = "default_true")]
    pub allow_interruptions: bool,
    #[serde(default = "default_eou_threshold")]
    pub eou_threshold: f32,
    #[serde(default = "default_trim_endpoint")]
    pub trim_endpoint: String,
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
    #[serde(default = "default_greeting")]
    pub greeting: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            min_endpointing_delay: default_min_endpointing(),
            max_endpointing_delay: default_max_endpointing(),
            allow_interruptions: true,
            eou_threshold: default_eou_threshold(),
            trim_endpoint: default_trim_endpoint(),
            sample_rate: default_sample_rate(),
            system_prompt: default_system_prompt(),
            greeting: default_greeting(),
        }
    }
}

impl AgentConfig {
    /// Load from environment. Unset or unparsable values fall back to the
    /// defaults documented on the struct.
    pub fn from_env() -> AgentResult<Self> {
        let config = Self {
            min_endpointing_delay: env_f32("VOXPIPE_MIN_ENDPOINTING_DELAY", default_min_endpointing()),
            max_endpointing_delay: env_f32("VOXPIPE_MAX_ENDPOINTING_DELAY", default_max_endpointing()),
            allow_interruptions: env_bool("VOXPIPE_ALLOW_INTERRUPTIONS", true),
            eou_threshold: env_f32("VOXPIPE_EOU_THRESHOLD", default_eou_threshold()),
            trim_endpoint: env_string("VOXPIPE_TRIM_ENDPOINT", DEFAULT_TRIM_ENDPOINT),
            sample_rate: env_u32("VOXPIPE_SAMPLE_RATE", default_sample_rate()),
            system_prompt: env_string("VOXPIPE_SYSTEM_PROMPT", &default_system_prompt()),
            greeting: env_string("VOXPIPE_GREETING", &default_greeting()),
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the state machine cannot run with.
    pub fn validate(&self) -> AgentResult<()> {
        if self.min_endpointing_delay <= 0.0 || self.max_endpointing_delay <= 0.0 {
            return Err(AgentError::Config(
                "endpointing delays must be positive".to_string(),
            ));
        }
        if self.min_endpointing_delay > self.max_endpointing_delay {
            return Err(AgentError::Config(format!(
                "min_endpointing_delay ({}) must not exceed max_endpointing_delay ({})",
                self.min_endpointing_delay, self.max_endpointing_delay
            )));
        }
        if !(0.0..=1.0).contains(&self.eou_threshold) {
            return Err(AgentError::Config(format!(
                "eou_threshold must be within 0.0..=1.0, got {}",
                self.eou_threshold
            )));
        }
        if !matches!(self.sample_rate, 8000 | 16000 | 32000 | 48000) {
            return Err(AgentError::Config(format!(
                "sample_rate must be 8000, 16000, 32000, or 48000 Hz, got {}",
                self.sample_rate
            )));
        }
        if self.trim_endpoint.trim().is_empty() {
            return Err(AgentError::Config("trim_endpoint is empty".to_string()));
        }
        Ok(())
    }

    pub fn min_endpointing(&self) -> Duration {
        Duration::from_secs_f32(self.min_endpointing_delay)
    }

    pub fn max_endpointing(&self) -> Duration {
        Duration::from_secs_f32(self.max_endpointing_delay)
    }
}

/// Credentials and endpoints for the external engines. The LLM key is the
/// one required credential: without it the worker must not start.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Base URL without trailing slash (OpenAI-compatible).
    pub llm_api_url: String,
    pub llm_api_key: String,
    pub llm_model: String,

    pub stt_api_url: String,
    pub stt_api_key: Option<String>,
    pub stt_model: String,

    pub tts_api_url: String,
    pub tts_api_key: Option<String>,
    pub tts_model: String,
    pub tts_voice: String,
}

impl EngineConfig {
    /// Build from environment: `VOXPIPE_LLM_API_KEY` (or `GROQ_API_KEY` /
    /// `OPENAI_API_KEY`) is required; STT/TTS keys are optional and the
    /// worker falls back to placeholder engines without them.
    pub fn from_env() -> AgentResult<Self> {
        let llm_api_key = std::env::var("VOXPIPE_LLM_API_KEY")
            .or_else(|_| std::env::var("GROQ_API_KEY"))
            .or_else(|_| std::env::var("OPENAI_API_KEY"))
            .map_err(|_| {
                AgentError::Config(
                    "LLM requires VOXPIPE_LLM_API_KEY, GROQ_API_KEY, or OPENAI_API_KEY".to_string(),
                )
            })?;
        let llm_api_key = llm_api_key.trim().to_string();
        if llm_api_key.is_empty() {
            return Err(AgentError::Config("LLM API key is empty".to_string()));
        }

        Ok(Self {
            llm_api_url: env_string("VOXPIPE_LLM_API_URL", "https://api.groq.com/openai/v1"),
            llm_api_key,
            llm_model: env_string("VOXPIPE_LLM_MODEL", "llama-3.3-70b-versatile"),
            stt_api_url: env_string("VOXPIPE_STT_API_URL", "https://api.openai.com/v1"),
            stt_api_key: env_opt_string("VOXPIPE_STT_API_KEY"),
            stt_model: env_string("VOXPIPE_STT_MODEL", "whisper-1"),
            tts_api_url: env_string("VOXPIPE_TTS_API_URL", "https://api.openai.com/v1"),
            tts_api_key: env_opt_string("VOXPIPE_TTS_API_KEY"),
            tts_model: env_string("VOXPIPE_TTS_MODEL", "tts-1"),
            tts_voice: env_string("VOXPIPE_TTS_VOICE", "shimmer"),
        })
    }
}

fn env_bool(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(v) => matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        Err(_) => default,
    }
}

fn env_f32(key: &str, default: f32) -> f32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn env_string(key: &str, default: &str) -> String {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn env_opt_string(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_contract() {
        let c = AgentConfig::default();
        assert!((c.min_endpointing_delay - 0.5).abs() < 1e-6);
        assert!((c.max_endpointing_delay - 5.0).abs() < 1e-6);
        assert!(c.allow_interruptions);
        assert_eq!(c.trim_endpoint, "http://127.0.0.1:5000/flask-api");
        assert!(c.validate().is_ok());
    }

    #[test]
    fn rejects_inverted_delays() {
        let c = AgentConfig {
            min_endpointing_delay: 6.0,
            max_endpointing_delay: 5.0,
            ..Default::default()
        };
        assert!(c.validate().is_err());
    }

    #[test]
    fn rejects_unsupported_sample_rate() {
        let c = AgentConfig {
            sample_rate: 44100,
            ..Default::default()
        };
        assert!(c.validate().is_err());
    }

    #[test]
    fn durations_convert() {
        let c = AgentConfig::default();
        assert_eq!(c.min_endpointing(), Duration::from_millis(500));
        assert_eq!(c.max_endpointing(), Duration::from_secs(5));
    }
}
