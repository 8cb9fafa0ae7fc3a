//! Error types for the voice pipeline

use thiserror::Error;

/// Result type alias for pipeline operations
pub type AgentResult<T> = Result<T, AgentError>;

/// Errors that can occur in the conversation pipeline
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Audio device error: {0}")]
    AudioDevice(String),

    #[error("Audio stream error: {0}")]
    AudioStream(String),

    #[error("VAD error: {0}")]
    Vad(String),

    #[error("Transcription error: {0}")]
    Stt(String),

    #[error("Generation error: {0}")]
    Llm(String),

    #[error("Synthesis error: {0}")]
    Tts(String),

    #[error("Playback error: {0}")]
    Playback(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Participant disconnected")]
    ParticipantDisconnected,

    #[error("Channel send error: {0}")]
    ChannelSend(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl AgentError {
    /// Only configuration errors may abort the process; everything else is
    /// recovered at the turn boundary or ends the session gracefully.
    pub fn is_fatal(&self) -> bool {
        matches!(self, AgentError::Config(_))
    }
}

impl From<cpal::DevicesError> for AgentError {
    fn from(err: cpal::DevicesError) -> Self {
        AgentError::AudioDevice(err.to_string())
    }
}

impl From<cpal::DefaultStreamConfigError> for AgentError {
    fn from(err: cpal::DefaultStreamConfigError) -> Self {
        AgentError::AudioDevice(err.to_string())
    }
}

impl From<cpal::BuildStreamError> for AgentError {
    fn from(err: cpal::BuildStreamError) -> Self {
        AgentError::AudioStream(err.to_string())
    }
}

impl From<cpal::PlayStreamError> for AgentError {
    fn from(err: cpal::PlayStreamError) -> Self {
        AgentError::AudioStream(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_config_is_fatal() {
        assert!(AgentError::Config("missing key".into()).is_fatal());
        assert!(!AgentError::Llm("timeout".into()).is_fatal());
        assert!(!AgentError::ParticipantDisconnected.is_fatal());
    }
}
