//! **Speech-to-Text** — convert buffered turn audio into text.
//!
//! `HttpStt` targets OpenAI-compatible transcription APIs (multipart WAV
//! upload); `PlaceholderStt` lets the pipeline run without credentials.
//! Failures surface as `AgentError::Stt` to the turn controller, which
//! aborts the current turn and keeps listening.

use crate::error::{AgentError, AgentResult};
use async_trait::async_trait;
use std::io::Write;
use std::time::Duration;

/// Backend for converting PCM to text.
#[async_trait]
pub trait SttEngine: Send + Sync {
    /// Transcribe one utterance. PCM is mono f32; return an empty string
    /// if nothing was recognized.
    async fn transcribe(&self, samples: &[f32], sample_rate: u32) -> AgentResult<String>;
}

/// Encode f32 PCM (mono) to 16-bit WAV bytes for API upload.
pub(crate) fn pcm_f32_to_wav(samples: &[f32], sample_rate: u32) -> Vec<u8> {
    let num_samples = samples.len();
    let data_len = num_samples * 2; // 16-bit = 2 bytes per sample
    let header_len = 44u32;
    let file_len = header_len + data_len as u32;

    let mut buf = Vec::with_capacity(44 + data_len);
    // RIFF header
    buf.write_all(b"RIFF").unwrap();
    buf.write_all(&(file_len - 8).to_le_bytes()).unwrap();
    buf.write_all(b"WAVE").unwrap();
    // fmt subchunk
    buf.write_all(b"fmt ").unwrap();
    buf.write_all(&16u32.to_le_bytes()).unwrap(); // subchunk1 size
    buf.write_all(&1u16.to_le_bytes()).unwrap(); // PCM
    buf.write_all(&1u16.to_le_bytes()).unwrap(); // mono
    buf.write_all(&sample_rate.to_le_bytes()).unwrap();
    buf.write_all(&(sample_rate * 2).to_le_bytes()).unwrap(); // byte rate
    buf.write_all(&2u16.to_le_bytes()).unwrap(); // block align
    buf.write_all(&16u16.to_le_bytes()).unwrap(); // bits per sample
    // data subchunk
    buf.write_all(b"data").unwrap();
    buf.write_all(&(data_len as u32).to_le_bytes()).unwrap();
    for &s in samples {
        let clamped = s.clamp(-1.0, 1.0);
        let i = (clamped * 32767.0).round() as i16;
        buf.write_all(&i.to_le_bytes()).unwrap();
    }
    buf
}

/// Placeholder STT: returns a fixed string. Use for driving the pipeline
/// without an API key.
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
impl SttEngine for PlaceholderStt {
    async fn transcribe(&self, samples: &[f32], sample_rate: u32) -> AgentResult<String> {
        if let Some(ref r) = self.response {
            return Ok(r.clone());
        }
        let secs = samples.len() as f32 / sample_rate as f32;
        Ok(format!(
            "[STT placeholder: {} samples, {:.1}s — configure a transcription API key]",
            samples.len(),
            secs
        ))
    }
}

/// Production STT backend: OpenAI-compatible transcription API.
#[derive(Debug, Clone)]
pub struct HttpStt {
    /// Base URL without trailing slash (e.g. https://api.openai.com/v1).
    pub base_url: String,
    /// Bearer API key.
    pub api_key: String,
    /// Model: whisper-1, gpt-4o-transcribe, etc.
    pub model: String,
    client: reqwest::Client,
}

impl HttpStt {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> AgentResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| AgentError::Stt(e.to_string()))?;
        Ok(Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
            client,
        })
    }
}

#[async_trait]
impl SttEngine for HttpStt {
    async fn transcribe(&self, samples: &[f32], sample_rate: u32) -> AgentResult<String> {
        if samples.is_empty() {
            return Ok(String::new());
        }
        let wav = pcm_f32_to_wav(samples, sample_rate);
        let url = format!(
            "{}/audio/transcriptions",
            self.base_url.trim_end_matches('/')
        );
        let part = reqwest::multipart::Part::bytes(wav)
            .file_name("audio.wav")
            .mime_str("audio/wav")
            .map_err(|e| AgentError::Stt(e.to_string()))?;
        let form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("model", self.model.clone());
        let res = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| AgentError::Stt(e.to_string()))?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(AgentError::Stt(format!("STT API error {}: {}", status, body)));
        }
        let json: serde_json::Value = res.json().await.map_err(|e| AgentError::Stt(e.to_string()))?;
        let text = json
            .get("text")
            .and_then(|t| t.as_str())
            .unwrap_or("")
            .trim()
            .to_string();
        Ok(text)
    }
}
