//! **Text-to-Speech** — turn finalized text into PCM for playout.
//!
//! `HttpTts` targets OpenAI-compatible speech APIs and decodes the
//! returned container (WAV/MP3) to mono f32 PCM; `PlaceholderTts`
//! produces paced silence so the pipeline can run without credentials.
//! Synthesis only ever sees text the post-processor has finalized.

use crate::error::{AgentError, AgentResult};
use async_trait::async_trait;
use rodio::Source;
use std::io::Cursor;
use std::time::Duration;

/// One utterance worth of PCM, ready to be framed for playout.
#[derive(Debug, Clone)]
pub struct SynthesizedAudio {
    /// Mono samples (f32, -1.0..1.0).
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl SynthesizedAudio {
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.samples.len() as f64 / self.sample_rate as f64)
    }
}

/// Backend that turns text into PCM audio.
#[async_trait]
pub trait TtsEngine: Send + Sync {
    /// Synthesize text. Return empty samples to skip playback.
    async fn synthesize(&self, text: &str) -> AgentResult<SynthesizedAudio>;
}

/// Placeholder TTS: emits silence paced at roughly speaking speed, so
/// turn timing and interruption behave as they would with real audio.
#[derive(Debug, Clone)]
pub struct PlaceholderTts {
    pub sample_rate: u32,
    /// Seconds of audio per word (default 0.35).
    pub secs_per_word: f32,
}

impl Default for PlaceholderTts {
    fn default() -> Self {
        Self {
            sample_rate: 16000,
            secs_per_word: 0.35,
        }
    }
}

impl PlaceholderTts {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            ..Default::default()
        }
    }
}

#[async_trait]
impl TtsEngine for PlaceholderTts {
    async fn synthesize(&self, text: &str) -> AgentResult<SynthesizedAudio> {
        let words = text.split_whitespace().count();
        let n = (words as f32 * self.secs_per_word * self.sample_rate as f32) as usize;
        Ok(SynthesizedAudio {
            samples: vec![0.0; n],
            sample_rate: self.sample_rate,
        })
    }
}

/// Production TTS backend: OpenAI-compatible speech API.
#[derive(Debug, Clone)]
pub struct HttpTts {
    /// Base URL without trailing slash (e.g. https://api.openai.com/v1).
    pub base_url: String,
    /// Bearer API key.
    pub api_key: String,
    /// TTS model: tts-1 (fast) or tts-1-hd (higher quality).
    pub model: String,
    /// Voice id (alloy, echo, fable, onyx, nova, shimmer, ...).
    pub voice: String,
    client: reqwest::Client,
}

impl HttpTts {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        voice: impl Into<String>,
    ) -> AgentResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| AgentError::Tts(e.to_string()))?;
        Ok(Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
            voice: voice.into(),
            client,
        })
    }

    /// Decode a WAV/MP3 body to mono f32 PCM.
    fn decode(bytes: Vec<u8>) -> AgentResult<SynthesizedAudio> {
        let cursor = Cursor::new(bytes);
        let decoder = rodio::Decoder::new(cursor)
            .map_err(|e| AgentError::Tts(format!("decode failed: {}", e)))?;
        let channels = decoder.channels() as usize;
        let sample_rate = decoder.sample_rate();
        let interleaved: Vec<f32> = decoder.convert_samples::<f32>().collect();

        let samples = if channels <= 1 {
            interleaved
        } else {
            // Downmix interleaved channels to mono.
            interleaved
                .chunks(channels)
                .map(|frame| frame.iter().sum::<f32>() / channels as f32)
                .collect()
        };

        Ok(SynthesizedAudio {
            samples,
            sample_rate,
        })
    }
}

#[async_trait]
impl TtsEngine for HttpTts {
    async fn synthesize(&self, text: &str) -> AgentResult<SynthesizedAudio> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(SynthesizedAudio {
                samples: Vec::new(),
                sample_rate: 16000,
            });
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
            .map_err(|e| AgentError::Tts(e.to_string()))?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(AgentError::Tts(format!("TTS API error {}: {}", status, body)));
        }
        let bytes = res.bytes().await.map_err(|e| AgentError::Tts(e.to_string()))?;
        Self::decode(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stt::pcm_f32_to_wav;

    #[tokio::test]
    async fn placeholder_paces_by_word_count() {
        let tts = PlaceholderTts::new(16000);
        let audio = tts.synthesize("one two three four").await.unwrap();
        let expected = (4.0 * 0.35 * 16000.0) as usize;
        assert_eq!(audio.samples.len(), expected);
        assert!((audio.duration().as_secs_f32() - 1.4).abs() < 0.01);
    }

    #[tokio::test]
    async fn placeholder_empty_text_is_empty_audio() {
        let tts = PlaceholderTts::default();
        let audio = tts.synthesize("").await.unwrap();
        assert!(audio.samples.is_empty());
    }

    #[test]
    fn decode_roundtrips_wav() {
        let pcm = vec![0.0f32, 0.25, -0.25, 0.5];
        let wav = pcm_f32_to_wav(&pcm, 16000);
        let audio = HttpTts::decode(wav).unwrap();
        assert_eq!(audio.sample_rate, 16000);
        assert_eq!(audio.samples.len(), 4);
    }
}
