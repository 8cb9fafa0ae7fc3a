//! **Response generation** — streamed text tokens from the conversation
//! history, with explicit cancellation.
//!
//! `HttpLlm` speaks the OpenAI-compatible `chat/completions` protocol
//! with `stream: true` and parses the SSE `data:` lines incrementally.
//! The controller never touches the wire: it owns a `GenerationStream`
//! handle and either drains it to completion or aborts it on barge-in.

use crate::chat::ChatTurn;
use crate::error::{AgentError, AgentResult};
use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Backend that streams response tokens for a conversation snapshot.
///
/// Implementations must stop producing promptly once `cancel` fires and
/// must not treat a closed `tokens` channel as an error (the consumer is
/// simply gone).
#[async_trait]
pub trait LlmEngine: Send + Sync {
    async fn stream_generate(
        &self,
        history: Vec<ChatTurn>,
        tokens: mpsc::Sender<String>,
        cancel: CancellationToken,
    ) -> AgentResult<()>;
}

/// In-flight, cancellable handle to one turn's token stream. At most one
/// exists at a time; the turn controller either drains it fully or aborts it.
pub struct GenerationStream {
    tokens: mpsc::Receiver<String>,
    cancel: CancellationToken,
    task: JoinHandle<AgentResult<()>>,
}

impl GenerationStream {
    /// Spawn the engine task for one turn and hand back the stream handle.
    pub fn open(engine: Arc<dyn LlmEngine>, history: Vec<ChatTurn>) -> Self {
        let (tx, rx) = mpsc::channel(32);
        let cancel = CancellationToken::new();
        let task_cancel = cancel.clone();
        let task = tokio::spawn(async move { engine.stream_generate(history, tx, task_cancel).await });
        Self {
            tokens: rx,
            cancel,
            task,
        }
    }

    /// Next token, or `None` once the stream is exhausted.
    pub async fn next_token(&mut self) -> Option<String> {
        self.tokens.recv().await
    }

    /// Await the engine task after the tokens ran dry; surfaces engine errors.
    pub async fn finish(self) -> AgentResult<()> {
        match self.task.await {
            Ok(res) => res,
            Err(e) => Err(AgentError::Llm(format!("generation task failed: {}", e))),
        }
    }

    /// Cancel and wait for the engine task to wind down. No orphaned work:
    /// after this returns, nothing is consuming the upstream connection.
    pub async fn abort(self) {
        self.cancel.cancel();
        let _ = self.task.await;
    }
}

// OpenAI-compatible streaming request/response
#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct StreamChunk {
    choices: Vec<StreamChoice>,
}

#[derive(Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Deserialize, Default)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

/// Production generation backend: OpenAI-compatible streaming chat API
/// (Groq, OpenAI, OpenRouter, etc.).
#[derive(Debug, Clone)]
pub struct HttpLlm {
    /// Base URL without trailing slash (e.g. https://api.groq.com/openai/v1).
    pub base_url: String,
    /// Bearer API key.
    pub api_key: String,
    /// Chat model id.
    pub model: String,
    client: reqwest::Client,
}

impl HttpLlm {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> AgentResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| AgentError::Llm(e.to_string()))?;
        Ok(Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
            client,
        })
    }
}

#[async_trait]
impl LlmEngine for HttpLlm {
    async fn stream_generate(
        &self,
        history: Vec<ChatTurn>,
        tokens: mpsc::Sender<String>,
        cancel: CancellationToken,
    ) -> AgentResult<()> {
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let body = ChatRequest {
            model: self.model.clone(),
            messages: history
                .into_iter()
                .map(|t| ChatMessage {
                    role: t.role.as_str().to_string(),
                    content: t.text,
                })
                .collect(),
            stream: true,
            temperature: None,
        };

        let res = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| AgentError::Llm(format!("chat request failed: {}", e)))?;

        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(AgentError::Llm(format!("chat API error {}: {}", status, body)));
        }

        let mut stream = res.bytes_stream();
        let mut line_buf = String::new();

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                chunk = stream.next() => match chunk {
                    Some(Ok(bytes)) => {
                        line_buf.push_str(&String::from_utf8_lossy(&bytes));
                        while let Some(pos) = line_buf.find('\n') {
                            let line: String = line_buf.drain(..=pos).collect();
                            let line = line.trim();
                            let Some(payload) = line.strip_prefix("data:") else {
                                continue;
                            };
                            let payload = payload.trim();
                            if payload == "[DONE]" {
                                return Ok(());
                            }
                            // Malformed events (keep-alives, partial server
                            // hiccups) are skipped rather than fatal.
                            let Ok(parsed) = serde_json::from_str::<StreamChunk>(payload) else {
                                continue;
                            };
                            let delta = parsed
                                .choices
                                .into_iter()
                                .next()
                                .and_then(|c| c.delta.content);
                            if let Some(text) = delta {
                                if !text.is_empty() && tokens.send(text).await.is_err() {
                                    return Ok(());
                                }
                            }
                        }
                    }
                    Some(Err(e)) => {
                        return Err(AgentError::Llm(format!("stream read failed: {}", e)));
                    }
                    None => return Ok(()),
                },
            }
        }
    }
}

/// Placeholder generator: streams a canned sentence word by word. Use for
/// driving the pipeline without an API key.
#[derive(Debug, Default)]
pub struct PlaceholderLlm {
    /// If set, stream this instead of the default message.
    pub response: Option<String>,
}

impl PlaceholderLlm {
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
impl LlmEngine for PlaceholderLlm {
    async fn stream_generate(
        &self,
        _history: Vec<ChatTurn>,
        tokens: mpsc::Sender<String>,
        cancel: CancellationToken,
    ) -> AgentResult<()> {
        let text = self
            .response
            .clone()
            .unwrap_or_else(|| "I am running without a language model right now.".to_string());
        for word in text.split_whitespace() {
            tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                _ = tokio::time::sleep(Duration::from_millis(20)) => {}
            }
            if tokens.send(format!("{} ", word)).await.is_err() {
                return Ok(());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn placeholder_streams_all_words() {
        let llm = Arc::new(PlaceholderLlm::with_response("one two three"));
        let mut stream = GenerationStream::open(llm, Vec::new());

        let mut text = String::new();
        while let Some(tok) = stream.next_token().await {
            text.push_str(&tok);
        }
        stream.finish().await.unwrap();
        assert_eq!(text.trim(), "one two three");
    }

    #[tokio::test]
    async fn abort_stops_token_production() {
        let llm = Arc::new(PlaceholderLlm::with_response(
            "a very long response with many words to stream out slowly",
        ));
        let mut stream = GenerationStream::open(llm, Vec::new());

        // Take one token, then cancel mid-stream.
        let first = stream.next_token().await;
        assert!(first.is_some());
        stream.abort().await;
    }
}
