//! Response post-processing: the length-trimming capability client.
//!
//! The fully drained generation text is posted to the external trimming
//! service once per turn; whatever comes back in `message` is what the
//! synthesizer will speak. Every failure mode — transport error, non-200
//! status, unparsable body, missing field — collapses into one fixed
//! fallback string and never reaches the turn controller as an error.
//! Single attempt, no retry: turn latency stays bounded.

use serde::Serialize;
use std::time::Duration;
use tracing::warn;

/// Spoken when the trimming capability misbehaves in any way.
pub const TRIM_FALLBACK: &str =
    "Something went wrong, i'm happy to give answer of any other question!";

#[derive(Serialize)]
struct TrimRequest<'a> {
    text: &'a str,
}

/// Client for the word-limit trimming capability.
#[derive(Debug, Clone)]
pub struct ResponseTrimmer {
    endpoint: String,
    client: reqwest::Client,
}

impl ResponseTrimmer {
    pub fn new(endpoint: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            endpoint: endpoint.into(),
            client,
        }
    }

    /// Post the full response text and return the text to synthesize.
    /// Infallible by contract: failures return the fixed fallback.
    ///
    /// The length check lives in the capability, not here — the full text
    /// is always forwarded.
    pub async fn process(&self, text: &str) -> String {
        let res = self
            .client
            .post(&self.endpoint)
            .json(&TrimRequest { text })
            .send()
            .await;

        let res = match res {
            Ok(r) => r,
            Err(e) => {
                warn!("trim capability unreachable: {}", e);
                return TRIM_FALLBACK.to_string();
            }
        };

        if res.status() != reqwest::StatusCode::OK {
            warn!("trim capability returned {}", res.status());
            return TRIM_FALLBACK.to_string();
        }

        let body: serde_json::Value = match res.json().await {
            Ok(v) => v,
            Err(e) => {
                warn!("trim capability body unparsable: {}", e);
                return TRIM_FALLBACK.to_string();
            }
        };

        match body.get("message").and_then(|m| m.as_str()) {
            Some(message) => message.to_string(),
            None => {
                warn!("trim capability response missing 'message'");
                TRIM_FALLBACK.to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unreachable_endpoint_falls_back() {
        // Nothing listens on this port.
        let trimmer = ResponseTrimmer::new("http://127.0.0.1:9/flask-api");
        let out = trimmer.process("hello how are you").await;
        assert_eq!(out, TRIM_FALLBACK);
    }
}
