//! Word-limit trimming service.
//!
//! The voice pipeline posts every generated response here before
//! synthesis. Responses at or under the word limit pass through
//! untouched (byte-for-byte); longer ones are cut to the first
//! `max_words` whitespace-delimited words, rejoined with single spaces.
//!
//! Wire contract (load-bearing, kept exactly compatible with the
//! original deployment): `POST /flask-api`, JSON body `{"text": ...}`,
//! response `200 {"message": ...}`. Malformed bodies get axum's non-200
//! rejection, which clients treat as a trim failure.

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Default maximum word count before trimming kicks in.
pub const DEFAULT_MAX_WORDS: usize = 150;

#[derive(Debug, Clone)]
pub struct TrimState {
    pub max_words: usize,
}

impl Default for TrimState {
    fn default() -> Self {
        Self {
            max_words: DEFAULT_MAX_WORDS,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct TrimRequest {
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct TrimResponse {
    pub message: String,
}

/// Trim `text` to its first `max_words` words. Texts within the limit are
/// returned unchanged, original whitespace included.
pub fn trim_words(text: &str, max_words: usize) -> String {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.len() <= max_words {
        return text.to_string();
    }
    words[..max_words].join(" ")
}

async fn trim_handler(
    State(state): State<TrimState>,
    Json(req): Json<TrimRequest>,
) -> Json<TrimResponse> {
    let message = trim_words(&req.text, state.max_words);
    debug!(
        in_words = req.text.split_whitespace().count(),
        out_words = message.split_whitespace().count(),
        "trim request served"
    );
    Json(TrimResponse { message })
}

/// Build the service router. Exposed so integration tests can mount the
/// real service in-process.
pub fn router(state: TrimState) -> Router {
    Router::new()
        .route("/flask-api", post(trim_handler))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_passes_through_unchanged() {
        let text = "hello   how are you";
        assert_eq!(trim_words(text, 150), text);
    }

    #[test]
    fn long_text_is_cut_to_limit() {
        let words: Vec<String> = (0..200).map(|i| format!("w{}", i)).collect();
        let text = words.join(" ");
        let out = trim_words(&text, 150);
        let out_words: Vec<&str> = out.split_whitespace().collect();
        assert_eq!(out_words.len(), 150);
        assert_eq!(out_words[0], "w0");
        assert_eq!(out_words[149], "w149");
    }

    #[test]
    fn exactly_at_limit_is_untouched() {
        let words: Vec<String> = (0..150).map(|i| format!("w{}", i)).collect();
        let text = words.join(" ");
        assert_eq!(trim_words(&text, 150), text);
    }

    #[test]
    fn empty_text_stays_empty() {
        assert_eq!(trim_words("", 150), "");
    }

    #[test]
    fn router_builds() {
        let _ = router(TrimState::default());
    }
}
