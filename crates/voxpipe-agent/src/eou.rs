//! End-of-turn estimation.
//!
//! Given the rolling transcript of the current utterance and the silence
//! observed so far, decide whether the user is done. The estimator is
//! side-effect-free and keeps no state across turns; the controller maps
//! its confidence onto the short (`min_endpointing_delay`) or long
//! (`max_endpointing_delay`) silence budget.

use std::time::Duration;

/// Trailing words that usually mean the speaker intends to continue.
const CONTINUATION_WORDS: &[&str] = &[
    "and", "but", "or", "so", "because", "um", "uh", "like", "then", "with", "to", "the", "a",
];

/// Outcome of one estimation: commit now (against the short budget) and
/// how confident the estimator is that the turn is complete.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EndpointDecision {
    pub commit: bool,
    pub confidence: f32,
}

/// Confidence-weighted end-of-turn decisioning over transcript shape.
#[derive(Debug, Clone)]
pub struct EndpointEstimator {
    threshold: f32,
}

impl EndpointEstimator {
    pub fn new(threshold: f32) -> Self {
        Self { threshold }
    }

    /// Estimate whether the utterance is complete. Longer silence nudges
    /// the confidence up, but never past the hard ceiling the controller
    /// enforces with `max_endpointing_delay`.
    pub fn estimate(&self, transcript: &str, silence: Duration) -> EndpointDecision {
        let mut confidence = transcript_confidence(transcript);

        // Sustained silence is itself weak evidence of completion.
        if silence >= Duration::from_secs(2) {
            confidence = (confidence + 0.15).min(1.0);
        }

        EndpointDecision {
            commit: confidence >= self.threshold,
            confidence,
        }
    }
}

fn transcript_confidence(transcript: &str) -> f32 {
    let trimmed = transcript.trim();
    if trimmed.is_empty() {
        return 0.0;
    }

    if trimmed.ends_with(['.', '!', '?']) {
        return 0.9;
    }
    if trimmed.ends_with(',') {
        return 0.2;
    }

    let last_word = trimmed
        .rsplit(char::is_whitespace)
        .next()
        .unwrap_or("")
        .trim_matches(|c: char| !c.is_alphanumeric())
        .to_ascii_lowercase();
    if CONTINUATION_WORDS.contains(&last_word.as_str()) {
        return 0.2;
    }

    // Very short fragments are often false starts.
    if trimmed.split_whitespace().count() < 2 {
        return 0.5;
    }

    0.75
}

#[cfg(test)]
mod tests {
    use super::*;

    fn estimator() -> EndpointEstimator {
        EndpointEstimator::new(0.7)
    }

    #[test]
    fn terminal_punctuation_commits() {
        let d = estimator().estimate("how are you doing today?", Duration::ZERO);
        assert!(d.commit);
        assert!(d.confidence >= 0.9);
    }

    #[test]
    fn trailing_connective_defers() {
        let d = estimator().estimate("i wanted to ask about the weather and", Duration::ZERO);
        assert!(!d.commit);
        assert!(d.confidence < 0.5);
    }

    #[test]
    fn empty_transcript_never_commits() {
        let d = estimator().estimate("   ", Duration::from_secs(3));
        assert!(!d.commit);
        assert_eq!(d.confidence, 0.15);
    }

    #[test]
    fn plain_sentence_commits_without_punctuation() {
        let d = estimator().estimate("tell me a joke", Duration::ZERO);
        assert!(d.commit);
    }

    #[test]
    fn long_silence_lifts_borderline_confidence() {
        let est = estimator();
        let short = est.estimate("well I think", Duration::ZERO);
        let long = est.estimate("well I think", Duration::from_secs(3));
        assert!(long.confidence > short.confidence);
    }

    #[test]
    fn stateless_across_calls() {
        let est = estimator();
        let a = est.estimate("tell me a joke", Duration::ZERO);
        est.estimate("and then he said", Duration::ZERO);
        let b = est.estimate("tell me a joke", Duration::ZERO);
        assert_eq!(a, b);
    }
}
