//! Per-turn metrics collection and the end-of-session usage summary.
//!
//! The turn controller publishes `MetricsEvent`s on a channel as a side
//! effect of every state transition and stage completion; a single
//! collector task appends them into per-turn records and produces one
//! `SessionSummary` at teardown. Nothing here touches conversation state.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

/// Events published by the turn controller.
#[derive(Debug, Clone)]
pub enum MetricsEvent {
    /// A state transition (phase name + timestamp).
    PhaseChanged {
        turn_id: u64,
        phase: &'static str,
        at: DateTime<Utc>,
    },
    TranscriptionComplete {
        turn_id: u64,
        audio_secs: f32,
        latency: Duration,
    },
    GenerationComplete {
        turn_id: u64,
        tokens: u32,
        latency: Duration,
        cancelled: bool,
    },
    PostProcessComplete {
        turn_id: u64,
        latency: Duration,
        fallback: bool,
    },
    SynthesisComplete {
        turn_id: u64,
        audio_secs: f32,
        latency: Duration,
        interrupted: bool,
    },
    StageError {
        turn_id: u64,
        stage: &'static str,
        message: String,
    },
}

/// Append-only counters for one turn.
#[derive(Debug, Clone, Default)]
pub struct UsageRecord {
    /// Phase names in transition order, with timestamps.
    pub phases: Vec<(&'static str, DateTime<Utc>)>,
    pub stt_audio_secs: f32,
    pub stt_latency: Duration,
    pub llm_tokens: u32,
    pub llm_latency: Duration,
    pub generation_cancelled: bool,
    pub postprocess_latency: Duration,
    pub postprocess_fallback: bool,
    pub tts_audio_secs: f32,
    pub tts_latency: Duration,
    pub synthesis_interrupted: bool,
    pub errors: u32,
}

/// Aggregated usage for the whole session, flushed once at shutdown.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionSummary {
    pub turns: u64,
    pub llm_tokens: u64,
    pub stt_audio_secs: f32,
    pub tts_audio_secs: f32,
    pub interruptions: u64,
    pub trim_fallbacks: u64,
    pub errors: u64,
}

impl fmt::Display for SessionSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} turns, {} generated tokens, {:.1}s transcribed, {:.1}s synthesized, \
             {} interruptions, {} trim fallbacks, {} errors",
            self.turns,
            self.llm_tokens,
            self.stt_audio_secs,
            self.tts_audio_secs,
            self.interruptions,
            self.trim_fallbacks,
            self.errors
        )
    }
}

/// Append-only store of per-turn records, keyed by turn id.
#[derive(Debug, Default)]
pub struct UsageCollector {
    records: BTreeMap<u64, UsageRecord>,
}

impl UsageCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn collect(&mut self, event: &MetricsEvent) {
        match event {
            MetricsEvent::PhaseChanged { turn_id, phase, at } => {
                self.record(*turn_id).phases.push((phase, *at));
            }
            MetricsEvent::TranscriptionComplete {
                turn_id,
                audio_secs,
                latency,
            } => {
                let rec = self.record(*turn_id);
                rec.stt_audio_secs += audio_secs;
                rec.stt_latency += *latency;
            }
            MetricsEvent::GenerationComplete {
                turn_id,
                tokens,
                latency,
                cancelled,
            } => {
                let rec = self.record(*turn_id);
                rec.llm_tokens += tokens;
                rec.llm_latency += *latency;
                rec.generation_cancelled |= cancelled;
            }
            MetricsEvent::PostProcessComplete {
                turn_id,
                latency,
                fallback,
            } => {
                let rec = self.record(*turn_id);
                rec.postprocess_latency += *latency;
                rec.postprocess_fallback |= fallback;
            }
            MetricsEvent::SynthesisComplete {
                turn_id,
                audio_secs,
                latency,
                interrupted,
            } => {
                let rec = self.record(*turn_id);
                rec.tts_audio_secs += audio_secs;
                rec.tts_latency += *latency;
                rec.synthesis_interrupted |= interrupted;
            }
            MetricsEvent::StageError { turn_id, .. } => {
                self.record(*turn_id).errors += 1;
            }
        }
    }

    fn record(&mut self, turn_id: u64) -> &mut UsageRecord {
        self.records.entry(turn_id).or_default()
    }

    pub fn records(&self) -> &BTreeMap<u64, UsageRecord> {
        &self.records
    }

    /// Aggregate everything collected so far.
    pub fn summary(&self) -> SessionSummary {
        let mut summary = SessionSummary {
            turns: self.records.len() as u64,
            ..Default::default()
        };
        for rec in self.records.values() {
            summary.llm_tokens += rec.llm_tokens as u64;
            summary.stt_audio_secs += rec.stt_audio_secs;
            summary.tts_audio_secs += rec.tts_audio_secs;
            if rec.generation_cancelled || rec.synthesis_interrupted {
                summary.interruptions += 1;
            }
            if rec.postprocess_fallback {
                summary.trim_fallbacks += 1;
            }
            summary.errors += rec.errors as u64;
        }
        summary
    }
}

/// Per-event logging, mirrored into the collector.
fn log_event(event: &MetricsEvent) {
    match event {
        MetricsEvent::PhaseChanged { turn_id, phase, .. } => {
            debug!(turn_id, phase, "phase changed");
        }
        MetricsEvent::TranscriptionComplete {
            turn_id, latency, ..
        } => {
            debug!(turn_id, ?latency, "transcription complete");
        }
        MetricsEvent::GenerationComplete {
            turn_id,
            tokens,
            latency,
            cancelled,
        } => {
            debug!(turn_id, tokens, ?latency, cancelled, "generation complete");
        }
        MetricsEvent::PostProcessComplete {
            turn_id,
            latency,
            fallback,
        } => {
            debug!(turn_id, ?latency, fallback, "post-processing complete");
        }
        MetricsEvent::SynthesisComplete {
            turn_id,
            latency,
            interrupted,
            ..
        } => {
            debug!(turn_id, ?latency, interrupted, "synthesis complete");
        }
        MetricsEvent::StageError {
            turn_id,
            stage,
            message,
        } => {
            debug!(turn_id, stage, message = %message, "stage error");
        }
    }
}

/// Run the single-subscriber collector until the channel closes, then
/// hand the collector back for the final summary.
pub fn spawn_collector(
    mut rx: mpsc::UnboundedReceiver<MetricsEvent>,
) -> JoinHandle<UsageCollector> {
    tokio::spawn(async move {
        let mut collector = UsageCollector::new();
        while let Some(event) = rx.recv().await {
            log_event(&event);
            collector.collect(&event);
        }
        collector
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collects_per_turn_and_aggregates() {
        let mut collector = UsageCollector::new();
        collector.collect(&MetricsEvent::PhaseChanged {
            turn_id: 1,
            phase: "generating",
            at: Utc::now(),
        });
        collector.collect(&MetricsEvent::GenerationComplete {
            turn_id: 1,
            tokens: 12,
            latency: Duration::from_millis(300),
            cancelled: false,
        });
        collector.collect(&MetricsEvent::SynthesisComplete {
            turn_id: 1,
            audio_secs: 2.5,
            latency: Duration::from_millis(200),
            interrupted: true,
        });
        collector.collect(&MetricsEvent::GenerationComplete {
            turn_id: 2,
            tokens: 8,
            latency: Duration::from_millis(150),
            cancelled: false,
        });

        let summary = collector.summary();
        assert_eq!(summary.turns, 2);
        assert_eq!(summary.llm_tokens, 20);
        assert_eq!(summary.interruptions, 1);
        assert!((summary.tts_audio_secs - 2.5).abs() < 1e-6);
    }

    #[test]
    fn fallbacks_and_errors_are_counted() {
        let mut collector = UsageCollector::new();
        collector.collect(&MetricsEvent::PostProcessComplete {
            turn_id: 3,
            latency: Duration::from_millis(40),
            fallback: true,
        });
        collector.collect(&MetricsEvent::StageError {
            turn_id: 3,
            stage: "speaking",
            message: "tts failed".into(),
        });

        let summary = collector.summary();
        assert_eq!(summary.trim_fallbacks, 1);
        assert_eq!(summary.errors, 1);
    }

    #[tokio::test]
    async fn collector_task_returns_at_channel_close() {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = spawn_collector(rx);
        tx.send(MetricsEvent::PhaseChanged {
            turn_id: 1,
            phase: "listening_for_speech",
            at: Utc::now(),
        })
        .unwrap();
        drop(tx);
        let collector = handle.await.unwrap();
        assert_eq!(collector.records().len(), 1);
    }
}
