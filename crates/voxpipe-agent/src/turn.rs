//! The turn controller: the conversation state machine.
//!
//! The controller is the only component that mutates `TurnState` and
//! `ConversationContext`. Adapters run concurrently, but every transition
//! happens inside this task, in order:
//!
//! ```text
//! Idle → ListeningForSpeech → Transcribing → AwaitingEndOfTurn
//!      → Generating → PostProcessing → Speaking → ListeningForSpeech
//! ```
//!
//! Barge-in is a preemption signal from the VAD path: during `Generating`
//! it aborts the token stream and discards the partial response; during
//! `Speaking` it cancels playout and records the best-effort spoken
//! prefix. Both pass through the transient `Interrupted` state straight
//! back into `Transcribing`. Per-turn adapter failures are converted into
//! a spoken fallback and a return to listening; the machine never stalls.

use crate::chat::ConversationContext;
use crate::config::AgentConfig;
use crate::eou::EndpointEstimator;
use crate::error::AgentResult;
use crate::llm::{GenerationStream, LlmEngine};
use crate::metrics::MetricsEvent;
use crate::speech::SpeechHandle;
use crate::stt::SttEngine;
use crate::transport::AudioSink;
use crate::trim::{ResponseTrimmer, TRIM_FALLBACK};
use crate::tts::TtsEngine;
use crate::vad::SpeechEvent;
use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Spoken instead of silence when a stage fails mid-turn.
pub const FALLBACK_UTTERANCE: &str =
    "Sorry, something went wrong on my end. Could you say that again?";

/// Conversation phase. Exactly one is active per session at any instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    Idle,
    ListeningForSpeech,
    Transcribing,
    AwaitingEndOfTurn,
    Generating,
    PostProcessing,
    Speaking,
    Interrupted,
}

impl TurnState {
    pub fn name(&self) -> &'static str {
        match self {
            TurnState::Idle => "idle",
            TurnState::ListeningForSpeech => "listening_for_speech",
            TurnState::Transcribing => "transcribing",
            TurnState::AwaitingEndOfTurn => "awaiting_end_of_turn",
            TurnState::Generating => "generating",
            TurnState::PostProcessing => "post_processing",
            TurnState::Speaking => "speaking",
            TurnState::Interrupted => "interrupted",
        }
    }
}

/// The three external engines the controller drives.
pub struct EngineSet {
    pub stt: Arc<dyn SttEngine>,
    pub llm: Arc<dyn LlmEngine>,
    pub tts: Arc<dyn TtsEngine>,
}

enum CaptureOutcome {
    Committed(String),
    Abandoned,
    Closed,
}

enum SpeakOutcome {
    Completed(AgentResult<()>),
    Interrupted,
    Closed,
}

/// Owns the state machine, the conversation history, and the in-flight
/// generation/playback handles for the current turn.
pub struct TurnController {
    config: AgentConfig,
    state: TurnState,
    ctx: ConversationContext,
    turn_id: u64,
    engines: EngineSet,
    eou: EndpointEstimator,
    trimmer: ResponseTrimmer,
    sink: Arc<dyn AudioSink>,
    speech_rx: mpsc::UnboundedReceiver<SpeechEvent>,
    metrics_tx: mpsc::UnboundedSender<MetricsEvent>,
    turn_audio: Vec<f32>,
    /// A barge-in already consumed the `Started` boundary; skip listening.
    pending_speech: bool,
}

impl TurnController {
    pub fn new(
        config: AgentConfig,
        engines: EngineSet,
        sink: Arc<dyn AudioSink>,
        speech_rx: mpsc::UnboundedReceiver<SpeechEvent>,
        metrics_tx: mpsc::UnboundedSender<MetricsEvent>,
    ) -> Self {
        let ctx = ConversationContext::with_system(&config.system_prompt);
        let eou = EndpointEstimator::new(config.eou_threshold);
        let trimmer = ResponseTrimmer::new(&config.trim_endpoint);
        Self {
            config,
            state: TurnState::Idle,
            ctx,
            turn_id: 0,
            engines,
            eou,
            trimmer,
            sink,
            speech_rx,
            metrics_tx,
            turn_audio: Vec::new(),
            pending_speech: false,
        }
    }

    pub fn state(&self) -> TurnState {
        self.state
    }

    pub fn context(&self) -> &ConversationContext {
        &self.ctx
    }

    fn transition(&mut self, state: TurnState) {
        debug!(from = self.state.name(), to = state.name(), "transition");
        self.state = state;
        self.emit(MetricsEvent::PhaseChanged {
            turn_id: self.turn_id,
            phase: state.name(),
            at: Utc::now(),
        });
    }

    fn emit(&self, event: MetricsEvent) {
        // The collector outliving the controller is a teardown ordering
        // detail, not an error.
        let _ = self.metrics_tx.send(event);
    }

    /// Speak a fixed utterance (greeting, failure fallback). Bypasses
    /// post-processing; still interruptible when `allow_interruptions`.
    pub async fn say(&mut self, text: &str, allow_interruptions: bool) -> AgentResult<()> {
        self.transition(TurnState::Speaking);
        let tts_start = Instant::now();
        let audio = self.engines.tts.synthesize(text).await?;
        let audio_secs = audio.duration().as_secs_f32();

        let mut handle = SpeechHandle::start(self.sink.clone(), audio, text, allow_interruptions);
        match self.drive_playback(&mut handle).await {
            SpeakOutcome::Completed(res) => {
                self.emit(MetricsEvent::SynthesisComplete {
                    turn_id: self.turn_id,
                    audio_secs,
                    latency: tts_start.elapsed(),
                    interrupted: false,
                });
                res?;
                if !text.is_empty() {
                    self.ctx.push_assistant(text);
                }
                Ok(())
            }
            SpeakOutcome::Interrupted => {
                let (spoken, _res) = handle.interrupt().await;
                self.emit(MetricsEvent::SynthesisComplete {
                    turn_id: self.turn_id,
                    audio_secs,
                    latency: tts_start.elapsed(),
                    interrupted: true,
                });
                if !spoken.is_empty() {
                    self.ctx.push_assistant(spoken);
                }
                self.transition(TurnState::Interrupted);
                self.pending_speech = true;
                Ok(())
            }
            SpeakOutcome::Closed => {
                let _ = handle.interrupt().await;
                Ok(())
            }
        }
    }

    /// Run the conversation loop until the speech channel closes (the
    /// participant left). Every per-turn failure is absorbed here.
    pub async fn run(&mut self) -> AgentResult<()> {
        'session: loop {
            // ---- ListeningForSpeech ----
            if self.pending_speech {
                // Barge-in already delivered the speech-start boundary.
                self.pending_speech = false;
            } else {
                self.transition(TurnState::ListeningForSpeech);
                loop {
                    match self.speech_rx.recv().await {
                        Some(SpeechEvent::Started { .. }) => break,
                        Some(_) => continue, // stale frames from a closed utterance
                        None => return Ok(()),
                    }
                }
            }

            self.turn_id += 1;
            self.turn_audio.clear();
            self.transition(TurnState::Transcribing);

            // ---- Transcribing / AwaitingEndOfTurn ----
            let transcript = match self.capture_user_turn().await {
                CaptureOutcome::Committed(t) => t,
                CaptureOutcome::Abandoned => continue 'session,
                CaptureOutcome::Closed => return Ok(()),
            };
            if transcript.trim().is_empty() {
                debug!("empty transcript, skipping turn");
                continue 'session;
            }
            info!("User: {}", transcript);
            self.ctx.push_user(transcript.as_str());

            // ---- Generating ----
            self.transition(TurnState::Generating);
            let gen_start = Instant::now();
            let mut stream = GenerationStream::open(self.engines.llm.clone(), self.ctx.snapshot());
            let mut response = String::new();
            let mut token_count: u32 = 0;

            enum GenOutcome {
                Complete,
                Interrupted,
                Closed,
            }

            let outcome = loop {
                tokio::select! {
                    token = stream.next_token() => match token {
                        Some(t) => {
                            token_count += 1;
                            response.push_str(&t);
                        }
                        None => break GenOutcome::Complete,
                    },
                    ev = self.speech_rx.recv() => match ev {
                        Some(SpeechEvent::Started { .. }) if self.config.allow_interruptions => {
                            break GenOutcome::Interrupted;
                        }
                        Some(_) => continue,
                        None => break GenOutcome::Closed,
                    },
                }
            };

            match outcome {
                GenOutcome::Interrupted => {
                    stream.abort().await;
                    self.emit(MetricsEvent::GenerationComplete {
                        turn_id: self.turn_id,
                        tokens: token_count,
                        latency: gen_start.elapsed(),
                        cancelled: true,
                    });
                    info!("Interruption during generation; partial response discarded");
                    self.transition(TurnState::Interrupted);
                    self.pending_speech = true;
                    continue 'session;
                }
                GenOutcome::Closed => {
                    stream.abort().await;
                    return Ok(());
                }
                GenOutcome::Complete => {
                    if let Err(e) = stream.finish().await {
                        warn!("Generation failed: {}", e);
                        self.emit(MetricsEvent::StageError {
                            turn_id: self.turn_id,
                            stage: "generating",
                            message: e.to_string(),
                        });
                        self.recover_with_fallback().await;
                        continue 'session;
                    }
                    self.emit(MetricsEvent::GenerationComplete {
                        turn_id: self.turn_id,
                        tokens: token_count,
                        latency: gen_start.elapsed(),
                        cancelled: false,
                    });
                }
            }

            // ---- PostProcessing ----
            // The stream is fully drained before this point; one trim call
            // per turn, failures absorbed into the fixed fallback string.
            self.transition(TurnState::PostProcessing);
            let pp_start = Instant::now();
            let final_text = self.trimmer.process(&response).await;
            let fell_back = final_text == TRIM_FALLBACK && response != TRIM_FALLBACK;
            self.emit(MetricsEvent::PostProcessComplete {
                turn_id: self.turn_id,
                latency: pp_start.elapsed(),
                fallback: fell_back,
            });

            // ---- Speaking ----
            self.transition(TurnState::Speaking);
            let tts_start = Instant::now();
            let audio = match self.engines.tts.synthesize(&final_text).await {
                Ok(a) => a,
                Err(e) => {
                    warn!("Synthesis failed: {}", e);
                    self.emit(MetricsEvent::StageError {
                        turn_id: self.turn_id,
                        stage: "speaking",
                        message: e.to_string(),
                    });
                    self.recover_with_fallback().await;
                    continue 'session;
                }
            };
            let audio_secs = audio.duration().as_secs_f32();
            let mut handle = SpeechHandle::start(
                self.sink.clone(),
                audio,
                final_text.clone(),
                self.config.allow_interruptions,
            );

            match self.drive_playback(&mut handle).await {
                SpeakOutcome::Completed(Ok(())) => {
                    self.emit(MetricsEvent::SynthesisComplete {
                        turn_id: self.turn_id,
                        audio_secs,
                        latency: tts_start.elapsed(),
                        interrupted: false,
                    });
                    if !final_text.is_empty() {
                        self.ctx.push_assistant(final_text.as_str());
                    }
                    info!("Assistant: {}", final_text);
                }
                SpeakOutcome::Completed(Err(e)) => {
                    warn!("Playback failed: {}", e);
                    self.emit(MetricsEvent::StageError {
                        turn_id: self.turn_id,
                        stage: "speaking",
                        message: e.to_string(),
                    });
                    self.recover_with_fallback().await;
                }
                SpeakOutcome::Interrupted => {
                    let (spoken, _res) = handle.interrupt().await;
                    self.emit(MetricsEvent::SynthesisComplete {
                        turn_id: self.turn_id,
                        audio_secs,
                        latency: tts_start.elapsed(),
                        interrupted: true,
                    });
                    info!("Interruption during playback");
                    if !spoken.is_empty() {
                        self.ctx.push_assistant(spoken);
                    }
                    self.transition(TurnState::Interrupted);
                    self.pending_speech = true;
                }
                SpeakOutcome::Closed => {
                    let _ = handle.interrupt().await;
                    return Ok(());
                }
            }
        }
    }

    /// Buffer the utterance and decide when the user is done: a confident
    /// end-of-turn estimate commits after `min_endpointing_delay`, an
    /// unconfident one waits up to `max_endpointing_delay`. Speech that
    /// resumes before the deadline reopens the utterance (debounce).
    async fn capture_user_turn(&mut self) -> CaptureOutcome {
        loop {
            // Collect speech frames until the VAD boundary.
            loop {
                match self.speech_rx.recv().await {
                    Some(SpeechEvent::Frame(frame)) => {
                        self.turn_audio.extend_from_slice(&frame.samples);
                    }
                    Some(SpeechEvent::Ended { .. }) => break,
                    Some(SpeechEvent::Started { .. }) => continue,
                    None => return CaptureOutcome::Closed,
                }
            }
            let ended_at = Instant::now();
            self.transition(TurnState::AwaitingEndOfTurn);

            let stt_start = Instant::now();
            let transcript = match self
                .engines
                .stt
                .transcribe(&self.turn_audio, self.config.sample_rate)
                .await
            {
                Ok(t) => t,
                Err(e) => {
                    warn!("Transcription failed, abandoning turn: {}", e);
                    self.emit(MetricsEvent::StageError {
                        turn_id: self.turn_id,
                        stage: "transcribing",
                        message: e.to_string(),
                    });
                    return CaptureOutcome::Abandoned;
                }
            };
            self.emit(MetricsEvent::TranscriptionComplete {
                turn_id: self.turn_id,
                audio_secs: self.turn_audio.len() as f32 / self.config.sample_rate as f32,
                latency: stt_start.elapsed(),
            });

            let decision = self.eou.estimate(&transcript, ended_at.elapsed());
            let budget = if decision.commit {
                self.config.min_endpointing()
            } else {
                self.config.max_endpointing()
            };
            let deadline =
                tokio::time::Instant::now() + budget.saturating_sub(ended_at.elapsed());

            let resumed = loop {
                tokio::select! {
                    _ = tokio::time::sleep_until(deadline) => break false,
                    ev = self.speech_rx.recv() => match ev {
                        Some(SpeechEvent::Started { .. }) => break true,
                        Some(SpeechEvent::Frame(frame)) => {
                            self.turn_audio.extend_from_slice(&frame.samples);
                        }
                        Some(SpeechEvent::Ended { .. }) => continue,
                        None => return CaptureOutcome::Closed,
                    },
                }
            };

            if resumed {
                debug!("speech resumed before commit; extending silence timer");
                self.transition(TurnState::Transcribing);
                continue;
            }

            info!(
                confidence = decision.confidence,
                "end of turn committed after {:?} of silence",
                ended_at.elapsed()
            );
            return CaptureOutcome::Committed(transcript);
        }
    }

    /// Watch the in-flight utterance and the VAD path at the same time.
    async fn drive_playback(&mut self, handle: &mut SpeechHandle) -> SpeakOutcome {
        loop {
            tokio::select! {
                res = handle.finished() => return SpeakOutcome::Completed(res),
                ev = self.speech_rx.recv() => match ev {
                    Some(SpeechEvent::Started { .. }) if handle.allow_interruptions() => {
                        return SpeakOutcome::Interrupted;
                    }
                    Some(_) => continue,
                    None => return SpeakOutcome::Closed,
                },
            }
        }
    }

    /// Per-turn failure recovery: the user hears an apology instead of
    /// silence, then the machine returns to listening.
    async fn recover_with_fallback(&mut self) {
        if let Err(e) = self.say(FALLBACK_UTTERANCE, self.config.allow_interruptions).await {
            warn!("Fallback utterance failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_names_are_stable() {
        assert_eq!(TurnState::Idle.name(), "idle");
        assert_eq!(TurnState::ListeningForSpeech.name(), "listening_for_speech");
        assert_eq!(TurnState::AwaitingEndOfTurn.name(), "awaiting_end_of_turn");
        assert_eq!(TurnState::PostProcessing.name(), "post_processing");
    }
}
