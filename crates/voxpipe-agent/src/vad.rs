//! Voice activity detection and speech-boundary segmentation.
//!
//! `VadDetector` wraps WebRTC VAD for per-frame speech/silence
//! classification. `SpeechSegmenter` smooths those raw classifications
//! into `SpeechEvent` boundaries for the turn controller: a short run of
//! speech confirms `Started`, a short run of silence confirms `Ended`.
//! Endpointing proper (min/max delays, end-of-turn estimation) lives in
//! the controller, not here.

use crate::audio::AudioFrame;
use crate::error::{AgentError, AgentResult};
use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info};
use webrtc_vad::{SampleRate, Vad, VadMode};

/// Configuration for VAD detection
#[derive(Debug, Clone)]
pub struct VadConfig {
    /// Sample rate (must be 8000, 16000, 32000, or 48000 Hz for WebRTC VAD)
    pub sample_rate: u32,
    /// Detection mode (0-3, where 3 is most aggressive)
    pub mode: u8,
    /// Speech run needed to confirm a speech-start boundary (default: 90ms)
    pub min_speech_ms: u64,
    /// Silence run needed to confirm a speech-end boundary (default: 240ms)
    pub min_silence_ms: u64,
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16000,
            mode: 2,
            min_speech_ms: 90,
            min_silence_ms: 240,
        }
    }
}

/// Boundary events emitted toward the turn controller.
#[derive(Debug, Clone)]
pub enum SpeechEvent {
    /// A new user utterance began.
    Started { timestamp: DateTime<Utc> },
    /// Speech audio belonging to the current utterance.
    Frame(AudioFrame),
    /// The utterance went silent (boundary only; commit is the controller's call).
    Ended { duration: Duration },
}

/// Per-frame speech classifier backed by WebRTC VAD.
pub struct VadDetector {
    vad: Vad,
    config: VadConfig,
    frame_size: usize,
}

impl VadDetector {
    pub fn new(config: VadConfig) -> AgentResult<Self> {
        if !matches!(config.sample_rate, 8000 | 16000 | 32000 | 48000) {
            return Err(AgentError::Config(format!(
                "WebRTC VAD only supports 8000, 16000, 32000, or 48000 Hz, got {}",
                config.sample_rate
            )));
        }
        if config.mode > 3 {
            return Err(AgentError::Config(format!(
                "VAD mode must be 0-3, got {}",
                config.mode
            )));
        }

        // WebRTC VAD wants 10/20/30ms frames; the pipeline uses 30ms.
        let frame_size = (config.sample_rate as f32 * 0.03) as usize;

        let mut vad = Vad::new();
        vad.set_mode(mode_of(config.mode));
        vad.set_sample_rate(rate_of(config.sample_rate));

        info!(
            "VAD initialized ({}Hz, mode {}, {} samples/frame)",
            config.sample_rate, config.mode, frame_size
        );

        Ok(Self {
            vad,
            config,
            frame_size,
        })
    }

    /// Classify one 30ms frame as speech or silence.
    pub fn is_speech(&mut self, samples: &[f32]) -> AgentResult<bool> {
        if samples.len() != self.frame_size {
            return Err(AgentError::Vad(format!(
                "Expected {} samples, got {}",
                self.frame_size,
                samples.len()
            )));
        }

        let samples_i16: Vec<i16> = samples
            .iter()
            .map(|&s| (s.clamp(-1.0, 1.0) * 32767.0) as i16)
            .collect();

        self.vad
            .is_voice_segment(&samples_i16)
            .map_err(|e| AgentError::Vad(format!("VAD processing failed: {:?}", e)))
    }

    /// Expected frame size in samples.
    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    pub fn sample_rate(&self) -> u32 {
        self.config.sample_rate
    }
}

fn mode_of(mode: u8) -> VadMode {
    match mode {
        0 => VadMode::Quality,
        1 => VadMode::LowBitrate,
        2 => VadMode::Aggressive,
        _ => VadMode::VeryAggressive,
    }
}

fn rate_of(sample_rate: u32) -> SampleRate {
    match sample_rate {
        8000 => SampleRate::Rate8kHz,
        32000 => SampleRate::Rate32kHz,
        48000 => SampleRate::Rate48kHz,
        _ => SampleRate::Rate16kHz,
    }
}

/// Segmenter state: Silence → PendingSpeech → Speech → TrailingSilence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SegmentState {
    Silence,
    PendingSpeech,
    Speech,
    TrailingSilence,
}

/// Turns raw per-frame classifications into debounced speech boundaries.
pub struct SpeechSegmenter {
    config: VadConfig,
    state: SegmentState,
    pending: Vec<AudioFrame>,
    pending_ms: u64,
    silence_ms: u64,
    speech_ms: u64,
    event_tx: mpsc::UnboundedSender<SpeechEvent>,
}

impl SpeechSegmenter {
    pub fn new(config: VadConfig, event_tx: mpsc::UnboundedSender<SpeechEvent>) -> Self {
        Self {
            config,
            state: SegmentState::Silence,
            pending: Vec::new(),
            pending_ms: 0,
            silence_ms: 0,
            speech_ms: 0,
            event_tx,
        }
    }

    /// Feed one classified frame; boundary events go out on the channel.
    pub fn process(&mut self, is_speech: bool, frame: AudioFrame) -> AgentResult<()> {
        let frame_ms = (frame.duration_secs() * 1000.0) as u64;

        match (self.state, is_speech) {
            (SegmentState::Silence, true) => {
                self.pending.clear();
                self.pending.push(frame);
                self.pending_ms = frame_ms;
                self.state = SegmentState::PendingSpeech;
                self.try_confirm_start()?;
            }
            (SegmentState::Silence, false) => {}

            (SegmentState::PendingSpeech, true) => {
                self.pending.push(frame);
                self.pending_ms += frame_ms;
                self.try_confirm_start()?;
            }
            (SegmentState::PendingSpeech, false) => {
                // Too short to count as speech; drop the tentative buffer.
                debug!("speech candidate too short ({}ms), dropped", self.pending_ms);
                self.pending.clear();
                self.pending_ms = 0;
                self.state = SegmentState::Silence;
            }

            (SegmentState::Speech, true) => {
                self.speech_ms += frame_ms;
                self.emit(SpeechEvent::Frame(frame))?;
            }
            (SegmentState::Speech, false) => {
                self.silence_ms = frame_ms;
                self.state = SegmentState::TrailingSilence;
            }

            (SegmentState::TrailingSilence, true) => {
                // Resumed before the boundary; keep the same utterance open.
                debug!("speech resumed after {}ms of silence", self.silence_ms);
                self.silence_ms = 0;
                self.speech_ms += frame_ms;
                self.state = SegmentState::Speech;
                self.emit(SpeechEvent::Frame(frame))?;
            }
            (SegmentState::TrailingSilence, false) => {
                self.silence_ms += frame_ms;
                if self.silence_ms >= self.config.min_silence_ms {
                    let duration = Duration::from_millis(self.speech_ms);
                    debug!("speech ended after {}ms", self.speech_ms);
                    self.speech_ms = 0;
                    self.silence_ms = 0;
                    self.state = SegmentState::Silence;
                    self.emit(SpeechEvent::Ended { duration })?;
                }
            }
        }

        Ok(())
    }

    fn try_confirm_start(&mut self) -> AgentResult<()> {
        if self.pending_ms < self.config.min_speech_ms {
            return Ok(());
        }
        info!("Speech started");
        self.state = SegmentState::Speech;
        self.speech_ms = self.pending_ms;
        self.pending_ms = 0;
        self.emit(SpeechEvent::Started {
            timestamp: Utc::now(),
        })?;
        for frame in std::mem::take(&mut self.pending) {
            self.emit(SpeechEvent::Frame(frame))?;
        }
        Ok(())
    }

    fn emit(&self, event: SpeechEvent) -> AgentResult<()> {
        self.event_tx
            .send(event)
            .map_err(|e| AgentError::ChannelSend(e.to_string()))
    }
}

/// Run VAD + segmentation on a dedicated thread (WebRTC VAD is not Send)
/// and feed `SpeechEvent`s to the controller. The thread exits when the
/// audio channel closes.
pub fn spawn_vad_task(
    config: VadConfig,
    mut frame_rx: mpsc::UnboundedReceiver<AudioFrame>,
    event_tx: mpsc::UnboundedSender<SpeechEvent>,
) -> std::thread::JoinHandle<()> {
    std::thread::spawn(move || {
        let mut vad = match VadDetector::new(config.clone()) {
            Ok(v) => v,
            Err(e) => {
                error!("VAD init failed: {}", e);
                return;
            }
        };
        let mut segmenter = SpeechSegmenter::new(config, event_tx);

        while let Some(frame) = frame_rx.blocking_recv() {
            if frame.samples.len() != vad.frame_size() {
                continue;
            }
            let is_speech = match vad.is_speech(&frame.samples) {
                Ok(v) => v,
                Err(_) => continue,
            };
            if segmenter.process(is_speech, frame).is_err() {
                // Controller gone; nothing left to do.
                break;
            }
        }
        debug!("VAD task ended");
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame() -> AudioFrame {
        AudioFrame::new(vec![0.1; 480], 16000)
    }

    fn segmenter() -> (SpeechSegmenter, mpsc::UnboundedReceiver<SpeechEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let config = VadConfig {
            min_speech_ms: 60,
            min_silence_ms: 60,
            ..Default::default()
        };
        (SpeechSegmenter::new(config, tx), rx)
    }

    #[test]
    fn detector_rejects_bad_sample_rate() {
        let config = VadConfig {
            sample_rate: 44100,
            ..Default::default()
        };
        assert!(VadDetector::new(config).is_err());
    }

    #[test]
    fn detector_silence_is_not_speech() {
        let mut vad = VadDetector::new(VadConfig::default()).unwrap();
        let silence = vec![0.0f32; 480];
        assert!(!vad.is_speech(&silence).unwrap());
    }

    #[test]
    fn detector_rejects_wrong_frame_size() {
        let mut vad = VadDetector::new(VadConfig::default()).unwrap();
        assert!(vad.is_speech(&[0.0f32; 100]).is_err());
    }

    #[test]
    fn segmenter_confirms_start_after_min_speech() {
        let (mut seg, mut rx) = segmenter();

        // First 30ms frame: still tentative, nothing emitted.
        seg.process(true, frame()).unwrap();
        assert!(rx.try_recv().is_err());

        // Second frame crosses 60ms: Started plus both buffered frames.
        seg.process(true, frame()).unwrap();
        assert!(matches!(rx.try_recv().unwrap(), SpeechEvent::Started { .. }));
        assert!(matches!(rx.try_recv().unwrap(), SpeechEvent::Frame(_)));
        assert!(matches!(rx.try_recv().unwrap(), SpeechEvent::Frame(_)));
    }

    #[test]
    fn segmenter_drops_blips() {
        let (mut seg, mut rx) = segmenter();
        seg.process(true, frame()).unwrap();
        seg.process(false, frame()).unwrap();
        seg.process(false, frame()).unwrap();
        seg.process(false, frame()).unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn segmenter_ends_after_min_silence() {
        let (mut seg, mut rx) = segmenter();
        seg.process(true, frame()).unwrap();
        seg.process(true, frame()).unwrap();
        seg.process(false, frame()).unwrap();
        seg.process(false, frame()).unwrap();

        let mut saw_ended = false;
        while let Ok(ev) = rx.try_recv() {
            if matches!(ev, SpeechEvent::Ended { .. }) {
                saw_ended = true;
            }
        }
        assert!(saw_ended);
    }

    #[test]
    fn segmenter_keeps_utterance_open_on_resume() {
        let (mut seg, mut rx) = segmenter();
        seg.process(true, frame()).unwrap();
        seg.process(true, frame()).unwrap();
        // One silence frame (30ms < 60ms), then speech resumes.
        seg.process(false, frame()).unwrap();
        seg.process(true, frame()).unwrap();

        let mut starts = 0;
        let mut ends = 0;
        while let Ok(ev) = rx.try_recv() {
            match ev {
                SpeechEvent::Started { .. } => starts += 1,
                SpeechEvent::Ended { .. } => ends += 1,
                SpeechEvent::Frame(_) => {}
            }
        }
        assert_eq!(starts, 1);
        assert_eq!(ends, 0);
    }
}
