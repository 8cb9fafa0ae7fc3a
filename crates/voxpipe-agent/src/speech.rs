//! **SpeechHandle** — cancellable playout of one assistant utterance.
//!
//! The handle owns a task that paces synthesized PCM into the transport
//! sink frame by frame in real time. Cancellation stops the very next
//! frame from going out and clears the sink queue, so barge-in falls
//! silent within one scheduling step. The best-effort "portion already
//! spoken" is estimated from elapsed playback time.

use crate::audio::AudioFrame;
use crate::error::{AgentError, AgentResult};
use crate::transport::AudioSink;
use crate::tts::SynthesizedAudio;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// In-flight handle to the current assistant utterance. At most one exists
/// at a time; the turn controller either awaits natural completion or
/// interrupts it.
pub struct SpeechHandle {
    text: String,
    allow_interruptions: bool,
    cancel: CancellationToken,
    started: Instant,
    total: Duration,
    task: JoinHandle<AgentResult<()>>,
}

impl SpeechHandle {
    /// Spawn the playout task for one utterance.
    pub fn start(
        sink: Arc<dyn AudioSink>,
        audio: SynthesizedAudio,
        text: impl Into<String>,
        allow_interruptions: bool,
    ) -> Self {
        let cancel = CancellationToken::new();
        let total = audio.duration();
        let task_cancel = cancel.clone();
        let task = tokio::spawn(async move { play_frames(sink, audio, task_cancel).await });
        Self {
            text: text.into(),
            allow_interruptions,
            cancel,
            started: Instant::now(),
            total,
            task,
        }
    }

    pub fn allow_interruptions(&self) -> bool {
        self.allow_interruptions
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Await natural completion of the playout task.
    pub async fn finished(&mut self) -> AgentResult<()> {
        match (&mut self.task).await {
            Ok(res) => res,
            Err(e) => Err(AgentError::Playback(format!("playback task failed: {}", e))),
        }
    }

    /// Cancel playout, wait for the task to wind down, and return the
    /// best-effort prefix of the text that was actually spoken.
    pub async fn interrupt(self) -> (String, AgentResult<()>) {
        self.cancel.cancel();
        let res = match self.task.await {
            Ok(res) => res,
            Err(e) => Err(AgentError::Playback(format!("playback task failed: {}", e))),
        };
        let spoken = spoken_prefix(&self.text, self.started.elapsed(), self.total);
        info!("Playback interrupted after {:?}", self.started.elapsed());
        (spoken, res)
    }
}

/// Estimate the words spoken after `elapsed` of a `total`-long utterance.
fn spoken_prefix(text: &str, elapsed: Duration, total: Duration) -> String {
    if total.is_zero() {
        return String::new();
    }
    let fraction = (elapsed.as_secs_f64() / total.as_secs_f64()).clamp(0.0, 1.0);
    let words: Vec<&str> = text.split_whitespace().collect();
    let spoken = (words.len() as f64 * fraction).floor() as usize;
    words[..spoken.min(words.len())].join(" ")
}

async fn play_frames(
    sink: Arc<dyn AudioSink>,
    audio: SynthesizedAudio,
    cancel: CancellationToken,
) -> AgentResult<()> {
    if audio.samples.is_empty() {
        return Ok(());
    }
    let frame_size = ((audio.sample_rate as f32 * 0.03) as usize).max(1);
    let frame_duration = Duration::from_secs_f64(frame_size as f64 / audio.sample_rate as f64);

    for chunk in audio.samples.chunks(frame_size) {
        if cancel.is_cancelled() {
            let _ = sink.clear().await;
            return Ok(());
        }
        sink.write_frame(AudioFrame::new(chunk.to_vec(), audio.sample_rate))
            .await?;
        // Pace playout in real time so cancellation maps to audible time.
        tokio::select! {
            _ = cancel.cancelled() => {
                let _ = sink.clear().await;
                return Ok(());
            }
            _ = tokio::time::sleep(frame_duration) => {}
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct RecordingSink {
        frames: Mutex<Vec<usize>>,
    }

    #[async_trait]
    impl AudioSink for RecordingSink {
        async fn write_frame(&self, frame: AudioFrame) -> AgentResult<()> {
            self.frames.lock().unwrap().push(frame.samples.len());
            Ok(())
        }

        async fn clear(&self) -> AgentResult<()> {
            Ok(())
        }
    }

    fn audio(secs: f32) -> SynthesizedAudio {
        SynthesizedAudio {
            samples: vec![0.0; (secs * 16000.0) as usize],
            sample_rate: 16000,
        }
    }

    #[tokio::test]
    async fn plays_all_frames_to_completion() {
        let sink = Arc::new(RecordingSink {
            frames: Mutex::new(Vec::new()),
        });
        let mut handle = SpeechHandle::start(sink.clone(), audio(0.09), "hi there", true);
        handle.finished().await.unwrap();
        // 0.09s at 30ms frames = 3 frames
        assert_eq!(sink.frames.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn interrupt_stops_frame_emission() {
        let sink = Arc::new(RecordingSink {
            frames: Mutex::new(Vec::new()),
        });
        let handle = SpeechHandle::start(sink.clone(), audio(3.0), "a b c d e f", true);
        tokio::time::sleep(Duration::from_millis(50)).await;
        let (_spoken, res) = handle.interrupt().await;
        res.unwrap();

        let emitted = sink.frames.lock().unwrap().len();
        // Give the scheduler a beat: no frame may arrive after the interrupt.
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(sink.frames.lock().unwrap().len(), emitted);
        assert!(emitted < 100); // 3s of audio is 100 frames
    }

    #[test]
    fn spoken_prefix_scales_with_elapsed() {
        let text = "one two three four";
        let total = Duration::from_secs(4);
        assert_eq!(spoken_prefix(text, Duration::from_secs(2), total), "one two");
        assert_eq!(spoken_prefix(text, Duration::from_secs(5), total), text);
        assert_eq!(spoken_prefix(text, Duration::ZERO, total), "");
        assert_eq!(spoken_prefix(text, Duration::from_secs(1), Duration::ZERO), "");
    }
}
