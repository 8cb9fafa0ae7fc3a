//! Room/transport collaborator surface.
//!
//! The pipeline never talks to devices or a media server directly: it
//! reads `AudioFrame`s from whatever the transport captured and writes
//! synthesized frames to an `AudioSink`. `LocalTransport` implements the
//! surface over the machine's microphone and speakers (CPAL + Rodio);
//! tests implement it over channels.
//!
//! Transports stay on the session task: device handles are not Send on
//! some platforms, so the trait is `?Send`. The sink, by contrast, is
//! shared with the playback task and must be thread-safe.

use crate::audio::{AudioCapture, AudioConfig, AudioFrame};
use crate::error::{AgentError, AgentResult};
use async_trait::async_trait;
use rodio::buffer::SamplesBuffer;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::info;

/// A connected remote (or local) participant.
#[derive(Debug, Clone)]
pub struct Participant {
    pub identity: String,
}

/// Outbound audio: where synthesized frames go.
#[async_trait]
pub trait AudioSink: Send + Sync {
    /// Queue one frame for playout.
    async fn write_frame(&self, frame: AudioFrame) -> AgentResult<()>;

    /// Drop anything still queued (interruption kill-switch).
    async fn clear(&self) -> AgentResult<()>;
}

/// Room/transport collaborator: connection, participant presence, and
/// frame-level audio I/O.
#[async_trait(?Send)]
pub trait RoomTransport {
    async fn connect(&mut self) -> AgentResult<()>;

    /// Block until a participant is present.
    async fn wait_for_participant(&mut self) -> AgentResult<Participant>;

    /// Take the inbound audio stream. Yields once; the channel closes when
    /// the participant disconnects.
    fn take_audio_input(&mut self) -> AgentResult<mpsc::UnboundedReceiver<AudioFrame>>;

    /// The outbound sink, shared with the playback task.
    fn sink(&self) -> AgentResult<Arc<dyn AudioSink>>;
}

/// Plays frames on the default output device via a rodio sink.
pub struct DeviceSink {
    sink: rodio::Sink,
}

#[async_trait]
impl AudioSink for DeviceSink {
    async fn write_frame(&self, frame: AudioFrame) -> AgentResult<()> {
        let buffer = SamplesBuffer::new(1, frame.sample_rate, frame.samples);
        self.sink.append(buffer);
        Ok(())
    }

    async fn clear(&self) -> AgentResult<()> {
        self.sink.stop();
        Ok(())
    }
}

/// Local mic/speaker transport: the stand-in for a media room when running
/// on bare metal.
pub struct LocalTransport {
    audio_config: AudioConfig,
    _capture_stream: Option<cpal::Stream>,
    _output_stream: Option<rodio::OutputStream>,
    sink: Option<Arc<DeviceSink>>,
    frame_rx: Option<mpsc::UnboundedReceiver<AudioFrame>>,
}

impl LocalTransport {
    pub fn new(audio_config: AudioConfig) -> Self {
        Self {
            audio_config,
            _capture_stream: None,
            _output_stream: None,
            sink: None,
            frame_rx: None,
        }
    }
}

#[async_trait(?Send)]
impl RoomTransport for LocalTransport {
    async fn connect(&mut self) -> AgentResult<()> {
        let capture = AudioCapture::new(self.audio_config.clone())?;
        let (frame_tx, frame_rx) = mpsc::unbounded_channel();
        let stream = capture.start_capture(frame_tx)?;

        let (output_stream, output_handle) = rodio::OutputStream::try_default()
            .map_err(|e| AgentError::Playback(e.to_string()))?;
        let sink = rodio::Sink::try_new(&output_handle)
            .map_err(|e| AgentError::Playback(e.to_string()))?;

        self._capture_stream = Some(stream);
        self._output_stream = Some(output_stream);
        self.sink = Some(Arc::new(DeviceSink { sink }));
        self.frame_rx = Some(frame_rx);

        info!("Local transport connected (mic + speaker)");
        Ok(())
    }

    async fn wait_for_participant(&mut self) -> AgentResult<Participant> {
        // The local microphone is the participant; it is present as soon as
        // capture is running.
        if self._capture_stream.is_none() {
            return Err(AgentError::Transport("not connected".to_string()));
        }
        Ok(Participant {
            identity: "local-mic".to_string(),
        })
    }

    fn take_audio_input(&mut self) -> AgentResult<mpsc::UnboundedReceiver<AudioFrame>> {
        self.frame_rx
            .take()
            .ok_or_else(|| AgentError::Transport("audio input already taken".to_string()))
    }

    fn sink(&self) -> AgentResult<Arc<dyn AudioSink>> {
        self.sink
            .clone()
            .map(|s| s as Arc<dyn AudioSink>)
            .ok_or_else(|| AgentError::Transport("not connected".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unconnected_transport_has_no_io() {
        let mut transport = LocalTransport::new(AudioConfig::default());
        assert!(transport.take_audio_input().is_err());
        assert!(transport.sink().is_err());
        assert!(transport.wait_for_participant().await.is_err());
    }
}
