//! Audio frames and microphone capture using CPAL.
//!
//! Capture runs in the audio callback thread and ships fixed-size frames
//! over a channel; everything downstream works on plain `AudioFrame`s.

use crate::error::{AgentError, AgentResult};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, Stream, StreamConfig};
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Audio configuration
#[derive(Debug, Clone)]
pub struct AudioConfig {
    /// Sample rate in Hz (default: 16000)
    pub sample_rate: u32,
    /// Number of channels (default: 1 for mono)
    pub channels: u16,
    /// Frame size in samples (default: 480 = 30ms at 16kHz, required by VAD)
    pub frame_size: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16000,
            channels: 1,
            frame_size: 480,
        }
    }
}

impl AudioConfig {
    /// Derive a config for the given pipeline sample rate, keeping 30ms frames.
    pub fn for_sample_rate(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            channels: 1,
            frame_size: (sample_rate as f32 * 0.03) as usize,
        }
    }
}

/// One frame of PCM audio flowing through the pipeline.
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// Samples (f32, normalized to -1.0 to 1.0)
    pub samples: Vec<f32>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// When the frame was captured or produced
    pub timestamp: Instant,
}

impl AudioFrame {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
            timestamp: Instant::now(),
        }
    }

    /// Frame length in seconds.
    pub fn duration_secs(&self) -> f32 {
        self.samples.len() as f32 / self.sample_rate as f32
    }
}

/// Microphone capture. Keep the returned `Stream` alive to keep frames flowing.
pub struct AudioCapture {
    config: AudioConfig,
    device: Device,
    stream_config: StreamConfig,
}

impl AudioCapture {
    pub fn new(config: AudioConfig) -> AgentResult<Self> {
        info!(
            "Initializing audio capture ({}Hz, {} channels)",
            config.sample_rate, config.channels
        );

        let device = cpal::default_host()
            .default_input_device()
            .ok_or_else(|| AgentError::AudioDevice("No input device available".to_string()))?;

        info!(
            "Using input device: {}",
            device.name().unwrap_or_else(|_| "Unknown".to_string())
        );

        let stream_config = StreamConfig {
            channels: config.channels,
            sample_rate: cpal::SampleRate(config.sample_rate),
            buffer_size: cpal::BufferSize::Fixed(config.frame_size as u32),
        };

        Ok(Self {
            config,
            device,
            stream_config,
        })
    }

    /// Start capturing and send fixed-size frames to the provided channel.
    pub fn start_capture(self, frame_tx: mpsc::UnboundedSender<AudioFrame>) -> AgentResult<Stream> {
        let frame_size = self.config.frame_size;
        let sample_rate = self.config.sample_rate;
        let mut sample_buffer = Vec::with_capacity(frame_size);

        let stream = self.device.build_input_stream(
            &self.stream_config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                for &sample in data {
                    sample_buffer.push(sample);
                    if sample_buffer.len() >= frame_size {
                        let frame = AudioFrame::new(sample_buffer.clone(), sample_rate);
                        if frame_tx.send(frame).is_err() {
                            // Receiver gone; the session is tearing down.
                            sample_buffer.clear();
                            return;
                        }
                        sample_buffer.clear();
                    }
                }
            },
            move |err| {
                warn!("Audio stream error: {}", err);
            },
            None,
        )?;

        stream.play()?;
        info!("Audio capture started");

        Ok(stream)
    }

    /// List available input devices
    pub fn list_input_devices() -> AgentResult<Vec<String>> {
        let host = cpal::default_host();
        let devices = host.input_devices()?;

        let mut device_names = Vec::new();
        for device in devices {
            if let Ok(name) = device.name() {
                device_names.push(name);
            }
        }

        Ok(device_names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults() {
        let config = AudioConfig::default();
        assert_eq!(config.sample_rate, 16000);
        assert_eq!(config.channels, 1);
        assert_eq!(config.frame_size, 480);
    }

    #[test]
    fn config_scales_frame_size() {
        let config = AudioConfig::for_sample_rate(8000);
        assert_eq!(config.frame_size, 240);
    }

    #[test]
    fn frame_duration() {
        let frame = AudioFrame::new(vec![0.0; 480], 16000);
        assert!((frame.duration_secs() - 0.03).abs() < 1e-6);
    }

    #[test]
    fn list_devices_does_not_panic() {
        // Might fail in CI environments without audio devices
        if let Ok(devices) = AudioCapture::list_input_devices() {
            println!("Available input devices: {:?}", devices);
        }
    }
}
