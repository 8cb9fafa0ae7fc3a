//! Session wiring: transport → VAD → turn controller → metrics.
//!
//! One session serves one room and one participant. Teardown is driven by
//! the transport: when the inbound audio channel closes, the VAD task and
//! the controller wind down in order, the metrics collector drains, and
//! the shutdown callbacks receive the final usage summary.

use crate::config::AgentConfig;
use crate::error::AgentResult;
use crate::metrics::{spawn_collector, SessionSummary};
use crate::transport::RoomTransport;
use crate::turn::{EngineSet, TurnController};
use crate::vad::{spawn_vad_task, VadConfig};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Invoked once at session end with the aggregated usage summary.
pub type ShutdownCallback = Box<dyn FnOnce(&SessionSummary) + Send>;

/// A single voice session over one transport.
pub struct Session {
    config: AgentConfig,
    engines: EngineSet,
    transport: Box<dyn RoomTransport>,
    shutdown: CancellationToken,
    shutdown_callbacks: Vec<ShutdownCallback>,
}

impl Session {
    pub fn new(config: AgentConfig, engines: EngineSet, transport: Box<dyn RoomTransport>) -> Self {
        Self {
            config,
            engines,
            transport,
            shutdown: CancellationToken::new(),
            shutdown_callbacks: Vec::new(),
        }
    }

    /// Token that ends the session gracefully (e.g. on ctrl-c), still
    /// flushing the usage summary.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Register a hook to run at teardown, after metrics are flushed.
    pub fn add_shutdown_callback(
        &mut self,
        callback: impl FnOnce(&SessionSummary) + Send + 'static,
    ) {
        self.shutdown_callbacks.push(Box::new(callback));
    }

    /// Connect, greet, and converse until the participant leaves.
    pub async fn run(self) -> AgentResult<SessionSummary> {
        let Session {
            config,
            engines,
            mut transport,
            shutdown,
            shutdown_callbacks,
        } = self;

        // A bad configuration must fail here, before the state machine starts.
        config.validate()?;

        transport.connect().await?;
        let participant = transport.wait_for_participant().await?;
        info!("Starting voice session for participant {}", participant.identity);

        let frame_rx = transport.take_audio_input()?;
        let sink = transport.sink()?;

        let (speech_tx, speech_rx) = mpsc::unbounded_channel();
        let vad_config = VadConfig {
            sample_rate: config.sample_rate,
            ..Default::default()
        };
        let _vad_thread = spawn_vad_task(vad_config, frame_rx, speech_tx);

        let (metrics_tx, metrics_rx) = mpsc::unbounded_channel();
        let collector_task = spawn_collector(metrics_rx);

        let mut controller =
            TurnController::new(config.clone(), engines, sink, speech_rx, metrics_tx);

        if !config.greeting.is_empty() {
            if let Err(e) = controller.say(&config.greeting, config.allow_interruptions).await {
                warn!("Greeting failed: {}", e);
            }
        }

        let result = tokio::select! {
            res = controller.run() => res,
            _ = shutdown.cancelled() => {
                info!("Shutdown requested, ending session");
                Ok(())
            }
        };

        // Teardown order matters: close capture so the VAD task exits on
        // its own, drop the controller so the metrics channel closes, then
        // drain the collector for the final summary.
        drop(transport);
        drop(controller);

        let collector = collector_task
            .await
            .map_err(|e| crate::error::AgentError::ChannelSend(e.to_string()))?;
        let summary = collector.summary();
        info!("Usage: {}", summary);
        for callback in shutdown_callbacks {
            callback(&summary);
        }

        result?;
        Ok(summary)
    }
}
