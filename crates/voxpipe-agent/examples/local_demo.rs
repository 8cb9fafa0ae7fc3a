//! Run the full pipeline against the local microphone and speakers with
//! placeholder engines (no API keys needed). Speak; the agent answers
//! with a canned line. Requires the trim service on 127.0.0.1:5000, or
//! you will hear the trim fallback response.
//!
//! ```bash
//! cargo run -p voxpipe-trim &
//! cargo run -p voxpipe-agent --example local_demo
//! ```

use std::sync::Arc;
use voxpipe_agent::{
    AgentConfig, AudioConfig, EngineSet, LocalTransport, PlaceholderLlm, PlaceholderStt,
    PlaceholderTts, Session,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "voxpipe_agent=debug".into()),
        )
        .init();

    let config = AgentConfig::default();
    let engines = EngineSet {
        stt: Arc::new(PlaceholderStt::with_response("hello how are you")),
        llm: Arc::new(PlaceholderLlm::with_response(
            "I heard you loud and clear, this is a placeholder answer.",
        )),
        tts: Arc::new(PlaceholderTts::new(config.sample_rate)),
    };
    let transport = LocalTransport::new(AudioConfig::for_sample_rate(config.sample_rate));

    let mut session = Session::new(config, engines, Box::new(transport));
    session.add_shutdown_callback(|summary| {
        println!("Usage: {}", summary);
    });

    let shutdown = session.shutdown_token();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        shutdown.cancel();
    });

    session.run().await?;
    Ok(())
}
