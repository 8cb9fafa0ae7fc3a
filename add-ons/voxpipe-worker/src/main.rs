//! Worker entrypoint: configuration, engine selection, and one local
//! voice session. A missing LLM credential aborts startup; everything
//! after that is recovered inside the pipeline.

use std::sync::Arc;
use tracing::{info, warn};
use voxpipe_agent::{
    AgentConfig, AudioConfig, EngineConfig, EngineSet, HttpLlm, HttpStt, HttpTts, LocalTransport,
    PlaceholderStt, PlaceholderTts, Session, SttEngine, TtsEngine,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env.local wins over .env, matching the deployment layout.
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "voxpipe_agent=info,voxpipe_worker=info".into()),
        )
        .init();

    let config = AgentConfig::from_env()?;
    // Fatal without an LLM credential; the session must not start half-wired.
    let engine_config = EngineConfig::from_env()?;

    let llm = Arc::new(HttpLlm::new(
        engine_config.llm_api_url.clone(),
        engine_config.llm_api_key.clone(),
        engine_config.llm_model.clone(),
    )?);

    let stt: Arc<dyn SttEngine> = match engine_config.stt_api_key {
        Some(ref key) => Arc::new(HttpStt::new(
            engine_config.stt_api_url.clone(),
            key.clone(),
            engine_config.stt_model.clone(),
        )?),
        None => {
            warn!("No STT API key; using placeholder transcription");
            Arc::new(PlaceholderStt::new())
        }
    };

    let tts: Arc<dyn TtsEngine> = match engine_config.tts_api_key {
        Some(ref key) => Arc::new(HttpTts::new(
            engine_config.tts_api_url.clone(),
            key.clone(),
            engine_config.tts_model.clone(),
            engine_config.tts_voice.clone(),
        )?),
        None => {
            warn!("No TTS API key; using placeholder synthesis");
            Arc::new(PlaceholderTts::new(config.sample_rate))
        }
    };

    let engines = EngineSet { stt, llm, tts };
    let transport = LocalTransport::new(AudioConfig::for_sample_rate(config.sample_rate));

    let mut session = Session::new(config, engines, Box::new(transport));
    session.add_shutdown_callback(|summary| {
        info!("Usage: {}", summary);
    });

    let shutdown = session.shutdown_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("ctrl-c received, shutting down");
            shutdown.cancel();
        }
    });

    let summary = session.run().await?;
    info!("Session ended: {}", summary);
    Ok(())
}
