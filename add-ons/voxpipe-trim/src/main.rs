//! Trimming service binary. Config-driven via env:
//! `VOXPIPE_TRIM_ADDR` (default 127.0.0.1:5000) and
//! `VOXPIPE_TRIM_MAX_WORDS` (default 150).

use tracing::info;
use voxpipe_trim::{router, TrimState, DEFAULT_MAX_WORDS};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "voxpipe_trim=info".into()),
        )
        .init();

    let addr = std::env::var("VOXPIPE_TRIM_ADDR").unwrap_or_else(|_| "127.0.0.1:5000".to_string());
    let max_words = std::env::var("VOXPIPE_TRIM_MAX_WORDS")
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(DEFAULT_MAX_WORDS);

    let app = router(TrimState { max_words });

    info!("Trim service listening on {} (limit {} words)", addr, max_words);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
