//! Post-processor contract tests against the real trimming service
//! router, mounted in-process on an ephemeral port.

use axum::http::StatusCode;
use axum::routing::post;
use axum::Router;
use voxpipe_agent::{ResponseTrimmer, TRIM_FALLBACK};
use voxpipe_trim::{router, TrimState};

async fn serve(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}/flask-api", addr)
}

async fn serve_trim_service() -> String {
    serve(router(TrimState::default())).await
}

#[tokio::test]
async fn short_text_passes_through_unchanged() {
    let endpoint = serve_trim_service().await;
    let trimmer = ResponseTrimmer::new(endpoint);

    let out = trimmer.process("hello how are you").await;
    assert_eq!(out, "hello how are you");
}

#[tokio::test]
async fn empty_text_passes_through() {
    let endpoint = serve_trim_service().await;
    let trimmer = ResponseTrimmer::new(endpoint);

    assert_eq!(trimmer.process("").await, "");
}

#[tokio::test]
async fn long_text_is_trimmed_to_exactly_150_words() {
    let endpoint = serve_trim_service().await;
    let trimmer = ResponseTrimmer::new(endpoint);

    let words: Vec<String> = (0..200).map(|i| format!("word{}", i)).collect();
    let out = trimmer.process(&words.join(" ")).await;

    let out_words: Vec<&str> = out.split_whitespace().collect();
    assert_eq!(out_words.len(), 150);
    assert_eq!(out_words.first(), Some(&"word0"));
    assert_eq!(out_words.last(), Some(&"word149"));
    // Rejoined with single spaces.
    assert_eq!(out, words[..150].join(" "));
}

#[tokio::test]
async fn http_500_yields_fallback() {
    let app = Router::new().route(
        "/flask-api",
        post(|| async { StatusCode::INTERNAL_SERVER_ERROR }),
    );
    let endpoint = serve(app).await;
    let trimmer = ResponseTrimmer::new(endpoint);

    let out = trimmer.process("anything at all").await;
    assert_eq!(out, TRIM_FALLBACK);
}

#[tokio::test]
async fn missing_message_field_yields_fallback() {
    let app = Router::new().route(
        "/flask-api",
        post(|| async { axum::Json(serde_json::json!({"msg": "wrong key"})) }),
    );
    let endpoint = serve(app).await;
    let trimmer = ResponseTrimmer::new(endpoint);

    let out = trimmer.process("anything").await;
    assert_eq!(out, TRIM_FALLBACK);
}

#[tokio::test]
async fn non_json_body_yields_fallback() {
    let app = Router::new().route("/flask-api", post(|| async { "plain text, not json" }));
    let endpoint = serve(app).await;
    let trimmer = ResponseTrimmer::new(endpoint);

    let out = trimmer.process("anything").await;
    assert_eq!(out, TRIM_FALLBACK);
}

#[tokio::test]
async fn unreachable_service_yields_fallback_regardless_of_length() {
    let trimmer = ResponseTrimmer::new("http://127.0.0.1:1/flask-api");

    let short = trimmer.process("hi").await;
    let long_text: Vec<String> = (0..300).map(|i| format!("w{}", i)).collect();
    let long = trimmer.process(&long_text.join(" ")).await;

    assert_eq!(short, TRIM_FALLBACK);
    assert_eq!(long, TRIM_FALLBACK);
}
