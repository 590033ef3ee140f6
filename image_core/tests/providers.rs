//! HTTP providers against a local mock server

mod common;

use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use common::png_bytes;
use image_core::providers::{OpenAiImagesProvider, PollinationsProvider};
use image_core::{ImageProvider, ImageRequest, ProviderError};
use mockito::Matcher;
use serde_json::json;

fn request(prompt: &str) -> ImageRequest {
    ImageRequest {
        prompt: prompt.to_string(),
        width: 768,
        height: 768,
        format: "png".to_string(),
    }
}

#[tokio::test]
async fn test_pollinations_returns_body_and_content_type() {
    let mut server = mockito::Server::new_async().await;
    let png = png_bytes(4, 4);
    let mock = server
        .mock(
            "GET",
            Matcher::Regex(r"^/prompt/a(%20| )glowing(%20| )orb$".to_string()),
        )
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("width".into(), "768".into()),
            Matcher::UrlEncoded("height".into(), "768".into()),
            Matcher::UrlEncoded("nologo".into(), "true".into()),
        ]))
        .with_status(200)
        .with_header("content-type", "image/png")
        .with_body(png.clone())
        .create_async()
        .await;

    let provider = PollinationsProvider::new(&server.url(), Duration::from_secs(5)).unwrap();
    let raw = provider.generate(&request("a glowing orb")).await.unwrap();
    assert_eq!(raw.bytes, png);
    assert_eq!(raw.mime_type.as_deref(), Some("image/png"));
    mock.assert_async().await;
}

#[tokio::test]
async fn test_pollinations_error_status_is_http_error() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", Matcher::Regex(r"^/prompt/.*$".to_string()))
        .with_status(502)
        .with_body("bad gateway")
        .create_async()
        .await;

    let provider = PollinationsProvider::new(&server.url(), Duration::from_secs(5)).unwrap();
    let err = provider.generate(&request("x")).await.unwrap_err();
    assert_eq!(
        err,
        ProviderError::Http {
            status: 502,
            body: "bad gateway".to_string()
        }
    );
}

#[tokio::test]
async fn test_openai_decodes_b64_json() {
    let mut server = mockito::Server::new_async().await;
    let png = png_bytes(4, 4);
    let mock = server
        .mock("POST", "/images/generations")
        .match_header("authorization", "Bearer sk-test")
        .match_body(Matcher::PartialJson(json!({
            "model": "dall-e-3",
            "prompt": "a glowing orb",
            "n": 1,
            "size": "1024x1024",
            "response_format": "b64_json"
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({"data": [{"b64_json": BASE64.encode(&png)}]}).to_string())
        .create_async()
        .await;

    let provider =
        OpenAiImagesProvider::new(&server.url(), "sk-test", "dall-e-3", Duration::from_secs(5)).unwrap();
    let raw = provider.generate(&request("a glowing orb")).await.unwrap();
    assert_eq!(raw.bytes, png);
    mock.assert_async().await;
}

#[tokio::test]
async fn test_openai_follows_url_when_no_b64() {
    let mut server = mockito::Server::new_async().await;
    let png = png_bytes(2, 2);
    let image_url = format!("{}/files/orb.png", server.url());
    server
        .mock("POST", "/images/generations")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({"data": [{"url": image_url}]}).to_string())
        .create_async()
        .await;
    server
        .mock("GET", "/files/orb.png")
        .with_status(200)
        .with_header("content-type", "image/png")
        .with_body(png.clone())
        .create_async()
        .await;

    let provider =
        OpenAiImagesProvider::new(&server.url(), "sk-test", "dall-e-3", Duration::from_secs(5)).unwrap();
    let raw = provider.generate(&request("x")).await.unwrap();
    assert_eq!(raw.bytes, png);
    assert_eq!(raw.mime_type.as_deref(), Some("image/png"));
}

#[tokio::test]
async fn test_openai_billing_error_is_http_error() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/images/generations")
        .with_status(400)
        .with_body(r#"{"error":{"code":"billing_hard_limit_reached"}}"#)
        .create_async()
        .await;

    let provider =
        OpenAiImagesProvider::new(&server.url(), "sk-test", "dall-e-3", Duration::from_secs(5)).unwrap();
    match provider.generate(&request("x")).await.unwrap_err() {
        ProviderError::Http { status, body } => {
            assert_eq!(status, 400);
            assert!(body.contains("billing_hard_limit_reached"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_openai_empty_data_is_invalid_response() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/images/generations")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({"data": []}).to_string())
        .create_async()
        .await;

    let provider =
        OpenAiImagesProvider::new(&server.url(), "sk-test", "dall-e-3", Duration::from_secs(5)).unwrap();
    let err = provider.generate(&request("x")).await.unwrap_err();
    assert!(matches!(err, ProviderError::InvalidResponse(_)));
}
