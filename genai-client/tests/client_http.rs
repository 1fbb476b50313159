use serde_json::json;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use genai_client::{Client, Error};

#[tokio::test]
async fn api_key_header_is_inserted() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1beta/models"))
        .and(header("x-goog-api-key", "test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "models": []
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = Client::builder()
        .api_key("test-key")
        .base_url(server.uri())
        .build()
        .unwrap();
    let models = client.models();
    let _ = models.list().await.unwrap();
}

#[tokio::test]
async fn custom_headers_and_api_version_are_applied() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/models"))
        .and(header("x-goog-api-key", "custom-key"))
        .and(header("x-app", "demo"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "models": []
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = Client::builder()
        .api_key("test-key")
        .header("x-goog-api-key", "custom-key")
        .header("x-app", "demo")
        .base_url(format!("{}/", server.uri()))
        .api_version("v1")
        .build()
        .unwrap();
    let models = client.models();
    let _ = models.list().await.unwrap();
}

#[test]
fn blank_api_key_is_rejected() {
    let err = Client::builder().api_key("   ").build().err().unwrap();
    assert!(matches!(err, Error::InvalidConfig { .. }));

    let err = Client::builder().build().err().unwrap();
    assert!(matches!(err, Error::InvalidConfig { .. }));
}

#[test]
fn invalid_header_is_rejected() {
    let err = Client::builder()
        .api_key("test-key")
        .header("bad header", "value")
        .build()
        .err()
        .unwrap();
    assert!(matches!(err, Error::InvalidConfig { .. }));
}
