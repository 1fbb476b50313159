use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{body_json, body_partial_json, method, path, query_param, query_param_is_missing};
use wiremock::{Mock, MockServer, ResponseTemplate};

use genai_client::types::caches::{
    CreateCachedContentConfig, ListCachedContentsConfig, UpdateCachedContentConfig,
};
use genai_client::types::content::Content;
use genai_client::Error;

mod support;
use support::{build_gemini_client, not_found, SequenceResponder};

#[tokio::test]
async fn create_get_delete_then_not_found() {
    let server = MockServer::start().await;
    let cached = json!({
        "name": "cachedContents/c1",
        "model": "models/m1",
        "contents": [{"role": "user", "parts": [{"text": "Hello"}]}],
        "expireTime": "2030-01-01T00:00:00Z",
        "usageMetadata": {"totalTokenCount": 1}
    });

    Mock::given(method("POST"))
        .and(path("/v1beta/cachedContents"))
        .and(body_partial_json(json!({
            "model": "models/m1",
            "contents": [{"role": "user", "parts": [{"text": "Hello"}]}],
            "ttl": "300s"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(cached.clone()))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v1beta/cachedContents/c1"))
        .respond_with(SequenceResponder::new(vec![
            ResponseTemplate::new(200).set_body_json(cached.clone()),
            not_found("CachedContent not found (or permission denied)"),
        ]))
        .expect(2)
        .mount(&server)
        .await;

    Mock::given(method("DELETE"))
        .and(path("/v1beta/cachedContents/c1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    let client = build_gemini_client(&server.uri());
    let caches = client.caches();

    let turns = vec![Content::user("Hello")];
    let created = caches
        .create(
            "m1",
            CreateCachedContentConfig {
                contents: Some(turns.clone()),
                ttl: Some(Duration::from_secs(300)),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    let name = created.name.clone().unwrap();
    assert_eq!(name, "cachedContents/c1");
    assert_eq!(created.model.as_deref(), Some("models/m1"));

    let got = caches.get(&name).await.unwrap();
    assert_eq!(got.contents.as_deref(), Some(turns.as_slice()));
    assert_eq!(got, created);

    caches.delete(&name).await.unwrap();

    let err = caches.get(&name).await.unwrap_err();
    assert!(err.is_not_found());
    assert!(matches!(err, Error::NotFound { ref resource, .. } if resource == "cachedContents/c1"));
}

#[tokio::test]
async fn update_sends_single_field_mask() {
    let server = MockServer::start().await;

    Mock::given(method("PATCH"))
        .and(path("/v1beta/cachedContents/c1"))
        .and(query_param("updateMask", "ttl"))
        .and(body_json(json!({"ttl": "600s"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "name": "cachedContents/c1",
            "expireTime": "2030-01-01T00:10:00Z"
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("PATCH"))
        .and(path("/v1beta/cachedContents/c1"))
        .and(query_param("updateMask", "expireTime"))
        .and(body_json(json!({"expireTime": "2031-01-01T00:00:00Z"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "name": "cachedContents/c1",
            "expireTime": "2031-01-01T00:00:00Z"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = build_gemini_client(&server.uri());
    let caches = client.caches();

    let updated = caches
        .update("c1", UpdateCachedContentConfig::ttl(Duration::from_secs(600)))
        .await
        .unwrap();
    assert_eq!(updated.expire_time.as_deref(), Some("2030-01-01T00:10:00Z"));

    let updated = caches
        .update(
            "cachedContents/c1",
            UpdateCachedContentConfig::expire_time("2031-01-01T00:00:00Z"),
        )
        .await
        .unwrap();
    assert_eq!(updated.expire_time.as_deref(), Some("2031-01-01T00:00:00Z"));

    let err = caches
        .update(
            "c1",
            UpdateCachedContentConfig {
                ttl: Some(Duration::from_secs(60)),
                expire_time: Some("2031-01-01T00:00:00Z".into()),
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation { .. }));
}

#[tokio::test]
async fn list_pages_through_all_caches() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1beta/cachedContents"))
        .and(query_param("pageSize", "2"))
        .and(query_param_is_missing("pageToken"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "cachedContents": [{"name": "cachedContents/1"}, {"name": "cachedContents/2"}],
            "nextPageToken": "next"
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v1beta/cachedContents"))
        .and(query_param("pageSize", "2"))
        .and(query_param("pageToken", "next"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "cachedContents": [{"name": "cachedContents/3"}]
        })))
        .mount(&server)
        .await;

    let client = build_gemini_client(&server.uri());
    let caches = client.caches();

    let page = caches
        .list_with_config(ListCachedContentsConfig {
            page_size: Some(2),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(page.cached_contents.unwrap().len(), 2);

    let all = caches
        .all_with_config(ListCachedContentsConfig {
            page_size: Some(2),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(all.len(), 3);
}

#[tokio::test]
async fn mutations_are_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1beta/cachedContents"))
        .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/v1beta/cachedContents/bad"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .expect(1)
        .mount(&server)
        .await;

    let client = build_gemini_client(&server.uri());
    let caches = client.caches();

    let err = caches
        .create("m1", CreateCachedContentConfig::default())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ApiError { status: 503, .. }));

    let err = caches.delete("bad").await.unwrap_err();
    assert!(matches!(err, Error::ApiError { status: 500, .. }));
}
