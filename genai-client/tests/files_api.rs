use std::io::Write;
use std::sync::atomic::Ordering;
use std::time::Duration;

use serde_json::json;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{header, method, path, query_param, query_param_is_missing};
use wiremock::{Mock, MockServer, ResponseTemplate};

use genai_client::types::enums::FileState;
use genai_client::types::files::ListFilesConfig;
use genai_client::{file_part, Error, WaitForFileConfig};

mod support;
use support::{build_gemini_client, file_json, not_found, SequenceResponder};

async fn mount_resumable_upload(server: &MockServer, final_file: serde_json::Value) {
    Mock::given(method("POST"))
        .and(path("/upload/v1beta/files"))
        .and(header("x-goog-upload-command", "start"))
        .and(header("x-goog-upload-protocol", "resumable"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("x-goog-upload-url", format!("{}/upload-session", server.uri())),
        )
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path("/upload-session"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("x-goog-upload-status", "final")
                .set_body_json(json!({ "file": final_file })),
        )
        .mount(server)
        .await;
}

fn fast_poll() -> WaitForFileConfig {
    WaitForFileConfig::default().with_poll_interval(Duration::from_millis(10))
}

#[tokio::test]
async fn upload_then_wait_until_active() {
    let server = MockServer::start().await;
    mount_resumable_upload(&server, file_json("files/video1", "PROCESSING")).await;

    let poll = SequenceResponder::new(vec![
        ResponseTemplate::new(200).set_body_json(file_json("files/video1", "PROCESSING")),
        ResponseTemplate::new(200).set_body_json(file_json("files/video1", "PROCESSING")),
        ResponseTemplate::new(200).set_body_json(file_json("files/video1", "ACTIVE")),
    ]);
    let polls = poll.calls();
    Mock::given(method("GET"))
        .and(path("/v1beta/files/video1"))
        .respond_with(poll)
        .mount(&server)
        .await;

    let client = build_gemini_client(&server.uri());
    let files = client.files();

    let uploaded = files.upload(vec![0u8; 64], "video/mp4").await.unwrap();
    assert_eq!(uploaded.name.as_deref(), Some("files/video1"));
    assert_eq!(uploaded.state, Some(FileState::Processing));
    assert!(matches!(file_part(&uploaded), Err(Error::Validation { .. })));

    let ready = files
        .wait_for_active(uploaded.name.as_deref().unwrap(), fast_poll())
        .await
        .unwrap();
    assert_eq!(ready.state, Some(FileState::Active));
    assert_eq!(polls.load(Ordering::SeqCst), 3);

    let part = file_part(&ready).unwrap();
    let value = serde_json::to_value(&part).unwrap();
    assert_eq!(value["fileData"]["mimeType"], "video/mp4");
}

#[tokio::test]
async fn wait_reports_processing_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1beta/files/broken"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "name": "files/broken",
            "state": "FAILED",
            "error": {"code": 3, "message": "unsupported codec"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = build_gemini_client(&server.uri());
    let err = client
        .files()
        .wait_for_active("files/broken", fast_poll())
        .await
        .unwrap_err();
    match err {
        Error::ProcessingFailed { name, message } => {
            assert_eq!(name, "files/broken");
            assert_eq!(message, "unsupported codec");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn wait_times_out_while_processing() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1beta/files/slow"))
        .respond_with(ResponseTemplate::new(200).set_body_json(file_json("files/slow", "PROCESSING")))
        .mount(&server)
        .await;

    let client = build_gemini_client(&server.uri());
    let err = client
        .files()
        .wait_for_active(
            "slow",
            fast_poll().with_timeout(Some(Duration::from_millis(60))),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Timeout { .. }), "{err:?}");
}

#[tokio::test]
async fn wait_stops_when_cancelled() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1beta/files/slow"))
        .respond_with(ResponseTemplate::new(200).set_body_json(file_json("files/slow", "PROCESSING")))
        .mount(&server)
        .await;

    let client = build_gemini_client(&server.uri());
    let token = CancellationToken::new();
    let config = WaitForFileConfig::default()
        .with_timeout(None)
        .with_cancellation(token.clone());

    let canceller = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        token.cancel();
    });

    let started = std::time::Instant::now();
    let err = client
        .files()
        .wait_for_active("slow", config)
        .await
        .unwrap_err();
    canceller.await.unwrap();
    assert!(matches!(err, Error::Cancelled { .. }), "{err:?}");
    assert!(started.elapsed() < Duration::from_secs(5));
}

async fn mount_slow_lookup(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/v1beta/files/abc"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_delay(Duration::from_secs(3))
                .set_body_json(file_json("files/abc", "PROCESSING")),
        )
        .mount(server)
        .await;
}

#[tokio::test]
async fn cancel_interrupts_in_flight_lookup() {
    let server = MockServer::start().await;
    mount_slow_lookup(&server).await;

    let client = build_gemini_client(&server.uri());
    let token = CancellationToken::new();
    let config = fast_poll()
        .with_timeout(Some(Duration::from_millis(200)))
        .with_cancellation(token.clone());

    let canceller = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        token.cancel();
    });

    let started = std::time::Instant::now();
    let err = client
        .files()
        .wait_for_active("abc", config)
        .await
        .unwrap_err();
    canceller.await.unwrap();
    assert!(matches!(err, Error::Cancelled { .. }), "{err:?}");
    assert!(started.elapsed() < Duration::from_secs(1));
}

#[tokio::test]
async fn deadline_interrupts_in_flight_lookup() {
    let server = MockServer::start().await;
    mount_slow_lookup(&server).await;

    let client = build_gemini_client(&server.uri());
    let started = std::time::Instant::now();
    let err = client
        .files()
        .wait_for_active(
            "abc",
            fast_poll().with_timeout(Some(Duration::from_millis(150))),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Timeout { .. }), "{err:?}");
    assert!(started.elapsed() < Duration::from_secs(1));
}

#[tokio::test]
async fn get_is_idempotent_and_missing_file_is_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1beta/files/abc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(file_json("files/abc", "ACTIVE")))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1beta/files/gone"))
        .respond_with(not_found("File files/gone not found"))
        .expect(1)
        .mount(&server)
        .await;

    let client = build_gemini_client(&server.uri());
    let files = client.files();

    let first = files.get("abc").await.unwrap();
    let second = files.get("files/abc").await.unwrap();
    assert_eq!(first, second);

    let err = files.get("gone").await.unwrap_err();
    match err {
        Error::NotFound { resource, message } => {
            assert_eq!(resource, "files/gone");
            assert_eq!(message, "File files/gone not found");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn upload_from_path_infers_mime_type() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/upload/v1beta/files"))
        .and(header("x-goog-upload-header-content-type", "text/plain"))
        .and(header("x-goog-upload-header-content-length", "11"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("x-goog-upload-url", format!("{}/upload-session", server.uri())),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/upload-session"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("x-goog-upload-status", "final")
                .set_body_json(json!({
                    "file": {"name": "files/notes", "mimeType": "text/plain", "state": "ACTIVE"}
                })),
        )
        .mount(&server)
        .await;

    let mut temp = tempfile::Builder::new().suffix(".txt").tempfile().unwrap();
    temp.write_all(b"hello world").unwrap();
    temp.flush().unwrap();

    let client = build_gemini_client(&server.uri());
    let file = client.files().upload_from_path(temp.path()).await.unwrap();
    assert_eq!(file.name.as_deref(), Some("files/notes"));
    assert_eq!(file.mime_type.as_deref(), Some("text/plain"));
}

#[tokio::test]
async fn upload_bytes_requires_mime_type() {
    let client = build_gemini_client("http://127.0.0.1:9");
    let err = client
        .files()
        .upload(b"abc".to_vec(), " ")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation { .. }));
}

#[tokio::test]
async fn list_download_and_delete() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1beta/files/file1:download"))
        .and(query_param("alt", "media"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![1u8, 2, 3]))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1beta/files"))
        .and(query_param("pageSize", "1"))
        .and(query_param_is_missing("pageToken"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "files": [{"name": "files/file1"}],
            "nextPageToken": "next"
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1beta/files"))
        .and(query_param("pageSize", "1"))
        .and(query_param("pageToken", "next"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "files": [{"name": "files/file2"}]
        })))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/v1beta/files/file1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    let client = build_gemini_client(&server.uri());
    let files = client.files();

    assert_eq!(files.download("file1").await.unwrap(), vec![1u8, 2, 3]);

    let page = files
        .list_with_config(ListFilesConfig {
            page_size: Some(1),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(page.files.unwrap().len(), 1);
    assert_eq!(page.next_page_token.as_deref(), Some("next"));

    let all = files
        .all_with_config(ListFilesConfig {
            page_size: Some(1),
            ..Default::default()
        })
        .await
        .unwrap();
    let names: Vec<_> = all.iter().filter_map(|file| file.name.as_deref()).collect();
    assert_eq!(names, ["files/file1", "files/file2"]);

    files.delete("files/file1").await.unwrap();
}
