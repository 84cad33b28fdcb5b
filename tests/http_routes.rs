//! Router tests
//!
//! Drives `handle_request` directly with in-memory bodies and stores; no
//! socket is opened.

use async_trait::async_trait;
use bytes::Bytes;
use emogo::blob::{
    put_bytes, BlobId, BlobReader, BlobStore, BlobWriter, ListOrder, MemoryBlobStore,
    MetadataStream,
};
use emogo::records::MemoryRecordStore;
use emogo::server::{handle_request, AppState, ResponseBody};
use emogo::{Args, EmogoError, Result};
use http_body_util::{BodyExt, Full};
use hyper::{Method, Request, Response, StatusCode};
use std::io::{Cursor, Read};
use std::net::SocketAddr;
use std::sync::Arc;

const BOUNDARY: &str = "emogo-test-boundary";

fn test_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 40000))
}

fn memory_state() -> (Arc<AppState>, Arc<MemoryBlobStore>) {
    let blobs = Arc::new(MemoryBlobStore::new());
    let state = AppState::new(
        Args::default(),
        blobs.clone(),
        Arc::new(MemoryRecordStore::new()),
    );
    (Arc::new(state), blobs)
}

async fn send(
    state: &Arc<AppState>,
    method: Method,
    uri: &str,
    content_type: Option<&str>,
    body: impl Into<Bytes>,
) -> Response<ResponseBody> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(ct) = content_type {
        builder = builder.header("Content-Type", ct);
    }
    let req = builder.body(Full::new(body.into())).unwrap();
    handle_request(Arc::clone(state), test_addr(), req)
        .await
        .unwrap()
}

async fn get(state: &Arc<AppState>, uri: &str) -> Response<ResponseBody> {
    send(state, Method::GET, uri, None, Bytes::new()).await
}

async fn body_bytes(response: Response<ResponseBody>) -> Bytes {
    response.into_body().collect().await.unwrap().to_bytes()
}

async fn body_json(response: Response<ResponseBody>) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

fn multipart(field: &str, filename: &str, content_type: &str, data: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\n\
             Content-Type: {content_type}\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    body
}

async fn upload(state: &Arc<AppState>, filename: &str, data: &[u8]) -> Response<ResponseBody> {
    send(
        state,
        Method::POST,
        "/upload/vlog",
        Some(&format!("multipart/form-data; boundary={BOUNDARY}")),
        multipart("file", filename, "video/mp4", data),
    )
    .await
}

/// Store whose medium is unreachable
struct UnavailableStore;

#[async_trait]
impl BlobStore for UnavailableStore {
    async fn create(&self, _name: &str, _ct: Option<&str>) -> Result<Box<dyn BlobWriter>> {
        Err(EmogoError::StorageUnavailable("no server".into()))
    }

    async fn open(&self, _id: &BlobId) -> Result<Box<dyn BlobReader>> {
        Err(EmogoError::StorageUnavailable("no server".into()))
    }

    async fn list(&self, _order: ListOrder, _limit: Option<usize>) -> Result<MetadataStream> {
        Err(EmogoError::StorageUnavailable("no server".into()))
    }

    async fn scan(&self) -> Result<MetadataStream> {
        Err(EmogoError::StorageUnavailable("no server".into()))
    }

    fn backend(&self) -> &'static str {
        "unavailable"
    }
}

#[tokio::test]
async fn test_root_and_health() {
    let (state, _) = memory_state();

    let response = get(&state, "/").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        body_json(response).await["message"],
        "EmoGo Backend is running"
    );

    let response = get(&state, "/health").await;
    assert_eq!(response.status(), StatusCode::OK);
    let health = body_json(response).await;
    assert_eq!(health["healthy"], true);
    assert_eq!(health["storage"], "memory");
    assert_eq!(health["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_upload_then_download_vlog() {
    let (state, blobs) = memory_state();
    let data: Vec<u8> = (0..100_000u32).map(|i| (i % 253) as u8).collect();

    let response = upload(&state, "clip.mp4", &data).await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "success");
    let id = json["file_id"].as_str().unwrap().to_string();
    assert_eq!(id.len(), 24);

    for prefix in ["/download/", "/download/vlog/", "/download/vlogs/"] {
        let response = get(&state, &format!("{prefix}{id}")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["content-type"], "video/mp4");
        assert_eq!(
            response.headers()["content-disposition"],
            "attachment; filename=clip.mp4"
        );
        assert_eq!(response.headers()["access-control-allow-origin"], "*");
        assert_eq!(body_bytes(response).await, data);
    }
    assert_eq!(blobs.open_readers(), 0);
}

#[tokio::test]
async fn test_upload_without_file_part_is_rejected() {
    let (state, blobs) = memory_state();
    let body = format!(
        "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"note\"\r\n\r\nhello\r\n--{BOUNDARY}--\r\n"
    );

    let response = send(
        &state,
        Method::POST,
        "/upload/vlog",
        Some(&format!("multipart/form-data; boundary={BOUNDARY}")),
        body,
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(blobs.is_empty().await);

    let response = send(&state, Method::POST, "/upload/vlog", None, "raw").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_truncated_upload_leaves_nothing_behind() {
    let (state, blobs) = memory_state();
    let mut body = multipart("file", "cut.mp4", "video/mp4", &[9u8; 5000]);
    // Drop the closing boundary so the body ends mid-field
    body.truncate(body.len() - BOUNDARY.len() - 8);

    let response = send(
        &state,
        Method::POST,
        "/upload/vlog",
        Some(&format!("multipart/form-data; boundary={BOUNDARY}")),
        body,
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(blobs.is_empty().await);
}

#[tokio::test]
async fn test_download_unknown_id_is_404() {
    let (state, _) = memory_state();
    let unassigned = BlobId::new().to_string();

    for uri in [
        "/download/vlog/not-an-id".to_string(),
        format!("/download/{unassigned}"),
        "/download/vlog/".to_string(),
    ] {
        let response = get(&state, &uri).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND, "{uri}");
        assert_eq!(body_json(response).await["detail"], "File not found");
    }
}

#[tokio::test]
async fn test_download_all_vlogs_zip() {
    let (state, blobs) = memory_state();
    let a = put_bytes(blobs.as_ref(), "clip.mp4", Some("video/mp4"), b"aaaa", 2)
        .await
        .unwrap();
    let b = put_bytes(blobs.as_ref(), "clip.mp4", Some("video/mp4"), b"bbbbbb", 2)
        .await
        .unwrap();

    let response = get(&state, "/download/vlogs").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-type"], "application/zip");
    assert_eq!(
        response.headers()["content-disposition"],
        "attachment; filename=all_vlogs.zip"
    );

    let bytes = body_bytes(response).await;
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes.to_vec())).unwrap();
    assert_eq!(archive.len(), 2);
    for (id, expected) in [(a, "aaaa"), (b, "bbbbbb")] {
        let mut content = String::new();
        archive
            .by_name(&format!("{id}_clip.mp4"))
            .unwrap()
            .read_to_string(&mut content)
            .unwrap();
        assert_eq!(content, expected);
    }
}

#[tokio::test]
async fn test_download_all_from_empty_store() {
    let (state, _) = memory_state();
    let response = get(&state, "/download/vlogs").await;
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = body_bytes(response).await;
    let archive = zip::ZipArchive::new(Cursor::new(bytes.to_vec())).unwrap();
    assert_eq!(archive.len(), 0);
}

#[tokio::test]
async fn test_structured_uploads_and_listing() {
    let (state, blobs) = memory_state();

    let response = send(
        &state,
        Method::POST,
        "/upload/sentiment",
        Some("application/json"),
        r#"{"timestamp":"2024-05-01T10:00:00Z","data":{"mood":4,"note":"<b>ok</b>"}}"#,
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["status"], "success");

    let response = send(
        &state,
        Method::POST,
        "/upload/gps",
        Some("application/json"),
        r#"{"timestamp":"2024-05-01T10:00:01Z","latitude":25.0173,"longitude":121.5398}"#,
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    put_bytes(blobs.as_ref(), "walk.mp4", Some("video/mp4"), b"vv", 2)
        .await
        .unwrap();

    let response = get(&state, "/api/data").await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["sentiments"][0]["data"]["mood"], 4);
    assert_eq!(json["gps_data"][0]["latitude"], 25.0173);
    assert_eq!(json["vlogs"][0]["filename"], "walk.mp4");

    let response = get(&state, "/data").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers()["content-type"]
        .to_str()
        .unwrap()
        .starts_with("text/html"));
    let html = String::from_utf8(body_bytes(response).await.to_vec()).unwrap();
    assert!(html.contains("walk.mp4"));
    assert!(html.contains("/download/vlogs"));
    assert!(html.contains("&lt;b&gt;ok&lt;/b&gt;"));
}

#[tokio::test]
async fn test_bad_record_shape_is_422() {
    let (state, _) = memory_state();

    let response = send(
        &state,
        Method::POST,
        "/upload/gps",
        Some("application/json"),
        r#"{"timestamp":"t","latitude":"north"}"#,
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let response = send(
        &state,
        Method::POST,
        "/upload/sentiment",
        Some("application/json"),
        "not json",
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_storage_unavailable_is_503() {
    let state = Arc::new(AppState::new(
        Args::default(),
        Arc::new(UnavailableStore),
        Arc::new(MemoryRecordStore::new()),
    ));

    let response = upload(&state, "clip.mp4", b"data").await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    let response = get(&state, &format!("/download/vlog/{}", BlobId::new())).await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    let response = get(&state, "/data").await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_preflight_and_unknown_route() {
    let (state, _) = memory_state();

    let response = send(&state, Method::OPTIONS, "/upload/vlog", None, Bytes::new()).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["access-control-allow-origin"], "*");

    let response = get(&state, "/nope").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
