//! Ingestion routes
//!
//! ```text
//! POST /upload/vlog       multipart ──► BlobWriter::write (per chunk) ──► commit
//! POST /upload/sentiment  JSON      ──► RecordStore::insert_sentiment
//! POST /upload/gps        JSON      ──► RecordStore::insert_gps
//! ```
//!
//! Vlog uploads stream field chunks straight into the blob write handle. Any
//! failure before commit aborts the handle, so a broken upload never becomes
//! visible.

use bytes::Bytes;
use futures::TryStreamExt;
use http_body_util::{BodyExt, BodyStream};
use hyper::body::Body;
use hyper::header::CONTENT_TYPE;
use hyper::{Request, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::blob::{BlobId, BlobStore};
use crate::records::{GpsRecord, SentimentRecord};
use crate::server::{error_response, json_response, to_boxed, AppState, ResponseBody};
use crate::types::{EmogoError, Result};

/// Multipart field name the mobile client uses for the video
pub const FILE_FIELD: &str = "file";

/// `POST /upload/vlog`
pub async fn upload_vlog<B>(state: Arc<AppState>, req: Request<B>) -> Response<ResponseBody>
where
    B: Body<Data = Bytes> + Send + 'static,
    B::Error: std::error::Error + Send + Sync + 'static,
{
    match store_vlog(state.blobs.as_ref(), req).await {
        Ok(id) => {
            info!(id = %id, "Vlog uploaded");
            to_boxed(json_response(
                StatusCode::OK,
                &serde_json::json!({ "status": "success", "file_id": id }),
            ))
        }
        Err(e) => {
            warn!(error = %e, "Vlog upload failed");
            to_boxed(error_response(&e))
        }
    }
}

async fn store_vlog<B>(store: &dyn BlobStore, req: Request<B>) -> Result<BlobId>
where
    B: Body<Data = Bytes> + Send + 'static,
    B::Error: std::error::Error + Send + Sync + 'static,
{
    let content_type = req
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| EmogoError::BadRequest("missing Content-Type".into()))?;
    let boundary = multer::parse_boundary(content_type)
        .map_err(|e| EmogoError::BadRequest(format!("not a multipart body: {}", e)))?;

    let body = BodyStream::new(req.into_body())
        .try_filter_map(|frame| async move { Ok(frame.into_data().ok()) });
    let mut multipart = multer::Multipart::new(body, boundary);

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some(FILE_FIELD) && field.file_name().is_none() {
            debug!(field = ?field.name(), "Skipping non-file multipart field");
            continue;
        }
        return store_field(store, field).await;
    }

    Err(EmogoError::BadRequest("no file part in request".into()))
}

async fn store_field(store: &dyn BlobStore, mut field: multer::Field<'_>) -> Result<BlobId> {
    let name = field.file_name().unwrap_or_default().to_string();
    let content_type = field.content_type().map(|m| m.to_string());

    let mut writer = store.create(&name, content_type.as_deref()).await?;

    loop {
        let chunk = match field.chunk().await {
            Ok(Some(chunk)) => chunk,
            Ok(None) => break,
            Err(e) => {
                let _ = writer.abort().await;
                return Err(multipart_error(e));
            }
        };
        if let Err(e) = writer.write(&chunk).await {
            let _ = writer.abort().await;
            return Err(e);
        }
    }

    debug!(name = %name, bytes = writer.written(), "Upload body complete, committing");
    writer.commit().await
}

fn multipart_error(err: multer::Error) -> EmogoError {
    EmogoError::BadRequest(format!("multipart: {}", err))
}

/// Read a small JSON body into a record type; shape errors become 422
async fn read_json<T, B>(req: Request<B>) -> Result<T>
where
    T: DeserializeOwned,
    B: Body<Data = Bytes>,
    B::Error: std::error::Error,
{
    let body = req
        .into_body()
        .collect()
        .await
        .map_err(|e| EmogoError::BadRequest(format!("failed to read body: {}", e)))?
        .to_bytes();
    Ok(serde_json::from_slice(&body)?)
}

fn success() -> Response<ResponseBody> {
    to_boxed(json_response(
        StatusCode::OK,
        &serde_json::json!({ "status": "success" }),
    ))
}

/// `POST /upload/sentiment`
pub async fn upload_sentiment<B>(state: Arc<AppState>, req: Request<B>) -> Response<ResponseBody>
where
    B: Body<Data = Bytes>,
    B::Error: std::error::Error,
{
    let result = async {
        let record: SentimentRecord = read_json(req).await?;
        state.records.insert_sentiment(record).await
    }
    .await;

    match result {
        Ok(()) => success(),
        Err(e) => {
            warn!(error = %e, "Sentiment upload rejected");
            to_boxed(error_response(&e))
        }
    }
}

/// `POST /upload/gps`
pub async fn upload_gps<B>(state: Arc<AppState>, req: Request<B>) -> Response<ResponseBody>
where
    B: Body<Data = Bytes>,
    B::Error: std::error::Error,
{
    let result = async {
        let record: GpsRecord = read_json(req).await?;
        state.records.insert_gps(record).await
    }
    .await;

    match result {
        Ok(()) => success(),
        Err(e) => {
            warn!(error = %e, "GPS upload rejected");
            to_boxed(error_response(&e))
        }
    }
}
