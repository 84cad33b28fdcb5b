//! Download routes
//!
//! - `GET /download/{id}`, `/download/vlog/{id}`, `/download/vlogs/{id}` - one blob
//! - `GET /download/vlogs` - every blob as `all_vlogs.zip`
//!
//! Bodies are chunk streams. Once the headers are out, a storage failure can
//! only abort the connection; there is no way to change the status.

use hyper::header::{HeaderValue, CONTENT_DISPOSITION, CONTENT_TYPE};
use hyper::{Response, StatusCode};
use std::sync::Arc;
use tracing::warn;

use crate::archive::{archive_all, ARCHIVE_CONTENT_TYPE, ARCHIVE_FILENAME};
use crate::server::{error_response, stream_body, to_boxed, AppState, ResponseBody};
use crate::transfer::transfer;
use crate::types::EmogoError;

/// Path prefixes that address a single blob, longest first
const BLOB_PREFIXES: [&str; 3] = ["/download/vlogs/", "/download/vlog/", "/download/"];

/// Extract the identifier segment from a single-blob download path
pub fn download_id(path: &str) -> Option<&str> {
    BLOB_PREFIXES
        .iter()
        .find_map(|prefix| path.strip_prefix(prefix))
        .filter(|id| !id.is_empty() && !id.contains('/'))
}

/// Stream one blob
pub async fn download_blob(state: Arc<AppState>, path: &str) -> Response<ResponseBody> {
    let Some(raw_id) = download_id(path) else {
        return to_boxed(error_response(&EmogoError::NotFound(path.to_string())));
    };

    match transfer(state.blobs.clone(), raw_id, state.args.chunk_size_bytes).await {
        Ok(t) => Response::builder()
            .status(StatusCode::OK)
            .header(CONTENT_TYPE, content_type_header(&t.content_type))
            .header(CONTENT_DISPOSITION, t.content_disposition())
            .body(stream_body(t.chunks))
            .unwrap(),
        Err(e) => {
            if !e.is_not_found() {
                warn!(id = %raw_id, error = %e, "Blob download failed");
            }
            to_boxed(error_response(&e))
        }
    }
}

/// Stream every blob as one ZIP archive
pub fn download_all(state: Arc<AppState>) -> Response<ResponseBody> {
    let chunks = archive_all(state.blobs.clone(), state.args.chunk_size_bytes);

    Response::builder()
        .status(StatusCode::OK)
        .header(CONTENT_TYPE, ARCHIVE_CONTENT_TYPE)
        .header(
            CONTENT_DISPOSITION,
            format!("attachment; filename={}", ARCHIVE_FILENAME),
        )
        .body(stream_body(chunks))
        .unwrap()
}

/// Stored content types come from clients; fall back if not header-safe
fn content_type_header(content_type: &str) -> HeaderValue {
    HeaderValue::from_str(content_type)
        .unwrap_or_else(|_| HeaderValue::from_static(crate::blob::DEFAULT_CONTENT_TYPE))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_download_id_prefixes() {
        let id = "65a1b2c3d4e5f60718293a4b";
        assert_eq!(download_id(&format!("/download/{id}")), Some(id));
        assert_eq!(download_id(&format!("/download/vlog/{id}")), Some(id));
        assert_eq!(download_id(&format!("/download/vlogs/{id}")), Some(id));
        assert_eq!(download_id("/download/"), None);
        assert_eq!(download_id("/download/a/b"), None);
    }
}
