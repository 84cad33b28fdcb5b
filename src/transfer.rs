//! Single-blob streaming transfer
//!
//! Turns one `open` + repeated `read` into an outward chunk stream:
//!
//! ```text
//! GET /download/vlog/{id}
//!   └── BlobStore::open(id) ──► BlobReader ──► read(chunk_size) ... EOF
//!                                   │
//!                                   └── dropped on completion, error or disconnect
//! ```
//!
//! The stream is pull-based: the next chunk is only read from storage when
//! the transport asks for it, so a slow client throttles the storage reads.

use bytes::Bytes;
use futures::stream::{self, BoxStream, StreamExt};
use hyper::header::HeaderValue;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::blob::{BlobMetadata, BlobReader, BlobStore};
use crate::types::{EmogoError, Result};

/// Chunk size used by the download routes (1 MiB)
pub const DEFAULT_CHUNK_SIZE: usize = 1024 * 1024;

/// Finite, single-use sequence of content chunks
pub type ChunkStream = BoxStream<'static, Result<Bytes>>;

/// An opened single-object download
pub struct Transfer {
    pub metadata: BlobMetadata,
    /// Stored content type or the generic binary fallback
    pub content_type: String,
    pub chunks: ChunkStream,
}

impl Transfer {
    /// `Content-Disposition` value for this download
    pub fn content_disposition(&self) -> HeaderValue {
        content_disposition(&self.metadata)
    }
}

/// Build `attachment; filename=<name>`.
///
/// Names that cannot be carried in a header (control characters, non-ASCII)
/// fall back to the blob identifier.
pub fn content_disposition(metadata: &BlobMetadata) -> HeaderValue {
    let preferred = format!("attachment; filename={}", metadata.name);
    if !metadata.name.is_empty() && metadata.name.is_ascii() {
        if let Ok(value) = HeaderValue::from_str(&preferred) {
            return value;
        }
    }
    debug!(id = %metadata.id, "Filename not header-safe, using identifier");
    HeaderValue::from_str(&format!("attachment; filename={}", metadata.id))
        .unwrap_or_else(|_| HeaderValue::from_static("attachment"))
}

/// Open a blob by client-supplied identifier and wrap it as a chunk stream.
///
/// `NotFound` (including malformed ids) is returned unchanged.
pub async fn transfer(
    store: Arc<dyn BlobStore>,
    raw_id: &str,
    chunk_size: usize,
) -> Result<Transfer> {
    let reader = store.open_str(raw_id).await?;
    let metadata = reader.metadata().clone();
    let content_type = metadata.content_type_or_default().to_string();

    info!(
        id = %metadata.id,
        name = %metadata.name,
        size = metadata.size,
        content_type = %content_type,
        "Starting blob transfer"
    );

    Ok(Transfer {
        metadata,
        content_type,
        chunks: chunk_stream(reader, chunk_size),
    })
}

/// Read state carried between chunks
struct ChunkCursor {
    reader: Box<dyn BlobReader>,
    chunk_size: usize,
    sent_bytes: u64,
    finished: bool,
}

impl Drop for ChunkCursor {
    fn drop(&mut self) {
        if !self.finished {
            let aborted = EmogoError::StreamAborted {
                sent_bytes: self.sent_bytes,
            };
            debug!(id = %self.reader.metadata().id, "{}", aborted);
        }
    }
}

/// Wrap a reader as a stream of chunks no larger than `chunk_size`.
///
/// The reader is owned by the stream and released as soon as the stream
/// ends or is dropped. Polling after the end keeps returning `None`.
pub fn chunk_stream(reader: Box<dyn BlobReader>, chunk_size: usize) -> ChunkStream {
    let cursor = ChunkCursor {
        reader,
        chunk_size: chunk_size.max(1),
        sent_bytes: 0,
        finished: false,
    };

    stream::unfold(Some(cursor), |state| async move {
        let mut cursor = state?;
        match cursor.reader.read(cursor.chunk_size).await {
            Ok(Some(chunk)) => {
                cursor.sent_bytes += chunk.len() as u64;
                Some((Ok(chunk), Some(cursor)))
            }
            Ok(None) => {
                cursor.finished = true;
                debug!(
                    id = %cursor.reader.metadata().id,
                    bytes = cursor.sent_bytes,
                    "Blob transfer complete"
                );
                None
            }
            Err(e) => {
                // No retry; the reader is released before the error is yielded.
                cursor.finished = true;
                warn!(
                    id = %cursor.reader.metadata().id,
                    sent = cursor.sent_bytes,
                    error = %e,
                    "Blob read failed mid-stream"
                );
                drop(cursor);
                Some((Err(e), None))
            }
        }
    })
    .fuse()
    .boxed()
}
