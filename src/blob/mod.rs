//! Blob storage for vlog uploads
//!
//! Blobs are write-once binary objects with a small metadata record. They are
//! created through a [`BlobWriter`] (append chunks, then commit), read back
//! through a cursor-based [`BlobReader`], and enumerated lazily.
//!
//! ## Backends
//!
//! - [`GridFsBlobStore`] - MongoDB GridFS bucket (production)
//! - [`MemoryBlobStore`] - process-local store (tests, dev mode without MongoDB)
//!
//! ## Visibility
//!
//! A blob becomes visible to `open`, `list` and `scan` only after `commit`.
//! Aborting or dropping a writer leaves nothing enumerable behind.

mod gridfs;
mod memory;

pub use gridfs::GridFsBlobStore;
pub use memory::MemoryBlobStore;

use bson::oid::ObjectId;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

use crate::types::{EmogoError, Result};

/// Fallback media type when a blob was stored without one
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Store-assigned blob identifier (24 hex characters on the wire)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlobId(ObjectId);

impl BlobId {
    pub fn new() -> Self {
        Self(ObjectId::new())
    }

    /// Parse an identifier supplied by a client.
    ///
    /// Anything that is not a well-formed ObjectId is reported as
    /// `NotFound`, the same outcome as a well-formed id that was never issued.
    pub fn parse(raw: &str) -> Result<Self> {
        ObjectId::parse_str(raw)
            .map(Self)
            .map_err(|_| EmogoError::NotFound(raw.to_string()))
    }

    pub fn as_object_id(&self) -> ObjectId {
        self.0
    }
}

impl Default for BlobId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<ObjectId> for BlobId {
    fn from(oid: ObjectId) -> Self {
        Self(oid)
    }
}

impl FromStr for BlobId {
    type Err = EmogoError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for BlobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.to_hex())
    }
}

impl Serialize for BlobId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_hex())
    }
}

/// Metadata stored alongside every blob
#[derive(Debug, Clone, Serialize)]
pub struct BlobMetadata {
    pub id: BlobId,
    /// Original upload filename (may be empty, not unique)
    pub name: String,
    pub content_type: Option<String>,
    pub size: u64,
    pub uploaded_at: DateTime<Utc>,
}

impl BlobMetadata {
    /// Stored content type, or the generic binary type
    pub fn content_type_or_default(&self) -> &str {
        self.content_type
            .as_deref()
            .filter(|ct| !ct.is_empty())
            .unwrap_or(DEFAULT_CONTENT_TYPE)
    }
}

/// Supported listing orders
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ListOrder {
    /// Most recent upload first
    #[default]
    UploadedDesc,
}

/// Lazy sequence of metadata records. Dropping it stops the enumeration.
pub type MetadataStream = BoxStream<'static, Result<BlobMetadata>>;

/// Write handle for a blob that is not yet visible.
///
/// `commit` and `abort` consume the handle, so a committed blob can never be
/// appended to.
#[async_trait::async_trait]
pub trait BlobWriter: Send {
    /// Append one chunk of content
    async fn write(&mut self, chunk: &[u8]) -> Result<()>;

    /// Bytes accepted so far
    fn written(&self) -> u64;

    /// Finalize the blob and make it visible to readers
    async fn commit(self: Box<Self>) -> Result<BlobId>;

    /// Discard everything written so far
    async fn abort(self: Box<Self>) -> Result<()>;
}

/// Cursor over the content of one committed blob
#[async_trait::async_trait]
pub trait BlobReader: Send {
    fn metadata(&self) -> &BlobMetadata;

    /// Read up to `max_bytes` bytes. `None` means end of content; a zero
    /// `max_bytes` before the end gives an empty chunk.
    async fn read(&mut self, max_bytes: usize) -> Result<Option<Bytes>>;
}

/// Blob storage backend (allows swapping MongoDB for an in-memory fake)
#[async_trait::async_trait]
pub trait BlobStore: Send + Sync {
    /// Open a new blob for writing
    async fn create(&self, name: &str, content_type: Option<&str>) -> Result<Box<dyn BlobWriter>>;

    /// Open a committed blob for streaming reads
    async fn open(&self, id: &BlobId) -> Result<Box<dyn BlobReader>>;

    /// Enumerate at most `limit` blobs in the given order
    async fn list(&self, order: ListOrder, limit: Option<usize>) -> Result<MetadataStream>;

    /// Enumerate every blob, in whatever order the backend finds cheapest
    async fn scan(&self) -> Result<MetadataStream>;

    /// Short backend name for logs and health output
    fn backend(&self) -> &'static str;

    /// Open by client-supplied identifier; malformed ids are `NotFound`
    async fn open_str(&self, raw_id: &str) -> Result<Box<dyn BlobReader>> {
        let id = BlobId::parse(raw_id)?;
        self.open(&id).await
    }
}

/// Write a complete in-memory buffer as one blob.
///
/// Convenience for small payloads and tests; uploads stream through
/// [`BlobWriter`] directly.
pub async fn put_bytes(
    store: &dyn BlobStore,
    name: &str,
    content_type: Option<&str>,
    data: &[u8],
    chunk_size: usize,
) -> Result<BlobId> {
    let mut writer = store.create(name, content_type).await?;
    for chunk in data.chunks(chunk_size.max(1)) {
        if let Err(e) = writer.write(chunk).await {
            let _ = writer.abort().await;
            return Err(e);
        }
    }
    writer.commit().await
}

/// Drain a reader into one buffer (tests and small blobs only)
pub async fn read_to_end(reader: &mut dyn BlobReader, chunk_size: usize) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(reader.metadata().size as usize);
    while let Some(chunk) = reader.read(chunk_size).await? {
        out.extend_from_slice(&chunk);
    }
    Ok(out)
}
