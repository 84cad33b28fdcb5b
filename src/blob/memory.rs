//! Process-local blob store
//!
//! Keeps committed blobs in insertion order behind a tokio `RwLock`.
//! Used by the test suite and by dev mode when MongoDB is unreachable.

use bytes::{Bytes, BytesMut};
use chrono::{DateTime, Duration, Utc};
use futures::stream::{self, StreamExt};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::RwLock;
use tracing::debug;

use super::{BlobId, BlobMetadata, BlobReader, BlobStore, BlobWriter, ListOrder, MetadataStream};
use crate::types::{EmogoError, Result};

struct StoredBlob {
    metadata: BlobMetadata,
    content: Bytes,
}

#[derive(Default)]
struct Inner {
    /// Committed blobs, oldest first
    order: Vec<Arc<StoredBlob>>,
    by_id: HashMap<BlobId, Arc<StoredBlob>>,
}

/// In-memory blob store
pub struct MemoryBlobStore {
    inner: Arc<RwLock<Inner>>,
    last_upload: Arc<Mutex<DateTime<Utc>>>,
    open_readers: Arc<AtomicUsize>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(Inner::default())),
            last_upload: Arc::new(Mutex::new(DateTime::<Utc>::MIN_UTC)),
            open_readers: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Number of read handles currently alive
    pub fn open_readers(&self) -> usize {
        self.open_readers.load(Ordering::SeqCst)
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.order.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for MemoryBlobStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Strictly increasing upload clock.
///
/// Successive commits inside the same millisecond still get distinct,
/// ordered timestamps.
fn next_upload_time(last: &Mutex<DateTime<Utc>>) -> DateTime<Utc> {
    let mut last = last.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    let now = Utc::now();
    let next = if now > *last {
        now
    } else {
        *last + Duration::milliseconds(1)
    };
    *last = next;
    next
}

#[async_trait::async_trait]
impl BlobStore for MemoryBlobStore {
    async fn create(&self, name: &str, content_type: Option<&str>) -> Result<Box<dyn BlobWriter>> {
        Ok(Box::new(MemoryBlobWriter {
            inner: Arc::clone(&self.inner),
            last_upload: Arc::clone(&self.last_upload),
            name: name.to_string(),
            content_type: content_type.map(str::to_string),
            buffer: BytesMut::new(),
        }))
    }

    async fn open(&self, id: &BlobId) -> Result<Box<dyn BlobReader>> {
        let blob = self
            .inner
            .read()
            .await
            .by_id
            .get(id)
            .cloned()
            .ok_or_else(|| EmogoError::NotFound(id.to_string()))?;

        self.open_readers.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemoryBlobReader {
            blob,
            position: 0,
            open_readers: Arc::clone(&self.open_readers),
        }))
    }

    async fn list(&self, order: ListOrder, limit: Option<usize>) -> Result<MetadataStream> {
        let inner = self.inner.read().await;
        let limit = limit.unwrap_or(usize::MAX);
        let snapshot: Vec<BlobMetadata> = match order {
            ListOrder::UploadedDesc => inner
                .order
                .iter()
                .rev()
                .take(limit)
                .map(|b| b.metadata.clone())
                .collect(),
        };
        Ok(stream::iter(snapshot.into_iter().map(Ok)).boxed())
    }

    async fn scan(&self) -> Result<MetadataStream> {
        let snapshot: Vec<Arc<StoredBlob>> = self.inner.read().await.order.clone();
        Ok(stream::iter(snapshot)
            .map(|b| Ok(b.metadata.clone()))
            .boxed())
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

struct MemoryBlobWriter {
    inner: Arc<RwLock<Inner>>,
    last_upload: Arc<Mutex<DateTime<Utc>>>,
    name: String,
    content_type: Option<String>,
    buffer: BytesMut,
}

#[async_trait::async_trait]
impl BlobWriter for MemoryBlobWriter {
    async fn write(&mut self, chunk: &[u8]) -> Result<()> {
        self.buffer.extend_from_slice(chunk);
        Ok(())
    }

    fn written(&self) -> u64 {
        self.buffer.len() as u64
    }

    async fn commit(self: Box<Self>) -> Result<BlobId> {
        let this = *self;
        let id = BlobId::new();
        let content = this.buffer.freeze();
        let metadata = BlobMetadata {
            id,
            name: this.name,
            content_type: this.content_type,
            size: content.len() as u64,
            uploaded_at: next_upload_time(&this.last_upload),
        };
        debug!(id = %id, size = metadata.size, "Committed in-memory blob");

        let blob = Arc::new(StoredBlob { metadata, content });
        let mut inner = this.inner.write().await;
        inner.by_id.insert(id, Arc::clone(&blob));
        inner.order.push(blob);
        Ok(id)
    }

    async fn abort(self: Box<Self>) -> Result<()> {
        debug!(name = %self.name, discarded = self.buffer.len(), "Aborted in-memory blob");
        Ok(())
    }
}

struct MemoryBlobReader {
    blob: Arc<StoredBlob>,
    position: usize,
    open_readers: Arc<AtomicUsize>,
}

#[async_trait::async_trait]
impl BlobReader for MemoryBlobReader {
    fn metadata(&self) -> &BlobMetadata {
        &self.blob.metadata
    }

    async fn read(&mut self, max_bytes: usize) -> Result<Option<Bytes>> {
        let content = &self.blob.content;
        if self.position >= content.len() {
            return Ok(None);
        }
        let end = content.len().min(self.position + max_bytes);
        let chunk = content.slice(self.position..end);
        self.position = end;
        Ok(Some(chunk))
    }
}

impl Drop for MemoryBlobReader {
    fn drop(&mut self) {
        self.open_readers.fetch_sub(1, Ordering::SeqCst);
    }
}
