//! MongoDB GridFS blob store
//!
//! Content lives in `<bucket>.chunks`, metadata in `<bucket>.files`:
//! - `filename` - original upload name
//! - `length` / `uploadDate` - maintained by the driver
//! - `metadata.contentType` - MIME type supplied at upload
//!
//! The files document is only inserted when the upload stream is closed, so
//! an interrupted upload never shows up in `list` or `scan`.

use bson::{doc, Bson, Document};
use bytes::{Bytes, BytesMut};
use futures::io::{AsyncReadExt, AsyncWriteExt};
use futures::stream::{StreamExt, TryStreamExt};
use mongodb::error::{ErrorKind, GridFsErrorKind};
use mongodb::gridfs::{
    FilesCollectionDocument, GridFsBucket, GridFsDownloadStream, GridFsUploadStream,
};
use mongodb::options::{GridFsBucketOptions, GridFsFindOptions, GridFsUploadOptions};
use tracing::{debug, info, warn};

use super::{BlobId, BlobMetadata, BlobReader, BlobStore, BlobWriter, ListOrder, MetadataStream};
use crate::db::MongoClient;
use crate::types::{EmogoError, Result};

/// Metadata key holding the MIME type
const CONTENT_TYPE_KEY: &str = "contentType";

/// The driver takes a signed limit; saturate rather than wrap
fn find_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

/// GridFS-backed blob store
#[derive(Clone)]
pub struct GridFsBlobStore {
    bucket: GridFsBucket,
}

impl GridFsBlobStore {
    /// Build a store on top of an already connected client
    pub fn new(mongo: &MongoClient, bucket_name: &str) -> Self {
        let options = GridFsBucketOptions::builder()
            .bucket_name(bucket_name.to_string())
            .build();
        let bucket = mongo.database().gridfs_bucket(options);

        info!(bucket = %bucket_name, db = %mongo.db_name(), "Initialized GridFS blob store");

        Self { bucket }
    }

    async fn find(&self, filter: Document, options: GridFsFindOptions) -> Result<MetadataStream> {
        let cursor = self
            .bucket
            .find(filter)
            .with_options(options)
            .await
            .map_err(unavailable)?;

        Ok(cursor
            .map_err(unavailable)
            .and_then(|file| async move { files_document_to_metadata(file) })
            .boxed())
    }
}

/// Map driver errors to the storage taxonomy
fn unavailable(err: mongodb::error::Error) -> EmogoError {
    EmogoError::StorageUnavailable(err.to_string())
}

fn io_unavailable(err: std::io::Error) -> EmogoError {
    EmogoError::StorageUnavailable(err.to_string())
}

fn files_document_to_metadata(file: FilesCollectionDocument) -> Result<BlobMetadata> {
    let id = file.id.as_object_id().ok_or_else(|| {
        EmogoError::Database(format!("GridFS file has non-ObjectId _id: {}", file.id))
    })?;

    let content_type = file
        .metadata
        .as_ref()
        .and_then(|m| m.get_str(CONTENT_TYPE_KEY).ok())
        .map(str::to_string);

    Ok(BlobMetadata {
        id: BlobId::from(id),
        name: file.filename.unwrap_or_default(),
        content_type,
        size: file.length,
        uploaded_at: file.upload_date.to_chrono(),
    })
}

#[async_trait::async_trait]
impl BlobStore for GridFsBlobStore {
    async fn create(&self, name: &str, content_type: Option<&str>) -> Result<Box<dyn BlobWriter>> {
        let mut options = GridFsUploadOptions::default();
        if let Some(ct) = content_type {
            options.metadata = Some(doc! { CONTENT_TYPE_KEY: ct });
        }

        let stream = self
            .bucket
            .open_upload_stream(name)
            .with_options(options)
            .await
            .map_err(unavailable)?;

        debug!(name = %name, id = %stream.id(), "Opened GridFS upload stream");

        Ok(Box::new(GridFsBlobWriter {
            stream,
            name: name.to_string(),
            written: 0,
        }))
    }

    async fn open(&self, id: &BlobId) -> Result<Box<dyn BlobReader>> {
        let mut files = self
            .find(doc! { "_id": id.as_object_id() }, GridFsFindOptions::default())
            .await?;

        let metadata = files
            .try_next()
            .await?
            .ok_or_else(|| EmogoError::NotFound(id.to_string()))?;
        drop(files);

        let stream = self
            .bucket
            .open_download_stream(Bson::ObjectId(id.as_object_id()))
            .await
            .map_err(|e| match e.kind.as_ref() {
                ErrorKind::GridFs(GridFsErrorKind::FileNotFound { .. }) => {
                    EmogoError::NotFound(id.to_string())
                }
                _ => unavailable(e),
            })?;

        Ok(Box::new(GridFsBlobReader {
            stream,
            metadata,
            position: 0,
        }))
    }

    async fn list(&self, order: ListOrder, limit: Option<usize>) -> Result<MetadataStream> {
        let mut options = GridFsFindOptions::default();
        options.sort = Some(match order {
            ListOrder::UploadedDesc => doc! { "uploadDate": -1, "_id": -1 },
        });
        options.limit = limit.map(find_limit);

        self.find(doc! {}, options).await
    }

    async fn scan(&self) -> Result<MetadataStream> {
        // Natural order: no sort stage, no index requirement.
        self.find(doc! {}, GridFsFindOptions::default()).await
    }

    fn backend(&self) -> &'static str {
        "gridfs"
    }
}

struct GridFsBlobWriter {
    stream: GridFsUploadStream,
    name: String,
    written: u64,
}

#[async_trait::async_trait]
impl BlobWriter for GridFsBlobWriter {
    async fn write(&mut self, chunk: &[u8]) -> Result<()> {
        self.stream.write_all(chunk).await.map_err(io_unavailable)?;
        self.written += chunk.len() as u64;
        Ok(())
    }

    fn written(&self) -> u64 {
        self.written
    }

    async fn commit(mut self: Box<Self>) -> Result<BlobId> {
        self.stream.close().await.map_err(io_unavailable)?;

        let id = self.stream.id().as_object_id().ok_or_else(|| {
            EmogoError::Database(format!("GridFS assigned non-ObjectId id: {}", self.stream.id()))
        })?;

        info!(id = %id, name = %self.name, size = self.written, "Committed GridFS blob");
        Ok(BlobId::from(id))
    }

    async fn abort(mut self: Box<Self>) -> Result<()> {
        warn!(name = %self.name, written = self.written, "Aborting GridFS upload");
        self.stream.abort().await.map_err(unavailable)
    }
}

struct GridFsBlobReader {
    stream: GridFsDownloadStream,
    metadata: BlobMetadata,
    /// Bytes handed out so far
    position: u64,
}

#[async_trait::async_trait]
impl BlobReader for GridFsBlobReader {
    fn metadata(&self) -> &BlobMetadata {
        &self.metadata
    }

    /// Fills up to `max_bytes`, crossing GridFS chunk boundaries as needed.
    async fn read(&mut self, max_bytes: usize) -> Result<Option<Bytes>> {
        if max_bytes == 0 {
            return Ok((self.position < self.metadata.size).then(Bytes::new));
        }

        let mut buf = BytesMut::zeroed(max_bytes);
        let mut filled = 0;

        while filled < max_bytes {
            let n = self
                .stream
                .read(&mut buf[filled..])
                .await
                .map_err(io_unavailable)?;
            if n == 0 {
                break;
            }
            filled += n;
        }

        if filled == 0 {
            return Ok(None);
        }
        buf.truncate(filled);
        self.position += filled as u64;
        Ok(Some(buf.freeze()))
    }
}
