//! Bulk export of every stored blob as one ZIP archive
//!
//! ```text
//! scan() ──► for each blob ──► open ──► read chunk ──► deflate ──► drain ──► client
//!                 │                                                  ▲
//!                 └── entry name "{id}_{name}"                       │
//!                                                 pending >= chunk_size
//! ```
//!
//! The archive is written in ZIP streaming mode (sizes go in data
//! descriptors), so neither the whole archive nor a whole blob is held in
//! memory. At any time the assembler holds one open reader, one read chunk
//! and whatever compressed output has not been handed to the client yet.
//! The deflater flushes in bursts of its own size; those are re-sliced so
//! no outgoing chunk is larger than `chunk_size`.
//!
//! Enumeration uses the unordered `scan`, not the upload-time ordered `list`
//! that backs the listing page. The cost of an export grows linearly with
//! total stored volume and there is no timeout.

use bytes::Bytes;
use futures::stream::{self, StreamExt};
use std::io::Write;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};
use zip::write::{SimpleFileOptions, StreamWriter};
use zip::{CompressionMethod, ZipWriter};

use crate::blob::{BlobMetadata, BlobReader, BlobStore, MetadataStream};
use crate::transfer::ChunkStream;
use crate::types::{EmogoError, Result};

/// Fixed download name for the bulk export
pub const ARCHIVE_FILENAME: &str = "all_vlogs.zip";

/// Media type of the archive container
pub const ARCHIVE_CONTENT_TYPE: &str = "application/zip";

/// Entry names are prefixed with the identifier so duplicate upload names
/// never collide.
pub fn entry_name(metadata: &BlobMetadata) -> String {
    format!("{}_{}", metadata.id, metadata.name)
}

/// Shared output buffer between the ZIP writer and the stream.
#[derive(Clone, Default)]
struct ArchiveSink(Arc<Mutex<Vec<u8>>>);

impl ArchiveSink {
    fn pending(&self) -> usize {
        self.0.lock().unwrap_or_else(|p| p.into_inner()).len()
    }

    fn take_all(&self) -> Bytes {
        let mut buf = self.0.lock().unwrap_or_else(|p| p.into_inner());
        Bytes::from(std::mem::take(&mut *buf))
    }
}

impl Write for ArchiveSink {
    fn write(&mut self, data: &[u8]) -> std::io::Result<usize> {
        self.0
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

fn finalized() -> EmogoError {
    EmogoError::Archive("archive already finalized".into())
}

/// Pull-driven archive builder; one step per `advance` call
struct ArchiveAssembler {
    store: Arc<dyn BlobStore>,
    entries: Option<MetadataStream>,
    zip: Option<ZipWriter<StreamWriter<ArchiveSink>>>,
    sink: ArchiveSink,
    current: Option<Box<dyn BlobReader>>,
    /// Drained output not yet handed out
    ready: Bytes,
    chunk_size: usize,
    entry_count: usize,
    content_bytes: u64,
    finished: bool,
}

impl ArchiveAssembler {
    fn new(store: Arc<dyn BlobStore>, chunk_size: usize) -> Self {
        let sink = ArchiveSink::default();
        Self {
            store,
            entries: None,
            zip: Some(ZipWriter::new_stream(sink.clone())),
            sink,
            current: None,
            ready: Bytes::new(),
            chunk_size: chunk_size.max(1),
            entry_count: 0,
            content_bytes: 0,
            finished: false,
        }
    }

    /// Next piece of archive output (at most `chunk_size` bytes), or `None`
    /// once the archive is complete
    async fn next_chunk(&mut self) -> Result<Option<Bytes>> {
        loop {
            if !self.ready.is_empty() {
                let n = self.ready.len().min(self.chunk_size);
                return Ok(Some(self.ready.split_to(n)));
            }
            let pending = self.sink.pending();
            if pending >= self.chunk_size || (self.finished && pending > 0) {
                self.ready = self.sink.take_all();
                continue;
            }
            if self.finished {
                return Ok(None);
            }
            self.advance().await?;
        }
    }

    async fn advance(&mut self) -> Result<()> {
        // Copy the next chunk of the current entry
        if let Some(reader) = self.current.as_mut() {
            match reader.read(self.chunk_size).await? {
                Some(chunk) => {
                    let zip = self.zip.as_mut().ok_or_else(finalized)?;
                    zip.write_all(&chunk)?;
                    self.content_bytes += chunk.len() as u64;
                }
                None => self.current = None,
            }
            return Ok(());
        }

        let Some(entries) = self.entries.as_mut() else {
            self.entries = Some(self.store.scan().await?);
            return Ok(());
        };

        match entries.next().await {
            Some(metadata) => {
                let metadata = metadata?;
                let reader = self.store.open(&metadata.id).await?;
                let options = SimpleFileOptions::default()
                    .compression_method(CompressionMethod::Deflated)
                    .large_file(metadata.size >= u64::from(u32::MAX));

                let zip = self.zip.as_mut().ok_or_else(finalized)?;
                zip.start_file(entry_name(&metadata), options)?;
                debug!(id = %metadata.id, entry = %entry_name(&metadata), size = metadata.size, "Archiving blob");

                self.entry_count += 1;
                self.current = Some(reader);
            }
            None => {
                if let Some(zip) = self.zip.take() {
                    zip.finish()?;
                }
                self.finished = true;
                info!(
                    entries = self.entry_count,
                    content_bytes = self.content_bytes,
                    "Bulk archive complete"
                );
            }
        }
        Ok(())
    }
}

impl Drop for ArchiveAssembler {
    fn drop(&mut self) {
        if !self.finished {
            debug!(
                entries = self.entry_count,
                content_bytes = self.content_bytes,
                "Bulk archive stream abandoned"
            );
        }
    }
}

/// Stream a ZIP archive of every blob in `store`.
///
/// Any failure (enumeration, an unreadable blob, compression) ends the
/// stream with that error; no entry is silently skipped. An empty store
/// produces a valid archive with zero entries.
pub fn archive_all(store: Arc<dyn BlobStore>, chunk_size: usize) -> ChunkStream {
    info!(backend = store.backend(), "Starting bulk archive export");

    stream::unfold(
        Some(ArchiveAssembler::new(store, chunk_size)),
        |state| async move {
            let mut assembler = state?;
            match assembler.next_chunk().await {
                Ok(Some(chunk)) => Some((Ok(chunk), Some(assembler))),
                Ok(None) => None,
                Err(e) => {
                    warn!(
                        entries = assembler.entry_count,
                        error = %e,
                        "Bulk archive export failed"
                    );
                    assembler.finished = true;
                    Some((Err(e), None))
                }
            }
        },
    )
    .fuse()
    .boxed()
}
