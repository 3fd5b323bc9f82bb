use std::path::PathBuf;
use std::sync::Arc;

use dlog_logs::{CacheFile, Document, Sink, SinkError};
use dlog_types::Container;

/// Creates and disposes of the sink each container's logs land in
///
/// The session acquires a fresh sink on every load and releases the old one
/// only after its source has fully stopped.
pub trait SinkFactory: Send {
    type Sink: Sink + 'static;

    fn acquire(&mut self, container: &Container, label: &str) -> Result<Arc<Self::Sink>, SinkError>;

    fn release(&mut self, sink: Arc<Self::Sink>) {
        if let Err(e) = sink.close() {
            tracing::warn!("failed to close sink: {}", e);
        }
    }
}

/// In-memory documents, optionally bounded
#[derive(Clone, Debug, Default)]
pub struct DocumentFactory {
    capacity: Option<usize>,
}

impl DocumentFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: Some(capacity),
        }
    }
}

impl SinkFactory for DocumentFactory {
    type Sink = Document;

    fn acquire(&mut self, _container: &Container, label: &str) -> Result<Arc<Document>, SinkError> {
        Ok(Arc::new(match self.capacity {
            Some(capacity) => Document::with_capacity(label, capacity),
            None => Document::new(label),
        }))
    }
}

/// A document mirrored to an on-disk cache file
///
/// The document backs the pager; the file keeps the full byte stream and
/// is removed when the sink is released.
pub struct CachedDocument {
    document: Document,
    cache: CacheFile,
}

impl CachedDocument {
    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn cache(&self) -> &CacheFile {
        &self.cache
    }
}

impl Sink for CachedDocument {
    fn append(&self, bytes: &[u8]) -> Result<(), SinkError> {
        self.cache.append(bytes)?;
        self.document.append(bytes)
    }

    fn prepend(&self, bytes: &[u8]) -> Result<(), SinkError> {
        self.cache.prepend(bytes)?;
        self.document.prepend(bytes)
    }

    fn close(&self) -> Result<(), SinkError> {
        self.document.close()?;
        self.cache.close()
    }
}

/// Documents with a `dlog_*` cache file per container
#[derive(Clone, Debug)]
pub struct CacheFileFactory {
    dir: PathBuf,
    capacity: Option<usize>,
}

impl CacheFileFactory {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            capacity: None,
        }
    }

    /// Cache files in the system temp directory
    pub fn in_temp_dir() -> Self {
        Self::new(std::env::temp_dir())
    }

    /// Keep at most `capacity` lines in each document; the file keeps everything
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = Some(capacity);
        self
    }
}

impl SinkFactory for CacheFileFactory {
    type Sink = CachedDocument;

    fn acquire(&mut self, container: &Container, label: &str) -> Result<Arc<CachedDocument>, SinkError> {
        let cache = CacheFile::create_in(&self.dir)?;
        tracing::debug!(
            container = %container.name,
            path = %cache.path().display(),
            "opened cache file"
        );

        let document = match self.capacity {
            Some(capacity) => Document::with_capacity(label, capacity),
            None => Document::new(label),
        };

        Ok(Arc::new(CachedDocument { document, cache }))
    }
}
