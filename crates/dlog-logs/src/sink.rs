use std::collections::VecDeque;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Mutex, RwLock};
use tempfile::NamedTempFile;

use crate::SinkError;

/// Writable destination for a container's log bytes
///
/// A source appends live output and prepends backfilled history. The
/// caller owns the sink's lifecycle; sources never close it.
pub trait Sink: Send + Sync {
    /// Add bytes after everything written so far
    fn append(&self, bytes: &[u8]) -> Result<(), SinkError>;

    /// Add bytes before everything written so far
    fn prepend(&self, bytes: &[u8]) -> Result<(), SinkError>;

    /// Release the backing resource; later writes fail with `SinkError::Closed`
    fn close(&self) -> Result<(), SinkError> {
        Ok(())
    }
}

// ============================================================================
// In-memory document
// ============================================================================

struct DocumentInner {
    caption: String,
    lines: VecDeque<String>,
    /// Bytes after the last newline
    partial: Vec<u8>,
    closed: bool,
}

/// Thread-safe line store backing the pager
#[derive(Clone)]
pub struct Document {
    inner: Arc<RwLock<DocumentInner>>,

    /// Maximum number of complete lines kept (`None` = unbounded)
    capacity: Option<usize>,

    bytes_written: Arc<AtomicU64>,
}

impl Document {
    /// Create an unbounded document
    pub fn new(caption: impl Into<String>) -> Self {
        Self::build(caption.into(), None)
    }

    /// Create a document keeping at most `capacity` lines, evicting the oldest
    pub fn with_capacity(caption: impl Into<String>, capacity: usize) -> Self {
        Self::build(caption.into(), Some(capacity.max(1)))
    }

    fn build(caption: String, capacity: Option<usize>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(DocumentInner {
                caption,
                lines: VecDeque::new(),
                partial: Vec::new(),
                closed: false,
            })),
            capacity,
            bytes_written: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn caption(&self) -> String {
        self.inner.read().caption.clone()
    }

    /// Number of complete lines
    pub fn len(&self) -> usize {
        self.inner.read().lines.len()
    }

    pub fn is_empty(&self) -> bool {
        let inner = self.inner.read();
        inner.lines.is_empty() && inner.partial.is_empty()
    }

    /// Total bytes accepted (appended or prepended)
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written.load(Ordering::SeqCst)
    }

    /// All complete lines plus the trailing partial line, if any
    pub fn lines(&self) -> Vec<String> {
        let inner = self.inner.read();
        let mut lines: Vec<String> = inner.lines.iter().cloned().collect();
        if !inner.partial.is_empty() {
            lines.push(String::from_utf8_lossy(&inner.partial).into_owned());
        }
        lines
    }

    /// Get the last N complete lines
    pub fn tail(&self, n: usize) -> Vec<String> {
        let inner = self.inner.read();
        let start = inner.lines.len().saturating_sub(n);
        inner.lines.iter().skip(start).cloned().collect()
    }

    /// Get complete lines in a range (for virtual scrolling)
    pub fn range(&self, start: usize, count: usize) -> Vec<String> {
        self.inner
            .read()
            .lines
            .iter()
            .skip(start)
            .take(count)
            .cloned()
            .collect()
    }

    /// The document as text, exactly as written
    pub fn contents(&self) -> String {
        let inner = self.inner.read();
        let mut text = String::new();
        for line in &inner.lines {
            text.push_str(line);
            text.push('\n');
        }
        text.push_str(&String::from_utf8_lossy(&inner.partial));
        text
    }

    /// Clear all lines
    pub fn clear(&self) {
        let mut inner = self.inner.write();
        inner.lines.clear();
        inner.partial.clear();
        self.bytes_written.store(0, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.inner.read().closed
    }

    fn evict(&self, inner: &mut DocumentInner) {
        if let Some(capacity) = self.capacity {
            while inner.lines.len() > capacity {
                inner.lines.pop_front();
            }
        }
    }
}

impl Sink for Document {
    fn append(&self, bytes: &[u8]) -> Result<(), SinkError> {
        let mut inner = self.inner.write();
        if inner.closed {
            return Err(SinkError::Closed);
        }

        inner.partial.extend_from_slice(bytes);
        while let Some(pos) = inner.partial.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = inner.partial.drain(..=pos).collect();
            let text = String::from_utf8_lossy(&line[..line.len() - 1]).into_owned();
            inner.lines.push_back(text);
        }
        self.evict(&mut inner);

        self.bytes_written.fetch_add(bytes.len() as u64, Ordering::SeqCst);
        Ok(())
    }

    fn prepend(&self, bytes: &[u8]) -> Result<(), SinkError> {
        let mut inner = self.inner.write();
        if inner.closed {
            return Err(SinkError::Closed);
        }

        // An unterminated last line in a history chunk is still a whole line
        let text = String::from_utf8_lossy(bytes);
        for line in text.lines().rev() {
            inner.lines.push_front(line.to_string());
        }
        self.evict(&mut inner);

        self.bytes_written.fetch_add(bytes.len() as u64, Ordering::SeqCst);
        Ok(())
    }

    fn close(&self) -> Result<(), SinkError> {
        self.inner.write().closed = true;
        Ok(())
    }
}

impl std::fmt::Debug for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Document")
            .field("caption", &self.caption())
            .field("lines", &self.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}

// ============================================================================
// Cache file
// ============================================================================

/// Temp-file sink, removed from disk on close
pub struct CacheFile {
    path: PathBuf,
    file: Mutex<Option<NamedTempFile>>,
}

impl CacheFile {
    /// Create a cache file in the system temp directory
    pub fn create() -> Result<Self, SinkError> {
        Self::create_in(std::env::temp_dir())
    }

    pub fn create_in(dir: impl AsRef<Path>) -> Result<Self, SinkError> {
        let file = tempfile::Builder::new().prefix("dlog_").tempfile_in(dir)?;
        tracing::debug!(path = %file.path().display(), "created cache file");

        Ok(Self {
            path: file.path().to_path_buf(),
            file: Mutex::new(Some(file)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the whole file back
    pub fn contents(&self) -> Result<Vec<u8>, SinkError> {
        let mut guard = self.file.lock();
        let file = guard.as_mut().ok_or(SinkError::Closed)?.as_file_mut();
        read_all(file)
    }

    /// Read the file back as lines
    pub fn lines(&self) -> Result<Vec<String>, SinkError> {
        let bytes = self.contents()?;
        Ok(String::from_utf8_lossy(&bytes).lines().map(str::to_string).collect())
    }
}

fn read_all(file: &mut File) -> Result<Vec<u8>, SinkError> {
    let mut buf = Vec::new();
    file.seek(SeekFrom::Start(0))?;
    file.read_to_end(&mut buf)?;
    Ok(buf)
}

impl Sink for CacheFile {
    fn append(&self, bytes: &[u8]) -> Result<(), SinkError> {
        let mut guard = self.file.lock();
        let file = guard.as_mut().ok_or(SinkError::Closed)?.as_file_mut();
        file.seek(SeekFrom::End(0))?;
        file.write_all(bytes)?;
        Ok(())
    }

    fn prepend(&self, bytes: &[u8]) -> Result<(), SinkError> {
        let mut guard = self.file.lock();
        let file = guard.as_mut().ok_or(SinkError::Closed)?.as_file_mut();

        let existing = read_all(file)?;
        file.seek(SeekFrom::Start(0))?;
        file.write_all(bytes)?;
        file.write_all(&existing)?;
        Ok(())
    }

    fn close(&self) -> Result<(), SinkError> {
        if let Some(file) = self.file.lock().take() {
            tracing::debug!(path = %self.path.display(), "removing cache file");
            file.close()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_append_splits_lines() {
        let doc = Document::new("web");
        doc.append(b"hel").unwrap();
        doc.append(b"lo\nerr\npart").unwrap();

        assert_eq!(doc.len(), 2);
        assert_eq!(doc.lines(), vec!["hello", "err", "part"]);
        assert_eq!(doc.contents(), "hello\nerr\npart");
        assert_eq!(doc.bytes_written(), 14);
    }

    #[test]
    fn test_document_prepend_keeps_order() {
        let doc = Document::new("web");
        doc.append(b"live 1\nlive 2\n").unwrap();
        doc.prepend(b"old 3\nold 4\n").unwrap();
        doc.prepend(b"old 1\nold 2").unwrap();

        assert_eq!(
            doc.lines(),
            vec!["old 1", "old 2", "old 3", "old 4", "live 1", "live 2"]
        );
    }

    #[test]
    fn test_document_capacity_keeps_newest() {
        let doc = Document::with_capacity("web", 3);
        doc.append(b"1\n2\n3\n4\n").unwrap();
        assert_eq!(doc.lines(), vec!["2", "3", "4"]);

        doc.prepend(b"0\n").unwrap();
        assert_eq!(doc.lines(), vec!["2", "3", "4"]);
        assert_eq!(doc.tail(2), vec!["3", "4"]);
        assert_eq!(doc.range(1, 5), vec!["3", "4"]);
    }

    #[test]
    fn test_document_rejects_writes_after_close() {
        let doc = Document::new("web");
        doc.close().unwrap();
        assert!(matches!(doc.append(b"x\n"), Err(SinkError::Closed)));
        assert!(doc.is_closed());
    }

    #[test]
    fn test_cache_file_roundtrip_and_removal() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CacheFile::create_in(dir.path()).unwrap();
        let path = cache.path().to_path_buf();
        assert!(path.file_name().unwrap().to_string_lossy().starts_with("dlog_"));

        cache.append(b"new\n").unwrap();
        cache.prepend(b"old\n").unwrap();
        cache.append(b"newer\n").unwrap();
        assert_eq!(cache.lines().unwrap(), vec!["old", "new", "newer"]);

        cache.close().unwrap();
        assert!(!path.exists());
        assert!(matches!(cache.append(b"x"), Err(SinkError::Closed)));
    }
}
