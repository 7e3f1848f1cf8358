use parking_lot::Mutex;
use std::fmt::Debug;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::NamedTempFile;

/// Where finished trace documents go.
pub trait TraceSink: Send + Sync + Debug + 'static {
    /// Persists `bytes` as the full contents of `path`.
    fn flush(&self, path: &Path, bytes: &[u8]) -> io::Result<()>;
}

impl<T: TraceSink> TraceSink for Arc<T> {
    fn flush(&self, path: &Path, bytes: &[u8]) -> io::Result<()> {
        (**self).flush(path, bytes)
    }
}

/// Writes documents to the file system.
///
/// The bytes go to a temporary file next to the destination, which is synced
/// and then renamed over it. A failed flush leaves any previous file at
/// `path` untouched.
#[derive(Clone, Copy, Default, Debug)]
pub struct FileSink;

impl TraceSink for FileSink {
    fn flush(&self, path: &Path, bytes: &[u8]) -> io::Result<()> {
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir)?;

        let mut file = NamedTempFile::new_in(dir)?;
        file.write_all(bytes)?;
        file.as_file().sync_all()?;
        file.persist(path).map_err(|e| e.error)?;

        Ok(())
    }
}

/// Keeps every flushed document in memory.
#[derive(Default, Debug)]
pub struct MemorySink {
    documents: Mutex<Vec<(PathBuf, Vec<u8>)>>,
}

impl MemorySink {
    pub fn new() -> MemorySink {
        MemorySink::default()
    }

    /// Copies of everything flushed so far, oldest first.
    pub fn documents(&self) -> Vec<(PathBuf, Vec<u8>)> {
        self.documents.lock().clone()
    }

    pub fn flush_count(&self) -> usize {
        self.documents.lock().len()
    }

    pub fn take(&self) -> Vec<(PathBuf, Vec<u8>)> {
        std::mem::take(&mut *self.documents.lock())
    }
}

impl TraceSink for MemorySink {
    fn flush(&self, path: &Path, bytes: &[u8]) -> io::Result<()> {
        self.documents
            .lock()
            .push((path.to_path_buf(), bytes.to_vec()));
        Ok(())
    }
}
