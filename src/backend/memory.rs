//! In-memory backend for tests and development.

use std::collections::{HashMap, HashSet};
use std::io::{self, Cursor, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use super::{FileBackend, FileSink};

/// Backend keeping every file in process memory.
///
/// Clones share the same filesystem, so a test can keep a handle while
/// the store owns another. Counters expose how often sinks were created
/// and synced, and failure toggles force the next operations to error,
/// which makes the engine's failure handling observable.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    files: Mutex<HashMap<PathBuf, Vec<u8>>>,
    dirs: Mutex<HashSet<PathBuf>>,
    created: Mutex<Vec<PathBuf>>,
    syncs: AtomicUsize,
    fail_creates: AtomicBool,
    fail_opens: AtomicBool,
    fail_renames: AtomicBool,
}

impl Inner {
    fn files(&self) -> MutexGuard<'_, HashMap<PathBuf, Vec<u8>>> {
        self.files.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn dirs(&self) -> MutexGuard<'_, HashSet<PathBuf>> {
        self.dirs.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn created(&self) -> MutexGuard<'_, Vec<PathBuf>> {
        self.created.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl MemoryBackend {
    /// Create an empty in-memory filesystem.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of sinks opened so far, failed attempts included.
    pub fn create_count(&self) -> usize {
        self.inner.created().len()
    }

    /// Paths passed to `create`, in order.
    pub fn created_paths(&self) -> Vec<PathBuf> {
        self.inner.created().clone()
    }

    /// Number of sink syncs requested so far.
    pub fn sync_count(&self) -> usize {
        self.inner.syncs.load(Ordering::Relaxed)
    }

    /// Bytes currently stored at `path`, if any.
    pub fn contents(&self, path: &Path) -> Option<Vec<u8>> {
        self.inner.files().get(path).cloned()
    }

    /// Seed a file, creating it if absent.
    pub fn insert(&self, path: impl Into<PathBuf>, bytes: impl Into<Vec<u8>>) {
        self.inner.files().insert(path.into(), bytes.into());
    }

    /// Make every following `create` fail until reset.
    pub fn set_fail_creates(&self, fail: bool) {
        self.inner.fail_creates.store(fail, Ordering::Relaxed);
    }

    /// Make every following `open` fail until reset.
    pub fn set_fail_opens(&self, fail: bool) {
        self.inner.fail_opens.store(fail, Ordering::Relaxed);
    }

    /// Make every following `rename` fail until reset.
    pub fn set_fail_renames(&self, fail: bool) {
        self.inner.fail_renames.store(fail, Ordering::Relaxed);
    }
}

struct MemorySink {
    inner: Arc<Inner>,
    path: PathBuf,
}

impl Write for MemorySink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner
            .files()
            .entry(self.path.clone())
            .or_default()
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl FileSink for MemorySink {
    fn sync(&mut self) -> io::Result<()> {
        self.inner.syncs.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

impl FileBackend for MemoryBackend {
    fn open(&self, path: &Path) -> io::Result<Box<dyn Read + Send>> {
        if self.inner.fail_opens.load(Ordering::Relaxed) {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "open failure injected",
            ));
        }
        match self.inner.files().get(path) {
            Some(bytes) => Ok(Box::new(Cursor::new(bytes.clone()))),
            None => Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no such file: {}", path.display()),
            )),
        }
    }

    fn create(&self, path: &Path) -> io::Result<Box<dyn FileSink>> {
        self.inner.created().push(path.to_path_buf());
        if self.inner.fail_creates.load(Ordering::Relaxed) {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                "create failure injected",
            ));
        }
        self.inner.files().insert(path.to_path_buf(), Vec::new());
        Ok(Box::new(MemorySink {
            inner: Arc::clone(&self.inner),
            path: path.to_path_buf(),
        }))
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        if self.inner.fail_renames.load(Ordering::Relaxed) {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                "rename failure injected",
            ));
        }
        let mut files = self.inner.files();
        match files.remove(from) {
            Some(bytes) => {
                files.insert(to.to_path_buf(), bytes);
                Ok(())
            }
            None => Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no such file: {}", from.display()),
            )),
        }
    }

    fn delete(&self, path: &Path) -> io::Result<()> {
        match self.inner.files().remove(path) {
            Some(_) => Ok(()),
            None => Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no such file: {}", path.display()),
            )),
        }
    }

    fn exists(&self, path: &Path) -> io::Result<bool> {
        Ok(self.inner.files().contains_key(path) || self.inner.dirs().contains(path))
    }

    fn is_dir(&self, path: &Path) -> io::Result<bool> {
        Ok(self.inner.dirs().contains(path))
    }

    fn list_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
        let files = self.inner.files();
        let dirs = self.inner.dirs();
        let mut entries: Vec<PathBuf> = files
            .keys()
            .chain(dirs.iter())
            .filter(|entry| entry.parent() == Some(path))
            .cloned()
            .collect();
        entries.sort();
        Ok(entries)
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        if self.inner.files().contains_key(path) {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("file exists at {}", path.display()),
            ));
        }
        let mut dirs = self.inner.dirs();
        let mut current = path;
        loop {
            dirs.insert(current.to_path_buf());
            match current.parent() {
                Some(parent) if !parent.as_os_str().is_empty() => current = parent,
                _ => break,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_read_roundtrip() {
        let backend = MemoryBackend::new();
        let path = Path::new("/store/doc");

        backend.create(path).unwrap().write_all(b"payload").unwrap();

        let mut content = Vec::new();
        backend.open(path).unwrap().read_to_end(&mut content).unwrap();
        assert_eq!(content, b"payload");
    }

    #[test]
    fn test_create_truncates_existing() {
        let backend = MemoryBackend::new();
        let path = Path::new("/doc");

        backend.insert(path, b"previous".to_vec());
        backend.create(path).unwrap().write_all(b"new").unwrap();

        assert_eq!(backend.contents(path).unwrap(), b"new");
    }

    #[test]
    fn test_rename_moves_content() {
        let backend = MemoryBackend::new();
        backend.insert("/doc.tmp", b"v1".to_vec());

        backend.rename(Path::new("/doc.tmp"), Path::new("/doc")).unwrap();

        assert!(backend.contents(Path::new("/doc.tmp")).is_none());
        assert_eq!(backend.contents(Path::new("/doc")).unwrap(), b"v1");
    }

    #[test]
    fn test_counters_track_creates_and_syncs() {
        let backend = MemoryBackend::new();

        let mut sink = backend.create(Path::new("/a")).unwrap();
        sink.sync().unwrap();
        backend.create(Path::new("/b")).unwrap();

        assert_eq!(backend.create_count(), 2);
        assert_eq!(backend.sync_count(), 1);
        assert_eq!(
            backend.created_paths(),
            vec![PathBuf::from("/a"), PathBuf::from("/b")]
        );
    }

    #[test]
    fn test_failure_toggles() {
        let backend = MemoryBackend::new();
        backend.insert("/doc", b"x".to_vec());

        backend.set_fail_opens(true);
        assert!(backend.open(Path::new("/doc")).is_err());
        backend.set_fail_opens(false);
        assert!(backend.open(Path::new("/doc")).is_ok());

        backend.set_fail_renames(true);
        assert!(backend.rename(Path::new("/doc"), Path::new("/other")).is_err());
    }

    #[test]
    fn test_clones_share_state() {
        let backend = MemoryBackend::new();
        let shadow = backend.clone();

        backend.insert("/doc", b"shared".to_vec());
        assert_eq!(shadow.contents(Path::new("/doc")).unwrap(), b"shared");
    }

    #[test]
    fn test_dir_tracking() {
        let backend = MemoryBackend::new();
        backend.create_dir_all(Path::new("/a/b")).unwrap();

        assert!(backend.is_dir(Path::new("/a")).unwrap());
        assert!(backend.is_dir(Path::new("/a/b")).unwrap());
        assert!(!backend.is_dir(Path::new("/a/b/c")).unwrap());
    }
}
