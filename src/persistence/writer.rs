//! Atomic document writer.
//!
//! A new value never lands in the target file directly. The protocol:
//! encode into the scratch sibling, flush and sync, then rename over the
//! target. Readers observe either the old bytes or the new bytes, never a
//! torn write. On any failure the scratch file is removed best-effort and
//! the target is left untouched.

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::backend::{FileBackend, FileSink};
use crate::config::StoreOptions;
use crate::observability::Logger;
use crate::serialization::Serializer;

use super::errors::{PersistError, PersistResult};

/// Suffix of the scratch sibling used during atomic writes.
pub const SCRATCH_SUFFIX: &str = ".tmp";

/// Scratch sibling for a target path.
pub fn scratch_path(target: &Path) -> PathBuf {
    let mut name = target.as_os_str().to_os_string();
    name.push(SCRATCH_SUFFIX);
    PathBuf::from(name)
}

/// Persists values with the scratch-and-rename protocol.
pub struct DocumentWriter<T> {
    backend: Arc<dyn FileBackend>,
    serializer: Arc<dyn Serializer<T>>,
    target: PathBuf,
    scratch: PathBuf,
    options: StoreOptions,
}

impl<T> Clone for DocumentWriter<T> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            serializer: Arc::clone(&self.serializer),
            target: self.target.clone(),
            scratch: self.scratch.clone(),
            options: self.options.clone(),
        }
    }
}

impl<T> DocumentWriter<T> {
    /// Create a writer for `target`.
    pub fn new(
        backend: Arc<dyn FileBackend>,
        serializer: Arc<dyn Serializer<T>>,
        target: PathBuf,
        options: StoreOptions,
    ) -> Self {
        let scratch = scratch_path(&target);
        Self {
            backend,
            serializer,
            target,
            scratch,
            options,
        }
    }

    /// The document path.
    pub fn target(&self) -> &Path {
        &self.target
    }

    /// The scratch sibling.
    pub fn scratch(&self) -> &Path {
        &self.scratch
    }

    /// Persist `value` atomically.
    pub fn write(&self, value: &T) -> PersistResult<()> {
        self.ensure_parent_dir()?;

        let mut sink = self
            .backend
            .create(&self.scratch)
            .map_err(|e| PersistError::io(&self.scratch, e))?;

        match self.encode_and_commit(value, sink.as_mut()) {
            Ok(()) => Ok(()),
            Err(err) => {
                if let Err(cleanup) = self.backend.delete(&self.scratch) {
                    let scratch = self.scratch.display().to_string();
                    let detail = cleanup.to_string();
                    Logger::trace(
                        "STORE_SCRATCH_CLEANUP_FAILED",
                        &[("path", scratch.as_str()), ("error", detail.as_str())],
                    );
                }
                Err(err)
            }
        }
    }

    fn encode_and_commit(&self, value: &T, sink: &mut dyn FileSink) -> PersistResult<()> {
        {
            // The serializer only ever sees a write-only view; the sink,
            // with its sync and close timing, stays with the writer.
            let mut guarded = CloseShield::new(sink);
            self.serializer
                .encode(value, &mut guarded)
                .map_err(|e| PersistError::io(&self.scratch, e.into_io()))?;
        }

        sink.flush().map_err(|e| PersistError::io(&self.scratch, e))?;
        if self.options.sync_on_write {
            sink.sync().map_err(|e| PersistError::io(&self.scratch, e))?;
        }

        self.backend
            .rename(&self.scratch, &self.target)
            .map_err(|e| {
                let target = self.target.display().to_string();
                let detail = e.to_string();
                Logger::error(
                    "STORE_RENAME_CONFLICT",
                    &[("path", target.as_str()), ("error", detail.as_str())],
                );
                PersistError::RenameConflict {
                    path: target,
                    message: detail,
                }
            })
    }

    fn ensure_parent_dir(&self) -> PersistResult<()> {
        let Some(parent) = self.target.parent() else {
            return Ok(());
        };
        if parent.as_os_str().is_empty() {
            return Ok(());
        }

        let exists = self
            .backend
            .exists(parent)
            .map_err(|e| PersistError::io(parent, e))?;
        if exists {
            let is_dir = self
                .backend
                .is_dir(parent)
                .map_err(|e| PersistError::io(parent, e))?;
            if !is_dir {
                return Err(PersistError::NotADirectory(parent.display().to_string()));
            }
            return Ok(());
        }

        self.backend
            .create_dir_all(parent)
            .map_err(|e| PersistError::io(parent, e))
    }
}

/// Write-only view of a sink handed to serializers.
pub struct CloseShield<'a> {
    inner: &'a mut dyn FileSink,
}

impl<'a> CloseShield<'a> {
    pub(crate) fn new(inner: &'a mut dyn FileSink) -> Self {
        Self { inner }
    }
}

impl Write for CloseShield<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
