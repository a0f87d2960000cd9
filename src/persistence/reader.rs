//! Document reader with default fallback and the corruption handshake.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::backend::FileBackend;
use crate::observability::Logger;
use crate::recovery::CorruptionHandler;
use crate::serialization::{CorruptionError, DecodeError, Serializer};

use super::errors::{PersistError, PersistResult};
use super::writer::DocumentWriter;

/// Decodes the current value from the target file.
pub struct DocumentReader<T> {
    backend: Arc<dyn FileBackend>,
    serializer: Arc<dyn Serializer<T>>,
    target: PathBuf,
}

impl<T> Clone for DocumentReader<T> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            serializer: Arc::clone(&self.serializer),
            target: self.target.clone(),
        }
    }
}

impl<T> DocumentReader<T> {
    /// Create a reader for `target`.
    pub fn new(
        backend: Arc<dyn FileBackend>,
        serializer: Arc<dyn Serializer<T>>,
        target: PathBuf,
    ) -> Self {
        Self {
            backend,
            serializer,
            target,
        }
    }

    /// The document path.
    pub fn target(&self) -> &Path {
        &self.target
    }

    /// Read the current value.
    ///
    /// A missing target file yields the serializer's default without
    /// creating the file. Unintelligible content surfaces as
    /// [`PersistError::Corruption`]; any other failure is I/O.
    pub fn read(&self) -> PersistResult<T> {
        let mut source = match self.backend.open(&self.target) {
            Ok(source) => source,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Ok(self.serializer.default_value());
            }
            Err(err) => return Err(PersistError::io(&self.target, err)),
        };

        self.serializer
            .decode(source.as_mut())
            .map_err(|err| match err {
                DecodeError::Corruption(c) => PersistError::corruption(&self.target, c.message()),
                DecodeError::Io(io_err) => PersistError::io(&self.target, io_err),
            })
    }

    /// Read, consulting `handler` when the decoder reports corruption.
    ///
    /// A replacement value from the handler is persisted through `writer`
    /// before it is returned, so corruption is repaired on disk and never
    /// becomes observable. If that persist fails, the original corruption
    /// error carries the write failure as secondary cause. A handler that
    /// declines re-surfaces the corruption.
    pub fn read_or_recover(
        &self,
        handler: &dyn CorruptionHandler<T>,
        writer: &DocumentWriter<T>,
    ) -> PersistResult<T> {
        let (path, message) = match self.read() {
            Err(PersistError::Corruption { path, message, .. }) => (path, message),
            other => return other,
        };

        let replacement = match handler.handle(&CorruptionError::new(message.clone())) {
            Ok(value) => value,
            Err(declined) => {
                return Err(PersistError::Corruption {
                    path,
                    message: declined.message().to_string(),
                    recovery_failure: None,
                })
            }
        };

        match writer.write(&replacement) {
            Ok(()) => {
                Logger::warn("STORE_CORRUPTION_RECOVERED", &[("path", path.as_str())]);
                Ok(replacement)
            }
            Err(write_failure) => Err(PersistError::Corruption {
                path,
                message,
                recovery_failure: Some(Box::new(write_failure)),
            }),
        }
    }
}
