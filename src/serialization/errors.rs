//! # Serialization Errors

use std::io;

use thiserror::Error;

/// Raised by a decoder that recognises its format but cannot make sense
/// of the bytes.
///
/// Corruption is the one decode failure the engine can recover from: it
/// is handed to the corruption handler, which may supply a replacement
/// value. Plain I/O failures never are.
#[derive(Debug, Clone, Error)]
#[error("document corrupted: {message}")]
pub struct CorruptionError {
    message: String,
}

impl CorruptionError {
    /// Create a corruption report with a human-readable cause.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// The cause as reported by the decoder.
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Failure while decoding the stored document.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Content was read but is unintelligible.
    #[error(transparent)]
    Corruption(#[from] CorruptionError),

    /// Reading the underlying stream failed.
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Failure while encoding a value into the sink.
#[derive(Debug, Error)]
#[error(transparent)]
pub struct EncodeError(#[from] io::Error);

impl EncodeError {
    /// Unwrap into the underlying I/O error.
    pub fn into_io(self) -> io::Error {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_corruption_display_carries_cause() {
        let err = CorruptionError::new("trailing garbage at byte 12");
        assert!(err.to_string().contains("trailing garbage at byte 12"));
    }

    #[test]
    fn test_decode_error_classification() {
        let corrupt: DecodeError = CorruptionError::new("bad").into();
        assert!(matches!(corrupt, DecodeError::Corruption(_)));

        let io: DecodeError = io::Error::new(io::ErrorKind::PermissionDenied, "denied").into();
        assert!(matches!(io, DecodeError::Io(_)));
    }
}
