//! Value serialization seam.
//!
//! The engine is opaque to the value type: everything it knows about `T`
//! comes through a [`Serializer`]. The built-in [`JsonSerializer`] covers
//! serde-capable values; anything else implements the trait directly.

mod errors;
mod json;

pub use errors::{CorruptionError, DecodeError, EncodeError};
pub use json::JsonSerializer;

use std::io::{Read, Write};

/// Encodes and decodes the stored value, and declares the value an empty
/// store starts from.
///
/// `decode` must report unintelligible content as
/// [`DecodeError::Corruption`]; only that classification reaches the
/// corruption handler. `encode` receives a write-only view of the sink
/// and never owns the file handle: the engine flushes, syncs and closes
/// after `encode` returns.
pub trait Serializer<T>: Send + Sync {
    /// Value used when the target file does not exist.
    fn default_value(&self) -> T;

    /// Decode a value from the full byte stream of the target file.
    fn decode(&self, source: &mut dyn Read) -> Result<T, DecodeError>;

    /// Encode `value` into the sink.
    fn encode(&self, value: &T, sink: &mut dyn Write) -> Result<(), EncodeError>;
}
