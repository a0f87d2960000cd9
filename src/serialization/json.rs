//! Whole-file JSON codec built on serde.

use std::io::{Read, Write};
use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde::Serialize;

use super::errors::{CorruptionError, DecodeError, EncodeError};
use super::Serializer;

/// JSON serializer for any serde-capable value with a `Default`.
///
/// The entire file is a single JSON document. Bytes that read fine but do
/// not parse are reported as corruption, so a corruption handler can
/// replace them.
pub struct JsonSerializer<T> {
    _value: PhantomData<fn() -> T>,
}

impl<T> JsonSerializer<T> {
    /// Create the codec.
    pub fn new() -> Self {
        Self {
            _value: PhantomData,
        }
    }
}

impl<T> Default for JsonSerializer<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for JsonSerializer<T> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for JsonSerializer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("JsonSerializer")
    }
}

impl<T> Serializer<T> for JsonSerializer<T>
where
    T: Serialize + DeserializeOwned + Default + Send + Sync,
{
    fn default_value(&self) -> T {
        T::default()
    }

    fn decode(&self, source: &mut dyn Read) -> Result<T, DecodeError> {
        let mut raw = Vec::new();
        source.read_to_end(&mut raw)?;
        serde_json::from_slice(&raw)
            .map_err(|e| CorruptionError::new(format!("invalid JSON document: {e}")).into())
    }

    fn encode(&self, value: &T, sink: &mut dyn Write) -> Result<(), EncodeError> {
        serde_json::to_writer(&mut *sink, value)
            .map_err(|e| EncodeError::from(std::io::Error::from(e)))
    }
}
