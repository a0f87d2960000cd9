//! Corruption recovery policy.
//!
//! When the serializer reports corruption, the engine consults a
//! [`CorruptionHandler`] exactly once per cache-miss cycle. A handler
//! either supplies a replacement value, which the engine persists before
//! anything becomes observable, or gives the corruption back to fail the
//! read.

use std::fmt;

use crate::serialization::CorruptionError;

/// Supplies a replacement value when the decoder reports corruption.
pub trait CorruptionHandler<T>: Send + Sync {
    /// Produce a replacement, or return the corruption to fail the read.
    fn handle(&self, corruption: &CorruptionError) -> Result<T, CorruptionError>;
}

/// Default policy: corruption fails the read.
#[derive(Debug, Clone, Default)]
pub struct PropagateCorruption;

impl<T> CorruptionHandler<T> for PropagateCorruption {
    fn handle(&self, corruption: &CorruptionError) -> Result<T, CorruptionError> {
        Err(corruption.clone())
    }
}

/// Replaces a corrupted document with a produced value.
pub struct ReplaceOnCorruption<T> {
    produce: Box<dyn Fn(&CorruptionError) -> T + Send + Sync>,
}

impl<T> ReplaceOnCorruption<T> {
    /// Recover with a value derived from the corruption report.
    pub fn new(produce: impl Fn(&CorruptionError) -> T + Send + Sync + 'static) -> Self {
        Self {
            produce: Box::new(produce),
        }
    }

    /// Recover with a fixed value.
    pub fn with_value(value: T) -> Self
    where
        T: Clone + Send + Sync + 'static,
    {
        Self::new(move |_| value.clone())
    }
}

impl<T> CorruptionHandler<T> for ReplaceOnCorruption<T>
where
    T: Send + Sync,
{
    fn handle(&self, corruption: &CorruptionError) -> Result<T, CorruptionError> {
        Ok((self.produce)(corruption))
    }
}

impl<T> fmt::Debug for ReplaceOnCorruption<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ReplaceOnCorruption")
    }
}
