//! Cached value with mutation detection.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use super::errors::StoreError;

/// Deterministic structural fingerprint of a value.
pub(crate) fn fingerprint<T: Hash>(value: &T) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

/// The last durably observed value, fingerprinted at capture time.
///
/// Values handed out by the store share state with this entry whenever
/// `T` carries shared interior state; re-hashing on every consultation
/// catches callers that mutate a value after it was returned. Best
/// effort: a mutation that preserves the hash goes unnoticed.
#[derive(Debug, Clone)]
pub(crate) struct CachedEntry<T> {
    value: T,
    fingerprint: u64,
}

impl<T: Hash> CachedEntry<T> {
    /// Capture `value` together with its fingerprint.
    pub(crate) fn new(value: T) -> Self {
        let fingerprint = fingerprint(&value);
        Self { value, fingerprint }
    }

    /// The current hash must match the capture-time fingerprint.
    pub(crate) fn verify(&self) -> Result<(), StoreError> {
        let actual = fingerprint(&self.value);
        if actual != self.fingerprint {
            return Err(StoreError::ValueMutated {
                expected: self.fingerprint,
                actual,
            });
        }
        Ok(())
    }
}

impl<T> CachedEntry<T> {
    pub(crate) fn value(&self) -> &T {
        &self.value
    }

    pub(crate) fn into_value(self) -> T {
        self.value
    }
}
