//! Store configuration.

/// Tunables for a store instance.
///
/// Kept deliberately small: the on-disk protocol itself is not
/// configurable, only how hard the writer pushes bytes toward the platter.
#[derive(Debug, Clone)]
pub struct StoreOptions {
    /// Fsync the scratch file before it is renamed over the target.
    ///
    /// On by default. Turning it off trades crash durability for write
    /// latency. Durability of the rename itself additionally depends on
    /// the backend syncing the parent directory, which not every backend
    /// can do.
    pub sync_on_write: bool,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            sync_on_write: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sync_enabled_by_default() {
        let options = StoreOptions::default();
        assert!(options.sync_on_write);
    }
}
