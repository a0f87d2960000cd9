//! statefile - a typed, durable, single-document state store
//!
//! One logical value of an application type `T`, one file on disk. The
//! engine serializes every read and update through a single message loop,
//! persists new values with an atomic scratch-and-rename protocol, runs a
//! corruption-recovery handshake on unintelligible content, and fans the
//! current value out to any number of live observers through a conflated
//! broadcast slot.
//!
//! ```rust,no_run
//! use statefile::{JsonSerializer, StateFile};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), statefile::StoreError> {
//!     let store: StateFile<u64> =
//!         StateFile::open("counter.json", JsonSerializer::new());
//!
//!     let next = store.update(|n| async move { Ok(n + 1) }).await?;
//!     println!("counter is now {next}");
//!
//!     let mut live = store.watch();
//!     while let Some(observed) = live.next().await {
//!         println!("observed {}", observed?);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! Multi-process exclusion is out of scope: at most one store instance
//! may own a given file, across processes too. A second instance shows up
//! as rename conflicts on the write path.

pub mod backend;
pub mod broadcast;
pub mod config;
pub mod engine;
pub mod observability;
pub mod persistence;
pub mod recovery;
pub mod serialization;

pub use broadcast::ValueStream;
pub use config::StoreOptions;
pub use engine::{InitApi, StateFile, StateFileBuilder, StateValue, StoreError, StoreResult};
pub use persistence::{PersistError, PersistResult};
pub use recovery::{CorruptionHandler, PropagateCorruption, ReplaceOnCorruption};
pub use serialization::{
    CorruptionError, DecodeError, EncodeError, JsonSerializer, Serializer,
};
