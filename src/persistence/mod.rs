//! Durable persistence for the single document.
//!
//! One file at the target path holds the serializer's encoding of the
//! current value, byte for byte. Writes go through the atomic
//! scratch-and-rename protocol of [`DocumentWriter`]; reads fall back to
//! the serializer's default when the file is absent and run the
//! corruption handshake when it is unintelligible.

mod errors;
mod reader;
mod writer;

pub use errors::{PersistError, PersistResult};
pub use reader::DocumentReader;
pub use writer::{scratch_path, CloseShield, DocumentWriter, SCRATCH_SUFFIX};
