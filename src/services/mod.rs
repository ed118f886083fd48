//! Pipeline services.
//!
//! Services orchestrate the watcher, backends and storage to ingest files.

mod checksum;
mod consumer;
pub mod disposal;

pub use checksum::ContentHasher;
pub use consumer::{Consumer, CycleSummary};
pub use disposal::{dispose, safe_move};
