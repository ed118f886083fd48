//! Security features.
//!
//! Encryption at rest for stored document blobs.

pub mod encryption;

pub use encryption::{Crypto, Encryptor, is_encrypted};
