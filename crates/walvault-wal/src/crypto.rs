//! Encryption seam for archived segments.
//!
//! Concrete ciphers are deployment-specific and plug in behind this trait,
//! positioned between the compressor and the folder: segments are compressed
//! first, encrypted second.

use walvault_common::Result;

/// Symmetric payload encryption.
pub trait Crypter: Send + Sync {
    fn encrypt(&self, data: Vec<u8>) -> Result<Vec<u8>>;
    fn decrypt(&self, data: Vec<u8>) -> Result<Vec<u8>>;
}
