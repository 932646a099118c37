//! Canonical hashing for emitted settlement records
//!
//! Signing and signature verification live outside this system; the only
//! cryptographic operation the evaluator performs is stamping effective
//! transactions with a deterministic digest.

use sha2::{Digest, Sha256};

/// Record hasher injected into the settlement engine
pub trait Hasher {
    /// Hash canonical record bytes to a 32-byte digest
    fn hash(&self, data: &[u8]) -> [u8; 32];
}

/// SHA-256 hasher, the default collaborator
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256Hasher;

impl Hasher for Sha256Hasher {
    fn hash(&self, data: &[u8]) -> [u8; 32] {
        hash_bytes(data)
    }
}

/// Hash arbitrary bytes using SHA-256
pub fn hash_bytes(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}
