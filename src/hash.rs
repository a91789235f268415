//! Payload hashing for replay detection (spec §4.1).
//!
//! A 64-bit hash over `(dlc, payload bytes)`. Collisions are tolerable because
//! the hash is only ever used as an equality key within short rolling windows
//! (identical-payload and sequence replay), not as a cryptographic commitment.
//! Reuses `sha2`, the same crate the teacher already pulls in for checksums,
//! truncated to the low 8 bytes of the digest.

use sha2::{Digest, Sha256};

pub type PayloadHash = u64;

pub fn hash_payload(dlc: u8, payload: &[u8]) -> PayloadHash {
    let mut hasher = Sha256::new();
    hasher.update([dlc]);
    hasher.update(payload);
    let digest = hasher.finalize();
    u64::from_be_bytes(digest[0..8].try_into().expect("sha256 digest >= 8 bytes"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_payload_same_hash() {
        assert_eq!(hash_payload(3, &[1, 2, 3]), hash_payload(3, &[1, 2, 3]));
    }

    #[test]
    fn different_dlc_different_hash() {
        assert_ne!(hash_payload(3, &[1, 2, 3]), hash_payload(4, &[1, 2, 3]));
    }

    #[test]
    fn different_payload_different_hash() {
        assert_ne!(hash_payload(3, &[1, 2, 3]), hash_payload(3, &[1, 2, 4]));
    }
}
