//! # Cryptographic Primitives
//!
//! Everything that touches key material lives under this module:
//!
//! - **Ed25519** for action signatures (`keys`).
//! - **ML-KEM-768** + **AES-256-GCM** for sealing actions to the decrypting
//!   party (`kem`).
//! - **SHA-256** for action digests the Issuer sees, **BLAKE3** for record ids
//!   and key derivation.
//!
//! All of it is a thin, typed wrapper over audited crates. Nothing here does
//! I/O, and nothing here retries.

pub mod kem;
pub mod keys;

pub use kem::{open_action, seal_action, EncryptedAction, EncryptionError, KemPublicKey, KemSecretKey};
pub use keys::{ActionSignature, KeyGenerationError, PrincipalKeys, PrincipalPublicKey, SigningError};

use sha2::{Digest, Sha256};

/// SHA-256 of `data`.
pub fn sha256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

/// BLAKE3 over several parts, each prefixed with its length so
/// `["ab", "c"]` and `["a", "bc"]` never collide.
pub fn blake3_hash_multi(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new();
    for part in parts {
        hasher.update(&(part.len() as u64).to_le_bytes());
        hasher.update(part);
    }
    *hasher.finalize().as_bytes()
}

/// Serde helper: `Vec<u8>` as lowercase hex.
pub(crate) mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(s).map_err(serde::de::Error::custom)
    }
}

/// Serde helper: fixed-size byte arrays as lowercase hex.
pub(crate) mod hex_array {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer, const N: usize>(
        bytes: &[u8; N],
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>, const N: usize>(
        deserializer: D,
    ) -> Result<[u8; N], D::Error> {
        let s = String::deserialize(deserializer)?;
        let bytes = hex::decode(s).map_err(serde::de::Error::custom)?;
        bytes
            .try_into()
            .map_err(|_| serde::de::Error::custom(format!("expected {N} bytes")))
    }
}
