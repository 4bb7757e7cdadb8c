//! # Principal Keys
//!
//! A principal holds two keys that are always generated together from one
//! 64-byte seed:
//!
//! - an **Ed25519** signing key, for authorship of actions;
//! - an **ML-KEM-768** decapsulation key, so other parties can seal
//!   payloads addressed to this principal.
//!
//! The pair is never mutated piecemeal. Replacing keys means replacing the
//! whole [`PrincipalKeys`] value (see [`crate::session`]).
//!
//! Key bytes are never logged. `Debug` prints the verifying key only.

use ed25519_dalek::{Signature as DalekSignature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::StdRng;
use rand::{CryptoRng, RngCore, SeedableRng};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use super::kem::{KemPublicKey, KemSecretKey};
use crate::config::{PRINCIPAL_SEED_LENGTH, SIGNATURE_LENGTH, VERIFYING_KEY_LENGTH};

/// The keypair could not be produced.
#[derive(Debug, Error)]
pub enum KeyGenerationError {
    /// The RNG refused to hand out bytes.
    #[error("key generation failed: entropy source unavailable ({0})")]
    EntropyUnavailable(String),

    /// Imported seed material had the wrong shape.
    #[error("key generation failed: invalid seed (expected {PRINCIPAL_SEED_LENGTH} hex-encoded bytes)")]
    InvalidSeed,
}

/// The signing primitive rejected its input.
#[derive(Debug, Error)]
pub enum SigningError {
    #[error("signing failed: {0}")]
    Rejected(String),
}

/// The private half of a principal identity.
///
/// Not `Serialize` or `Clone`. Export goes through
/// [`to_seed_hex`](Self::to_seed_hex); sharing goes through `Arc`.
pub struct PrincipalKeys {
    signing_key: SigningKey,
    kem_seed: [u8; 32],
    kem_secret: KemSecretKey,
    kem_public: KemPublicKey,
}

/// The public half of a principal identity. Safe to send anywhere.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrincipalPublicKey {
    /// Ed25519 verifying key, hex on the wire.
    #[serde(with = "super::hex_array")]
    pub verifying_key: [u8; VERIFYING_KEY_LENGTH],
    /// ML-KEM-768 encapsulation key.
    pub encapsulation_key: KemPublicKey,
}

/// An Ed25519 signature over an action.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionSignature {
    #[serde(with = "super::hex_bytes")]
    bytes: Vec<u8>,
}

impl PrincipalKeys {
    /// Generate a fresh keypair from the OS RNG.
    pub fn generate() -> Result<Self, KeyGenerationError> {
        Self::try_generate(&mut rand::rngs::OsRng)
    }

    /// Generate a keypair from a caller-supplied RNG.
    ///
    /// Uses `try_fill_bytes` so a failing entropy source surfaces as
    /// [`KeyGenerationError::EntropyUnavailable`] instead of a panic.
    pub fn try_generate<R: RngCore + CryptoRng>(rng: &mut R) -> Result<Self, KeyGenerationError> {
        let mut seed = [0u8; PRINCIPAL_SEED_LENGTH];
        rng.try_fill_bytes(&mut seed)
            .map_err(|e| KeyGenerationError::EntropyUnavailable(e.to_string()))?;
        let keys = Self::from_seed(&seed);
        seed.fill(0);
        Ok(keys)
    }

    /// Derive both keys deterministically from a 64-byte seed.
    ///
    /// The first half is the Ed25519 secret; the second half seeds the
    /// ML-KEM key generator.
    pub fn from_seed(seed: &[u8; PRINCIPAL_SEED_LENGTH]) -> Self {
        let mut ed_seed = [0u8; 32];
        let mut kem_seed = [0u8; 32];
        ed_seed.copy_from_slice(&seed[..32]);
        kem_seed.copy_from_slice(&seed[32..]);

        let signing_key = SigningKey::from_bytes(&ed_seed);
        ed_seed.fill(0);
        let (kem_secret, kem_public) = KemSecretKey::generate(&mut StdRng::from_seed(kem_seed));

        Self {
            signing_key,
            kem_seed,
            kem_secret,
            kem_public,
        }
    }

    /// Restore a keypair from the hex seed written by [`to_seed_hex`](Self::to_seed_hex).
    pub fn from_seed_hex(hex_str: &str) -> Result<Self, KeyGenerationError> {
        let bytes = hex::decode(hex_str.trim()).map_err(|_| KeyGenerationError::InvalidSeed)?;
        let seed: [u8; PRINCIPAL_SEED_LENGTH] =
            bytes.try_into().map_err(|_| KeyGenerationError::InvalidSeed)?;
        Ok(Self::from_seed(&seed))
    }

    /// Export the seed as hex. **Handle with care**: this is the whole identity.
    pub fn to_seed_hex(&self) -> String {
        let mut seed = [0u8; PRINCIPAL_SEED_LENGTH];
        seed[..32].copy_from_slice(&self.signing_key.to_bytes());
        seed[32..].copy_from_slice(&self.kem_seed);
        let out = hex::encode(seed);
        seed.fill(0);
        out
    }

    /// The public half.
    pub fn public_key(&self) -> PrincipalPublicKey {
        PrincipalPublicKey {
            verifying_key: self.signing_key.verifying_key().to_bytes(),
            encapsulation_key: self.kem_public.clone(),
        }
    }

    /// Sign a message with the Ed25519 key.
    pub fn sign(&self, message: &[u8]) -> Result<ActionSignature, SigningError> {
        let sig = self
            .signing_key
            .try_sign(message)
            .map_err(|e| SigningError::Rejected(e.to_string()))?;
        Ok(ActionSignature {
            bytes: sig.to_bytes().to_vec(),
        })
    }

    /// This principal's ML-KEM decapsulation key, for opening payloads
    /// addressed to it.
    pub fn kem_secret(&self) -> &KemSecretKey {
        &self.kem_secret
    }

    /// This principal's ML-KEM encapsulation key.
    pub fn kem_public(&self) -> &KemPublicKey {
        &self.kem_public
    }
}

impl fmt::Debug for PrincipalKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PrincipalKeys(pub={})", self.public_key().verifying_key_hex())
    }
}

// ---------------------------------------------------------------------------
// PrincipalPublicKey
// ---------------------------------------------------------------------------

impl PrincipalPublicKey {
    /// Verify an Ed25519 signature. `false` for any malformed input.
    pub fn verify(&self, message: &[u8], signature: &ActionSignature) -> bool {
        let Ok(verifying_key) = VerifyingKey::from_bytes(&self.verifying_key) else {
            return false;
        };
        let Some(sig) = signature.to_dalek_signature() else {
            return false;
        };
        verifying_key.verify(message, &sig).is_ok()
    }

    /// Hex-encoded verifying key, the principal's short public identifier.
    pub fn verifying_key_hex(&self) -> String {
        hex::encode(self.verifying_key)
    }
}

impl fmt::Debug for PrincipalPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PrincipalPublicKey({})", &self.verifying_key_hex()[..16])
    }
}

// ---------------------------------------------------------------------------
// ActionSignature
// ---------------------------------------------------------------------------

impl ActionSignature {
    /// Wrap raw signature bytes.
    pub fn from_bytes(bytes: [u8; SIGNATURE_LENGTH]) -> Self {
        Self {
            bytes: bytes.to_vec(),
        }
    }

    /// Raw bytes; 64 for any signature this crate produced.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    fn to_dalek_signature(&self) -> Option<DalekSignature> {
        let arr: [u8; SIGNATURE_LENGTH] = self.bytes.as_slice().try_into().ok()?;
        Some(DalekSignature::from_bytes(&arr))
    }

    /// Hex encoding, 128 characters.
    pub fn to_hex(&self) -> String {
        hex::encode(&self.bytes)
    }
}

impl fmt::Debug for ActionSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hex_str = self.to_hex();
        if hex_str.len() >= 128 {
            write!(f, "ActionSignature({}...{})", &hex_str[..8], &hex_str[120..])
        } else {
            write!(f, "ActionSignature({})", hex_str)
        }
    }
}
