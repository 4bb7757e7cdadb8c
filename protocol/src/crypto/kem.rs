//! # Lattice Sealing (ML-KEM-768 + AES-256-GCM)
//!
//! Actions are sealed to a *decrypting party* (the Ledger, or a recipient
//! principal) with a KEM/DEM construction:
//!
//! 1. ML-KEM-768 encapsulates a fresh 32-byte shared secret to the target's
//!    encapsulation key and yields a 1088-byte KEM ciphertext.
//! 2. The AEAD key is `BLAKE3::derive_key(context, secret || kem_ciphertext)`,
//!    which binds the key to this exact encapsulation.
//! 3. The action is sealed with AES-256-GCM under a random 96-bit nonce, with
//!    the protocol label as AAD.
//!
//! ## Bounded plaintext
//!
//! One seal carries one block of at most [`MAX_ACTION_LENGTH`] bytes. There
//! is no chunking scheme; callers with larger payloads get
//! [`EncryptionError::PlaintextTooLarge`], never a truncated ciphertext.

use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Nonce,
};
use ml_kem::array::Array;
use ml_kem::kem::{Decapsulate, Encapsulate};
use ml_kem::{Ciphertext, EncodedSizeUser, KemCore, MlKem768};
use rand::rngs::OsRng;
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::config::{
    ACTION_SEAL_AAD, AES_NONCE_LENGTH, KEM_CIPHERTEXT_LENGTH, KEM_KDF_CONTEXT,
    KEM_PUBLIC_KEY_LENGTH, MAX_ACTION_LENGTH,
};

type EncapsulationKey = <MlKem768 as KemCore>::EncapsulationKey;
type DecapsulationKey = <MlKem768 as KemCore>::DecapsulationKey;

/// Sealing or opening failed.
///
/// `OpenFailed` covers both a wrong key and a tampered ciphertext.
#[derive(Debug, Error)]
pub enum EncryptionError {
    #[error("action is empty")]
    EmptyPlaintext,

    #[error("action is {length} bytes; a single seal holds at most {max}")]
    PlaintextTooLarge { length: usize, max: usize },

    #[error("refusing to seal an action to the signer's own key")]
    SelfEncryption,

    #[error("invalid ML-KEM-768 public key: expected {KEM_PUBLIC_KEY_LENGTH} bytes")]
    InvalidPublicKey,

    #[error("malformed sealed action")]
    MalformedCiphertext,

    #[error("encryption failed")]
    SealFailed,

    #[error("decryption failed -- wrong key or corrupted ciphertext")]
    OpenFailed,
}

/// An ML-KEM-768 encapsulation key, hex on the wire.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct KemPublicKey {
    bytes: Vec<u8>,
}

/// An ML-KEM-768 decapsulation key. Never leaves the process.
pub struct KemSecretKey {
    dk: DecapsulationKey,
}

/// An action sealed to a decrypting party.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedAction {
    /// ML-KEM-768 ciphertext carrying the shared secret.
    #[serde(with = "super::hex_bytes")]
    pub kem_ciphertext: Vec<u8>,
    /// AES-256-GCM nonce.
    #[serde(with = "super::hex_bytes")]
    pub nonce: Vec<u8>,
    /// AES-256-GCM ciphertext, tag appended.
    #[serde(with = "super::hex_bytes")]
    pub ciphertext: Vec<u8>,
}

impl KemSecretKey {
    /// Generate an ML-KEM-768 keypair from the given RNG.
    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> (Self, KemPublicKey) {
        let (dk, ek) = MlKem768::generate(rng);
        let public = KemPublicKey {
            bytes: ek.as_bytes().to_vec(),
        };
        (Self { dk }, public)
    }
}

impl fmt::Debug for KemSecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("KemSecretKey(..)")
    }
}

impl KemPublicKey {
    /// Validate and wrap raw encapsulation key bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, EncryptionError> {
        if bytes.len() != KEM_PUBLIC_KEY_LENGTH {
            return Err(EncryptionError::InvalidPublicKey);
        }
        Ok(Self {
            bytes: bytes.to_vec(),
        })
    }

    /// Parse a hex-encoded key.
    pub fn from_hex(s: &str) -> Result<Self, EncryptionError> {
        let bytes = hex::decode(s.trim()).map_err(|_| EncryptionError::InvalidPublicKey)?;
        Self::from_bytes(&bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.bytes)
    }

    fn to_encapsulation_key(&self) -> Result<EncapsulationKey, EncryptionError> {
        let encoded = Array::try_from(self.bytes.as_slice())
            .map_err(|_| EncryptionError::InvalidPublicKey)?;
        Ok(EncapsulationKey::from_bytes(&encoded))
    }
}

impl TryFrom<String> for KemPublicKey {
    type Error = EncryptionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_hex(&value)
    }
}

impl From<KemPublicKey> for String {
    fn from(key: KemPublicKey) -> Self {
        key.to_hex()
    }
}

impl fmt::Debug for KemPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KemPublicKey({}...)", &self.to_hex()[..16])
    }
}

fn derive_aead_key(shared_secret: &[u8], kem_ciphertext: &[u8]) -> [u8; 32] {
    let mut ikm = Vec::with_capacity(shared_secret.len() + kem_ciphertext.len());
    ikm.extend_from_slice(shared_secret);
    ikm.extend_from_slice(kem_ciphertext);
    let key = blake3::derive_key(KEM_KDF_CONTEXT, &ikm);
    ikm.fill(0);
    key
}

/// Seal `plaintext` so only the holder of `recipient`'s secret key can open it.
pub fn seal_action(
    recipient: &KemPublicKey,
    plaintext: &[u8],
) -> Result<EncryptedAction, EncryptionError> {
    if plaintext.is_empty() {
        return Err(EncryptionError::EmptyPlaintext);
    }
    if plaintext.len() > MAX_ACTION_LENGTH {
        return Err(EncryptionError::PlaintextTooLarge {
            length: plaintext.len(),
            max: MAX_ACTION_LENGTH,
        });
    }

    let ek = recipient.to_encapsulation_key()?;
    let (kem_ct, shared) = ek
        .encapsulate(&mut OsRng)
        .map_err(|_| EncryptionError::SealFailed)?;
    let key = derive_aead_key(shared.as_slice(), kem_ct.as_slice());

    let cipher = Aes256Gcm::new_from_slice(&key).map_err(|_| EncryptionError::SealFailed)?;
    let mut nonce_bytes = [0u8; AES_NONCE_LENGTH];
    OsRng.fill_bytes(&mut nonce_bytes);

    let ciphertext = cipher
        .encrypt(
            Nonce::from_slice(&nonce_bytes),
            Payload {
                msg: plaintext,
                aad: ACTION_SEAL_AAD,
            },
        )
        .map_err(|_| EncryptionError::SealFailed)?;

    Ok(EncryptedAction {
        kem_ciphertext: kem_ct.as_slice().to_vec(),
        nonce: nonce_bytes.to_vec(),
        ciphertext,
    })
}

/// Open a sealed action. Used by the decrypting party, never by the sender.
pub fn open_action(
    secret: &KemSecretKey,
    sealed: &EncryptedAction,
) -> Result<Vec<u8>, EncryptionError> {
    if sealed.kem_ciphertext.len() != KEM_CIPHERTEXT_LENGTH
        || sealed.nonce.len() != AES_NONCE_LENGTH
    {
        return Err(EncryptionError::MalformedCiphertext);
    }

    let kem_ct: Ciphertext<MlKem768> = Array::try_from(sealed.kem_ciphertext.as_slice())
        .map_err(|_| EncryptionError::MalformedCiphertext)?;
    let shared = secret
        .dk
        .decapsulate(&kem_ct)
        .map_err(|_| EncryptionError::OpenFailed)?;
    let key = derive_aead_key(shared.as_slice(), &sealed.kem_ciphertext);

    let cipher = Aes256Gcm::new_from_slice(&key).map_err(|_| EncryptionError::OpenFailed)?;
    cipher
        .decrypt(
            Nonce::from_slice(&sealed.nonce),
            Payload {
                msg: &sealed.ciphertext,
                aad: ACTION_SEAL_AAD,
            },
        )
        .map_err(|_| EncryptionError::OpenFailed)
}
