//! # Principal Session (Key Manager)
//!
//! A [`PrincipalSession`] is created at login and dropped at logout. It owns
//! the principal's keypair and passes it explicitly to each operation, so
//! there is no global key state.
//!
//! ## Replacement semantics
//!
//! [`generate_keypair`](PrincipalSession::generate_keypair) builds the new
//! pair *outside* the lock and then swaps it in under a write lock, bumping
//! the **key epoch**. Concurrent calls serialize on that swap: the last one
//! wins, and no reader ever observes a half-replaced pair. Anything prepared
//! under an older epoch (credential, sealed action) is refused at submission
//! time by [`crate::client::ActionClient`].

use parking_lot::RwLock;
use rand::{CryptoRng, RngCore};
use std::sync::Arc;

use crate::crypto::{PrincipalKeys, PrincipalPublicKey};
use crate::error::Error;

#[derive(Default)]
struct KeySlot {
    keys: Option<Arc<PrincipalKeys>>,
    epoch: u64,
}

/// Keys and identity for one principal, for the lifetime of a login.
pub struct PrincipalSession {
    principal_id: String,
    slot: RwLock<KeySlot>,
}

impl PrincipalSession {
    /// Start a session with no keys yet.
    pub fn new(principal_id: impl Into<String>) -> Self {
        Self {
            principal_id: principal_id.into(),
            slot: RwLock::new(KeySlot::default()),
        }
    }

    /// Start a session with keys loaded from storage.
    pub fn with_keys(principal_id: impl Into<String>, keys: PrincipalKeys) -> Self {
        let session = Self::new(principal_id);
        session.install(keys);
        session
    }

    pub fn principal_id(&self) -> &str {
        &self.principal_id
    }

    /// Generate a fresh keypair from the OS RNG and make it current.
    pub fn generate_keypair(&self) -> Result<Arc<PrincipalKeys>, Error> {
        let keys = PrincipalKeys::generate()?;
        Ok(self.install(keys))
    }

    /// Same as [`generate_keypair`](Self::generate_keypair) with an injected RNG.
    pub fn generate_keypair_with<R: RngCore + CryptoRng>(
        &self,
        rng: &mut R,
    ) -> Result<Arc<PrincipalKeys>, Error> {
        let keys = PrincipalKeys::try_generate(rng)?;
        Ok(self.install(keys))
    }

    /// Replace the current keypair. Returns the installed keys.
    pub fn install(&self, keys: PrincipalKeys) -> Arc<PrincipalKeys> {
        let keys = Arc::new(keys);
        let epoch = {
            let mut slot = self.slot.write();
            slot.keys = Some(Arc::clone(&keys));
            slot.epoch += 1;
            slot.epoch
        };
        tracing::info!(
            principal = %self.principal_id,
            epoch,
            verifying_key = %keys.public_key().verifying_key_hex(),
            "principal keypair installed"
        );
        keys
    }

    /// Current keys, if any.
    pub fn keys(&self) -> Option<Arc<PrincipalKeys>> {
        self.slot.read().keys.clone()
    }

    /// Current keys together with the epoch they belong to, read atomically.
    pub fn snapshot(&self) -> Result<(Arc<PrincipalKeys>, u64), Error> {
        let slot = self.slot.read();
        let keys = slot.keys.clone().ok_or(Error::MissingKeys)?;
        Ok((keys, slot.epoch))
    }

    /// Number of keypairs installed so far; zero before the first.
    pub fn epoch(&self) -> u64 {
        self.slot.read().epoch
    }

    pub fn public_key(&self) -> Option<PrincipalPublicKey> {
        self.slot.read().keys.as_ref().map(|k| k.public_key())
    }
}

impl std::fmt::Debug for PrincipalSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrincipalSession")
            .field("principal_id", &self.principal_id)
            .field("epoch", &self.epoch())
            .finish()
    }
}
