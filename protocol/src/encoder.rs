//! # Action Encoder
//!
//! Turns a plaintext [`Action`] and the principal's keys into the two
//! artifacts the Ledger needs:
//!
//! - an [`EncryptedAction`] sealed to the **decrypting party**;
//! - an [`ActionSignature`] over the **plaintext**, so authorship is provable
//!   to anyone holding the action and the public key, independent of who can
//!   decrypt.
//!
//! ## Encryption target
//!
//! The target is chosen once, when the encoder is built, and is always
//! somebody else's key:
//!
//! - [`EncryptionTarget::Service`]: the Ledger's published ML-KEM key. This is
//!   the default for submissions, since the Ledger must read the action to
//!   record it while relays in between must not.
//! - [`EncryptionTarget::Recipient`]: another principal, for payloads meant
//!   for that principal alone.
//!
//! Sealing to the signer's own key protects nothing in transit and is
//! rejected with [`EncryptionError::SelfEncryption`].
//!
//! Encoding is pure: no I/O, no shared state.

use crate::action::Action;
use crate::crypto::{
    seal_action, ActionSignature, EncryptedAction, EncryptionError, KemPublicKey, PrincipalKeys,
    PrincipalPublicKey,
};
use crate::error::Error;

/// Who will be able to open the sealed action.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EncryptionTarget {
    /// The Ledger (or another service) identified by its ML-KEM key.
    Service(KemPublicKey),
    /// A specific principal.
    Recipient(PrincipalPublicKey),
}

impl EncryptionTarget {
    /// The encapsulation key actions are sealed under.
    pub fn key(&self) -> &KemPublicKey {
        match self {
            EncryptionTarget::Service(key) => key,
            EncryptionTarget::Recipient(principal) => &principal.encapsulation_key,
        }
    }
}

/// Output of [`ActionEncoder::encode`].
#[derive(Clone, Debug)]
pub struct EncodedAction {
    pub encrypted_action: EncryptedAction,
    pub signature: ActionSignature,
    /// Public key of the signer, so a verifier knows which key to check.
    pub signer: PrincipalPublicKey,
}

/// Seals and signs actions for one fixed target.
#[derive(Clone, Debug)]
pub struct ActionEncoder {
    target: EncryptionTarget,
}

impl ActionEncoder {
    pub fn new(target: EncryptionTarget) -> Self {
        Self { target }
    }

    /// Encoder that seals to a service (normally the Ledger).
    pub fn for_service(service_key: KemPublicKey) -> Self {
        Self::new(EncryptionTarget::Service(service_key))
    }

    pub fn target(&self) -> &EncryptionTarget {
        &self.target
    }

    /// Seal `action` to the target and sign its plaintext with `keys`.
    pub fn encode(&self, action: &Action, keys: &PrincipalKeys) -> Result<EncodedAction, Error> {
        if self.target.key() == keys.kem_public() {
            return Err(EncryptionError::SelfEncryption.into());
        }

        let encrypted_action = seal_action(self.target.key(), action.as_bytes())?;
        let signature = keys.sign(&action.signing_payload())?;

        tracing::debug!(
            kind = action.kind(),
            length = action.len(),
            "action encoded"
        );

        Ok(EncodedAction {
            encrypted_action,
            signature,
            signer: keys.public_key(),
        })
    }
}

/// Check that `signature` is `signer`'s signature over `action`.
pub fn verify_action_signature(
    action: &Action,
    signature: &ActionSignature,
    signer: &PrincipalPublicKey,
) -> bool {
    signer.verify(&action.signing_payload(), signature)
}


#[cfg(test)]
mod proptest_laws {
    use super::*;
    use crate::config::MAX_ACTION_LENGTH;
    use crate::crypto::{open_action, KemSecretKey};
    use proptest::prelude::*;

    fn arb_action() -> impl Strategy<Value = Vec<u8>> {
        prop::collection::vec(any::<u8>(), 1..=MAX_ACTION_LENGTH)
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        /// Fresh keys, any valid action: the signature verifies, and one
        /// flipped bit anywhere in the action breaks it.
        #[test]
        fn signature_binds_every_bit(
            bytes in arb_action(),
            index in any::<prop::sample::Index>(),
            bit in 0u8..8,
        ) {
            let (_, ledger_pk) = KemSecretKey::generate(&mut rand::rngs::OsRng);
            let keys = PrincipalKeys::generate().unwrap();
            let action = Action::new(bytes.clone());

            let encoded = ActionEncoder::for_service(ledger_pk).encode(&action, &keys).unwrap();
            prop_assert!(verify_action_signature(&action, &encoded.signature, &encoded.signer));

            let mut tampered = bytes;
            tampered[index.index(action.len())] ^= 1 << bit;
            prop_assert!(!verify_action_signature(
                &Action::new(tampered),
                &encoded.signature,
                &encoded.signer
            ));
        }

        /// The decrypting party always gets the exact action back.
        #[test]
        fn service_opens_what_was_encoded(bytes in arb_action()) {
            let (ledger_sk, ledger_pk) = KemSecretKey::generate(&mut rand::rngs::OsRng);
            let keys = PrincipalKeys::generate().unwrap();
            let action = Action::new(bytes);

            let encoded = ActionEncoder::for_service(ledger_pk).encode(&action, &keys).unwrap();
            let plaintext = open_action(&ledger_sk, &encoded.encrypted_action).unwrap();
            prop_assert_eq!(plaintext, action.as_bytes());
        }

        #[test]
        fn oversized_actions_never_encode(extra in 1usize..=MAX_ACTION_LENGTH) {
            let (_, ledger_pk) = KemSecretKey::generate(&mut rand::rngs::OsRng);
            let keys = PrincipalKeys::generate().unwrap();
            let action = Action::new(vec![0xA5; MAX_ACTION_LENGTH + extra]);

            let result = ActionEncoder::for_service(ledger_pk).encode(&action, &keys);
            let is_too_large = matches!(
                result,
                Err(Error::Encryption(EncryptionError::PlaintextTooLarge { length, max }))
                    if length == MAX_ACTION_LENGTH + extra && max == MAX_ACTION_LENGTH
            );
            prop_assert!(is_too_large);
        }
    }
}
