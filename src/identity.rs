// Node identity: ed25519 signing keyed by a hex public id.
// verify() is a real check; a tampered message, signature or key fails it.

use crate::error::{ChainError, Result};
use ed25519_dalek::{Keypair, PublicKey, SecretKey, Signature, Signer as _, Verifier};
use rand::RngCore;

/// Signing collaborator. Implementations must be deterministic for a given key.
pub trait Signer: Send + Sync {
    /// Sign `message`, returning the signature as lowercase hex.
    fn sign(&self, message: &[u8]) -> Result<String>;

    /// Hex-encoded public id that [`verify`] accepts for this signer.
    fn public_id_hex(&self) -> String;

    fn verify(&self, public_id_hex: &str, message: &[u8], signature_hex: &str) -> bool {
        verify(public_id_hex, message, signature_hex)
    }
}

pub struct Ed25519Identity {
    keypair: Keypair,
}

impl Ed25519Identity {
    pub fn from_secret(secret: [u8; 32]) -> Result<Self> {
        let secret =
            SecretKey::from_bytes(&secret).map_err(|e| ChainError::Signature(e.to_string()))?;
        let public: PublicKey = (&secret).into();
        Ok(Self {
            keypair: Keypair { secret, public },
        })
    }

    pub fn generate<R: RngCore>(rng: &mut R) -> Result<Self> {
        let mut secret = [0u8; 32];
        rng.fill_bytes(&mut secret);
        Self::from_secret(secret)
    }
}

impl std::fmt::Debug for Ed25519Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ed25519Identity")
            .field("public_id", &self.public_id_hex())
            .finish()
    }
}

impl Signer for Ed25519Identity {
    fn sign(&self, message: &[u8]) -> Result<String> {
        let sig = self.keypair.sign(message);
        Ok(hex::encode(sig.to_bytes()))
    }

    fn public_id_hex(&self) -> String {
        hex::encode(self.keypair.public.to_bytes())
    }
}

fn to_verifying_key(public_id_hex: &str) -> Option<PublicKey> {
    let bytes = hex::decode(public_id_hex).ok()?;
    PublicKey::from_bytes(&bytes).ok()
}

fn to_signature(signature_hex: &str) -> Option<Signature> {
    let bytes = hex::decode(signature_hex).ok()?;
    if bytes.len() != 64 {
        return None;
    }
    Signature::try_from(bytes.as_slice()).ok()
}

/// Check `signature_hex` over `message` against the key encoded in `public_id_hex`.
pub fn verify(public_id_hex: &str, message: &[u8], signature_hex: &str) -> bool {
    let Some(vk) = to_verifying_key(public_id_hex) else {
        return false;
    };
    let Some(sig) = to_signature(signature_hex) else {
        return false;
    };
    vk.verify(message, &sig).is_ok()
}
