use crate::errors::SeqnetError;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey as PublicKey};
use rand::Rng;
use sha2::{Digest, Sha256};
use std::fmt;

/// An ed25519 key pair. The hex encoding of the public key doubles as the
/// account identifier on the ledger.
#[derive(Clone)]
pub struct Crypto {
    public_key: PublicKey,
    signing_key: SigningKey,
}

impl Crypto {
    /// Generates a fresh key pair from the thread-local RNG.
    pub fn generate() -> Self {
        let mut seed = [0u8; 32];
        rand::rng().fill(&mut seed);
        Self::from_secret_key(&seed)
    }

    pub fn from_secret_key(secret_key: &[u8; 32]) -> Self {
        let signing_key = SigningKey::from_bytes(secret_key);
        let public_key = signing_key.verifying_key();
        Crypto {
            public_key,
            signing_key,
        }
    }

    /// Parses a 32 byte secret key given as 64 hex characters.
    pub fn from_secret_hex(secret: &str) -> Result<Self, SeqnetError> {
        let bytes = hex::decode(secret.trim())
            .map_err(|e| SeqnetError::InvalidKey(format!("secret key is not hex: {e}")))?;
        let seed: [u8; 32] = bytes.as_slice().try_into().map_err(|_| {
            SeqnetError::InvalidKey(format!(
                "secret key must be 32 bytes, got {}",
                bytes.len()
            ))
        })?;
        Ok(Self::from_secret_key(&seed))
    }

    pub fn public_key(&self) -> PublicKey {
        self.public_key
    }

    /// The account identifier owned by this key pair.
    pub fn account(&self) -> String {
        account_of(&self.public_key)
    }

    pub fn secret_hex(&self) -> String {
        hex::encode(self.signing_key.to_bytes())
    }

    pub fn sign(&self, message: &[u8]) -> Signature {
        self.signing_key.sign(&digest(message))
    }

    pub fn verify(
        message: &[u8],
        signature: &Signature,
        public_key: &PublicKey,
    ) -> Result<(), SeqnetError> {
        public_key
            .verify(&digest(message), signature)
            .map_err(|_| SeqnetError::InvalidSignature)
    }

    pub fn public_key_from_bytes(bytes: &[u8]) -> Result<PublicKey, SeqnetError> {
        let bytes: &[u8; 32] = bytes
            .try_into()
            .map_err(|_| SeqnetError::InvalidKey("public key must be 32 bytes".to_string()))?;
        PublicKey::from_bytes(bytes)
            .map_err(|_| SeqnetError::InvalidKey("not a valid ed25519 point".to_string()))
    }

    /// Parses an account identifier back into the public key it encodes.
    pub fn public_key_from_str(account: &str) -> Result<PublicKey, SeqnetError> {
        let bytes = hex::decode(account.trim())
            .map_err(|e| SeqnetError::InvalidKey(format!("account is not hex: {e}")))?;
        Self::public_key_from_bytes(&bytes)
    }

    pub fn signature_from_bytes(bytes: &[u8]) -> Result<Signature, SeqnetError> {
        Signature::from_slice(bytes).map_err(|_| SeqnetError::InvalidSignature)
    }
}

impl fmt::Debug for Crypto {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Crypto")
            .field("account", &self.account())
            .finish_non_exhaustive()
    }
}

pub fn account_of(public_key: &PublicKey) -> String {
    hex::encode(public_key.to_bytes())
}

/// SHA-256 of `bytes`.
pub fn digest(bytes: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hasher.finalize().into()
}
