//! Ed25519 keypair and public-key types used for mixer wallets.
//!
//! All generation goes through [`Keypair::generate`], which samples from
//! [`OsRng`] — the operating system's CSPRNG. Nothing on the mixing path may
//! construct key material from any other RNG.

use std::fmt;
use std::str::FromStr;

use ed25519_dalek::{Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::CryptoError;

pub const PUBLIC_KEY_SIZE: usize = 32;
pub const SECRET_KEY_SIZE: usize = 64;
pub const SIGNATURE_SIZE: usize = 64;

/// 32-byte ed25519 public key, the `public_key` field of a `StoredWallet`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PublicKey([u8; PUBLIC_KEY_SIZE]);

impl PublicKey {
    pub fn from_bytes(bytes: [u8; PUBLIC_KEY_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn from_slice(slice: &[u8]) -> Result<Self, CryptoError> {
        if slice.len() != PUBLIC_KEY_SIZE {
            return Err(CryptoError::InvalidLength {
                expected: PUBLIC_KEY_SIZE,
                got: slice.len(),
            });
        }
        let mut bytes = [0u8; PUBLIC_KEY_SIZE];
        bytes.copy_from_slice(slice);
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; PUBLIC_KEY_SIZE] {
        &self.0
    }

    pub fn to_base58(&self) -> String {
        bs58::encode(&self.0).into_string()
    }

    pub fn from_base58(s: &str) -> Result<Self, CryptoError> {
        let bytes = bs58::decode(s)
            .into_vec()
            .map_err(|e| CryptoError::InvalidBase58(e.to_string()))?;
        Self::from_slice(&bytes)
    }

    fn verify(&self, message: &[u8], signature: &Signature) -> bool {
        let Ok(verifying_key) = VerifyingKey::from_bytes(&self.0) else {
            return false;
        };
        let dalek_sig = ed25519_dalek::Signature::from_bytes(&signature.0);
        verifying_key.verify(message, &dalek_sig).is_ok()
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", self.to_base58())
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_base58())
    }
}

impl FromStr for PublicKey {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_base58(s)
    }
}

impl Serialize for PublicKey {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_base58())
    }
}

impl<'de> Deserialize<'de> for PublicKey {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_base58(&s).map_err(serde::de::Error::custom)
    }
}

/// Ed25519 signature over a submitted transfer instruction.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Signature([u8; SIGNATURE_SIZE]);

impl Signature {
    pub fn to_base58(&self) -> String {
        bs58::encode(&self.0).into_string()
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({}...)", &self.to_base58()[..16.min(self.to_base58().len())])
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_base58())
    }
}

/// Ed25519 keypair for a pool wallet or the funding/fee-funding wallet.
///
/// The secret half is zeroized on drop. Holders must never persist the
/// decrypted form; only `WalletPoolManager` persists the encrypted bytes.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Keypair {
    #[zeroize(skip)]
    signing_key: SigningKey,
}

impl Keypair {
    /// Sample a fresh keypair from the OS CSPRNG.
    pub fn generate() -> Self {
        let signing_key = SigningKey::generate(&mut OsRng);
        Self { signing_key }
    }

    /// Reconstruct from the 64-byte secret-key wire format (`seed || public`),
    /// matching how a wallet's decrypted `private_key_cipher` plaintext is laid out.
    pub fn from_bytes(bytes: &[u8; SECRET_KEY_SIZE]) -> Result<Self, CryptoError> {
        let mut seed = [0u8; 32];
        seed.copy_from_slice(&bytes[..32]);
        let signing_key = SigningKey::from_bytes(&seed);

        let mut claimed_public = [0u8; 32];
        claimed_public.copy_from_slice(&bytes[32..]);
        if signing_key.verifying_key().to_bytes() != claimed_public {
            return Err(CryptoError::MalformedKey);
        }

        Ok(Self { signing_key })
    }

    pub fn from_slice(slice: &[u8]) -> Result<Self, CryptoError> {
        if slice.len() != SECRET_KEY_SIZE {
            return Err(CryptoError::InvalidLength {
                expected: SECRET_KEY_SIZE,
                got: slice.len(),
            });
        }
        let mut bytes = [0u8; SECRET_KEY_SIZE];
        bytes.copy_from_slice(slice);
        Self::from_bytes(&bytes)
    }

    /// The `seed || public` wire format this type round-trips through.
    pub fn to_bytes(&self) -> [u8; SECRET_KEY_SIZE] {
        let mut out = [0u8; SECRET_KEY_SIZE];
        out[..32].copy_from_slice(&self.signing_key.to_bytes());
        out[32..].copy_from_slice(&self.signing_key.verifying_key().to_bytes());
        out
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey::from_bytes(self.signing_key.verifying_key().to_bytes())
    }

    pub fn sign(&self, message: &[u8]) -> Signature {
        let sig = self.signing_key.sign(message);
        Signature(sig.to_bytes())
    }
}

impl fmt::Debug for Keypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Keypair")
            .field("public_key", &self.public_key())
            .field("secret_key", &"[REDACTED]")
            .finish()
    }
}

/// Verify a signature produced by [`Keypair::sign`] against a public key.
pub fn verify(public_key: &PublicKey, message: &[u8], signature: &Signature) -> bool {
    public_key.verify(message, signature)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_round_trips_through_bytes() {
        let kp = Keypair::generate();
        let bytes = kp.to_bytes();
        let kp2 = Keypair::from_bytes(&bytes).unwrap();
        assert_eq!(kp.public_key(), kp2.public_key());
    }

    #[test]
    fn tampered_public_half_is_rejected() {
        let kp = Keypair::generate();
        let mut bytes = kp.to_bytes();
        bytes[32] ^= 0xFF;
        assert!(Keypair::from_bytes(&bytes).is_err());
    }

    #[test]
    fn sign_and_verify_round_trip() {
        let kp = Keypair::generate();
        let sig = kp.sign(b"route hop");
        assert!(verify(&kp.public_key(), b"route hop", &sig));
        assert!(!verify(&kp.public_key(), b"different message", &sig));
    }

    #[test]
    fn public_key_base58_round_trip() {
        let kp = Keypair::generate();
        let pk = kp.public_key();
        let encoded = pk.to_base58();
        let decoded = PublicKey::from_base58(&encoded).unwrap();
        assert_eq!(pk, decoded);
    }

    #[test]
    fn invalid_length_is_rejected() {
        assert!(PublicKey::from_slice(&[0u8; 10]).is_err());
        assert!(Keypair::from_slice(&[0u8; 10]).is_err());
    }
}
