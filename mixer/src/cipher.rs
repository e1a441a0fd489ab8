use aes::cipher::block_padding::Pkcs7;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use mixer_common::crypto::{random::secure_random_bytes, Keypair};
use scrypt::{scrypt, Params};

use crate::config::{IV_SIZE, KDF_SALT, KEY_SIZE};
use crate::error::CipherError;

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

/// Encrypts/decrypts `StoredWallet` secret keys using a fixed wire format:
///
/// ```text
/// iv(16) || AES-256-CBC(key, iv, base58(secret_key))
/// key = scrypt(master_secret, "salt", 32)
/// private_key = hex(iv) + ":" + hex(ciphertext)   // the persisted field
/// ```
///
/// The scrypt salt is a literal string, not a random value — this is a
/// known-weak legacy requirement, preserved so records encrypted by earlier
/// deployments keep decrypting. Do not change the KDF or the salt without a
/// migration path.
pub struct Cipher {
    key: [u8; KEY_SIZE],
}

impl Cipher {
    /// Derive the AES key from the master secret. Logs a one-time warning
    /// about the fixed-salt KDF rather than on every encrypt/decrypt call.
    pub fn new(master_secret: &str) -> Result<Self, CipherError> {
        let mut key = [0u8; KEY_SIZE];
        let params =
            Params::new(15, 8, 1, KEY_SIZE).map_err(|e| CipherError::Kdf(e.to_string()))?;
        scrypt(master_secret.as_bytes(), KDF_SALT.as_bytes(), &params, &mut key)
            .map_err(|e| CipherError::Kdf(e.to_string()))?;

        if log::log_enabled!(log::Level::Warn) {
            log::warn!(
                "wallet pool cipher uses a fixed scrypt salt for legacy compatibility; this is weak by modern standards"
            );
        }

        Ok(Self { key })
    }

    /// Encrypt a keypair's secret key. Returns `iv || ciphertext`; the
    /// plaintext round-trips under a fresh IV each call.
    pub fn encrypt(&self, keypair: &Keypair) -> Result<Vec<u8>, CipherError> {
        let iv: [u8; IV_SIZE] = secure_random_bytes::<IV_SIZE>();
        let plaintext = bs58::encode(keypair.to_bytes()).into_string();

        let ciphertext = Aes256CbcEnc::new(&self.key.into(), &iv.into())
            .encrypt_padded_vec_mut::<Pkcs7>(plaintext.as_bytes());

        let mut out = Vec::with_capacity(IV_SIZE + ciphertext.len());
        out.extend_from_slice(&iv);
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    /// Decrypt `iv || ciphertext` back to a keypair. Any failure here — bad
    /// padding, corrupted bytes, non-base58 plaintext, or a secret/public
    /// mismatch — surfaces as a decrypt-validation failure to the caller.
    pub fn decrypt(&self, encrypted: &[u8]) -> Result<Keypair, CipherError> {
        if encrypted.len() <= IV_SIZE {
            return Err(CipherError::Truncated);
        }
        let (iv, ciphertext) = encrypted.split_at(IV_SIZE);

        let plaintext = Aes256CbcDec::new(&self.key.into(), iv.into())
            .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
            .map_err(|_| CipherError::Aes)?;

        let secret_bytes = bs58::decode(&plaintext)
            .into_vec()
            .map_err(|_| CipherError::InvalidBase58)?;

        Ok(Keypair::from_slice(&secret_bytes)?)
    }

    /// Serialize encrypted bytes to the `"<hex iv>:<hex ciphertext>"` wire
    /// format persisted in the `private_key` field.
    pub fn to_wire_format(encrypted: &[u8]) -> String {
        let (iv, ciphertext) = encrypted.split_at(IV_SIZE);
        format!("{}:{}", hex::encode(iv), hex::encode(ciphertext))
    }

    /// Parse the `"<hex iv>:<hex ciphertext>"` wire format back to raw bytes.
    pub fn from_wire_format(wire: &str) -> Result<Vec<u8>, CipherError> {
        let (iv_hex, ciphertext_hex) = wire.split_once(':').ok_or(CipherError::Truncated)?;
        let mut bytes = hex::decode(iv_hex)?;
        bytes.extend(hex::decode(ciphertext_hex)?);
        Ok(bytes)
    }
}
