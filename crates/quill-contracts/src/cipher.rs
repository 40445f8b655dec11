//! Symmetric cipher for API keys stored in the settings file.
//!
//! Layout of an encrypted value: `base64(iv[16] || aes256cbc_pkcs7(plaintext))`.
//! The key itself is stored as base64 of 32 random bytes.

use aes::cipher::block_padding::Pkcs7;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use base64::Engine;
use rand::RngCore;
use thiserror::Error;

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

const BASE64: base64::engine::GeneralPurpose = base64::engine::general_purpose::STANDARD;

pub const KEY_LEN: usize = 32;
pub const IV_LEN: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CipherError {
    #[error("encryption key is not valid base64")]
    KeyEncoding,
    #[error("encryption key must decode to {KEY_LEN} bytes, got {0}")]
    KeyLength(usize),
    #[error("ciphertext is not valid base64")]
    CiphertextEncoding,
    #[error("ciphertext is shorter than the IV")]
    CiphertextTooShort,
    #[error("ciphertext could not be decrypted with this key")]
    Decrypt,
    #[error("decrypted value is not valid UTF-8")]
    Utf8,
}

#[derive(Clone)]
pub struct CredentialCipher {
    key: [u8; KEY_LEN],
}

impl std::fmt::Debug for CredentialCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialCipher").finish_non_exhaustive()
    }
}

impl CredentialCipher {
    /// New random key, base64 encoded.
    pub fn generate_key() -> String {
        let mut key = [0u8; KEY_LEN];
        rand::thread_rng().fill_bytes(&mut key);
        BASE64.encode(key)
    }

    pub fn from_encoded_key(encoded: &str) -> Result<Self, CipherError> {
        let raw = BASE64
            .decode(encoded.trim())
            .map_err(|_| CipherError::KeyEncoding)?;
        let key: [u8; KEY_LEN] = raw
            .as_slice()
            .try_into()
            .map_err(|_| CipherError::KeyLength(raw.len()))?;
        Ok(Self { key })
    }

    pub fn encrypt(&self, plaintext: &str) -> String {
        if plaintext.is_empty() {
            return String::new();
        }
        let mut iv = [0u8; IV_LEN];
        rand::thread_rng().fill_bytes(&mut iv);
        let ciphertext = Aes256CbcEnc::new(&self.key.into(), &iv.into())
            .encrypt_padded_vec_mut::<Pkcs7>(plaintext.as_bytes());

        let mut combined = Vec::with_capacity(IV_LEN + ciphertext.len());
        combined.extend_from_slice(&iv);
        combined.extend_from_slice(&ciphertext);
        BASE64.encode(combined)
    }

    pub fn decrypt(&self, encoded: &str) -> Result<String, CipherError> {
        let encoded = encoded.trim();
        if encoded.is_empty() {
            return Ok(String::new());
        }
        let data = BASE64
            .decode(encoded)
            .map_err(|_| CipherError::CiphertextEncoding)?;
        if data.len() < IV_LEN {
            return Err(CipherError::CiphertextTooShort);
        }
        let (iv, ciphertext) = data.split_at(IV_LEN);
        let plain = Aes256CbcDec::new_from_slices(&self.key, iv)
            .map_err(|_| CipherError::Decrypt)?
            .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
            .map_err(|_| CipherError::Decrypt)?;
        String::from_utf8(plain).map_err(|_| CipherError::Utf8)
    }

    /// Heuristic only: strict base64 that decodes past the IV length.
    pub fn is_encrypted(value: &str) -> bool {
        let value = value.trim();
        if value.is_empty() {
            return false;
        }
        BASE64
            .decode(value)
            .map(|decoded| decoded.len() > IV_LEN)
            .unwrap_or(false)
    }
}
