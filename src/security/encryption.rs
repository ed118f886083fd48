//! Encryption at rest for document blobs.
//!
//! Provides AES-256-GCM authenticated encryption keyed by a passphrase.
//!
//! # Security Properties
//!
//! - **Algorithm**: AES-256-GCM (authenticated encryption)
//! - **Key**: 32 bytes derived with PBKDF2-HMAC-SHA256 from the passphrase
//! - **Salt**: 16 random bytes per encryptor, stored in every blob
//! - **Nonce**: 12 bytes, randomly generated per encryption
//! - **Format**: `PAPERTRAY_ENC1` magic + iterations (u32 BE) + salt + nonce + ciphertext + tag
//!
//! Blobs carry their own salt and iteration count, so a blob written by one
//! process can be decrypted by any other holding the same passphrase.
//!
//! # Example
//!
//! ```rust,ignore
//! use papertray::security::{Crypto, Encryptor};
//! use secrecy::SecretString;
//!
//! let encryptor = Encryptor::from_passphrase(&SecretString::from("hunter2"))?;
//! let encrypted = encryptor.encrypt(b"sensitive data")?;
//! assert_eq!(encryptor.decrypt(&encrypted)?, b"sensitive data");
//! ```

use crate::{Error, Result};

use aes_gcm::{
    Aes256Gcm, Nonce,
    aead::{Aead, KeyInit},
};
use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;

/// Magic bytes identifying encrypted blobs.
pub const MAGIC_HEADER: &[u8] = b"PAPERTRAY_ENC1";

/// Default PBKDF2 iteration count.
pub const DEFAULT_ITERATIONS: u32 = 100_000;

/// Highest PBKDF2 iteration count accepted, from configuration or a blob header.
pub const MAX_ITERATIONS: u32 = DEFAULT_ITERATIONS * 10;

const SALT_SIZE: usize = 16;
const NONCE_SIZE: usize = 12;
const KEY_SIZE: usize = 32;
const TAG_SIZE: usize = 16;
const HEADER_SIZE: usize = MAGIC_HEADER.len() + 4 + SALT_SIZE + NONCE_SIZE;

/// Symmetric encryption of blob contents.
pub trait Crypto: Send + Sync {
    /// Encrypts plaintext into a self-describing blob.
    ///
    /// # Errors
    ///
    /// Returns an error if encryption fails.
    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>>;

    /// Decrypts a blob produced by [`Crypto::encrypt`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for malformed blobs and
    /// [`Error::OperationFailed`] for a wrong key or tampered data.
    fn decrypt(&self, encrypted: &[u8]) -> Result<Vec<u8>>;
}

/// AES-256-GCM encryptor with a passphrase-derived key.
pub struct Encryptor {
    passphrase: SecretString,
    salt: [u8; SALT_SIZE],
    iterations: u32,
    cipher: Aes256Gcm,
}

impl std::fmt::Debug for Encryptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Encryptor")
            .field("iterations", &self.iterations)
            .finish_non_exhaustive()
    }
}

impl Encryptor {
    /// Creates an encryptor with a fresh random salt.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if the passphrase is empty.
    pub fn from_passphrase(passphrase: &SecretString) -> Result<Self> {
        Self::with_iterations(passphrase, DEFAULT_ITERATIONS)
    }

    /// Creates an encryptor with an explicit PBKDF2 iteration count.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if the passphrase is empty or the
    /// iteration count is zero or above [`MAX_ITERATIONS`].
    pub fn with_iterations(passphrase: &SecretString, iterations: u32) -> Result<Self> {
        if passphrase.expose_secret().is_empty() {
            return Err(Error::Configuration(
                "encryption passphrase must not be empty".to_string(),
            ));
        }
        if iterations == 0 {
            return Err(Error::Configuration(
                "PBKDF2 iterations must be positive".to_string(),
            ));
        }
        if iterations > MAX_ITERATIONS {
            return Err(Error::Configuration(format!(
                "PBKDF2 iterations must not exceed {MAX_ITERATIONS}"
            )));
        }

        let mut salt = [0u8; SALT_SIZE];
        rand::thread_rng().fill_bytes(&mut salt);
        let cipher = derive_cipher(passphrase, &salt, iterations)?;

        Ok(Self {
            passphrase: SecretString::from(passphrase.expose_secret().to_owned()),
            salt,
            iterations,
            cipher,
        })
    }
}

impl Crypto for Encryptor {
    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext =
            self.cipher
                .encrypt(nonce, plaintext)
                .map_err(|e| Error::OperationFailed {
                    operation: "encrypt".to_string(),
                    cause: format!("AES-256-GCM encryption failed: {e}"),
                })?;

        let mut output = Vec::with_capacity(HEADER_SIZE + ciphertext.len());
        output.extend_from_slice(MAGIC_HEADER);
        output.extend_from_slice(&self.iterations.to_be_bytes());
        output.extend_from_slice(&self.salt);
        output.extend_from_slice(&nonce_bytes);
        output.extend_from_slice(&ciphertext);

        tracing::debug!(
            plaintext_len = plaintext.len(),
            encrypted_len = output.len(),
            "Encrypted data"
        );

        Ok(output)
    }

    fn decrypt(&self, encrypted: &[u8]) -> Result<Vec<u8>> {
        let min_size = HEADER_SIZE + TAG_SIZE;
        if encrypted.len() < min_size {
            return Err(Error::InvalidInput(format!(
                "Encrypted data too short: {} bytes, minimum {min_size}",
                encrypted.len()
            )));
        }
        if !is_encrypted(encrypted) {
            return Err(Error::InvalidInput(
                "Invalid encrypted blob: missing magic header".to_string(),
            ));
        }

        let (iter_bytes, rest) = encrypted[MAGIC_HEADER.len()..].split_at(4);
        let (salt, rest) = rest.split_at(SALT_SIZE);
        let (nonce_bytes, ciphertext) = rest.split_at(NONCE_SIZE);

        let iterations = u32::from_be_bytes(
            iter_bytes
                .try_into()
                .map_err(|_| Error::InvalidInput("Invalid iteration field".to_string()))?,
        );
        if iterations == 0 || iterations > MAX_ITERATIONS {
            return Err(Error::InvalidInput(format!(
                "Invalid encrypted blob: iteration count {iterations} outside 1..={MAX_ITERATIONS}"
            )));
        }

        // Blobs from another encryptor instance carry their own salt.
        let foreign;
        let cipher = if salt == self.salt && iterations == self.iterations {
            &self.cipher
        } else {
            foreign = derive_cipher(&self.passphrase, salt, iterations)?;
            &foreign
        };

        let plaintext = cipher
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|e| Error::OperationFailed {
                operation: "decrypt".to_string(),
                cause: format!("AES-256-GCM decryption failed (wrong key or corrupted data): {e}"),
            })?;

        tracing::debug!(
            encrypted_len = encrypted.len(),
            plaintext_len = plaintext.len(),
            "Decrypted data"
        );

        Ok(plaintext)
    }
}

fn derive_cipher(passphrase: &SecretString, salt: &[u8], iterations: u32) -> Result<Aes256Gcm> {
    let mut key = [0u8; KEY_SIZE];
    pbkdf2_hmac::<Sha256>(
        passphrase.expose_secret().as_bytes(),
        salt,
        iterations,
        &mut key,
    );
    let cipher = Aes256Gcm::new_from_slice(&key).map_err(|e| Error::OperationFailed {
        operation: "derive_key".to_string(),
        cause: e.to_string(),
    });
    key.fill(0);
    cipher
}

/// Checks if data appears to be encrypted (has magic header).
#[must_use]
pub fn is_encrypted(data: &[u8]) -> bool {
    data.starts_with(MAGIC_HEADER)
}
