//! At-rest encryption of GitLab access tokens.
//!
//! Stored tokens are `base64(nonce || AES-256-GCM ciphertext)` with a
//! 12-byte nonce and the key derived as SHA-256 of the configured
//! encryption key.

use std::sync::Arc;

use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, KeyInit, Nonce};
use base64::Engine;
use sha2::{Digest, Sha256};

use crate::config::gitlab::GitLabConfig;
use crate::error::AppError;
use crate::result::AppResult;
use crate::traits::{PlaintextTokenDecryptor, TokenDecryptor};

const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

/// Decrypts AES-GCM encrypted tokens.
///
/// Values that are not base64 or too short to hold a nonce and tag are
/// taken as legacy plaintext tokens. A value that looks encrypted but
/// fails authentication is an error, never passed through.
#[derive(Clone)]
pub struct AesGcmTokenDecryptor {
    key: [u8; 32],
}

impl AesGcmTokenDecryptor {
    /// Derive the cipher key from `secret`.
    pub fn new(secret: &str) -> AppResult<Self> {
        if secret.is_empty() {
            return Err(AppError::configuration("Token encryption key is empty"));
        }
        let mut key = [0u8; 32];
        key.copy_from_slice(&Sha256::digest(secret.as_bytes()));
        Ok(Self { key })
    }

    fn open(&self, data: &[u8]) -> AppResult<String> {
        let cipher = Aes256Gcm::new_from_slice(&self.key)
            .map_err(|e| AppError::internal(format!("Invalid token cipher key: {e}")))?;
        let (nonce, sealed) = data.split_at(NONCE_LEN);
        let plaintext = cipher.decrypt(Nonce::from_slice(nonce), sealed).map_err(|_| {
            AppError::authentication(
                "Cannot decrypt GitLab access token; check gitlab.encryption_key",
            )
        })?;
        String::from_utf8(plaintext)
            .map_err(|_| AppError::authentication("Decrypted GitLab access token is not UTF-8"))
    }
}

impl std::fmt::Debug for AesGcmTokenDecryptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AesGcmTokenDecryptor").finish_non_exhaustive()
    }
}

impl TokenDecryptor for AesGcmTokenDecryptor {
    fn decrypt(&self, ciphertext: &str) -> AppResult<String> {
        let stored = ciphertext.trim();
        let decoded = base64::engine::general_purpose::STANDARD
            .decode(stored)
            .ok()
            .filter(|data| data.len() >= NONCE_LEN + TAG_LEN);

        let token = match decoded {
            Some(data) => self.open(&data)?,
            None => {
                tracing::warn!("GitLab access token is not encrypted, using it as plaintext");
                stored.to_string()
            }
        };

        PlaintextTokenDecryptor.decrypt(&token)
    }
}

/// The decryptor for `config`: AES-GCM when an encryption key is set,
/// plaintext otherwise.
pub fn token_decryptor(config: &GitLabConfig) -> AppResult<Arc<dyn TokenDecryptor>> {
    match config.encryption_key.as_deref().filter(|k| !k.is_empty()) {
        Some(key) => Ok(Arc::new(AesGcmTokenDecryptor::new(key)?)),
        None => Ok(Arc::new(PlaintextTokenDecryptor)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    const KEY: &str = "merge-alert-test-key";
    /// "glpat-abc123XYZ" sealed under KEY with nonce 00 01 .. 0b.
    const SEALED: &str = "AAECAwQFBgcICQoL1lWh7o1m0hBO15c5PXxrx+Rw3JTiljqqBEG/+WhU2A==";

    #[test]
    fn test_decrypts_sealed_token() {
        let decryptor = AesGcmTokenDecryptor::new(KEY).unwrap();
        assert_eq!(decryptor.decrypt(SEALED).unwrap(), "glpat-abc123XYZ");
        assert_eq!(decryptor.decrypt(&format!(" {SEALED}\n")).unwrap(), "glpat-abc123XYZ");
    }

    #[test]
    fn test_wrong_key_is_an_error() {
        let decryptor = AesGcmTokenDecryptor::new("another-key").unwrap();
        let err = decryptor.decrypt(SEALED).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Authentication);
    }

    #[test]
    fn test_tampered_ciphertext_is_an_error() {
        let mut tampered = SEALED.to_string();
        tampered.replace_range(20..21, if &SEALED[20..21] == "A" { "B" } else { "A" });
        let decryptor = AesGcmTokenDecryptor::new(KEY).unwrap();
        assert!(decryptor.decrypt(&tampered).is_err());
    }

    #[test]
    fn test_legacy_plaintext_passes() {
        let decryptor = AesGcmTokenDecryptor::new(KEY).unwrap();
        assert_eq!(decryptor.decrypt("glpat-legacy-token").unwrap(), "glpat-legacy-token");
        assert!(decryptor.decrypt("  ").is_err());
    }

    #[test]
    fn test_empty_key_rejected() {
        let err = AesGcmTokenDecryptor::new("").unwrap_err();
        assert_eq!(err.kind, ErrorKind::Configuration);
    }

    #[test]
    fn test_selection_follows_encryption_key() {
        let mut config = GitLabConfig::default();
        let plain = token_decryptor(&config).unwrap();
        assert_eq!(plain.decrypt(SEALED).unwrap(), SEALED);

        config.encryption_key = Some(KEY.to_string());
        let aes = token_decryptor(&config).unwrap();
        assert_eq!(aes.decrypt(SEALED).unwrap(), "glpat-abc123XYZ");
    }
}
