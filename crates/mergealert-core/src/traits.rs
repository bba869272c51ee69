//! Core traits defined in `mergealert-core` and implemented by other crates.

use crate::result::AppResult;

/// Turns a stored GitLab credential into the plaintext token sent to the
/// GitLab API.
///
/// The account layer that encrypts tokens at rest lives outside this
/// service; deployments plug their cipher in through this trait.
pub trait TokenDecryptor: Send + Sync + std::fmt::Debug + 'static {
    /// Decrypt `ciphertext`. Implementations return an error rather than
    /// an empty string when nothing usable remains.
    fn decrypt(&self, ciphertext: &str) -> AppResult<String>;
}

/// Decryptor for deployments that keep the token in plaintext
/// configuration. Trims surrounding whitespace.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlaintextTokenDecryptor;

impl TokenDecryptor for PlaintextTokenDecryptor {
    fn decrypt(&self, ciphertext: &str) -> AppResult<String> {
        let token = ciphertext.trim();
        if token.is_empty() {
            return Err(crate::AppError::authentication("GitLab access token is empty"));
        }
        Ok(token.to_string())
    }
}
