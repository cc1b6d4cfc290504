//! Authenticated symmetric encryption of a single chunk.
//!
//! Instantiated with XChaCha20-Poly1305: a 32-byte key, a 24-byte extended
//! nonce, and a 16-byte authentication tag appended to the ciphertext.

use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{XChaCha20Poly1305, XNonce};

use crate::error::{Error, Result};

/// Authentication tag overhead added to every ciphertext.
pub const TAG_LEN: usize = 16;
/// Nonce length for XChaCha20-Poly1305.
pub const NONCE_LEN: usize = 24;
/// Key length for XChaCha20-Poly1305.
pub const KEY_LEN: usize = 32;

/// Encrypts `plaintext` under `(key, iv)`, returning `ciphertext ‖ tag`.
///
/// # Errors
///
/// Returns [`Error::InvalidArgument`] if `key` or `iv` are not the exact
/// lengths the cipher requires.
pub fn encrypt(key: &[u8; KEY_LEN], iv: &[u8; NONCE_LEN], plaintext: &[u8]) -> Result<Vec<u8>> {
    let cipher = XChaCha20Poly1305::new(key.into());
    let nonce = XNonce::from_slice(iv);
    cipher
        .encrypt(nonce, plaintext)
        .map_err(|_| Error::InvalidArgument("AEAD encryption failed".to_string()))
}

/// Decrypts `ciphertext` (which must include its trailing tag) under
/// `(key, iv)`.
///
/// # Errors
///
/// Returns [`Error::DecryptionFailed`] if the authentication tag does not
/// verify. No partial plaintext is ever returned on failure.
pub fn decrypt(key: &[u8; KEY_LEN], iv: &[u8; NONCE_LEN], ciphertext: &[u8]) -> Result<Vec<u8>> {
    let cipher = XChaCha20Poly1305::new(key.into());
    let nonce = XNonce::from_slice(iv);
    cipher
        .decrypt(nonce, ciphertext)
        .map_err(|_| Error::DecryptionFailed)
}
