//! Per-chunk sub-key and IV derivation.
//!
//! Both functions are pure, deterministic PRFs over the chunk index.
//! `blake3::derive_key` domain-separates outputs by context string, so a
//! leaked sub-key never helps recover the corresponding IV and vice versa.

use crate::aead::{KEY_LEN, NONCE_LEN};
use crate::ids::ResourceKey;

const SUB_KEY_CONTEXT: &str = "sealstream 2026-01-01 chunk sub-key derivation";
const IV_CONTEXT: &str = "sealstream 2026-01-01 chunk iv derivation";
const LEGACY_IV_CONTEXT: &str = "sealstream 2026-01-01 v1 legacy iv derivation";

/// Derives the 32-byte sub-key for chunk `index` from `resource_key`.
#[must_use]
pub fn derive_sub_key(resource_key: &ResourceKey, index: u64) -> [u8; KEY_LEN] {
    let mut material = Vec::with_capacity(KEY_LEN + 8);
    material.extend_from_slice(resource_key.expose_bytes());
    material.extend_from_slice(&index.to_le_bytes());
    blake3::derive_key(SUB_KEY_CONTEXT, &material)
}

/// Derives the 24-byte AEAD nonce for chunk `index` from its `iv_seed`.
#[must_use]
pub fn derive_iv(iv_seed: &[u8; NONCE_LEN], index: u64) -> [u8; NONCE_LEN] {
    let mut material = Vec::with_capacity(NONCE_LEN + 8);
    material.extend_from_slice(iv_seed);
    material.extend_from_slice(&index.to_le_bytes());
    let full = blake3::derive_key(IV_CONTEXT, &material);
    let mut iv = [0u8; NONCE_LEN];
    iv.copy_from_slice(&full[..NONCE_LEN]);
    iv
}

/// Derives the 24-byte AEAD nonce for chunk `index` of a v1 stream, which
/// carries no inline `ivSeed` on the wire (the IV is derived from the
/// resource key and index alone).
#[must_use]
pub fn derive_legacy_iv(resource_key: &ResourceKey, index: u64) -> [u8; NONCE_LEN] {
    let mut material = Vec::with_capacity(KEY_LEN + 8);
    material.extend_from_slice(resource_key.expose_bytes());
    material.extend_from_slice(&index.to_le_bytes());
    let full = blake3::derive_key(LEGACY_IV_CONTEXT, &material);
    let mut iv = [0u8; NONCE_LEN];
    iv.copy_from_slice(&full[..NONCE_LEN]);
    iv
}
