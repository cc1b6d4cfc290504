//! Streaming resource encryption/decryption codec and the chunk-sealed
//! key index that binds many independently-encrypted chunks to a single
//! addressable resource.
//!
//! This crate implements the hard engineering at the core of an
//! end-to-end encryption client SDK: a bit-exact wire format, per-chunk
//! key derivation, strict-order authenticated decryption, and a compact
//! serialized key index. It does not perform identity authentication,
//! persist anything, or talk to a network (those are the caller's
//! concern, represented here only as the [`decryptor::KeyLookup`] trait).
//!
//! The six cooperating pieces, leaves-first:
//!
//! - [`aead`]: authenticated encryption of a single chunk.
//! - [`kdf`]: per-chunk sub-key and IV derivation.
//! - [`header`]: the versioned stream header, v1 and v4.
//! - [`encryptor`]: frames plaintext into encrypted chunks.
//! - [`decryptor`]: deframes chunks back into plaintext.
//! - [`seal`]: the sparse chunk-key index and its outer encryption.

pub mod aead;
pub mod decryptor;
pub mod encryptor;
pub mod error;
pub mod header;
pub mod ids;
pub mod kdf;
pub mod seal;
pub mod varint;

pub use decryptor::{Decryptor, KeyLookup};
pub use encryptor::Encryptor;
pub use error::{Error, Result};
pub use header::{Header, extract_resource_id};
pub use ids::{ResourceId, ResourceKey};
pub use seal::{ChunkSeal, SealArtifact};
