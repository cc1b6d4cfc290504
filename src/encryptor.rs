//! Framing and encrypting an arbitrary byte stream into fixed-size,
//! self-describing chunks.
//!
//! Modeled as a stateful sink wrapping a single owned buffer: `write`
//! accumulates bytes and drains whole chunks to the inner sink as soon as
//! they're available; `finish` flushes the remainder and the mandatory
//! terminator, then hands the inner sink back.

use std::io;

use aead::rand_core::{OsRng, RngCore};

use crate::aead::{self as chunk_aead, NONCE_LEN, TAG_LEN};
use crate::error::{Error, Result};
use crate::header::{Header, V4_HEADER_LEN};
use crate::ids::{ResourceId, ResourceKey};
use crate::kdf;

/// Default `encryptedChunkSize`: large enough for a 1 MiB plaintext chunk
/// plus framing and AEAD overhead.
pub const DEFAULT_ENCRYPTED_CHUNK_SIZE: u32 = 1_048_596;

const FRAME_OVERHEAD: usize = V4_HEADER_LEN + NONCE_LEN + TAG_LEN;

/// Encrypts an input byte stream into a sequence of framed v4 chunks,
/// written to `sink` as they become available.
pub struct Encryptor<W: io::Write> {
    sink: W,
    resource_id: ResourceId,
    resource_key: ResourceKey,
    encrypted_chunk_size: u32,
    clear_chunk_size: usize,
    buffer: Vec<u8>,
    index: u64,
    terminal: Option<Error>,
}

impl<W: io::Write> Encryptor<W> {
    /// Builds an encryptor with the [`DEFAULT_ENCRYPTED_CHUNK_SIZE`].
    #[must_use]
    pub fn new(sink: W, resource_id: ResourceId, resource_key: ResourceKey) -> Self {
        Self::with_chunk_size(sink, resource_id, resource_key, DEFAULT_ENCRYPTED_CHUNK_SIZE)
            .expect("default chunk size is always large enough")
    }

    /// Builds an encryptor with a caller-chosen `encrypted_chunk_size`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if `encrypted_chunk_size` is too
    /// small to hold the header, IV seed, and AEAD overhead plus at least
    /// one byte of plaintext.
    pub fn with_chunk_size(
        sink: W,
        resource_id: ResourceId,
        resource_key: ResourceKey,
        encrypted_chunk_size: u32,
    ) -> Result<Self> {
        let clear_chunk_size = (encrypted_chunk_size as usize)
            .checked_sub(FRAME_OVERHEAD)
            .filter(|&n| n > 0)
            .ok_or_else(|| {
                Error::InvalidArgument(format!(
                    "encryptedChunkSize must be greater than {FRAME_OVERHEAD}"
                ))
            })?;

        Ok(Self {
            sink,
            resource_id,
            resource_key,
            encrypted_chunk_size,
            clear_chunk_size,
            buffer: Vec::new(),
            index: 0,
            terminal: None,
        })
    }

    /// Returns the configured resource identifier.
    #[must_use]
    pub fn resource_id(&self) -> ResourceId {
        self.resource_id
    }

    /// Appends `bytes` to the pipeline, draining any complete chunks to the
    /// sink.
    ///
    /// `write` takes the pipeline by reference and `finish` by value, so
    /// "no write or finish after finish" is enforced by ownership:
    /// [`Encryptor::finish`] consumes `self`, so a second `write` or
    /// `finish` after it cannot even be expressed, let alone compile.
    ///
    /// # Errors
    ///
    /// [`Error::BrokenStream`] if a previous write to the sink failed.
    pub fn write(&mut self, bytes: &[u8]) -> Result<()> {
        self.check_open()?;

        self.buffer.extend_from_slice(bytes);
        while self.buffer.len() >= self.clear_chunk_size {
            let chunk: Vec<u8> = self.buffer.drain(..self.clear_chunk_size).collect();
            self.encrypt_and_emit(&chunk)?;
        }
        Ok(())
    }

    /// Flushes any buffered plaintext as the final chunk, emits the
    /// mandatory terminator if required, and returns the inner sink.
    ///
    /// # Errors
    ///
    /// [`Error::BrokenStream`] if flushing failed.
    pub fn finish(mut self) -> Result<W> {
        self.check_open()?;

        // `write` only ever drains the buffer down to a residue strictly
        // shorter than `clear_chunk_size`, so the remainder flushed here is
        // never itself a full chunk. By construction it is exactly the
        // terminator the wire format requires: either a genuinely partial
        // last chunk, or an empty chunk directly following a full one.
        let remainder: Vec<u8> = self.buffer.drain(..).collect();
        self.encrypt_and_emit(&remainder)?;

        Ok(self.sink)
    }

    fn check_open(&self) -> Result<()> {
        if let Some(err) = &self.terminal {
            return Err(err.clone());
        }
        Ok(())
    }

    fn encrypt_and_emit(&mut self, plaintext: &[u8]) -> Result<()> {
        let mut iv_seed = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut iv_seed);

        let sub_key = kdf::derive_sub_key(&self.resource_key, self.index);
        let iv = kdf::derive_iv(&iv_seed, self.index);
        let ciphertext = chunk_aead::encrypt(&sub_key, &iv, plaintext)?;

        let header = Header::V4 {
            encrypted_chunk_size: self.encrypted_chunk_size,
            resource_id: self.resource_id,
        };

        self.index += 1;

        self.emit(&header.serialize())?;
        self.emit(&iv_seed)?;
        self.emit(&ciphertext)
    }

    fn emit(&mut self, bytes: &[u8]) -> Result<()> {
        if let Err(io_err) = self.sink.write_all(bytes) {
            let err =
                Error::InvalidArgument(format!("sink write failed: {io_err}")).into_broken();
            self.terminal = Some(err.clone());
            return Err(err);
        }
        Ok(())
    }
}
