//! Deframing and decrypting a sequence of framed chunks back into
//! plaintext.
//!
//! Mirrors [`crate::encryptor::Encryptor`]'s sink pattern in reverse: `write`
//! accumulates bytes and drains whole chunks to the inner sink as soon as
//! they're available, `finish` decrypts whatever remains and checks that it
//! is a legal terminator. The buffer invariant the encryptor keeps on the
//! way out (the tail is always shorter than a full chunk) is exactly what
//! lets this side tell "more chunks coming" from "this is the last chunk"
//! without a separate end-of-stream marker.

use std::io;

use crate::aead::{self as chunk_aead, NONCE_LEN};
use crate::error::{Error, Result};
use crate::header::Header;
use crate::ids::ResourceKey;
use crate::kdf;

/// External key source consulted once per stream, the moment the header's
/// `resourceId` is known.
pub trait KeyLookup {
    /// # Errors
    ///
    /// Returns [`Error::KeyNotFound`] or any other error the lookup wants to
    /// surface; it is forwarded to the caller unchanged.
    fn find_key(&mut self, resource_id: crate::ids::ResourceId) -> Result<ResourceKey>;
}

impl<F> KeyLookup for F
where
    F: FnMut(crate::ids::ResourceId) -> Result<ResourceKey>,
{
    fn find_key(&mut self, resource_id: crate::ids::ResourceId) -> Result<ResourceKey> {
        self(resource_id)
    }
}

enum State {
    AwaitHeader,
    Streaming {
        resource_key: ResourceKey,
        first_header: Header,
        index: u64,
    },
    Done,
}

/// Decrypts a stream of framed chunks written to it, writing plaintext to
/// `sink` as each chunk is authenticated.
pub struct Decryptor<W: io::Write, K: KeyLookup> {
    sink: W,
    key_lookup: K,
    buffer: Vec<u8>,
    state: State,
    terminal: Option<Error>,
}

impl<W: io::Write, K: KeyLookup> Decryptor<W, K> {
    #[must_use]
    pub fn new(sink: W, key_lookup: K) -> Self {
        Self {
            sink,
            key_lookup,
            buffer: Vec::new(),
            state: State::AwaitHeader,
            terminal: None,
        }
    }

    /// Appends encrypted bytes, decrypting and emitting every complete
    /// chunk it can find.
    ///
    /// # Errors
    ///
    /// - [`Error::KeyNotFound`] (or whatever `keyLookup` itself returns) the
    ///   first time a key cannot be resolved for the stream's `resourceId`.
    /// - [`Error::DecryptionFailed`] if a chunk's header is inconsistent
    ///   with the first chunk's, chunks arrived out of order, or an AEAD
    ///   tag fails to verify.
    /// - [`Error::BrokenStream`] if this pipeline previously latched an
    ///   error, or if writing decrypted plaintext to the sink fails.
    pub fn write(&mut self, bytes: &[u8]) -> Result<()> {
        self.check_open()?;
        self.buffer.extend_from_slice(bytes);
        self.pump()
    }

    /// Signals end of input: decrypts and emits whatever chunk remains
    /// buffered, checking that it is a legal terminator, then returns the
    /// inner sink.
    ///
    /// # Errors
    ///
    /// - [`Error::NotEnoughData`] if fewer than a header's worth of bytes
    ///   ever arrived.
    /// - [`Error::DecryptionFailed`] if the stream ends mid-chunk, without
    ///   a terminator, or the final chunk fails to authenticate.
    pub fn finish(mut self) -> Result<W> {
        self.check_open()?;

        match &self.state {
            State::AwaitHeader => {
                let err = Error::NotEnoughData;
                self.terminal = Some(err.clone());
                return Err(err);
            }
            State::Streaming { .. } => {
                if self.is_v1_stream() {
                    self.finish_v1()?;
                } else {
                    self.finish_v4()?;
                }
            }
            State::Done => {}
        }

        Ok(self.sink)
    }

    fn is_v1_stream(&self) -> bool {
        matches!(
            &self.state,
            State::Streaming {
                first_header: Header::V1 { .. },
                ..
            }
        )
    }

    fn check_open(&self) -> Result<()> {
        match &self.terminal {
            Some(err) => Err(err.clone().into_broken()),
            None => Ok(()),
        }
    }

    fn fail(&mut self, err: Error) -> Error {
        self.state = State::Done;
        self.terminal.get_or_insert_with(|| err.clone());
        err
    }

    /// Drains every full chunk currently buffered. Reaching `AwaitHeader`
    /// consumes the header and resolves the key; `Streaming` decrypts and
    /// emits whole v4 chunks as they accumulate. v1 has no declared chunk
    /// size on the wire, so its single ciphertext blob is only decrypted in
    /// [`Self::finish_v1`].
    fn pump(&mut self) -> Result<()> {
        loop {
            match &self.state {
                State::AwaitHeader => match Header::parse(&self.buffer) {
                    Ok((header, consumed)) => {
                        let resource_id = header.resource_id();
                        let resource_key = match self.key_lookup.find_key(resource_id) {
                            Ok(key) => key,
                            Err(err) => return Err(self.fail(err)),
                        };
                        // v1's header is emitted once and never repeats, so
                        // it is consumed here. v4 repeats its header at the
                        // start of every chunk, so it stays in the buffer
                        // for the Streaming loop to consume as part of
                        // chunk 0.
                        if matches!(header, Header::V1 { .. }) {
                            self.buffer.drain(..consumed);
                        }
                        self.state = State::Streaming {
                            resource_key,
                            first_header: header,
                            index: 0,
                        };
                    }
                    Err(Error::NotEnoughData) => return Ok(()),
                    Err(err) => return Err(self.fail(err)),
                },
                // v1 has no per-chunk framing to react to incrementally.
                State::Streaming {
                    first_header: Header::V1 { .. },
                    ..
                }
                | State::Done => return Ok(()),
                State::Streaming { .. } => {
                    let chunk_total = self
                        .pending_v4_chunk_total()
                        .expect("only a v4 stream reaches this arm");
                    if self.buffer.len() < chunk_total {
                        return Ok(());
                    }
                    self.decrypt_next_v4_chunk(chunk_total)?;
                }
            }
        }
    }

    fn pending_v4_chunk_total(&self) -> Option<usize> {
        match &self.state {
            State::Streaming {
                first_header:
                    Header::V4 {
                        encrypted_chunk_size,
                        ..
                    },
                ..
            } => Some(*encrypted_chunk_size as usize),
            State::AwaitHeader | State::Streaming { .. } | State::Done => None,
        }
    }

    fn decrypt_next_v4_chunk(&mut self, chunk_total: usize) -> Result<()> {
        let chunk: Vec<u8> = self.buffer.drain(..chunk_total).collect();
        self.decrypt_v4_bytes(&chunk)
    }

    /// Snapshot of the streaming state needed to decrypt one chunk, taken
    /// up front so the decrypt itself never holds a borrow of `self.state`
    /// across the `&mut self` calls (`self.fail`, `self.emit`) it needs to
    /// make along the way.
    fn streaming_snapshot(&self) -> (ResourceKey, Header, u64) {
        match &self.state {
            State::Streaming {
                resource_key,
                first_header,
                index,
            } => (resource_key.clone(), *first_header, *index),
            State::AwaitHeader | State::Done => {
                unreachable!("only called while Streaming")
            }
        }
    }

    fn decrypt_v4_bytes(&mut self, chunk: &[u8]) -> Result<()> {
        let (resource_key, first_header, index) = self.streaming_snapshot();

        let (header, consumed) = match Header::parse(chunk) {
            Ok(parsed) => parsed,
            Err(err) => return Err(self.fail(err)),
        };
        if header != first_header {
            return Err(self.fail(Error::DecryptionFailed));
        }

        let rest = &chunk[consumed..];
        if rest.len() < NONCE_LEN {
            return Err(self.fail(Error::DecryptionFailed));
        }
        let iv_seed: [u8; NONCE_LEN] = rest[..NONCE_LEN]
            .try_into()
            .expect("length checked above");
        let ciphertext = &rest[NONCE_LEN..];

        let sub_key = kdf::derive_sub_key(&resource_key, index);
        let iv = kdf::derive_iv(&iv_seed, index);
        let plaintext = match chunk_aead::decrypt(&sub_key, &iv, ciphertext) {
            Ok(plaintext) => plaintext,
            Err(err) => return Err(self.fail(err)),
        };

        self.emit(&plaintext)?;
        if let State::Streaming { index, .. } = &mut self.state {
            *index += 1;
        }
        Ok(())
    }

    fn finish_v4(&mut self) -> Result<()> {
        if self.buffer.is_empty() {
            // The previous full-size chunk pump() consumed was never
            // followed by the mandatory (always sub-full-size) terminator.
            return Err(self.fail(Error::DecryptionFailed));
        }
        let chunk: Vec<u8> = self.buffer.drain(..).collect();
        self.decrypt_v4_bytes(&chunk)?;
        self.state = State::Done;
        Ok(())
    }

    fn finish_v1(&mut self) -> Result<()> {
        let (resource_key, _first_header, index) = self.streaming_snapshot();

        let iv = kdf::derive_legacy_iv(&resource_key, index);
        let sub_key = kdf::derive_sub_key(&resource_key, index);
        let ciphertext: Vec<u8> = self.buffer.drain(..).collect();
        let plaintext = match chunk_aead::decrypt(&sub_key, &iv, &ciphertext) {
            Ok(plaintext) => plaintext,
            Err(err) => return Err(self.fail(err)),
        };
        self.emit(&plaintext)?;
        self.state = State::Done;
        Ok(())
    }

    fn emit(&mut self, plaintext: &[u8]) -> Result<()> {
        if let Err(io_err) = self.sink.write_all(plaintext) {
            let err = Error::InvalidArgument(format!("sink write failed: {io_err}")).into_broken();
            self.terminal = Some(err.clone());
            return Err(err);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encryptor::Encryptor;
    use crate::ids::ResourceId;

    fn key() -> ResourceKey {
        ResourceKey::from_bytes([0u8; 32])
    }

    fn id() -> ResourceId {
        ResourceId::from_bytes([0u8; 16])
    }

    fn lookup(k: ResourceKey) -> impl FnMut(ResourceId) -> Result<ResourceKey> {
        move |_| Ok(k.clone())
    }

    #[test]
    fn round_trips_an_empty_stream() {
        let mut ciphertext = Vec::new();
        let enc = Encryptor::with_chunk_size(&mut ciphertext, id(), key(), 70).unwrap();
        enc.finish().unwrap();

        let mut plaintext = Vec::new();
        let mut dec = Decryptor::new(&mut plaintext, lookup(key()));
        dec.write(&ciphertext).unwrap();
        dec.finish().unwrap();

        assert!(plaintext.is_empty());
    }

    #[test]
    fn round_trips_a_multi_chunk_stream() {
        let mut ciphertext = Vec::new();
        let mut enc = Encryptor::with_chunk_size(&mut ciphertext, id(), key(), 70).unwrap();
        enc.write(b"this is a secret").unwrap();
        enc.finish().unwrap();

        let mut plaintext = Vec::new();
        let mut dec = Decryptor::new(&mut plaintext, lookup(key()));
        dec.write(&ciphertext).unwrap();
        dec.finish().unwrap();

        assert_eq!(plaintext, b"this is a secret");
    }

    #[test]
    fn byte_fed_one_at_a_time_still_round_trips() {
        let mut ciphertext = Vec::new();
        let mut enc = Encryptor::with_chunk_size(&mut ciphertext, id(), key(), 70).unwrap();
        enc.write(&[7u8; 25]).unwrap();
        enc.finish().unwrap();

        let mut plaintext = Vec::new();
        let mut dec = Decryptor::new(&mut plaintext, lookup(key()));
        for byte in &ciphertext {
            dec.write(std::slice::from_ref(byte)).unwrap();
        }
        dec.finish().unwrap();

        assert_eq!(plaintext, vec![7u8; 25]);
    }

    #[test]
    fn unknown_resource_fails_with_whatever_lookup_returns() {
        let mut ciphertext = Vec::new();
        let enc = Encryptor::with_chunk_size(&mut ciphertext, id(), key(), 70).unwrap();
        enc.finish().unwrap();

        let mut plaintext = Vec::new();
        let mut dec = Decryptor::new(&mut plaintext, |_: ResourceId| Err(Error::KeyNotFound));
        let err = dec.write(&ciphertext).unwrap_err();
        assert!(matches!(err, Error::KeyNotFound));

        // Latched: a second call sees BrokenStream, not a repeated lookup.
        let err = dec.write(&ciphertext).unwrap_err();
        assert!(matches!(err, Error::BrokenStream(_)));
    }

    #[test]
    fn flipped_byte_fails_to_decrypt() {
        let mut ciphertext = Vec::new();
        let mut enc = Encryptor::with_chunk_size(&mut ciphertext, id(), key(), 70).unwrap();
        enc.write(b"this is a secret").unwrap();
        enc.finish().unwrap();
        // Flip a byte inside the first (full, 70-byte) chunk so the
        // failure is caught while it is still being streamed in, rather
        // than waiting for the trailing partial chunk at `finish`.
        ciphertext[50] ^= 0x01;

        let mut plaintext = Vec::new();
        let mut dec = Decryptor::new(&mut plaintext, lookup(key()));
        let err = dec.write(&ciphertext).unwrap_err();
        assert!(matches!(err, Error::DecryptionFailed));
    }

    #[test]
    fn swapped_chunks_fail_ordering_check() {
        // clearChunkSize = 62 - 21 - 24 - 16 = 1: each byte is its own chunk.
        let mut ciphertext = Vec::new();
        let mut enc = Encryptor::with_chunk_size(&mut ciphertext, id(), key(), 62).unwrap();
        enc.write(b"ABC").unwrap();
        enc.finish().unwrap();

        let chunk_len = 62;
        assert_eq!(ciphertext.len(), chunk_len * 3 + (21 + 24 + 16));
        let chunk0 = &ciphertext[..chunk_len];
        let chunk2 = &ciphertext[chunk_len * 2..chunk_len * 3];

        let mut plaintext = Vec::new();
        let mut dec = Decryptor::new(&mut plaintext, lookup(key()));
        dec.write(chunk0).unwrap();
        let err = dec.write(chunk2).unwrap_err();
        assert!(matches!(err, Error::DecryptionFailed));
        assert_eq!(plaintext, b"A");
    }

    #[test]
    fn missing_terminator_is_rejected_on_finish() {
        let mut ciphertext = Vec::new();
        let mut enc = Encryptor::with_chunk_size(&mut ciphertext, id(), key(), 70).unwrap();
        enc.write(b"123456789").unwrap(); // exactly one full chunk
        enc.finish().unwrap();

        // Drop the trailing empty terminator chunk (21 + 24 + 16 bytes).
        let truncated = &ciphertext[..ciphertext.len() - (21 + 24 + 16)];

        let mut plaintext = Vec::new();
        let mut dec = Decryptor::new(&mut plaintext, lookup(key()));
        dec.write(truncated).unwrap();
        let err = dec.finish().unwrap_err();
        assert!(matches!(err, Error::DecryptionFailed));
    }

    #[test]
    fn incomplete_header_is_not_enough_data() {
        let mut plaintext = Vec::new();
        let mut dec = Decryptor::new(&mut plaintext, lookup(key()));
        dec.write(&[4u8; 10]).unwrap();
        let err = dec.finish().unwrap_err();
        assert!(matches!(err, Error::NotEnoughData));
    }

    #[test]
    fn v1_stream_round_trips_as_a_single_blob() {
        let header = Header::V1 { resource_id: id() };
        let mut wire = header.serialize();

        let sub_key = kdf::derive_sub_key(&key(), 0);
        let iv = kdf::derive_legacy_iv(&key(), 0);
        let ciphertext = chunk_aead::encrypt(&sub_key, &iv, b"legacy payload").unwrap();
        wire.extend_from_slice(&ciphertext);

        let mut plaintext = Vec::new();
        let mut dec = Decryptor::new(&mut plaintext, lookup(key()));
        dec.write(&wire).unwrap();
        dec.finish().unwrap();

        assert_eq!(plaintext, b"legacy payload");
    }
}
