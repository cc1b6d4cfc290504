//! Crate-wide error taxonomy.

use std::fmt;

/// Errors produced by the codec.
///
/// Decryption failures are deliberately opaque (they never distinguish "bad
/// key" from "corrupted ciphertext" from "tag mismatch") so that callers
/// cannot use error variants as a tampering oracle.
#[derive(Debug, Clone)]
pub enum Error {
    /// A caller-supplied argument was malformed (e.g. a key of the wrong
    /// length).
    InvalidArgument(String),
    /// The stream header carries a version this decoder does not know.
    UnsupportedVersion(u8),
    /// The header could not be parsed from the bytes given to it.
    MalformedHeader,
    /// Fewer than `headerSize` bytes arrived before the input ended.
    NotEnoughData,
    /// `keyLookup` found no key for the resource.
    KeyNotFound,
    /// AEAD tag verification failed, chunk ordering was violated, or the
    /// terminator convention was violated.
    DecryptionFailed,
    /// `write` after `end`, or `end` after `end`.
    ///
    /// Unreachable from this crate's own `Encryptor`/`Decryptor`: both
    /// take `finish` by value, so a second `write` or `finish` after it
    /// does not compile rather than failing at runtime (see
    /// `encryptor.rs`'s `finish` doc comment). Kept public so a caller
    /// building its own sink/stage on top of this crate's primitives has
    /// somewhere to report the same condition if its own API shape
    /// allows it.
    StreamAlreadyClosed,
    /// The pipeline previously latched a terminal error; this operation
    /// rejects with the original cause.
    BrokenStream(Box<Error>),
    /// Chunk-seal index accessed at or past its length.
    ChunkIndexOutOfRange,
    /// Chunk-seal index accessed at a hole.
    ChunkNotFound,
    /// A chunk-seal blob failed to parse.
    InvalidSeal(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidArgument(reason) => write!(f, "invalid argument: {reason}"),
            Self::UnsupportedVersion(v) => write!(f, "unsupported stream version: {v}"),
            Self::MalformedHeader => write!(f, "could not parse stream header"),
            Self::NotEnoughData => write!(f, "not enough data to parse stream header"),
            Self::KeyNotFound => write!(f, "no key found for resource"),
            Self::DecryptionFailed => write!(
                f,
                "\
could not decrypt chunk.
you are likely using the wrong key, the data is corrupted, or chunks \
arrived out of order"
            ),
            Self::StreamAlreadyClosed => write!(f, "stream is already closed"),
            Self::BrokenStream(cause) => write!(f, "stream previously failed: {cause}"),
            Self::ChunkIndexOutOfRange => write!(f, "chunk index is out of range"),
            Self::ChunkNotFound => write!(f, "no key stored at this chunk index"),
            Self::InvalidSeal(reason) => write!(f, "malformed chunk-seal record: {reason}"),
        }
    }
}

impl std::error::Error for Error {}

impl Error {
    /// Wrap `self` as the cause of a terminal [`Error::BrokenStream`].
    #[must_use]
    pub fn into_broken(self) -> Self {
        match self {
            broken @ Self::BrokenStream(_) => broken,
            other => Self::BrokenStream(Box::new(other)),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
