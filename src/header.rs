//! Stream header codec.
//!
//! Two variants share the wire: `v1` (legacy, header once per stream) and
//! `v4` (current, header repeated at the start of every chunk).

use crate::error::{Error, Result};
use crate::ids::ResourceId;
use crate::varint;

/// Size in bytes of a v4 header: `version(1) ‖ encSize(4) ‖ resourceId(16)`.
pub const V4_HEADER_LEN: usize = 21;

/// A parsed stream header.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Header {
    /// Legacy format: emitted once at the start of the stream. Chunks carry
    /// no inline header or IV seed.
    V1 { resource_id: ResourceId },
    /// Current format: repeated at the start of every chunk, so each chunk
    /// is self-describing.
    V4 {
        encrypted_chunk_size: u32,
        resource_id: ResourceId,
    },
}

impl Header {
    /// Serializes `self` to its wire representation.
    #[must_use]
    pub fn serialize(&self) -> Vec<u8> {
        match self {
            Self::V1 { resource_id } => {
                let mut out = Vec::with_capacity(1 + ResourceId::LEN);
                varint::write(&mut out, 1);
                out.extend_from_slice(resource_id.as_bytes());
                out
            }
            Self::V4 {
                encrypted_chunk_size,
                resource_id,
            } => {
                let mut out = Vec::with_capacity(V4_HEADER_LEN);
                out.push(4);
                out.extend_from_slice(&encrypted_chunk_size.to_le_bytes());
                out.extend_from_slice(resource_id.as_bytes());
                out
            }
        }
    }

    /// Parses a header from the front of `input`, returning it along with
    /// the offset of the first byte after the header.
    ///
    /// # Errors
    ///
    /// - [`Error::NotEnoughData`] if `input` is too short to contain a
    ///   version byte.
    /// - [`Error::UnsupportedVersion`] if the version byte is not `1` or
    ///   `4`.
    /// - [`Error::MalformedHeader`] if the version is recognized but the
    ///   remaining bytes are too short to hold the rest of the header.
    pub fn parse(input: &[u8]) -> Result<(Self, usize)> {
        let version = *input.first().ok_or(Error::NotEnoughData)?;

        match version {
            1 => {
                let (value, consumed) = varint::read(input)?;
                debug_assert_eq!(value, 1);
                let rest = &input[consumed..];
                if rest.len() < ResourceId::LEN {
                    return Err(Error::NotEnoughData);
                }
                let resource_id = ResourceId::from_slice(rest)?;
                Ok((Self::V1 { resource_id }, consumed + ResourceId::LEN))
            }
            4 => {
                if input.len() < V4_HEADER_LEN {
                    return Err(Error::NotEnoughData);
                }
                let encrypted_chunk_size =
                    u32::from_le_bytes(input[1..5].try_into().expect("checked length above"));
                let resource_id = ResourceId::from_slice(&input[5..V4_HEADER_LEN])?;
                Ok((
                    Self::V4 {
                        encrypted_chunk_size,
                        resource_id,
                    },
                    V4_HEADER_LEN,
                ))
            }
            other => Err(Error::UnsupportedVersion(other)),
        }
    }

    #[must_use]
    pub fn resource_id(&self) -> ResourceId {
        match self {
            Self::V1 { resource_id } | Self::V4 { resource_id, .. } => *resource_id,
        }
    }
}

/// Returns the resource identifier encoded in `first_bytes`, without
/// decrypting anything. Used by higher layers to look up a key before
/// attempting decryption.
///
/// # Errors
///
/// Same as [`Header::parse`].
pub fn extract_resource_id(first_bytes: &[u8]) -> Result<ResourceId> {
    Header::parse(first_bytes).map(|(header, _)| header.resource_id())
}
