//! Resource identifiers and keys.

use secrecy::{ExposeSecret, SecretBox};

use crate::error::{Error, Result};

/// A resource's public identifier: 16 random bytes.
///
/// Unlike [`ResourceKey`], a `ResourceId` is not secret: it is meant to be
/// looked up, shared, and logged.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct ResourceId([u8; Self::LEN]);

impl ResourceId {
    pub const LEN: usize = 16;

    #[must_use]
    pub fn from_bytes(bytes: [u8; Self::LEN]) -> Self {
        Self(bytes)
    }

    /// Parses a `ResourceId` out of a byte slice.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedHeader`] if `bytes` is shorter than
    /// [`ResourceId::LEN`].
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let array: [u8; Self::LEN] = bytes
            .get(..Self::LEN)
            .ok_or(Error::MalformedHeader)?
            .try_into()
            .expect("slice was checked to be exactly LEN bytes");
        Ok(Self(array))
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8; Self::LEN] {
        &self.0
    }
}

/// A resource's 32-byte symmetric key.
///
/// Held behind [`secrecy::SecretBox`] so the bytes are zeroized on drop
/// when the pipeline holding it is torn down.
pub struct ResourceKey(SecretBox<[u8; Self::LEN]>);

impl ResourceKey {
    pub const LEN: usize = 32;

    #[must_use]
    pub fn from_bytes(bytes: [u8; Self::LEN]) -> Self {
        Self(SecretBox::new(Box::new(bytes)))
    }

    /// Parses a `ResourceKey` out of a byte slice.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if `bytes` is not exactly
    /// [`ResourceKey::LEN`] bytes long.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let array: [u8; Self::LEN] = bytes
            .try_into()
            .map_err(|_| Error::InvalidArgument("resource key must be 32 bytes".to_string()))?;
        Ok(Self::from_bytes(array))
    }

    #[must_use]
    pub fn expose_bytes(&self) -> &[u8; Self::LEN] {
        self.0.expose_secret()
    }
}

impl Clone for ResourceKey {
    fn clone(&self) -> Self {
        Self::from_bytes(*self.expose_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resource_id_from_slice_rejects_short_input() {
        let err = ResourceId::from_slice(&[0u8; 10]).unwrap_err();
        assert!(matches!(err, Error::MalformedHeader));
    }

    #[test]
    fn resource_id_from_slice_ignores_trailing_bytes() {
        let id = ResourceId::from_slice(&[1u8; 20]).unwrap();
        assert_eq!(id.as_bytes(), &[1u8; 16]);
    }

    #[test]
    fn resource_key_rejects_wrong_length() {
        let err = ResourceKey::from_slice(&[0u8; 31]).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn resource_key_round_trips_bytes() {
        let bytes = [7u8; 32];
        let key = ResourceKey::from_bytes(bytes);
        assert_eq!(key.expose_bytes(), &bytes);
    }
}
