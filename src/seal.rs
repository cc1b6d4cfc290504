//! Sparse chunk-key index and its serialized, outer-encrypted form.
//!
//! A [`ChunkSeal`] is an in-memory sparse array of per-chunk keys: each
//! entry is either a 32-byte key or a hole. `encrypt`/`decrypt` use it as
//! a one-shot keystore (a fresh random key per chunk, never derived from
//! a shared resource key the way the streaming codec's sub-keys are). The
//! index itself can be serialized (`v3`) and shared as a resource of its
//! own via `seal`/`open`.

use aead::rand_core::{OsRng, RngCore};

use crate::aead::{self as chunk_aead, KEY_LEN, NONCE_LEN};
use crate::error::{Error, Result};
use crate::ids::{ResourceId, ResourceKey};
use crate::varint;

const SEAL_VERSION: u8 = 3;

/// A serialized, outer-encrypted [`ChunkSeal`], addressable like any other
/// resource: the whole record is itself AEAD-encrypted under a resource
/// key and shared like any other resource.
pub struct SealArtifact {
    resource_id: ResourceId,
    ciphertext: Vec<u8>,
}

impl SealArtifact {
    #[must_use]
    pub fn resource_id(&self) -> ResourceId {
        self.resource_id
    }

    #[must_use]
    pub fn ciphertext(&self) -> &[u8] {
        &self.ciphertext
    }
}

/// An in-memory sparse array mapping chunk index to per-chunk key, with
/// logical holes where no key is stored.
#[derive(Default)]
pub struct ChunkSeal {
    keys: Vec<Option<[u8; KEY_LEN]>>,
}

impl ChunkSeal {
    #[must_use]
    pub fn new() -> Self {
        Self { keys: Vec::new() }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Encrypts `plaintext` under a freshly generated key, storing that key
    /// at `index` (extending the array with holes if `index` is past the
    /// current length) or appending if `index` is `None`.
    ///
    /// Returns the index the key was stored at and the ciphertext blob
    /// (`ivSeed ‖ ciphertext+tag`).
    ///
    /// # Errors
    ///
    /// Propagates [`Error::InvalidArgument`] if the underlying AEAD call
    /// fails (it never does for well-formed keys, but the primitive's
    /// signature is fallible).
    pub fn encrypt(&mut self, plaintext: &[u8], index: Option<usize>) -> Result<(usize, Vec<u8>)> {
        let mut key = [0u8; KEY_LEN];
        OsRng.fill_bytes(&mut key);

        let mut iv_seed = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut iv_seed);

        let ciphertext = chunk_aead::encrypt(&key, &iv_seed, plaintext)?;

        let index = index.unwrap_or(self.keys.len());
        if index >= self.keys.len() {
            self.keys.resize(index + 1, None);
        }
        self.keys[index] = Some(key);

        let mut blob = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        blob.extend_from_slice(&iv_seed);
        blob.extend_from_slice(&ciphertext);
        Ok((index, blob))
    }

    /// Decrypts `ciphertext` (a blob produced by [`Self::encrypt`]) using
    /// the key stored at `index`.
    ///
    /// # Errors
    ///
    /// - [`Error::ChunkIndexOutOfRange`] if `index >= self.len()`.
    /// - [`Error::ChunkNotFound`] if `index` is a hole.
    /// - [`Error::DecryptionFailed`] if the AEAD tag does not verify, or the
    ///   blob is too short to contain an IV seed.
    pub fn decrypt(&self, ciphertext: &[u8], index: usize) -> Result<Vec<u8>> {
        let key = self
            .keys
            .get(index)
            .ok_or(Error::ChunkIndexOutOfRange)?
            .ok_or(Error::ChunkNotFound)?;

        if ciphertext.len() < NONCE_LEN {
            return Err(Error::DecryptionFailed);
        }
        let (iv_seed, ct) = ciphertext.split_at(NONCE_LEN);
        let iv_seed: [u8; NONCE_LEN] = iv_seed.try_into().expect("length checked above");

        chunk_aead::decrypt(&key, &iv_seed, ct)
    }

    /// Deletes the keys at `indices`, turning them into holes. Trailing
    /// holes are compacted away; holes in the middle of the array remain.
    pub fn remove(&mut self, indices: &[usize]) {
        for &index in indices {
            if let Some(slot) = self.keys.get_mut(index) {
                *slot = None;
            }
        }
        while matches!(self.keys.last(), Some(None)) {
            self.keys.pop();
        }
    }

    /// Serializes the sparse array and AEAD-encrypts it under a freshly
    /// generated outer key (or `outer_key`, if given). Returns the
    /// resulting artifact together with the key used, since the caller
    /// needs to hold onto it to [`Self::open`] the artifact later.
    ///
    /// Every call generates (or is given) a distinct outer key, so the
    /// artifact's ciphertext (and the resource id derived from it) never
    /// repeats across calls.
    ///
    /// # Errors
    ///
    /// Propagates [`Error::InvalidArgument`] if the underlying AEAD call
    /// fails.
    pub fn seal(&self, outer_key: Option<ResourceKey>) -> Result<(SealArtifact, ResourceKey)> {
        let outer_key = outer_key.unwrap_or_else(|| {
            let mut bytes = [0u8; ResourceKey::LEN];
            OsRng.fill_bytes(&mut bytes);
            ResourceKey::from_bytes(bytes)
        });

        let mut iv_seed = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut iv_seed);

        let plaintext = self.serialize();
        let ciphertext = chunk_aead::encrypt(outer_key.expose_bytes(), &iv_seed, &plaintext)?;

        let mut blob = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        blob.extend_from_slice(&iv_seed);
        blob.extend_from_slice(&ciphertext);

        let resource_id = derive_resource_id_from_ciphertext(&blob);
        Ok((
            SealArtifact {
                resource_id,
                ciphertext: blob,
            },
            outer_key,
        ))
    }

    /// Reverses [`Self::seal`]: decrypts `artifact` under `outer_key`, then
    /// parses the resulting sparse array.
    ///
    /// # Errors
    ///
    /// - [`Error::DecryptionFailed`] if the outer AEAD tag does not verify.
    /// - [`Error::InvalidSeal`] if the decrypted blob is not a well-formed
    ///   `v3` seal record.
    pub fn open(artifact: &SealArtifact, outer_key: &ResourceKey) -> Result<Self> {
        let blob = artifact.ciphertext();
        if blob.len() < NONCE_LEN {
            return Err(Error::DecryptionFailed);
        }
        let (iv_seed, ct) = blob.split_at(NONCE_LEN);
        let iv_seed: [u8; NONCE_LEN] = iv_seed.try_into().expect("length checked above");

        let plaintext = chunk_aead::decrypt(outer_key.expose_bytes(), &iv_seed, ct)?;

        Self::parse(&plaintext)
    }

    /// Serializes `self` to its `v3` wire form:
    /// `byte(3) ‖ varint(holeRegionBytes) ‖ holeRegion ‖ keys`. Hole
    /// ranges are half-open `[start, end)` and emitted for every maximal
    /// run of consecutive holes, in ascending index order.
    #[must_use]
    pub fn serialize(&self) -> Vec<u8> {
        let mut hole_region = Vec::new();
        let mut i = 0;
        while i < self.keys.len() {
            if self.keys[i].is_some() {
                i += 1;
                continue;
            }
            let start = i;
            while i < self.keys.len() && self.keys[i].is_none() {
                i += 1;
            }
            varint::write(&mut hole_region, start as u64);
            varint::write(&mut hole_region, i as u64);
        }

        let mut out = Vec::with_capacity(1 + 10 + hole_region.len() + self.keys.len() * KEY_LEN);
        out.push(SEAL_VERSION);
        varint::write(&mut out, hole_region.len() as u64);
        out.extend_from_slice(&hole_region);
        for key in self.keys.iter().flatten() {
            out.extend_from_slice(key);
        }
        out
    }

    /// Parses a `v3` seal record.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidSeal`] if the version byte is wrong, the hole region
    /// is malformed (overlapping or unsorted ranges, `end <= start`), or
    /// the key region's length is not a multiple of 32 bytes.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let version = *bytes.first().ok_or_else(too_short)?;
        if version != SEAL_VERSION {
            return Err(Error::InvalidSeal(format!(
                "unsupported seal version {version}"
            )));
        }

        let (hole_region_len, consumed) = varint::read(&bytes[1..]).map_err(|_| too_short())?;
        let hole_region_len = hole_region_len as usize;
        let mut offset = 1 + consumed;

        let hole_region = bytes
            .get(offset..offset + hole_region_len)
            .ok_or_else(too_short)?;
        offset += hole_region_len;
        let key_region = &bytes[offset..];

        if key_region.len() % KEY_LEN != 0 {
            return Err(Error::InvalidSeal(
                "key region length is not a multiple of 32 bytes".to_string(),
            ));
        }

        let mut holes = Vec::new();
        let mut p = 0;
        while p < hole_region.len() {
            let (start, c1) = varint::read(&hole_region[p..]).map_err(|_| too_short())?;
            p += c1;
            let (end, c2) = varint::read(&hole_region[p..]).map_err(|_| too_short())?;
            p += c2;
            if end <= start {
                return Err(Error::InvalidSeal(
                    "hole range end must be strictly greater than start".to_string(),
                ));
            }
            if let Some(&(_, prev_end)) = holes.last() {
                if start < prev_end {
                    return Err(Error::InvalidSeal(
                        "hole ranges must be sorted and non-overlapping".to_string(),
                    ));
                }
            }
            holes.push((start, end));
        }

        let total_keys = key_region.len() / KEY_LEN;
        let mut keys = Vec::new();
        let mut key_cursor = 0usize;
        let mut index = 0u64;

        let take_key = |cursor: &mut usize| -> Result<[u8; KEY_LEN]> {
            let slice = key_region
                .get(*cursor * KEY_LEN..(*cursor + 1) * KEY_LEN)
                .ok_or_else(too_short)?;
            *cursor += 1;
            Ok(slice.try_into().expect("slice is exactly KEY_LEN bytes"))
        };

        for (start, end) in &holes {
            while index < *start {
                keys.push(Some(take_key(&mut key_cursor)?));
                index += 1;
            }
            for _ in index..*end {
                keys.push(None);
            }
            index = *end;
        }
        while key_cursor < total_keys {
            keys.push(Some(take_key(&mut key_cursor)?));
            index += 1;
        }

        Ok(Self { keys })
    }
}

fn too_short() -> Error {
    Error::InvalidSeal("blob too short to contain a well-formed seal record".to_string())
}

/// Derives a resource identifier from a ciphertext blob's keyed hash, used
/// by both [`ChunkSeal::encrypt`]'s per-chunk artifacts and
/// [`ChunkSeal::seal`]'s outer artifact.
#[must_use]
pub fn derive_resource_id_from_ciphertext(ciphertext: &[u8]) -> ResourceId {
    let hash = blake3::hash(ciphertext);
    let mut id = [0u8; ResourceId::LEN];
    id.copy_from_slice(&hash.as_bytes()[..ResourceId::LEN]);
    ResourceId::from_bytes(id)
}
