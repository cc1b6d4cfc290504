//! Property-based round-trip coverage for the streaming codec, exercising
//! random plaintexts and chunk sizes rather than a fixed set of
//! hand-picked lengths.

use proptest::prelude::*;

use sealstream::decryptor::Decryptor;
use sealstream::encryptor::Encryptor;
use sealstream::{ResourceId, ResourceKey};

// Smallest legal `encryptedChunkSize`: header(21) + ivSeed(24) + tag(16) + 1.
const MIN_CHUNK_SIZE: u32 = 62;

proptest! {
    #[test]
    fn round_trip_holds_for_arbitrary_plaintext_and_chunk_size(
        plaintext in proptest::collection::vec(any::<u8>(), 0..2048),
        chunk_size in MIN_CHUNK_SIZE..256u32,
        key_bytes in any::<[u8; 32]>(),
        id_bytes in any::<[u8; 16]>(),
    ) {
        let resource_id = ResourceId::from_bytes(id_bytes);
        let resource_key = ResourceKey::from_bytes(key_bytes);

        let mut ciphertext = Vec::new();
        let mut enc = Encryptor::with_chunk_size(
            &mut ciphertext,
            resource_id,
            resource_key.clone(),
            chunk_size,
        ).unwrap();
        enc.write(&plaintext).unwrap();
        enc.finish().unwrap();

        let mut decoded = Vec::new();
        let mut dec = Decryptor::new(&mut decoded, move |_| Ok(resource_key.clone()));
        dec.write(&ciphertext).unwrap();
        dec.finish().unwrap();

        prop_assert_eq!(decoded, plaintext);
    }

    #[test]
    fn swapping_any_two_chunks_is_detected(
        a in proptest::collection::vec(any::<u8>(), 1..10),
        b in proptest::collection::vec(any::<u8>(), 1..10),
        c in proptest::collection::vec(any::<u8>(), 1..10),
    ) {
        // chunk_size=62 -> clearChunkSize=1, so each byte becomes its own
        // chunk and "swap chunk i and j" reduces to "swap byte i and j".
        let resource_id = ResourceId::from_bytes([1u8; 16]);
        let resource_key = ResourceKey::from_bytes([2u8; 32]);

        let mut plaintext = a.clone();
        plaintext.extend_from_slice(&b);
        plaintext.extend_from_slice(&c);
        prop_assume!(plaintext.len() >= 2);

        let mut ciphertext = Vec::new();
        let mut enc = Encryptor::with_chunk_size(
            &mut ciphertext,
            resource_id,
            resource_key.clone(),
            62,
        ).unwrap();
        enc.write(&plaintext).unwrap();
        enc.finish().unwrap();

        let chunk_len = 62usize;
        let chunk_count = ciphertext.len() / chunk_len;
        prop_assume!(chunk_count >= 2);

        // Swap whole chunk 0 and chunk 1: same header and resourceId on
        // both, but the IV used to decrypt chunk 1's seed now derives
        // from index 0, not 1, so the tag mismatches.
        let mut swapped = ciphertext.clone();
        let (first, second) = swapped.split_at_mut(chunk_len);
        first[..chunk_len].swap_with_slice(&mut second[..chunk_len]);

        let mut decoded = Vec::new();
        let mut dec = Decryptor::new(&mut decoded, move |_| Ok(resource_key.clone()));
        let write_result = dec.write(&swapped);
        let result = write_result.and_then(|()| dec.finish().map(|_| ()));
        prop_assert!(result.is_err());
    }
}
