//! Composite-key codec and partition hash.
//!
//! A record key on the wire is `[hashKeyLen: u16 BE][hashKey][sortKey]`.
//! `hashKeyLen == 0xFFFF` is a reserved sentinel and never valid. A zero
//! hashKeyLen is legal and carries a dual meaning: there is no hash key, and
//! the partition hash is computed over the remainder (the sortKey bytes)
//! instead. Schemas that omit the hash-key discriminator rely on this.

use std::cmp::Ordering;

use crc::{Crc, CRC_64_XZ};

use crate::error::ProtoError;

/// Reserved hashKeyLen sentinel; hash keys must be strictly shorter.
pub const HASH_KEY_LEN_SENTINEL: usize = 0xFFFF;

/// CRC-64 with the ECMA-182 polynomial (0x42F0E1EBA9EA3693, reflected form
/// 0xC96C5795D7870F42), matching the server's partition hash.
const CRC64: Crc<u64> = Crc::<u64>::new(&CRC_64_XZ);

/// Encode (hashKey, sortKey) into the wire key format.
pub fn encode_key(hash_key: &[u8], sort_key: &[u8]) -> Result<Vec<u8>, ProtoError> {
    if hash_key.len() >= HASH_KEY_LEN_SENTINEL {
        return Err(ProtoError::InvalidKey(format!(
            "hash key length {} exceeds maximum {}",
            hash_key.len(),
            HASH_KEY_LEN_SENTINEL - 1
        )));
    }
    let mut key = Vec::with_capacity(2 + hash_key.len() + sort_key.len());
    key.extend_from_slice(&(hash_key.len() as u16).to_be_bytes());
    key.extend_from_slice(hash_key);
    key.extend_from_slice(sort_key);
    Ok(key)
}

/// Split a wire key back into (hashKey, sortKey).
pub fn decode_key(key: &[u8]) -> Result<(Vec<u8>, Vec<u8>), ProtoError> {
    if key.len() < 2 {
        return Err(ProtoError::InvalidKey(format!(
            "key too short: {} bytes",
            key.len()
        )));
    }
    let hash_key_len = u16::from_be_bytes([key[0], key[1]]) as usize;
    if hash_key_len == HASH_KEY_LEN_SENTINEL {
        return Err(ProtoError::InvalidKey(
            "hash key length sentinel 0xFFFF in key prefix".into(),
        ));
    }
    if 2 + hash_key_len > key.len() {
        return Err(ProtoError::InvalidKey(format!(
            "hash key length {} overruns key of {} bytes",
            hash_key_len,
            key.len()
        )));
    }
    Ok((
        key[2..2 + hash_key_len].to_vec(),
        key[2 + hash_key_len..].to_vec(),
    ))
}

/// Exclusive upper bound of all keys under `hash_key`: the encoded
/// (hash_key, "") key plus one as an unsigned big-endian integer. The
/// increment lands on the last non-0xFF hash-key byte and drops the trailing
/// 0xFF run; when every hash-key byte is 0xFF (or the hash key is empty) the
/// carry overflows and the bound is the empty sequence, meaning "+∞".
pub fn hash_key_upper_bound(hash_key: &[u8]) -> Result<Vec<u8>, ProtoError> {
    let mut bound = encode_key(hash_key, &[])?;
    while bound.len() > 2 {
        let last = bound.len() - 1;
        if bound[last] != 0xFF {
            bound[last] += 1;
            return Ok(bound);
        }
        bound.pop();
    }
    Ok(Vec::new())
}

/// Partition hash of an already-encoded wire key: CRC-64 of the hashKey
/// bytes, or of the sortKey remainder when hashKeyLen is zero.
pub fn partition_hash(key: &[u8]) -> Result<u64, ProtoError> {
    if key.len() < 2 {
        return Err(ProtoError::InvalidKey(format!(
            "key too short: {} bytes",
            key.len()
        )));
    }
    let hash_key_len = u16::from_be_bytes([key[0], key[1]]) as usize;
    if hash_key_len == HASH_KEY_LEN_SENTINEL || 2 + hash_key_len > key.len() {
        return Err(ProtoError::InvalidKey(format!(
            "invalid hash key length {hash_key_len}"
        )));
    }
    let hashed = if hash_key_len == 0 {
        &key[2..]
    } else {
        &key[2..2 + hash_key_len]
    };
    Ok(CRC64.checksum(hashed))
}

/// Partition hash computed from the raw key parts, skipping the encode step.
/// Agrees with [`partition_hash`]`(encode_key(hash_key, sort_key))`.
pub fn key_hash(hash_key: &[u8], sort_key: &[u8]) -> u64 {
    if hash_key.is_empty() {
        CRC64.checksum(sort_key)
    } else {
        CRC64.checksum(hash_key)
    }
}

/// `hash mod partition_count`.
pub fn partition_index(hash: u64, partition_count: u32) -> u32 {
    debug_assert!(partition_count > 0);
    (hash % u64::from(partition_count)) as u32
}

/// Unsigned lexicographic byte comparison.
pub fn byte_compare(a: &[u8], b: &[u8]) -> Ordering {
    a.cmp(b)
}
