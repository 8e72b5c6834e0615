//! Hashing and proof primitives for MeshCredit
//!
//! Pure functions only: content hashing, canonical serialization, Merkle
//! aggregation and HMAC-SHA256 signing.

use crate::error::{LedgerError, Result};
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::{Digest, Sha256};

type HmacSha256 = Hmac<Sha256>;

pub type Sha256Hash = [u8; 32];

/// All-zero hash used as the parent of the first block and the first proof.
pub const ZERO_HASH: Sha256Hash = [0u8; 32];

pub fn sha256(data: &[u8]) -> Sha256Hash {
    Sha256::digest(data).into()
}

pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(sha256(data))
}

/// Canonical JSON bytes: object keys sorted, no insignificant whitespace.
///
/// Going through `serde_json::Value` sorts keys because the default `Map`
/// is ordered, so two structurally equal values always hash the same.
pub fn canonical_json<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
    let value = serde_json::to_value(value)?;
    Ok(serde_json::to_vec(&value)?)
}

/// SHA-256 of the canonical serialization of `value`.
pub fn content_hash<T: Serialize + ?Sized>(value: &T) -> Result<Sha256Hash> {
    Ok(sha256(&canonical_json(value)?))
}

pub fn content_hash_hex<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    Ok(hex::encode(content_hash(value)?))
}

/// Binary Merkle root. Odd levels duplicate their last node; the empty set
/// hashes to `sha256("")`.
pub fn merkle_root(leaves: &[Sha256Hash]) -> Sha256Hash {
    if leaves.is_empty() {
        return sha256(&[]);
    }

    let mut level: Vec<Sha256Hash> = leaves.to_vec();
    while level.len() > 1 {
        if level.len() % 2 == 1 {
            if let Some(last) = level.last().copied() {
                level.push(last);
            }
        }
        level = level
            .chunks(2)
            .map(|pair| {
                let mut hasher = Sha256::new();
                hasher.update(pair[0]);
                hasher.update(pair[1]);
                hasher.finalize().into()
            })
            .collect();
    }
    level[0]
}

/// HMAC-SHA256 of `message` under `secret`.
pub fn hmac_sign(secret: &[u8], message: &[u8]) -> Result<Sha256Hash> {
    let mut mac = HmacSha256::new_from_slice(secret)
        .map_err(|e| LedgerError::IntegrityMismatch(format!("invalid HMAC key: {}", e)))?;
    mac.update(message);
    Ok(mac.finalize().into_bytes().into())
}

/// Constant-time HMAC verification.
pub fn hmac_verify(secret: &[u8], message: &[u8], signature: &[u8]) -> bool {
    match HmacSha256::new_from_slice(secret) {
        Ok(mut mac) => {
            mac.update(message);
            mac.verify_slice(signature).is_ok()
        }
        Err(_) => false,
    }
}

/// Decode a 64-character hex string into a hash.
pub fn hash_from_hex(hex_str: &str) -> Result<Sha256Hash> {
    let bytes = hex::decode(hex_str)
        .map_err(|e| LedgerError::IntegrityMismatch(format!("invalid hex hash: {}", e)))?;
    bytes.try_into().map_err(|b: Vec<u8>| {
        LedgerError::IntegrityMismatch(format!("hash must be 32 bytes, got {}", b.len()))
    })
}
