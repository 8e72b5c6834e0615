//! Companion integrity records for persisted JSON artifacts.
//!
//! `report.json` is sealed by `report.json.seal.json`, which records the
//! file's SHA-256 at sealing time. Verification never repairs anything; an
//! intentional edit must be followed by an explicit [`reseal`].

use crate::error::{LedgerError, Result};
use crate::hashing::sha256_hex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

const SEAL_SUFFIX: &str = ".seal.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealRecord {
    /// RFC3339 time the seal was written
    pub timestamp: String,
    pub filename: String,
    pub content_hash: String,
}

pub fn seal_path(file: &Path) -> PathBuf {
    let mut name = file.as_os_str().to_os_string();
    name.push(SEAL_SUFFIX);
    PathBuf::from(name)
}

fn hash_file(file: &Path) -> Result<String> {
    let bytes = fs::read(file)
        .map_err(|e| LedgerError::Io(format!("cannot read {}: {}", file.display(), e)))?;
    Ok(sha256_hex(&bytes))
}

fn write_seal(file: &Path) -> Result<SealRecord> {
    let record = SealRecord {
        timestamp: chrono::Utc::now().to_rfc3339(),
        filename: file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        content_hash: hash_file(file)?,
    };
    fs::write(seal_path(file), serde_json::to_vec_pretty(&record)?)?;
    Ok(record)
}

/// Seal a file that has no seal yet.
pub fn seal_file(file: &Path) -> Result<SealRecord> {
    if seal_path(file).exists() {
        return Err(LedgerError::IntegrityMismatch(format!(
            "{} is already sealed; use reseal after an intentional change",
            file.display()
        )));
    }
    write_seal(file)
}

pub fn read_seal(file: &Path) -> Result<SealRecord> {
    let bytes = fs::read(seal_path(file)).map_err(|e| {
        LedgerError::IntegrityMismatch(format!("no seal for {}: {}", file.display(), e))
    })?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Recompute the file hash and compare it with its seal.
pub fn verify_file(file: &Path) -> Result<SealRecord> {
    let record = read_seal(file)?;
    let actual = hash_file(file)?;
    if actual != record.content_hash {
        return Err(LedgerError::IntegrityMismatch(format!(
            "{} hashes to {}, sealed as {}",
            file.display(),
            actual,
            record.content_hash
        )));
    }
    Ok(record)
}

/// Regenerate the seal after an intentional change.
pub fn reseal(file: &Path) -> Result<SealRecord> {
    let record = write_seal(file)?;
    info!(file = %file.display(), hash = %record.content_hash, "file resealed");
    Ok(record)
}
