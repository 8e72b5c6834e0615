use crate::error::{LedgerError, Result};
use crate::hashing::{canonical_json, hash_from_hex, hmac_sign, hmac_verify, sha256};
use crate::proof::resonance::ResonanceMetadata;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// `previous_hash` of the first proof.
pub const GENESIS_PROOF_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProofMetadata {
    pub event: Value,
    #[serde(default)]
    pub resonance: Option<ResonanceMetadata>,
}

/// One signed, hash-linked attestation of a ledger event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImmutableProof {
    /// Unix milliseconds
    pub timestamp: u64,
    pub merkle_root: String,
    pub previous_hash: String,
    pub height: u64,
    /// Hex HMAC-SHA256 of the same bytes `merkle_root` is computed over
    pub signature: String,
    pub metadata: ProofMetadata,
}

fn signing_input(
    timestamp: u64,
    event: &Value,
    previous_hash: &str,
    height: u64,
    resonance: Option<&ResonanceMetadata>,
) -> Result<Vec<u8>> {
    canonical_json(&json!({
        "timestamp": timestamp,
        "event": event,
        "previous_hash": previous_hash,
        "height": height,
        "resonance": resonance,
    }))
}

impl ImmutableProof {
    fn build(
        secret: &[u8],
        timestamp: u64,
        event: Value,
        previous_hash: String,
        height: u64,
        resonance: Option<ResonanceMetadata>,
    ) -> Result<Self> {
        let input = signing_input(timestamp, &event, &previous_hash, height, resonance.as_ref())?;
        let merkle_root = hex::encode(sha256(&input));
        let signature = hex::encode(hmac_sign(secret, &input)?);
        Ok(ImmutableProof {
            timestamp,
            merkle_root,
            previous_hash,
            height,
            signature,
            metadata: ProofMetadata { event, resonance },
        })
    }

    /// Recompute the root and check the signature.
    pub fn verify_signature(&self, secret: &[u8]) -> Result<()> {
        let input = signing_input(
            self.timestamp,
            &self.metadata.event,
            &self.previous_hash,
            self.height,
            self.metadata.resonance.as_ref(),
        )?;
        let recomputed = hex::encode(sha256(&input));
        if recomputed != self.merkle_root {
            return Err(LedgerError::IntegrityMismatch(format!(
                "proof {} root {} does not match recomputed {}",
                self.height, self.merkle_root, recomputed
            )));
        }
        let signature = hash_from_hex(&self.signature)?;
        if !hmac_verify(secret, &input, &signature) {
            return Err(LedgerError::IntegrityMismatch(format!(
                "proof {} carries an invalid signature",
                self.height
            )));
        }
        Ok(())
    }
}

/// Proofs prepared against a chain tip but not yet appended.
///
/// An operation notarizes every event into a batch, persists it, and only
/// then extends the chain, so a failed commit leaves the chain untouched.
#[derive(Debug, Clone)]
pub struct ProofBatch {
    base_height: u64,
    previous_hash: String,
    proofs: Vec<ImmutableProof>,
}

impl ProofBatch {
    pub fn notarize(
        &mut self,
        secret: &[u8],
        event: Value,
        resonance: Option<ResonanceMetadata>,
        timestamp: u64,
    ) -> Result<&ImmutableProof> {
        let height = self.base_height + self.proofs.len() as u64;
        let proof = ImmutableProof::build(
            secret,
            timestamp,
            event,
            self.previous_hash.clone(),
            height,
            resonance,
        )?;
        self.previous_hash = proof.merkle_root.clone();
        self.proofs.push(proof);
        Ok(&self.proofs[self.proofs.len() - 1])
    }

    pub fn proofs(&self) -> &[ImmutableProof] {
        &self.proofs
    }

    pub fn is_empty(&self) -> bool {
        self.proofs.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProofChain {
    proofs: Vec<ImmutableProof>,
}

impl ProofChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_proofs(mut proofs: Vec<ImmutableProof>) -> Self {
        proofs.sort_by_key(|p| p.height);
        Self { proofs }
    }

    pub fn proofs(&self) -> &[ImmutableProof] {
        &self.proofs
    }

    pub fn len(&self) -> usize {
        self.proofs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.proofs.is_empty()
    }

    /// Start a batch that extends the current tip.
    pub fn begin_batch(&self) -> ProofBatch {
        ProofBatch {
            base_height: self.proofs.len() as u64,
            previous_hash: self
                .proofs
                .last()
                .map(|p| p.merkle_root.clone())
                .unwrap_or_else(|| GENESIS_PROOF_HASH.to_string()),
            proofs: Vec::new(),
        }
    }

    /// Append a prepared batch. Fails if the chain moved since the batch began.
    pub fn extend(&mut self, batch: ProofBatch) -> Result<()> {
        let expected = self.begin_batch();
        let links = batch
            .proofs
            .first()
            .map_or(true, |p| p.previous_hash == expected.previous_hash);
        if batch.base_height != expected.base_height || !links {
            return Err(LedgerError::IntegrityMismatch(format!(
                "proof batch prepared at height {} cannot extend chain of length {}",
                batch.base_height,
                self.proofs.len()
            )));
        }
        self.proofs.extend(batch.proofs);
        Ok(())
    }

    /// Notarize a single event and append it.
    pub fn notarize(
        &mut self,
        secret: &[u8],
        event: Value,
        resonance: Option<ResonanceMetadata>,
        timestamp: u64,
    ) -> Result<ImmutableProof> {
        let mut batch = self.begin_batch();
        let proof = batch.notarize(secret, event, resonance, timestamp)?.clone();
        self.extend(batch)?;
        Ok(proof)
    }

    /// Walk the whole chain checking linkage, heights, roots and signatures.
    pub fn validate(&self, secret: &[u8]) -> Result<()> {
        let mut previous = GENESIS_PROOF_HASH.to_string();
        for (i, proof) in self.proofs.iter().enumerate() {
            if proof.height != i as u64 {
                return Err(LedgerError::IntegrityMismatch(format!(
                    "proof at position {} claims height {}",
                    i, proof.height
                )));
            }
            if proof.previous_hash != previous {
                return Err(LedgerError::IntegrityMismatch(format!(
                    "proof {} links to {}, expected {}",
                    i, proof.previous_hash, previous
                )));
            }
            proof.verify_signature(secret)?;
            previous = proof.merkle_root.clone();
        }
        Ok(())
    }

    pub fn verify(&self, secret: &[u8]) -> bool {
        self.validate(secret).is_ok()
    }

    /// Mutable access for simulating tampering.
    #[cfg(any(test, feature = "testing"))]
    pub fn proofs_mut(&mut self) -> &mut Vec<ImmutableProof> {
        &mut self.proofs
    }
}
