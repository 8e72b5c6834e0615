use crate::error::{LedgerError, Result};
use crate::hashing::{merkle_root, Sha256Hash, ZERO_HASH};
use crate::ledger::transaction::Transaction;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// 2023-01-01T00:00:00Z
pub const GENESIS_TIMESTAMP: u64 = 1_672_531_200_000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub index: u64,
    pub timestamp: u64,
    pub previous_hash: Sha256Hash,
    pub merkle_root: Sha256Hash,
    /// Required leading zero bits of the block hash
    pub difficulty: u32,
    pub nonce: u64,
    /// Trust score of the sealer at sealing time
    pub proof_gravity: f64,
}

impl BlockHeader {
    pub fn hash(&self) -> Sha256Hash {
        let mut hasher = Sha256::new();
        hasher.update(self.index.to_le_bytes());
        hasher.update(self.timestamp.to_le_bytes());
        hasher.update(self.previous_hash);
        hasher.update(self.merkle_root);
        hasher.update(self.difficulty.to_le_bytes());
        hasher.update(self.nonce.to_le_bytes());
        hasher.update(self.proof_gravity.to_bits().to_le_bytes());
        hasher.finalize().into()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub header: BlockHeader,
    pub transactions: Vec<Transaction>,
    /// Hash recorded at sealing time; `verify_chain` recomputes and compares it.
    pub hash: Sha256Hash,
}

impl Block {
    /// An unsealed block; call [`Block::seal`] to search for a nonce.
    pub fn new(
        index: u64,
        previous_hash: Sha256Hash,
        difficulty: u32,
        proof_gravity: f64,
        timestamp: u64,
        transactions: Vec<Transaction>,
    ) -> Self {
        let merkle_root = Block::calculate_merkle_root(&transactions);
        let header = BlockHeader {
            index,
            timestamp,
            previous_hash,
            merkle_root,
            difficulty,
            nonce: 0,
            proof_gravity,
        };
        let hash = header.hash();
        Block {
            header,
            transactions,
            hash,
        }
    }

    pub fn genesis() -> Self {
        Block::new(0, ZERO_HASH, 0, 1.0, GENESIS_TIMESTAMP, Vec::new())
    }

    pub fn compute_hash(&self) -> Sha256Hash {
        self.header.hash()
    }

    pub fn hash_str(&self) -> String {
        hex::encode(self.hash)
    }

    pub fn calculate_merkle_root(transactions: &[Transaction]) -> Sha256Hash {
        let leaves: Vec<Sha256Hash> = transactions.iter().map(|tx| tx.hash()).collect();
        merkle_root(&leaves)
    }

    pub fn hash_to_target(difficulty: &u32) -> [u8; 32] {
        let mut target = [0xFF; 32];
        let leading_zeros = *difficulty / 8;
        let partial_bits = *difficulty % 8;

        for item in target.iter_mut().take(leading_zeros as usize) {
            *item = 0;
        }

        if leading_zeros < 32 && partial_bits > 0 {
            target[leading_zeros as usize] = 0xFF >> partial_bits;
        }
        target
    }

    pub fn meets_difficulty(hash: &Sha256Hash, difficulty: u32) -> bool {
        *hash <= Block::hash_to_target(&difficulty)
    }

    /// Search nonces until the header hash meets the difficulty target.
    ///
    /// Bounded by `max_attempts`; exhausting it yields [`LedgerError::SealFailed`].
    pub fn seal(mut self, max_attempts: u64) -> Result<Block> {
        let difficulty = self.header.difficulty;
        for nonce in 0..max_attempts {
            self.header.nonce = nonce;
            let hash = self.header.hash();
            if Block::meets_difficulty(&hash, difficulty) {
                self.hash = hash;
                return Ok(self);
            }
        }
        Err(LedgerError::SealFailed {
            difficulty,
            attempts: max_attempts,
        })
    }
}
