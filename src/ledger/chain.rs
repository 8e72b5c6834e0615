use crate::amount::{checked_add, checked_sub, Amount, ZERO};
use crate::error::{LedgerError, Result};
use crate::ledger::block::Block;
use crate::ledger::transaction::{Transaction, TransactionKind};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Issuance and sealing parameters shared by block production and verification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainParams {
    pub total_supply: Amount,
    pub initial_reward: Amount,
    pub halving_interval: u64,
    pub difficulty: u32,
    pub max_nonce_attempts: u64,
    pub minimum_gravity_threshold: f64,
    /// Non-zero when rewards are also capped by the external reserve, which
    /// the chain alone cannot replay.
    pub reserve_ratio: f64,
}

/// Who is sealing a block and how much the ledger trusts them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SealWeight {
    pub sealer: String,
    pub trust_score: f64,
}

impl SealWeight {
    pub fn new(sealer: impl Into<String>, trust_score: f64) -> Self {
        Self {
            sealer: sealer.into(),
            trust_score,
        }
    }
}

/// Block reward at `height`: `initial_reward / 2^(height / halving_interval)`.
pub fn calculate_block_reward(height: u64, initial_reward: Amount, halving_interval: u64) -> Amount {
    let halving_count = height / halving_interval.max(1);
    if halving_count >= 64 {
        ZERO
    } else {
        initial_reward.checked_shr(halving_count as u32).unwrap_or(ZERO)
    }
}

/// Reward for a block at `height`, clamped to the supply that is still unissued.
pub fn clamped_block_reward(params: &ChainParams, height: u64, circulating: Amount) -> Amount {
    let scheduled = calculate_block_reward(height, params.initial_reward, params.halving_interval);
    let remaining = params.total_supply.checked_sub(circulating).unwrap_or(ZERO).max(ZERO);
    scheduled.min(remaining)
}

/// The sealed block list. Index 0 is always the genesis block.
#[derive(Debug, Clone, PartialEq)]
pub struct Chain {
    blocks: Vec<Block>,
}

impl Default for Chain {
    fn default() -> Self {
        Self::new()
    }
}

impl Chain {
    pub fn new() -> Self {
        Chain {
            blocks: vec![Block::genesis()],
        }
    }

    /// Rebuild from persisted blocks. Linkage is not checked here; run
    /// [`Chain::validate`] to audit a loaded chain.
    pub fn from_blocks(mut blocks: Vec<Block>) -> Result<Self> {
        if blocks.is_empty() {
            return Ok(Self::new());
        }
        blocks.sort_by_key(|b| b.header.index);
        Ok(Chain { blocks })
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn tip(&self) -> &Block {
        // The constructor guarantees a genesis block.
        &self.blocks[self.blocks.len() - 1]
    }

    /// Index the next sealed block will carry.
    pub fn next_height(&self) -> u64 {
        self.tip().header.index + 1
    }

    /// Assemble and seal the next block over `transactions`.
    pub fn build_block(
        &self,
        params: &ChainParams,
        seal: &SealWeight,
        transactions: Vec<Transaction>,
        timestamp: u64,
    ) -> Result<Block> {
        if !seal.trust_score.is_finite() {
            return Err(LedgerError::InvalidAmount(format!(
                "trust score {} is not finite",
                seal.trust_score
            )));
        }
        let tip = self.tip();
        let timestamp = timestamp.max(tip.header.timestamp + 1);
        let block = Block::new(
            self.next_height(),
            tip.hash,
            params.difficulty,
            seal.trust_score,
            timestamp,
            transactions,
        );
        let sealed = block.seal(params.max_nonce_attempts)?;
        debug!(
            index = sealed.header.index,
            nonce = sealed.header.nonce,
            hash = %sealed.hash_str(),
            "block sealed"
        );
        Ok(sealed)
    }

    /// Append a block that extends the current tip.
    pub fn push(&mut self, block: Block) -> Result<()> {
        let tip = self.tip();
        if block.header.index != tip.header.index + 1 {
            return Err(LedgerError::IntegrityMismatch(format!(
                "invalid block height. Expected {}, but got {}",
                tip.header.index + 1,
                block.header.index
            )));
        }
        if block.header.previous_hash != tip.hash {
            return Err(LedgerError::IntegrityMismatch(format!(
                "invalid previous block hash. Expected {}, but got {}",
                hex::encode(tip.hash),
                hex::encode(block.header.previous_hash)
            )));
        }
        self.blocks.push(block);
        Ok(())
    }

    /// Full audit of the chain, reporting the first failure found.
    ///
    /// Checks stored vs recomputed hashes, linkage, merkle roots, the
    /// proof-of-work target, the gravity floor and each block reward
    /// against the halving schedule and the supply replayed up to it.
    pub fn validate(&self, params: &ChainParams) -> Result<()> {
        let mut supply = ZERO;

        for (i, block) in self.blocks.iter().enumerate() {
            let index = block.header.index;
            if index != i as u64 {
                return Err(LedgerError::IntegrityMismatch(format!(
                    "block at position {} carries index {}",
                    i, index
                )));
            }

            let expected_root = Block::calculate_merkle_root(&block.transactions);
            if expected_root != block.header.merkle_root {
                return Err(LedgerError::IntegrityMismatch(format!(
                    "merkle root mismatch in block {}. Expected {}, but got {}",
                    index,
                    hex::encode(expected_root),
                    hex::encode(block.header.merkle_root)
                )));
            }

            if !block.header.proof_gravity.is_finite() {
                return Err(LedgerError::IntegrityMismatch(format!(
                    "block {} carries non-finite gravity {}",
                    index, block.header.proof_gravity
                )));
            }

            let recomputed = block.compute_hash();
            if recomputed != block.hash {
                return Err(LedgerError::IntegrityMismatch(format!(
                    "block {} hash mismatch. Stored {}, recomputed {}",
                    index,
                    hex::encode(block.hash),
                    hex::encode(recomputed)
                )));
            }

            if i > 0 {
                let previous = &self.blocks[i - 1];
                if block.header.previous_hash != previous.hash {
                    return Err(LedgerError::IntegrityMismatch(format!(
                        "block {} does not link to block {}",
                        index,
                        i - 1
                    )));
                }
                if !Block::meets_difficulty(&block.hash, block.header.difficulty) {
                    return Err(LedgerError::IntegrityMismatch(format!(
                        "block {} does not meet difficulty {}",
                        index, block.header.difficulty
                    )));
                }
                if block.header.proof_gravity < params.minimum_gravity_threshold {
                    return Err(LedgerError::IntegrityMismatch(format!(
                        "block {} sealed with gravity {} below floor {}",
                        index, block.header.proof_gravity, params.minimum_gravity_threshold
                    )));
                }
            }

            supply = self.replay_block_supply(params, block, supply)?;
        }
        Ok(())
    }

    fn replay_block_supply(&self, params: &ChainParams, block: &Block, supply: Amount) -> Result<Amount> {
        let index = block.header.index;
        let mut rewards = block
            .transactions
            .iter()
            .enumerate()
            .filter(|(_, tx)| matches!(tx.kind, TransactionKind::BlockReward { .. }));

        let reward_tx = rewards.next();
        if rewards.next().is_some() {
            return Err(LedgerError::IntegrityMismatch(format!(
                "block {} carries more than one reward",
                index
            )));
        }

        let mut after_others = supply;
        for tx in block.transactions.iter().filter(|tx| !matches!(tx.kind, TransactionKind::BlockReward { .. })) {
            let (issued, retired) = tx.supply_delta();
            after_others = checked_sub(checked_add(after_others, issued)?, retired)?;
        }

        let expected = if index == 0 {
            ZERO
        } else {
            clamped_block_reward(params, index, after_others)
        };

        let actual = match reward_tx {
            Some((position, tx)) => {
                if position != 0 {
                    return Err(LedgerError::IntegrityMismatch(format!(
                        "block {} reward is not the first transaction",
                        index
                    )));
                }
                if tx.kind != (TransactionKind::BlockReward { height: index }) {
                    return Err(LedgerError::IntegrityMismatch(format!(
                        "block {} reward is tagged for another height",
                        index
                    )));
                }
                tx.amount
            }
            None => ZERO,
        };

        // A reserve-limited reward may fall short of the schedule but never exceed it.
        let reserve_limited = params.reserve_ratio > 0.0 && actual < expected;
        if actual != expected && !reserve_limited {
            return Err(LedgerError::IntegrityMismatch(format!(
                "block {} reward is {}, schedule allows {}",
                index, actual, expected
            )));
        }

        let supply = checked_add(after_others, actual)?;
        if supply > params.total_supply {
            return Err(LedgerError::IntegrityMismatch(format!(
                "supply {} after block {} exceeds cap {}",
                supply, index, params.total_supply
            )));
        }
        Ok(supply)
    }

    /// `true` when [`Chain::validate`] finds nothing wrong.
    pub fn verify(&self, params: &ChainParams) -> bool {
        self.validate(params).is_ok()
    }

    /// Every transaction sealed so far, oldest first.
    pub fn transactions(&self) -> impl Iterator<Item = &Transaction> {
        self.blocks.iter().flat_map(|b| b.transactions.iter())
    }

    /// Mutable access for simulating tampering with history.
    #[cfg(any(test, feature = "testing"))]
    pub fn blocks_mut(&mut self) -> &mut Vec<Block> {
        &mut self.blocks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::transaction::{MintReason, ISSUER};

    fn params() -> ChainParams {
        ChainParams {
            total_supply: Amount::from_num(1_000),
            initial_reward: Amount::from_num(50),
            halving_interval: 210_000,
            difficulty: 0,
            max_nonce_attempts: 10,
            minimum_gravity_threshold: 0.5,
            reserve_ratio: 0.0,
        }
    }

    fn mint(amount: i32, ts: u64) -> Transaction {
        Transaction::new(
            ISSUER,
            "alice",
            Amount::from_num(amount),
            TransactionKind::Mint { reason: MintReason::GameReward },
            ts,
        )
    }

    fn seal_next(chain: &mut Chain, params: &ChainParams, mut txs: Vec<Transaction>, circulating: Amount) {
        let height = chain.next_height();
        let reward = clamped_block_reward(params, height, circulating);
        if reward > ZERO {
            txs.insert(
                0,
                Transaction::new(ISSUER, "miner", reward, TransactionKind::BlockReward { height }, 10),
            );
        }
        let block = chain
            .build_block(params, &SealWeight::new("miner", 1.0), txs, 10)
            .unwrap();
        chain.push(block).unwrap();
    }

    #[test]
    fn test_halving_schedule() {
        let initial = Amount::from_num(50);
        assert_eq!(calculate_block_reward(0, initial, 210_000), Amount::from_num(50));
        assert_eq!(calculate_block_reward(209_999, initial, 210_000), Amount::from_num(50));
        assert_eq!(calculate_block_reward(210_000, initial, 210_000), Amount::from_num(25));
        assert_eq!(calculate_block_reward(420_000, initial, 210_000), Amount::from_num(12.5));
        assert_eq!(calculate_block_reward(210_000 * 64, initial, 210_000), ZERO);
    }

    #[test]
    fn test_reward_clamped_to_remaining_supply() {
        let p = params();
        assert_eq!(clamped_block_reward(&p, 1, Amount::from_num(990)), Amount::from_num(10));
        assert_eq!(clamped_block_reward(&p, 1, Amount::from_num(1_000)), ZERO);
    }

    #[test]
    fn test_verify_after_sealing() {
        let p = params();
        let mut chain = Chain::new();
        seal_next(&mut chain, &p, vec![mint(100, 5)], Amount::from_num(100));
        seal_next(&mut chain, &p, vec![mint(10, 6)], Amount::from_num(160));
        assert_eq!(chain.len(), 3);
        chain.validate(&p).unwrap();
    }

    #[test]
    fn test_tampered_transaction_breaks_verification() {
        let p = params();
        let mut chain = Chain::new();
        seal_next(&mut chain, &p, vec![mint(100, 5)], Amount::from_num(100));
        assert!(chain.verify(&p));

        chain.blocks_mut()[1].transactions[1].amount = Amount::from_num(900);
        assert!(!chain.verify(&p));
    }

    #[test]
    fn test_inflated_reward_is_detected() {
        let p = params();
        let mut chain = Chain::new();
        let txs = vec![
            Transaction::new(ISSUER, "miner", Amount::from_num(500), TransactionKind::BlockReward { height: 1 }, 10),
            mint(100, 5),
        ];
        let block = chain.build_block(&p, &SealWeight::new("miner", 1.0), txs, 10).unwrap();
        chain.push(block).unwrap();

        let err = chain.validate(&p).unwrap_err();
        assert!(err.to_string().contains("reward"));
    }

    #[test]
    fn test_low_gravity_is_rejected_retroactively() {
        let p = params();
        let mut chain = Chain::new();
        let block = chain
            .build_block(&p, &SealWeight::new("miner", 0.1), vec![mint(1, 5)], 10)
            .unwrap();
        chain.push(block).unwrap();
        assert!(!chain.verify(&p));
    }

    #[test]
    fn test_non_finite_gravity_cannot_be_sealed_or_validated() {
        let p = params();
        let chain = Chain::new();
        for trust in [f64::INFINITY, f64::NAN] {
            let err = chain
                .build_block(&p, &SealWeight::new("miner", trust), vec![mint(1, 5)], 10)
                .unwrap_err();
            assert_eq!(err.kind(), "InvalidAmount");
        }

        // Hand-built header with a consistent hash
        let mut chain = Chain::new();
        let block = Block::new(1, chain.tip().hash, 0, f64::INFINITY, 10, vec![mint(1, 5)]);
        chain.blocks_mut().push(block);
        let err = chain.validate(&p).unwrap_err();
        assert!(err.to_string().contains("non-finite gravity"));
    }

    #[test]
    fn test_short_reward_accepted_only_under_reserve_policy() {
        let mut p = params();
        let mut chain = Chain::new();
        let txs = vec![
            Transaction::new(ISSUER, "miner", Amount::from_num(5), TransactionKind::BlockReward { height: 1 }, 10),
            mint(100, 5),
        ];
        let block = chain.build_block(&p, &SealWeight::new("miner", 1.0), txs, 10).unwrap();
        chain.push(block).unwrap();
        assert!(!chain.verify(&p));

        p.reserve_ratio = 0.01;
        chain.validate(&p).unwrap();
    }

    #[test]
    fn test_push_rejects_broken_linkage() {
        let p = params();
        let mut chain = Chain::new();
        let mut block = chain
            .build_block(&p, &SealWeight::new("miner", 1.0), vec![mint(1, 5)], 10)
            .unwrap();
        block.header.previous_hash = [9u8; 32];
        assert!(chain.push(block).is_err());
    }
}
