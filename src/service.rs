//! The ledger service.
//!
//! [`MeshLedger`] is the single writer over the wallet store, the block
//! chain and the proof chain. Every mutating operation works on a staged
//! copy of the state, notarizes its events into a proof batch, writes its
//! artifacts to the content store, commits one persistence batch and only
//! then swaps the staged state in. A failure at any step leaves the ledger
//! exactly as it was.

use crate::amount::{amount_from_f64, checked_add, checked_mul, checked_sub, checked_sum, ensure_positive, Amount, ZERO};
use crate::audit::{ContentStore, EventKind, EventRecord, MemoryContentStore};
use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::error::{LedgerError, Result};
use crate::hashing::{canonical_json, sha256_hex};
use crate::ledger::{
    clamped_block_reward, Block, Chain, ChainParams, EconomyManifest, MintReason, SealWeight, SupplyCounters,
    Transaction, TransactionKind, BURN_SINK, ISSUER,
};
use crate::persistence::{CommitBatch, InMemoryPersistence, Persistence};
use crate::promotion::{FlashSale, PromotionRecord};
use crate::proof::{ProofBatch, ProofChain, ResonanceContext, ResonanceTracker};
use crate::shop::{PurchaseReceipt, Rarity};
use crate::wallet::{Wallet, WalletStore};
use crate::yield_engine::{calculate_yield, ensure_epoch_elapsed, EpochReport, YieldBreakdown};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A ledger shared between threads. Writers are serialized by the lock.
pub type SharedLedger = Arc<RwLock<MeshLedger>>;

/// Mutable ledger bookkeeping persisted alongside the wallets.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LedgerMeta {
    /// Recorded transactions not yet sealed into a block
    pub pending: Vec<Transaction>,
    pub counters: SupplyCounters,
    pub flash_sale: FlashSale,
    pub last_epoch_processed_at: Option<DateTime<Utc>>,
    /// CAS key of the last manifest written by `update_economy`
    pub manifest_hash: Option<String>,
}

#[derive(Debug, Clone, Default)]
struct LedgerState {
    wallets: WalletStore,
    resonance: ResonanceTracker,
    meta: LedgerMeta,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MintReceipt {
    pub wallet: String,
    pub reason: MintReason,
    pub original_amount: Amount,
    pub credited: Amount,
    pub bonus: Amount,
    pub flash_sale_applied: bool,
    pub transaction_hash: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepositReceipt {
    pub usd_amount: Amount,
    pub external_reserve: Amount,
    pub mint: MintReceipt,
}

/// Summary returned by [`MeshLedger::status`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerStatus {
    pub manifest: EconomyManifest,
    pub pending_transactions: usize,
    pub proofs: usize,
    pub events: usize,
    pub flash_sale_active: bool,
    pub last_epoch_processed_at: Option<DateTime<Utc>>,
}

/// One in-flight operation: the staged state plus everything it produced.
#[derive(Clone)]
struct Staged {
    state: LedgerState,
    proofs: ProofBatch,
    events: Vec<EventRecord>,
    blocks: Vec<Block>,
    artifacts: Vec<Vec<u8>>,
    now: DateTime<Utc>,
}

impl Staged {
    fn now_millis(&self) -> u64 {
        self.now.timestamp_millis().max(0) as u64
    }

    /// Queue an artifact for the content store and return its key.
    fn artifact<T: Serialize>(&mut self, value: &T) -> Result<String> {
        let bytes = canonical_json(value)?;
        let hash = sha256_hex(&bytes);
        self.artifacts.push(bytes);
        Ok(hash)
    }
}

pub struct LedgerBuilder {
    config: Config,
    persistence: Option<Box<dyn Persistence>>,
    content_store: Option<Arc<dyn ContentStore>>,
    clock: Option<Arc<dyn Clock>>,
    secret: Option<Vec<u8>>,
}

impl LedgerBuilder {
    pub fn persistence(mut self, persistence: Box<dyn Persistence>) -> Self {
        self.persistence = Some(persistence);
        self
    }

    pub fn content_store(mut self, store: Arc<dyn ContentStore>) -> Self {
        self.content_store = Some(store);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn secret(mut self, secret: impl Into<Vec<u8>>) -> Self {
        self.secret = Some(secret.into());
        self
    }

    /// Load the ledger from its persistence backend, creating genesis on
    /// first use.
    pub fn open(self) -> Result<MeshLedger> {
        let secret = self
            .secret
            .filter(|s| !s.is_empty())
            .ok_or_else(|| LedgerError::Config("an authority secret is required".to_string()))?;
        MeshLedger::open(
            self.config,
            self.persistence.unwrap_or_else(|| Box::new(InMemoryPersistence::new())),
            self.content_store.unwrap_or_else(|| Arc::new(MemoryContentStore::new())),
            self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            secret,
        )
    }
}

pub struct MeshLedger {
    config: Config,
    params: ChainParams,
    persistence: Box<dyn Persistence>,
    cas: Arc<dyn ContentStore>,
    clock: Arc<dyn Clock>,
    secret: Vec<u8>,
    chain: Chain,
    proofs: ProofChain,
    events: Vec<EventRecord>,
    state: LedgerState,
}

impl MeshLedger {
    pub fn builder(config: Config) -> LedgerBuilder {
        LedgerBuilder {
            config,
            persistence: None,
            content_store: None,
            clock: None,
            secret: None,
        }
    }

    fn open(
        config: Config,
        persistence: Box<dyn Persistence>,
        cas: Arc<dyn ContentStore>,
        clock: Arc<dyn Clock>,
        secret: Vec<u8>,
    ) -> Result<Self> {
        config.validate()?;
        let params = config.ledger.chain_params()?;
        let stored = persistence.load()?;
        let fresh = stored.is_none();

        let mut ledger = MeshLedger {
            params,
            persistence,
            cas,
            clock,
            secret,
            chain: Chain::new(),
            proofs: ProofChain::new(),
            events: Vec::new(),
            state: LedgerState {
                resonance: ResonanceTracker::new(config.resonance.clone()),
                ..LedgerState::default()
            },
            config,
        };

        match stored {
            Some(stored) => {
                ledger.chain = Chain::from_blocks(stored.blocks)?;
                ledger.proofs = ProofChain::from_proofs(stored.proofs);
                ledger.events = ledger.persistence.load_events()?;
                ledger.state = LedgerState {
                    wallets: WalletStore::from_wallets(stored.wallets),
                    resonance: ResonanceTracker::with_weights(ledger.config.resonance.clone(), stored.resonance),
                    meta: stored.meta,
                };

                // Integrity problems are reported, never repaired.
                if let Err(e) = ledger.chain.validate(&ledger.params) {
                    warn!(error = %e, "block chain failed verification on open");
                }
                if let Err(e) = ledger.proofs.validate(&ledger.secret) {
                    warn!(error = %e, "proof chain failed verification on open");
                }
                info!(
                    height = ledger.chain.tip().header.index,
                    wallets = ledger.state.wallets.len(),
                    proofs = ledger.proofs.len(),
                    "ledger loaded"
                );
            }
            None => {
                ledger.initialize_genesis()?;
                info!(
                    allocations = ledger.config.ledger.genesis_allocations.len(),
                    "new ledger initialized"
                );
            }
        }
        debug!(fresh, "ledger open");
        Ok(ledger)
    }

    fn initialize_genesis(&mut self) -> Result<()> {
        let mut staged = self.stage();
        staged.blocks.push(self.chain.tip().clone());
        for alloc in self.config.ledger.genesis_allocations.clone() {
            let amount = amount_from_f64(alloc.amount)?;
            self.stage_mint(&mut staged, &alloc.wallet, amount, MintReason::Genesis)?;
        }
        // The genesis block is already in memory; persist it with the batch.
        self.commit_staged(staged, false)
    }

    pub fn into_shared(self) -> SharedLedger {
        Arc::new(RwLock::new(self))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn chain(&self) -> &Chain {
        &self.chain
    }

    pub fn proof_chain(&self) -> &ProofChain {
        &self.proofs
    }

    pub fn events(&self) -> &[EventRecord] {
        &self.events
    }

    pub fn pending_transactions(&self) -> &[Transaction] {
        &self.state.meta.pending
    }

    pub fn content_store(&self) -> &Arc<dyn ContentStore> {
        &self.cas
    }

    pub fn wallets(&self) -> impl Iterator<Item = &Wallet> {
        self.state.wallets.iter()
    }

    fn stage(&self) -> Staged {
        Staged {
            state: self.state.clone(),
            proofs: self.proofs.begin_batch(),
            events: Vec::new(),
            blocks: Vec::new(),
            artifacts: Vec::new(),
            now: self.clock.now(),
        }
    }

    /// Record an event and notarize it, with resonance for the acting wallet when given.
    fn record(
        &self,
        staged: &mut Staged,
        kind: EventKind,
        data: Value,
        resonance: Option<ResonanceContext>,
    ) -> Result<()> {
        let timestamp = staged.now_millis();
        let now = staged.now;
        let record = EventRecord::new(kind, timestamp, data)?;
        let resonance = resonance.map(|context| staged.state.resonance.resonate(&context, now));
        staged
            .proofs
            .notarize(&self.secret, serde_json::to_value(&record)?, resonance, timestamp)?;
        staged.events.push(record);
        Ok(())
    }

    fn push_transaction(&self, staged: &mut Staged, tx: Transaction) -> Result<String> {
        tx.validate_size()?;
        let hash = tx.hash_str();
        staged.state.meta.pending.push(tx);
        Ok(hash)
    }

    /// Most credits the external reserve can back, or `None` with the ratio disabled.
    fn backed_limit(&self, state: &LedgerState) -> Option<Amount> {
        let ratio = self.config.ledger.reserve_ratio;
        if ratio <= 0.0 {
            return None;
        }
        let reserve = state.meta.counters.external_reserve.to_num::<f64>();
        Some(Amount::checked_from_num(reserve / ratio).unwrap_or(Amount::MAX))
    }

    fn check_reserve(&self, state: &LedgerState, circulating_after: Amount) -> Result<()> {
        match self.backed_limit(state) {
            Some(limit) if circulating_after > limit => Err(LedgerError::ReserveUnderBacked {
                reserve: state.meta.counters.external_reserve,
                circulating: circulating_after,
                ratio: amount_from_f64(self.config.ledger.reserve_ratio)?,
            }),
            _ => Ok(()),
        }
    }

    /// Check cap and reserve for `amount` of new issuance.
    fn check_issuance(&self, state: &LedgerState, amount: Amount, exempt_reserve: bool) -> Result<()> {
        let circulating = state.wallets.circulating()?;
        let unissued = self.params.total_supply.saturating_sub(circulating).max(ZERO);
        if amount > unissued {
            return Err(LedgerError::SupplyCapExceeded {
                requested: amount,
                circulating,
                total_supply: self.params.total_supply,
            });
        }
        if !exempt_reserve {
            self.check_reserve(state, checked_add(circulating, amount)?)?;
        }
        Ok(())
    }

    fn expire_flash_sale(&self, staged: &mut Staged) -> Result<()> {
        let now = staged.now;
        if let Some(record) = staged.state.meta.flash_sale.expire_if_due(now) {
            let hash = staged.artifact(&record)?;
            info!(bonus = %record.total_bonus_minted, "flash sale expired");
            self.record(
                staged,
                EventKind::FlashSaleDeactivated,
                json!({"record": record, "record_hash": hash}),
                None,
            )?;
        }
        Ok(())
    }

    fn credit_wallet(&self, staged: &mut Staged, wallet_id: &str, amount: Amount) -> Result<()> {
        let now = staged.now;
        if staged.state.wallets.credit(wallet_id, amount, now)? {
            self.record(staged, EventKind::WalletCreated, json!({"wallet": wallet_id}), None)?;
        }
        Ok(())
    }

    fn stage_mint(&self, staged: &mut Staged, wallet_id: &str, amount: Amount, reason: MintReason) -> Result<MintReceipt> {
        ensure_positive(amount)?;
        self.expire_flash_sale(staged)?;

        let now = staged.now;
        let boost = staged.state.meta.flash_sale.apply(amount, reason.is_boostable(), now)?;
        self.check_issuance(&staged.state, boost.credited, reason == MintReason::Genesis)?;

        self.credit_wallet(staged, wallet_id, boost.credited)?;
        let mut tx = Transaction::new(ISSUER, wallet_id, boost.credited, TransactionKind::Mint { reason }, staged.now_millis());
        if boost.is_boosted() {
            tx = tx.with_original_amount(boost.original);
        }
        let transaction_hash = self.push_transaction(staged, tx)?;
        staged.state.meta.counters.mint_events += 1;

        let receipt = MintReceipt {
            wallet: wallet_id.to_string(),
            reason,
            original_amount: boost.original,
            credited: boost.credited,
            bonus: boost.bonus(),
            flash_sale_applied: boost.is_boosted(),
            transaction_hash,
        };
        self.record(
            staged,
            EventKind::Minted,
            json!({
                "wallet": wallet_id,
                "reason": reason.as_str(),
                "original_amount": receipt.original_amount,
                "amount": receipt.credited,
                "bonus": receipt.bonus,
                "transaction": receipt.transaction_hash,
            }),
            Some(ResonanceContext::new(wallet_id, boost.credited.to_num::<f64>())),
        )?;
        Ok(receipt)
    }

    fn stage_burn(&self, staged: &mut Staged, wallet_id: &str, amount: Amount, reason: &str) -> Result<String> {
        ensure_positive(amount)?;
        let now = staged.now;
        staged.state.wallets.debit(wallet_id, amount, now)?;
        let tx = Transaction::new(
            wallet_id,
            BURN_SINK,
            amount,
            TransactionKind::Burn { reason: reason.to_string() },
            staged.now_millis(),
        );
        let hash = self.push_transaction(staged, tx)?;
        staged.state.meta.counters.burn_events += 1;
        self.record(
            staged,
            EventKind::Burned,
            json!({"wallet": wallet_id, "amount": amount, "reason": reason, "transaction": hash}),
            None,
        )?;
        Ok(hash)
    }

    /// Seal the staged pending pool into a block.
    fn stage_seal(&self, staged: &mut Staged, seal: &SealWeight) -> Result<Option<Block>> {
        if staged.state.meta.pending.is_empty() {
            return Ok(None);
        }
        if !seal.trust_score.is_finite() {
            return Err(LedgerError::InvalidAmount(format!(
                "trust score {} of sealer {} is not finite",
                seal.trust_score, seal.sealer
            )));
        }
        if seal.trust_score < self.params.minimum_gravity_threshold {
            debug!(
                sealer = %seal.sealer,
                trust = seal.trust_score,
                floor = self.params.minimum_gravity_threshold,
                "seal weight below gravity floor"
            );
            return Ok(None);
        }

        let height = self.chain.next_height();
        let circulating = staged.state.wallets.circulating()?;
        let mut reward = clamped_block_reward(&self.params, height, circulating);
        if let Some(limit) = self.backed_limit(&staged.state) {
            reward = reward.min(limit.saturating_sub(circulating).max(ZERO));
        }

        let mut transactions = Vec::with_capacity(staged.state.meta.pending.len() + 1);
        if reward > ZERO {
            self.credit_wallet(staged, &seal.sealer, reward)?;
            transactions.push(Transaction::new(
                ISSUER,
                &seal.sealer,
                reward,
                TransactionKind::BlockReward { height },
                staged.now_millis(),
            ));
        }
        transactions.append(&mut staged.state.meta.pending);

        let block = self
            .chain
            .build_block(&self.params, seal, transactions, staged.now_millis())?;
        info!(
            index = block.header.index,
            hash = %block.hash_str(),
            reward = %reward,
            transactions = block.transactions.len(),
            "block sealed"
        );
        self.record(
            staged,
            EventKind::BlockSealed,
            json!({
                "index": block.header.index,
                "hash": block.hash_str(),
                "nonce": block.header.nonce,
                "sealer": seal.sealer,
                "reward": reward,
                "transactions": block.transactions.len(),
            }),
            None,
        )?;
        staged.blocks.push(block.clone());
        Ok(Some(block))
    }

    fn commit(&mut self, staged: Staged) -> Result<()> {
        self.commit_staged(staged, true)
    }

    fn commit_staged(&mut self, mut staged: Staged, append_blocks: bool) -> Result<()> {
        if append_blocks && self.config.ledger.auto_seal && !staged.state.meta.pending.is_empty() && staged.blocks.is_empty() {
            let seal = SealWeight::new(self.config.ledger.authority_id.clone(), self.config.ledger.authority_trust);
            let mut attempt = staged.clone();
            match self.stage_seal(&mut attempt, &seal) {
                Ok(_) => staged = attempt,
                Err(e) => warn!(error = %e, "auto-seal failed; transactions stay pending"),
            }
        }

        staged.state.wallets.check_invariants(self.params.total_supply)?;

        let wallets: Vec<Wallet> = staged
            .state
            .wallets
            .iter()
            .filter(|w| self.state.wallets.get(&w.id) != Some(*w))
            .cloned()
            .collect();
        let resonance = staged
            .state
            .resonance
            .weights()
            .iter()
            .filter(|(id, w)| self.state.resonance.weight(id) != Some(*w))
            .map(|(id, w)| (id.clone(), w.clone()))
            .collect();
        let block_height = self.chain.tip().header.index + staged.blocks.iter().filter(|_| append_blocks).count() as u64;
        let manifest = EconomyManifest::derive(
            self.params.total_supply,
            &staged.state.wallets,
            &staged.state.meta.counters,
            block_height,
            staged.now,
        )?;

        for bytes in &staged.artifacts {
            self.cas.put_bytes(bytes)?;
        }

        let batch = CommitBatch {
            blocks: staged.blocks.clone(),
            wallets,
            proofs: staged.proofs.proofs().to_vec(),
            resonance,
            events: staged.events.clone(),
            meta: staged.state.meta.clone(),
            manifest: Some(manifest),
        };
        self.persistence.commit(&batch)?;

        if append_blocks {
            for block in staged.blocks {
                self.chain.push(block)?;
            }
        }
        self.proofs.extend(staged.proofs)?;
        self.events.extend(staged.events);
        self.state = staged.state;
        Ok(())
    }

    // ----- wallets -----

    /// Create a wallet explicitly, optionally granting it an initial balance.
    pub fn create_wallet(&mut self, wallet_id: &str, initial_balance: Option<Amount>) -> Result<Wallet> {
        let mut staged = self.stage();
        let now = staged.now;
        staged.state.wallets.create(wallet_id, now)?;
        self.record(&mut staged, EventKind::WalletCreated, json!({"wallet": wallet_id}), None)?;
        if let Some(amount) = initial_balance.filter(|a| *a != ZERO) {
            self.stage_mint(&mut staged, wallet_id, amount, MintReason::WalletGrant)?;
        }
        let wallet = staged.state.wallets.require(wallet_id)?.clone();
        self.commit(staged)?;
        info!(wallet = wallet_id, balance = %wallet.balance, "wallet created");
        Ok(wallet)
    }

    pub fn wallet(&self, wallet_id: &str) -> Result<Wallet> {
        self.state.wallets.require(wallet_id).cloned()
    }

    pub fn get_balance(&self, wallet_id: &str) -> Result<Amount> {
        Ok(self.state.wallets.require(wallet_id)?.balance)
    }

    // ----- supply -----

    /// Mint credits for a named reason such as `"game_reward"`.
    pub fn mint(&mut self, wallet_id: &str, amount: Amount, reason: &str) -> Result<MintReceipt> {
        let reason: MintReason = reason.parse()?;
        let mut staged = self.stage();
        let receipt = self.stage_mint(&mut staged, wallet_id, amount, reason)?;
        self.commit(staged)?;
        info!(
            wallet = wallet_id,
            reason = reason.as_str(),
            amount = %receipt.credited,
            bonus = %receipt.bonus,
            "credits minted"
        );
        Ok(receipt)
    }

    /// Back new credits with external value: raise the reserve by
    /// `usd_amount` and mint `usd_amount × credits_per_usd`.
    pub fn deposit(&mut self, wallet_id: &str, usd_amount: Amount) -> Result<DepositReceipt> {
        ensure_positive(usd_amount)?;
        let mut staged = self.stage();
        let reserve = checked_add(staged.state.meta.counters.external_reserve, usd_amount)?;
        staged.state.meta.counters.external_reserve = reserve;

        let credits = checked_mul(usd_amount, amount_from_f64(self.config.ledger.credits_per_usd)?)?;
        let mint = self.stage_mint(&mut staged, wallet_id, credits, MintReason::DepositExternalValue)?;
        self.commit(staged)?;
        info!(wallet = wallet_id, usd = %usd_amount, credits = %credits, "external deposit");
        Ok(DepositReceipt {
            usd_amount,
            external_reserve: reserve,
            mint,
        })
    }

    pub fn transfer(&mut self, from: &str, to: &str, amount: Amount) -> Result<Transaction> {
        ensure_positive(amount)?;
        let mut staged = self.stage();
        let now = staged.now;
        staged.state.wallets.debit(from, amount, now)?;
        self.credit_wallet(&mut staged, to, amount)?;

        let tx = Transaction::new(from, to, amount, TransactionKind::Transfer, staged.now_millis());
        let hash = self.push_transaction(&mut staged, tx.clone())?;
        self.record(
            &mut staged,
            EventKind::Transferred,
            json!({"from": from, "to": to, "amount": amount, "transaction": hash}),
            Some(ResonanceContext::new(from, amount.to_num::<f64>())),
        )?;
        self.commit(staged)?;
        debug!(from, to, amount = %amount, "transfer");
        Ok(tx)
    }

    /// Remove credits from circulation.
    pub fn burn(&mut self, wallet_id: &str, amount: Amount, reason: &str) -> Result<Transaction> {
        let mut staged = self.stage();
        self.stage_burn(&mut staged, wallet_id, amount, reason)?;
        let tx = staged
            .state
            .meta
            .pending
            .last()
            .cloned()
            .ok_or_else(|| LedgerError::IntegrityMismatch("burn produced no transaction".to_string()))?;
        self.commit(staged)?;
        info!(wallet = wallet_id, amount = %amount, reason, "credits burned");
        Ok(tx)
    }

    // ----- staking -----

    pub fn stake(&mut self, wallet_id: &str, amount: Amount, lockup_days: u32) -> Result<Wallet> {
        let mut staged = self.stage();
        let now = staged.now;
        let wallet = staged.state.wallets.stake(wallet_id, amount, lockup_days, now)?;
        let tx = Transaction::new(wallet_id, wallet_id, amount, TransactionKind::Stake { lockup_days }, staged.now_millis());
        let hash = self.push_transaction(&mut staged, tx)?;
        self.record(
            &mut staged,
            EventKind::Staked,
            json!({
                "wallet": wallet_id,
                "amount": amount,
                "lockup_days": lockup_days,
                "staked": wallet.staked,
                "transaction": hash,
            }),
            Some(ResonanceContext::new(wallet_id, amount.to_num::<f64>())),
        )?;
        self.commit(staged)?;
        debug!(wallet = wallet_id, amount = %amount, lockup_days, "stake");
        Ok(wallet)
    }

    /// Release stake. Expired lockups are cleared first; outstanding lockups
    /// do not block the unstake.
    pub fn unstake(&mut self, wallet_id: &str, amount: Amount) -> Result<Wallet> {
        let mut staged = self.stage();
        let now = staged.now;
        let outcome = staged.state.wallets.unstake(wallet_id, amount, now)?;
        for lockup in &outcome.expired {
            self.record(
                &mut staged,
                EventKind::LockupExpired,
                json!({
                    "wallet": wallet_id,
                    "amount": lockup.amount,
                    "duration_days": lockup.duration_days,
                    "unlock_time": lockup.unlock_time,
                }),
                None,
            )?;
        }
        let tx = Transaction::new(wallet_id, wallet_id, amount, TransactionKind::Unstake, staged.now_millis());
        let hash = self.push_transaction(&mut staged, tx)?;
        self.record(
            &mut staged,
            EventKind::Unstaked,
            json!({
                "wallet": wallet_id,
                "amount": amount,
                "staked": outcome.wallet.staked,
                "transaction": hash,
            }),
            None,
        )?;
        self.commit(staged)?;
        debug!(wallet = wallet_id, amount = %amount, expired = outcome.expired.len(), "unstake");
        Ok(outcome.wallet)
    }

    fn vote_weight_unit(&self) -> Result<Amount> {
        amount_from_f64(self.config.ledger.vote_weight_unit)
    }

    pub fn governance_stake(&mut self, wallet_id: &str, amount: Amount) -> Result<Wallet> {
        let unit = self.vote_weight_unit()?;
        let mut staged = self.stage();
        let now = staged.now;
        let wallet = staged.state.wallets.governance_stake(wallet_id, amount, unit, now)?;
        let tx = Transaction::new(wallet_id, wallet_id, amount, TransactionKind::GovernanceStake, staged.now_millis());
        let hash = self.push_transaction(&mut staged, tx)?;
        self.record(
            &mut staged,
            EventKind::GovernanceStaked,
            json!({
                "wallet": wallet_id,
                "amount": amount,
                "vote_weight": wallet.vote_weight,
                "transaction": hash,
            }),
            Some(ResonanceContext::new(wallet_id, amount.to_num::<f64>())),
        )?;
        self.commit(staged)?;
        Ok(wallet)
    }

    pub fn governance_unstake(&mut self, wallet_id: &str, amount: Amount) -> Result<Wallet> {
        let unit = self.vote_weight_unit()?;
        let mut staged = self.stage();
        let now = staged.now;
        let wallet = staged.state.wallets.governance_unstake(wallet_id, amount, unit, now)?;
        let tx = Transaction::new(wallet_id, wallet_id, amount, TransactionKind::GovernanceUnstake, staged.now_millis());
        let hash = self.push_transaction(&mut staged, tx)?;
        self.record(
            &mut staged,
            EventKind::GovernanceUnstaked,
            json!({
                "wallet": wallet_id,
                "amount": amount,
                "vote_weight": wallet.vote_weight,
                "transaction": hash,
            }),
            Some(ResonanceContext::new(wallet_id, amount.to_num::<f64>())),
        )?;
        self.commit(staged)?;
        Ok(wallet)
    }

    // ----- yield -----

    pub fn calculate_yield(&self, wallet_id: &str) -> Result<YieldBreakdown> {
        let wallet = self.state.wallets.require(wallet_id)?;
        calculate_yield(&self.config.yield_config, wallet, self.clock.now())
    }

    /// Pay one epoch of yield to every staker.
    ///
    /// Fails with `EpochNotElapsed` if the previous epoch closed less than
    /// `epoch_length_days` ago, unless `force` is set.
    pub fn process_epoch(&mut self, force: bool) -> Result<EpochReport> {
        let mut staged = self.stage();
        let now = staged.now;
        if !force {
            ensure_epoch_elapsed(&self.config.yield_config, staged.state.meta.last_epoch_processed_at, now)?;
        }

        let epoch = staged.state.meta.counters.epochs_completed + 1;
        let breakdowns: Vec<YieldBreakdown> = staged
            .state
            .wallets
            .iter()
            .filter(|w| w.staked > ZERO || w.governance_staked > ZERO)
            .map(|w| calculate_yield(&self.config.yield_config, w, now))
            .collect::<Result<_>>()?;

        let total = checked_sum(breakdowns.iter().map(|b| b.epoch_yield))?;
        if total > ZERO {
            self.check_issuance(&staged.state, total, false)?;
        }

        for breakdown in breakdowns.iter().filter(|b| b.epoch_yield > ZERO) {
            staged.state.wallets.credit(&breakdown.wallet, breakdown.epoch_yield, now)?;
            let tx = Transaction::new(
                ISSUER,
                &breakdown.wallet,
                breakdown.epoch_yield,
                TransactionKind::Yield { epoch },
                staged.now_millis(),
            );
            self.push_transaction(&mut staged, tx)?;
        }

        staged.state.meta.counters.epochs_completed = epoch;
        staged.state.meta.last_epoch_processed_at = Some(now);

        let report = EpochReport {
            epoch,
            processed_at: now,
            forced: force,
            total_distributed: total,
            wallets: breakdowns,
        };
        let report_hash = staged.artifact(&report)?;
        self.record(
            &mut staged,
            EventKind::EpochProcessed,
            json!({
                "epoch": epoch,
                "forced": force,
                "total_distributed": total,
                "wallets": report.wallets.len(),
                "report_hash": report_hash,
            }),
            None,
        )?;
        self.commit(staged)?;
        info!(epoch, total = %total, wallets = report.wallets.len(), forced = force, "epoch processed");
        Ok(report)
    }

    // ----- promotions -----

    pub fn activate_flash_sale(&mut self, duration_hours: f64, multiplier: f64) -> Result<PromotionRecord> {
        let mut staged = self.stage();
        self.expire_flash_sale(&mut staged)?;
        let now = staged.now;
        let record = staged.state.meta.flash_sale.activate(duration_hours, multiplier, now)?;
        let hash = staged.artifact(&record)?;
        self.record(
            &mut staged,
            EventKind::FlashSaleActivated,
            json!({"record": record, "record_hash": hash}),
            None,
        )?;
        self.commit(staged)?;
        info!(multiplier, duration_hours, "flash sale activated");
        Ok(record)
    }

    pub fn deactivate_flash_sale(&mut self) -> Result<PromotionRecord> {
        let mut staged = self.stage();
        let now = staged.now;
        let record = staged.state.meta.flash_sale.deactivate(now)?;
        let hash = staged.artifact(&record)?;
        self.record(
            &mut staged,
            EventKind::FlashSaleDeactivated,
            json!({"record": record, "record_hash": hash}),
            None,
        )?;
        self.commit(staged)?;
        info!(bonus = %record.total_bonus_minted, boosted = record.transactions_boosted, "flash sale deactivated");
        Ok(record)
    }

    pub fn flash_sale(&self) -> &FlashSale {
        &self.state.meta.flash_sale
    }

    pub fn flash_sale_active(&self) -> bool {
        self.state.meta.flash_sale.is_active(self.clock.now())
    }

    // ----- shop -----

    /// Burn the item's price from the wallet and store a receipt.
    pub fn buy_item(&mut self, wallet_id: &str, item_id: &str, item_type: &str, rarity: &str) -> Result<PurchaseReceipt> {
        let rarity: Rarity = rarity.parse()?;
        let price = self.config.shop.price(item_type, rarity)?;
        let mut staged = self.stage();
        let transaction_hash = self.stage_burn(&mut staged, wallet_id, price, &format!("shop:{}", item_type))?;

        let receipt = PurchaseReceipt {
            wallet: wallet_id.to_string(),
            item_id: item_id.to_string(),
            item_type: item_type.to_string(),
            rarity,
            price,
            purchased_at: staged.now,
            transaction_hash,
        };
        let receipt_hash = staged.artifact(&receipt)?;
        self.record(
            &mut staged,
            EventKind::ItemPurchased,
            json!({
                "wallet": wallet_id,
                "item_id": item_id,
                "item_type": item_type,
                "rarity": rarity.as_str(),
                "price": price,
                "receipt_hash": receipt_hash,
            }),
            None,
        )?;
        self.commit(staged)?;
        info!(wallet = wallet_id, item = item_id, price = %price, "item purchased");
        Ok(receipt)
    }

    // ----- chain -----

    /// Seal the pending pool into a block rewarded to `seal.sealer`.
    ///
    /// Returns `None` when nothing is pending or the sealer's trust is below
    /// the gravity floor. On `SealFailed` the pending pool is left intact.
    pub fn mine_block(&mut self, seal: SealWeight) -> Result<Option<Block>> {
        let mut staged = self.stage();
        let block = self.stage_seal(&mut staged, &seal)?;
        if block.is_some() {
            self.commit(staged)?;
        }
        Ok(block)
    }

    /// Seal with the configured authority identity and trust.
    pub fn seal_pending(&mut self) -> Result<Option<Block>> {
        let seal = SealWeight::new(self.config.ledger.authority_id.clone(), self.config.ledger.authority_trust);
        self.mine_block(seal)
    }

    pub fn validate_chain(&self) -> Result<()> {
        self.chain.validate(&self.params)
    }

    pub fn verify_chain(&self) -> bool {
        self.chain.verify(&self.params)
    }

    pub fn validate_proof_chain(&self) -> Result<()> {
        self.proofs.validate(&self.secret)
    }

    pub fn verify_proof_chain(&self) -> bool {
        self.proofs.verify(&self.secret)
    }

    /// Re-verify every event's content hash.
    pub fn validate_events(&self) -> Result<()> {
        self.events.iter().try_for_each(EventRecord::verify)
    }

    // ----- economy -----

    pub fn economy_manifest(&self) -> Result<EconomyManifest> {
        EconomyManifest::derive(
            self.params.total_supply,
            &self.state.wallets,
            &self.state.meta.counters,
            self.chain.tip().header.index,
            self.clock.now(),
        )
    }

    /// Recompute the manifest and store it in the content store.
    pub fn update_economy(&mut self) -> Result<(EconomyManifest, String)> {
        let mut staged = self.stage();
        let manifest = EconomyManifest::derive(
            self.params.total_supply,
            &staged.state.wallets,
            &staged.state.meta.counters,
            self.chain.tip().header.index,
            staged.now,
        )?;
        let hash = staged.artifact(&manifest)?;
        staged.state.meta.manifest_hash = Some(hash.clone());
        self.commit(staged)?;
        info!(hash = %hash, circulating = %manifest.circulating_supply, "economy manifest updated");
        Ok((manifest, hash))
    }

    pub fn status(&self) -> Result<LedgerStatus> {
        Ok(LedgerStatus {
            manifest: self.economy_manifest()?,
            pending_transactions: self.state.meta.pending.len(),
            proofs: self.proofs.len(),
            events: self.events.len(),
            flash_sale_active: self.flash_sale_active(),
            last_epoch_processed_at: self.state.meta.last_epoch_processed_at,
        })
    }

    /// Replay every recorded transaction and compare the result with the
    /// wallet store.
    pub fn audit_balances(&self) -> Result<()> {
        #[derive(Default, PartialEq, Debug)]
        struct Replayed {
            balance: Amount,
            staked: Amount,
            governance: Amount,
        }

        let mut replayed: BTreeMap<&str, Replayed> = BTreeMap::new();
        let mut supply = ZERO;
        let txs = self.chain.transactions().chain(self.state.meta.pending.iter());
        for tx in txs {
            let (issued, retired) = tx.supply_delta();
            supply = checked_sub(checked_add(supply, issued)?, retired)?;
            match &tx.kind {
                TransactionKind::Mint { .. } | TransactionKind::Yield { .. } | TransactionKind::BlockReward { .. } => {
                    let entry = replayed.entry(tx.recipient.as_str()).or_default();
                    entry.balance = checked_add(entry.balance, tx.amount)?;
                }
                TransactionKind::Transfer => {
                    let entry = replayed.entry(tx.sender.as_str()).or_default();
                    entry.balance = checked_sub(entry.balance, tx.amount)?;
                    let entry = replayed.entry(tx.recipient.as_str()).or_default();
                    entry.balance = checked_add(entry.balance, tx.amount)?;
                }
                TransactionKind::Burn { .. } => {
                    let entry = replayed.entry(tx.sender.as_str()).or_default();
                    entry.balance = checked_sub(entry.balance, tx.amount)?;
                }
                TransactionKind::Stake { .. } => {
                    let entry = replayed.entry(tx.sender.as_str()).or_default();
                    entry.staked = checked_add(entry.staked, tx.amount)?;
                }
                TransactionKind::Unstake => {
                    let entry = replayed.entry(tx.sender.as_str()).or_default();
                    entry.staked = checked_sub(entry.staked, tx.amount)?;
                }
                TransactionKind::GovernanceStake => {
                    let entry = replayed.entry(tx.sender.as_str()).or_default();
                    entry.governance = checked_add(entry.governance, tx.amount)?;
                }
                TransactionKind::GovernanceUnstake => {
                    let entry = replayed.entry(tx.sender.as_str()).or_default();
                    entry.governance = checked_sub(entry.governance, tx.amount)?;
                }
            }
        }

        for wallet in self.state.wallets.iter() {
            let expected = replayed.remove(wallet.id.as_str()).unwrap_or_default();
            let actual = Replayed {
                balance: wallet.balance,
                staked: wallet.staked,
                governance: wallet.governance_staked,
            };
            if expected != actual {
                return Err(LedgerError::IntegrityMismatch(format!(
                    "wallet {} replays to {:?}, stored {:?}",
                    wallet.id, expected, actual
                )));
            }
        }
        if let Some((id, _)) = replayed.iter().find(|(_, r)| **r != Replayed::default()) {
            return Err(LedgerError::IntegrityMismatch(format!(
                "transactions reference unknown wallet {}",
                id
            )));
        }

        let circulating = self.state.wallets.circulating()?;
        if circulating != supply {
            return Err(LedgerError::IntegrityMismatch(format!(
                "wallets hold {} but the transaction log issues {}",
                circulating, supply
            )));
        }
        self.state.wallets.check_invariants(self.params.total_supply)
    }
}
