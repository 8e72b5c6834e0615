//! Integration tests for ledger operations through `MeshLedger`

use chrono::Duration;
use meshcredit::amount::Amount;
use meshcredit::audit::EventKind;
use meshcredit::clock::ManualClock;
use meshcredit::config::Config;
use meshcredit::ledger::{Block, Chain, EconomyManifest, SealWeight, TransactionKind};
use meshcredit::proof::ProofChain;
use meshcredit::service::MeshLedger;
use serde_json::json;
use std::sync::Arc;

const SECRET: &[u8] = b"integration-test-secret";

/// Config with instant sealing and a short halving interval
fn test_config() -> Config {
    let mut config = Config::default();
    config.ledger.difficulty = 0;
    config.ledger.total_supply = 1_000_000.0;
    config.ledger.initial_reward = 50.0;
    config.ledger.halving_interval = 2;
    config
}

fn open_ledger(config: Config, clock: &ManualClock) -> Result<MeshLedger, Box<dyn std::error::Error>> {
    Ok(MeshLedger::builder(config)
        .clock(Arc::new(clock.clone()))
        .secret(SECRET.to_vec())
        .open()?)
}

fn credits(value: f64) -> Amount {
    Amount::from_num(value)
}

fn circulating(ledger: &MeshLedger) -> Amount {
    ledger.wallets().map(|w| w.balance).sum()
}

#[test]
fn test_create_wallet_with_grant() -> Result<(), Box<dyn std::error::Error>> {
    let clock = ManualClock::at_epoch_start();
    let mut ledger = open_ledger(test_config(), &clock)?;

    let alice = ledger.create_wallet("alice", Some(credits(250.0)))?;
    assert_eq!(alice.balance, credits(250.0));
    assert_eq!(ledger.get_balance("alice")?, credits(250.0));

    // Only the grant is a transaction
    assert_eq!(ledger.pending_transactions().len(), 1);
    assert!(matches!(ledger.pending_transactions()[0].kind, TransactionKind::Mint { .. }));

    let err = ledger.create_wallet("alice", None).unwrap_err();
    assert_eq!(err.kind(), "WalletExists");
    assert_eq!(ledger.get_balance("alice")?, credits(250.0));

    let empty = ledger.create_wallet("bob", None)?;
    assert_eq!(empty.balance, credits(0.0));
    assert_eq!(ledger.pending_transactions().len(), 1);

    Ok(())
}

#[test]
fn test_transfer_conserves_supply() -> Result<(), Box<dyn std::error::Error>> {
    let clock = ManualClock::at_epoch_start();
    let mut ledger = open_ledger(test_config(), &clock)?;
    ledger.create_wallet("alice", Some(credits(100.0)))?;

    let before = circulating(&ledger);
    ledger.transfer("alice", "bob", credits(30.0))?;

    assert_eq!(ledger.get_balance("alice")?, credits(70.0));
    // Recipients are created on first credit
    assert_eq!(ledger.get_balance("bob")?, credits(30.0));
    assert_eq!(circulating(&ledger), before);

    let err = ledger.transfer("alice", "bob", credits(70.5)).unwrap_err();
    assert_eq!(err.kind(), "InsufficientAvailableBalance");

    let err = ledger.transfer("nobody", "bob", credits(1.0)).unwrap_err();
    assert_eq!(err.kind(), "UnknownWallet");

    let err = ledger.transfer("alice", "bob", credits(0.0)).unwrap_err();
    assert_eq!(err.kind(), "InvalidAmount");

    ledger.audit_balances()?;
    Ok(())
}

#[test]
fn test_staked_credits_cannot_be_spent() -> Result<(), Box<dyn std::error::Error>> {
    let clock = ManualClock::at_epoch_start();
    let mut ledger = open_ledger(test_config(), &clock)?;
    ledger.create_wallet("alice", Some(credits(100.0)))?;
    ledger.stake("alice", credits(60.0), 0)?;
    ledger.governance_stake("alice", credits(30.0))?;

    let err = ledger.transfer("alice", "bob", credits(11.0)).unwrap_err();
    assert_eq!(err.kind(), "InsufficientAvailableBalance");
    ledger.transfer("alice", "bob", credits(10.0))?;

    let alice = ledger.wallet("alice")?;
    assert_eq!(alice.available()?, credits(0.0));
    assert_eq!(alice.balance, credits(90.0));
    Ok(())
}

#[test]
fn test_unknown_mint_reason_rejected() -> Result<(), Box<dyn std::error::Error>> {
    let clock = ManualClock::at_epoch_start();
    let mut ledger = open_ledger(test_config(), &clock)?;

    let err = ledger.mint("alice", credits(10.0), "because").unwrap_err();
    assert_eq!(err.kind(), "UnknownTransactionReason");
    assert!(ledger.wallet("alice").is_err());

    let receipt = ledger.mint("alice", credits(10.0), "achievement")?;
    assert_eq!(receipt.credited, credits(10.0));
    assert!(!receipt.flash_sale_applied);
    Ok(())
}

#[test]
fn test_flash_sale_doubles_rewards_not_deposits() -> Result<(), Box<dyn std::error::Error>> {
    let clock = ManualClock::at_epoch_start();
    let mut ledger = open_ledger(test_config(), &clock)?;

    ledger.activate_flash_sale(24.0, 2.0)?;
    assert!(ledger.flash_sale_active());

    let receipt = ledger.mint("alice", credits(100.0), "game_reward")?;
    assert_eq!(receipt.original_amount, credits(100.0));
    assert_eq!(receipt.credited, credits(200.0));
    assert_eq!(receipt.bonus, credits(100.0));
    assert!(receipt.flash_sale_applied);

    // 1 USD at the default 100 credits per USD, never boosted
    let deposit = ledger.deposit("bob", credits(1.0))?;
    assert_eq!(deposit.mint.credited, credits(100.0));
    assert!(!deposit.mint.flash_sale_applied);
    assert_eq!(deposit.external_reserve, credits(1.0));

    assert_eq!(ledger.flash_sale().total_bonus_minted, credits(100.0));
    assert_eq!(ledger.flash_sale().transactions_boosted, 1);

    let err = ledger.activate_flash_sale(1.0, 3.0).unwrap_err();
    assert_eq!(err.kind(), "InvalidPromotion");

    clock.advance(Duration::hours(25));
    assert!(!ledger.flash_sale_active());
    let receipt = ledger.mint("alice", credits(10.0), "game_reward")?;
    assert_eq!(receipt.credited, credits(10.0));
    assert!(ledger
        .events()
        .iter()
        .any(|e| e.event == EventKind::FlashSaleDeactivated.as_str()));

    assert_eq!(ledger.get_balance("alice")?, credits(210.0));
    Ok(())
}

#[test]
fn test_flash_sale_rejects_bad_parameters() -> Result<(), Box<dyn std::error::Error>> {
    let clock = ManualClock::at_epoch_start();
    let mut ledger = open_ledger(test_config(), &clock)?;

    assert_eq!(ledger.activate_flash_sale(24.0, 0.5).unwrap_err().kind(), "InvalidPromotion");
    assert_eq!(ledger.activate_flash_sale(0.0, 2.0).unwrap_err().kind(), "InvalidPromotion");
    assert_eq!(ledger.deactivate_flash_sale().unwrap_err().kind(), "InvalidPromotion");

    ledger.activate_flash_sale(2.0, 1.5)?;
    let record = ledger.deactivate_flash_sale()?;
    assert_eq!(record.action, "deactivated");
    assert!(!record.expired);
    Ok(())
}

#[test]
fn test_block_rewards_halve() -> Result<(), Box<dyn std::error::Error>> {
    let clock = ManualClock::at_epoch_start();
    let mut ledger = open_ledger(test_config(), &clock)?;
    let authority = ledger.config().ledger.authority_id.clone();

    let mut rewards = Vec::new();
    for i in 0..4 {
        ledger.mint("alice", credits(1.0), "game_reward")?;
        clock.advance(Duration::seconds(1));
        let block = ledger.seal_pending()?.ok_or("expected a block")?;
        assert_eq!(block.header.index, i + 1);
        let reward = &block.transactions[0];
        assert_eq!(reward.kind, TransactionKind::BlockReward { height: i + 1 });
        rewards.push(reward.amount);
    }

    // halving_interval = 2: heights 1 | 2, 3 | 4
    assert_eq!(rewards, vec![credits(50.0), credits(25.0), credits(25.0), credits(12.5)]);
    assert_eq!(ledger.get_balance(&authority)?, credits(112.5));
    assert!(ledger.pending_transactions().is_empty());
    assert!(ledger.verify_chain());
    ledger.audit_balances()?;
    Ok(())
}

#[test]
fn test_nothing_to_seal_or_low_trust() -> Result<(), Box<dyn std::error::Error>> {
    let clock = ManualClock::at_epoch_start();
    let mut ledger = open_ledger(test_config(), &clock)?;

    assert!(ledger.seal_pending()?.is_none());

    ledger.mint("alice", credits(5.0), "referral")?;
    let weak = SealWeight::new("drifter", 0.1);
    assert!(ledger.mine_block(weak)?.is_none());
    assert_eq!(ledger.pending_transactions().len(), 1);
    assert_eq!(ledger.chain().len(), 1);

    let block = ledger.mine_block(SealWeight::new("miner", 0.9))?.ok_or("expected a block")?;
    assert_eq!(block.header.proof_gravity, 0.9);
    assert_eq!(ledger.get_balance("miner")?, credits(50.0));
    Ok(())
}

#[test]
fn test_supply_cap_and_clamped_reward() -> Result<(), Box<dyn std::error::Error>> {
    let clock = ManualClock::at_epoch_start();
    let mut config = test_config();
    config.ledger.total_supply = 1_000.0;
    let mut ledger = open_ledger(config, &clock)?;

    ledger.create_wallet("alice", Some(credits(980.0)))?;
    let err = ledger.mint("alice", credits(30.0), "admin_grant").unwrap_err();
    assert_eq!(err.kind(), "SupplyCapExceeded");

    // Only 20 credits remain, so the 50 credit reward is clamped
    let block = ledger.seal_pending()?.ok_or("expected a block")?;
    assert_eq!(block.transactions[0].amount, credits(20.0));
    assert_eq!(circulating(&ledger), credits(1_000.0));

    // At the cap the reward disappears from the block entirely
    ledger.transfer("alice", "bob", credits(5.0))?;
    clock.advance(Duration::seconds(1));
    let block = ledger.seal_pending()?.ok_or("expected a block")?;
    assert_eq!(block.transactions.len(), 1);
    assert_eq!(block.transactions[0].kind, TransactionKind::Transfer);

    ledger.burn("alice", credits(10.0), "cleanup")?;
    ledger.mint("bob", credits(10.0), "admin_grant")?;
    assert_eq!(
        ledger.mint("bob", credits(0.5), "admin_grant").unwrap_err().kind(),
        "SupplyCapExceeded"
    );

    ledger.validate_chain()?;
    ledger.audit_balances()?;
    Ok(())
}

#[test]
fn test_failed_operation_leaves_state_untouched() -> Result<(), Box<dyn std::error::Error>> {
    let clock = ManualClock::at_epoch_start();
    let mut config = test_config();
    config.ledger.total_supply = 500.0;
    let mut ledger = open_ledger(config, &clock)?;
    ledger.create_wallet("alice", Some(credits(400.0)))?;

    let wallets_before: Vec<_> = ledger.wallets().cloned().collect();
    let events_before = ledger.events().len();
    let proofs_before = ledger.proof_chain().len();
    let pending_before = ledger.pending_transactions().len();

    // Each of these stages changes before failing
    let err = ledger.create_wallet("carol", Some(credits(200.0))).unwrap_err();
    assert_eq!(err.kind(), "SupplyCapExceeded");
    let err = ledger.deposit("alice", credits(2.0)).unwrap_err();
    assert_eq!(err.kind(), "SupplyCapExceeded");
    assert!(ledger.stake("alice", credits(401.0), 30).is_err());
    assert!(ledger.buy_item("alice", "hat", "crown", "rare").is_err());

    let wallets_after: Vec<_> = ledger.wallets().cloned().collect();
    assert_eq!(wallets_before, wallets_after);
    assert_eq!(ledger.events().len(), events_before);
    assert_eq!(ledger.proof_chain().len(), proofs_before);
    assert_eq!(ledger.pending_transactions().len(), pending_before);
    assert!(ledger.wallet("carol").is_err());
    assert_eq!(ledger.economy_manifest()?.external_reserve, credits(0.0));
    Ok(())
}

#[test]
fn test_reserve_ratio_blocks_unbacked_issuance() -> Result<(), Box<dyn std::error::Error>> {
    let clock = ManualClock::at_epoch_start();
    let mut config = test_config();
    config.ledger.reserve_ratio = 0.01;
    let authority = config.ledger.authority_id.clone();
    let mut ledger = open_ledger(config, &clock)?;

    // A deposit is fully backed: 1 USD for 100 credits
    ledger.deposit("alice", credits(2.0))?;
    let err = ledger.mint("alice", credits(1.0), "game_reward").unwrap_err();
    assert_eq!(err.kind(), "ReserveUnderBacked");

    // No backed headroom: the block seals without a reward
    let block = ledger.seal_pending()?.ok_or("block expected")?;
    assert_eq!(block.transactions.len(), 1);
    assert!(ledger.pending_transactions().is_empty());
    assert_eq!(circulating(&ledger), credits(200.0));

    // Burning frees headroom; the reward is cut to it
    ledger.burn("alice", credits(10.0), "expired_voucher")?;
    clock.advance(Duration::seconds(1));
    let block = ledger.seal_pending()?.ok_or("block expected")?;
    assert!(matches!(block.transactions[0].kind, TransactionKind::BlockReward { height: 2 }));
    assert_eq!(block.transactions[0].amount, credits(10.0));
    assert_eq!(ledger.get_balance(&authority)?, credits(10.0));
    assert_eq!(circulating(&ledger), credits(200.0));

    ledger.validate_chain()?;
    ledger.audit_balances()?;
    ledger.deposit("bob", credits(1.0))?;
    assert_eq!(ledger.get_balance("bob")?, credits(100.0));
    Ok(())
}

#[test]
fn test_exhausted_nonce_search_keeps_pending_pool() -> Result<(), Box<dyn std::error::Error>> {
    let clock = ManualClock::at_epoch_start();
    let mut config = test_config();
    config.ledger.difficulty = 255;
    config.ledger.max_nonce_attempts = 4;
    config.ledger.auto_seal = true;
    let mut ledger = open_ledger(config, &clock)?;

    // Auto-seal fails quietly and the mint still commits
    ledger.create_wallet("alice", Some(credits(40.0)))?;
    assert_eq!(ledger.get_balance("alice")?, credits(40.0));
    assert_eq!(ledger.pending_transactions().len(), 1);
    assert_eq!(ledger.chain().len(), 1);

    let events_before = ledger.events().len();
    let err = ledger.seal_pending().unwrap_err();
    assert_eq!(err.kind(), "SealFailed");
    assert_eq!(ledger.pending_transactions().len(), 1);
    assert_eq!(ledger.chain().len(), 1);
    assert_eq!(ledger.events().len(), events_before);
    ledger.audit_balances()?;
    Ok(())
}

#[test]
fn test_non_finite_trust_is_rejected() -> Result<(), Box<dyn std::error::Error>> {
    let clock = ManualClock::at_epoch_start();
    let mut ledger = open_ledger(test_config(), &clock)?;
    ledger.create_wallet("alice", Some(credits(10.0)))?;

    for trust in [f64::INFINITY, f64::NAN] {
        let err = ledger.mine_block(SealWeight::new("miner", trust)).unwrap_err();
        assert_eq!(err.kind(), "InvalidAmount");
        assert_eq!(ledger.chain().len(), 1);
        assert_eq!(ledger.pending_transactions().len(), 1);
    }
    assert!(ledger.mine_block(SealWeight::new("miner", 1.0))?.is_some());
    assert!(ledger.verify_chain());
    Ok(())
}

#[test]
fn test_oversized_mint_reports_supply_cap() -> Result<(), Box<dyn std::error::Error>> {
    let clock = ManualClock::at_epoch_start();
    let mut ledger = open_ledger(test_config(), &clock)?;
    ledger.create_wallet("alice", Some(credits(100.0)))?;

    let err = ledger.mint("alice", Amount::MAX, "game_reward").unwrap_err();
    assert_eq!(err.kind(), "SupplyCapExceeded");

    // The boosted amount overflows the amount type
    ledger.activate_flash_sale(1.0, 3.0)?;
    let err = ledger.mint("alice", credits(1_000_000_000.0), "game_reward").unwrap_err();
    assert_eq!(err.kind(), "SupplyCapExceeded");
    assert_eq!(ledger.get_balance("alice")?, credits(100.0));
    Ok(())
}

#[test]
fn test_tampered_block_fails_validation() -> Result<(), Box<dyn std::error::Error>> {
    let clock = ManualClock::at_epoch_start();
    let config = test_config();
    let params = config.ledger.chain_params()?;
    let mut ledger = open_ledger(config, &clock)?;
    ledger.create_wallet("alice", Some(credits(100.0)))?;
    ledger.seal_pending()?;
    ledger.transfer("alice", "bob", credits(10.0))?;
    clock.advance(Duration::seconds(1));
    ledger.seal_pending()?;
    assert!(ledger.verify_chain());

    // Edited amount: the merkle root no longer matches
    let mut blocks = ledger.chain().blocks().to_vec();
    blocks[2].transactions[1].amount = credits(1_000.0);
    assert!(Chain::from_blocks(blocks)?.validate(&params).is_err());

    // Reward inflated and the block re-sealed: the schedule catches it
    let original = ledger.chain().blocks()[1].clone();
    let mut transactions = original.transactions.clone();
    transactions[0].amount = credits(75.0);
    let forged = Block::new(
        original.header.index,
        original.header.previous_hash,
        original.header.difficulty,
        original.header.proof_gravity,
        original.header.timestamp,
        transactions,
    )
    .seal(params.max_nonce_attempts)?;
    let chain = Chain::from_blocks(vec![ledger.chain().blocks()[0].clone(), forged])?;
    let err = chain.validate(&params).unwrap_err();
    assert!(err.to_string().contains("reward"));

    // Dropped block breaks the linkage
    let mut blocks = ledger.chain().blocks().to_vec();
    blocks.remove(1);
    assert!(!Chain::from_blocks(blocks)?.verify(&params));
    Ok(())
}

#[test]
fn test_proof_chain_detects_tampering() -> Result<(), Box<dyn std::error::Error>> {
    let clock = ManualClock::at_epoch_start();
    let mut ledger = open_ledger(test_config(), &clock)?;
    ledger.create_wallet("alice", Some(credits(100.0)))?;
    ledger.transfer("alice", "bob", credits(40.0))?;
    ledger.stake("bob", credits(20.0), 0)?;

    assert!(ledger.verify_proof_chain());
    ledger.validate_events()?;
    assert_eq!(ledger.proof_chain().len(), ledger.events().len());

    assert!(ledger.proof_chain().validate(b"some other key").is_err());
    let proofs = ledger.proof_chain().proofs().to_vec();

    let mut forged = proofs.clone();
    forged[2].metadata.event = json!({"event": "transferred", "amount": "4000"});
    assert!(!ProofChain::from_proofs(forged).verify(SECRET));

    // Swapped heights reorder the chain on load
    let mut reordered = proofs.clone();
    let (first, second) = (reordered[1].height, reordered[2].height);
    reordered[1].height = second;
    reordered[2].height = first;
    assert!(ProofChain::from_proofs(reordered).validate(SECRET).is_err());

    let mut truncated = proofs;
    truncated.remove(0);
    assert!(!ProofChain::from_proofs(truncated).verify(SECRET));
    Ok(())
}

#[test]
fn test_resonance_recorded_for_actors() -> Result<(), Box<dyn std::error::Error>> {
    let clock = ManualClock::at_epoch_start();
    let mut ledger = open_ledger(test_config(), &clock)?;
    ledger.mint("alice", credits(100.0), "game_reward")?;
    ledger.transfer("alice", "bob", credits(10.0))?;

    let resonant: Vec<_> = ledger
        .proof_chain()
        .proofs()
        .iter()
        .filter_map(|p| p.metadata.resonance.as_ref())
        .collect();
    assert_eq!(resonant.len(), 2);
    assert!(resonant[1].cycles_accumulated > resonant[0].cycles_accumulated);
    Ok(())
}

#[test]
fn test_yield_grows_with_stake_and_lockup() -> Result<(), Box<dyn std::error::Error>> {
    let clock = ManualClock::at_epoch_start();
    let mut ledger = open_ledger(test_config(), &clock)?;
    for id in ["alice", "bob", "carol"] {
        ledger.create_wallet(id, Some(credits(20_000.0)))?;
    }
    ledger.stake("alice", credits(1_000.0), 0)?;
    ledger.stake("bob", credits(1_000.0), 365)?;
    ledger.stake("carol", credits(10_000.0), 0)?;

    let alice = ledger.calculate_yield("alice")?;
    let bob = ledger.calculate_yield("bob")?;
    let carol = ledger.calculate_yield("carol")?;

    assert_eq!(alice.tier, "silver");
    assert_eq!(carol.tier, "gold");
    assert!(bob.total_apy > alice.total_apy);
    assert!(carol.total_apy > alice.total_apy);
    assert!(carol.epoch_yield > alice.epoch_yield);
    assert!(bob.total_apy <= ledger.config().yield_config.max_apy);

    ledger.governance_stake("alice", credits(500.0))?;
    let alice_gov = ledger.calculate_yield("alice")?;
    assert!(alice_gov.total_apy > alice.total_apy);
    assert!(alice_gov.epoch_yield > alice.epoch_yield);

    let nobody = ledger.create_wallet("dave", None)?;
    assert_eq!(ledger.calculate_yield(&nobody.id)?.epoch_yield, credits(0.0));
    Ok(())
}

#[test]
fn test_epoch_guard() -> Result<(), Box<dyn std::error::Error>> {
    let clock = ManualClock::at_epoch_start();
    let mut ledger = open_ledger(test_config(), &clock)?;
    ledger.create_wallet("alice", Some(credits(5_000.0)))?;
    ledger.stake("alice", credits(3_650.0), 0)?;

    let first = ledger.process_epoch(false)?;
    assert_eq!(first.epoch, 1);
    assert!(first.total_distributed > credits(0.0));
    let after_first = ledger.get_balance("alice")?;
    assert_eq!(after_first, credits(5_000.0) + first.total_distributed);

    clock.advance(Duration::days(3));
    let err = ledger.process_epoch(false).unwrap_err();
    assert_eq!(err.kind(), "EpochNotElapsed");
    assert_eq!(ledger.get_balance("alice")?, after_first);

    let forced = ledger.process_epoch(true)?;
    assert!(forced.forced);
    assert_eq!(forced.epoch, 2);

    clock.advance(Duration::days(7));
    let third = ledger.process_epoch(false)?;
    assert_eq!(third.epoch, 3);
    assert_eq!(ledger.economy_manifest()?.epochs_completed, 3);

    ledger.seal_pending()?;
    ledger.validate_chain()?;
    ledger.audit_balances()?;
    Ok(())
}

#[test]
fn test_unstake_ignores_and_trims_lockups() -> Result<(), Box<dyn std::error::Error>> {
    let clock = ManualClock::at_epoch_start();
    let mut ledger = open_ledger(test_config(), &clock)?;
    ledger.create_wallet("alice", Some(credits(1_000.0)))?;
    ledger.stake("alice", credits(500.0), 30)?;

    let alice = ledger.unstake("alice", credits(200.0))?;
    assert_eq!(alice.staked, credits(300.0));
    assert_eq!(alice.lockups.len(), 1);
    assert_eq!(alice.lockups[0].amount, credits(300.0));

    let err = ledger.unstake("alice", credits(300.5)).unwrap_err();
    assert_eq!(err.kind(), "InsufficientStakedBalance");

    clock.advance(Duration::days(31));
    let alice = ledger.unstake("alice", credits(100.0))?;
    assert!(alice.lockups.is_empty());
    assert_eq!(alice.staked, credits(200.0));
    assert!(ledger
        .events()
        .iter()
        .any(|e| e.event == EventKind::LockupExpired.as_str()));
    Ok(())
}

#[test]
fn test_governance_vote_weight() -> Result<(), Box<dyn std::error::Error>> {
    let clock = ManualClock::at_epoch_start();
    let mut ledger = open_ledger(test_config(), &clock)?;
    ledger.create_wallet("alice", Some(credits(1_000.0)))?;

    let alice = ledger.governance_stake("alice", credits(250.0))?;
    assert_eq!(alice.vote_weight, credits(2.5));

    let alice = ledger.governance_unstake("alice", credits(50.0))?;
    assert_eq!(alice.governance_staked, credits(200.0));
    assert_eq!(alice.vote_weight, credits(2.0));

    let err = ledger.governance_unstake("alice", credits(500.0)).unwrap_err();
    assert_eq!(err.kind(), "InsufficientStakedBalance");
    Ok(())
}

#[test]
fn test_shop_purchase_burns_price() -> Result<(), Box<dyn std::error::Error>> {
    let clock = ManualClock::at_epoch_start();
    let mut ledger = open_ledger(test_config(), &clock)?;
    ledger.create_wallet("alice", Some(credits(1_000.0)))?;

    // cosmetic 50 × rare 5
    let receipt = ledger.buy_item("alice", "halo-01", "cosmetic", "rare")?;
    assert_eq!(receipt.price, credits(250.0));
    assert_eq!(ledger.get_balance("alice")?, credits(750.0));
    assert_eq!(circulating(&ledger), credits(750.0));

    let err = ledger.buy_item("alice", "x", "cosmetic", "mythic").unwrap_err();
    assert_eq!(err.kind(), "InvalidItem");
    let err = ledger.buy_item("alice", "x", "spaceship", "common").unwrap_err();
    assert_eq!(err.kind(), "InvalidItem");
    let err = ledger.buy_item("alice", "x", "bundle", "legendary").unwrap_err();
    assert_eq!(err.kind(), "InsufficientAvailableBalance");

    let manifest = ledger.economy_manifest()?;
    assert_eq!(manifest.burn_events, 1);
    assert_eq!(manifest.mint_events, 1);
    ledger.audit_balances()?;
    Ok(())
}

#[test]
fn test_update_economy_stores_manifest() -> Result<(), Box<dyn std::error::Error>> {
    let clock = ManualClock::at_epoch_start();
    let mut ledger = open_ledger(test_config(), &clock)?;
    ledger.create_wallet("alice", Some(credits(300.0)))?;
    ledger.stake("alice", credits(100.0), 0)?;
    ledger.deposit("bob", credits(2.5))?;

    let (manifest, hash) = ledger.update_economy()?;
    assert_eq!(manifest.circulating_supply, credits(550.0));
    assert_eq!(manifest.staked_supply, credits(100.0));
    assert_eq!(manifest.external_reserve, credits(2.5));
    assert_eq!(manifest.wallets, 2);

    let stored: EconomyManifest = ledger.content_store().get(&hash)?.ok_or("manifest missing")?;
    assert_eq!(stored, manifest);
    ledger.content_store().verify(&hash)?;

    let status = ledger.status()?;
    assert_eq!(status.pending_transactions, 3);
    assert_eq!(status.events, ledger.events().len());
    Ok(())
}

#[test]
fn test_genesis_allocations_and_auto_seal() -> Result<(), Box<dyn std::error::Error>> {
    let clock = ManualClock::at_epoch_start();
    let mut config = test_config();
    config.ledger.auto_seal = true;
    config.ledger.genesis_allocations = vec![meshcredit::config::GenesisAllocation {
        wallet: "treasury".to_string(),
        amount: 10_000.0,
    }];
    let mut ledger = open_ledger(config, &clock)?;

    assert_eq!(ledger.get_balance("treasury")?, credits(10_000.0));
    assert_eq!(ledger.pending_transactions().len(), 1);

    ledger.transfer("treasury", "alice", credits(100.0))?;
    assert!(ledger.pending_transactions().is_empty());
    assert_eq!(ledger.chain().len(), 2);
    let sealed = &ledger.chain().blocks()[1];
    assert!(matches!(sealed.transactions[0].kind, TransactionKind::BlockReward { height: 1 }));
    assert_eq!(sealed.transactions.len(), 3);

    ledger.validate_chain()?;
    ledger.audit_balances()?;
    Ok(())
}

#[test]
fn test_missing_secret_rejected() {
    let result = MeshLedger::builder(test_config()).open();
    assert_eq!(result.err().map(|e| e.kind()), Some("Config"));
}
