//! Staking yield.
//!
//! A wallet's APY is the base rate plus bonuses for its stake tier, its
//! longest active lockup and any governance participation, capped at
//! `max_apy`. Yield is computed daily and paid once per epoch directly into
//! the wallet balance.

use crate::amount::{amount_from_f64, checked_add, checked_div, checked_mul, Amount, ZERO};
use crate::error::{LedgerError, Result};
use crate::wallet::Wallet;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StakeTier {
    pub name: String,
    pub threshold: f64,
    pub bonus: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LockupTier {
    pub min_days: u32,
    pub bonus: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct YieldConfig {
    pub base_apy: f64,
    pub max_apy: f64,
    pub stake_tiers: Vec<StakeTier>,
    pub governance_bonus: f64,
    pub lockup_tiers: Vec<LockupTier>,
    pub epoch_length_days: u32,
}

fn tier(name: &str, threshold: f64, bonus: f64) -> StakeTier {
    StakeTier {
        name: name.to_string(),
        threshold,
        bonus,
    }
}

impl Default for YieldConfig {
    fn default() -> Self {
        Self {
            base_apy: 0.05,
            max_apy: 0.25,
            stake_tiers: vec![
                tier("bronze", 0.0, 0.0),
                tier("silver", 1_000.0, 0.02),
                tier("gold", 10_000.0, 0.04),
                tier("platinum", 100_000.0, 0.06),
            ],
            governance_bonus: 0.02,
            lockup_tiers: vec![
                LockupTier { min_days: 30, bonus: 0.01 },
                LockupTier { min_days: 90, bonus: 0.03 },
                LockupTier { min_days: 180, bonus: 0.05 },
                LockupTier { min_days: 365, bonus: 0.08 },
            ],
            epoch_length_days: 7,
        }
    }
}

impl YieldConfig {
    pub fn validate(&self) -> Result<()> {
        let rates = [("base_apy", self.base_apy), ("max_apy", self.max_apy), ("governance_bonus", self.governance_bonus)];
        for (name, rate) in rates {
            if !rate.is_finite() || rate < 0.0 {
                return Err(LedgerError::InvalidRiskTier(format!("{} must be a non-negative rate, got {}", name, rate)));
            }
        }
        if self.max_apy < self.base_apy {
            return Err(LedgerError::InvalidRiskTier(format!(
                "max_apy {} is below base_apy {}",
                self.max_apy, self.base_apy
            )));
        }
        if self.epoch_length_days == 0 {
            return Err(LedgerError::InvalidRiskTier("epoch_length_days must be at least 1".to_string()));
        }

        for pair in self.stake_tiers.windows(2) {
            if pair[1].threshold <= pair[0].threshold {
                return Err(LedgerError::InvalidRiskTier(format!(
                    "tier '{}' threshold {} does not exceed '{}' threshold {}",
                    pair[1].name, pair[1].threshold, pair[0].name, pair[0].threshold
                )));
            }
        }
        if let Some(t) = self.stake_tiers.iter().find(|t| t.bonus < 0.0 || t.threshold < 0.0) {
            return Err(LedgerError::InvalidRiskTier(format!("tier '{}' has a negative value", t.name)));
        }

        for pair in self.lockup_tiers.windows(2) {
            if pair[1].min_days <= pair[0].min_days {
                return Err(LedgerError::InvalidRiskTier(format!(
                    "lockup tier {}d does not exceed {}d",
                    pair[1].min_days, pair[0].min_days
                )));
            }
        }
        if let Some(t) = self.lockup_tiers.iter().find(|t| t.bonus < 0.0) {
            return Err(LedgerError::InvalidRiskTier(format!("lockup tier {}d has a negative bonus", t.min_days)));
        }
        Ok(())
    }

    /// Highest tier whose threshold the stake reaches. Among equal
    /// thresholds the later entry wins.
    pub fn tier_for(&self, staked: Amount) -> Option<&StakeTier> {
        let staked = staked.to_num::<f64>();
        self.stake_tiers.iter().filter(|t| t.threshold <= staked).last()
    }

    pub fn lockup_bonus(&self, lockup_days: Option<u32>) -> f64 {
        lockup_days
            .and_then(|days| self.lockup_tiers.iter().filter(|t| t.min_days <= days).last())
            .map_or(0.0, |t| t.bonus)
    }

    pub fn epoch_length(&self) -> Duration {
        Duration::days(i64::from(self.epoch_length_days))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct YieldBreakdown {
    pub wallet: String,
    pub staked: Amount,
    pub governance_staked: Amount,
    pub tier: String,
    pub base_apy: f64,
    pub tier_bonus: f64,
    pub lockup_bonus: f64,
    pub governance_bonus: f64,
    pub total_apy: f64,
    pub daily_yield: Amount,
    pub epoch_yield: Amount,
}

pub fn calculate_yield(config: &YieldConfig, wallet: &Wallet, now: DateTime<Utc>) -> Result<YieldBreakdown> {
    let tier = config.tier_for(wallet.staked);
    let tier_bonus = tier.map_or(0.0, |t| t.bonus);
    let lockup_bonus = config.lockup_bonus(wallet.best_active_lockup_days(now));
    let governance_bonus = if wallet.governance_staked > ZERO {
        config.governance_bonus
    } else {
        0.0
    };
    let total_apy = (config.base_apy + tier_bonus + lockup_bonus + governance_bonus).min(config.max_apy);

    let principal = checked_add(wallet.staked, wallet.governance_staked)?;
    let daily_yield = checked_div(checked_mul(principal, amount_from_f64(total_apy)?)?, Amount::from_num(365))?;
    let epoch_yield = checked_mul(daily_yield, Amount::from_num(config.epoch_length_days))?;

    Ok(YieldBreakdown {
        wallet: wallet.id.clone(),
        staked: wallet.staked,
        governance_staked: wallet.governance_staked,
        tier: tier.map(|t| t.name.clone()).unwrap_or_default(),
        base_apy: config.base_apy,
        tier_bonus,
        lockup_bonus,
        governance_bonus,
        total_apy,
        daily_yield,
        epoch_yield,
    })
}

/// Fails with `EpochNotElapsed` if the previous epoch closed less than one
/// epoch length before `now`.
pub fn ensure_epoch_elapsed(
    config: &YieldConfig,
    last_processed: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Result<()> {
    if let Some(last) = last_processed {
        let next = last + config.epoch_length();
        if now < next {
            return Err(LedgerError::EpochNotElapsed {
                next_epoch_at: next.to_rfc3339(),
            });
        }
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochReport {
    pub epoch: u64,
    pub processed_at: DateTime<Utc>,
    pub forced: bool,
    pub total_distributed: Amount,
    pub wallets: Vec<YieldBreakdown>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wallet::Lockup;

    fn now() -> DateTime<Utc> {
        DateTime::from_timestamp_millis(1_672_531_200_000).unwrap()
    }

    fn staker(staked: i32) -> Wallet {
        let mut wallet = Wallet::new("alice", now());
        wallet.balance = Amount::from_num(staked);
        wallet.staked = Amount::from_num(staked);
        wallet
    }

    #[test]
    fn test_default_config_is_valid() {
        YieldConfig::default().validate().unwrap();
    }

    #[test]
    fn test_tier_selection() {
        let config = YieldConfig::default();
        assert_eq!(config.tier_for(Amount::from_num(999)).unwrap().name, "bronze");
        assert_eq!(config.tier_for(Amount::from_num(1_000)).unwrap().name, "silver");
        assert_eq!(config.tier_for(Amount::from_num(250_000)).unwrap().name, "platinum");
    }

    #[test]
    fn test_yield_for_gold_staker() {
        let config = YieldConfig::default();
        let breakdown = calculate_yield(&config, &staker(36_500), now()).unwrap();
        assert_eq!(breakdown.tier, "gold");
        assert!((breakdown.total_apy - 0.09).abs() < 1e-12);
        let daily = breakdown.daily_yield.to_num::<f64>();
        assert!((daily - 9.0).abs() < 1e-3);
        assert_eq!(breakdown.epoch_yield, breakdown.daily_yield * Amount::from_num(7));
    }

    #[test]
    fn test_bonuses_capped_at_max_apy() {
        let config = YieldConfig::default();
        let mut wallet = staker(100_000);
        wallet.balance = Amount::from_num(200_000);
        wallet.governance_staked = Amount::from_num(1);
        wallet.lockups.push(Lockup {
            amount: Amount::from_num(100_000),
            unlock_time: now() + Duration::days(365),
            duration_days: 365,
        });
        let breakdown = calculate_yield(&config, &wallet, now()).unwrap();
        assert!((breakdown.total_apy - 0.21).abs() < 1e-12);

        let tight = YieldConfig {
            max_apy: 0.1,
            ..YieldConfig::default()
        };
        let breakdown = calculate_yield(&tight, &wallet, now()).unwrap();
        assert_eq!(breakdown.total_apy, 0.1);
    }

    #[test]
    fn test_validate_rejects_bad_tables() {
        let mut config = YieldConfig::default();
        config.stake_tiers[2].threshold = 500.0;
        assert_eq!(config.validate().unwrap_err().kind(), "InvalidRiskTier");

        let mut config = YieldConfig::default();
        config.lockup_tiers[0].bonus = -0.01;
        assert!(config.validate().is_err());

        let config = YieldConfig {
            max_apy: 0.01,
            ..YieldConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_epoch_guard() {
        let config = YieldConfig::default();
        ensure_epoch_elapsed(&config, None, now()).unwrap();
        let err = ensure_epoch_elapsed(&config, Some(now()), now() + Duration::days(6)).unwrap_err();
        assert_eq!(err.kind(), "EpochNotElapsed");
        ensure_epoch_elapsed(&config, Some(now()), now() + Duration::days(7)).unwrap();
    }
}
