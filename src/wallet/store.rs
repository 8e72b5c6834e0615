use crate::amount::{checked_add, checked_div, checked_sub, checked_sum, ensure_positive, Amount, ZERO};
use crate::error::{LedgerError, Result};
use crate::wallet::types::{Lockup, Wallet};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Every wallet known to the ledger, keyed by id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WalletStore {
    wallets: BTreeMap<String, Wallet>,
}

/// Result of an unstake: the updated wallet and the lockups that had expired.
#[derive(Debug, Clone, PartialEq)]
pub struct UnstakeOutcome {
    pub wallet: Wallet,
    pub expired: Vec<Lockup>,
}

impl WalletStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_wallets<I: IntoIterator<Item = Wallet>>(wallets: I) -> Self {
        Self {
            wallets: wallets.into_iter().map(|w| (w.id.clone(), w)).collect(),
        }
    }

    pub fn get(&self, id: &str) -> Option<&Wallet> {
        self.wallets.get(id)
    }

    pub fn require(&self, id: &str) -> Result<&Wallet> {
        self.wallets
            .get(id)
            .ok_or_else(|| LedgerError::UnknownWallet(id.to_string()))
    }

    fn require_mut(&mut self, id: &str) -> Result<&mut Wallet> {
        self.wallets
            .get_mut(id)
            .ok_or_else(|| LedgerError::UnknownWallet(id.to_string()))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.wallets.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.wallets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.wallets.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Wallet> {
        self.wallets.values()
    }

    /// Create an empty wallet. Duplicate ids are rejected.
    pub fn create(&mut self, id: &str, now: DateTime<Utc>) -> Result<&Wallet> {
        if id.trim().is_empty() {
            return Err(LedgerError::UnknownWallet("wallet id must not be empty".to_string()));
        }
        if self.wallets.contains_key(id) {
            return Err(LedgerError::WalletExists(id.to_string()));
        }
        self.wallets.insert(id.to_string(), Wallet::new(id, now));
        self.require(id)
    }

    /// Add to a wallet's balance, creating the wallet on first credit.
    /// Returns `true` when the wallet was created.
    pub fn credit(&mut self, id: &str, amount: Amount, now: DateTime<Utc>) -> Result<bool> {
        let created = !self.wallets.contains_key(id);
        if created {
            self.create(id, now)?;
        }
        let wallet = self.require_mut(id)?;
        wallet.balance = checked_add(wallet.balance, amount)?;
        wallet.last_updated = now;
        Ok(created)
    }

    /// Remove from a wallet's available balance.
    pub fn debit(&mut self, id: &str, amount: Amount, now: DateTime<Utc>) -> Result<()> {
        let wallet = self.require_mut(id)?;
        let available = wallet.available()?;
        if amount > available {
            return Err(LedgerError::InsufficientAvailableBalance {
                wallet: id.to_string(),
                available,
                requested: amount,
            });
        }
        wallet.balance = checked_sub(wallet.balance, amount)?;
        wallet.last_updated = now;
        Ok(())
    }

    pub fn stake(&mut self, id: &str, amount: Amount, lockup_days: u32, now: DateTime<Utc>) -> Result<Wallet> {
        ensure_positive(amount)?;
        let wallet = self.require_mut(id)?;
        let available = wallet.available()?;
        if amount > available {
            return Err(LedgerError::InsufficientAvailableBalance {
                wallet: id.to_string(),
                available,
                requested: amount,
            });
        }
        wallet.staked = checked_add(wallet.staked, amount)?;
        if lockup_days > 0 {
            wallet.lockups.push(Lockup {
                amount,
                unlock_time: now + Duration::days(i64::from(lockup_days)),
                duration_days: lockup_days,
            });
        }
        wallet.last_updated = now;
        Ok(wallet.clone())
    }

    /// Release stake back to the available balance.
    ///
    /// Expired lockups are removed first and returned. Outstanding lockups do
    /// not block the unstake; afterwards they are trimmed, latest unlock
    /// first, so they never cover more than what is still staked.
    pub fn unstake(&mut self, id: &str, amount: Amount, now: DateTime<Utc>) -> Result<UnstakeOutcome> {
        ensure_positive(amount)?;
        let wallet = self.require_mut(id)?;

        let (expired, outstanding): (Vec<Lockup>, Vec<Lockup>) =
            wallet.lockups.drain(..).partition(|l| l.is_expired(now));
        wallet.lockups = outstanding;

        if amount > wallet.staked {
            return Err(LedgerError::InsufficientStakedBalance {
                wallet: id.to_string(),
                staked: wallet.staked,
                requested: amount,
            });
        }
        wallet.staked = checked_sub(wallet.staked, amount)?;
        trim_lockups(&mut wallet.lockups, wallet.staked)?;
        wallet.last_updated = now;

        Ok(UnstakeOutcome {
            wallet: wallet.clone(),
            expired,
        })
    }

    pub fn governance_stake(
        &mut self,
        id: &str,
        amount: Amount,
        vote_weight_unit: Amount,
        now: DateTime<Utc>,
    ) -> Result<Wallet> {
        ensure_positive(amount)?;
        let wallet = self.require_mut(id)?;
        let available = wallet.available()?;
        if amount > available {
            return Err(LedgerError::InsufficientAvailableBalance {
                wallet: id.to_string(),
                available,
                requested: amount,
            });
        }
        wallet.governance_staked = checked_add(wallet.governance_staked, amount)?;
        wallet.vote_weight = checked_div(wallet.governance_staked, vote_weight_unit)?;
        wallet.last_updated = now;
        Ok(wallet.clone())
    }

    pub fn governance_unstake(
        &mut self,
        id: &str,
        amount: Amount,
        vote_weight_unit: Amount,
        now: DateTime<Utc>,
    ) -> Result<Wallet> {
        ensure_positive(amount)?;
        let wallet = self.require_mut(id)?;
        if amount > wallet.governance_staked {
            return Err(LedgerError::InsufficientStakedBalance {
                wallet: id.to_string(),
                staked: wallet.governance_staked,
                requested: amount,
            });
        }
        wallet.governance_staked = checked_sub(wallet.governance_staked, amount)?;
        wallet.vote_weight = checked_div(wallet.governance_staked, vote_weight_unit)?;
        wallet.last_updated = now;
        Ok(wallet.clone())
    }

    /// Sum of all balances.
    pub fn circulating(&self) -> Result<Amount> {
        checked_sum(self.wallets.values().map(|w| w.balance))
    }

    pub fn total_staked(&self) -> Result<Amount> {
        checked_sum(self.wallets.values().map(|w| w.staked))
    }

    pub fn total_governance_staked(&self) -> Result<Amount> {
        checked_sum(self.wallets.values().map(|w| w.governance_staked))
    }

    /// Every wallet satisfies its balance invariant and circulation is within the cap.
    pub fn check_invariants(&self, total_supply: Amount) -> Result<()> {
        for wallet in self.wallets.values() {
            wallet.check_invariant()?;
        }
        let circulating = self.circulating()?;
        if circulating > total_supply {
            return Err(LedgerError::IntegrityMismatch(format!(
                "circulating supply {} exceeds cap {}",
                circulating, total_supply
            )));
        }
        Ok(())
    }
}

fn trim_lockups(lockups: &mut Vec<Lockup>, staked: Amount) -> Result<()> {
    lockups.sort_by(|a, b| a.unlock_time.cmp(&b.unlock_time));
    let mut excess = checked_sub(checked_sum(lockups.iter().map(|l| l.amount))?, staked)?;
    while excess > ZERO {
        let Some(latest) = lockups.last_mut() else {
            break;
        };
        if latest.amount <= excess {
            excess = checked_sub(excess, latest.amount)?;
            lockups.pop();
        } else {
            latest.amount = checked_sub(latest.amount, excess)?;
            excess = ZERO;
        }
    }
    Ok(())
}
