use crate::amount::{checked_add, checked_sub, checked_sum, Amount, ZERO};
use crate::error::{LedgerError, Result};
use crate::hashing::{content_hash, Sha256Hash};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A stake commitment that is expected to stay in place until `unlock_time`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lockup {
    pub amount: Amount,
    pub unlock_time: DateTime<Utc>,
    pub duration_days: u32,
}

impl Lockup {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.unlock_time <= now
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wallet {
    pub id: String,
    pub balance: Amount,
    pub staked: Amount,
    pub governance_staked: Amount,
    #[serde(default)]
    pub lockups: Vec<Lockup>,
    /// `governance_staked / vote_weight_unit`
    pub vote_weight: Amount,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

impl Wallet {
    pub fn new(id: &str, now: DateTime<Utc>) -> Self {
        Wallet {
            id: id.to_string(),
            balance: ZERO,
            staked: ZERO,
            governance_staked: ZERO,
            lockups: Vec::new(),
            vote_weight: ZERO,
            created_at: now,
            last_updated: now,
        }
    }

    /// Spendable balance: everything not committed to either stake bucket.
    pub fn available(&self) -> Result<Amount> {
        checked_sub(self.balance, checked_add(self.staked, self.governance_staked)?)
    }

    pub fn locked_amount(&self) -> Result<Amount> {
        checked_sum(self.lockups.iter().map(|l| l.amount))
    }

    /// Longest lockup still in force, in days.
    pub fn best_active_lockup_days(&self, now: DateTime<Utc>) -> Option<u32> {
        self.lockups
            .iter()
            .filter(|l| !l.is_expired(now))
            .map(|l| l.duration_days)
            .max()
    }

    /// `balance >= staked + governance_staked`, and no bucket is negative.
    pub fn check_invariant(&self) -> Result<()> {
        if self.balance < ZERO || self.staked < ZERO || self.governance_staked < ZERO {
            return Err(LedgerError::IntegrityMismatch(format!(
                "wallet {} holds a negative bucket",
                self.id
            )));
        }
        if self.available()? < ZERO {
            return Err(LedgerError::IntegrityMismatch(format!(
                "wallet {} has {} balance but {} staked and {} in governance",
                self.id, self.balance, self.staked, self.governance_staked
            )));
        }
        Ok(())
    }

    pub fn content_hash(&self) -> Result<Sha256Hash> {
        content_hash(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn now() -> DateTime<Utc> {
        DateTime::from_timestamp_millis(1_672_531_200_000).unwrap()
    }

    #[test]
    fn test_available_excludes_both_buckets() {
        let mut wallet = Wallet::new("alice", now());
        wallet.balance = Amount::from_num(100);
        wallet.staked = Amount::from_num(30);
        wallet.governance_staked = Amount::from_num(20);
        assert_eq!(wallet.available().unwrap(), Amount::from_num(50));
        wallet.check_invariant().unwrap();

        wallet.staked = Amount::from_num(90);
        assert!(wallet.check_invariant().is_err());
    }

    #[test]
    fn test_best_active_lockup_ignores_expired() {
        let mut wallet = Wallet::new("alice", now());
        wallet.lockups.push(Lockup {
            amount: Amount::from_num(1),
            unlock_time: now() - Duration::days(1),
            duration_days: 365,
        });
        wallet.lockups.push(Lockup {
            amount: Amount::from_num(1),
            unlock_time: now() + Duration::days(30),
            duration_days: 90,
        });
        assert_eq!(wallet.best_active_lockup_days(now()), Some(90));
    }

    #[test]
    fn test_wallet_round_trip_rehashes_identically() {
        let mut wallet = Wallet::new("alice", now());
        wallet.balance = Amount::from_num(12.25);
        let json = serde_json::to_string(&wallet).unwrap();
        let restored: Wallet = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, wallet);
        assert_eq!(restored.content_hash().unwrap(), wallet.content_hash().unwrap());
    }
}
