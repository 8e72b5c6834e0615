use crate::amount::Amount;
use crate::error::Result;
use crate::wallet::WalletStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Running counters that cannot be derived from the wallet set alone.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SupplyCounters {
    /// External value deposited to back circulating credits
    pub external_reserve: Amount,
    pub mint_events: u64,
    pub burn_events: u64,
    pub epochs_completed: u64,
}

/// Aggregate view of the economy, recomputed after every mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EconomyManifest {
    pub total_supply: Amount,
    pub circulating_supply: Amount,
    pub staked_supply: Amount,
    pub governance_staked: Amount,
    pub external_reserve: Amount,
    pub mint_events: u64,
    pub burn_events: u64,
    pub epochs_completed: u64,
    pub block_height: u64,
    pub wallets: u64,
    pub updated_at: DateTime<Utc>,
}

impl EconomyManifest {
    pub fn derive(
        total_supply: Amount,
        wallets: &WalletStore,
        counters: &SupplyCounters,
        block_height: u64,
        updated_at: DateTime<Utc>,
    ) -> Result<Self> {
        Ok(EconomyManifest {
            total_supply,
            circulating_supply: wallets.circulating()?,
            staked_supply: wallets.total_staked()?,
            governance_staked: wallets.total_governance_staked()?,
            external_reserve: counters.external_reserve,
            mint_events: counters.mint_events,
            burn_events: counters.burn_events,
            epochs_completed: counters.epochs_completed,
            block_height,
            wallets: wallets.len() as u64,
            updated_at,
        })
    }

    pub fn remaining_supply(&self) -> Amount {
        self.total_supply.saturating_sub(self.circulating_supply)
    }
}
