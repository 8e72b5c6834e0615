/// Transaction types for MeshCredit
use crate::amount::Amount;
use crate::error::{LedgerError, Result};
use crate::hashing::Sha256Hash;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

/// Maximum transaction size in bytes (16KB)
pub const MAX_TRANSACTION_SIZE: usize = 16_000;

/// Sender of issuance transactions (mint, yield, block reward).
pub const ISSUER: &str = "mesh_issuer";
/// Recipient of burned credits.
pub const BURN_SINK: &str = "mesh_burn";

/// Accepted reasons for minting new credits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MintReason {
    Genesis,
    DepositExternalValue,
    WalletGrant,
    GameReward,
    Achievement,
    TournamentPrize,
    Referral,
    AdminGrant,
}

impl MintReason {
    pub const ALL: [MintReason; 8] = [
        MintReason::Genesis,
        MintReason::DepositExternalValue,
        MintReason::WalletGrant,
        MintReason::GameReward,
        MintReason::Achievement,
        MintReason::TournamentPrize,
        MintReason::Referral,
        MintReason::AdminGrant,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MintReason::Genesis => "genesis",
            MintReason::DepositExternalValue => "deposit_external_value",
            MintReason::WalletGrant => "wallet_grant",
            MintReason::GameReward => "game_reward",
            MintReason::Achievement => "achievement",
            MintReason::TournamentPrize => "tournament_prize",
            MintReason::Referral => "referral",
            MintReason::AdminGrant => "admin_grant",
        }
    }

    /// External deposits are backed one-to-one and never promotionally boosted.
    pub fn is_boostable(&self) -> bool {
        !matches!(self, MintReason::DepositExternalValue | MintReason::Genesis)
    }
}

impl FromStr for MintReason {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self> {
        MintReason::ALL
            .iter()
            .find(|r| r.as_str() == s)
            .copied()
            .ok_or_else(|| LedgerError::UnknownTransactionReason(s.to_string()))
    }
}

impl fmt::Display for MintReason {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Mint { reason: MintReason },
    Transfer,
    Burn { reason: String },
    Stake { lockup_days: u32 },
    Unstake,
    GovernanceStake,
    GovernanceUnstake,
    Yield { epoch: u64 },
    BlockReward { height: u64 },
}

impl TransactionKind {
    pub fn tag(&self) -> &'static str {
        match self {
            TransactionKind::Mint { .. } => "mint",
            TransactionKind::Transfer => "transfer",
            TransactionKind::Burn { .. } => "burn",
            TransactionKind::Stake { .. } => "stake",
            TransactionKind::Unstake => "unstake",
            TransactionKind::GovernanceStake => "governance_stake",
            TransactionKind::GovernanceUnstake => "governance_unstake",
            TransactionKind::Yield { .. } => "yield",
            TransactionKind::BlockReward { .. } => "block_reward",
        }
    }

    fn detail(&self) -> String {
        match self {
            TransactionKind::Mint { reason } => reason.as_str().to_string(),
            TransactionKind::Burn { reason } => reason.clone(),
            TransactionKind::Stake { lockup_days } => lockup_days.to_string(),
            TransactionKind::Yield { epoch } => epoch.to_string(),
            TransactionKind::BlockReward { height } => height.to_string(),
            _ => String::new(),
        }
    }

    /// Whether this kind brings new credits into circulation.
    pub fn is_issuance(&self) -> bool {
        matches!(
            self,
            TransactionKind::Mint { .. } | TransactionKind::Yield { .. } | TransactionKind::BlockReward { .. }
        )
    }

    pub fn is_retirement(&self) -> bool {
        matches!(self, TransactionKind::Burn { .. })
    }
}

/// One ledger mutation. Immutable once recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub sender: String,
    pub recipient: String,
    pub amount: Amount,
    pub kind: TransactionKind,
    /// Unix milliseconds
    pub timestamp: u64,
    /// Requested amount before a promotional multiplier, when one applied.
    #[serde(default)]
    pub original_amount: Option<Amount>,
    #[serde(default)]
    pub memo: Option<String>,
}

fn hash_str(hasher: &mut Sha256, s: &str) {
    hasher.update((s.len() as u64).to_le_bytes());
    hasher.update(s.as_bytes());
}

impl Transaction {
    pub fn new(sender: &str, recipient: &str, amount: Amount, kind: TransactionKind, timestamp: u64) -> Self {
        Transaction {
            sender: sender.to_string(),
            recipient: recipient.to_string(),
            amount,
            kind,
            timestamp,
            original_amount: None,
            memo: None,
        }
    }

    pub fn with_original_amount(mut self, original: Amount) -> Self {
        self.original_amount = Some(original);
        self
    }

    pub fn with_memo(mut self, memo: impl Into<String>) -> Self {
        self.memo = Some(memo.into());
        self
    }

    /// Calculate the hash of this transaction
    pub fn hash(&self) -> Sha256Hash {
        let mut hasher = Sha256::new();
        hash_str(&mut hasher, self.kind.tag());
        hash_str(&mut hasher, &self.kind.detail());
        hash_str(&mut hasher, &self.sender);
        hash_str(&mut hasher, &self.recipient);
        hasher.update(self.amount.to_le_bytes());
        hasher.update(self.timestamp.to_le_bytes());
        match self.original_amount {
            Some(original) => {
                hasher.update([1u8]);
                hasher.update(original.to_le_bytes());
            }
            None => hasher.update([0u8]),
        }
        match &self.memo {
            Some(memo) => {
                hasher.update([1u8]);
                hash_str(&mut hasher, memo);
            }
            None => hasher.update([0u8]),
        }
        hasher.finalize().into()
    }

    pub fn hash_str(&self) -> String {
        hex::encode(self.hash())
    }

    /// Validate transaction size to keep blocks bounded
    pub fn validate_size(&self) -> Result<()> {
        let serialized = bincode::serialize(self)?;
        if serialized.len() > MAX_TRANSACTION_SIZE {
            return Err(LedgerError::InvalidAmount(format!(
                "transaction too large: {} bytes (max: {})",
                serialized.len(),
                MAX_TRANSACTION_SIZE
            )));
        }
        Ok(())
    }

    /// Net change in circulating supply caused by this transaction.
    pub fn supply_delta(&self) -> (Amount, Amount) {
        if self.kind.is_issuance() {
            (self.amount, Amount::ZERO)
        } else if self.kind.is_retirement() {
            (Amount::ZERO, self.amount)
        } else {
            (Amount::ZERO, Amount::ZERO)
        }
    }
}
