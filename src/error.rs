//! Error types for MeshCredit

use thiserror::Error;

use crate::amount::Amount;

#[derive(Debug, Clone, Error)]
pub enum LedgerError {
    #[error("minting {requested} would exceed the supply cap ({circulating} of {total_supply} in circulation)")]
    SupplyCapExceeded {
        requested: Amount,
        circulating: Amount,
        total_supply: Amount,
    },
    #[error("wallet {wallet} has {available} available, {requested} requested")]
    InsufficientAvailableBalance {
        wallet: String,
        available: Amount,
        requested: Amount,
    },
    #[error("wallet {wallet} has {staked} staked, {requested} requested")]
    InsufficientStakedBalance {
        wallet: String,
        staked: Amount,
        requested: Amount,
    },
    #[error("unknown wallet: {0}")]
    UnknownWallet(String),
    #[error("unknown transaction reason: {0}")]
    UnknownTransactionReason(String),
    #[error("invalid risk tier: {0}")]
    InvalidRiskTier(String),
    #[error("integrity mismatch: {0}")]
    IntegrityMismatch(String),
    #[error("reserve {reserve} does not back {circulating} credits at ratio {ratio}")]
    ReserveUnderBacked {
        reserve: Amount,
        circulating: Amount,
        ratio: Amount,
    },
    #[error("no nonce met difficulty {difficulty} within {attempts} attempts")]
    SealFailed { difficulty: u32, attempts: u64 },
    #[error("epoch not elapsed, next epoch opens at {next_epoch_at}")]
    EpochNotElapsed { next_epoch_at: String },
    #[error("invalid amount: {0}")]
    InvalidAmount(String),
    #[error("amount overflow: {0}")]
    AmountOverflow(String),
    #[error("wallet already exists: {0}")]
    WalletExists(String),
    #[error("invalid item: {0}")]
    InvalidItem(String),
    #[error("invalid promotion: {0}")]
    InvalidPromotion(String),
    #[error("database error: {0}")]
    Database(String),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("IO error: {0}")]
    Io(String),
    #[error("configuration error: {0}")]
    Config(String),
}

impl LedgerError {
    /// Stable kind name, printed by the CLI next to the message.
    pub fn kind(&self) -> &'static str {
        match self {
            LedgerError::SupplyCapExceeded { .. } => "SupplyCapExceeded",
            LedgerError::InsufficientAvailableBalance { .. } => "InsufficientAvailableBalance",
            LedgerError::InsufficientStakedBalance { .. } => "InsufficientStakedBalance",
            LedgerError::UnknownWallet(_) => "UnknownWallet",
            LedgerError::UnknownTransactionReason(_) => "UnknownTransactionReason",
            LedgerError::InvalidRiskTier(_) => "InvalidRiskTier",
            LedgerError::IntegrityMismatch(_) => "IntegrityMismatch",
            LedgerError::ReserveUnderBacked { .. } => "ReserveUnderBacked",
            LedgerError::SealFailed { .. } => "SealFailed",
            LedgerError::EpochNotElapsed { .. } => "EpochNotElapsed",
            LedgerError::InvalidAmount(_) => "InvalidAmount",
            LedgerError::AmountOverflow(_) => "AmountOverflow",
            LedgerError::WalletExists(_) => "WalletExists",
            LedgerError::InvalidItem(_) => "InvalidItem",
            LedgerError::InvalidPromotion(_) => "InvalidPromotion",
            LedgerError::Database(_) => "Database",
            LedgerError::Serialization(_) => "Serialization",
            LedgerError::Io(_) => "Io",
            LedgerError::Config(_) => "Config",
        }
    }
}

impl From<std::io::Error> for LedgerError {
    fn from(err: std::io::Error) -> Self {
        LedgerError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for LedgerError {
    fn from(err: serde_json::Error) -> Self {
        LedgerError::Serialization(err.to_string())
    }
}

impl From<Box<bincode::ErrorKind>> for LedgerError {
    fn from(err: Box<bincode::ErrorKind>) -> Self {
        LedgerError::Serialization(err.to_string())
    }
}

impl From<rusqlite::Error> for LedgerError {
    fn from(err: rusqlite::Error) -> Self {
        LedgerError::Database(err.to_string())
    }
}

impl From<toml::de::Error> for LedgerError {
    fn from(err: toml::de::Error) -> Self {
        LedgerError::Config(err.to_string())
    }
}

/// Convenience alias used across the crate
pub type Result<T> = std::result::Result<T, LedgerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_matches_variant() {
        let err = LedgerError::UnknownWallet("alice".to_string());
        assert_eq!(err.kind(), "UnknownWallet");
        assert_eq!(err.to_string(), "unknown wallet: alice");

        let err = LedgerError::SealFailed { difficulty: 20, attempts: 10 };
        assert_eq!(err.kind(), "SealFailed");
        assert!(err.to_string().contains("difficulty 20"));
    }
}
