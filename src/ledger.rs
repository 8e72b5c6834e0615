// Ledger core: transactions, sealed blocks, the chain and the economy manifest.

pub mod block;
pub mod chain;
pub mod manifest;
pub mod transaction;

pub use block::{Block, BlockHeader, GENESIS_TIMESTAMP};
pub use chain::{calculate_block_reward, clamped_block_reward, Chain, ChainParams, SealWeight};
pub use manifest::{EconomyManifest, SupplyCounters};
pub use transaction::{MintReason, Transaction, TransactionKind, BURN_SINK, ISSUER, MAX_TRANSACTION_SIZE};
