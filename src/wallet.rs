// Wallets, stake lockups and the in-memory wallet store.

pub mod store;
pub mod types;

pub use store::{UnstakeOutcome, WalletStore};
pub use types::{Lockup, Wallet};
