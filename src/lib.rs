//! MeshCredit - a single-authority credit ledger
//!
//! Credits are minted, moved, staked and burned by one operator. Every
//! operation is sealed into a proof-of-work block chain with a halving
//! reward, notarized in an HMAC-signed proof chain and written to an
//! append-only event log, so an auditor holding the key can replay it.
//!
//! # Architecture
//!
//! ## Core Ledger
//! - [`ledger`] - Transactions, blocks, the sealed chain and the economy manifest
//! - [`wallet`] - Wallet balances, stakes and lockups
//! - [`service`] - [`MeshLedger`], the atomic operation layer
//!
//! ## Economics
//! - [`yield_engine`] - Tiered staking yield and epochs
//! - [`promotion`] - Flash-sale mint multipliers
//! - [`shop`] - Item pricing and purchases
//!
//! ## Integrity
//! - [`hashing`] - SHA-256, canonical JSON and HMAC helpers
//! - [`proof`] - Signed proof chain and resonance weighting
//! - [`audit`] - Content-addressed store, file seals and the event log
//!
//! ## State Management
//! - [`persistence`] - Database layer (SQLite)
//!
//! ## Configuration & Utilities
//! - [`amount`] - Fixed-point credit amounts
//! - [`clock`] - Injectable time source
//! - [`config`] - Configuration management
//! - [`error`] - Error types
//! - [`cli`] - CLI utilities

#![forbid(unsafe_code)]

// ============================================================================
// Core Ledger
// ============================================================================
pub mod ledger;
pub mod service;
pub mod wallet;

// ============================================================================
// Economics
// ============================================================================
pub mod promotion;
pub mod shop;
pub mod yield_engine;

// ============================================================================
// Integrity
// ============================================================================
pub mod audit;
pub mod hashing;
pub mod proof;

// ============================================================================
// State Management
// ============================================================================
pub mod persistence;

// ============================================================================
// Configuration & Utilities
// ============================================================================
pub mod amount;
pub mod cli;
pub mod clock;
pub mod config;
pub mod error;

pub use amount::Amount;
pub use config::Config;
pub use error::{LedgerError, Result};
pub use service::{MeshLedger, SharedLedger};
