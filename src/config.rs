//! Configuration management for MeshCredit

use crate::amount::amount_from_f64;
use crate::error::{LedgerError, Result};
use crate::ledger::ChainParams;
use crate::proof::ResonanceConfig;
use crate::shop::ShopConfig;
use crate::yield_engine::YieldConfig;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Environment variable holding the hex-encoded authority secret.
pub const SECRET_ENV: &str = "MESH_LEDGER_SECRET";
/// Config file looked up in the working directory when none is given.
pub const DEFAULT_CONFIG_FILE: &str = "meshcredit.toml";

const KEY_FILE: &str = "authority.key";
const SECRET_LEN: usize = 32;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub ledger: LedgerConfig,
    #[serde(rename = "yield")]
    pub yield_config: YieldConfig,
    pub resonance: ResonanceConfig,
    pub storage: StorageConfig,
    pub shop: ShopConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenesisAllocation {
    pub wallet: String,
    pub amount: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerConfig {
    #[serde(default = "default_total_supply")]
    pub total_supply: f64,
    #[serde(default = "default_initial_reward")]
    pub initial_reward: f64,
    #[serde(default = "default_halving_interval")]
    pub halving_interval: u64,
    /// Leading zero bits required of a block hash
    #[serde(default = "default_difficulty")]
    pub difficulty: u32,
    #[serde(default = "default_max_nonce_attempts")]
    pub max_nonce_attempts: u64,
    #[serde(default = "default_minimum_gravity_threshold")]
    pub minimum_gravity_threshold: f64,
    /// Required `external_reserve / circulating`; 0 disables the check
    #[serde(default)]
    pub reserve_ratio: f64,
    #[serde(default = "default_credits_per_usd")]
    pub credits_per_usd: f64,
    #[serde(default = "default_vote_weight_unit")]
    pub vote_weight_unit: f64,
    /// Seal a block after every operation that adds a transaction
    #[serde(default)]
    pub auto_seal: bool,
    #[serde(default = "default_authority_id")]
    pub authority_id: String,
    #[serde(default = "default_authority_trust")]
    pub authority_trust: f64,
    #[serde(default)]
    pub genesis_allocations: Vec<GenesisAllocation>,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            total_supply: default_total_supply(),
            initial_reward: default_initial_reward(),
            halving_interval: default_halving_interval(),
            difficulty: default_difficulty(),
            max_nonce_attempts: default_max_nonce_attempts(),
            minimum_gravity_threshold: default_minimum_gravity_threshold(),
            reserve_ratio: 0.0,
            credits_per_usd: default_credits_per_usd(),
            vote_weight_unit: default_vote_weight_unit(),
            auto_seal: false,
            authority_id: default_authority_id(),
            authority_trust: default_authority_trust(),
            genesis_allocations: Vec::new(),
        }
    }
}

impl LedgerConfig {
    pub fn chain_params(&self) -> Result<ChainParams> {
        Ok(ChainParams {
            total_supply: amount_from_f64(self.total_supply)?,
            initial_reward: amount_from_f64(self.initial_reward)?,
            halving_interval: self.halving_interval,
            difficulty: self.difficulty,
            max_nonce_attempts: self.max_nonce_attempts,
            minimum_gravity_threshold: self.minimum_gravity_threshold,
            reserve_ratio: self.reserve_ratio,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default = "default_database_file")]
    pub database_file: String,
    #[serde(default = "default_cas_dir")]
    pub cas_dir: String,
    #[serde(default = "default_cas_cache")]
    pub cas_cache_capacity: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            database_file: default_database_file(),
            cas_dir: default_cas_dir(),
            cas_cache_capacity: default_cas_cache(),
        }
    }
}

impl StorageConfig {
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(&self.database_file)
    }

    pub fn cas_path(&self) -> PathBuf {
        self.data_dir.join(&self.cas_dir)
    }

    pub fn key_path(&self) -> PathBuf {
        self.data_dir.join(KEY_FILE)
    }
}

impl Config {
    /// Validate critical values
    pub fn validate(&self) -> Result<()> {
        let ledger = &self.ledger;
        if !(ledger.total_supply > 0.0) {
            return Err(LedgerError::Config("ledger.total_supply must be positive".to_string()));
        }
        if ledger.initial_reward < 0.0 || ledger.initial_reward > ledger.total_supply {
            return Err(LedgerError::Config(
                "ledger.initial_reward must be between 0 and total_supply".to_string(),
            ));
        }
        if ledger.halving_interval == 0 {
            return Err(LedgerError::Config("ledger.halving_interval must be at least 1".to_string()));
        }
        if ledger.difficulty > 255 {
            return Err(LedgerError::Config("ledger.difficulty cannot exceed 255 bits".to_string()));
        }
        if ledger.max_nonce_attempts == 0 {
            return Err(LedgerError::Config("ledger.max_nonce_attempts must be at least 1".to_string()));
        }
        if ledger.reserve_ratio < 0.0 || !ledger.reserve_ratio.is_finite() {
            return Err(LedgerError::Config("ledger.reserve_ratio must be non-negative".to_string()));
        }
        if !(ledger.credits_per_usd > 0.0) {
            return Err(LedgerError::Config("ledger.credits_per_usd must be positive".to_string()));
        }
        if !(ledger.vote_weight_unit > 0.0) {
            return Err(LedgerError::Config("ledger.vote_weight_unit must be positive".to_string()));
        }
        if !ledger.minimum_gravity_threshold.is_finite() || !ledger.authority_trust.is_finite() {
            return Err(LedgerError::Config(
                "ledger.minimum_gravity_threshold and ledger.authority_trust must be finite".to_string(),
            ));
        }
        if ledger.authority_id.is_empty() {
            return Err(LedgerError::Config("ledger.authority_id must be set".to_string()));
        }
        if let Some(alloc) = ledger.genesis_allocations.iter().find(|a| !(a.amount > 0.0) || a.wallet.is_empty()) {
            return Err(LedgerError::Config(format!(
                "genesis allocation for '{}' must name a wallet and a positive amount",
                alloc.wallet
            )));
        }
        ledger.chain_params()?;
        self.resonance.validate()?;
        self.yield_config.validate()?;
        self.shop.validate()?;
        if self.storage.database_file.is_empty() {
            return Err(LedgerError::Config("storage.database_file must be set".to_string()));
        }
        Ok(())
    }
}

/// Load configuration from `path`, or from `meshcredit.toml` in the working
/// directory, falling back to defaults when neither exists.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let path = match path {
        Some(p) => {
            if !p.exists() {
                return Err(LedgerError::Config(format!("config file {} not found", p.display())));
            }
            Some(p.to_path_buf())
        }
        None => Some(PathBuf::from(DEFAULT_CONFIG_FILE)).filter(|p| p.exists()),
    };

    let config: Config = match path {
        Some(p) => {
            let config_str = fs::read_to_string(&p)?;
            toml::from_str(&config_str)?
        }
        // Provide sane defaults when no config file is present
        None => Config::default(),
    };

    config.validate()?;
    Ok(config)
}

/// The HMAC key that signs proofs.
///
/// Read from `MESH_LEDGER_SECRET` (hex) if set, else from the key file in
/// the data directory, which is generated on first use.
pub fn load_authority_secret(storage: &StorageConfig) -> Result<Vec<u8>> {
    if let Ok(value) = std::env::var(SECRET_ENV) {
        let secret = hex::decode(value.trim())
            .map_err(|e| LedgerError::Config(format!("{} is not valid hex: {}", SECRET_ENV, e)))?;
        if secret.is_empty() {
            return Err(LedgerError::Config(format!("{} is empty", SECRET_ENV)));
        }
        return Ok(secret);
    }

    let key_path = storage.key_path();
    if key_path.exists() {
        let contents = fs::read_to_string(&key_path)?;
        return hex::decode(contents.trim())
            .map_err(|e| LedgerError::Config(format!("{} is not valid hex: {}", key_path.display(), e)));
    }

    fs::create_dir_all(&storage.data_dir)?;
    let mut secret = vec![0u8; SECRET_LEN];
    rand::thread_rng().fill_bytes(&mut secret);
    fs::write(&key_path, hex::encode(&secret))?;
    info!(path = %key_path.display(), "generated new authority key");
    Ok(secret)
}

fn default_total_supply() -> f64 {
    100_000_000.0
}

fn default_initial_reward() -> f64 {
    50.0
}

fn default_halving_interval() -> u64 {
    210_000
}

fn default_difficulty() -> u32 {
    8
}

fn default_max_nonce_attempts() -> u64 {
    5_000_000
}

fn default_minimum_gravity_threshold() -> f64 {
    0.5
}

fn default_credits_per_usd() -> f64 {
    100.0
}

fn default_vote_weight_unit() -> f64 {
    100.0
}

fn default_authority_id() -> String {
    "mesh_authority".to_string()
}

fn default_authority_trust() -> f64 {
    1.0
}

fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".meshcredit")
}

fn default_database_file() -> String {
    "ledger.db".to_string()
}

fn default_cas_dir() -> String {
    "cas".to_string()
}

fn default_cas_cache() -> usize {
    256
}
