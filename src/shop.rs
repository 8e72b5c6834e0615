//! Burn-for-item catalogue.

use crate::amount::{amount_from_f64, checked_mul, Amount};
use crate::error::{LedgerError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rarity {
    Common,
    Uncommon,
    Rare,
    Epic,
    Legendary,
}

impl Rarity {
    pub fn multiplier(&self) -> u32 {
        match self {
            Rarity::Common => 1,
            Rarity::Uncommon => 2,
            Rarity::Rare => 5,
            Rarity::Epic => 10,
            Rarity::Legendary => 25,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Rarity::Common => "common",
            Rarity::Uncommon => "uncommon",
            Rarity::Rare => "rare",
            Rarity::Epic => "epic",
            Rarity::Legendary => "legendary",
        }
    }
}

impl FromStr for Rarity {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "common" => Ok(Rarity::Common),
            "uncommon" => Ok(Rarity::Uncommon),
            "rare" => Ok(Rarity::Rare),
            "epic" => Ok(Rarity::Epic),
            "legendary" => Ok(Rarity::Legendary),
            other => Err(LedgerError::InvalidItem(format!("unknown rarity '{}'", other))),
        }
    }
}

impl fmt::Display for Rarity {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Base prices per item type, in credits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShopConfig {
    pub prices: BTreeMap<String, f64>,
}

impl Default for ShopConfig {
    fn default() -> Self {
        let prices = [
            ("cosmetic", 50.0),
            ("boost", 100.0),
            ("avatar", 75.0),
            ("emote", 25.0),
            ("bundle", 250.0),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();
        Self { prices }
    }
}

impl ShopConfig {
    pub fn validate(&self) -> Result<()> {
        match self.prices.iter().find(|(_, p)| !p.is_finite() || **p <= 0.0) {
            Some((item, price)) => Err(LedgerError::Config(format!(
                "shop price for '{}' must be positive, got {}",
                item, price
            ))),
            None => Ok(()),
        }
    }

    /// `price(item_type) × rarity multiplier`.
    pub fn price(&self, item_type: &str, rarity: Rarity) -> Result<Amount> {
        let base = self
            .prices
            .get(item_type)
            .ok_or_else(|| LedgerError::InvalidItem(format!("unknown item type '{}'", item_type)))?;
        checked_mul(amount_from_f64(*base)?, Amount::from_num(rarity.multiplier()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PurchaseReceipt {
    pub wallet: String,
    pub item_id: String,
    pub item_type: String,
    pub rarity: Rarity,
    pub price: Amount,
    pub purchased_at: DateTime<Utc>,
    pub transaction_hash: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_price_scales_with_rarity() {
        let shop = ShopConfig::default();
        assert_eq!(shop.price("cosmetic", Rarity::Common).unwrap(), Amount::from_num(50));
        assert_eq!(shop.price("emote", Rarity::Legendary).unwrap(), Amount::from_num(625));
        assert_eq!(shop.price("bundle", Rarity::Epic).unwrap(), Amount::from_num(2_500));
    }

    #[test]
    fn test_unknown_item_or_rarity() {
        let shop = ShopConfig::default();
        assert_eq!(shop.price("spaceship", Rarity::Rare).unwrap_err().kind(), "InvalidItem");
        assert_eq!("mythic".parse::<Rarity>().unwrap_err().kind(), "InvalidItem");
        assert_eq!("Epic".parse::<Rarity>().unwrap(), Rarity::Epic);
    }
}
