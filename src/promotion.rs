//! Time-boxed flash sales that multiply minted amounts.

use crate::amount::{amount_from_f64, checked_sub, Amount, ZERO};
use crate::error::{LedgerError, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlashSale {
    pub active: bool,
    pub multiplier: f64,
    pub started_at: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub total_bonus_minted: Amount,
    pub transactions_boosted: u64,
}

impl Default for FlashSale {
    fn default() -> Self {
        Self {
            active: false,
            multiplier: 1.0,
            started_at: None,
            end_time: None,
            total_bonus_minted: ZERO,
            transactions_boosted: 0,
        }
    }
}

/// Audit record written when a sale starts or stops.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromotionRecord {
    pub action: String,
    pub at: DateTime<Utc>,
    pub multiplier: f64,
    pub started_at: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub total_bonus_minted: Amount,
    pub transactions_boosted: u64,
    /// Set when the sale ended because its window passed
    #[serde(default)]
    pub expired: bool,
}

/// Result of running an amount through the sale.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Boost {
    pub original: Amount,
    pub credited: Amount,
}

impl Boost {
    pub fn bonus(&self) -> Amount {
        self.credited.saturating_sub(self.original)
    }

    pub fn is_boosted(&self) -> bool {
        self.credited != self.original
    }
}

impl FlashSale {
    fn record(&self, action: &str, at: DateTime<Utc>, expired: bool) -> PromotionRecord {
        PromotionRecord {
            action: action.to_string(),
            at,
            multiplier: self.multiplier,
            started_at: self.started_at,
            end_time: self.end_time,
            total_bonus_minted: self.total_bonus_minted,
            transactions_boosted: self.transactions_boosted,
            expired,
        }
    }

    pub fn activate(&mut self, duration_hours: f64, multiplier: f64, now: DateTime<Utc>) -> Result<PromotionRecord> {
        if !multiplier.is_finite() || multiplier < 1.0 {
            return Err(LedgerError::InvalidPromotion(format!(
                "multiplier must be at least 1.0, got {}",
                multiplier
            )));
        }
        if !duration_hours.is_finite() || duration_hours <= 0.0 {
            return Err(LedgerError::InvalidPromotion(format!(
                "duration must be positive, got {}h",
                duration_hours
            )));
        }
        if self.is_active(now) {
            return Err(LedgerError::InvalidPromotion("a flash sale is already running".to_string()));
        }
        let millis = (duration_hours * 3_600_000.0).round() as i64;
        *self = FlashSale {
            active: true,
            multiplier,
            started_at: Some(now),
            end_time: Some(now + Duration::milliseconds(millis)),
            total_bonus_minted: ZERO,
            transactions_boosted: 0,
        };
        Ok(self.record("activated", now, false))
    }

    /// Stop the sale, reporting its totals.
    pub fn deactivate(&mut self, now: DateTime<Utc>) -> Result<PromotionRecord> {
        if !self.active {
            return Err(LedgerError::InvalidPromotion("no flash sale is running".to_string()));
        }
        let expired = self.end_time.is_some_and(|end| end <= now);
        self.active = false;
        Ok(self.record("deactivated", now, expired))
    }

    /// Whether the sale is in force at `now`, without changing state.
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.active && self.end_time.map_or(true, |end| now < end)
    }

    /// Close a sale whose window has passed, returning the closing record.
    pub fn expire_if_due(&mut self, now: DateTime<Utc>) -> Option<PromotionRecord> {
        if self.active && !self.is_active(now) {
            self.active = false;
            Some(self.record("deactivated", now, true))
        } else {
            None
        }
    }

    /// Apply the multiplier to a requested mint and track the bonus.
    pub fn apply(&mut self, requested: Amount, boostable: bool, now: DateTime<Utc>) -> Result<Boost> {
        if !boostable || !self.is_active(now) {
            return Ok(Boost {
                original: requested,
                credited: requested,
            });
        }
        // Saturates so an oversized boost is rejected by the supply cap, not as an overflow.
        let credited = requested.saturating_mul(amount_from_f64(self.multiplier)?);
        let bonus = checked_sub(credited, requested)?;
        self.total_bonus_minted = self.total_bonus_minted.saturating_add(bonus);
        self.transactions_boosted += 1;
        Ok(Boost {
            original: requested,
            credited,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        DateTime::from_timestamp_millis(1_672_531_200_000).unwrap()
    }

    #[test]
    fn test_doubles_boostable_mints() {
        let mut sale = FlashSale::default();
        sale.activate(1.0, 2.0, now()).unwrap();

        let boost = sale.apply(Amount::from_num(100), true, now()).unwrap();
        assert_eq!(boost.credited, Amount::from_num(200));
        assert_eq!(boost.bonus(), Amount::from_num(100));

        let plain = sale.apply(Amount::from_num(100), false, now()).unwrap();
        assert!(!plain.is_boosted());

        assert_eq!(sale.total_bonus_minted, Amount::from_num(100));
        assert_eq!(sale.transactions_boosted, 1);
    }

    #[test]
    fn test_auto_expiry() {
        let mut sale = FlashSale::default();
        sale.activate(2.0, 1.5, now()).unwrap();
        let later = now() + Duration::hours(3);
        assert!(!sale.is_active(later));

        let boost = sale.apply(Amount::from_num(10), true, later).unwrap();
        assert!(!boost.is_boosted());

        let record = sale.expire_if_due(later).unwrap();
        assert!(record.expired);
        assert!(!sale.active);
        assert!(sale.expire_if_due(later).is_none());
    }

    #[test]
    fn test_activation_validation() {
        let mut sale = FlashSale::default();
        assert!(sale.activate(1.0, 0.5, now()).is_err());
        assert!(sale.activate(0.0, 2.0, now()).is_err());
        sale.activate(1.0, 2.0, now()).unwrap();
        assert_eq!(sale.activate(1.0, 2.0, now()).unwrap_err().kind(), "InvalidPromotion");
    }

    #[test]
    fn test_deactivate_reports_totals() {
        let mut sale = FlashSale::default();
        sale.activate(1.0, 3.0, now()).unwrap();
        sale.apply(Amount::from_num(10), true, now()).unwrap();
        let record = sale.deactivate(now()).unwrap();
        assert_eq!(record.total_bonus_minted, Amount::from_num(20));
        assert_eq!(record.transactions_boosted, 1);
        assert!(!record.expired);
        assert!(sale.deactivate(now()).is_err());
    }
}
