//! Per-identity resonance weights.
//!
//! Every resonance-bearing event compounds the acting identity's
//! `resonance_factor` by `growth_rate^cycles`. Past the deep-proof threshold
//! an echo multiplier is applied on top and grows by a fixed increment each
//! time. Both are capped unless the ledger is configured as unbounded, in
//! which case they saturate at `f64::MAX` so every recorded weight stays finite.

use crate::error::{LedgerError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResonanceConfig {
    pub growth_rate: f64,
    pub time_growth_per_day: f64,
    pub deep_proof_threshold: u64,
    pub echo_increment: f64,
    pub initial_echo_multiplier: f64,
    pub max_resonance_factor: f64,
    pub max_echo_multiplier: f64,
    /// Disable both ceilings and let weights compound without limit.
    pub unbounded: bool,
}

impl Default for ResonanceConfig {
    fn default() -> Self {
        Self {
            growth_rate: 1.05,
            time_growth_per_day: 0.01,
            deep_proof_threshold: 10,
            echo_increment: 0.1,
            initial_echo_multiplier: 1.0,
            max_resonance_factor: 10.0,
            max_echo_multiplier: 5.0,
            unbounded: false,
        }
    }
}

impl ResonanceConfig {
    pub fn validate(&self) -> Result<()> {
        let finite = [
            ("growth_rate", self.growth_rate),
            ("time_growth_per_day", self.time_growth_per_day),
            ("echo_increment", self.echo_increment),
            ("initial_echo_multiplier", self.initial_echo_multiplier),
            ("max_resonance_factor", self.max_resonance_factor),
            ("max_echo_multiplier", self.max_echo_multiplier),
        ];
        if let Some((name, _)) = finite.iter().find(|(_, v)| !v.is_finite() || *v < 0.0) {
            return Err(LedgerError::Config(format!(
                "resonance.{} must be a finite, non-negative number",
                name
            )));
        }
        if self.growth_rate < 1.0 {
            return Err(LedgerError::Config("resonance.growth_rate must be at least 1".to_string()));
        }
        if self.max_resonance_factor < 1.0 {
            return Err(LedgerError::Config(
                "resonance.max_resonance_factor must be at least 1".to_string(),
            ));
        }
        if self.max_echo_multiplier < self.initial_echo_multiplier {
            return Err(LedgerError::Config(
                "resonance.max_echo_multiplier must not be below initial_echo_multiplier".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResonanceWeight {
    pub initial_weight: f64,
    pub resonance_factor: f64,
    pub echo_multiplier: f64,
    pub cycles_accumulated: u64,
    pub last_update: DateTime<Utc>,
}

/// What the caller asks resonance to be computed for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResonanceContext {
    pub identity: String,
    pub base_weight: f64,
    pub cycles: u64,
}

impl ResonanceContext {
    pub fn new(identity: impl Into<String>, base_weight: f64) -> Self {
        Self {
            identity: identity.into(),
            base_weight,
            cycles: 1,
        }
    }
}

/// Snapshot recorded in a proof's metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResonanceMetadata {
    pub identity: String,
    pub echo_strength: f64,
    pub resonance_factor: f64,
    pub echo_multiplier: f64,
    pub time_factor: f64,
    pub cycles_accumulated: u64,
    pub deep_proof: bool,
}

/// The lazily-populated weight table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResonanceTracker {
    config: ResonanceConfig,
    weights: BTreeMap<String, ResonanceWeight>,
}

impl ResonanceTracker {
    pub fn new(config: ResonanceConfig) -> Self {
        Self {
            config,
            weights: BTreeMap::new(),
        }
    }

    pub fn with_weights(config: ResonanceConfig, weights: BTreeMap<String, ResonanceWeight>) -> Self {
        Self { config, weights }
    }

    pub fn config(&self) -> &ResonanceConfig {
        &self.config
    }

    pub fn weight(&self, identity: &str) -> Option<&ResonanceWeight> {
        self.weights.get(identity)
    }

    pub fn weights(&self) -> &BTreeMap<String, ResonanceWeight> {
        &self.weights
    }

    /// Compound the identity's weight and return its echo strength.
    pub fn calculate_resonance(
        &mut self,
        identity: &str,
        base_weight: f64,
        cycles: u64,
        now: DateTime<Utc>,
    ) -> (f64, ResonanceMetadata) {
        let config = &self.config;
        let weight = self
            .weights
            .entry(identity.to_string())
            .or_insert_with(|| ResonanceWeight {
                initial_weight: base_weight,
                resonance_factor: 1.0,
                echo_multiplier: config.initial_echo_multiplier,
                cycles_accumulated: 0,
                last_update: now,
            });

        let exponent = i32::try_from(cycles).unwrap_or(i32::MAX);
        weight.resonance_factor = saturate(weight.resonance_factor * config.growth_rate.powi(exponent));
        if !config.unbounded {
            weight.resonance_factor = weight.resonance_factor.min(config.max_resonance_factor);
        }
        weight.cycles_accumulated = weight.cycles_accumulated.saturating_add(cycles);

        let elapsed_days = (now - weight.last_update).num_milliseconds().max(0) as f64 / 86_400_000.0;
        let time_factor = 1.0 + elapsed_days * config.time_growth_per_day;

        let mut echo_strength = saturate(weight.initial_weight * weight.resonance_factor * time_factor);
        let deep_proof = weight.cycles_accumulated >= config.deep_proof_threshold;
        if deep_proof {
            echo_strength = saturate(echo_strength * weight.echo_multiplier);
            weight.echo_multiplier = saturate(weight.echo_multiplier + config.echo_increment);
            if !config.unbounded {
                weight.echo_multiplier = weight.echo_multiplier.min(config.max_echo_multiplier);
            }
        }
        weight.last_update = now;

        let metadata = ResonanceMetadata {
            identity: identity.to_string(),
            echo_strength,
            resonance_factor: weight.resonance_factor,
            echo_multiplier: weight.echo_multiplier,
            time_factor,
            cycles_accumulated: weight.cycles_accumulated,
            deep_proof,
        };
        (echo_strength, metadata)
    }

    /// [`ResonanceTracker::calculate_resonance`] for a prepared context.
    pub fn resonate(&mut self, context: &ResonanceContext, now: DateTime<Utc>) -> ResonanceMetadata {
        self.calculate_resonance(&context.identity, context.base_weight, context.cycles, now)
            .1
    }
}

/// Clamp overflowed products to the largest finite weight.
fn saturate(value: f64) -> f64 {
    value.min(f64::MAX)
}
