use crate::consensus::slashing::SlashRecord;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Stake registry used for consensus weighting.
///
/// Mirrors each wallet's staked amount and keeps cumulative slashing totals.
/// Wallets remain the source of truth; the coordinator re-syncs this view
/// whenever a staked amount changes.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ChainState {
    stakes: BTreeMap<String, f64>,
    slashed: BTreeMap<String, f64>,
    /// Slashing history, oldest first.
    pub records: Vec<SlashRecord>,
}

impl ChainState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_stake(&mut self, node_id: &str, amount: f64) {
        self.stakes.insert(node_id.to_string(), amount.max(0.0));
    }

    pub fn get_stake(&self, node_id: &str) -> f64 {
        self.stakes.get(node_id).copied().unwrap_or(0.0)
    }

    pub fn total_stake(&self) -> f64 {
        self.stakes.values().sum()
    }

    /// Lifetime amount slashed from `node_id`.
    pub fn total_slashed(&self, node_id: &str) -> f64 {
        self.slashed.get(node_id).copied().unwrap_or(0.0)
    }

    /// Remove `fraction` (clamped to `[0, 1]`) of the node's stake.
    /// Returns the penalty taken.
    pub fn apply_slash(&mut self, node_id: &str, fraction: f64) -> f64 {
        let fraction = if fraction.is_nan() {
            0.0
        } else {
            fraction.clamp(0.0, 1.0)
        };
        let before = self.get_stake(node_id);
        let penalty = before * fraction;
        let after = (before - penalty).max(0.0);
        self.stakes.insert(node_id.to_string(), after);
        *self.slashed.entry(node_id.to_string()).or_insert(0.0) += penalty;
        penalty
    }
}
