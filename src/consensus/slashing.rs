use crate::state::ChainState;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Detected misbehavior kinds.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Misbehavior {
    InvalidHash,
    DoublePropose,
    Other(String),
}

impl From<&str> for Misbehavior {
    fn from(s: &str) -> Self {
        match s {
            "invalid_hash" => Misbehavior::InvalidHash,
            "double_propose" => Misbehavior::DoublePropose,
            other => Misbehavior::Other(other.to_string()),
        }
    }
}

impl From<String> for Misbehavior {
    fn from(s: String) -> Self {
        Misbehavior::from(s.as_str())
    }
}

impl From<Misbehavior> for String {
    fn from(m: Misbehavior) -> Self {
        m.to_string()
    }
}

impl fmt::Display for Misbehavior {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Misbehavior::InvalidHash => f.write_str("invalid_hash"),
            Misbehavior::DoublePropose => f.write_str("double_propose"),
            Misbehavior::Other(s) => f.write_str(s),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SlashingConfig {
    #[serde(default = "default_slash_enabled")]
    pub enabled: bool,
    #[serde(default = "default_invalid_hash_fraction")]
    pub invalid_hash_fraction: f64,
    #[serde(default = "default_double_propose_fraction")]
    pub double_propose_fraction: f64,
}

fn default_slash_enabled() -> bool {
    true
}

fn default_invalid_hash_fraction() -> f64 {
    0.05
}

fn default_double_propose_fraction() -> f64 {
    0.10
}

impl Default for SlashingConfig {
    fn default() -> Self {
        Self {
            enabled: default_slash_enabled(),
            invalid_hash_fraction: default_invalid_hash_fraction(),
            double_propose_fraction: default_double_propose_fraction(),
        }
    }
}

impl SlashingConfig {
    /// Penalty fraction for `kind`; unknown kinds cost nothing.
    pub fn fraction(&self, kind: &Misbehavior) -> f64 {
        if !self.enabled {
            return 0.0;
        }
        match kind {
            Misbehavior::InvalidHash => self.invalid_hash_fraction,
            Misbehavior::DoublePropose => self.double_propose_fraction,
            Misbehavior::Other(_) => 0.0,
        }
    }
}

/// Fraction for `kind` under the default table.
pub fn slash_fraction(kind: &str) -> f64 {
    SlashingConfig::default().fraction(&Misbehavior::from(kind))
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SlashRecord {
    pub node_id: String,
    pub misbehavior: Misbehavior,
    pub fraction: f64,
    pub penalty: f64,
}

/// Slash `node_id` for `kind` and log the record in `state`.
/// Returns `None` when the policy assigns no penalty.
pub fn slash(
    state: &mut ChainState,
    node_id: &str,
    kind: Misbehavior,
    config: &SlashingConfig,
) -> Option<SlashRecord> {
    let fraction = config.fraction(&kind);
    if fraction <= 0.0 {
        return None;
    }
    let penalty = state.apply_slash(node_id, fraction);
    let record = SlashRecord {
        node_id: node_id.to_string(),
        misbehavior: kind,
        fraction,
        penalty,
    };
    tracing::warn!(
        node = %record.node_id,
        misbehavior = %record.misbehavior,
        penalty = record.penalty,
        "node slashed"
    );
    state.records.push(record.clone());
    Some(record)
}

/// Double-proposal detector: one block hash per (round, proposer).
#[derive(Debug, Default)]
pub struct ProposalTracker {
    seen: HashMap<(u64, String), String>,
}

impl ProposalTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a proposal. Returns `Some(DoublePropose)` when the proposer already
    /// submitted a different hash this round; the first hash stays on record.
    pub fn record(&mut self, round: u64, proposer: &str, block_hash: &str) -> Option<Misbehavior> {
        let key = (round, proposer.to_string());
        match self.seen.get(&key) {
            Some(existing) if existing != block_hash => Some(Misbehavior::DoublePropose),
            Some(_) => None,
            None => {
                self.seen.insert(key, block_hash.to_string());
                None
            }
        }
    }

    /// Forget rounds older than `keep_from`.
    pub fn prune(&mut self, keep_from: u64) {
        self.seen.retain(|(round, _), _| *round >= keep_from);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fraction_table() {
        assert_eq!(slash_fraction("invalid_hash"), 0.05);
        assert_eq!(slash_fraction("double_propose"), 0.10);
        assert_eq!(slash_fraction("late_vote"), 0.0);
    }

    #[test]
    fn disabled_config_is_noop() {
        let cfg = SlashingConfig {
            enabled: false,
            ..SlashingConfig::default()
        };
        let mut state = ChainState::new();
        state.set_stake("n1", 100.0);
        assert!(slash(&mut state, "n1", Misbehavior::InvalidHash, &cfg).is_none());
        assert_eq!(state.get_stake("n1"), 100.0);
    }

    #[test]
    fn slash_records_history() {
        let cfg = SlashingConfig::default();
        let mut state = ChainState::new();
        state.set_stake("n1", 100.0);
        let rec = slash(&mut state, "n1", Misbehavior::InvalidHash, &cfg).unwrap();
        assert_eq!(rec.penalty, 5.0);
        assert_eq!(state.get_stake("n1"), 95.0);
        assert_eq!(state.records.len(), 1);
        assert!(slash(&mut state, "n1", "unknown".into(), &cfg).is_none());
        assert_eq!(state.records.len(), 1);
    }

    #[test]
    fn detect_double_propose() {
        let mut t = ProposalTracker::new();
        assert!(t.record(3, "n1", "aa").is_none());
        assert!(t.record(3, "n1", "aa").is_none());
        assert_eq!(t.record(3, "n1", "bb"), Some(Misbehavior::DoublePropose));
        // A new round is a fresh slate.
        assert!(t.record(4, "n1", "bb").is_none());
        t.prune(4);
        assert!(t.record(3, "n1", "cc").is_none());
    }

    #[test]
    fn misbehavior_serializes_as_string() {
        let json = serde_json::to_string(&Misbehavior::DoublePropose).unwrap();
        assert_eq!(json, "\"double_propose\"");
        let back: Misbehavior = serde_json::from_str("\"invalid_hash\"").unwrap();
        assert_eq!(back, Misbehavior::InvalidHash);
    }
}
