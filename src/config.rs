use crate::consensus::SlashingConfig;
use crate::contracts::Contract;
use crate::error::{ChainError, Result};
use crate::policy::PolicyConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ChainConfig {
    #[serde(default)]
    pub chain: ChainParams,
    #[serde(default)]
    pub auction: AuctionConfig,
    #[serde(default)]
    pub slashing: SlashingConfig,
    #[serde(default)]
    pub policy: PolicyConfig,
    #[serde(default)]
    pub scorer: ScorerConfig,
    #[serde(default)]
    pub contracts: Vec<Contract>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChainParams {
    #[serde(default = "default_num_nodes")]
    pub num_nodes: usize,
    #[serde(default = "default_rounds")]
    pub rounds: u64,
    #[serde(default = "default_initial_balance")]
    pub initial_balance: f64,
    #[serde(default = "default_initial_stake")]
    pub initial_stake: f64,
    #[serde(default = "default_train_steps")]
    pub train_steps: usize,
    #[serde(default = "default_round_time_ms")]
    pub round_time_ms: u64,
    #[serde(default = "default_base_reward")]
    pub base_reward: f64,
    /// Committee size; `None` commits over every node.
    #[serde(default)]
    pub committee_size: Option<usize>,
    #[serde(default = "default_dp_sigma")]
    pub dp_sigma: f64,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default)]
    pub genesis_file: Option<PathBuf>,
    /// Seed for committee sampling, auction jitter and noise; `None` uses entropy.
    #[serde(default)]
    pub seed: Option<u64>,
}

fn default_num_nodes() -> usize {
    3
}

fn default_rounds() -> u64 {
    5
}

fn default_initial_balance() -> f64 {
    10.0
}

fn default_initial_stake() -> f64 {
    5.0
}

fn default_train_steps() -> usize {
    20
}

fn default_round_time_ms() -> u64 {
    2_000
}

fn default_base_reward() -> f64 {
    1.0
}

fn default_dp_sigma() -> f64 {
    1e-3
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data/chain")
}

impl Default for ChainParams {
    fn default() -> Self {
        Self {
            num_nodes: default_num_nodes(),
            rounds: default_rounds(),
            initial_balance: default_initial_balance(),
            initial_stake: default_initial_stake(),
            train_steps: default_train_steps(),
            round_time_ms: default_round_time_ms(),
            base_reward: default_base_reward(),
            committee_size: None,
            dp_sigma: default_dp_sigma(),
            data_dir: default_data_dir(),
            genesis_file: None,
            seed: None,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuctionConfig {
    #[serde(default = "default_auction_reward")]
    pub base_reward: f64,
}

fn default_auction_reward() -> f64 {
    0.5
}

impl Default for AuctionConfig {
    fn default() -> Self {
        Self {
            base_reward: default_auction_reward(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ScorerConfig {
    #[serde(default = "default_components")]
    pub components: Vec<String>,
    #[serde(default = "default_width")]
    pub width: usize,
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f32,
}

fn default_components() -> Vec<String> {
    vec!["dense".to_string()]
}

fn default_width() -> usize {
    16
}

fn default_learning_rate() -> f32 {
    0.05
}

impl Default for ScorerConfig {
    fn default() -> Self {
        Self {
            components: default_components(),
            width: default_width(),
            learning_rate: default_learning_rate(),
        }
    }
}

impl ChainConfig {
    pub fn from_toml_str(src: &str) -> Result<Self> {
        let cfg: ChainConfig = toml::from_str(src).map_err(|e| ChainError::Config(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let src = fs::read_to_string(path)?;
        Self::from_toml_str(&src)
    }

    /// Size of the committee for a population of `n` proposals.
    pub fn committee_size_for(&self, n: usize) -> usize {
        self.chain.committee_size.unwrap_or(n).min(n)
    }

    pub fn validate(&self) -> Result<()> {
        let c = &self.chain;
        if c.num_nodes == 0 {
            return Err(ChainError::Config("num_nodes must be at least 1".into()));
        }
        if c.committee_size == Some(0) {
            return Err(ChainError::Config("committee_size must be at least 1".into()));
        }
        let non_negative = [
            ("initial_balance", c.initial_balance),
            ("initial_stake", c.initial_stake),
            ("base_reward", c.base_reward),
            ("dp_sigma", c.dp_sigma),
            ("auction.base_reward", self.auction.base_reward),
            ("policy.max_transfer", self.policy.max_transfer),
        ];
        for (name, v) in non_negative {
            if !v.is_finite() || v < 0.0 {
                return Err(ChainError::Config(format!("{} must be a non-negative number", name)));
            }
        }
        for (name, v) in [
            ("slashing.invalid_hash_fraction", self.slashing.invalid_hash_fraction),
            ("slashing.double_propose_fraction", self.slashing.double_propose_fraction),
        ] {
            if !(0.0..=1.0).contains(&v) {
                return Err(ChainError::Config(format!("{} must be within [0, 1]", name)));
            }
        }
        if self.scorer.components.is_empty() {
            return Err(ChainError::Config("scorer.components must not be empty".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let cfg = ChainConfig::from_toml_str("").unwrap();
        assert_eq!(cfg.chain.num_nodes, 3);
        assert_eq!(cfg.chain.base_reward, 1.0);
        assert_eq!(cfg.auction.base_reward, 0.5);
        assert_eq!(cfg.slashing.invalid_hash_fraction, 0.05);
        assert_eq!(cfg.committee_size_for(3), 3);
        assert!(cfg.contracts.is_empty());
    }

    #[test]
    fn sections_override_defaults() {
        let cfg = ChainConfig::from_toml_str(
            r#"
            [chain]
            num_nodes = 5
            committee_size = 3
            seed = 17

            [slashing]
            double_propose_fraction = 0.2

            [[contracts]]
            kind = "transfer_if"
            params = { metric = "stake", threshold = 1.0, amount = 0.5, from = "a", to = "b" }
            "#,
        )
        .unwrap();
        assert_eq!(cfg.chain.num_nodes, 5);
        assert_eq!(cfg.committee_size_for(5), 3);
        assert_eq!(cfg.committee_size_for(2), 2);
        assert_eq!(cfg.chain.seed, Some(17));
        assert_eq!(cfg.slashing.double_propose_fraction, 0.2);
        assert_eq!(cfg.slashing.invalid_hash_fraction, 0.05);
        assert_eq!(cfg.contracts.len(), 1);
    }

    #[test]
    fn rejects_bad_values() {
        assert!(ChainConfig::from_toml_str("[chain]\nnum_nodes = 0").is_err());
        assert!(ChainConfig::from_toml_str("[chain]\ncommittee_size = 0").is_err());
        assert!(ChainConfig::from_toml_str("[chain]\nbase_reward = -1.0").is_err());
        assert!(ChainConfig::from_toml_str("[slashing]\ninvalid_hash_fraction = 1.5").is_err());
        assert!(ChainConfig::from_toml_str("[chain\n").is_err());
    }
}
