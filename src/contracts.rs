//! Declarative contracts evaluated against a round's metrics.
//!
//! Evaluation is pure: it only emits [`Action`]s. Applying them (after a policy
//! check) is the round coordinator's job.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ContractKind {
    MintIfMetric,
    TransferIf,
    /// Kept so configs with newer kinds still load; never emits anything.
    Unknown(String),
}

impl From<String> for ContractKind {
    fn from(s: String) -> Self {
        match s.as_str() {
            "mint_if_metric" => ContractKind::MintIfMetric,
            "transfer_if" => ContractKind::TransferIf,
            _ => ContractKind::Unknown(s),
        }
    }
}

impl From<ContractKind> for String {
    fn from(k: ContractKind) -> Self {
        k.to_string()
    }
}

impl fmt::Display for ContractKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContractKind::MintIfMetric => f.write_str("mint_if_metric"),
            ContractKind::TransferIf => f.write_str("transfer_if"),
            ContractKind::Unknown(s) => f.write_str(s),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ContractParams {
    #[serde(default)]
    pub metric: Option<String>,
    #[serde(default)]
    pub threshold: f64,
    #[serde(default)]
    pub amount: f64,
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default)]
    pub to: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Contract {
    pub kind: ContractKind,
    #[serde(default)]
    pub params: ContractParams,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ContractContext {
    pub metrics: BTreeMap<String, f64>,
    pub proposer: String,
}

impl ContractContext {
    pub fn new(proposer: impl Into<String>) -> Self {
        Self {
            metrics: BTreeMap::new(),
            proposer: proposer.into(),
        }
    }

    pub fn metric(mut self, name: impl Into<String>, value: f64) -> Self {
        self.metrics.insert(name.into(), value);
        self
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    Mint { to: String, amount: f64 },
    Transfer { from: String, to: String, amount: f64 },
}

impl Action {
    /// Name the policy collaborator is asked about.
    pub fn policy_name(&self) -> &'static str {
        match self {
            Action::Mint { .. } => "mint",
            Action::Transfer { .. } => "transfer_funds",
        }
    }

    pub fn amount(&self) -> f64 {
        match self {
            Action::Mint { amount, .. } | Action::Transfer { amount, .. } => *amount,
        }
    }
}

fn non_empty(s: &Option<String>) -> Option<&str> {
    s.as_deref().filter(|v| !v.is_empty())
}

impl Contract {
    pub fn mint_if_metric(metric: &str, threshold: f64, amount: f64, to: &str) -> Self {
        Self {
            kind: ContractKind::MintIfMetric,
            params: ContractParams {
                metric: Some(metric.to_string()),
                threshold,
                amount,
                from: None,
                to: Some(to.to_string()),
            },
        }
    }

    pub fn transfer_if(metric: &str, threshold: f64, amount: f64, from: &str, to: &str) -> Self {
        Self {
            kind: ContractKind::TransferIf,
            params: ContractParams {
                metric: Some(metric.to_string()),
                threshold,
                amount,
                from: Some(from.to_string()),
                to: Some(to.to_string()),
            },
        }
    }

    /// Zero or one action for this context.
    pub fn evaluate(&self, ctx: &ContractContext) -> Option<Action> {
        let p = &self.params;
        let value = p
            .metric
            .as_ref()
            .and_then(|m| ctx.metrics.get(m))
            .copied()
            .unwrap_or(0.0);
        if !(value >= p.threshold) || !(p.amount > 0.0) {
            return None;
        }
        match &self.kind {
            ContractKind::MintIfMetric => Some(Action::Mint {
                to: non_empty(&p.to)?.to_string(),
                amount: p.amount,
            }),
            ContractKind::TransferIf => Some(Action::Transfer {
                from: non_empty(&p.from)?.to_string(),
                to: non_empty(&p.to)?.to_string(),
                amount: p.amount,
            }),
            ContractKind::Unknown(_) => None,
        }
    }
}

/// Stateless evaluator over an ordered list of contracts.
#[derive(Clone, Debug, Default)]
pub struct ContractEngine {
    contracts: Vec<Contract>,
}

impl ContractEngine {
    pub fn new(contracts: Vec<Contract>) -> Self {
        for c in &contracts {
            if let ContractKind::Unknown(kind) = &c.kind {
                tracing::warn!(%kind, "contract kind not recognised; it will never fire");
            }
        }
        Self { contracts }
    }

    /// All emitted actions, in contract declaration order.
    pub fn evaluate(&self, ctx: &ContractContext) -> Vec<Action> {
        self.contracts.iter().filter_map(|c| c.evaluate(ctx)).collect()
    }
}
