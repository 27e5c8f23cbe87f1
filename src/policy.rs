use crate::contracts::Action;
use serde::{Deserialize, Serialize};

/// Allow/deny verdict with a human-readable reason.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PolicyDecision {
    pub allowed: bool,
    pub reason: String,
}

impl PolicyDecision {
    pub fn allow() -> Self {
        Self {
            allowed: true,
            reason: "OK".to_string(),
        }
    }

    pub fn deny(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: reason.into(),
        }
    }
}

/// Gate consulted before any contract action touches a wallet.
pub trait Policy: Send + Sync {
    fn check(&self, action: &Action) -> PolicyDecision;
}

/// Accepts everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct AllowAll;

impl Policy for AllowAll {
    fn check(&self, _action: &Action) -> PolicyDecision {
        PolicyDecision::allow()
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PolicyConfig {
    #[serde(default = "default_max_transfer")]
    pub max_transfer: f64,
    #[serde(default)]
    pub max_mint: Option<f64>,
}

fn default_max_transfer() -> f64 {
    1000.0
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            max_transfer: default_max_transfer(),
            max_mint: None,
        }
    }
}

/// Limit-based policy: caps transfer and (optionally) mint sizes.
#[derive(Clone, Debug, Default)]
pub struct LimitPolicy {
    config: PolicyConfig,
}

impl LimitPolicy {
    pub fn new(config: PolicyConfig) -> Self {
        Self { config }
    }
}

impl Policy for LimitPolicy {
    fn check(&self, action: &Action) -> PolicyDecision {
        match action {
            Action::Transfer { amount, .. } if *amount > self.config.max_transfer => {
                PolicyDecision::deny("Security: transfer exceeds policy limit")
            }
            Action::Mint { amount, .. } if self.config.max_mint.is_some_and(|m| *amount > m) => {
                PolicyDecision::deny("Security: mint exceeds policy limit")
            }
            _ => PolicyDecision::allow(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transfer_limit() {
        let p = LimitPolicy::new(PolicyConfig {
            max_transfer: 10.0,
            max_mint: None,
        });
        let small = Action::Transfer {
            from: "a".into(),
            to: "b".into(),
            amount: 10.0,
        };
        let big = Action::Transfer {
            from: "a".into(),
            to: "b".into(),
            amount: 10.5,
        };
        assert!(p.check(&small).allowed);
        let d = p.check(&big);
        assert!(!d.allowed);
        assert!(d.reason.contains("limit"));
    }

    #[test]
    fn mint_limit_only_when_configured() {
        let mint = Action::Mint {
            to: "a".into(),
            amount: 1e9,
        };
        assert!(LimitPolicy::default().check(&mint).allowed);
        let capped = LimitPolicy::new(PolicyConfig {
            max_transfer: 1.0,
            max_mint: Some(5.0),
        });
        assert!(!capped.check(&mint).allowed);
        assert!(AllowAll.check(&mint).allowed);
    }
}
