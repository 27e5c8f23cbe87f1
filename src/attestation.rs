//! Pluggable "proof of improvement" attestation.
//!
//! This is a claim check, not a proof system: [`ComparisonAttestor`] accepts a
//! claim iff `new_metric <= old_metric` and offers no soundness guarantee.

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ImprovementClaim {
    pub old_metric: f64,
    pub new_metric: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Attestation {
    pub statement: String,
    pub claim: ImprovementClaim,
    pub attestor: String,
}

pub trait Attestor: Send + Sync {
    fn attest(&self, claim: ImprovementClaim) -> Attestation;
    fn verify(&self, attestation: &Attestation) -> bool;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct ComparisonAttestor;

const STATEMENT: &str = "new_metric <= old_metric";
const ATTESTOR: &str = "comparison";

impl Attestor for ComparisonAttestor {
    fn attest(&self, claim: ImprovementClaim) -> Attestation {
        Attestation {
            statement: STATEMENT.to_string(),
            claim,
            attestor: ATTESTOR.to_string(),
        }
    }

    fn verify(&self, attestation: &Attestation) -> bool {
        attestation.attestor == ATTESTOR
            && attestation.statement == STATEMENT
            && attestation.claim.new_metric <= attestation.claim.old_metric
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_only_non_increasing_metric() {
        let a = ComparisonAttestor;
        let good = a.attest(ImprovementClaim {
            old_metric: 0.4,
            new_metric: 0.3,
        });
        assert!(a.verify(&good));
        let bad = a.attest(ImprovementClaim {
            old_metric: 0.3,
            new_metric: 0.4,
        });
        assert!(!a.verify(&bad));
        let nan = a.attest(ImprovementClaim {
            old_metric: 0.3,
            new_metric: f64::NAN,
        });
        assert!(!a.verify(&nan));
    }

    #[test]
    fn foreign_attestation_is_rejected() {
        let a = ComparisonAttestor;
        let mut att = a.attest(ImprovementClaim {
            old_metric: 1.0,
            new_metric: 0.5,
        });
        att.attestor = "zk".into();
        assert!(!a.verify(&att));
    }
}
