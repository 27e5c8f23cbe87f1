//! Stake-weighted leader/committee selection, quorum commit and slashing.

pub mod commit;
pub mod selection;
pub mod slashing;

pub use commit::bft_commit;
pub use selection::{quorum, select_committee, select_winner};
pub use slashing::{
    slash, slash_fraction, Misbehavior, ProposalTracker, SlashRecord, SlashingConfig,
};

use crate::block::Block;
use serde::{Deserialize, Serialize};

/// One node's candidate block for a round.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Proposal {
    pub block: Block,
    pub public_id: String,
}

impl Proposal {
    pub fn new(block: Block, public_id: impl Into<String>) -> Self {
        Self {
            block,
            public_id: public_id.into(),
        }
    }

    /// The sender matches the block's proposer and the signature checks out.
    pub fn is_authentic(&self) -> bool {
        self.public_id == self.block.proposer && self.block.verify_signature()
    }
}

/// Recompute the block hash and compare with the stored one.
pub fn verify_block(block: &Block) -> bool {
    block.verify()
}

/// Proof-of-stake reward: `base * (1 + min(ai_score, 1))`, capped at twice the base.
pub fn mint_reward(ai_score: f64, base_reward: f64) -> f64 {
    let s = if ai_score.is_nan() { 0.0 } else { ai_score.min(1.0) };
    base_reward * (1.0 + s)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::Transaction;
    use crate::identity::{Ed25519Identity, Signer};

    fn signed(seed: u8) -> (Ed25519Identity, Proposal) {
        let id = Ed25519Identity::from_secret([seed; 32]).unwrap();
        let block = Block::new(
            1,
            "genesis",
            1.0,
            id.public_id_hex(),
            5.0,
            0.5,
            vec![Transaction::new("train").with("loss", 0.1)],
        )
        .seal(&id)
        .unwrap();
        let public_id = id.public_id_hex();
        (id, Proposal::new(block, public_id))
    }

    #[test]
    fn authenticity_needs_matching_sender_and_signature() {
        let (_, genuine) = signed(4);
        assert!(genuine.is_authentic());
        assert!(verify_block(&genuine.block));

        let (other, _) = signed(5);
        let mut relabelled = genuine.clone();
        relabelled.public_id = other.public_id_hex();
        assert!(!relabelled.is_authentic());

        let mut forged = genuine.clone();
        forged.block.signature = "00".repeat(64);
        forged.block.hash = forged.block.compute_hash();
        assert!(verify_block(&forged.block));
        assert!(!forged.is_authentic());

        let mut rehashed = genuine;
        rehashed.block.hash = "00".repeat(32);
        assert!(rehashed.is_authentic());
        assert!(!verify_block(&rehashed.block));
    }

    #[test]
    fn reward_curve() {
        assert_eq!(mint_reward(1.0, 1.0), 2.0);
        assert_eq!(mint_reward(0.0, 1.0), 1.0);
        assert_eq!(mint_reward(5.0, 1.0), 2.0);
        assert_eq!(mint_reward(f64::NAN, 1.0), 1.0);
        let mut last = f64::MIN;
        for i in 0..=20 {
            let r = mint_reward(i as f64 * 0.1, 1.0);
            assert!(r >= last);
            last = r;
        }
    }
}
