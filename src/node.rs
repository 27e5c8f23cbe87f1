use crate::attestation::{Attestor, ImprovementClaim};
use crate::block::{Block, Transaction};
use crate::consensus::Proposal;
use crate::error::Result;
use crate::identity::Signer;
use crate::ledger::Ledger;
use crate::scoring::{ScoreReport, Scorer};
use crate::wallet::Wallet;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Transaction kind carrying a node's training loss.
pub const TRAIN_TX: &str = "train";
/// Transaction kind carrying an attested improvement claim.
pub const IMPROVEMENT_TX: &str = "improvement";

/// A participant: signing identity, wallet and score collaborator.
pub struct Node {
    label: String,
    id: String,
    signer: Box<dyn Signer>,
    wallet: Arc<Wallet>,
    scorer: Box<dyn Scorer>,
    last_loss: Option<f64>,
}

fn now_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

impl Node {
    pub fn new(
        label: impl Into<String>,
        signer: Box<dyn Signer>,
        wallet: Arc<Wallet>,
        scorer: Box<dyn Scorer>,
    ) -> Self {
        let id = signer.public_id_hex();
        Self {
            label: label.into(),
            id,
            signer,
            wallet,
            scorer,
            last_loss: None,
        }
    }

    /// New wallet with `initial_balance`, of which `initial_stake` is staked.
    pub fn bootstrap(
        label: impl Into<String>,
        signer: Box<dyn Signer>,
        scorer: Box<dyn Scorer>,
        initial_balance: f64,
        initial_stake: f64,
    ) -> Result<Self> {
        let wallet = Arc::new(Wallet::new(initial_balance));
        wallet.stake(initial_stake)?;
        Ok(Self::new(label, signer, wallet, scorer))
    }

    /// Short operator-facing name, e.g. `node-0`.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Public id (hex verifying key); this is the block `proposer`.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn wallet(&self) -> &Arc<Wallet> {
        &self.wallet
    }

    /// True if `name` is this node's public id or label.
    pub fn answers_to(&self, name: &str) -> bool {
        self.id == name || self.label == name
    }

    /// Train, score, and build a signed block on top of `ledger`'s tip.
    pub fn propose_block(
        &mut self,
        ledger: &Ledger,
        train_steps: usize,
        attestor: &dyn Attestor,
    ) -> Result<(Proposal, ScoreReport)> {
        let report = self.scorer.train_and_score(train_steps)?;

        let mut txs = vec![
            Transaction::new(TRAIN_TX)
                .with("node", self.id.clone())
                .with("loss", report.loss),
        ];
        if let Some(old) = self.last_loss {
            let attestation = attestor.attest(ImprovementClaim {
                old_metric: old,
                new_metric: report.loss,
            });
            if attestor.verify(&attestation) {
                txs.push(
                    Transaction::new(IMPROVEMENT_TX)
                        .with("statement", attestation.statement)
                        .with("attestor", attestation.attestor)
                        .with("old_metric", attestation.claim.old_metric)
                        .with("new_metric", attestation.claim.new_metric),
                );
            }
        }
        self.last_loss = Some(report.loss);

        let block = Block::new(
            ledger.next_index(),
            ledger.last_hash(),
            now_secs(),
            self.id.clone(),
            self.wallet.staked(),
            report.ai_score,
            txs,
        )
        .seal(self.signer.as_ref())?;

        tracing::debug!(
            node = %self.label,
            index = block.index,
            ai_score = report.ai_score,
            loss = report.loss,
            "block proposed"
        );
        Ok((Proposal::new(block, self.id.clone()), report))
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("label", &self.label)
            .field("id", &self.id)
            .field("wallet", &self.wallet.snapshot())
            .finish()
    }
}

/// Loss recorded in a block's `train` transaction, if any.
pub fn reported_loss(block: &Block) -> Option<f64> {
    block
        .txs
        .iter()
        .find(|tx| tx.kind == TRAIN_TX)
        .and_then(|tx| tx.data.get("loss"))
        .and_then(|v| v.as_f64())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attestation::ComparisonAttestor;
    use crate::identity::Ed25519Identity;
    use crate::scoring::FixedScorer;

    fn node(loss: f64) -> Node {
        Node::bootstrap(
            "node-0",
            Box::new(Ed25519Identity::from_secret([3u8; 32]).unwrap()),
            Box::new(FixedScorer::new(0.7, loss)),
            10.0,
            5.0,
        )
        .unwrap()
    }

    #[test]
    fn proposal_is_signed_and_linked() {
        let mut n = node(0.2);
        let ledger = Ledger::in_memory();
        let (p, report) = n.propose_block(&ledger, 3, &ComparisonAttestor).unwrap();
        assert_eq!(report.ai_score, 0.7);
        assert_eq!(p.public_id, n.id());
        assert_eq!(p.block.index, 1);
        assert_eq!(p.block.prev_hash, "genesis");
        assert_eq!(p.block.stake, 5.0);
        assert!(p.block.verify());
        assert!(p.block.verify_signature());
        assert_eq!(reported_loss(&p.block), Some(0.2));
        assert!(n.answers_to("node-0"));
    }

    #[test]
    fn second_proposal_carries_improvement_claim() {
        let mut n = node(0.2);
        let ledger = Ledger::in_memory();
        let (first, _) = n.propose_block(&ledger, 1, &ComparisonAttestor).unwrap();
        assert!(first.block.txs.iter().all(|t| t.kind != IMPROVEMENT_TX));
        let (second, _) = n.propose_block(&ledger, 1, &ComparisonAttestor).unwrap();
        let claim = second
            .block
            .txs
            .iter()
            .find(|t| t.kind == IMPROVEMENT_TX)
            .unwrap();
        assert_eq!(claim.data["old_metric"], 0.2);
    }
}
