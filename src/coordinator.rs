//! Round coordinator.
//!
//! One round runs `COLLECT_PROPOSALS -> SELECT_COMMITTEE -> COMMIT ->
//! {REJECT | SETTLE} -> APPEND -> DONE` to completion before the next begins.
//! The coordinator assumes exclusive use of the ledger and of every wallet
//! while a round is settling; wallets may be touched from outside only
//! between rounds.

use crate::attestation::{Attestor, ComparisonAttestor};
use crate::auction::{AuctionOutcome, Bidder, Job, JobAuction};
use crate::block::Block;
use crate::bus::Bus;
use crate::components::{ComponentRegistry, ComponentSpec};
use crate::config::ChainConfig;
use crate::consensus::{
    bft_commit, mint_reward, quorum, select_committee, slash, verify_block, Misbehavior,
    Proposal, ProposalTracker, SlashRecord,
};
use crate::contracts::{Action, ContractContext, ContractEngine};
use crate::error::{ChainError, Result};
use crate::federated::{aggregate_losses, AggregateMetrics};
use crate::identity::Ed25519Identity;
use crate::ledger::Ledger;
use crate::node::{reported_loss, Node};
use crate::policy::{LimitPolicy, Policy};
use crate::scoring::{ScoreReport, SpineScorer};
use crate::state::ChainState;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Bus topic every [`RoundOutcome`] is published on.
pub const ROUNDS_TOPIC: &str = "rounds";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundStatus {
    Ok,
    NoCommit,
    Reject,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum RoundPhase {
    CollectProposals,
    SelectCommittee,
    Commit,
    Reject,
    Settle,
    Append,
    Done,
}

impl RoundPhase {
    fn as_str(self) -> &'static str {
        match self {
            RoundPhase::CollectProposals => "COLLECT_PROPOSALS",
            RoundPhase::SelectCommittee => "SELECT_COMMITTEE",
            RoundPhase::Commit => "COMMIT",
            RoundPhase::Reject => "REJECT",
            RoundPhase::Settle => "SETTLE",
            RoundPhase::Append => "APPEND",
            RoundPhase::Done => "DONE",
        }
    }
}

fn enter(round: u64, phase: RoundPhase) {
    tracing::debug!(round, phase = phase.as_str(), "round phase");
}

/// A contract action that was not applied, and why.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DeniedAction {
    pub action: Action,
    pub reason: String,
}

/// Structured result of one round.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RoundOutcome {
    pub round: u64,
    pub status: RoundStatus,
    pub reason: Option<String>,
    pub winner: Option<String>,
    pub reward: f64,
    pub height: u64,
    /// Indices into the round's accepted proposals.
    pub committee: Vec<usize>,
    pub commit_index: Option<usize>,
    pub auction: Option<AuctionOutcome>,
    pub applied_actions: Vec<Action>,
    pub denied_actions: Vec<DeniedAction>,
    pub slashed: Vec<SlashRecord>,
    pub metrics: Option<AggregateMetrics>,
}

impl RoundOutcome {
    fn new(round: u64, status: RoundStatus, height: u64) -> Self {
        Self {
            round,
            status,
            reason: None,
            winner: None,
            reward: 0.0,
            height,
            committee: Vec::new(),
            commit_index: None,
            auction: None,
            applied_actions: Vec::new(),
            denied_actions: Vec::new(),
            slashed: Vec::new(),
            metrics: None,
        }
    }

    fn with_reason(mut self, reason: &str) -> Self {
        self.reason = Some(reason.to_string());
        self
    }
}

pub struct FederatedChain {
    config: ChainConfig,
    ledger: Ledger,
    nodes: Vec<Node>,
    state: ChainState,
    contracts: ContractEngine,
    policy: Box<dyn Policy>,
    auction: JobAuction,
    attestor: Box<dyn Attestor>,
    bus: Arc<Bus<RoundOutcome>>,
    tracker: ProposalTracker,
    rng: StdRng,
    round: u64,
}

fn seeded_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(s) => StdRng::seed_from_u64(s),
        None => StdRng::from_entropy(),
    }
}

impl FederatedChain {
    /// Assemble a chain from prebuilt parts. Contracts, policy limits, auction
    /// reward and slashing table come from `config`.
    pub fn new(
        config: ChainConfig,
        ledger: Ledger,
        nodes: Vec<Node>,
        bus: Arc<Bus<RoundOutcome>>,
    ) -> Self {
        let contracts = ContractEngine::new(config.contracts.clone());
        let policy: Box<dyn Policy> = Box::new(LimitPolicy::new(config.policy.clone()));
        let auction = JobAuction::new(config.auction.base_reward);
        let rng = seeded_rng(config.chain.seed);
        let mut chain = Self {
            config,
            ledger,
            nodes,
            state: ChainState::new(),
            contracts,
            policy,
            auction,
            attestor: Box::new(ComparisonAttestor),
            bus,
            tracker: ProposalTracker::new(),
            rng,
            round: 0,
        };
        chain.sync_stakes();
        chain
    }

    /// Open the ledger under `data_dir`, seed genesis if configured, and
    /// create `num_nodes` nodes with fresh keys and spine scorers.
    pub fn from_config(config: ChainConfig, bus: Arc<Bus<RoundOutcome>>) -> Result<Self> {
        config.validate()?;
        let mut ledger = Ledger::open(&config.chain.data_dir)?;
        if let Some(path) = &config.chain.genesis_file {
            let seed = Ledger::read_genesis_seed(path)?;
            ledger.seed_genesis(&seed)?;
        }

        let registry = ComponentRegistry::with_builtins();
        let mut key_rng = seeded_rng(config.chain.seed.map(|s| s.wrapping_add(1)));
        let mut nodes = Vec::with_capacity(config.chain.num_nodes);
        for i in 0..config.chain.num_nodes {
            let spec = ComponentSpec {
                width: config.scorer.width,
                learning_rate: config.scorer.learning_rate,
                seed: config.chain.seed.unwrap_or(0).wrapping_add(i as u64),
            };
            let scorer = SpineScorer::new(&registry, &config.scorer.components, &spec)?;
            let signer = Ed25519Identity::generate(&mut key_rng)?;
            nodes.push(Node::bootstrap(
                format!("node-{}", i),
                Box::new(signer),
                Box::new(scorer),
                config.chain.initial_balance,
                config.chain.initial_stake,
            )?);
        }
        tracing::info!(
            nodes = nodes.len(),
            height = ledger.height(),
            data_dir = %config.chain.data_dir.display(),
            "chain initialised"
        );
        Ok(Self::new(config, ledger, nodes, bus))
    }

    pub fn with_policy(mut self, policy: Box<dyn Policy>) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_attestor(mut self, attestor: Box<dyn Attestor>) -> Self {
        self.attestor = attestor;
        self
    }

    pub fn config(&self) -> &ChainConfig {
        &self.config
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn state(&self) -> &ChainState {
        &self.state
    }

    pub fn bus(&self) -> &Arc<Bus<RoundOutcome>> {
        &self.bus
    }

    /// Rounds started so far.
    pub fn round(&self) -> u64 {
        self.round
    }

    /// Node by public id or label.
    pub fn node(&self, name: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.answers_to(name))
    }

    /// Refresh the stake registry from the wallets.
    pub fn sync_stakes(&mut self) {
        for n in &self.nodes {
            self.state.set_stake(n.id(), n.wallet().staked());
        }
    }

    /// Slash a node between rounds on externally supplied evidence.
    pub fn report_misbehavior(
        &mut self,
        node: &str,
        kind: Misbehavior,
    ) -> Result<Option<SlashRecord>> {
        let id = self
            .node(node)
            .map(|n| n.id().to_string())
            .ok_or_else(|| ChainError::UnknownNode(node.to_string()))?;
        self.sync_stakes();
        Ok(self.slash_node(&id, kind))
    }

    fn slash_node(&mut self, node_id: &str, kind: Misbehavior) -> Option<SlashRecord> {
        let record = slash(&mut self.state, node_id, kind, &self.config.slashing)?;
        if let Some(n) = self.nodes.iter().find(|n| n.id() == node_id)
            && let Err(e) = n.wallet().unstake(record.penalty)
        {
            tracing::warn!(node = node_id, error = %e, "could not mirror slash into wallet");
        }
        Some(record)
    }

    /// Collect one proposal per node and settle them.
    pub fn run_round(&mut self) -> Result<RoundOutcome> {
        let round = self.begin_round();
        enter(round, RoundPhase::CollectProposals);
        let proposals = self.collect_proposals()?;
        self.settle(round, proposals)
    }

    /// One signed proposal per node, built on the current tip.
    pub fn collect_proposals(&mut self) -> Result<Vec<Proposal>> {
        let train_steps = self.config.chain.train_steps;
        let mut proposals = Vec::with_capacity(self.nodes.len());
        for node in self.nodes.iter_mut() {
            let (proposal, _) =
                node.propose_block(&self.ledger, train_steps, self.attestor.as_ref())?;
            proposals.push(proposal);
        }
        Ok(proposals)
    }

    /// Run the pipeline from committee selection onward on the given proposals.
    pub fn settle_proposals(&mut self, proposals: Vec<Proposal>) -> Result<RoundOutcome> {
        let round = self.begin_round();
        self.settle(round, proposals)
    }

    /// Run up to `rounds` rounds, sleeping `round_time_ms` in between.
    /// `stop` is only checked between rounds.
    pub fn run(&mut self, rounds: u64, stop: &AtomicBool) -> Result<Vec<RoundOutcome>> {
        let pause = Duration::from_millis(self.config.chain.round_time_ms);
        let mut outcomes = Vec::new();
        for i in 0..rounds {
            if stop.load(Ordering::SeqCst) {
                tracing::info!(completed = i, "stop requested");
                break;
            }
            outcomes.push(self.run_round()?);
            if i + 1 < rounds && !pause.is_zero() {
                thread::sleep(pause);
            }
        }
        Ok(outcomes)
    }

    fn begin_round(&mut self) -> u64 {
        self.round += 1;
        self.tracker.prune(self.round);
        self.sync_stakes();
        self.round
    }

    fn settle(&mut self, round: u64, proposals: Vec<Proposal>) -> Result<RoundOutcome> {
        let mut slashed = Vec::new();
        let mut accepted = Vec::with_capacity(proposals.len());
        for p in proposals {
            if !p.is_authentic() {
                tracing::warn!(
                    round,
                    proposer = %p.block.proposer,
                    sender = %p.public_id,
                    "unauthenticated proposal dropped"
                );
                continue;
            }
            match self.tracker.record(round, &p.block.proposer, &p.block.hash) {
                Some(kind) => {
                    tracing::warn!(round, proposer = %p.block.proposer, "second proposal dropped");
                    slashed.extend(self.slash_node(&p.block.proposer, kind));
                }
                None => accepted.push(p),
            }
        }

        let mut outcome = self.decide(round, &accepted, &mut slashed)?;
        outcome.slashed = slashed;
        enter(round, RoundPhase::Done);
        tracing::info!(
            round,
            status = ?outcome.status,
            height = outcome.height,
            winner = outcome.winner.as_deref().unwrap_or("-"),
            reward = outcome.reward,
            "round finished"
        );
        self.bus.publish(ROUNDS_TOPIC, outcome.clone());
        Ok(outcome)
    }

    fn decide(
        &mut self,
        round: u64,
        accepted: &[Proposal],
        slashed: &mut Vec<SlashRecord>,
    ) -> Result<RoundOutcome> {
        let height = self.ledger.height();

        enter(round, RoundPhase::SelectCommittee);
        if accepted.is_empty() {
            return Ok(RoundOutcome::new(round, RoundStatus::NoCommit, height)
                .with_reason("no_proposals"));
        }
        let k = self.config.committee_size_for(accepted.len());
        let committee = select_committee(accepted, k, &mut self.rng);
        let members: Vec<Proposal> = committee.iter().map(|&i| accepted[i].clone()).collect();

        enter(round, RoundPhase::Commit);
        let Some(member_idx) = bft_commit(&members, quorum(members.len())) else {
            let mut out = RoundOutcome::new(round, RoundStatus::NoCommit, height)
                .with_reason("no_quorum");
            out.committee = committee;
            return Ok(out);
        };
        let commit_index = committee[member_idx];
        let block = &accepted[commit_index].block;

        let mut out = RoundOutcome::new(round, RoundStatus::Reject, height);
        out.committee = committee;
        out.commit_index = Some(commit_index);
        out.winner = Some(block.proposer.clone());

        if !verify_block(block) {
            enter(round, RoundPhase::Reject);
            tracing::warn!(round, proposer = %block.proposer, "committed block has a bad hash");
            slashed.extend(self.slash_node(&block.proposer, Misbehavior::InvalidHash));
            return Ok(out.with_reason("invalid_hash"));
        }
        if block.prev_hash != self.ledger.last_hash() || block.index != self.ledger.next_index() {
            enter(round, RoundPhase::Reject);
            return Ok(out.with_reason("stale_parent"));
        }
        if self.node(&block.proposer).is_none() {
            enter(round, RoundPhase::Reject);
            return Ok(out.with_reason("unknown_proposer"));
        }

        enter(round, RoundPhase::Settle);
        out.auction = Some(self.run_auction(round, accepted));
        out.metrics = Some(self.aggregate(accepted));
        self.apply_contracts(block, &mut out);
        out.reward = self.mint(block);

        enter(round, RoundPhase::Append);
        if !self.ledger.append(block.clone())? {
            return Ok(out.with_reason("stale_parent"));
        }
        out.status = RoundStatus::Ok;
        out.height = self.ledger.height();
        Ok(out)
    }

    fn run_auction(&mut self, round: u64, accepted: &[Proposal]) -> AuctionOutcome {
        let bidders: Vec<Bidder> = accepted
            .iter()
            .map(|p| Bidder {
                id: p.block.proposer.clone(),
                stake: p.block.stake,
                ai_score: p.block.ai_score,
            })
            .collect();
        let job = Job {
            id: format!("round-{}", round),
            description: "train".to_string(),
        };
        let outcome = self.auction.run(&bidders, job, &mut self.rng);
        if let Some(w) = &outcome.winner {
            match self.node(&w.id) {
                Some(n) => {
                    if let Err(e) = n.wallet().deposit(outcome.payout) {
                        tracing::warn!(winner = %w.id, error = %e, "auction payout not credited");
                    }
                }
                None => tracing::warn!(winner = %w.id, "auction winner has no wallet"),
            }
        }
        outcome
    }

    fn aggregate(&mut self, accepted: &[Proposal]) -> AggregateMetrics {
        let reports: Vec<ScoreReport> = accepted
            .iter()
            .filter_map(|p| {
                reported_loss(&p.block).map(|loss| ScoreReport {
                    ai_score: p.block.ai_score,
                    loss,
                })
            })
            .collect();
        aggregate_losses(&reports, self.config.chain.dp_sigma, &mut self.rng)
    }

    fn apply_contracts(&self, block: &Block, out: &mut RoundOutcome) {
        let ctx = ContractContext::new(block.proposer.clone())
            .metric("ai_score", block.ai_score)
            .metric("stake", block.stake);
        for action in self.contracts.evaluate(&ctx) {
            let decision = self.policy.check(&action);
            if !decision.allowed {
                tracing::info!(action = action.policy_name(), reason = %decision.reason, "action denied");
                out.denied_actions.push(DeniedAction {
                    action,
                    reason: decision.reason,
                });
                continue;
            }
            match self.apply_action(&action) {
                Ok(()) => out.applied_actions.push(action),
                Err(reason) => {
                    tracing::info!(action = action.policy_name(), %reason, "action not applied");
                    out.denied_actions.push(DeniedAction { action, reason });
                }
            }
        }
    }

    fn apply_action(&self, action: &Action) -> std::result::Result<(), String> {
        let lookup = |name: &str| self.node(name).ok_or_else(|| format!("unknown node {}", name));
        match action {
            Action::Mint { to, amount } => lookup(to)?
                .wallet()
                .deposit(*amount)
                .map(|_| ())
                .map_err(|e| e.to_string()),
            Action::Transfer { from, to, amount } => {
                let src = lookup(from)?;
                let dst = lookup(to)?;
                src.wallet()
                    .transfer_to(dst.wallet(), *amount)
                    .map_err(|e| match e {
                        ChainError::InsufficientBalance { .. } => "insufficient balance".to_string(),
                        other => other.to_string(),
                    })
            }
        }
    }

    fn mint(&self, block: &Block) -> f64 {
        let reward = mint_reward(block.ai_score, self.config.chain.base_reward);
        match self.node(&block.proposer) {
            Some(n) => match n.wallet().deposit(reward) {
                Ok(_) => reward,
                Err(e) => {
                    tracing::warn!(proposer = %block.proposer, error = %e, "reward not credited");
                    0.0
                }
            },
            None => 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_uses_snake_case() {
        assert_eq!(serde_json::to_string(&RoundStatus::NoCommit).unwrap(), "\"no_commit\"");
        assert_eq!(RoundPhase::CollectProposals.as_str(), "COLLECT_PROPOSALS");
    }

    #[test]
    fn empty_round_is_no_commit() {
        let bus = Arc::new(Bus::new());
        let rx = bus.subscribe(ROUNDS_TOPIC);
        let mut chain =
            FederatedChain::new(ChainConfig::default(), Ledger::in_memory(), Vec::new(), bus);
        let out = chain.settle_proposals(Vec::new()).unwrap();
        assert_eq!(out.status, RoundStatus::NoCommit);
        assert_eq!(out.reason.as_deref(), Some("no_proposals"));
        assert_eq!(out.height, 0);
        assert_eq!(rx.try_recv().unwrap().round, 1);
    }
}
