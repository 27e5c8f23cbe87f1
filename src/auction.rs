// Job auction: jittered stake * ai_score bidding.
// Each bid is scaled by (0.9 + 0.2 * U), U uniform in [0, 1), to break ties.

use rand::Rng;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Bidder {
    pub id: String,
    pub stake: f64,
    pub ai_score: f64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AuctionOutcome {
    pub job: Job,
    pub winner: Option<Bidder>,
    pub winning_bid: f64,
    pub payout: f64,
}

#[derive(Clone, Debug)]
pub struct JobAuction {
    base_reward: f64,
}

impl Default for JobAuction {
    fn default() -> Self {
        Self::new(0.5)
    }
}

impl JobAuction {
    pub fn new(base_reward: f64) -> Self {
        Self { base_reward }
    }

    /// Pick the highest jittered bid. Payout is
    /// `base_reward * (1 + min(winner.ai_score, 1))`, or 0 without bidders.
    pub fn run<R: Rng + ?Sized>(&self, bidders: &[Bidder], job: Job, rng: &mut R) -> AuctionOutcome {
        let mut best: Option<(&Bidder, f64)> = None;
        for b in bidders {
            let jitter = 0.9 + 0.2 * rng.r#gen::<f64>();
            let bid = b.stake * b.ai_score * jitter;
            if bid.is_nan() {
                continue;
            }
            if best.is_none_or(|(_, top)| bid > top) {
                best = Some((b, bid));
            }
        }

        let payout = best
            .map(|(w, _)| {
                let s = if w.ai_score.is_nan() { 0.0 } else { w.ai_score.min(1.0) };
                self.base_reward * (1.0 + s)
            })
            .unwrap_or(0.0);

        AuctionOutcome {
            job,
            winner: best.map(|(w, _)| w.clone()),
            winning_bid: best.map(|(_, bid)| bid).unwrap_or(0.0),
            payout,
        }
    }
}
