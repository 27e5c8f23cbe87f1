// Leader and committee selection over round proposals.
// Weight of a proposal is stake * ai_score; the committee sampler floors it at MIN_WEIGHT.

use crate::consensus::Proposal;
use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;
use std::collections::BTreeSet;

/// Floor applied to sampling weights so zero-score nodes can still be drawn.
pub const MIN_WEIGHT: f64 = 1e-6;

/// Index of the proposal with the highest `stake * ai_score`.
/// Ties go to the earliest timestamp, then to the lower index.
pub fn select_winner(proposals: &[Proposal]) -> Option<usize> {
    let mut best: Option<(usize, f64, f64)> = None;
    for (i, p) in proposals.iter().enumerate() {
        let score = p.block.score();
        let ts = p.block.timestamp;
        let better = match best {
            None => true,
            Some((_, best_score, best_ts)) => {
                score > best_score || (score == best_score && ts < best_ts)
            }
        };
        if better {
            best = Some((i, score, ts));
        }
    }
    best.map(|(i, _, _)| i)
}

fn sampling_weight(p: &Proposal) -> f64 {
    let w = p.block.score();
    if w.is_finite() { w.max(MIN_WEIGHT) } else { MIN_WEIGHT }
}

/// Draw `min(k, n)` distinct proposal indices, each draw weighted by
/// `max(MIN_WEIGHT, stake * ai_score)`.
///
/// A drawn index is excluded from later draws. This gives the same
/// distribution as re-rolling on a duplicate, but always terminates in
/// `min(k, n)` draws. Returned indices are sorted ascending.
pub fn select_committee<R: Rng + ?Sized>(
    candidates: &[Proposal],
    k: usize,
    rng: &mut R,
) -> Vec<usize> {
    let target = k.min(candidates.len());
    let mut weights: Vec<f64> = candidates.iter().map(sampling_weight).collect();
    let mut chosen = BTreeSet::new();

    while chosen.len() < target {
        let dist = match WeightedIndex::new(&weights) {
            Ok(d) => d,
            Err(e) => {
                // Weights are floored and finite, so this only trips on overflow
                // of the total; fall back to the first unchosen indices.
                tracing::warn!(error = %e, "committee weights unusable; filling in order");
                for i in 0..candidates.len() {
                    if chosen.len() >= target {
                        break;
                    }
                    chosen.insert(i);
                }
                break;
            }
        };
        let idx = dist.sample(rng);
        chosen.insert(idx);
        weights[idx] = 0.0;
    }

    chosen.into_iter().collect()
}

/// Majority quorum over a population of `n`: `floor(n/2) + 1`.
pub fn quorum(n: usize) -> usize {
    n / 2 + 1
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::Block;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn proposal(stake: f64, ai_score: f64, ts: f64) -> Proposal {
        let block = Block::new(1, "genesis", ts, "p", stake, ai_score, vec![]);
        Proposal::new(block, "p")
    }

    #[test]
    fn winner_is_highest_score() {
        let ps = vec![
            proposal(10.0, 0.5, 3.0),
            proposal(5.0, 0.9, 1.0),
            proposal(5.0, 0.9, 2.0),
        ];
        assert_eq!(select_winner(&ps), Some(0));
    }

    #[test]
    fn winner_tie_breaks_on_earliest_timestamp() {
        let ps = vec![
            proposal(5.0, 0.9, 2.0),
            proposal(5.0, 0.9, 1.0),
            proposal(1.0, 0.1, 0.0),
        ];
        assert_eq!(select_winner(&ps), Some(1));
        assert_eq!(select_winner(&[]), None);
    }

    #[test]
    fn committee_has_exact_distinct_size() {
        let ps: Vec<Proposal> = (0..7)
            .map(|i| proposal(i as f64, 0.5, i as f64))
            .collect();
        let mut rng = StdRng::seed_from_u64(42);
        for k in 0..10 {
            let c = select_committee(&ps, k, &mut rng);
            assert_eq!(c.len(), k.min(ps.len()));
            let uniq: BTreeSet<_> = c.iter().collect();
            assert_eq!(uniq.len(), c.len());
            assert!(c.iter().all(|&i| i < ps.len()));
        }
    }

    #[test]
    fn zero_weight_nodes_still_selectable() {
        let ps = vec![proposal(0.0, 0.0, 0.0), proposal(1e6, 1.0, 0.0)];
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(select_committee(&ps, 2, &mut rng), vec![0, 1]);
    }

    #[test]
    fn inclusion_frequency_tracks_weight() {
        let ps = vec![
            proposal(1.0, 1.0, 0.0),
            proposal(3.0, 1.0, 0.0),
            proposal(9.0, 1.0, 0.0),
            proposal(27.0, 1.0, 0.0),
        ];
        let mut rng = StdRng::seed_from_u64(7);
        let mut counts = [0usize; 4];
        for _ in 0..4000 {
            for i in select_committee(&ps, 2, &mut rng) {
                counts[i] += 1;
            }
        }
        assert!(counts[0] < counts[1]);
        assert!(counts[1] < counts[2]);
        assert!(counts[2] < counts[3]);
    }

    #[test]
    fn quorum_is_simple_majority() {
        assert_eq!(quorum(3), 2);
        assert_eq!(quorum(4), 3);
        assert_eq!(quorum(1), 1);
    }
}
