// Federated metric aggregation with optional Gaussian noise on the summed loss.

use crate::scoring::ScoreReport;
use rand::Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregateMetrics {
    pub loss_sum: f64,
    pub loss_sum_noisy: f64,
    pub contributors: usize,
}

/// Sum the losses and add one draw of `N(0, sigma)`. `sigma <= 0` adds nothing.
pub fn aggregate_losses<R: Rng + ?Sized>(
    reports: &[ScoreReport],
    sigma: f64,
    rng: &mut R,
) -> AggregateMetrics {
    let loss_sum: f64 = reports.iter().map(|r| r.loss).sum();
    let noise = if sigma > 0.0 && sigma.is_finite() {
        Normal::new(0.0, sigma).map(|n| n.sample(rng)).unwrap_or(0.0)
    } else {
        0.0
    };
    AggregateMetrics {
        loss_sum,
        loss_sum_noisy: loss_sum + noise,
        contributors: reports.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn reports(losses: &[f64]) -> Vec<ScoreReport> {
        losses
            .iter()
            .map(|&loss| ScoreReport { ai_score: 0.5, loss })
            .collect()
    }

    #[test]
    fn zero_sigma_is_exact_sum() {
        let mut rng = StdRng::seed_from_u64(0);
        let m = aggregate_losses(&reports(&[0.25, 0.5, 0.25]), 0.0, &mut rng);
        assert_eq!(m.loss_sum, 1.0);
        assert_eq!(m.loss_sum_noisy, 1.0);
        assert_eq!(m.contributors, 3);
    }

    #[test]
    fn noise_is_small_for_small_sigma() {
        let mut rng = StdRng::seed_from_u64(8);
        let m = aggregate_losses(&reports(&[1.0, 2.0]), 1e-3, &mut rng);
        assert_eq!(m.loss_sum, 3.0);
        assert!((m.loss_sum_noisy - 3.0).abs() < 0.01);
    }
}
