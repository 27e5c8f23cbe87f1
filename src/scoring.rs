// Score collaborators: turn a number of training steps into an ai_score.
// The core only needs a value usable for weighting; the numeric detail lives here.

use crate::components::{Component, ComponentRegistry, ComponentSpec};
use crate::error::Result;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScoreReport {
    pub ai_score: f64,
    pub loss: f64,
}

pub trait Scorer: Send {
    fn train_and_score(&mut self, steps: usize) -> Result<ScoreReport>;
}

/// Logistic map from loss to score, centred at loss 0.01.
pub fn score_from_loss(loss: f64) -> f64 {
    1.0 / (1.0 + (5.0 * (loss - 0.01)).exp())
}

/// Returns the same report every time.
#[derive(Clone, Copy, Debug)]
pub struct FixedScorer {
    pub report: ScoreReport,
}

impl FixedScorer {
    pub fn new(ai_score: f64, loss: f64) -> Self {
        Self {
            report: ScoreReport { ai_score, loss },
        }
    }
}

impl Scorer for FixedScorer {
    fn train_and_score(&mut self, _steps: usize) -> Result<ScoreReport> {
        Ok(self.report)
    }
}

/// Chains registry components and trains them to reconstruct random input.
pub struct SpineScorer {
    components: Vec<Box<dyn Component>>,
    width: usize,
    rng: StdRng,
}

impl SpineScorer {
    pub fn new(
        registry: &ComponentRegistry,
        names: &[String],
        spec: &ComponentSpec,
    ) -> Result<Self> {
        let components = names
            .iter()
            .map(|n| registry.build(n, spec))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            components,
            width: spec.width.max(1),
            rng: StdRng::seed_from_u64(spec.seed ^ 0x5eed),
        })
    }
}

impl Scorer for SpineScorer {
    fn train_and_score(&mut self, steps: usize) -> Result<ScoreReport> {
        let x: Vec<f32> = (0..self.width).map(|_| self.rng.r#gen::<f32>()).collect();
        let mut last: Option<f32> = None;
        for _ in 0..steps {
            let mut current = x.clone();
            for c in self.components.iter_mut() {
                if let Some(loss) = c.train_step(&current, &x) {
                    last = Some(loss);
                }
                current = c.process(&current);
            }
        }
        // Nothing trainable (or zero steps) scores as a unit loss.
        let loss = last.map(f64::from).unwrap_or(1.0);
        let report = ScoreReport {
            ai_score: score_from_loss(loss),
            loss,
        };
        tracing::debug!(steps, loss = report.loss, ai_score = report.ai_score, "scored");
        Ok(report)
    }
}
