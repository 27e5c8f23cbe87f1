//! Named node components resolved once at startup through an explicit registry.
//!
//! A component always supports `process`; training is optional and reported
//! through the `Option` returned by `train_step`.

use crate::error::{ChainError, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeMap;

#[derive(Clone, Debug)]
pub struct ComponentSpec {
    pub width: usize,
    pub learning_rate: f32,
    pub seed: u64,
}

impl Default for ComponentSpec {
    fn default() -> Self {
        Self {
            width: 16,
            learning_rate: 0.05,
            seed: 0,
        }
    }
}

pub trait Component: Send {
    fn name(&self) -> &str;

    fn process(&mut self, input: &[f32]) -> Vec<f32>;

    /// One optimisation step towards `target`. Returns the loss, or `None` if
    /// the component has nothing to train.
    fn train_step(&mut self, input: &[f32], target: &[f32]) -> Option<f32>;
}

pub type Constructor = fn(&ComponentSpec) -> Box<dyn Component>;

#[derive(Clone, Default)]
pub struct ComponentRegistry {
    constructors: BTreeMap<String, Constructor>,
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with `dense` and `identity` registered.
    pub fn with_builtins() -> Self {
        let mut r = Self::new();
        r.register("dense", build_dense);
        r.register("identity", build_identity);
        r
    }

    pub fn register(&mut self, name: &str, ctor: Constructor) {
        self.constructors.insert(name.to_string(), ctor);
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.constructors.keys().map(String::as_str)
    }

    pub fn build(&self, name: &str, spec: &ComponentSpec) -> Result<Box<dyn Component>> {
        let ctor = self
            .constructors
            .get(name)
            .ok_or_else(|| ChainError::UnknownComponent(name.to_string()))?;
        Ok(ctor(spec))
    }
}

impl std::fmt::Debug for ComponentRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.constructors.keys()).finish()
    }
}

fn build_dense(spec: &ComponentSpec) -> Box<dyn Component> {
    Box::new(Dense::new(spec))
}

fn build_identity(_spec: &ComponentSpec) -> Box<dyn Component> {
    Box::new(Identity)
}

/// Pass-through, untrainable.
pub struct Identity;

impl Component for Identity {
    fn name(&self) -> &str {
        "identity"
    }

    fn process(&mut self, input: &[f32]) -> Vec<f32> {
        input.to_vec()
    }

    fn train_step(&mut self, _input: &[f32], _target: &[f32]) -> Option<f32> {
        None
    }
}

/// Square linear layer `y = W x + b` trained with plain SGD on MSE.
pub struct Dense {
    width: usize,
    weights: Vec<f32>,
    bias: Vec<f32>,
    lr: f32,
}

impl Dense {
    pub fn new(spec: &ComponentSpec) -> Self {
        let width = spec.width.max(1);
        let mut rng = StdRng::seed_from_u64(spec.seed);
        let scale = 1.0 / (width as f32).sqrt();
        let weights = (0..width * width)
            .map(|_| rng.gen_range(-scale..scale))
            .collect();
        Self {
            width,
            weights,
            bias: vec![0.0; width],
            lr: spec.learning_rate,
        }
    }

    fn forward(&self, input: &[f32]) -> Vec<f32> {
        (0..self.width)
            .map(|r| {
                let row = &self.weights[r * self.width..(r + 1) * self.width];
                row.iter()
                    .zip(input.iter())
                    .map(|(w, x)| w * x)
                    .sum::<f32>()
                    + self.bias[r]
            })
            .collect()
    }
}

impl Component for Dense {
    fn name(&self) -> &str {
        "dense"
    }

    fn process(&mut self, input: &[f32]) -> Vec<f32> {
        self.forward(input)
    }

    fn train_step(&mut self, input: &[f32], target: &[f32]) -> Option<f32> {
        let out = self.forward(input);
        let n = self.width as f32;
        let mut loss = 0.0;
        for r in 0..self.width {
            let t = target.get(r).copied().unwrap_or(0.0);
            let err = out[r] - t;
            loss += err * err;
            let grad = 2.0 * err / n;
            for c in 0..self.width {
                let x = input.get(c).copied().unwrap_or(0.0);
                self.weights[r * self.width + c] -= self.lr * grad * x;
            }
            self.bias[r] -= self.lr * grad;
        }
        Some(loss / n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_component_is_typed_error() {
        let r = ComponentRegistry::with_builtins();
        let err = r.build("hopfield", &ComponentSpec::default()).err().unwrap();
        assert!(matches!(err, ChainError::UnknownComponent(name) if name == "hopfield"));
    }

    #[test]
    fn identity_cannot_train() {
        let r = ComponentRegistry::with_builtins();
        let mut c = r.build("identity", &ComponentSpec::default()).unwrap();
        assert_eq!(c.process(&[1.0, 2.0]), vec![1.0, 2.0]);
        assert!(c.train_step(&[1.0], &[1.0]).is_none());
    }

    #[test]
    fn dense_loss_decreases() {
        let spec = ComponentSpec {
            width: 8,
            learning_rate: 0.1,
            seed: 4,
        };
        let mut d = Dense::new(&spec);
        let x: Vec<f32> = (0..8).map(|i| i as f32 / 8.0).collect();
        let first = d.train_step(&x, &x).unwrap();
        let mut last = first;
        for _ in 0..200 {
            last = d.train_step(&x, &x).unwrap();
        }
        assert!(last < first);
    }

    #[test]
    fn custom_registration() {
        let mut r = ComponentRegistry::new();
        r.register("echo", build_identity);
        assert_eq!(r.names().collect::<Vec<_>>(), vec!["echo"]);
        assert!(r.build("echo", &ComponentSpec::default()).is_ok());
    }
}
