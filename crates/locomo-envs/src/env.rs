//! Gym-style environment interface.

use std::collections::HashMap;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Outcome of one environment step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step<O> {
    /// Observation after the step.
    pub observation: O,
    /// Scalar reward for the step.
    pub reward: f64,
    /// Whether the episode has ended.
    pub done: bool,
    /// Extra diagnostics. Empty for the built-in tasks.
    pub info: HashMap<String, f64>,
}

impl<O> Step<O> {
    /// A step with no extra info.
    pub fn new(observation: O, reward: f64, done: bool) -> Self {
        Self {
            observation,
            reward,
            done,
            info: HashMap::new(),
        }
    }
}

/// Shape and bounds of observations or actions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Space {
    /// Box of real values with elementwise bounds.
    Box {
        /// Lower bounds, one per element.
        low: Vec<f32>,
        /// Upper bounds, one per element.
        high: Vec<f32>,
        /// Tensor shape; its product equals the bound lengths.
        shape: Vec<usize>,
    },
    /// Integers `0..n`.
    Discrete(usize),
}

impl Space {
    /// Box with the same bounds on every element.
    pub fn uniform_box(low: f32, high: f32, shape: Vec<usize>) -> Self {
        let len = shape.iter().product();
        Space::Box {
            low: vec![low; len],
            high: vec![high; len],
            shape,
        }
    }

    /// Number of scalar elements (the `n` of a discrete space).
    pub fn dim(&self) -> usize {
        match self {
            Space::Box { shape, .. } => shape.iter().product(),
            Space::Discrete(n) => *n,
        }
    }

    /// Whether `value` lies inside a box space.
    pub fn contains(&self, value: &[f32]) -> bool {
        match self {
            Space::Box { low, high, .. } => {
                value.len() == low.len()
                    && value
                        .iter()
                        .zip(low.iter().zip(high))
                        .all(|(v, (lo, hi))| *v >= *lo && *v <= *hi)
            }
            Space::Discrete(_) => false,
        }
    }

    /// Draw a uniform sample from a box space.
    ///
    /// Unbounded elements are sampled from `[-1, 1]`.
    pub fn sample_box<R: Rng>(&self, rng: &mut R) -> Option<Vec<f32>> {
        match self {
            Space::Box { low, high, .. } => Some(
                low.iter()
                    .zip(high)
                    .map(|(&lo, &hi)| {
                        let lo = if lo.is_finite() { lo } else { -1.0 };
                        let hi = if hi.is_finite() { hi } else { 1.0 };
                        if lo < hi {
                            rng.gen_range(lo..=hi)
                        } else {
                            lo
                        }
                    })
                    .collect(),
            ),
            Space::Discrete(_) => None,
        }
    }

    /// Draw a uniform sample from a discrete space.
    pub fn sample_discrete<R: Rng>(&self, rng: &mut R) -> Option<usize> {
        match self {
            Space::Discrete(n) if *n > 0 => Some(rng.gen_range(0..*n)),
            _ => None,
        }
    }
}

/// A reinforcement-learning environment.
pub trait Env {
    /// Observation type.
    type Observation;
    /// Action type.
    type Action: ?Sized;

    /// Start a new episode and return its first observation.
    fn reset(&mut self) -> Result<Self::Observation>;

    /// Apply `action` and advance the episode by one step.
    fn step(&mut self, action: &Self::Action) -> Result<Step<Self::Observation>>;

    /// Space of valid actions.
    fn action_space(&self) -> Space;

    /// Space of observations.
    fn observation_space(&self) -> Space;

    /// Reseed the environment's random number generator.
    fn seed(&mut self, seed: u64);
}

impl<E: Env + ?Sized> Env for Box<E> {
    type Observation = E::Observation;
    type Action = E::Action;

    fn reset(&mut self) -> Result<Self::Observation> {
        (**self).reset()
    }

    fn step(&mut self, action: &Self::Action) -> Result<Step<Self::Observation>> {
        (**self).step(action)
    }

    fn action_space(&self) -> Space {
        (**self).action_space()
    }

    fn observation_space(&self) -> Space {
        (**self).observation_space()
    }

    fn seed(&mut self, seed: u64) {
        (**self).seed(seed)
    }
}
