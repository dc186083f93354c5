//! Episode length limit wrapper.

use crate::env::{Env, Space, Step};
use crate::error::{EnvError, Result};

/// Episode length the tasks are registered with.
pub const DEFAULT_MAX_EPISODE_STEPS: u64 = 1000;

/// Info key set to 1.0 when an episode ends by hitting the step limit
/// rather than by the task itself.
pub const TRUNCATED: &str = "TimeLimit.truncated";

/// Ends episodes after a fixed number of steps.
pub struct TimeLimit<E> {
    env: E,
    max_episode_steps: u64,
    elapsed: Option<u64>,
}

impl<E: Env> TimeLimit<E> {
    /// Wrap `env` with the default limit.
    pub fn new(env: E) -> Self {
        Self::with_max_steps(env, DEFAULT_MAX_EPISODE_STEPS)
    }

    /// Wrap `env`, ending episodes after `max_episode_steps` steps.
    pub fn with_max_steps(env: E, max_episode_steps: u64) -> Self {
        Self {
            env,
            max_episode_steps,
            elapsed: None,
        }
    }

    /// Step limit.
    pub fn max_episode_steps(&self) -> u64 {
        self.max_episode_steps
    }

    /// Steps taken in the current episode.
    pub fn elapsed_steps(&self) -> u64 {
        self.elapsed.unwrap_or(0)
    }

    /// The wrapped environment.
    pub fn inner(&self) -> &E {
        &self.env
    }

    /// Mutable access to the wrapped environment.
    pub fn inner_mut(&mut self) -> &mut E {
        &mut self.env
    }

    /// Unwrap.
    pub fn into_inner(self) -> E {
        self.env
    }
}

impl<E: Env> Env for TimeLimit<E> {
    type Observation = E::Observation;
    type Action = E::Action;

    fn reset(&mut self) -> Result<Self::Observation> {
        let observation = self.env.reset()?;
        self.elapsed = Some(0);
        Ok(observation)
    }

    fn step(&mut self, action: &Self::Action) -> Result<Step<Self::Observation>> {
        let elapsed = self.elapsed.ok_or(EnvError::NotReset)?;
        let mut step = self.env.step(action)?;
        let elapsed = elapsed + 1;
        self.elapsed = Some(elapsed);
        if elapsed >= self.max_episode_steps {
            if !step.done {
                step.info.insert(TRUNCATED.to_string(), 1.0);
            }
            step.done = true;
        }
        Ok(step)
    }

    fn action_space(&self) -> Space {
        self.env.action_space()
    }

    fn observation_space(&self) -> Space {
        self.env.observation_space()
    }

    fn seed(&mut self, seed: u64) {
        self.env.seed(seed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Counts steps and ends on its own after `done_at`.
    struct Counter {
        steps: u64,
        done_at: u64,
    }

    impl Env for Counter {
        type Observation = u64;
        type Action = ();

        fn reset(&mut self) -> Result<u64> {
            self.steps = 0;
            Ok(0)
        }

        fn step(&mut self, _action: &()) -> Result<Step<u64>> {
            self.steps += 1;
            Ok(Step::new(self.steps, 1.0, self.steps >= self.done_at))
        }

        fn action_space(&self) -> Space {
            Space::Discrete(1)
        }

        fn observation_space(&self) -> Space {
            Space::Discrete(u64::MAX as usize)
        }

        fn seed(&mut self, _seed: u64) {}
    }

    #[test]
    fn truncates_at_limit() {
        let mut env = TimeLimit::with_max_steps(
            Counter {
                steps: 0,
                done_at: 100,
            },
            3,
        );
        env.reset().unwrap();
        assert!(!env.step(&()).unwrap().done);
        assert!(!env.step(&()).unwrap().done);
        let last = env.step(&()).unwrap();
        assert!(last.done);
        assert_eq!(last.info.get(TRUNCATED), Some(&1.0));
        assert_eq!(env.elapsed_steps(), 3);

        env.reset().unwrap();
        assert_eq!(env.elapsed_steps(), 0);
        assert!(!env.step(&()).unwrap().done);
    }

    #[test]
    fn natural_end_is_not_truncation() {
        let mut env = TimeLimit::with_max_steps(
            Counter {
                steps: 0,
                done_at: 2,
            },
            2,
        );
        env.reset().unwrap();
        env.step(&()).unwrap();
        let last = env.step(&()).unwrap();
        assert!(last.done);
        assert!(last.info.is_empty());
    }

    #[test]
    fn requires_reset() {
        let mut env = TimeLimit::new(Counter {
            steps: 0,
            done_at: 1,
        });
        assert_eq!(env.max_episode_steps(), DEFAULT_MAX_EPISODE_STEPS);
        assert!(matches!(env.step(&()), Err(EnvError::NotReset)));
    }
}
