//! Bounded per-agent replay buffer.

use crate::error::AppError;
use rand::rngs::StdRng;
use rand::seq::index::sample;
use std::collections::VecDeque;

/// One `(o, a, r, o', d)` transition. `prior_action`, when present, is the
/// prior-policy action computed for `o` at push time -- see DESIGN.md's
/// resolution of the prior-regularization Open Question.
#[derive(Clone, Debug)]
pub struct Transition {
    pub obs: Vec<f32>,
    pub action: (f32, f32),
    pub reward: f32,
    pub next_obs: Vec<f32>,
    pub done: f32,
    pub prior_action: Option<(f32, f32)>,
}

/// Bounded FIFO of capacity `C`, oldest-dropping on overflow.
pub struct ReplayBuffer {
    capacity: usize,
    buf: VecDeque<Transition>,
}

impl ReplayBuffer {
    pub fn new(capacity: usize) -> Self {
        ReplayBuffer {
            capacity,
            buf: VecDeque::with_capacity(capacity.min(1 << 20)),
        }
    }

    pub fn push(&mut self, t: Transition) {
        if self.buf.len() >= self.capacity {
            self.buf.pop_front();
        }
        self.buf.push_back(t);
    }

    pub fn size(&self) -> usize {
        self.buf.len()
    }

    /// Draws `batch_size` transitions uniformly without replacement.
    pub fn sample(&self, batch_size: usize, rng: &mut StdRng) -> Result<Vec<Transition>, AppError> {
        if self.buf.len() < batch_size {
            return Err(AppError::BufferUnderfilled {
                have: self.buf.len(),
                need: batch_size,
            });
        }
        let idx = sample(rng, self.buf.len(), batch_size);
        Ok(idx.iter().map(|i| self.buf[i].clone()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn dummy(i: f32) -> Transition {
        Transition {
            obs: vec![i],
            action: (0.0, 0.0),
            reward: i,
            next_obs: vec![i],
            done: 0.0,
            prior_action: None,
        }
    }

    #[test]
    fn capacity_is_never_exceeded() {
        let mut b = ReplayBuffer::new(4);
        for i in 0..10 {
            b.push(dummy(i as f32));
        }
        assert_eq!(b.size(), 4);
    }

    #[test]
    fn oldest_is_dropped_first() {
        let mut b = ReplayBuffer::new(2);
        b.push(dummy(1.0));
        b.push(dummy(2.0));
        b.push(dummy(3.0));
        let mut rng = StdRng::seed_from_u64(0);
        let sampled = b.sample(2, &mut rng).unwrap();
        let rewards: Vec<f32> = sampled.iter().map(|t| t.reward).collect();
        assert!(!rewards.contains(&1.0));
    }

    #[test]
    fn sampling_below_capacity_errs() {
        let b = ReplayBuffer::new(10);
        let mut rng = StdRng::seed_from_u64(0);
        assert!(matches!(b.sample(1, &mut rng), Err(AppError::BufferUnderfilled { .. })));
    }

    #[test]
    fn sample_has_no_duplicate_indices() {
        let mut b = ReplayBuffer::new(100);
        for i in 0..50 {
            b.push(dummy(i as f32));
        }
        let mut rng = StdRng::seed_from_u64(42);
        let sampled = b.sample(50, &mut rng).unwrap();
        let mut rewards: Vec<i64> = sampled.iter().map(|t| t.reward as i64).collect();
        rewards.sort();
        rewards.dedup();
        assert_eq!(rewards.len(), 50);
    }
}
