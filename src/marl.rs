//! Orchestrates one independent [`Agent`] per robot, sharing the swarm
//! environment and an optional installed prior policy / reward formula.

use crate::agent::{Agent, AgentHyperparams};
use crate::buffer::{ReplayBuffer, Transition};
use crate::dsl::{CompiledExpr, CompiledPrior, RewardMetrics};
use crate::env::StateDict;
use rand::rngs::StdRng;

pub struct MarlHyperparams {
    pub batch_size: usize,
    pub warmup: usize,
    pub alpha_prior: f32,
    pub beta: f32,
}

impl Default for MarlHyperparams {
    fn default() -> Self {
        MarlHyperparams { batch_size: 128, warmup: 1000, alpha_prior: 0.1, beta: 0.3 }
    }
}

/// N independent agents, each with its own replay buffer. The prior policy
/// and reward formula are shared across agents: both are optional and, when
/// absent, fall back to the zero prior and the plain coverage reward.
pub struct MultiAgentSystem {
    agents: Vec<Agent>,
    buffers: Vec<ReplayBuffer>,
    prior: Option<CompiledPrior>,
    reward_expr: Option<CompiledExpr>,
    hp: MarlHyperparams,
}

impl MultiAgentSystem {
    pub fn new(
        n: usize,
        obs_dim: usize,
        agent_hp: impl Fn() -> AgentHyperparams,
        hp: MarlHyperparams,
        buffer_capacity: usize,
    ) -> candle_core::Result<Self> {
        let mut agents = Vec::with_capacity(n);
        let mut buffers = Vec::with_capacity(n);
        for _ in 0..n {
            agents.push(Agent::new(obs_dim, agent_hp())?);
            buffers.push(ReplayBuffer::new(buffer_capacity));
        }
        Ok(MultiAgentSystem { agents, buffers, prior: None, reward_expr: None, hp })
    }

    pub fn n_agents(&self) -> usize {
        self.agents.len()
    }

    pub fn set_prior(&mut self, prior: Option<CompiledPrior>) {
        self.prior = prior;
    }

    pub fn set_reward_expr(&mut self, expr: Option<CompiledExpr>) {
        self.reward_expr = expr;
    }

    pub fn has_prior(&self) -> bool {
        self.prior.is_some()
    }

    /// Evaluates the installed prior, if any, for robot `i`'s state.
    pub fn prior_action(&self, state: &StateDict) -> Option<(f32, f32)> {
        self.prior.as_ref().map(|p| p.eval(state))
    }

    /// Reward for one step's metrics: the installed formula, or plain
    /// coverage when none has been compiled.
    pub fn reward(&self, metrics: &RewardMetrics) -> f64 {
        match &self.reward_expr {
            Some(expr) => expr.eval(metrics),
            None => metrics.coverage,
        }
    }

    /// Actions for every robot: `state_dicts` must be `Some` whenever a
    /// prior is installed and `beta > 0`.
    pub fn act(
        &self,
        obs: &[Vec<f32>],
        state_dicts: Option<&[StateDict]>,
        deterministic: bool,
        rng: &mut StdRng,
    ) -> candle_core::Result<Vec<(f32, f32)>> {
        debug_assert_eq!(obs.len(), self.agents.len());
        let mut out = Vec::with_capacity(self.agents.len());
        for (i, agent) in self.agents.iter().enumerate() {
            let prior = state_dicts.and_then(|s| self.prior_action(&s[i]));
            out.push(agent.act(&obs[i], prior, self.hp.beta, deterministic, rng)?);
        }
        Ok(out)
    }

    pub fn push(&mut self, i: usize, t: Transition) {
        self.buffers[i].push(t);
    }

    /// One gradient step per agent whose buffer has reached warmup. Returns
    /// `(mean actor loss, mean critic loss)` over the agents that updated,
    /// or `None` if no buffer has warmed up yet.
    pub fn step_update(&mut self, rng: &mut StdRng) -> candle_core::Result<Option<(f32, f32)>> {
        let mut sum = (0.0f32, 0.0f32);
        let mut updated = 0usize;
        for (buffer, agent) in self.buffers.iter().zip(self.agents.iter_mut()) {
            if buffer.size() < self.hp.warmup {
                continue;
            }
            let batch = buffer
                .sample(self.hp.batch_size, rng)
                .expect("warmup check above guarantees enough transitions");
            let (la, lc) = agent.update(&batch, self.hp.alpha_prior)?;
            sum.0 += la;
            sum.1 += lc;
            updated += 1;
        }
        if updated == 0 {
            Ok(None)
        } else {
            Ok(Some((sum.0 / updated as f32, sum.1 / updated as f32)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsl::compile_reward_expr;
    use rand::SeedableRng;

    #[test]
    fn falls_back_to_coverage_without_installed_formula() {
        let sys = MultiAgentSystem::new(2, 4, AgentHyperparams::default, MarlHyperparams::default(), 16).unwrap();
        let m = RewardMetrics { coverage: 0.7, uniformity: 0.0, collisions: 3.0 };
        assert_eq!(sys.reward(&m), 0.7);
    }

    #[test]
    fn installed_formula_overrides_default() {
        let mut sys = MultiAgentSystem::new(2, 4, AgentHyperparams::default, MarlHyperparams::default(), 16).unwrap();
        sys.set_reward_expr(Some(compile_reward_expr("coverage - 0.1*collisions").unwrap()));
        let m = RewardMetrics { coverage: 0.7, uniformity: 0.0, collisions: 3.0 };
        assert!((sys.reward(&m) - 0.4).abs() < 1e-6);
    }

    #[test]
    fn no_update_before_warmup() {
        let mut sys =
            MultiAgentSystem::new(2, 4, AgentHyperparams::default, MarlHyperparams { warmup: 100, ..MarlHyperparams::default() }, 16)
                .unwrap();
        let mut rng = StdRng::seed_from_u64(0);
        assert!(sys.step_update(&mut rng).unwrap().is_none());
    }

    #[test]
    fn update_runs_once_warmed_up() {
        let hp = MarlHyperparams { warmup: 4, batch_size: 4, ..MarlHyperparams::default() };
        let mut sys = MultiAgentSystem::new(1, 4, AgentHyperparams::default, hp, 32).unwrap();
        for i in 0..4 {
            sys.push(
                0,
                Transition {
                    obs: vec![0.1; 4],
                    action: (0.0, 0.0),
                    reward: i as f32,
                    next_obs: vec![0.1; 4],
                    done: 0.0,
                    prior_action: None,
                },
            );
        }
        let mut rng = StdRng::seed_from_u64(0);
        assert!(sys.step_update(&mut rng).unwrap().is_some());
    }
}
