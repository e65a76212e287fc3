//! A single deterministic-policy learner (actor, critic, their targets,
//! optimizer state, and one gradient step).

use crate::buffer::Transition;
use crate::net::{device, hard_copy, soft_update, Mlp, OutputActivation};
use candle_core::{DType, Tensor};
use candle_nn::{AdamW, Optimizer, ParamsAdamW, VarBuilder, VarMap};
use rand::rngs::StdRng;
use rand_distr::{Distribution, Normal};

const ACT_DIM: usize = 2;

pub struct AgentHyperparams {
    pub lr_actor: f64,
    pub lr_critic: f64,
    pub gamma: f64,
    pub tau: f64,
    pub sigma: f32,
}

impl Default for AgentHyperparams {
    fn default() -> Self {
        AgentHyperparams { lr_actor: 1e-4, lr_critic: 1e-3, gamma: 0.99, tau: 0.005, sigma: 0.1 }
    }
}

pub struct Agent {
    obs_dim: usize,
    actor: Mlp,
    actor_t: Mlp,
    critic: Mlp,
    critic_t: Mlp,
    actor_vars: VarMap,
    actor_t_vars: VarMap,
    critic_vars: VarMap,
    critic_t_vars: VarMap,
    opt_actor: AdamW,
    opt_critic: AdamW,
    hp: AgentHyperparams,
}

impl Agent {
    pub fn new(obs_dim: usize, hp: AgentHyperparams) -> candle_core::Result<Self> {
        let dev = device();

        let actor_vars = VarMap::new();
        let actor = Mlp::new(
            VarBuilder::from_varmap(&actor_vars, DType::F32, &dev),
            obs_dim,
            ACT_DIM,
            OutputActivation::Tanh,
        )?;
        let actor_t_vars = VarMap::new();
        let actor_t = Mlp::new(
            VarBuilder::from_varmap(&actor_t_vars, DType::F32, &dev),
            obs_dim,
            ACT_DIM,
            OutputActivation::Tanh,
        )?;

        let critic_vars = VarMap::new();
        let critic = Mlp::new(
            VarBuilder::from_varmap(&critic_vars, DType::F32, &dev),
            obs_dim + ACT_DIM,
            1,
            OutputActivation::Linear,
        )?;
        let critic_t_vars = VarMap::new();
        let critic_t = Mlp::new(
            VarBuilder::from_varmap(&critic_t_vars, DType::F32, &dev),
            obs_dim + ACT_DIM,
            1,
            OutputActivation::Linear,
        )?;

        hard_copy(&actor_t_vars, &actor_vars)?;
        hard_copy(&critic_t_vars, &critic_vars)?;

        let opt_actor = AdamW::new(actor_vars.all_vars(), ParamsAdamW { lr: hp.lr_actor, ..Default::default() })?;
        let opt_critic = AdamW::new(critic_vars.all_vars(), ParamsAdamW { lr: hp.lr_critic, ..Default::default() })?;

        Ok(Agent {
            obs_dim,
            actor,
            actor_t,
            critic,
            critic_t,
            actor_vars,
            actor_t_vars,
            critic_vars,
            critic_t_vars,
            opt_actor,
            opt_critic,
            hp,
        })
    }

    /// Computes `a = actor(obs)`, optionally blends in a prior action, adds
    /// exploration noise unless `deterministic`, and clips to `[-1,1]`.
    pub fn act(
        &self,
        obs: &[f32],
        prior_action: Option<(f32, f32)>,
        beta: f32,
        deterministic: bool,
        rng: &mut StdRng,
    ) -> candle_core::Result<(f32, f32)> {
        debug_assert_eq!(obs.len(), self.obs_dim);
        let dev = device();
        let obs_t = Tensor::from_vec(obs.to_vec(), (1, self.obs_dim), &dev)?;
        let a = self.actor.forward(&obs_t)?;
        let raw = a.squeeze(0)?.to_vec1::<f32>()?;
        let mut action = (raw[0], raw[1]);

        if let Some(prior) = prior_action {
            if beta > 0.0 {
                action = (
                    (1.0 - beta) * action.0 + beta * prior.0,
                    (1.0 - beta) * action.1 + beta * prior.1,
                );
            }
        }

        if !deterministic {
            let noise = Normal::new(0.0f32, self.hp.sigma).unwrap();
            action = (action.0 + noise.sample(rng), action.1 + noise.sample(rng));
        }

        Ok((action.0.clamp(-1.0, 1.0), action.1.clamp(-1.0, 1.0)))
    }

    /// One gradient step over a sampled batch. Returns `(actor_loss,
    /// critic_loss)`. `alpha_prior > 0` with `prior_actions` present adds
    /// the prior-regularization term to the actor loss.
    pub fn update(
        &mut self,
        batch: &[Transition],
        alpha_prior: f32,
    ) -> candle_core::Result<(f32, f32)> {
        let dev = device();
        let b = batch.len();

        let obs: Vec<f32> = batch.iter().flat_map(|t| t.obs.iter().copied()).collect();
        let nobs: Vec<f32> = batch.iter().flat_map(|t| t.next_obs.iter().copied()).collect();
        let act: Vec<f32> = batch.iter().flat_map(|t| [t.action.0, t.action.1]).collect();
        let rew: Vec<f32> = batch.iter().map(|t| t.reward).collect();
        let done: Vec<f32> = batch.iter().map(|t| t.done).collect();

        let obs_t = Tensor::from_vec(obs, (b, self.obs_dim), &dev)?;
        let nobs_t = Tensor::from_vec(nobs, (b, self.obs_dim), &dev)?;
        let act_t = Tensor::from_vec(act, (b, ACT_DIM), &dev)?;
        let rew_t = Tensor::from_vec(rew, (b, 1), &dev)?;
        let done_t = Tensor::from_vec(done, (b, 1), &dev)?;

        // TD target, detached: y = r + gamma*(1-done)*critic_t(nobs, actor_t(nobs))
        let na = self.actor_t.forward(&nobs_t)?;
        let q_t_in = Tensor::cat(&[&nobs_t, &na], 1)?;
        let q_t = self.critic_t.forward(&q_t_in)?;
        let not_done = done_t.affine(-1.0, 1.0)?;
        let y = rew_t.add(&not_done.mul(&q_t.affine(self.hp.gamma, 0.0)?)?)?;
        let y = y.detach();

        // Critic loss: MSE(critic(o,a) - y)
        let q_in = Tensor::cat(&[&obs_t, &act_t], 1)?;
        let q = self.critic.forward(&q_in)?;
        let diff = q.sub(&y)?;
        let loss_c = diff.sqr()?.mean_all()?;
        self.opt_critic.backward_step(&loss_c)?;

        // Actor loss: -mean(critic(o, actor(o))) [+ prior regularization]
        let a = self.actor.forward(&obs_t)?;
        let pi_in = Tensor::cat(&[&obs_t, &a], 1)?;
        let q_pi = self.critic.forward(&pi_in)?;
        let mut loss_a = q_pi.mean_all()?.neg()?;

        let has_prior = alpha_prior > 0.0 && batch.iter().all(|t| t.prior_action.is_some());
        if has_prior {
            let prior: Vec<f32> = batch
                .iter()
                .flat_map(|t| {
                    let p = t.prior_action.unwrap();
                    [p.0, p.1]
                })
                .collect();
            let prior_t = Tensor::from_vec(prior, (b, ACT_DIM), &dev)?;
            let reg = a.sub(&prior_t)?.sqr()?.mean_all()?.affine(alpha_prior as f64, 0.0)?;
            loss_a = loss_a.add(&reg)?;
        }
        self.opt_actor.backward_step(&loss_a)?;

        soft_update(&self.actor_t_vars, &self.actor_vars, self.hp.tau)?;
        soft_update(&self.critic_t_vars, &self.critic_vars, self.hp.tau)?;

        Ok((loss_a.to_scalar::<f32>()?, loss_c.to_scalar::<f32>()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn sample_transition(obs_dim: usize) -> Transition {
        Transition {
            obs: vec![0.1; obs_dim],
            action: (0.2, -0.3),
            reward: 1.0,
            next_obs: vec![0.1; obs_dim],
            done: 0.0,
            prior_action: None,
        }
    }

    #[test]
    fn act_returns_bounded_action() {
        let agent = Agent::new(12, AgentHyperparams::default()).unwrap();
        let mut rng = StdRng::seed_from_u64(0);
        let obs = vec![0.5; 12];
        let (x, y) = agent.act(&obs, None, 0.0, false, &mut rng).unwrap();
        assert!((-1.0..=1.0).contains(&x));
        assert!((-1.0..=1.0).contains(&y));
    }

    #[test]
    fn prior_blend_with_full_beta_matches_prior() {
        let agent = Agent::new(8, AgentHyperparams::default()).unwrap();
        let mut rng = StdRng::seed_from_u64(0);
        let obs = vec![0.0; 8];
        let (x, y) = agent.act(&obs, Some((0.4, -0.6)), 1.0, true, &mut rng).unwrap();
        assert!((x - 0.4).abs() < 1e-5);
        assert!((y - (-0.6)).abs() < 1e-5);
    }

    #[test]
    fn critic_loss_is_nonnegative() {
        let mut agent = Agent::new(6, AgentHyperparams::default()).unwrap();
        let batch: Vec<Transition> = (0..8).map(|_| sample_transition(6)).collect();
        let (_, loss_c) = agent.update(&batch, 0.0).unwrap();
        assert!(loss_c >= 0.0);
    }
}
