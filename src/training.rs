//! The async training loop: one background `tokio` task per episode,
//! stepping the environment, updating the learners, and appending telemetry
//! to the episode's timeline.

use crate::buffer::Transition;
use crate::dsl::{compile_prior_doc, compile_reward_expr, RewardMetrics};
use crate::episode::Episode;
use crate::events::{push_and_truncate, EventEnvelope, EventKind};
use crate::llm_adapter::{GenerateRequest, LlmAdapter};
use crate::metrics::{coverage, uniformity};
use rand::SeedableRng;
use std::sync::Arc;
use tracing::{info, warn};

/// Agent update + prior-state refresh run once every `UPDATE_EVERY` steps,
/// matching the cadence the environment's own neighbor lists are rebuilt at.
const UPDATE_EVERY: usize = 5;
const TICK_EVERY: usize = 20;
const YIELD_EVERY: usize = 50;

pub struct TrainConfig {
    pub episodes: usize,
    pub episode_len: usize,
    pub use_llm: bool,
    pub task_description: Option<String>,
    pub model: Option<String>,
}

/// Generates a prior/reward policy from the LLM backend and installs it on
/// `episode`, or returns the failure as an `AppError` (`LlmUnavailable`,
/// `LlmMalformed`, or `LlmRejected`). Runs to completion before the caller
/// spawns the training loop, so a DSL-generation failure can still be
/// surfaced as an HTTP error to the `/train` caller instead of being lost
/// inside a background task.
pub async fn install_llm_policy(
    episode: &Episode,
    task_description: String,
    model: Option<String>,
    llm: &dyn LlmAdapter,
) -> Result<(), crate::error::AppError> {
    let model = model.unwrap_or_else(|| "gemini-2.0-flash-exp".to_string());
    let env_params = {
        let guard = episode.state.read();
        serde_json::json!({
            "shape": guard.env.cfg.shape,
            "n_robot": guard.env.cfg.n_robot,
            "grid_size": guard.env.cfg.grid_size,
        })
    };
    let request = GenerateRequest { task_description, env_params, model, temperature: 0.2, use_cot: true, use_basic_apis: true };

    let resp = llm.generate(&request).await?;
    let prior = compile_prior_doc(&resp.prior).map_err(|e| crate::error::AppError::LlmRejected(e.to_string()))?;
    let reward_expr = compile_reward_expr(&resp.reward).map_err(|e| crate::error::AppError::LlmRejected(e.to_string()))?;

    let mut guard = episode.state.write();
    guard.marl.set_prior(Some(prior));
    guard.marl.set_reward_expr(Some(reward_expr));
    guard.prior_doc = Some(resp.prior);
    Ok(())
}

/// Spawns the training loop as a detached task. The episode's own
/// `should_stop` flag is the only cancellation channel -- callers observe
/// progress through the episode's timeline, not through this task's join
/// handle. Any LLM-generated policy must already be installed on `episode`
/// (see `install_llm_policy`) before calling this.
pub fn start(episode: Arc<Episode>, cfg: TrainConfig) {
    tokio::spawn(async move {
        if let Err(e) = run(episode, cfg).await {
            warn!(error = %e, "training loop exited with an error");
        }
    });
}

async fn run(episode: Arc<Episode>, cfg: TrainConfig) -> Result<(), crate::error::AppError> {
    emit_env_config(&episode, cfg.use_llm);

    'episodes: for ep_idx in 0..cfg.episodes {
        if episode.is_stopped() {
            break;
        }
        {
            let mut guard = episode.state.write();
            guard.episode_idx = ep_idx;
            guard.env.reset();
        }

        for t in 0..cfg.episode_len {
            if episode.is_stopped() {
                break 'episodes;
            }
            if run_step(&episode, ep_idx, t, cfg.episode_len)? {
                tokio::task::yield_now().await;
            }
        }

        emit_episode_end(&episode, ep_idx, cfg.episode_len.saturating_sub(1));
        info!(episode = ep_idx, "episode complete");
        tokio::task::yield_now().await;
    }

    Ok(())
}

/// One environment step: act, physics, reward, buffer push, periodic agent
/// update, periodic telemetry.
fn run_step(episode: &Episode, ep_idx: usize, t: usize, episode_len: usize) -> Result<bool, crate::error::AppError> {
    let mut guard = episode.state.write();
    let state = &mut *guard;

    let refresh_prior = state.marl.has_prior() && t % UPDATE_EVERY == 0;
    let state_dicts = refresh_prior.then(|| state.env.state_dicts());
    let obs = state.env.observe();

    let actions = state
        .marl
        .act(&obs, state_dicts.as_deref(), false, &mut state.rng)
        .map_err(|e| crate::error::AppError::OperationError(e.to_string()))?;

    let (_, pairs) = state.env.step(&actions);
    let collisions_n = pairs.len();

    let next_obs = state.env.observe();
    let positions = state.env.positions();
    let velocities = state.env.velocities();
    let coverage_m = coverage(&state.env.mask, &positions, state.env.cfg.r_avoid) as f64;
    let uniformity_m = uniformity(&positions, &state.env.mask, &mut state.rng) as f64;

    let metrics = RewardMetrics { coverage: coverage_m, uniformity: uniformity_m, collisions: collisions_n as f64 };
    let reward = state.marl.reward(&metrics);
    let done = if t + 1 == episode_len { 1.0 } else { 0.0 };

    let prior_actions: Vec<Option<(f32, f32)>> = if state.marl.has_prior() {
        let state_dicts = state.env.state_dicts();
        (0..state.env.n()).map(|i| state.marl.prior_action(&state_dicts[i])).collect()
    } else {
        vec![None; state.env.n()]
    };

    for i in 0..state.env.n() {
        state.marl.push(
            i,
            Transition {
                obs: obs[i].clone(),
                action: actions[i],
                reward: reward as f32,
                next_obs: next_obs[i].clone(),
                done,
                prior_action: prior_actions[i],
            },
        );
    }

    if t % UPDATE_EVERY == 0 {
        state
            .marl
            .step_update(&mut state.rng)
            .map_err(|e| crate::error::AppError::OperationError(e.to_string()))?;
    }

    state.global_step += 1;
    let global_step = state.global_step;

    if t % TICK_EVERY == 0 {
        push_and_truncate(
            &mut state.timeline,
            EventEnvelope {
                global_step,
                kind: EventKind::Tick {
                    episode: ep_idx,
                    step: t,
                    global_step,
                    reward_mean: reward,
                    coverage: coverage_m,
                    uniformity: uniformity_m,
                    positions,
                    velocities,
                    collision_pairs: pairs,
                },
            },
        );
    }

    Ok(global_step % YIELD_EVERY == 0)
}

fn emit_env_config(episode: &Episode, use_llm: bool) {
    let mut guard = episode.state.write();
    let kind = EventKind::EnvConfig {
        shape: guard.env.cfg.shape.clone(),
        n_robot: guard.env.cfg.n_robot,
        r_sense: guard.env.cfg.r_sense,
        r_avoid: guard.env.cfg.r_avoid,
        grid_size: guard.env.cfg.grid_size,
        l_cell: guard.env.cfg.l_cell,
        use_llm,
    };
    let global_step = guard.global_step;
    push_and_truncate(&mut guard.timeline, EventEnvelope { global_step, kind });
}

fn emit_episode_end(episode: &Episode, ep_idx: usize, terminal_step: usize) {
    let mut guard = episode.state.write();
    let positions = guard.env.positions();
    let velocities = guard.env.velocities();
    let seed = guard.env.cfg.seed.wrapping_add(ep_idx as u64);
    let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
    let coverage_m = coverage(&guard.env.mask, &positions, guard.env.cfg.r_avoid) as f64;
    let uniformity_m = uniformity(&positions, &guard.env.mask, &mut rng) as f64;
    let global_step = guard.global_step;
    push_and_truncate(
        &mut guard.timeline,
        EventEnvelope {
            global_step,
            kind: EventKind::EpisodeEnd {
                episode: ep_idx,
                step: terminal_step,
                coverage: coverage_m,
                uniformity: uniformity_m,
                final_positions: positions,
                final_velocities: velocities,
            },
        },
    );
}
