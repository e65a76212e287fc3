//! A single training run's mutable state, and the concurrent registry of
//! all episodes the server is tracking.
//!
//! Uses `dashmap` (map-level concurrency) alongside `parking_lot`
//! (per-value interior mutability).

use crate::config::Config;
use crate::dsl::PriorDocument;
use crate::env::SwarmEnv;
use crate::error::AppError;
use crate::events::EventEnvelope;
use crate::marl::MultiAgentSystem;
use dashmap::DashMap;
use parking_lot::RwLock;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

pub struct EpisodeState {
    pub env: SwarmEnv,
    pub marl: MultiAgentSystem,
    pub rng: StdRng,
    pub timeline: Vec<EventEnvelope>,
    pub global_step: usize,
    pub episode_idx: usize,
    pub prior_doc: Option<PriorDocument>,
}

pub struct Episode {
    pub id: String,
    pub config: Config,
    pub should_stop: AtomicBool,
    pub state: RwLock<EpisodeState>,
}

impl Episode {
    /// Validates the geometry feasibility condition (`4*n*r_avoid^2` must
    /// not exceed the target shape's total area) before building the
    /// environment and the per-robot learners.
    pub fn new(config: Config) -> Result<Self, AppError> {
        let env = SwarmEnv::new(config.clone())?;
        let n = config.n_robot as f32;
        let shape_area = env.mask.cell_count() as f32 * config.l_cell * config.l_cell;
        if 4.0 * n * config.r_avoid * config.r_avoid > shape_area {
            return Err(AppError::GeometryInfeasible);
        }

        let obs_dim = config.obs_dim();
        let n_robot = config.n_robot;
        let seed = config.seed;
        let marl = MultiAgentSystem::new(
            n_robot,
            obs_dim,
            crate::agent::AgentHyperparams::default,
            crate::marl::MarlHyperparams::default(),
            100_000,
        )
        .map_err(|e| AppError::OperationError(e.to_string()))?;

        Ok(Episode {
            id: generate_episode_id(),
            config,
            should_stop: AtomicBool::new(false),
            state: RwLock::new(EpisodeState {
                env,
                marl,
                rng: StdRng::seed_from_u64(seed),
                timeline: Vec::new(),
                global_step: 0,
                episode_idx: 0,
                prior_doc: None,
            }),
        })
    }

    pub fn stop(&self) {
        self.should_stop.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.should_stop.load(Ordering::SeqCst)
    }

    /// Entries at or after `cursor`, for the SSE streamer.
    pub fn events_from(&self, cursor: usize) -> Vec<EventEnvelope> {
        let guard = self.state.read();
        guard.timeline.iter().filter(|e| e.global_step >= cursor).cloned().collect()
    }
}

fn generate_episode_id() -> String {
    let ms = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis();
    const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
    let mut rng = rand::thread_rng();
    let suffix: String = (0..4).map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char).collect();
    format!("ep-{ms}-{suffix}")
}

/// Concurrent registry of in-memory episodes, keyed by episode id.
#[derive(Default)]
pub struct EpisodeStore {
    episodes: DashMap<String, Arc<Episode>>,
}

impl EpisodeStore {
    pub fn new() -> Self {
        EpisodeStore { episodes: DashMap::new() }
    }

    pub fn create(&self, config: Config) -> Result<Arc<Episode>, AppError> {
        let episode = Arc::new(Episode::new(config)?);
        self.episodes.insert(episode.id.clone(), episode.clone());
        Ok(episode)
    }

    pub fn get(&self, id: &str) -> Result<Arc<Episode>, AppError> {
        self.episodes.get(id).map(|e| e.clone()).ok_or_else(|| AppError::NotFound(id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config() -> Config {
        Config { n_robot: 4, grid_size: 32, r_avoid: 0.05, ..Config::default() }
    }

    #[test]
    fn create_assigns_a_well_formed_id() {
        let ep = Episode::new(small_config()).unwrap();
        assert!(ep.id.starts_with("ep-"));
        assert_eq!(ep.id.split('-').nth(2).unwrap().len(), 4);
    }

    #[test]
    fn geometry_infeasible_configs_are_rejected() {
        let cfg = Config { n_robot: 10_000, r_avoid: 5.0, grid_size: 16, ..Config::default() };
        assert!(matches!(Episode::new(cfg), Err(AppError::GeometryInfeasible)));
    }

    #[test]
    fn store_round_trips_by_id() {
        let store = EpisodeStore::new();
        let ep = store.create(small_config()).unwrap();
        let fetched = store.get(&ep.id).unwrap();
        assert_eq!(fetched.id, ep.id);
    }

    #[test]
    fn unknown_id_is_not_found() {
        let store = EpisodeStore::new();
        assert!(matches!(store.get("ep-does-not-exist"), Err(AppError::NotFound(_))));
    }
}
