//! Per-episode configuration (distinct from process-level [`crate::app_config::AppConfig`]).

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub shape: String,
    pub seed: u64,
    pub n_robot: usize,
    pub r_sense: f32,
    pub r_avoid: f32,
    pub n_hn: usize,
    pub n_hc: usize,
    pub grid_size: usize,
    pub l_cell: f32,
    pub dt: f32,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            shape: "circle".to_string(),
            seed: 1234,
            n_robot: 30,
            r_sense: 0.4,
            r_avoid: 0.1,
            n_hn: 6,
            n_hc: 80,
            grid_size: 64,
            l_cell: 1.0,
            dt: 0.05,
        }
    }
}

impl Config {
    /// Fixed per-agent observation vector length: `6 + 4*n_hn + 2 + 2*n_hc`.
    pub fn obs_dim(&self) -> usize {
        6 + 4 * self.n_hn + 2 + 2 * self.n_hc
    }
}
