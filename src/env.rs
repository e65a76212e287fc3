//! Discrete-grid 2D physics simulator for the swarm shape-formation task.

use crate::config::Config;
use crate::shapes::ShapeMask;
use rand::rngs::StdRng;
use rand::seq::index::sample;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use rayon::prelude::*;

const K_DAMP: f32 = 0.1;
const K_CENTER: f32 = 0.05;

/// One neighboring robot's relative state, as consumed by prior operations.
#[derive(Clone, Copy, Debug)]
pub struct Neighbor {
    pub position: (f32, f32),
    pub velocity: (f32, f32),
}

/// Per-robot state snapshot consumed only when a prior policy is installed.
#[derive(Clone, Debug)]
pub struct StateDict {
    pub position: (f32, f32),
    pub velocity: (f32, f32),
    pub target_center: (f32, f32),
    pub neighbors: Vec<Neighbor>,
    pub nearby_cells: Vec<(f32, f32)>,
}

pub struct SwarmEnv {
    pub cfg: Config,
    pub mask: ShapeMask,
    px: Vec<f32>,
    py: Vec<f32>,
    vx: Vec<f32>,
    vy: Vec<f32>,
    rng: StdRng,
}

impl SwarmEnv {
    pub fn new(cfg: Config) -> Result<Self, crate::error::AppError> {
        let mask = ShapeMask::new(&cfg.shape, cfg.grid_size)?;
        let n = cfg.n_robot;
        let mut env = SwarmEnv {
            rng: StdRng::seed_from_u64(cfg.seed),
            cfg,
            mask,
            px: vec![0.0; n],
            py: vec![0.0; n],
            vx: vec![0.0; n],
            vy: vec![0.0; n],
        };
        env.reset();
        Ok(env)
    }

    pub fn n(&self) -> usize {
        self.cfg.n_robot
    }

    pub fn positions(&self) -> Vec<(f32, f32)> {
        self.px.iter().copied().zip(self.py.iter().copied()).collect()
    }

    pub fn velocities(&self) -> Vec<(f32, f32)> {
        self.vx.iter().copied().zip(self.vy.iter().copied()).collect()
    }

    /// Picks N shape cells uniformly at random (with replacement), jitters
    /// positions with Gaussian noise (sigma=2.0), draws velocities from
    /// N(0, 0.1^2). Returns the initial observation matrix.
    pub fn reset(&mut self) -> Vec<Vec<f32>> {
        let cells = self.mask.shape_cells();
        let n = self.cfg.n_robot;
        let pos_noise = Normal::new(0.0f32, 2.0).unwrap();
        let vel_noise = Normal::new(0.0f32, 0.1).unwrap();

        if cells.is_empty() {
            // Invariant in spec: masks always have >=1 cell; guarded defensively.
            let (cx, cy) = (self.cfg.grid_size as f32 / 2.0, self.cfg.grid_size as f32 / 2.0);
            for i in 0..n {
                self.px[i] = cx;
                self.py[i] = cy;
                self.vx[i] = 0.0;
                self.vy[i] = 0.0;
            }
        } else {
            for i in 0..n {
                let idx = self.rng.gen_range(0..cells.len());
                let (cx, cy) = cells[idx];
                self.px[i] = clamp(cx + pos_noise.sample(&mut self.rng), 0.0, self.cfg.grid_size as f32 - 1.0);
                self.py[i] = clamp(cy + pos_noise.sample(&mut self.rng), 0.0, self.cfg.grid_size as f32 - 1.0);
                self.vx[i] = clamp(vel_noise.sample(&mut self.rng), -3.0, 3.0);
                self.vy[i] = clamp(vel_noise.sample(&mut self.rng), -3.0, 3.0);
            }
        }
        self.observe()
    }

    /// Builds the fixed-length observation vector for every robot.
    pub fn observe(&mut self) -> Vec<Vec<f32>> {
        let n = self.cfg.n_robot;
        (0..n).map(|i| self.obs_i(i)).collect()
    }

    fn obs_i(&mut self, i: usize) -> Vec<f32> {
        let g = &self.cfg;
        let (xi, yi) = (self.px[i], self.py[i]);
        let (vxi, vyi) = (self.vx[i], self.vy[i]);

        let mut vec = Vec::with_capacity(g.obs_dim());
        vec.extend_from_slice(&[xi, yi, vxi, vyi, 0.0, 0.0]);

        // Neighbors in ascending squared-distance order, excluding self.
        let max_d2 = (g.r_sense * g.grid_size as f32 / 8.0).powi(2);
        let mut order: Vec<usize> = (0..self.cfg.n_robot).filter(|&j| j != i).collect();
        order.sort_by(|&a, &b| {
            let da = sq_dist(self.px[a] - xi, self.py[a] - yi);
            let db = sq_dist(self.px[b] - xi, self.py[b] - yi);
            da.partial_cmp(&db).unwrap()
        });

        let mut neigh = Vec::with_capacity(4 * g.n_hn);
        for &j in &order {
            if neigh.len() >= 4 * g.n_hn {
                break;
            }
            let d2 = sq_dist(self.px[j] - xi, self.py[j] - yi);
            if d2 <= max_d2 {
                neigh.push(self.px[j] - xi);
                neigh.push(self.py[j] - yi);
                neigh.push(self.vx[j] - vxi);
                neigh.push(self.vy[j] - vyi);
            }
        }
        neigh.resize(4 * g.n_hn, 0.0);
        vec.extend_from_slice(&neigh);

        // Target cell: one uniformly-random shape-cell position, relative.
        let cells = self.mask.shape_cells();
        if cells.is_empty() {
            vec.extend_from_slice(&[0.0, 0.0]);
        } else {
            let k = self.rng.gen_range(0..cells.len());
            vec.push(cells[k].0 - xi);
            vec.push(cells[k].1 - yi);
        }

        // Nearby cells: min(n_hc, |shape cells|) uniformly-random without replacement.
        let k2 = g.n_hc.min(cells.len());
        let mut unocc = Vec::with_capacity(2 * g.n_hc);
        if k2 > 0 {
            let sel = sample(&mut self.rng, cells.len(), k2);
            for idx in sel.iter() {
                unocc.push(cells[idx].0 - xi);
                unocc.push(cells[idx].1 - yi);
            }
        }
        unocc.resize(2 * g.n_hc, 0.0);
        vec.extend_from_slice(&unocc);

        vec
    }

    /// Advances physics by one step given an NÃ—2 action matrix clipped to
    /// `[-1,1]`. Returns the new observation and the list of colliding pairs.
    pub fn step(&mut self, actions: &[(f32, f32)]) -> (Vec<Vec<f32>>, Vec<(usize, usize)>) {
        let n = self.cfg.n_robot;
        let g = self.cfg.grid_size as f32;
        let center = (g / 2.0, g / 2.0);
        let dt = self.cfg.dt;

        self.px
            .par_iter_mut()
            .zip(self.py.par_iter_mut())
            .zip(self.vx.par_iter_mut())
            .zip(self.vy.par_iter_mut())
            .zip(actions.par_iter())
            .for_each(|((((px, py), vx), vy), action)| {
                let fa = (clamp(action.0, -1.0, 1.0), clamp(action.1, -1.0, 1.0));
                let fb = (
                    -K_DAMP * *vx + K_CENTER * (center.0 - *px),
                    -K_DAMP * *vy + K_CENTER * (center.1 - *py),
                );
                *vx = clamp(*vx + (fa.0 + fb.0) * dt, -3.0, 3.0);
                *vy = clamp(*vy + (fa.1 + fb.1) * dt, -3.0, 3.0);
                *px = clamp(*px + *vx * dt, 0.0, g - 1.0);
                *py = clamp(*py + *vy * dt, 0.0, g - 1.0);
            });

        // Collision pass: sequential because a colliding pair mutates both
        // indices' velocities in place.
        let mut pairs = Vec::new();
        let thr = (2.0 * self.cfg.r_avoid * g / 16.0).max(1.0);
        for i in 0..n {
            for j in (i + 1)..n {
                let dx = self.px[i] - self.px[j];
                let dy = self.py[i] - self.py[j];
                let d = (dx * dx + dy * dy).sqrt();
                if d < thr {
                    pairs.push((i, j));
                    let inv = 1.0 / (d + 1e-6);
                    let (ux, uy) = (dx * inv, dy * inv);
                    self.vx[i] += ux * 0.2;
                    self.vy[i] += uy * 0.2;
                    self.vx[j] -= ux * 0.2;
                    self.vy[j] -= uy * 0.2;
                }
            }
        }

        let obs = self.observe();
        (obs, pairs)
    }

    /// Per-robot state snapshots consumed by prior operations; only built
    /// when a prior policy is installed.
    pub fn state_dicts(&self) -> Vec<StateDict> {
        let n = self.cfg.n_robot;
        let g = &self.cfg;
        let target_center = self.mask.centroid();
        let max_d2 = (g.r_sense * g.grid_size as f32 / 8.0).powi(2);
        let cells = self.mask.shape_cells();
        let occ_thr = (g.r_avoid * g.grid_size as f32 / 4.0).max(1.0);

        (0..n)
            .map(|i| {
                let (xi, yi) = (self.px[i], self.py[i]);
                let mut neighbor_idx: Vec<usize> = (0..n).filter(|&j| j != i).collect();
                neighbor_idx.sort_by(|&a, &b| {
                    let da = sq_dist(self.px[a] - xi, self.py[a] - yi);
                    let db = sq_dist(self.px[b] - xi, self.py[b] - yi);
                    da.partial_cmp(&db).unwrap()
                });
                let neighbors: Vec<Neighbor> = neighbor_idx
                    .into_iter()
                    .filter(|&j| sq_dist(self.px[j] - xi, self.py[j] - yi) <= max_d2)
                    .take(g.n_hn)
                    .map(|j| Neighbor {
                        position: (self.px[j], self.py[j]),
                        velocity: (self.vx[j], self.vy[j]),
                    })
                    .collect();

                let nearby_cells: Vec<(f32, f32)> = cells
                    .iter()
                    .filter(|&&(cx, cy)| {
                        let d = ((cx - xi).powi(2) + (cy - yi).powi(2)).sqrt();
                        d < (g.grid_size as f32) / 4.0
                    })
                    .filter(|&&(cx, cy)| {
                        // "unoccupied": no robot currently within occ_thr of this cell.
                        !(0..n).any(|k| {
                            ((self.px[k] - cx).powi(2) + (self.py[k] - cy).powi(2)).sqrt() < occ_thr
                        })
                    })
                    .take(g.n_hc)
                    .copied()
                    .collect();

                StateDict {
                    position: (xi, yi),
                    velocity: (self.vx[i], self.vy[i]),
                    target_center,
                    neighbors,
                    nearby_cells,
                }
            })
            .collect()
    }
}

#[inline]
fn clamp(v: f32, lo: f32, hi: f32) -> f32 {
    v.max(lo).min(hi)
}

#[inline]
fn sq_dist(dx: f32, dy: f32) -> f32 {
    dx * dx + dy * dy
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> Config {
        Config {
            n_robot: 10,
            grid_size: 32,
            ..Config::default()
        }
    }

    #[test]
    fn reset_keeps_positions_and_velocities_in_bounds() {
        let env = SwarmEnv::new(cfg()).unwrap();
        let g = env.cfg.grid_size as f32;
        for (x, y) in env.positions() {
            assert!((0.0..=g - 1.0).contains(&x));
            assert!((0.0..=g - 1.0).contains(&y));
        }
    }

    #[test]
    fn observation_vectors_have_exact_length() {
        let mut env = SwarmEnv::new(cfg()).unwrap();
        let obs = env.observe();
        let expected = env.cfg.obs_dim();
        for row in obs {
            assert_eq!(row.len(), expected);
        }
    }

    #[test]
    fn step_keeps_state_in_bounds() {
        let mut env = SwarmEnv::new(cfg()).unwrap();
        let actions = vec![(1.0, -1.0); env.n()];
        for _ in 0..50 {
            let (_, _pairs) = env.step(&actions);
        }
        let g = env.cfg.grid_size as f32;
        for (x, y) in env.positions() {
            assert!((0.0..=g - 1.0).contains(&x));
            assert!((0.0..=g - 1.0).contains(&y));
        }
        for (vx, vy) in env.velocities() {
            assert!((-3.0..=3.0).contains(&vx));
            assert!((-3.0..=3.0).contains(&vy));
        }
    }

    #[test]
    fn determinism_under_seed() {
        let mut a = SwarmEnv::new(cfg()).unwrap();
        let mut b = SwarmEnv::new(cfg()).unwrap();
        assert_eq!(a.positions(), b.positions());
        let actions = vec![(0.3, -0.2); a.n()];
        let (_, pa) = a.step(&actions);
        let (_, pb) = b.step(&actions);
        assert_eq!(a.positions(), b.positions());
        assert_eq!(pa, pb);
    }
}
