//! Validates a structured prior-policy document and compiles it into a
//! `state -> action` function by summing whitelisted weighted operations.

use crate::env::StateDict;
use crate::error::AppError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Radii in a prior term share the same `r_sense`-style normalization as
/// the environment's own `[0,1]` radii; this factor converts a normalized
/// radius into the grid-unit scale neighbor distances are expressed in,
/// mirroring the `r_sense * grid_size/8` convention used when the
/// environment builds neighbor lists for a reference grid of size 64. See
/// DESIGN.md for the resolved Open Question this constant settles.
const RADIUS_GRID_SCALE: f32 = 8.0;

const DEFAULT_MAX_SPEED: f32 = 0.5;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PriorTerm {
    pub op: String,
    pub weight: f32,
    #[serde(default)]
    pub radius: Option<f32>,
    #[serde(default)]
    pub cell_size: Option<f32>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ClampSpec {
    #[serde(default = "default_max_speed")]
    pub max_speed: f32,
}

fn default_max_speed() -> f32 {
    DEFAULT_MAX_SPEED
}

impl Default for ClampSpec {
    fn default() -> Self {
        ClampSpec { max_speed: DEFAULT_MAX_SPEED }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PriorDocument {
    pub terms: Vec<PriorTerm>,
    #[serde(default)]
    pub clamp: ClampSpec,
}

const WHITELISTED_OPS: &[&str] = &[
    "move_to_shape_center",
    "avoid_neighbors",
    "keep_grid_uniformity",
    "synchronize_velocity",
    "explore_empty_cells",
];

#[derive(Clone, Copy, Debug)]
enum Op {
    MoveToShapeCenter,
    AvoidNeighbors,
    KeepGridUniformity,
    SynchronizeVelocity,
    ExploreEmptyCells,
}

#[derive(Clone, Debug)]
struct CompiledTerm {
    op: Op,
    weight: f32,
    radius: Option<f32>,
}

#[derive(Clone)]
pub struct CompiledPrior {
    terms: Arc<Vec<CompiledTerm>>,
    max_speed: f32,
}

pub fn validate(doc: &PriorDocument) -> Result<(), AppError> {
    if doc.clamp.max_speed <= 0.0 {
        return Err(AppError::SchemaViolation("clamp.max_speed must be positive".to_string()));
    }
    for term in &doc.terms {
        if !WHITELISTED_OPS.contains(&term.op.as_str()) {
            return Err(AppError::SchemaViolation(format!("unknown prior operation '{}'", term.op)));
        }
        if !(0.0..=1.0).contains(&term.weight) {
            return Err(AppError::SchemaViolation(format!("weight {} out of range [0,1]", term.weight)));
        }
        if let Some(r) = term.radius {
            if !(0.0..=1.0).contains(&r) {
                return Err(AppError::SchemaViolation(format!("radius {r} out of range [0,1]")));
            }
        }
        if let Some(cs) = term.cell_size {
            if !(0.0..=2.0).contains(&cs) {
                return Err(AppError::SchemaViolation(format!("cell_size {cs} out of range [0,2]")));
            }
        }
    }
    Ok(())
}

pub fn compile(doc: &PriorDocument) -> Result<CompiledPrior, AppError> {
    validate(doc)?;
    let terms = doc
        .terms
        .iter()
        .map(|t| {
            let op = match t.op.as_str() {
                "move_to_shape_center" => Op::MoveToShapeCenter,
                "avoid_neighbors" => Op::AvoidNeighbors,
                "keep_grid_uniformity" => Op::KeepGridUniformity,
                "synchronize_velocity" => Op::SynchronizeVelocity,
                "explore_empty_cells" => Op::ExploreEmptyCells,
                other => unreachable!("validate() already rejected op '{other}'"),
            };
            CompiledTerm { op, weight: t.weight, radius: t.radius }
        })
        .collect();
    Ok(CompiledPrior { terms: Arc::new(terms), max_speed: doc.clamp.max_speed })
}

impl CompiledPrior {
    pub fn eval(&self, state: &StateDict) -> (f32, f32) {
        let mut acc = (0.0f32, 0.0f32);
        for term in self.terms.iter() {
            let contribution = eval_op(term, state);
            acc.0 += contribution.0 * term.weight;
            acc.1 += contribution.1 * term.weight;
        }
        clamp_norm(acc, self.max_speed)
    }
}

fn eval_op(term: &CompiledTerm, state: &StateDict) -> (f32, f32) {
    let (x, y) = match term.op {
        Op::MoveToShapeCenter => move_to_shape_center(state),
        Op::AvoidNeighbors => avoid_neighbors(state, term.radius.unwrap_or(1.0)),
        Op::KeepGridUniformity => keep_grid_uniformity(state),
        Op::SynchronizeVelocity => synchronize_velocity(state),
        Op::ExploreEmptyCells => explore_empty_cells(state),
    };
    if x.is_finite() && y.is_finite() {
        (x, y)
    } else {
        tracing::warn!(op = ?term.op, "prior operation produced a non-finite contribution; degrading to zero");
        (0.0, 0.0)
    }
}

fn move_to_shape_center(state: &StateDict) -> (f32, f32) {
    let dx = state.target_center.0 - state.position.0;
    let dy = state.target_center.1 - state.position.1;
    unit_or_zero(dx, dy)
}

fn avoid_neighbors(state: &StateDict, radius: f32) -> (f32, f32) {
    let thr = radius * RADIUS_GRID_SCALE;
    let mut acc = (0.0f32, 0.0f32);
    for n in &state.neighbors {
        let dx = state.position.0 - n.position.0;
        let dy = state.position.1 - n.position.1;
        let d2 = dx * dx + dy * dy;
        if d2.sqrt() <= thr {
            let inv = 1.0 / (d2 + 1e-6);
            acc.0 += dx * inv;
            acc.1 += dy * inv;
        }
    }
    acc
}

fn keep_grid_uniformity(state: &StateDict) -> (f32, f32) {
    if state.neighbors.is_empty() {
        return (0.0, 0.0);
    }
    let n = state.neighbors.len() as f32;
    let mean = state.neighbors.iter().fold((0.0, 0.0), |(ax, ay), nb| (ax + nb.position.0, ay + nb.position.1));
    let mean = (mean.0 / n, mean.1 / n);
    (0.1 * (mean.0 - state.position.0), 0.1 * (mean.1 - state.position.1))
}

fn synchronize_velocity(state: &StateDict) -> (f32, f32) {
    if state.neighbors.is_empty() {
        return (0.0, 0.0);
    }
    let n = state.neighbors.len() as f32;
    let mean = state.neighbors.iter().fold((0.0, 0.0), |(ax, ay), nb| (ax + nb.velocity.0, ay + nb.velocity.1));
    let mean = (mean.0 / n, mean.1 / n);
    (mean.0 - state.velocity.0, mean.1 - state.velocity.1)
}

fn explore_empty_cells(state: &StateDict) -> (f32, f32) {
    match state.nearby_cells.first() {
        Some(&(cx, cy)) => unit_or_zero(cx - state.position.0, cy - state.position.1),
        None => (0.0, 0.0),
    }
}

fn unit_or_zero(dx: f32, dy: f32) -> (f32, f32) {
    let d = (dx * dx + dy * dy).sqrt();
    if d < 1e-6 {
        (0.0, 0.0)
    } else {
        (dx / d, dy / d)
    }
}

fn clamp_norm(v: (f32, f32), max_speed: f32) -> (f32, f32) {
    let norm = (v.0 * v.0 + v.1 * v.1).sqrt();
    if norm > max_speed && norm > 0.0 {
        let scale = max_speed / norm;
        (v.0 * scale, v.1 * scale)
    } else {
        v
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::Neighbor;

    fn state(position: (f32, f32), target_center: (f32, f32)) -> StateDict {
        StateDict { position, velocity: (0.0, 0.0), target_center, neighbors: Vec::new(), nearby_cells: Vec::new() }
    }

    #[test]
    fn unknown_op_is_rejected() {
        let doc = PriorDocument {
            terms: vec![PriorTerm { op: "rm_rf".to_string(), weight: 0.5, radius: None, cell_size: None }],
            clamp: ClampSpec::default(),
        };
        assert!(matches!(validate(&doc), Err(AppError::SchemaViolation(_))));
    }

    #[test]
    fn move_to_shape_center_at_target_is_zero() {
        let doc = PriorDocument {
            terms: vec![PriorTerm { op: "move_to_shape_center".to_string(), weight: 0.6, radius: None, cell_size: None }],
            clamp: ClampSpec::default(),
        };
        let compiled = compile(&doc).unwrap();
        let s = state((5.0, 5.0), (5.0, 5.0));
        assert_eq!(compiled.eval(&s), (0.0, 0.0));
    }

    #[test]
    fn result_never_exceeds_max_speed() {
        let doc = PriorDocument {
            terms: vec![PriorTerm { op: "move_to_shape_center".to_string(), weight: 1.0, radius: None, cell_size: None }],
            clamp: ClampSpec { max_speed: 0.2 },
        };
        let compiled = compile(&doc).unwrap();
        let s = state((0.0, 0.0), (10.0, 0.0));
        let (x, y) = compiled.eval(&s);
        assert!((x * x + y * y).sqrt() <= 0.2 + 1e-6);
    }

    #[test]
    fn synchronize_velocity_matches_neighbor_mean() {
        let doc = PriorDocument {
            terms: vec![PriorTerm { op: "synchronize_velocity".to_string(), weight: 1.0, radius: None, cell_size: None }],
            clamp: ClampSpec { max_speed: 10.0 },
        };
        let compiled = compile(&doc).unwrap();
        let mut s = state((0.0, 0.0), (0.0, 0.0));
        s.velocity = (0.0, 0.0);
        s.neighbors = vec![
            Neighbor { position: (1.0, 0.0), velocity: (1.0, 1.0) },
            Neighbor { position: (0.0, 1.0), velocity: (0.0, 2.0) },
        ];
        let (x, y) = compiled.eval(&s);
        assert!((x - 0.5).abs() < 1e-5);
        assert!((y - 1.5).abs() < 1e-5);
    }

    #[test]
    fn compiling_twice_is_equivalent() {
        let doc = PriorDocument {
            terms: vec![PriorTerm { op: "move_to_shape_center".to_string(), weight: 0.5, radius: None, cell_size: None }],
            clamp: ClampSpec::default(),
        };
        let a = compile(&doc).unwrap();
        let b = compile(&doc).unwrap();
        let s = state((0.0, 0.0), (3.0, 4.0));
        assert_eq!(a.eval(&s), b.eval(&s));
    }
}
