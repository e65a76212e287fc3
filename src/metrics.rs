//! Pure functions over `(mask, positions)` reporting shape-formation quality.

use crate::shapes::ShapeMask;
use rand::rngs::StdRng;
use rand::seq::index::sample;
use rand::SeedableRng;

const UNIFORMITY_SAMPLE_K: usize = 2000;

/// Coverage (M1): fraction of shape cells whose nearest robot lies within
/// `max(1.0, r_avoid*size/4)`. Range `[0,1]`.
pub fn coverage(mask: &ShapeMask, positions: &[(f32, f32)], r_avoid: f32) -> f32 {
    let cells = mask.shape_cells();
    if cells.is_empty() {
        return 0.0;
    }
    let thr = (r_avoid * mask.size as f32 / 4.0).max(1.0);
    let occupied = cells
        .iter()
        .filter(|&&(cx, cy)| {
            positions
                .iter()
                .map(|&(px, py)| ((cx - px).powi(2) + (cy - py).powi(2)).sqrt())
                .fold(f32::INFINITY, f32::min)
                < thr
        })
        .count();
    occupied as f32 / cells.len() as f32
}

/// Uniformity (M2): variance of per-robot Voronoi assignment counts over up
/// to `K=2000` sampled shape cells. Lower is more uniform. Returns 1.0 (the
/// worst value) when the shape or the robot population is empty.
///
/// Accepts an explicit RNG so callers can make repeated calls reproducible
/// (the source samples with an unseeded generator, see spec's Open
/// Questions; a per-call RNG closes that gap).
pub fn uniformity(positions: &[(f32, f32)], mask: &ShapeMask, rng: &mut StdRng) -> f32 {
    let cells = mask.shape_cells();
    let n = positions.len();
    if cells.is_empty() || n == 0 {
        return 1.0;
    }
    let k = UNIFORMITY_SAMPLE_K.min(cells.len());
    let idx = sample(rng, cells.len(), k);

    let mut counts = vec![0u32; n];
    for i in idx.iter() {
        let (cx, cy) = cells[i];
        let mut best = 0usize;
        let mut best_d = f32::INFINITY;
        for (r, &(px, py)) in positions.iter().enumerate() {
            let d = (cx - px).powi(2) + (cy - py).powi(2);
            if d < best_d {
                best_d = d;
                best = r;
            }
        }
        counts[best] += 1;
    }

    let mean = counts.iter().sum::<u32>() as f32 / n as f32;
    counts.iter().map(|&c| (c as f32 - mean).powi(2)).sum::<f32>() / n as f32
}

/// Convenience wrapper seeding a fresh RNG from a given seed, for call
/// sites that don't otherwise carry one (e.g. an episode's end-of-episode
/// metric computation).
pub fn uniformity_seeded(positions: &[(f32, f32)], mask: &ShapeMask, seed: u64) -> f32 {
    let mut rng = StdRng::seed_from_u64(seed);
    uniformity(positions, mask, &mut rng)
}
