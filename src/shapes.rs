//! Rasterizes a named target shape into a `size x size` binary grid.

use crate::error::AppError;

/// A `size x size` binary grid. `1` marks a cell belonging to the target
/// shape. Row-major: `cells[y * size + x]`.
#[derive(Clone, Debug)]
pub struct ShapeMask {
    pub size: usize,
    cells: Vec<u8>,
}

impl ShapeMask {
    pub fn new(shape: &str, size: usize) -> Result<Self, AppError> {
        let cells = match shape {
            "circle" => circle(size),
            "triangle" => triangle(size),
            "square" => square(size),
            "L" | "A" | "M" | "R" => letter(shape, size),
            other => return Err(AppError::BadShape(other.to_string())),
        };
        Ok(ShapeMask { size, cells })
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> u8 {
        self.cells[y * self.size + x]
    }

    /// Coordinates of every shape cell, as `(x, y)` pairs.
    pub fn shape_cells(&self) -> Vec<(f32, f32)> {
        let mut out = Vec::new();
        for y in 0..self.size {
            for x in 0..self.size {
                if self.cells[y * self.size + x] == 1 {
                    out.push((x as f32, y as f32));
                }
            }
        }
        out
    }

    pub fn cell_count(&self) -> usize {
        self.cells.iter().filter(|&&c| c == 1).count()
    }

    /// Centroid of all shape cells; used as the default `target_center`
    /// for prior-operation state dicts.
    pub fn centroid(&self) -> (f32, f32) {
        let cells = self.shape_cells();
        if cells.is_empty() {
            return (self.size as f32 / 2.0, self.size as f32 / 2.0);
        }
        let n = cells.len() as f32;
        let (sx, sy) = cells.iter().fold((0.0, 0.0), |(ax, ay), (x, y)| (ax + x, ay + y));
        (sx / n, sy / n)
    }
}

fn circle(size: usize) -> Vec<u8> {
    let mut m = vec![0u8; size * size];
    let cx = (size / 2) as isize;
    let cy = (size / 2) as isize;
    let r = (size / 4) as isize;
    for y in 0..size {
        for x in 0..size {
            let dx = x as isize - cx;
            let dy = y as isize - cy;
            if dx * dx + dy * dy <= r * r {
                m[y * size + x] = 1;
            }
        }
    }
    m
}

fn square(size: usize) -> Vec<u8> {
    let mut m = vec![0u8; size * size];
    let cx = (size / 2) as isize;
    let cy = (size / 2) as isize;
    let r = (size / 4) as isize;
    let s = ((r as f64) * 1.1) as isize;
    for y in 0..size {
        for x in 0..size {
            let xi = x as isize;
            let yi = y as isize;
            if xi >= cx - s && xi < cx + s && yi >= cy - s && yi < cy + s {
                m[y * size + x] = 1;
            }
        }
    }
    m
}

fn triangle(size: usize) -> Vec<u8> {
    let cx = (size / 2) as f64;
    let cy = (size / 2) as f64;
    let r = (size / 4) as f64;
    let p1 = (cx, cy - r);
    let p2 = (cx - 0.866 * r, cy + 0.5 * r);
    let p3 = (cx + 0.866 * r, cy + 0.5 * r);
    triangle_mask(size, p1, p2, p3)
}

/// Half-plane (cross-product sign) test, orientation-aware: works for
/// either winding order of the three vertices.
fn triangle_mask(size: usize, p1: (f64, f64), p2: (f64, f64), p3: (f64, f64)) -> Vec<u8> {
    let mut m = vec![0u8; size * size];
    let (x1, y1) = p1;
    let (x2, y2) = p2;
    let (x3, y3) = p3;
    let v12 = (x2 - x1, y2 - y1);
    let v23 = (x3 - x2, y3 - y2);
    let v31 = (x1 - x3, y1 - y3);
    let area2 = v12.0 * (y3 - y1) - v12.1 * (x3 - x1);

    for y in 0..size {
        for x in 0..size {
            let (xf, yf) = (x as f64, y as f64);
            let c1 = (xf - x1) * v12.1 - (yf - y1) * v12.0;
            let c2 = (xf - x2) * v23.1 - (yf - y2) * v23.0;
            let c3 = (xf - x3) * v31.1 - (yf - y3) * v31.0;
            let inside = if area2 >= 0.0 {
                c1 >= 0.0 && c2 >= 0.0 && c3 >= 0.0
            } else {
                c1 <= 0.0 && c2 <= 0.0 && c3 <= 0.0
            };
            if inside {
                m[y * size + x] = 1;
            }
        }
    }
    m
}

/// Letters painted as thick orthogonal strokes, stroke width `size/10`.
fn letter(glyph: &str, size: usize) -> Vec<u8> {
    let mut m = vec![0u8; size * size];
    let t = (size / 10).max(1);

    let mut fill = |y0: usize, y1: usize, x0: usize, x1: usize| {
        let y1 = y1.min(size);
        let x1 = x1.min(size);
        for y in y0.min(y1)..y1 {
            for x in x0.min(x1)..x1 {
                m[y * size + x] = 1;
            }
        }
    };

    match glyph {
        "L" => {
            fill(size / 4, size * 3 / 4, size / 4, size / 4 + t);
            fill(size * 3 / 4 - t, size * 3 / 4, size / 4, size / 2);
        }
        "A" => {
            fill(size / 4, size * 3 / 4, size / 4, size / 4 + t);
            fill(size / 4, size * 3 / 4, size * 3 / 4 - t, size * 3 / 4);
            fill(size / 4, size / 4 + t, size / 4, size * 3 / 4);
            let mid_lo = (size / 2).saturating_sub(t / 2);
            fill(mid_lo, size / 2 + t / 2, size / 3, size * 2 / 3);
        }
        "M" => {
            fill(size / 4, size * 3 / 4, size / 4, size / 4 + t);
            fill(size / 4, size * 3 / 4, size * 3 / 4 - t, size * 3 / 4);
            fill(size / 4, size / 3, size / 4, size * 3 / 4);
            for i in 0..size / 6 {
                fill(size / 4 + i, size / 4 + i + t, size / 4 + i, size / 4 + i + t);
                let rx0 = (size * 3 / 4).saturating_sub(i + t);
                let rx1 = (size * 3 / 4).saturating_sub(i);
                fill(size / 4 + i, size / 4 + i + t, rx0, rx1);
            }
        }
        "R" => {
            fill(size / 4, size * 3 / 4, size / 4, size / 4 + t);
            fill(size / 4, size / 3, size / 4, size * 3 / 4);
            fill((size / 3).saturating_sub(t), size / 3, size / 4, size * 3 / 4);
            fill(size / 3, size / 2, size * 3 / 4 - t, size * 3 / 4);
            fill(size / 2, size * 3 / 4, size / 2, size / 2 + t);
        }
        _ => unreachable!("letter() only called for L/A/M/R"),
    }
    m
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unknown_shape() {
        assert!(matches!(ShapeMask::new("hexagon", 32), Err(AppError::BadShape(_))));
    }

    #[test]
    fn recognized_shapes_have_at_least_one_cell() {
        for shape in ["circle", "triangle", "square", "L", "A", "M", "R"] {
            let mask = ShapeMask::new(shape, 64).unwrap();
            assert!(mask.cell_count() > 0, "{shape} produced an empty mask");
        }
    }

    #[test]
    fn circle_is_centered_and_symmetric() {
        let mask = ShapeMask::new("circle", 64).unwrap();
        assert_eq!(mask.get(32, 32), 1);
        assert_eq!(mask.get(0, 0), 0);
    }

    #[test]
    fn centroid_is_within_bounds() {
        let mask = ShapeMask::new("square", 64).unwrap();
        let (cx, cy) = mask.centroid();
        assert!(cx >= 0.0 && cx < 64.0);
        assert!(cy >= 0.0 && cy < 64.0);
    }
}
