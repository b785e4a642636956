//! Metric interpolation over a parametric triangulation.

use nalgebra::Point2;

use crate::metric::Metric3;

const BARYCENTRIC_TOL: f64 = 1e-10;

fn barycentric(
    p: &Point2<f64>,
    a: &Point2<f64>,
    b: &Point2<f64>,
    c: &Point2<f64>,
) -> Option<[f64; 3]> {
    let v0 = b - a;
    let v1 = c - a;
    let v2 = p - a;
    let den = v0.x * v1.y - v1.x * v0.y;
    if den.abs() <= f64::MIN_POSITIVE {
        return None;
    }
    let wb = (v2.x * v1.y - v1.x * v2.y) / den;
    let wc = (v0.x * v2.y - v2.x * v0.y) / den;
    let wa = 1.0 - wb - wc;
    Some([wa, wb, wc])
}

/// Fills the invalid entries of a 3-D metric field by linear interpolation
/// over a parametric triangulation of the valid ones.
///
/// Component-wise barycentric interpolation preserves validity because the
/// positive-definite tensors form a convex set. Nodes falling outside every
/// triangle take the metric of the nearest valid node. Returns the number of
/// entries filled.
pub fn interpolate_metrics3(
    pos2d: &[Point2<f64>],
    tris: &[[u32; 3]],
    metrics: &mut [Metric3],
) -> usize {
    let valid: Vec<bool> = metrics.iter().map(Metric3::is_valid).collect();
    let mut filled = 0;
    for i in 0..metrics.len() {
        if valid[i] {
            continue;
        }
        let p = pos2d[i];
        let mut found = None;
        for t in tris {
            let [a, b, c] = [t[0] as usize, t[1] as usize, t[2] as usize];
            if !(valid[a] && valid[b] && valid[c]) {
                continue;
            }
            let Some(w) = barycentric(&p, &pos2d[a], &pos2d[b], &pos2d[c]) else {
                continue;
            };
            if w.iter().all(|&wi| wi >= -BARYCENTRIC_TOL) {
                let mut out = [0.0; 6];
                for k in 0..6 {
                    out[k] = w[0] * metrics[a].0[k] + w[1] * metrics[b].0[k] + w[2] * metrics[c].0[k];
                }
                found = Some(Metric3(out));
                break;
            }
        }
        let m = found.or_else(|| {
            // Outside the triangulation: nearest valid node.
            (0..metrics.len())
                .filter(|&j| valid[j])
                .min_by(|&a, &b| {
                    (pos2d[a] - p)
                        .norm_squared()
                        .total_cmp(&(pos2d[b] - p).norm_squared())
                })
                .map(|j| metrics[j])
        });
        if let Some(m) = m {
            metrics[i] = m;
            filled += 1;
        }
    }
    filled
}
