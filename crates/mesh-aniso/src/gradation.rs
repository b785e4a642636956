//! Gradation control: bounding how fast target sizes may vary along the
//! edges of a mesh.
//!
//! The H-shock of an edge is `max(h0/h1, h1/h0)^(1/L) − 1` where `L` is the
//! edge length measured in the metric. Bounding the H-shock by `g` means no
//! target size may grow by more than a factor `1 + g` per unit of metric
//! length.
//!
//! All routines relax edge by edge until stable. With pinned nodes the
//! constraints can be contradictory; the sweep count is capped and the last
//! state is kept, which is the documented best-effort behavior.

use nalgebra::{Point2, Point3};
use tracing::debug;

use crate::metric::{Metric2, Metric3};
use crate::quality::edge_quality;

/// Which way sizes may be adjusted to satisfy the bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GradationDirection {
    /// Only reduce sizes (refine coarse regions near fine ones).
    #[default]
    ShrinkOnly,
    /// Only increase sizes (coarsen fine regions near coarse ones).
    GrowOnly,
    /// Both adjustments are allowed.
    Both,
}

/// Upper bound on relaxation sweeps before giving up.
pub const MAX_GRADATION_SWEEPS: usize = 100;

/// Relative tolerance below which a tensor update does not count as a
/// change.
const STABLE_TOL: f64 = 1e-9;

fn is_fixed(fixed: &[bool], i: usize) -> bool {
    fixed.get(i).copied().unwrap_or(false)
}

/// A gradation bound is active when it is a finite, non-negative rate.
fn bound_is_active(max_gradation: f64) -> bool {
    max_gradation.is_finite() && max_gradation >= 0.0
}

fn differs2(a: &Metric2, b: &Metric2) -> bool {
    a.0.iter()
        .zip(&b.0)
        .any(|(x, y)| (x - y).abs() > STABLE_TOL * x.abs().max(y.abs()))
}

fn differs3(a: &Metric3, b: &Metric3) -> bool {
    a.0.iter()
        .zip(&b.0)
        .any(|(x, y)| (x - y).abs() > STABLE_TOL * x.abs().max(y.abs()))
}

/// Bounds the H-shock of an isotropic size field over an edge graph.
///
/// `fixed` marks nodes whose size must not move (shorter slices mean no
/// pinning). Returns `false` when the sweep cap was hit before stability.
pub fn bound_size_gradations(
    pos: &[Point3<f64>],
    edges: &[[u32; 2]],
    fixed: &[bool],
    direction: GradationDirection,
    max_gradation: f64,
    sizes: &mut [f64],
) -> bool {
    if !bound_is_active(max_gradation) {
        return true;
    }
    let growth = 1.0 + max_gradation;
    for _sweep in 0..MAX_GRADATION_SWEEPS {
        let mut changed = false;
        for &[a, b] in edges {
            let (a, b) = (a as usize, b as usize);
            let l = (pos[b] - pos[a]).norm();
            if !(l > 0.0) {
                continue;
            }
            for (i, j) in [(a, b), (b, a)] {
                if is_fixed(fixed, i) {
                    continue;
                }
                let (hi, hj) = (sizes[i], sizes[j]);
                if !(hi > 0.0 && hj > 0.0) {
                    continue;
                }
                // Metric-space length of the edge under the current sizes.
                let lm = edge_quality(l, hi, hj);
                let cap = growth.powf(lm);
                if hi > hj * cap && direction != GradationDirection::GrowOnly {
                    sizes[i] = hj * cap;
                    changed = true;
                } else if hi < hj / cap && direction != GradationDirection::ShrinkOnly {
                    sizes[i] = hj / cap;
                    changed = true;
                }
            }
        }
        if !changed {
            return true;
        }
    }
    debug!(max_gradation, "size gradation did not stabilize within the sweep cap");
    false
}

/// Bounds the absolute size variation rate `|h1 − h0| / L` of an isotropic
/// field, with `L` the Euclidean edge length.
pub fn bound_size_variations(
    pos: &[Point3<f64>],
    edges: &[[u32; 2]],
    fixed: &[bool],
    direction: GradationDirection,
    max_variation: f64,
    sizes: &mut [f64],
) -> bool {
    if !bound_is_active(max_variation) {
        return true;
    }
    for _sweep in 0..MAX_GRADATION_SWEEPS {
        let mut changed = false;
        for &[a, b] in edges {
            let (a, b) = (a as usize, b as usize);
            let l = (pos[b] - pos[a]).norm();
            if !(l > 0.0) {
                continue;
            }
            let slack = max_variation * l;
            for (i, j) in [(a, b), (b, a)] {
                if is_fixed(fixed, i) {
                    continue;
                }
                if sizes[i] > sizes[j] + slack && direction != GradationDirection::GrowOnly {
                    sizes[i] = sizes[j] + slack;
                    changed = true;
                } else if sizes[i] < sizes[j] - slack
                    && direction != GradationDirection::ShrinkOnly
                {
                    sizes[i] = sizes[j] - slack;
                    changed = true;
                }
            }
        }
        if !changed {
            return true;
        }
    }
    debug!(max_variation, "size variation did not stabilize within the sweep cap");
    false
}

/// Bounds the H-shock of an anisotropic 3-D field.
///
/// Each node tensor is revised against its neighbor spanned over the edge:
/// the neighbor's sizes scaled by `(1 + g)^L` for shrinking (then
/// intersected in) or by `(1 + g)^(−L)` for growing (then united in), with
/// `L` the metric length of the edge.
pub fn bound_metric_gradations3(
    pos: &[Point3<f64>],
    edges: &[[u32; 2]],
    fixed: &[bool],
    direction: GradationDirection,
    max_gradation: f64,
    metrics: &mut [Metric3],
) -> bool {
    if !bound_is_active(max_gradation) {
        return true;
    }
    let growth = 1.0 + max_gradation;
    for _sweep in 0..MAX_GRADATION_SWEEPS {
        let mut changed = false;
        for &[a, b] in edges {
            let (a, b) = (a as usize, b as usize);
            let e = pos[b] - pos[a];
            let l = e.norm();
            if !(l > 0.0) {
                continue;
            }
            for (i, j) in [(a, b), (b, a)] {
                if is_fixed(fixed, i) || !metrics[i].is_valid() || !metrics[j].is_valid() {
                    continue;
                }
                let (li, lj) = (
                    metrics[i].segment_length(&e),
                    metrics[j].segment_length(&e),
                );
                if !(li > 0.0 && li.is_finite() && lj > 0.0 && lj.is_finite()) {
                    continue;
                }
                // Metric length through the same log-mean the H-shock uses,
                // from the directional sizes at both endpoints.
                let lm = edge_quality(l, l / li, l / lj);
                if !(lm > 0.0 && lm.is_finite()) {
                    continue;
                }
                if direction != GradationDirection::GrowOnly {
                    let span = metrics[j].scale_sizes(growth.powf(lm));
                    let (m, ok) = metrics[i].intersect(&span);
                    if ok && differs3(&m, &metrics[i]) {
                        metrics[i] = m;
                        changed = true;
                    }
                }
                if direction != GradationDirection::ShrinkOnly {
                    let span = metrics[j].scale_sizes(growth.powf(-lm));
                    let (m, ok) = metrics[i].unite(&span);
                    if ok && differs3(&m, &metrics[i]) {
                        metrics[i] = m;
                        changed = true;
                    }
                }
            }
        }
        if !changed {
            return true;
        }
    }
    debug!(max_gradation, "metric gradation did not stabilize within the sweep cap");
    false
}

/// Bounds the H-shock of an anisotropic parametric (2-D) field.
/// See [`bound_metric_gradations3`].
pub fn bound_metric_gradations2(
    pos2d: &[Point2<f64>],
    edges: &[[u32; 2]],
    fixed: &[bool],
    direction: GradationDirection,
    max_gradation: f64,
    metrics: &mut [Metric2],
) -> bool {
    if !bound_is_active(max_gradation) {
        return true;
    }
    let growth = 1.0 + max_gradation;
    for _sweep in 0..MAX_GRADATION_SWEEPS {
        let mut changed = false;
        for &[a, b] in edges {
            let (a, b) = (a as usize, b as usize);
            let e = pos2d[b] - pos2d[a];
            let l = e.norm();
            if !(l > 0.0) {
                continue;
            }
            for (i, j) in [(a, b), (b, a)] {
                if is_fixed(fixed, i) || !metrics[i].is_valid() || !metrics[j].is_valid() {
                    continue;
                }
                let (li, lj) = (
                    metrics[i].segment_length(&e),
                    metrics[j].segment_length(&e),
                );
                if !(li > 0.0 && li.is_finite() && lj > 0.0 && lj.is_finite()) {
                    continue;
                }
                let lm = edge_quality(l, l / li, l / lj);
                if !(lm > 0.0 && lm.is_finite()) {
                    continue;
                }
                if direction != GradationDirection::GrowOnly {
                    let span = metrics[j].scale_sizes(growth.powf(lm));
                    let (m, ok) = metrics[i].intersect(&span);
                    if ok && differs2(&m, &metrics[i]) {
                        metrics[i] = m;
                        changed = true;
                    }
                }
                if direction != GradationDirection::ShrinkOnly {
                    let span = metrics[j].scale_sizes(growth.powf(-lm));
                    let (m, ok) = metrics[i].unite(&span);
                    if ok && differs2(&m, &metrics[i]) {
                        metrics[i] = m;
                        changed = true;
                    }
                }
            }
        }
        if !changed {
            return true;
        }
    }
    debug!(max_gradation, "metric gradation did not stabilize within the sweep cap");
    false
}

/// Per-node worst H-shock of an isotropic size field.
pub fn h_shock(pos: &[Point3<f64>], edges: &[[u32; 2]], sizes: &[f64]) -> Vec<f64> {
    let mut shock: Vec<f64> = vec![0.0; sizes.len()];
    for &[a, b] in edges {
        let (a, b) = (a as usize, b as usize);
        let l = (pos[b] - pos[a]).norm();
        let (ha, hb) = (sizes[a], sizes[b]);
        if !(l > 0.0 && ha > 0.0 && hb > 0.0) {
            continue;
        }
        let lm = edge_quality(l, ha, hb);
        if !(lm > 0.0) {
            continue;
        }
        let s = (ha / hb).max(hb / ha).powf(1.0 / lm) - 1.0;
        shock[a] = shock[a].max(s);
        shock[b] = shock[b].max(s);
    }
    shock
}

/// Per-node worst H-shock of an anisotropic 3-D field, measured along the
/// edge direction at each endpoint.
pub fn h_shock3(pos: &[Point3<f64>], edges: &[[u32; 2]], metrics: &[Metric3]) -> Vec<f64> {
    let mut shock: Vec<f64> = vec![0.0; metrics.len()];
    for &[a, b] in edges {
        let (a, b) = (a as usize, b as usize);
        let e = pos[b] - pos[a];
        let l = e.norm();
        if !(l > 0.0) {
            continue;
        }
        let (la, lb) = (
            metrics[a].segment_length(&e),
            metrics[b].segment_length(&e),
        );
        if !(la > 0.0 && lb > 0.0) {
            continue;
        }
        let (ha, hb) = (l / la, l / lb);
        let lm = edge_quality(l, ha, hb);
        if !(lm > 0.0) {
            continue;
        }
        let s = (ha / hb).max(hb / ha).powf(1.0 / lm) - 1.0;
        shock[a] = shock[a].max(s);
        shock[b] = shock[b].max(s);
    }
    shock
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair(pos_b: f64) -> Vec<Point3<f64>> {
        vec![Point3::origin(), Point3::new(pos_b, 0.0, 0.0)]
    }

    #[test]
    fn test_infinite_bound_is_noop() {
        let pos = pair(1.0);
        let mut sizes = vec![1.0, 100.0];
        assert!(bound_size_gradations(
            &pos,
            &[[0, 1]],
            &[],
            GradationDirection::Both,
            f64::INFINITY,
            &mut sizes,
        ));
        assert_eq!(sizes, vec![1.0, 100.0]);
    }

    #[test]
    fn test_shrink_only_never_grows() {
        let pos = pair(1.0);
        let mut sizes = vec![0.1, 10.0];
        bound_size_gradations(
            &pos,
            &[[0, 1]],
            &[],
            GradationDirection::ShrinkOnly,
            0.5,
            &mut sizes,
        );
        assert_eq!(sizes[0], 0.1, "the fine size must not move");
        assert!(sizes[1] < 10.0, "the coarse size must shrink");
        let shock = h_shock(&pos, &[[0, 1]], &sizes);
        assert!(shock[1] <= 0.5 + 0.05, "H-shock {} above bound", shock[1]);
    }

    #[test]
    fn test_grow_only_never_shrinks() {
        let pos = pair(1.0);
        let mut sizes = vec![0.1, 10.0];
        bound_size_gradations(
            &pos,
            &[[0, 1]],
            &[],
            GradationDirection::GrowOnly,
            0.5,
            &mut sizes,
        );
        assert_eq!(sizes[1], 10.0, "the coarse size must not move");
        assert!(sizes[0] > 0.1, "the fine size must grow");
    }

    #[test]
    fn test_fixed_nodes_are_pinned() {
        let pos = pair(1.0);
        let mut sizes = vec![0.1, 10.0];
        bound_size_gradations(
            &pos,
            &[[0, 1]],
            &[true, true],
            GradationDirection::Both,
            0.5,
            &mut sizes,
        );
        assert_eq!(sizes, vec![0.1, 10.0], "pinned nodes never move");
    }

    #[test]
    fn test_gradation_propagates_along_a_chain() {
        let pos: Vec<_> = (0..5).map(|i| Point3::new(i as f64, 0.0, 0.0)).collect();
        let edges: Vec<[u32; 2]> = (0..4).map(|i| [i, i + 1]).collect();
        let mut sizes = vec![0.2, 50.0, 50.0, 50.0, 50.0];
        bound_size_gradations(
            &pos,
            &edges,
            &[],
            GradationDirection::ShrinkOnly,
            0.5,
            &mut sizes,
        );
        let shock = h_shock(&pos, &edges, &sizes);
        for (i, s) in shock.iter().enumerate() {
            assert!(*s <= 0.5 + 0.05, "node {} has H-shock {}", i, s);
        }
        assert!(sizes[1] < sizes[2], "sizes must grade away from the fine node");
        assert!(sizes[2] < sizes[3]);
    }

    #[test]
    fn test_size_variation_bound() {
        let pos = pair(2.0);
        let mut sizes = vec![1.0, 10.0];
        bound_size_variations(
            &pos,
            &[[0, 1]],
            &[],
            GradationDirection::ShrinkOnly,
            0.5,
            &mut sizes,
        );
        assert!((sizes[1] - 2.0).abs() < 1e-12, "h1 capped at h0 + g*L");
    }

    #[test]
    fn test_metric_gradation_shrinks_coarse_tensor() {
        let pos = pair(1.0);
        let mut metrics = vec![Metric3::iso(0.1), Metric3::iso(10.0)];
        let converged = bound_metric_gradations3(
            &pos,
            &[[0, 1]],
            &[],
            GradationDirection::ShrinkOnly,
            0.5,
            &mut metrics,
        );
        assert!(converged);
        assert_eq!(metrics[0], Metric3::iso(0.1));
        let shock = h_shock3(&pos, &[[0, 1]], &metrics);
        assert!(shock[1] <= 0.5 + 0.05, "H-shock {} above bound", shock[1]);
    }

    #[test]
    fn test_metric_gradation_bound_holds_under_strong_contrast() {
        // Three orders of magnitude across one edge must still settle under
        // the requested H-shock, whatever the bound.
        let pos = pair(1.0);
        for g in [0.2, 0.5, 1.0] {
            let mut metrics = vec![Metric3::iso(0.01), Metric3::iso(10.0)];
            bound_metric_gradations3(
                &pos,
                &[[0, 1]],
                &[true, false],
                GradationDirection::ShrinkOnly,
                g,
                &mut metrics,
            );
            let shock = h_shock3(&pos, &[[0, 1]], &metrics);
            assert!(shock[1] <= g * 1.1, "g = {}: H-shock {} above bound", g, shock[1]);
        }
    }

    #[test]
    fn test_metric_gradation_grow_only() {
        let mut metrics = vec![Metric2::iso(0.1), Metric2::iso(10.0)];
        bound_metric_gradations2(
            &[Point2::origin(), Point2::new(1.0, 0.0)],
            &[[0, 1]],
            &[],
            GradationDirection::GrowOnly,
            0.5,
            &mut metrics,
        );
        assert_eq!(metrics[1], Metric2::iso(10.0), "coarse tensor must not move");
        let (lams, _) = metrics[0].eigen_pairs();
        assert!(
            1.0 / lams[1].sqrt() > 0.1,
            "fine tensor must have grown"
        );
    }
}
