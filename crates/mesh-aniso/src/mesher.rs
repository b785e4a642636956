//! The meshing-engine capability consumed by the pipeline, and a small
//! structured reference engine.

use hashbrown::HashMap;
use nalgebra::Point2;
use tracing::debug;

use crate::error::{MeshError, MeshResult, WarningCode};
use crate::metric::Metric2;
use crate::progress::ProgressRange;
use crate::types::Element;

/// Basic operating mode of a meshing engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BasicMode {
    /// Generate a mesh honoring the boundary.
    #[default]
    MeshMode,
    /// Improve an existing mesh without remeshing from scratch.
    RegularizeMode,
    /// Mesh the convex hull of the nodes. Not supported by the surface
    /// pipeline.
    ConvexHull,
}

/// Engine settings. The pipeline saves, tweaks and restores them around the
/// final meshing run.
#[derive(Debug, Clone)]
pub struct MesherSettings {
    /// Uniform target size; `0` defers entirely to the metric field.
    pub target_h: f64,
    /// Gradation bound applied by the engine; `f64::INFINITY` disables it.
    pub max_gradation: f64,
    /// Quadrangle angle quality under which the engine avoids emitting a
    /// quad; `0` disables the filter.
    pub min_q4_angle_quality: f64,
    /// Whether the engine should measure edge-length qualities.
    pub compute_qh_flag: bool,
    /// Whether the engine must produce quadrangles only.
    pub all_quad_flag: bool,
    pub basic_mode: BasicMode,
    /// Optimization effort, engine specific.
    pub optim_level: u8,
    /// Trade-off between shape quality and size conformity during
    /// optimization, in `[0, 1]`.
    pub shape_quality_weight: f64,
    /// Whether interior nodes may be created; without it the engine only
    /// connects the existing nodes.
    pub refine_flag: bool,
    /// Progress slice and cancellation handler for the run.
    pub progress: ProgressRange,
}

impl Default for MesherSettings {
    fn default() -> Self {
        MesherSettings {
            target_h: 0.0,
            max_gradation: 0.5,
            min_q4_angle_quality: 0.2,
            compute_qh_flag: false,
            all_quad_flag: false,
            basic_mode: BasicMode::MeshMode,
            optim_level: 3,
            shape_quality_weight: 0.6,
            refine_flag: true,
            progress: ProgressRange::silent(),
        }
    }
}

impl MesherSettings {
    /// Restores the defaults.
    pub fn reset(&mut self) {
        *self = MesherSettings::default();
    }
}

/// Exchange structure between the pipeline and a meshing engine, entirely in
/// the parametric plane.
///
/// Invariants: `metrics.len() == pos2d.len()` on entry and on exit; engines
/// append coordinates and metrics together for every node they create and
/// never reorder existing nodes.
#[derive(Debug, Clone, Default)]
pub struct MeshJob {
    pub pos2d: Vec<Point2<f64>>,
    /// Edges the mesh must conform to.
    pub boundary: Vec<[u32; 2]>,
    /// Nodes forced into the mesh.
    pub isolated_nodes: Vec<u32>,
    /// Nodes that repel refinement without being forced into the mesh.
    pub repulsive_points: Vec<u32>,
    /// Sizing field, one tensor per node.
    pub metrics: Vec<Metric2>,
    /// Optional background triangulation carrying the sizing field.
    pub background_tris: Vec<[u32; 3]>,
    /// Generated elements.
    pub elements: Vec<Element>,
    /// Non-fatal outcome of the run.
    pub warning: WarningCode,
}

impl MeshJob {
    /// Number of nodes present before an engine run appends new ones.
    pub fn node_count(&self) -> usize {
        self.pos2d.len()
    }
}

/// A parametric meshing engine.
///
/// Engines report fatal conditions through the returned error and
/// interruption through `job.warning`; they must not panic on degenerate
/// input.
pub trait Mesher {
    fn settings(&self) -> &MesherSettings;
    fn settings_mut(&mut self) -> &mut MesherSettings;
    fn run(&mut self, job: &mut MeshJob) -> MeshResult<()>;
}

/// Tolerance factor for snapping existing nodes onto grid points, as a
/// fraction of the cell size.
const GRID_SNAP: f64 = 0.3;

/// A deterministic structured triangulator for axis-aligned rectangular
/// parametric domains.
///
/// It lays a uniform grid over the bounding box of the boundary, snaps
/// existing nodes onto the grid points they coincide with, creates the
/// missing points (when refinement is allowed) and emits two triangles per
/// cell, or one quadrangle in all-quad mode. The grid pitch comes from the
/// uniform target size when set, otherwise from the average size of the
/// metric field.
///
/// It is intentionally simple: boundaries must subdivide the rectangle
/// uniformly for the mesh to conform. Its value is being fully predictable,
/// which the test suite and the examples rely on.
#[derive(Debug, Default)]
pub struct StructuredMesher {
    settings: MesherSettings,
}

impl StructuredMesher {
    pub fn new() -> Self {
        StructuredMesher::default()
    }

    /// Mean directional size of the valid tensors of the field.
    fn mean_metric_size(metrics: &[Metric2]) -> Option<f64> {
        let mut sum = 0.0;
        let mut count = 0usize;
        for m in metrics {
            if m.is_valid() {
                let mean_diag = 0.5 * (m.0[0] + m.0[2]);
                if mean_diag > 0.0 {
                    sum += 1.0 / mean_diag.sqrt();
                    count += 1;
                }
            }
        }
        (count > 0).then(|| sum / count as f64)
    }
}

impl Mesher for StructuredMesher {
    fn settings(&self) -> &MesherSettings {
        &self.settings
    }

    fn settings_mut(&mut self) -> &mut MesherSettings {
        &mut self.settings
    }

    fn run(&mut self, job: &mut MeshJob) -> MeshResult<()> {
        let settings = self.settings.clone();
        job.elements.clear();
        job.warning = WarningCode::None;
        if settings.basic_mode == BasicMode::ConvexHull {
            return Err(MeshError::boundary(
                "convex-hull mode is not supported by the structured engine",
            ));
        }
        if !settings.progress.report(0.0) {
            job.warning = WarningCode::Interruption;
            return Ok(());
        }

        // Domain: bounding box of the boundary nodes (all nodes if there is
        // no boundary).
        let domain: Vec<usize> = if job.boundary.is_empty() {
            (0..job.pos2d.len()).collect()
        } else {
            let mut idx: Vec<usize> = job
                .boundary
                .iter()
                .flat_map(|e| [e[0] as usize, e[1] as usize])
                .collect();
            idx.sort_unstable();
            idx.dedup();
            idx
        };
        if domain.is_empty() {
            return Ok(());
        }
        let (mut x0, mut y0, mut x1, mut y1) = (f64::MAX, f64::MAX, -f64::MAX, -f64::MAX);
        for &i in &domain {
            let p = job.pos2d[i];
            x0 = x0.min(p.x);
            y0 = y0.min(p.y);
            x1 = x1.max(p.x);
            y1 = y1.max(p.y);
        }
        if !(x1 > x0 && y1 > y0) {
            return Err(MeshError::boundary("degenerate parametric domain"));
        }

        let h = if settings.target_h > 0.0 {
            settings.target_h
        } else {
            Self::mean_metric_size(&job.metrics)
                .ok_or_else(|| MeshError::invalid_metrics("no usable sizing information"))?
        };
        let nx = ((x1 - x0) / h).round().max(1.0) as usize;
        let ny = ((y1 - y0) / h).round().max(1.0) as usize;
        let dx = (x1 - x0) / nx as f64;
        let dy = (y1 - y0) / ny as f64;
        debug!(nx, ny, h, "structured grid");

        // Snap existing nodes onto the grid points they coincide with.
        let mut at: HashMap<(usize, usize), u32> = HashMap::new();
        for (idx, p) in job.pos2d.iter().enumerate() {
            let gi = ((p.x - x0) / dx).round();
            let gj = ((p.y - y0) / dy).round();
            if gi < 0.0 || gj < 0.0 || gi > nx as f64 || gj > ny as f64 {
                continue;
            }
            let (gi, gj) = (gi as usize, gj as usize);
            let (gx, gy) = (x0 + gi as f64 * dx, y0 + gj as f64 * dy);
            if (p.x - gx).abs() <= GRID_SNAP * dx && (p.y - gy).abs() <= GRID_SNAP * dy {
                at.entry((gi, gj)).or_insert(idx as u32);
            }
        }
        if !settings.progress.report(0.4) {
            job.warning = WarningCode::Interruption;
            return Ok(());
        }

        // Create the missing grid points.
        let metric = Metric2::iso(h);
        for gi in 0..=nx {
            for gj in 0..=ny {
                if at.contains_key(&(gi, gj)) {
                    continue;
                }
                if !settings.refine_flag {
                    return Err(MeshError::boundary(
                        "nodes do not cover the structured grid and refinement is off",
                    ));
                }
                let id = job.pos2d.len() as u32;
                job.pos2d
                    .push(Point2::new(x0 + gi as f64 * dx, y0 + gj as f64 * dy));
                job.metrics.push(metric);
                at.insert((gi, gj), id);
            }
        }

        // Two triangles (or one quad) per cell, counter-clockwise.
        for gi in 0..nx {
            for gj in 0..ny {
                let n00 = at[&(gi, gj)];
                let n10 = at[&(gi + 1, gj)];
                let n11 = at[&(gi + 1, gj + 1)];
                let n01 = at[&(gi, gj + 1)];
                if settings.all_quad_flag {
                    job.elements.push(Element::Quad4([n00, n10, n11, n01]));
                } else {
                    job.elements.push(Element::Tri3([n00, n10, n11]));
                    job.elements.push(Element::Tri3([n00, n11, n01]));
                }
            }
        }
        if !settings.progress.report(1.0) {
            job.warning = WarningCode::Interruption;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square_job(n: usize) -> MeshJob {
        // Unit square boundary with n segments per side.
        let mut pos2d = Vec::new();
        let step = 1.0 / n as f64;
        for i in 0..n {
            pos2d.push(Point2::new(i as f64 * step, 0.0));
        }
        for i in 0..n {
            pos2d.push(Point2::new(1.0, i as f64 * step));
        }
        for i in 0..n {
            pos2d.push(Point2::new(1.0 - i as f64 * step, 1.0));
        }
        for i in 0..n {
            pos2d.push(Point2::new(0.0, 1.0 - i as f64 * step));
        }
        let count = pos2d.len() as u32;
        let boundary = (0..count).map(|i| [i, (i + 1) % count]).collect();
        let metrics = vec![Metric2::iso(step); pos2d.len()];
        MeshJob {
            pos2d,
            boundary,
            metrics,
            ..MeshJob::default()
        }
    }

    #[test]
    fn test_structured_grid_on_unit_square() {
        let mut job = square_job(4);
        let mut mesher = StructuredMesher::new();
        mesher.settings_mut().target_h = 0.25;
        mesher.run(&mut job).unwrap();
        assert_eq!(job.elements.len(), 32, "two triangles per cell on a 4x4 grid");
        assert_eq!(job.pos2d.len(), 16 + 9, "nine interior nodes created");
        assert_eq!(job.metrics.len(), job.pos2d.len());
    }

    #[test]
    fn test_size_from_metrics_when_target_unset() {
        let mut job = square_job(2);
        let mut mesher = StructuredMesher::new();
        mesher.run(&mut job).unwrap();
        assert_eq!(job.elements.len(), 8, "pitch read from the metric field");
    }

    #[test]
    fn test_all_quad_mode() {
        let mut job = square_job(2);
        let mut mesher = StructuredMesher::new();
        mesher.settings_mut().target_h = 0.5;
        mesher.settings_mut().all_quad_flag = true;
        mesher.run(&mut job).unwrap();
        assert_eq!(job.elements.len(), 4);
        assert!(job.elements.iter().all(Element::is_quad));
    }

    #[test]
    fn test_convex_hull_mode_rejected() {
        let mut job = square_job(2);
        let mut mesher = StructuredMesher::new();
        mesher.settings_mut().basic_mode = BasicMode::ConvexHull;
        assert!(mesher.run(&mut job).is_err());
    }

    #[test]
    fn test_cancellation_reports_warning() {
        let mut job = square_job(2);
        let mut mesher = StructuredMesher::new();
        mesher.settings_mut().target_h = 0.5;
        mesher.settings_mut().progress =
            ProgressRange::new(Some(std::sync::Arc::new(|_| false)), 0.0, 1.0);
        mesher.run(&mut job).unwrap();
        assert_eq!(job.warning, WarningCode::Interruption);
        assert!(job.elements.is_empty());
    }

    #[test]
    fn test_rerun_is_incremental() {
        let mut job = square_job(4);
        let mut mesher = StructuredMesher::new();
        mesher.settings_mut().target_h = 0.25;
        mesher.run(&mut job).unwrap();
        let nodes_after_first = job.pos2d.len();
        mesher.run(&mut job).unwrap();
        assert_eq!(job.pos2d.len(), nodes_after_first, "existing nodes are reused");
        assert_eq!(job.elements.len(), 32);
    }
}
