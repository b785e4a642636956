//! Background-mesh construction.
//!
//! The sizing field lives on a coarse triangulation of the parametric
//! domain, the background mesh. Starting from a uniform seed derived from
//! the boundary, the iterator alternates meshing with the auxiliary engine
//! and tightening the field (clamping, gradation, chordal control) until the
//! mesh resolves its own sizing field, an iteration creates no nodes, or the
//! remeshing budget runs out.

use tracing::debug;

use crate::curvature::{chordal_control2, ChordalControl, ChordalParams};
use crate::error::{MeshError, MeshResult, WarningCode};
use crate::gradation::{bound_metric_gradations2, GradationDirection};
use crate::histogram::Histogram;
use crate::metric::{bound_metrics2, LocalBasis, Metric2};
use crate::mesher::{MeshJob, Mesher};
use crate::progress::ProgressRange;
use crate::quality::{collect_edges, edge_qualities2};
use crate::surface::Surface;
use crate::types::Element;

/// Worst admissible edge-length quality of the background mesh; above it the
/// mesh does not resolve its own sizing field and another iteration runs.
pub const QH_MAX: f64 = 1.5;

/// Gradation bound applied to the background field between iterations.
pub const BGM_GRADATION: f64 = 0.5;

/// Relative chordal tolerance of the background field.
pub const BGM_CHORDAL_REL: f64 = 0.01;

/// Shape-quality weight handed to the auxiliary engine.
pub const BGM_SHAPE_QUALITY_WEIGHT: f64 = 0.3;

/// Default remeshing budget.
pub const DEFAULT_BGM_REMESHINGS: usize = 4;

/// Fraction of each iteration's progress slice spent in the engine run,
/// before the quality test.
const ITERATION_MESH_SHARE: f64 = 0.85;

/// Settings of one background-mesh construction.
#[derive(Debug, Clone, Copy)]
pub struct BackgroundParams {
    /// Number of remeshing iterations after the initial one.
    pub max_remeshings: usize,
    /// Lower bound on chordal sizes.
    pub min_h: f64,
    /// Clamp range of the parametric field, applied every iteration.
    pub min_h2d: f64,
    pub max_h2d: f64,
}

fn run_aux(aux: &mut dyn Mesher, job: &mut MeshJob, progress: ProgressRange) -> MeshResult<()> {
    let saved = aux.settings().clone();
    let s = aux.settings_mut();
    s.target_h = 0.0;
    s.all_quad_flag = false;
    s.compute_qh_flag = false;
    s.max_gradation = f64::INFINITY;
    s.shape_quality_weight = BGM_SHAPE_QUALITY_WEIGHT;
    s.progress = progress;
    let result = aux.run(job);
    *aux.settings_mut() = saved;
    // Engine failures keep their own code (license, memory, ...); only a
    // structurally unusable result is classified as a background-mesh error.
    result
}

fn triangles_of(elements: &[Element]) -> MeshResult<Vec<[u32; 3]>> {
    elements
        .iter()
        .map(|e| match e {
            Element::Tri3([a, b, c]) => Ok([*a, *b, *c]),
            _ => Err(MeshError::background_mesh(
                "auxiliary engine produced a non-triangle element",
            )),
        })
        .collect()
}

/// Iteratively builds the background triangulation and its sizing field.
///
/// On entry `job` holds the hard nodes, the boundary and the seed field;
/// `bases` holds one tangent basis per node. On success both are extended to
/// cover the nodes created along the way, the refined field is left in
/// `job.metrics`, the new nodes are registered as repulsive points and the
/// final triangulation is returned. Cancellation leaves
/// [`WarningCode::Interruption`] in `job.warning` and returns the last
/// consistent triangulation.
pub fn build_background_mesh<S: Surface>(
    surface: &S,
    aux_mesher: &mut dyn Mesher,
    job: &mut MeshJob,
    bases: &mut Vec<LocalBasis>,
    params: &BackgroundParams,
    progress: &ProgressRange,
) -> MeshResult<Vec<[u32; 3]>> {
    let chordal = ChordalParams {
        control: ChordalControl::ExactAniso,
        max_chordal_error: -BGM_CHORDAL_REL,
        min_h: params.min_h,
        max_h: f64::MAX,
    };
    let iterations = params.max_remeshings + 1;
    let share = 1.0 / iterations as f64;
    let mut tris: Vec<[u32; 3]> = Vec::new();

    for iteration in 0..iterations {
        let slice = progress.child(iteration as f64 * share, share);

        bound_metrics2(&mut job.metrics, params.min_h2d, params.max_h2d);
        let edges = if job.elements.is_empty() {
            job.boundary.clone()
        } else {
            collect_edges(&job.elements, &[])
        };
        let no_pins: [bool; 0] = [];
        bound_metric_gradations2(
            &job.pos2d,
            &edges,
            &no_pins,
            GradationDirection::ShrinkOnly,
            BGM_GRADATION,
            &mut job.metrics,
        );

        let nodes_before = job.node_count();
        run_aux(aux_mesher, job, slice.child(0.0, ITERATION_MESH_SHARE))?;
        if job.warning == WarningCode::Interruption {
            return Ok(tris);
        }
        tris = triangles_of(&job.elements)?;

        // Tangent bases and a basis-aligned field for the nodes the engine
        // created.
        if job.node_count() > nodes_before {
            let new_bases = surface.local_bases(&job.pos2d[nodes_before..])?;
            for (k, basis) in new_bases.into_iter().enumerate() {
                let i = nodes_before + k;
                let mxx = job.metrics[i].0[0];
                if mxx > 0.0 {
                    job.metrics[i] = Metric2::from_iso_and_basis(1.0 / mxx.sqrt(), &basis);
                }
                bases.push(basis);
            }
        }
        // After the first pass only the nodes created by this iteration are
        // constrained; the survivors already carry their chordal bound.
        let chordal_from = if iteration == 0 { 0 } else { nodes_before };
        let mesh_edges = collect_edges(&job.elements, &[]);
        chordal_control2(
            surface,
            &job.pos2d,
            &mesh_edges,
            bases,
            chordal_from..job.node_count(),
            &chordal,
            &mut job.metrics,
        );

        if !slice.report(ITERATION_MESH_SHARE) {
            job.warning = WarningCode::Interruption;
            return Ok(tris);
        }

        let mut histo = Histogram::with_bounds(vec![0.5, 1.0, QH_MAX, 2.0 * QH_MAX]);
        edge_qualities2(&job.pos2d, &mesh_edges, &job.metrics, &mut histo);
        let worst = histo.max_value().unwrap_or(0.0);
        let created = job.node_count() - nodes_before;
        debug!(iteration, worst, created, "background iteration");
        if worst <= QH_MAX || created == 0 {
            let _ = slice.report(1.0);
            break;
        }
        // The new nodes keep steering refinement on the next pass without
        // being forced into the mesh.
        job.repulsive_points
            .extend((nodes_before..job.node_count()).map(|i| i as u32));
        if !slice.report(1.0) {
            job.warning = WarningCode::Interruption;
            return Ok(tris);
        }
    }
    Ok(tris)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::curvature::Curvature2;
    use crate::error::ErrorCode;
    use crate::mesher::{MesherSettings, StructuredMesher};
    use crate::surface::PlanarSurface;
    use nalgebra::{Point2, Point3, Vector3};
    use std::cell::Cell;
    use std::sync::Arc;

    fn square_job(n: usize, h: f64) -> (MeshJob, Vec<LocalBasis>) {
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
        let boundary: Vec<[u32; 2]> = (0..count).map(|i| [i, (i + 1) % count]).collect();
        let plane = PlanarSurface::xy();
        let bases = plane.local_bases(&pos2d).unwrap();
        let metrics = vec![Metric2::iso(h); pos2d.len()];
        let job = MeshJob {
            pos2d,
            boundary,
            metrics,
            ..MeshJob::default()
        };
        (job, bases)
    }

    fn params() -> BackgroundParams {
        BackgroundParams {
            max_remeshings: DEFAULT_BGM_REMESHINGS,
            min_h: 1e-6,
            min_h2d: 1e-4,
            max_h2d: 10.0,
        }
    }

    #[test]
    fn test_flat_square_converges_in_one_iteration() {
        let plane = PlanarSurface::xy();
        let mut aux = StructuredMesher::new();
        let (mut job, mut bases) = square_job(4, 0.25);
        let tris = build_background_mesh(
            &plane,
            &mut aux,
            &mut job,
            &mut bases,
            &params(),
            &ProgressRange::silent(),
        )
        .unwrap();
        assert_eq!(tris.len(), 32, "4x4 structured grid");
        assert_eq!(job.warning, WarningCode::None);
        assert_eq!(bases.len(), job.node_count());
        assert_eq!(job.metrics.len(), job.node_count());
        assert!(
            job.repulsive_points.is_empty(),
            "a converged first iteration reserves no repulsive points"
        );
    }

    #[test]
    fn test_field_stays_valid_and_clamped() {
        let plane = PlanarSurface::xy();
        let mut aux = StructuredMesher::new();
        let (mut job, mut bases) = square_job(4, 0.25);
        build_background_mesh(
            &plane,
            &mut aux,
            &mut job,
            &mut bases,
            &params(),
            &ProgressRange::silent(),
        )
        .unwrap();
        for (i, m) in job.metrics.iter().enumerate() {
            assert!(m.is_valid(), "node {} has an invalid tensor", i);
        }
    }

    #[test]
    fn test_cancellation_is_not_an_error() {
        let plane = PlanarSurface::xy();
        let mut aux = StructuredMesher::new();
        let (mut job, mut bases) = square_job(4, 0.25);
        let handler: crate::progress::InterruptHandler = Arc::new(|_| false);
        let progress = ProgressRange::new(Some(handler), 0.0, 1.0);
        let result = build_background_mesh(
            &plane,
            &mut aux,
            &mut job,
            &mut bases,
            &params(),
            &progress,
        );
        assert!(result.is_ok());
        assert_eq!(job.warning, WarningCode::Interruption);
    }

    /// Flat patch whose reported curvature changes between queries, to tell
    /// apart the nodes each iteration actually constrains.
    struct SteppingSurface {
        calls: Cell<usize>,
        kappas: [f64; 2],
    }

    impl Surface for SteppingSurface {
        fn to_3d(&self, pos2d: &[Point2<f64>]) -> MeshResult<Vec<Point3<f64>>> {
            Ok(pos2d.iter().map(|p| Point3::new(p.x, p.y, 0.0)).collect())
        }

        fn to_2d(&self, pos3d: &[Point3<f64>], nodes: &[u32]) -> MeshResult<Vec<Point2<f64>>> {
            Ok(nodes
                .iter()
                .map(|&i| Point2::new(pos3d[i as usize].x, pos3d[i as usize].y))
                .collect())
        }

        fn local_bases(&self, pos2d: &[Point2<f64>]) -> MeshResult<Vec<LocalBasis>> {
            Ok(vec![LocalBasis::new(Vector3::x(), Vector3::y()); pos2d.len()])
        }

        fn local_curvatures(&self, pos2d: &[Point2<f64>]) -> MeshResult<Vec<Curvature2>> {
            let k = self.calls.get();
            self.calls.set(k + 1);
            let kappa = self.kappas[k.min(1)];
            Ok(vec![Curvature2([kappa, 0.0, 0.0]); pos2d.len()])
        }
    }

    struct LicenselessMesher {
        settings: MesherSettings,
    }

    impl Mesher for LicenselessMesher {
        fn settings(&self) -> &MesherSettings {
            &self.settings
        }

        fn settings_mut(&mut self) -> &mut MesherSettings {
            &mut self.settings
        }

        fn run(&mut self, _job: &mut MeshJob) -> MeshResult<()> {
            Err(MeshError::license("no seat available"))
        }
    }

    #[test]
    fn test_engine_rejections_keep_their_error_code() {
        let plane = PlanarSurface::xy();
        let mut aux = LicenselessMesher {
            settings: MesherSettings::default(),
        };
        let (mut job, mut bases) = square_job(4, 0.25);
        let err = build_background_mesh(
            &plane,
            &mut aux,
            &mut job,
            &mut bases,
            &params(),
            &ProgressRange::silent(),
        )
        .unwrap_err();
        assert_eq!(
            err.code(),
            ErrorCode::License,
            "engine errors must not be reclassified"
        );
    }

    #[test]
    fn test_later_iterations_only_constrain_created_nodes() {
        // Sizes matching a 1% relative sag: h = 2 sqrt(eps (2 - eps)) / kappa.
        let kappa_for = |h: f64| 2.0 * (0.01f64 * 1.99).sqrt() / h;
        let surface = SteppingSurface {
            calls: Cell::new(0),
            kappas: [kappa_for(0.1), kappa_for(0.005)],
        };
        let mut aux = StructuredMesher::new();
        let (mut job, mut bases) = square_job(4, 0.25);
        let p = BackgroundParams {
            max_remeshings: 1,
            ..params()
        };
        build_background_mesh(
            &surface,
            &mut aux,
            &mut job,
            &mut bases,
            &p,
            &ProgressRange::silent(),
        )
        .unwrap();
        assert_eq!(surface.calls.get(), 2, "one curvature query per iteration");
        // The boundary was constrained by the first query only.
        let h_u = 1.0 / job.metrics[0].0[0].sqrt();
        assert!(
            (h_u - 0.1).abs() < 1e-6,
            "boundary tangent size {} drifted from the first-pass chord",
            h_u
        );
        // The nodes of the second pass carry the second query's chord.
        let h_new = 1.0 / job.metrics.last().unwrap().0[0].sqrt();
        assert!(h_new < 0.01, "created node kept a stale size {}", h_new);
    }

    #[test]
    fn test_aux_settings_are_restored() {
        let plane = PlanarSurface::xy();
        let mut aux = StructuredMesher::new();
        aux.settings_mut().target_h = 123.0;
        aux.settings_mut().all_quad_flag = true;
        let (mut job, mut bases) = square_job(4, 0.25);
        build_background_mesh(
            &plane,
            &mut aux,
            &mut job,
            &mut bases,
            &params(),
            &ProgressRange::silent(),
        )
        .unwrap();
        assert_eq!(aux.settings().target_h, 123.0);
        assert!(aux.settings().all_quad_flag);
    }
}
