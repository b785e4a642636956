//! Curvature-adaptive meshing of a parametrized surface patch.
//!
//! The pipeline maps the hard nodes into the parametric plane, builds a
//! background mesh carrying an anisotropic sizing field, tightens the field
//! with gradation and chordal control, runs the main meshing engine on the
//! parametric domain and lifts the result back onto the surface.

use hashbrown::HashMap;
use nalgebra::{Matrix3, Point2, Point3};
use tracing::debug;

use crate::background::{build_background_mesh, BackgroundParams, DEFAULT_BGM_REMESHINGS};
use crate::curvature::{chordal_control3, ChordalControl, ChordalParams};
use crate::error::{MeshError, MeshResult, WarningCode};
use crate::gradation::{bound_metric_gradations3, GradationDirection};
use crate::histogram::Histogram;
use crate::interpolate::interpolate_metrics3;
use crate::metric::{bound_metrics2, LocalBasis, Metric3};
use crate::mesher::{BasicMode, MeshJob, Mesher};
use crate::progress::ProgressRange;
use crate::quality::{
    collect_tri_edges, flip_orientation, generate_high_order_nodes, get_ancestors, get_neighbors,
    shape_qualities, split_bad_quads, surface_areas, HighOrder, QuadSplitCriterion,
    DEGENERATE_QUALITY, LOW_QUALITY_THRESHOLD,
};
use crate::surface::Surface;
use crate::tracing_ext::{log_mesh_stats, OperationTimer};
use crate::types::{BoundaryEdge, Element, MeshData};

/// Lower clamp of the parametric field, as a fraction of the shortest 2-D
/// boundary edge.
pub const MIN_H2D_RATIO: f64 = 1e-2;

/// Upper clamp of the background field, as a fraction of the 2-D domain
/// diagonal.
const BGM_MAX_H2D_FACTOR: f64 = 0.125;

/// Default `min_h`, as a fraction of the shortest 3-D boundary edge, when the
/// caller leaves the bound unset.
const MIN_H_RATIO: f64 = 1e-6;

// Progress shares of the pipeline stages.
const SETUP_SHARE: f64 = 0.05;
const BGM_SHARE: f64 = 0.50;
const MESH_SHARE: f64 = 0.40;
const POST_SHARE: f64 = 0.05;

/// Settings of a surface meshing run.
#[derive(Debug, Clone)]
pub struct SurfaceMeshParams {
    pub chordal_control: ChordalControl,
    /// Sag tolerance: positive for an absolute distance, negative for a
    /// fraction of the local curvature radius.
    pub max_chordal_error: f64,
    /// Lower bound on generated sizes; non-positive defaults to a small
    /// fraction of the shortest boundary edge.
    pub min_h: f64,
    pub high_order: HighOrder,
    /// Diagonal selection rule when splitting badly shaped quadrangles.
    pub split_criterion: QuadSplitCriterion,
    /// Remeshing budget of the background-mesh iterator.
    pub max_bgm_remeshings: usize,
    /// Whether to recompute shape qualities on the final mesh.
    pub recompute_qs: bool,
    /// Whether to compute surface areas on the final mesh.
    pub compute_area: bool,
    pub progress: ProgressRange,
}

impl Default for SurfaceMeshParams {
    fn default() -> Self {
        SurfaceMeshParams {
            chordal_control: ChordalControl::Disabled,
            max_chordal_error: -0.01,
            min_h: 0.0,
            high_order: HighOrder::Linear,
            split_criterion: QuadSplitCriterion::Default,
            max_bgm_remeshings: DEFAULT_BGM_REMESHINGS,
            recompute_qs: true,
            compute_area: true,
            progress: ProgressRange::silent(),
        }
    }
}

impl SurfaceMeshParams {
    /// Settings with curvature adaptation enabled.
    pub fn with_chordal(control: ChordalControl, max_chordal_error: f64) -> Self {
        SurfaceMeshParams {
            chordal_control: control,
            max_chordal_error,
            ..SurfaceMeshParams::default()
        }
    }
}

/// Summary of a surface meshing run.
#[derive(Debug, Clone)]
pub struct SurfaceMeshInfo {
    pub warning: WarningCode,
    pub node_count: usize,
    pub created_nodes: usize,
    pub element_count: usize,
    pub triangle_count: usize,
    pub quad_count: usize,
    /// Worst shape quality, 1.0 when nothing was measured.
    pub qmin: f64,
    pub histo_qs: Histogram,
    pub area_q4: f64,
    pub area_t3: f64,
    /// Wall-clock duration in seconds.
    pub total_time: f64,
    /// Elements generated per second.
    pub speed: f64,
}

impl Default for SurfaceMeshInfo {
    fn default() -> Self {
        SurfaceMeshInfo {
            warning: WarningCode::None,
            node_count: 0,
            created_nodes: 0,
            element_count: 0,
            triangle_count: 0,
            quad_count: 0,
            qmin: 1.0,
            histo_qs: Histogram::new(),
            area_q4: 0.0,
            area_t3: 0.0,
            total_time: 0.0,
            speed: 0.0,
        }
    }
}

/// Hard-node canonicalization: unique caller indices in pipeline order.
struct NodeMap {
    new_to_old: Vec<u32>,
    old_to_new: HashMap<u32, u32>,
}

impl NodeMap {
    fn add(&mut self, old: u32) -> u32 {
        *self.old_to_new.entry(old).or_insert_with(|| {
            self.new_to_old.push(old);
            (self.new_to_old.len() - 1) as u32
        })
    }
}

fn canonicalize(data: &MeshData) -> NodeMap {
    let mut map = NodeMap {
        new_to_old: Vec::new(),
        old_to_new: HashMap::new(),
    };
    for e in &data.connect_b {
        map.add(e.a);
        map.add(e.b);
    }
    for e in &data.connect_b {
        if let Some(m) = e.mid {
            map.add(m);
        }
    }
    for t in &data.background {
        for &i in t {
            map.add(i);
        }
    }
    for &i in &data.isolated_nodes {
        map.add(i);
    }
    for &i in &data.repulsive_points {
        map.add(i);
    }
    for e in &data.connect_m {
        for &i in e.nodes() {
            map.add(i);
        }
    }
    map
}

/// Length statistics of the boundary, in caller and parametric space.
struct LengthRanges {
    min3d: f64,
    rms3d: f64,
    diag3d: f64,
    min2d: f64,
    diag2d: f64,
}

fn length_ranges(
    pos3: &[Point3<f64>],
    pos2d: &[Point2<f64>],
    boundary: &[[u32; 2]],
    map: &NodeMap,
) -> MeshResult<LengthRanges> {
    let mut min3d = f64::MAX;
    let mut min2d = f64::MAX;
    let mut sum_sq = 0.0;
    for &[a, b] in boundary {
        let (oa, ob) = (map.new_to_old[a as usize], map.new_to_old[b as usize]);
        let l3 = (pos3[ob as usize] - pos3[oa as usize]).norm();
        let l2 = (pos2d[b as usize] - pos2d[a as usize]).norm();
        if !(l3 > 0.0) || !(l2 > 0.0) {
            return Err(MeshError::edge(oa, ob, "zero-length boundary edge"));
        }
        min3d = min3d.min(l3);
        min2d = min2d.min(l2);
        sum_sq += l3 * l3;
    }
    let rms3d = (sum_sq / boundary.len() as f64).sqrt();
    let diag = |lo: [f64; 3], hi: [f64; 3]| {
        ((hi[0] - lo[0]).powi(2) + (hi[1] - lo[1]).powi(2) + (hi[2] - lo[2]).powi(2)).sqrt()
    };
    let mut lo3 = [f64::MAX; 3];
    let mut hi3 = [-f64::MAX; 3];
    for &old in &map.new_to_old {
        let p = pos3[old as usize];
        for (k, c) in [p.x, p.y, p.z].into_iter().enumerate() {
            lo3[k] = lo3[k].min(c);
            hi3[k] = hi3[k].max(c);
        }
    }
    let mut lo2 = [f64::MAX; 3];
    let mut hi2 = [-f64::MAX; 3];
    for p in pos2d {
        for (k, c) in [p.x, p.y, 0.0].into_iter().enumerate() {
            lo2[k] = lo2[k].min(c);
            hi2[k] = hi2[k].max(c);
        }
    }
    Ok(LengthRanges {
        min3d,
        rms3d,
        diag3d: diag(lo3, hi3),
        min2d,
        diag2d: diag(lo2, hi2),
    })
}

/// Boundary-aligned tensor of one edge endpoint: the edge length along the
/// tangent, `hb` across it (the length again when `hb` is unset).
fn edge_aligned_metric3(e: &nalgebra::Vector3<f64>, hb: f64) -> Option<Metric3> {
    let l = e.norm();
    if !(l > 0.0 && l.is_finite()) {
        return None;
    }
    let t = e / l;
    let lam_t = 1.0 / (l * l);
    let hb = if hb > 0.0 { hb } else { l };
    let lam_n = 1.0 / (hb * hb);
    let ttt = t * t.transpose();
    let m = lam_t * ttt + lam_n * (Matrix3::identity() - ttt);
    Some(Metric3::from_matrix(&m))
}

/// Binormal size handed to the boundary-aligned tensors. The target size
/// only steers the off-tangent directions when an anisotropic chordal mode
/// is in charge of them; otherwise the edge length is reused.
fn boundary_binormal(control: ChordalControl, target_h: f64) -> f64 {
    if control.is_aniso() {
        target_h.max(0.0)
    } else {
        0.0
    }
}

/// Triangulates the metric-carrying hard nodes with the auxiliary engine in
/// non-refining mode, as the support for interpolating the interior field.
/// `None` when fewer than three carriers exist or the engine cannot connect
/// them as given.
fn carrier_triangulation(
    aux: &mut dyn Mesher,
    pos2d: &[Point2<f64>],
    working3: &[Metric3],
    bases: &[LocalBasis],
    n_hard: usize,
) -> Option<Vec<[u32; 3]>> {
    let carriers: Vec<u32> = (0..n_hard)
        .filter(|&i| working3[i].is_valid())
        .map(|i| i as u32)
        .collect();
    if carriers.len() < 3 {
        return None;
    }
    let mut tri_job = MeshJob {
        pos2d: carriers.iter().map(|&i| pos2d[i as usize]).collect(),
        metrics: carriers
            .iter()
            .map(|&i| working3[i as usize].project(&bases[i as usize]))
            .collect(),
        ..MeshJob::default()
    };
    let saved = aux.settings().clone();
    let s = aux.settings_mut();
    s.target_h = 0.0;
    s.refine_flag = false;
    s.all_quad_flag = false;
    s.compute_qh_flag = false;
    s.progress = ProgressRange::silent();
    let run = aux.run(&mut tri_job);
    *aux.settings_mut() = saved;
    if !matches!(run, Ok(())) || tri_job.warning != WarningCode::None {
        return None;
    }
    let mut tris = Vec::with_capacity(tri_job.elements.len());
    for e in &tri_job.elements {
        match e {
            Element::Tri3([a, b, c]) => tris.push([
                carriers[*a as usize],
                carriers[*b as usize],
                carriers[*c as usize],
            ]),
            _ => return None,
        }
    }
    (!tris.is_empty()).then_some(tris)
}

fn checked<T>(result: MeshResult<Vec<T>>, expected: usize, what: &str) -> MeshResult<Vec<T>> {
    let v = result?;
    if v.len() == expected {
        Ok(v)
    } else {
        Err(MeshError::internal(format!(
            "surface returned {} {} for {} queries",
            v.len(),
            what,
            expected
        )))
    }
}

fn check_preconditions(
    data: &MeshData,
    mesher: &dyn Mesher,
    aux_mesher: &dyn Mesher,
    params: &SurfaceMeshParams,
) -> MeshResult<()> {
    data.check_indices()?;
    data.metrics.check_arity(data.node_count())?;
    if mesher.settings().basic_mode == BasicMode::ConvexHull
        || aux_mesher.settings().basic_mode == BasicMode::ConvexHull
    {
        return Err(MeshError::boundary("convex-hull mode is not meshable here"));
    }
    if params.high_order == HighOrder::Linear && data.connect_b.iter().any(|e| e.mid.is_some()) {
        return Err(MeshError::boundary(
            "mid-side boundary nodes supplied without a quadratic request",
        ));
    }
    if !data.background.is_empty() {
        if data.metrics.is_none() {
            return Err(MeshError::invalid_metrics(
                "a background mesh requires a metric field",
            ));
        }
        for t in &data.background {
            for &i in t {
                let valid = data
                    .metrics
                    .tensor(i as usize)
                    .is_some_and(|m| m.is_valid());
                if !valid {
                    return Err(MeshError::invalid_metrics(format!(
                        "invalid metric on background node {i}"
                    )));
                }
            }
        }
    }
    Ok(())
}

/// Meshes a parametrized surface patch.
///
/// `mesher` generates the final mesh; `aux_mesher` is the engine of the
/// background-mesh iterator (taking two exclusive borrows keeps one engine
/// from playing both roles). On success the created nodes are appended to
/// `data.pos`, `data.connect_m` holds the mesh in caller indices and the
/// adjacency fields are rebuilt. `data.metrics` is left untouched.
///
/// Cancellation through the progress handler is not an error: the run
/// unwinds at the next checkpoint and the returned info carries
/// [`WarningCode::Interruption`].
pub fn mesh_parametric_surface<S: Surface>(
    surface: &S,
    mesher: &mut dyn Mesher,
    aux_mesher: &mut dyn Mesher,
    data: &mut MeshData,
    params: &SurfaceMeshParams,
) -> MeshResult<SurfaceMeshInfo> {
    let timer = OperationTimer::new("mesh_parametric_surface");
    let mut info = SurfaceMeshInfo::default();
    if data.connect_b.is_empty() {
        let _ = params.progress.report(1.0);
        return Ok(info);
    }
    check_preconditions(data, mesher, aux_mesher, params)?;

    // Setup: canonical hard nodes, parametric coordinates, tangent bases.
    let map = canonicalize(data);
    let n_pre = map.new_to_old.len();
    let mut pos2d = checked(
        surface.to_2d(&data.pos, &map.new_to_old),
        n_pre,
        "parametric points",
    )?;
    let mut bases = checked(surface.local_bases(&pos2d), n_pre, "bases")?;
    let boundary: Vec<[u32; 2]> = data
        .connect_b
        .iter()
        .map(|e| [map.old_to_new[&e.a], map.old_to_new[&e.b]])
        .collect();
    let job_boundary: Vec<BoundaryEdge> = data
        .connect_b
        .iter()
        .map(|e| {
            let mapped = BoundaryEdge::new(map.old_to_new[&e.a], map.old_to_new[&e.b]);
            match e.mid {
                Some(m) => BoundaryEdge {
                    mid: Some(map.old_to_new[&m]),
                    ..mapped
                },
                None => mapped,
            }
        })
        .collect();
    let ranges = length_ranges(&data.pos, &pos2d, &boundary, &map)?;
    let min_h = if params.min_h > 0.0 {
        params.min_h
    } else {
        MIN_H_RATIO * ranges.min3d
    };
    if !params.progress.report(SETUP_SHARE) {
        info.warning = WarningCode::Interruption;
        return Ok(info);
    }

    // Background mesh: user supplied, or built by the iterator.
    let h_seed = (ranges.rms3d * ranges.diag3d).sqrt().min(4.0 * ranges.rms3d);
    let mut job = MeshJob {
        metrics: (0..n_pre)
            .map(|i| match data.metrics.tensor(map.new_to_old[i] as usize) {
                Some(m) if m.is_valid() => m.project(&bases[i]),
                _ => crate::metric::Metric2::from_iso_and_basis(h_seed, &bases[i]),
            })
            .collect(),
        pos2d,
        boundary: boundary.clone(),
        isolated_nodes: data
            .isolated_nodes
            .iter()
            .map(|&i| map.old_to_new[&i])
            .collect(),
        repulsive_points: data
            .repulsive_points
            .iter()
            .map(|&i| map.old_to_new[&i])
            .collect(),
        ..MeshJob::default()
    };
    let bg_tris: Vec<[u32; 3]> = if data.background.is_empty() {
        let bgm_params = BackgroundParams {
            max_remeshings: params.max_bgm_remeshings,
            min_h,
            min_h2d: MIN_H2D_RATIO * ranges.min2d,
            max_h2d: BGM_MAX_H2D_FACTOR * ranges.diag2d,
        };
        let progress = params.progress.child(SETUP_SHARE, BGM_SHARE);
        let tris = build_background_mesh(
            surface,
            aux_mesher,
            &mut job,
            &mut bases,
            &bgm_params,
            &progress,
        )?;
        if job.warning == WarningCode::Interruption {
            info.warning = WarningCode::Interruption;
            return Ok(info);
        }
        tris
    } else {
        data.background
            .iter()
            .map(|t| {
                [
                    map.old_to_new[&t[0]],
                    map.old_to_new[&t[1]],
                    map.old_to_new[&t[2]],
                ]
            })
            .collect()
    };
    job.background_tris = bg_tris.clone();
    job.elements.clear();

    // Working 3-D field over every job node: caller tensors where valid,
    // boundary-aligned tensors on the contour, the target size or an
    // interpolation elsewhere.
    let n_job = job.node_count();
    pos2d = std::mem::take(&mut job.pos2d);
    let pos3_job = checked(surface.to_3d(&pos2d), n_job, "surface points")?;
    let mut working3: Vec<Metric3> = (0..n_job)
        .map(|i| {
            if i < n_pre {
                data.metrics
                    .tensor(map.new_to_old[i] as usize)
                    .filter(Metric3::is_valid)
                    .unwrap_or(Metric3::ZERO)
            } else {
                Metric3::ZERO
            }
        })
        .collect();
    // Caller tensors on hard nodes are authoritative: only unset entries
    // receive the boundary-aligned tensor, intersected across the edges
    // sharing the node.
    let hb = boundary_binormal(params.chordal_control, mesher.settings().target_h);
    let mut on_boundary = vec![false; n_job];
    let mut edge_generated = vec![false; n_job];
    for &[a, b] in &boundary {
        let e3 = pos3_job[b as usize] - pos3_job[a as usize];
        for i in [a as usize, b as usize] {
            on_boundary[i] = true;
            let Some(me) = edge_aligned_metric3(&e3, hb) else {
                continue;
            };
            if edge_generated[i] {
                working3[i] = working3[i].intersect(&me).0;
            } else if !working3[i].is_valid() {
                working3[i] = me;
                edge_generated[i] = true;
            }
        }
    }
    for i in 0..n_job {
        if on_boundary[i] {
            working3[i] = working3[i].clamp_sizes(min_h, f64::MAX);
        }
    }
    let target_h = mesher.settings().target_h;
    if target_h > 0.0 {
        for m in working3.iter_mut() {
            if !m.is_valid() {
                *m = Metric3::iso(target_h);
            }
        }
    } else {
        // Soft entries interpolate from the caller's tensors over a
        // triangulation of the metric-carrying hard nodes; the background
        // triangles cannot serve here as their corners carry no caller data.
        let hard_tris = carrier_triangulation(aux_mesher, &pos2d, &working3, &bases, n_pre);
        let support = hard_tris.as_deref().unwrap_or(&bg_tris);
        let filled = interpolate_metrics3(&pos2d, support, &mut working3);
        debug!(
            filled,
            dedicated = hard_tris.is_some(),
            "interior metrics interpolated"
        );
        let fallback = Metric3::iso(ranges.rms3d);
        for m in working3.iter_mut() {
            if !m.is_valid() {
                *m = fallback;
            }
        }
    }

    // Gradation, chordal control, gradation again: the second pass may not
    // coarsen, so the curvature bounds survive smoothing.
    let field_edges = if bg_tris.is_empty() {
        boundary.clone()
    } else {
        collect_tri_edges(&bg_tris)
    };
    let fixed = on_boundary;
    let max_gradation = mesher.settings().max_gradation;
    bound_metric_gradations3(
        &pos3_job,
        &field_edges,
        &fixed,
        GradationDirection::Both,
        max_gradation,
        &mut working3,
    );
    let chordal = ChordalParams {
        control: params.chordal_control,
        max_chordal_error: params.max_chordal_error,
        min_h,
        max_h: f64::MAX,
    };
    chordal_control3(
        surface,
        &pos2d,
        &field_edges,
        &bases,
        0..n_job,
        &chordal,
        &mut working3,
    );
    bound_metric_gradations3(
        &pos3_job,
        &field_edges,
        &fixed,
        GradationDirection::ShrinkOnly,
        max_gradation,
        &mut working3,
    );

    // Project into the parametric plane and clamp.
    job.metrics = working3
        .iter()
        .zip(&bases)
        .map(|(m, basis)| m.project(basis))
        .collect();
    bound_metrics2(&mut job.metrics, MIN_H2D_RATIO * ranges.min2d, ranges.diag2d);
    job.pos2d = pos2d;
    // Pre-supplied mid nodes steer sizing without entering the mesh.
    for e in &job_boundary {
        if let Some(m) = e.mid {
            job.repulsive_points.push(m);
            let (ma, mb) = (job.metrics[e.a as usize], job.metrics[e.b as usize]);
            job.metrics[m as usize] = ma.intersect(&mb).0;
        }
    }

    // Main run, with the sizing and quality duties the pipeline already
    // performed switched off.
    let saved = mesher.settings().clone();
    {
        let s = mesher.settings_mut();
        s.target_h = 0.0;
        s.max_gradation = f64::INFINITY;
        s.compute_qh_flag = false;
        if s.all_quad_flag {
            s.min_q4_angle_quality = 0.0;
        }
        s.progress = params.progress.child(SETUP_SHARE + BGM_SHARE, MESH_SHARE);
    }
    let run = mesher.run(&mut job);
    *mesher.settings_mut() = saved;
    run?;
    info.warning = job.warning;

    // Post-processing in the parametric plane: quad splitting and high-order
    // nodes, both skipped on an interrupted run.
    if info.warning == WarningCode::None {
        if !mesher.settings().all_quad_flag && params.high_order == HighOrder::Linear {
            let split = split_bad_quads(
                &checked(surface.to_3d(&job.pos2d), job.node_count(), "surface points")?,
                &mut job.elements,
                mesher.settings().min_q4_angle_quality,
                params.split_criterion,
            );
            if split > 0 {
                debug!(split, "badly shaped quadrangles split into triangles");
            }
        }
        if params.high_order != HighOrder::Linear {
            let created = generate_high_order_nodes(
                &mut job.pos2d,
                &mut job.elements,
                &job_boundary,
                params.high_order,
            );
            debug!(created, "high-order nodes generated");
        }
    }
    if !params.progress.report(SETUP_SHARE + BGM_SHARE + MESH_SHARE) {
        info.warning = WarningCode::Interruption;
    }

    // Splice back into caller space: created nodes lifted to 3-D and
    // appended, indices rewritten, background bookkeeping dropped.
    let mut created_of: HashMap<u32, u32> = HashMap::new();
    let mut created_2d: Vec<Point2<f64>> = Vec::new();
    for e in &job.elements {
        for &n in e.nodes() {
            if n as usize >= n_pre && !created_of.contains_key(&n) {
                created_of.insert(n, (data.pos.len() + created_2d.len()) as u32);
                created_2d.push(job.pos2d[n as usize]);
            }
        }
    }
    let created_3d = checked(surface.to_3d(&created_2d), created_2d.len(), "surface points")?;
    info.created_nodes = created_3d.len();
    data.pos.extend(created_3d);
    data.connect_m = job
        .elements
        .iter()
        .map(|e| {
            let mut e = *e;
            for n in e.nodes_mut() {
                *n = if (*n as usize) < n_pre {
                    map.new_to_old[*n as usize]
                } else {
                    created_of[n]
                };
            }
            e
        })
        .collect();

    // Final bookkeeping on the caller-space mesh.
    if data.boundary_sgn < 0 {
        flip_orientation(&mut data.connect_m);
    }
    if params.recompute_qs && !data.connect_m.is_empty() {
        let qs = shape_qualities(&data.pos, &data.connect_m);
        let mut worst = (0usize, f64::MAX);
        for (i, &q) in qs.iter().enumerate() {
            if q < worst.1 {
                worst = (i, q);
            }
        }
        info.qmin = worst.1;
        let bounds: Vec<f64> = (0..=10).map(|k| k as f64 / 10.0).collect();
        info.histo_qs = Histogram::with_bounds(bounds);
        info.histo_qs.process_all(&qs);
        if info.qmin < DEGENERATE_QUALITY {
            return Err(MeshError::degenerate_element(worst.0, info.qmin));
        }
        if info.qmin < LOW_QUALITY_THRESHOLD && info.warning == WarningCode::None {
            info.warning = WarningCode::ShapeQuality;
        }
    }
    data.ancestors = get_ancestors(&data.connect_m, data.pos.len());
    data.neighbors = get_neighbors(&data.connect_m);
    if params.compute_area {
        let (q4, t3) = surface_areas(&data.pos, &data.connect_m);
        info.area_q4 = q4;
        info.area_t3 = t3;
    }
    info.node_count = data.pos.len();
    info.element_count = data.connect_m.len();
    info.triangle_count = data.triangle_count();
    info.quad_count = data.quad_count();
    info.total_time = timer.elapsed().as_secs_f64();
    info.speed = if info.total_time > 0.0 {
        info.element_count as f64 / info.total_time
    } else {
        0.0
    };
    log_mesh_stats(
        info.node_count,
        info.triangle_count,
        info.quad_count,
        info.qmin,
    );
    let _ = params
        .progress
        .report(SETUP_SHARE + BGM_SHARE + MESH_SHARE + POST_SHARE);
    Ok(info)
}
