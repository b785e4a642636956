//! Edge-length and element-shape quality measures, plus the mesh surgery
//! helpers that depend on them (bad-quad splitting, adjacency, orientation,
//! areas, high-order nodes).

use hashbrown::{HashMap, HashSet};
use nalgebra::{Point2, Point3, Vector3};

use crate::histogram::Histogram;
use crate::metric::Metric2;
use crate::types::{BoundaryEdge, Element};

/// Worst shape quality below which an element counts as degenerate.
pub const DEGENERATE_QUALITY: f64 = 1e-12;

/// Worst shape quality below which the run gets a quality warning.
pub const LOW_QUALITY_THRESHOLD: f64 = 0.01;

/// Returns an edge with its endpoints ordered, so that both windings of the
/// same edge map to one key.
pub fn canonical_edge(a: u32, b: u32) -> [u32; 2] {
    if a <= b { [a, b] } else { [b, a] }
}

/// Length quality of a segment of length `l` between target sizes `h0` and
/// `h1`:
///
/// `qh = l · ln(h0/h1) / (h0 − h1)`
///
/// which tends to `l / h0` as the sizes converge. A quality of 1 is a
/// perfect length; below 1 the edge is too short, above 1 too long.
pub fn edge_quality(l: f64, h0: f64, h1: f64) -> f64 {
    if !(h0 > 0.0 && h1 > 0.0) {
        return f64::INFINITY;
    }
    let spread = (h0 - h1).abs();
    if spread <= 1e-12 * h0.max(h1) {
        2.0 * l / (h0 + h1)
    } else {
        l * (h0 / h1).ln() / (h0 - h1)
    }
}

/// Unique corner edges of a batch of elements, excluded edges removed.
pub fn collect_edges(elements: &[Element], excluded: &[[u32; 2]]) -> Vec<[u32; 2]> {
    let skip: HashSet<[u32; 2]> = excluded
        .iter()
        .map(|e| canonical_edge(e[0], e[1]))
        .collect();
    let mut seen: HashSet<[u32; 2]> = HashSet::new();
    let mut edges = Vec::new();
    for element in elements {
        for [a, b] in element.corner_edges() {
            let key = canonical_edge(a, b);
            if !skip.contains(&key) && seen.insert(key) {
                edges.push(key);
            }
        }
    }
    edges
}

/// Unique edges of a triangle-only connectivity.
pub fn collect_tri_edges(tris: &[[u32; 3]]) -> Vec<[u32; 2]> {
    let mut seen: HashSet<[u32; 2]> = HashSet::new();
    let mut edges = Vec::new();
    for t in tris {
        for i in 0..3 {
            let key = canonical_edge(t[i], t[(i + 1) % 3]);
            if seen.insert(key) {
                edges.push(key);
            }
        }
    }
    edges
}

/// Counts the length qualities of parametric edges into a histogram, under
/// an anisotropic 2-D metric field. The directional size at each endpoint is
/// taken along the edge.
pub fn edge_qualities2(
    pos2d: &[Point2<f64>],
    edges: &[[u32; 2]],
    metrics: &[Metric2],
    histo: &mut Histogram,
) {
    for &[a, b] in edges {
        let e = pos2d[b as usize] - pos2d[a as usize];
        let l = e.norm();
        if !(l > 0.0) {
            continue;
        }
        let la = metrics[a as usize].segment_length(&e);
        let lb = metrics[b as usize].segment_length(&e);
        if la > 0.0 && lb > 0.0 {
            histo.process(edge_quality(l, l / la, l / lb));
        }
    }
}

/// Isotropic shape quality of a triangle: `4√3·A / Σl²`, which is 1 for an
/// equilateral triangle and 0 for a degenerate one.
pub fn triangle_shape_quality(p0: &Point3<f64>, p1: &Point3<f64>, p2: &Point3<f64>) -> f64 {
    let e0 = p1 - p0;
    let e1 = p2 - p1;
    let e2 = p0 - p2;
    let sum_sq = e0.norm_squared() + e1.norm_squared() + e2.norm_squared();
    if !(sum_sq > 0.0) {
        return 0.0;
    }
    let area = 0.5 * e0.cross(&(p2 - p0)).norm();
    4.0 * 3.0_f64.sqrt() * area / sum_sq
}

fn corner_points<'a>(pos: &'a [Point3<f64>], element: &Element) -> Vec<&'a Point3<f64>> {
    element
        .corners()
        .iter()
        .map(|&i| &pos[i as usize])
        .collect()
}

/// Isotropic shape quality of an element. Quadrangles take the minimum of
/// their four corner-triangle qualities.
pub fn element_shape_quality(pos: &[Point3<f64>], element: &Element) -> f64 {
    let p = corner_points(pos, element);
    match p.len() {
        3 => triangle_shape_quality(p[0], p[1], p[2]),
        _ => {
            let q0 = triangle_shape_quality(p[0], p[1], p[2]);
            let q1 = triangle_shape_quality(p[0], p[2], p[3]);
            let q2 = triangle_shape_quality(p[0], p[1], p[3]);
            let q3 = triangle_shape_quality(p[1], p[2], p[3]);
            q0.min(q1).min(q2).min(q3)
        }
    }
}

/// Shape qualities of a whole batch.
pub fn shape_qualities(pos: &[Point3<f64>], elements: &[Element]) -> Vec<f64> {
    elements
        .iter()
        .map(|e| element_shape_quality(pos, e))
        .collect()
}

/// Angle quality of a quad corner: the sine of the corner angle, 1 at a
/// right angle, 0 when flat or pinched.
fn corner_angle_quality(prev: &Point3<f64>, at: &Point3<f64>, next: &Point3<f64>) -> f64 {
    let u = prev - at;
    let v = next - at;
    let den = u.norm() * v.norm();
    if !(den > 0.0) {
        return 0.0;
    }
    (u.cross(&v).norm() / den).clamp(0.0, 1.0)
}

/// Angle quality of a quadrangle: the worst of its four corner qualities.
pub fn quad_angle_quality(pos: &[Point3<f64>], element: &Element) -> f64 {
    let p = corner_points(pos, element);
    if p.len() != 4 {
        return 1.0;
    }
    let mut q: f64 = 1.0;
    for i in 0..4 {
        q = q.min(corner_angle_quality(
            p[(i + 3) % 4],
            p[i],
            p[(i + 1) % 4],
        ));
    }
    q
}

/// Diagonal selection rule for [`split_bad_quads`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QuadSplitCriterion {
    /// Same as `MinDihedral`.
    #[default]
    Default,
    /// Maximize the worst shape quality of the two triangles.
    MaxShapeQuality,
    /// Maximize the worst corner-angle quality of the two triangles.
    MaxAngleQuality,
    /// Minimize the summed area of the two triangles.
    MinArea,
    /// Minimize the dihedral angle between the two triangles (flattest
    /// split).
    MinDihedral,
}

fn tri_normal(p0: &Point3<f64>, p1: &Point3<f64>, p2: &Point3<f64>) -> Vector3<f64> {
    (p1 - p0).cross(&(p2 - p0))
}

fn tri_angle_quality(p0: &Point3<f64>, p1: &Point3<f64>, p2: &Point3<f64>) -> f64 {
    corner_angle_quality(p2, p0, p1)
        .min(corner_angle_quality(p0, p1, p2))
        .min(corner_angle_quality(p1, p2, p0))
}

/// Score of one diagonal split: higher is better.
fn split_score(
    pos: &[Point3<f64>],
    [a, b, c, d]: [u32; 4],
    criterion: QuadSplitCriterion,
) -> f64 {
    // Triangles (a, b, c) and (a, c, d): the diagonal is (a, c).
    let (pa, pb, pc, pd) = (
        &pos[a as usize],
        &pos[b as usize],
        &pos[c as usize],
        &pos[d as usize],
    );
    match criterion {
        QuadSplitCriterion::MaxShapeQuality => {
            triangle_shape_quality(pa, pb, pc).min(triangle_shape_quality(pa, pc, pd))
        }
        QuadSplitCriterion::MaxAngleQuality => {
            tri_angle_quality(pa, pb, pc).min(tri_angle_quality(pa, pc, pd))
        }
        QuadSplitCriterion::MinArea => {
            -(0.5 * tri_normal(pa, pb, pc).norm() + 0.5 * tri_normal(pa, pc, pd).norm())
        }
        QuadSplitCriterion::Default | QuadSplitCriterion::MinDihedral => {
            let n0 = tri_normal(pa, pb, pc);
            let n1 = tri_normal(pa, pc, pd);
            let den = n0.norm() * n1.norm();
            if den > 0.0 {
                // cos of the dihedral angle: 1 = coplanar.
                (n0.dot(&n1) / den).clamp(-1.0, 1.0)
            } else {
                -1.0
            }
        }
    }
}

/// Splits linear quadrangles whose angle quality falls below
/// `min_angle_quality` into two triangles, choosing the diagonal by
/// `criterion`. Elements are reordered quads-first. Returns the number of
/// split quads.
pub fn split_bad_quads(
    pos: &[Point3<f64>],
    elements: &mut Vec<Element>,
    min_angle_quality: f64,
    criterion: QuadSplitCriterion,
) -> usize {
    if min_angle_quality <= 0.0 {
        return 0;
    }
    let mut quads = Vec::new();
    let mut tris = Vec::new();
    let mut split = 0;
    for element in elements.drain(..) {
        match element {
            Element::Quad4(q) if quad_angle_quality(pos, &element) < min_angle_quality => {
                let [a, b, c, d] = q;
                let ac = split_score(pos, [a, b, c, d], criterion);
                let bd = split_score(pos, [b, c, d, a], criterion);
                if ac >= bd {
                    tris.push(Element::Tri3([a, b, c]));
                    tris.push(Element::Tri3([a, c, d]));
                } else {
                    tris.push(Element::Tri3([b, c, d]));
                    tris.push(Element::Tri3([b, d, a]));
                }
                split += 1;
            }
            Element::Quad4(_) => quads.push(element),
            other => tris.push(other),
        }
    }
    elements.extend(quads);
    elements.extend(tris);
    split
}

/// One incident element per node, `None` for unreferenced nodes.
pub fn get_ancestors(elements: &[Element], node_count: usize) -> Vec<Option<u32>> {
    let mut ancestors = vec![None; node_count];
    for (ei, element) in elements.iter().enumerate() {
        for &n in element.nodes() {
            let slot = &mut ancestors[n as usize];
            if slot.is_none() {
                *slot = Some(ei as u32);
            }
        }
    }
    ancestors
}

/// Adjacent element across each corner edge. Slot `k` matches the edge from
/// corner `k` to corner `k + 1`; slot 3 stays `None` for triangles.
pub fn get_neighbors(elements: &[Element]) -> Vec<[Option<u32>; 4]> {
    let mut neighbors = vec![[None; 4]; elements.len()];
    let mut by_edge: HashMap<[u32; 2], (u32, u8)> = HashMap::new();
    for (ei, element) in elements.iter().enumerate() {
        for (slot, [a, b]) in element.corner_edges().enumerate() {
            let key = canonical_edge(a, b);
            match by_edge.remove(&key) {
                Some((other, other_slot)) => {
                    neighbors[ei][slot] = Some(other);
                    neighbors[other as usize][other_slot as usize] = Some(ei as u32);
                }
                None => {
                    by_edge.insert(key, (ei as u32, slot as u8));
                }
            }
        }
    }
    neighbors
}

/// Reverses the winding of every element in place.
pub fn flip_orientation(elements: &mut [Element]) {
    for e in elements {
        e.flip();
    }
}

/// Total surface area, split into quadrangle and triangle contributions.
/// Quadrangles are measured as two corner triangles.
pub fn surface_areas(pos: &[Point3<f64>], elements: &[Element]) -> (f64, f64) {
    let mut area_q4 = 0.0;
    let mut area_t3 = 0.0;
    for element in elements {
        let p = corner_points(pos, element);
        match p.len() {
            3 => area_t3 += 0.5 * tri_normal(p[0], p[1], p[2]).norm(),
            _ => {
                area_q4 += 0.5 * tri_normal(p[0], p[1], p[2]).norm()
                    + 0.5 * tri_normal(p[0], p[2], p[3]).norm();
            }
        }
    }
    (area_q4, area_t3)
}

/// Requested element order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HighOrder {
    /// Linear elements (T3/Q4).
    #[default]
    Linear,
    /// Quadratic elements with mid-side nodes only (T6/Q8).
    Quadratic,
    /// Quadratic elements with a face-center node on quads (T6/Q9).
    QuadraticWithCenter,
}

/// Converts linear elements to quadratic ones, creating one parametric mid
/// node per unique corner edge (and one face-center node per quad for Q9).
///
/// Mid nodes already present on boundary edges are reused instead of being
/// recreated. New node coordinates are appended to `pos2d`; lifting them to
/// 3-D is the caller's job. Returns the number of created nodes.
pub fn generate_high_order_nodes(
    pos2d: &mut Vec<Point2<f64>>,
    elements: &mut [Element],
    boundary: &[BoundaryEdge],
    order: HighOrder,
) -> usize {
    if order == HighOrder::Linear {
        return 0;
    }
    let mut mids: HashMap<[u32; 2], u32> = HashMap::new();
    for e in boundary {
        if let Some(m) = e.mid {
            mids.insert(canonical_edge(e.a, e.b), m);
        }
    }
    let before = pos2d.len();
    let mut mid_of = |pos2d: &mut Vec<Point2<f64>>, a: u32, b: u32| -> u32 {
        *mids.entry(canonical_edge(a, b)).or_insert_with(|| {
            let p = nalgebra::center(&pos2d[a as usize], &pos2d[b as usize]);
            pos2d.push(p);
            (pos2d.len() - 1) as u32
        })
    };
    for element in elements.iter_mut() {
        *element = match *element {
            Element::Tri3([a, b, c]) => {
                let ab = mid_of(pos2d, a, b);
                let bc = mid_of(pos2d, b, c);
                let ca = mid_of(pos2d, c, a);
                Element::Tri6([a, b, c, ab, bc, ca])
            }
            Element::Quad4([a, b, c, d]) => {
                let ab = mid_of(pos2d, a, b);
                let bc = mid_of(pos2d, b, c);
                let cd = mid_of(pos2d, c, d);
                let da = mid_of(pos2d, d, a);
                if order == HighOrder::QuadraticWithCenter {
                    let center = Point2::from(
                        (pos2d[a as usize].coords
                            + pos2d[b as usize].coords
                            + pos2d[c as usize].coords
                            + pos2d[d as usize].coords)
                            / 4.0,
                    );
                    pos2d.push(center);
                    let m = (pos2d.len() - 1) as u32;
                    Element::Quad9([a, b, c, d, ab, bc, cd, da, m])
                } else {
                    Element::Quad8([a, b, c, d, ab, bc, cd, da])
                }
            }
            other => other,
        };
    }
    pos2d.len() - before
}
