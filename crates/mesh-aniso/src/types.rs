//! Core data types: elements, boundary edges, metric fields and the meshing
//! data bundle.

use nalgebra::Point3;

use crate::error::{MeshError, MeshResult};
use crate::metric::Metric3;

/// A surface element. Linear elements are produced by the meshers; the
/// quadratic variants only appear after high-order node generation.
///
/// Corner nodes come first in every variant; mid-edge nodes follow in edge
/// order, and `Quad9` ends with the face-center node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Element {
    Tri3([u32; 3]),
    Quad4([u32; 4]),
    Tri6([u32; 6]),
    Quad8([u32; 8]),
    Quad9([u32; 9]),
}

impl Element {
    /// All node indices of the element.
    pub fn nodes(&self) -> &[u32] {
        match self {
            Element::Tri3(n) => n,
            Element::Quad4(n) => n,
            Element::Tri6(n) => n,
            Element::Quad8(n) => n,
            Element::Quad9(n) => n,
        }
    }

    /// Mutable access to all node indices.
    pub fn nodes_mut(&mut self) -> &mut [u32] {
        match self {
            Element::Tri3(n) => n,
            Element::Quad4(n) => n,
            Element::Tri6(n) => n,
            Element::Quad8(n) => n,
            Element::Quad9(n) => n,
        }
    }

    /// Number of corner nodes (3 for triangles, 4 for quadrangles).
    pub fn corner_count(&self) -> usize {
        match self {
            Element::Tri3(_) | Element::Tri6(_) => 3,
            Element::Quad4(_) | Element::Quad8(_) | Element::Quad9(_) => 4,
        }
    }

    /// Corner node indices.
    pub fn corners(&self) -> &[u32] {
        &self.nodes()[..self.corner_count()]
    }

    pub fn is_quad(&self) -> bool {
        self.corner_count() == 4
    }

    /// Corner edges as index pairs, in winding order.
    pub fn corner_edges(&self) -> impl Iterator<Item = [u32; 2]> + '_ {
        let corners = self.corners();
        let n = corners.len();
        (0..n).map(move |i| [corners[i], corners[(i + 1) % n]])
    }

    /// Reverses the winding in place, keeping mid-side nodes attached to
    /// their edges.
    pub fn flip(&mut self) {
        *self = match *self {
            Element::Tri3([a, b, c]) => Element::Tri3([a, c, b]),
            Element::Quad4([a, b, c, d]) => Element::Quad4([a, d, c, b]),
            Element::Tri6([a, b, c, ab, bc, ca]) => Element::Tri6([a, c, b, ca, bc, ab]),
            Element::Quad8([a, b, c, d, ab, bc, cd, da]) => {
                Element::Quad8([a, d, c, b, da, cd, bc, ab])
            }
            Element::Quad9([a, b, c, d, ab, bc, cd, da, m]) => {
                Element::Quad9([a, d, c, b, da, cd, bc, ab, m])
            }
        };
    }
}

/// A boundary edge with an optional pre-existing mid-side node.
///
/// Mid nodes may only be supplied when a quadratic mesh is requested; they
/// are reused verbatim by the high-order pass instead of being regenerated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundaryEdge {
    pub a: u32,
    pub b: u32,
    pub mid: Option<u32>,
}

impl BoundaryEdge {
    pub fn new(a: u32, b: u32) -> Self {
        BoundaryEdge { a, b, mid: None }
    }

    pub fn with_mid(a: u32, b: u32, mid: u32) -> Self {
        BoundaryEdge { a, b, mid: Some(mid) }
    }
}

/// Per-node metric field. The three shapes mirror the accepted input
/// arities: absent, one size per node, or six tensor components per node.
#[derive(Debug, Clone, Default)]
pub enum MetricField {
    /// No sizing information.
    #[default]
    None,
    /// Isotropic target size per node.
    Iso(Vec<f64>),
    /// Anisotropic 3-D tensor per node.
    Aniso3(Vec<Metric3>),
}

impl MetricField {
    pub fn is_none(&self) -> bool {
        matches!(self, MetricField::None)
    }

    /// Number of per-node entries (0 for `None`).
    pub fn len(&self) -> usize {
        match self {
            MetricField::None => 0,
            MetricField::Iso(v) => v.len(),
            MetricField::Aniso3(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The tensor at node `i`, lifting isotropic sizes. `None` when the
    /// field is absent or too short.
    pub fn tensor(&self, i: usize) -> Option<Metric3> {
        match self {
            MetricField::None => None,
            MetricField::Iso(v) => v.get(i).map(|&h| Metric3::iso(h)),
            MetricField::Aniso3(v) => v.get(i).copied(),
        }
    }

    /// Checks the field covers `node_count` nodes (or is absent).
    pub fn check_arity(&self, node_count: usize) -> MeshResult<()> {
        if self.is_none() || self.len() == node_count {
            Ok(())
        } else {
            Err(MeshError::invalid_metrics(format!(
                "field has {} entries for {} nodes",
                self.len(),
                node_count
            )))
        }
    }
}

/// Meshing data bundle, owned by the caller and passed as `&mut` through the
/// pipeline.
///
/// Index invariants:
/// - every index in `connect_b`, `connect_m`, `background`, `isolated_nodes`
///   and `repulsive_points` references `pos`,
/// - on input, `metrics` is either absent or covers all of `pos`; runs that
///   append nodes leave it untouched, so it only describes the input nodes
///   afterwards,
/// - `background` is a pure triangle mesh,
/// - on output, nodes created by the run are appended to `pos`; indices of
///   pre-existing nodes are never reordered in caller space.
#[derive(Debug, Clone, Default)]
pub struct MeshData {
    /// Node coordinates.
    pub pos: Vec<Point3<f64>>,
    /// Boundary edges to honor (input).
    pub connect_b: Vec<BoundaryEdge>,
    /// Surface elements (output; may hold an initial mesh on input).
    pub connect_m: Vec<Element>,
    /// Optional background triangulation carrying the sizing field.
    pub background: Vec<[u32; 3]>,
    /// Nodes that must appear in the mesh without being on the boundary.
    pub isolated_nodes: Vec<u32>,
    /// Nodes that repel mesh refinement without being forced into the mesh.
    pub repulsive_points: Vec<u32>,
    /// Per-node sizing field.
    pub metrics: MetricField,
    /// Requested element orientation: `-1` inverse, `0` any, `+1` direct.
    pub boundary_sgn: i8,
    /// One incident element per node (output).
    pub ancestors: Vec<Option<u32>>,
    /// Adjacent element per element edge (output; slot `3` unused for
    /// triangles).
    pub neighbors: Vec<[Option<u32>; 4]>,
}

impl MeshData {
    pub fn new() -> Self {
        MeshData::default()
    }

    /// Bundle with a boundary contour and no sizing information.
    pub fn with_boundary(pos: Vec<Point3<f64>>, connect_b: Vec<BoundaryEdge>) -> Self {
        MeshData {
            pos,
            connect_b,
            ..MeshData::default()
        }
    }

    pub fn node_count(&self) -> usize {
        self.pos.len()
    }

    pub fn element_count(&self) -> usize {
        self.connect_m.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.connect_m.iter().filter(|e| !e.is_quad()).count()
    }

    pub fn quad_count(&self) -> usize {
        self.connect_m.iter().filter(|e| e.is_quad()).count()
    }

    /// Checks every stored index against `pos` and every coordinate for
    /// finiteness.
    pub fn check_indices(&self) -> MeshResult<()> {
        let n = self.pos.len();
        for (i, p) in self.pos.iter().enumerate() {
            if !(p.x.is_finite() && p.y.is_finite() && p.z.is_finite()) {
                return Err(MeshError::node(i, "coordinate is not finite"));
            }
        }
        let check = |idx: u32| -> MeshResult<()> {
            if (idx as usize) < n {
                Ok(())
            } else {
                Err(MeshError::node(idx as usize, format!("index out of range ({} nodes)", n)))
            }
        };
        for e in &self.connect_b {
            check(e.a)?;
            check(e.b)?;
            if let Some(m) = e.mid {
                check(m)?;
            }
            if e.a == e.b {
                return Err(MeshError::edge(e.a, e.b, "zero-length boundary edge"));
            }
        }
        for e in &self.connect_m {
            for &i in e.nodes() {
                check(i)?;
            }
        }
        for t in &self.background {
            for &i in t {
                check(i)?;
            }
        }
        for &i in self.isolated_nodes.iter().chain(&self.repulsive_points) {
            check(i)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_element_accessors() {
        let tri = Element::Tri3([0, 1, 2]);
        assert_eq!(tri.corners(), &[0, 1, 2]);
        assert!(!tri.is_quad());
        let edges: Vec<_> = tri.corner_edges().collect();
        assert_eq!(edges, vec![[0, 1], [1, 2], [2, 0]]);

        let quad = Element::Quad4([0, 1, 2, 3]);
        assert_eq!(quad.corner_count(), 4);
        assert!(quad.is_quad());
    }

    #[test]
    fn test_flip_is_involution() {
        let orig = Element::Quad8([0, 1, 2, 3, 4, 5, 6, 7]);
        let mut e = orig;
        e.flip();
        assert_ne!(e, orig);
        e.flip();
        assert_eq!(e, orig);
    }

    #[test]
    fn test_flip_keeps_mid_nodes_on_edges() {
        let mut e = Element::Tri6([0, 1, 2, 10, 11, 12]);
        e.flip();
        // Edge (0,1) with mid 10 becomes edge (1,0); its mid must still be 10.
        assert_eq!(e, Element::Tri6([0, 2, 1, 12, 11, 10]));
    }

    #[test]
    fn test_metric_field_arity() {
        let field = MetricField::Iso(vec![1.0, 2.0]);
        assert!(field.check_arity(2).is_ok());
        assert!(field.check_arity(3).is_err());
        assert!(MetricField::None.check_arity(7).is_ok());
        assert_eq!(field.tensor(1), Some(Metric3::iso(2.0)));
    }

    #[test]
    fn test_check_indices() {
        let mut data = MeshData::with_boundary(
            vec![Point3::origin(), Point3::new(1.0, 0.0, 0.0)],
            vec![BoundaryEdge::new(0, 1)],
        );
        assert!(data.check_indices().is_ok());
        data.connect_b.push(BoundaryEdge::new(1, 5));
        assert!(data.check_indices().is_err());
    }
}
