//! The surface capability consumed by the meshing pipeline.

use nalgebra::{Point2, Point3, Vector3};

use crate::curvature::Curvature2;
use crate::error::MeshResult;
use crate::metric::LocalBasis;

/// A parametrized surface patch.
///
/// The pipeline works in the parametric plane and queries the surface for
/// the mapping in both directions, for first-order data (tangent bases) and,
/// when exact chordal control is requested, for second-order data
/// (curvatures). Failures of `to_3d`, `to_2d` or `local_bases` abort the
/// run; a failing `local_curvatures` only demotes exact chordal control to
/// its discrete approximation.
pub trait Surface {
    /// Maps parametric coordinates onto the surface.
    fn to_3d(&self, pos2d: &[Point2<f64>]) -> MeshResult<Vec<Point3<f64>>>;

    /// Maps the listed 3-D nodes into the parametric plane, one result per
    /// entry of `nodes`.
    fn to_2d(&self, pos3d: &[Point3<f64>], nodes: &[u32]) -> MeshResult<Vec<Point2<f64>>>;

    /// First derivatives `(∂S/∂u, ∂S/∂v)` at the given parametric points.
    fn local_bases(&self, pos2d: &[Point2<f64>]) -> MeshResult<Vec<LocalBasis>>;

    /// Second fundamental form at the given parametric points.
    fn local_curvatures(&self, pos2d: &[Point2<f64>]) -> MeshResult<Vec<Curvature2>>;
}

/// A flat patch spanned by two orthonormal tangents. Mostly useful as a
/// reference implementation and a test double: it is the degenerate case
/// where chordal control has nothing to do.
#[derive(Debug, Clone)]
pub struct PlanarSurface {
    pub origin: Point3<f64>,
    pub u_axis: Vector3<f64>,
    pub v_axis: Vector3<f64>,
}

impl PlanarSurface {
    /// The `z = 0` plane with the identity parametrization.
    pub fn xy() -> Self {
        PlanarSurface {
            origin: Point3::origin(),
            u_axis: Vector3::x(),
            v_axis: Vector3::y(),
        }
    }
}

impl Default for PlanarSurface {
    fn default() -> Self {
        PlanarSurface::xy()
    }
}

impl Surface for PlanarSurface {
    fn to_3d(&self, pos2d: &[Point2<f64>]) -> MeshResult<Vec<Point3<f64>>> {
        Ok(pos2d
            .iter()
            .map(|p| self.origin + self.u_axis * p.x + self.v_axis * p.y)
            .collect())
    }

    fn to_2d(&self, pos3d: &[Point3<f64>], nodes: &[u32]) -> MeshResult<Vec<Point2<f64>>> {
        Ok(nodes
            .iter()
            .map(|&i| {
                let d = pos3d[i as usize] - self.origin;
                Point2::new(d.dot(&self.u_axis), d.dot(&self.v_axis))
            })
            .collect())
    }

    fn local_bases(&self, pos2d: &[Point2<f64>]) -> MeshResult<Vec<LocalBasis>> {
        Ok(vec![LocalBasis::new(self.u_axis, self.v_axis); pos2d.len()])
    }

    fn local_curvatures(&self, pos2d: &[Point2<f64>]) -> MeshResult<Vec<Curvature2>> {
        Ok(vec![Curvature2::FLAT; pos2d.len()])
    }
}
