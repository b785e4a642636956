//! Anisotropic metric tensors.
//!
//! A metric tensor is a symmetric positive-definite matrix that prescribes
//! target edge lengths per direction: an edge `e` has unit length under the
//! metric `M` when `eᵀ M e == 1`. The isotropic tensor for a size `h` is
//! `(1/h²)·I`.
//!
//! Two special tensors act as algebraic identities and are handled exactly:
//!
//! - the all-zero tensor is the identity of [`Metric2::intersect`] /
//!   [`Metric3::intersect`] (it constrains nothing),
//! - the saturated tensor ([`Metric2::SATURATED`]) is the identity of
//!   [`Metric2::unite`] (it allows nothing larger).
//!
//! Intersection and union are computed by simultaneous reduction of the two
//! quadratic forms: with `M0 = L Lᵀ` and the symmetric eigendecomposition of
//! `L⁻¹ M1 L⁻ᵀ = Q Λ Qᵀ`, the basis `P = L⁻ᵀ Q` diagonalizes both tensors
//! and the result is rebuilt from `max(1, λ)` (intersection) or `min(1, λ)`
//! (union) in that basis.

use nalgebra::{Cholesky, Matrix2, Matrix3, Matrix3x2, SymmetricEigen, Vector2, Vector3};

/// Symmetric 2x2 metric tensor, stored as `[mxx, mxy, myy]`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Metric2(pub [f64; 3]);

/// Symmetric 3x3 metric tensor, stored as `[mxx, mxy, myy, mxz, myz, mzz]`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Metric3(pub [f64; 6]);

/// Unnormalized surface tangents at a node, columns of the 3x2 basis matrix.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocalBasis {
    pub bu: Vector3<f64>,
    pub bv: Vector3<f64>,
}

impl LocalBasis {
    pub fn new(bu: Vector3<f64>, bv: Vector3<f64>) -> Self {
        LocalBasis { bu, bv }
    }

    /// The basis as a 3x2 matrix with `bu` and `bv` as columns.
    pub fn matrix(&self) -> Matrix3x2<f64> {
        Matrix3x2::from_columns(&[self.bu, self.bv])
    }

    /// Unit surface normal, `None` when the tangents are collinear or null.
    pub fn normal(&self) -> Option<Vector3<f64>> {
        let n = self.bu.cross(&self.bv);
        let len = n.norm();
        if len > 0.0 && len.is_finite() {
            Some(n / len)
        } else {
            None
        }
    }

    /// A basis is degenerate when its tangents do not span a plane.
    pub fn is_degenerate(&self) -> bool {
        self.normal().is_none()
    }
}

/// Simultaneous reduction of two 2x2 quadratic forms.
///
/// Returns the tensor rebuilt from `max(1, λ)` per direction when `take_max`
/// (intersection) or `min(1, λ)` otherwise (union). `None` when `m0` is not
/// positive-definite or the reduction is numerically unusable.
fn reduce_pair2(m0: &Matrix2<f64>, m1: &Matrix2<f64>, take_max: bool) -> Option<Matrix2<f64>> {
    let chol = Cholesky::new(*m0)?;
    let l = chol.l();
    let x = l.solve_lower_triangular(&*m1)?;
    let s = l.solve_lower_triangular(&x.transpose())?;
    let s = 0.5 * (s + s.transpose());
    let eig = SymmetricEigen::new(s);
    let mut d = Matrix2::zeros();
    for i in 0..2 {
        let lam = eig.eigenvalues[i];
        if !lam.is_finite() {
            return None;
        }
        d[(i, i)] = if take_max { lam.max(1.0) } else { lam.min(1.0) };
    }
    let lq = l * eig.eigenvectors;
    Some(lq * d * lq.transpose())
}

/// Simultaneous reduction of two 3x3 quadratic forms. See [`reduce_pair2`].
fn reduce_pair3(m0: &Matrix3<f64>, m1: &Matrix3<f64>, take_max: bool) -> Option<Matrix3<f64>> {
    let chol = Cholesky::new(*m0)?;
    let l = chol.l();
    let x = l.solve_lower_triangular(&*m1)?;
    let s = l.solve_lower_triangular(&x.transpose())?;
    let s = 0.5 * (s + s.transpose());
    let eig = SymmetricEigen::new(s);
    let mut d = Matrix3::zeros();
    for i in 0..3 {
        let lam = eig.eigenvalues[i];
        if !lam.is_finite() {
            return None;
        }
        d[(i, i)] = if take_max { lam.max(1.0) } else { lam.min(1.0) };
    }
    let lq = l * eig.eigenvectors;
    Some(lq * d * lq.transpose())
}

/// Solves the symmetric pencil `B x = λ A x` through the Cholesky factor of
/// `A`. Eigenvalues come back ascending; eigenvectors are normalized but not
/// mutually orthogonal. `None` when `A` is not positive-definite.
fn generalized_eigen2(
    a: &Matrix2<f64>,
    b: &Matrix2<f64>,
) -> Option<([f64; 2], [Vector2<f64>; 2])> {
    let chol = Cholesky::new(*a)?;
    let l = chol.l();
    let x = l.solve_lower_triangular(&*b)?;
    let s = l.solve_lower_triangular(&x.transpose())?;
    let s = 0.5 * (s + s.transpose());
    let eig = SymmetricEigen::new(s);
    let lt = l.transpose();
    let mut pairs: Vec<(f64, Vector2<f64>)> = Vec::with_capacity(2);
    for i in 0..2 {
        let y = eig.eigenvectors.column(i).into_owned();
        let v = lt.solve_upper_triangular(&y)?;
        let norm = v.norm();
        if !(norm > 0.0 && norm.is_finite()) {
            return None;
        }
        pairs.push((eig.eigenvalues[i], v / norm));
    }
    pairs.sort_by(|p, q| p.0.total_cmp(&q.0));
    Some(([pairs[0].0, pairs[1].0], [pairs[0].1, pairs[1].1]))
}

impl Metric2 {
    /// Identity element of [`Metric2::intersect`].
    pub const ZERO: Metric2 = Metric2([0.0; 3]);

    /// Identity element of [`Metric2::unite`].
    pub const SATURATED: Metric2 = Metric2([f64::MAX, 0.0, f64::MAX]);

    /// Isotropic tensor for the size `h`. Non-positive or non-finite sizes
    /// yield the zero tensor.
    pub fn iso(h: f64) -> Self {
        if h > 0.0 && h.is_finite() {
            let d = 1.0 / (h * h);
            Metric2([d, 0.0, d])
        } else {
            Metric2::ZERO
        }
    }

    /// Anisotropic 2-D tensor equivalent to the 3-D size `h` expressed in the
    /// parametric plane: `(1/h²)·BᵀB`.
    pub fn from_iso_and_basis(h: f64, basis: &LocalBasis) -> Self {
        if !(h > 0.0 && h.is_finite()) {
            return Metric2::ZERO;
        }
        let b = basis.matrix();
        let m = (b.transpose() * b) / (h * h);
        Metric2::from_matrix(&m)
    }

    pub fn from_matrix(m: &Matrix2<f64>) -> Self {
        Metric2([m[(0, 0)], 0.5 * (m[(0, 1)] + m[(1, 0)]), m[(1, 1)]])
    }

    pub fn to_matrix(&self) -> Matrix2<f64> {
        let [xx, xy, yy] = self.0;
        Matrix2::new(xx, xy, xy, yy)
    }

    /// A tensor is valid when it is finite and positive-definite.
    pub fn is_valid(&self) -> bool {
        let [xx, xy, yy] = self.0;
        xx.is_finite()
            && xy.is_finite()
            && yy.is_finite()
            && xx > 0.0
            && xx * yy - xy * xy > 0.0
    }

    /// Eigenvalues in ascending order with matching orthonormal eigenvectors.
    pub fn eigen_pairs(&self) -> ([f64; 2], [Vector2<f64>; 2]) {
        let eig = SymmetricEigen::new(self.to_matrix());
        let mut idx = [0usize, 1];
        idx.sort_by(|&i, &j| eig.eigenvalues[i].total_cmp(&eig.eigenvalues[j]));
        (
            [eig.eigenvalues[idx[0]], eig.eigenvalues[idx[1]]],
            [
                eig.eigenvectors.column(idx[0]).into_owned(),
                eig.eigenvectors.column(idx[1]).into_owned(),
            ],
        )
    }

    /// Generalized eigen pairs of the pencil `other · x = λ · self · x`.
    ///
    /// Requires `self` to be positive-definite. Eigenvectors are normalized,
    /// not orthogonal.
    pub fn generalized_eigen_pairs(
        &self,
        other: &Metric2,
    ) -> Option<([f64; 2], [Vector2<f64>; 2])> {
        generalized_eigen2(&self.to_matrix(), &other.to_matrix())
    }

    /// Largest tensor contained in both `self` and `other` (size-wise the
    /// finer of the two, per direction).
    ///
    /// Returns `(self, false)` when `self` is invalid and not the zero
    /// identity. `other` only needs to be finite.
    pub fn intersect(&self, other: &Metric2) -> (Metric2, bool) {
        if *other == Metric2::ZERO {
            return (*self, true);
        }
        if *self == Metric2::ZERO {
            return (*other, true);
        }
        if !self.is_valid() {
            return (*self, false);
        }
        match reduce_pair2(&self.to_matrix(), &other.to_matrix(), true) {
            Some(m) => (Metric2::from_matrix(&m), true),
            None => (*self, false),
        }
    }

    /// Smallest tensor containing both `self` and `other` (size-wise the
    /// coarser of the two, per direction).
    ///
    /// Returns `(self, false)` when either tensor is invalid and not the
    /// saturated identity.
    pub fn unite(&self, other: &Metric2) -> (Metric2, bool) {
        if *other == Metric2::SATURATED {
            return (*self, true);
        }
        if *self == Metric2::SATURATED {
            return (*other, true);
        }
        if !self.is_valid() || !other.is_valid() {
            return (*self, false);
        }
        match reduce_pair2(&self.to_matrix(), &other.to_matrix(), false) {
            Some(m) => (Metric2::from_matrix(&m), true),
            None => (*self, false),
        }
    }

    /// Bounds the target sizes into `[min_h, max_h]`.
    ///
    /// Unites with `iso(min_h)` then intersects with `iso(max_h)`; the
    /// bounds are not checked against each other, the upper bound wins.
    /// Non-positive or non-finite bounds are skipped.
    pub fn clamp_sizes(&self, min_h: f64, max_h: f64) -> Metric2 {
        let mut m = *self;
        if min_h > 0.0 && min_h.is_finite() {
            m = m.unite(&Metric2::iso(min_h)).0;
        }
        if max_h > 0.0 && max_h.is_finite() && max_h < f64::MAX {
            m = m.intersect(&Metric2::iso(max_h)).0;
        }
        m
    }

    /// Length of the straight segment `e` under this metric, `√(eᵀ M e)`.
    pub fn segment_length(&self, e: &Vector2<f64>) -> f64 {
        let [xx, xy, yy] = self.0;
        let q = xx * e.x * e.x + 2.0 * xy * e.x * e.y + yy * e.y * e.y;
        q.max(0.0).sqrt()
    }

    /// Scales all target sizes by `s` (tensor divided by `s²`).
    pub fn scale_sizes(&self, s: f64) -> Metric2 {
        let f = 1.0 / (s * s);
        let [xx, xy, yy] = self.0;
        Metric2([xx * f, xy * f, yy * f])
    }
}

impl Metric3 {
    /// Identity element of [`Metric3::intersect`].
    pub const ZERO: Metric3 = Metric3([0.0; 6]);

    /// Identity element of [`Metric3::unite`].
    pub const SATURATED: Metric3 = Metric3([f64::MAX, 0.0, f64::MAX, 0.0, 0.0, f64::MAX]);

    /// Isotropic tensor for the size `h`. Non-positive or non-finite sizes
    /// yield the zero tensor.
    pub fn iso(h: f64) -> Self {
        if h > 0.0 && h.is_finite() {
            let d = 1.0 / (h * h);
            Metric3([d, 0.0, d, 0.0, 0.0, d])
        } else {
            Metric3::ZERO
        }
    }

    pub fn from_matrix(m: &Matrix3<f64>) -> Self {
        Metric3([
            m[(0, 0)],
            0.5 * (m[(0, 1)] + m[(1, 0)]),
            m[(1, 1)],
            0.5 * (m[(0, 2)] + m[(2, 0)]),
            0.5 * (m[(1, 2)] + m[(2, 1)]),
            m[(2, 2)],
        ])
    }

    pub fn to_matrix(&self) -> Matrix3<f64> {
        let [xx, xy, yy, xz, yz, zz] = self.0;
        Matrix3::new(xx, xy, xz, xy, yy, yz, xz, yz, zz)
    }

    /// A tensor is valid when it is finite and positive-definite, checked
    /// through its leading principal minors.
    pub fn is_valid(&self) -> bool {
        let [xx, xy, yy, xz, yz, zz] = self.0;
        if !(xx.is_finite()
            && xy.is_finite()
            && yy.is_finite()
            && xz.is_finite()
            && yz.is_finite()
            && zz.is_finite())
        {
            return false;
        }
        let det2 = xx * yy - xy * xy;
        let det3 = xx * (yy * zz - yz * yz) - xy * (xy * zz - yz * xz) + xz * (xy * yz - yy * xz);
        xx > 0.0 && det2 > 0.0 && det3 > 0.0
    }

    /// Eigenvalues in ascending order with matching orthonormal eigenvectors.
    pub fn eigen_pairs(&self) -> ([f64; 3], [Vector3<f64>; 3]) {
        let eig = SymmetricEigen::new(self.to_matrix());
        let mut idx = [0usize, 1, 2];
        idx.sort_by(|&i, &j| eig.eigenvalues[i].total_cmp(&eig.eigenvalues[j]));
        (
            [
                eig.eigenvalues[idx[0]],
                eig.eigenvalues[idx[1]],
                eig.eigenvalues[idx[2]],
            ],
            [
                eig.eigenvectors.column(idx[0]).into_owned(),
                eig.eigenvectors.column(idx[1]).into_owned(),
                eig.eigenvectors.column(idx[2]).into_owned(),
            ],
        )
    }

    /// See [`Metric2::intersect`].
    pub fn intersect(&self, other: &Metric3) -> (Metric3, bool) {
        if *other == Metric3::ZERO {
            return (*self, true);
        }
        if *self == Metric3::ZERO {
            return (*other, true);
        }
        if !self.is_valid() {
            return (*self, false);
        }
        match reduce_pair3(&self.to_matrix(), &other.to_matrix(), true) {
            Some(m) => (Metric3::from_matrix(&m), true),
            None => (*self, false),
        }
    }

    /// See [`Metric2::unite`].
    pub fn unite(&self, other: &Metric3) -> (Metric3, bool) {
        if *other == Metric3::SATURATED {
            return (*self, true);
        }
        if *self == Metric3::SATURATED {
            return (*other, true);
        }
        if !self.is_valid() || !other.is_valid() {
            return (*self, false);
        }
        match reduce_pair3(&self.to_matrix(), &other.to_matrix(), false) {
            Some(m) => (Metric3::from_matrix(&m), true),
            None => (*self, false),
        }
    }

    /// See [`Metric2::clamp_sizes`].
    pub fn clamp_sizes(&self, min_h: f64, max_h: f64) -> Metric3 {
        let mut m = *self;
        if min_h > 0.0 && min_h.is_finite() {
            m = m.unite(&Metric3::iso(min_h)).0;
        }
        if max_h > 0.0 && max_h.is_finite() && max_h < f64::MAX {
            m = m.intersect(&Metric3::iso(max_h)).0;
        }
        m
    }

    /// Projects the tensor into the parametric plane of `basis`: `Bᵀ M B`.
    pub fn project(&self, basis: &LocalBasis) -> Metric2 {
        let b = basis.matrix();
        let m = b.transpose() * self.to_matrix() * b;
        Metric2::from_matrix(&m)
    }

    /// Length of the straight segment `e` under this metric, `√(eᵀ M e)`.
    pub fn segment_length(&self, e: &Vector3<f64>) -> f64 {
        let q = (e.transpose() * self.to_matrix() * e)[(0, 0)];
        q.max(0.0).sqrt()
    }

    /// Scales all target sizes by `s` (tensor divided by `s²`).
    pub fn scale_sizes(&self, s: f64) -> Metric3 {
        let f = 1.0 / (s * s);
        let mut out = self.0;
        for c in &mut out {
            *c *= f;
        }
        Metric3(out)
    }
}

/// Converts an isotropic size field into anisotropic 3-D tensors.
pub fn metrics_iso_to_aniso3(sizes: &[f64]) -> Vec<Metric3> {
    sizes.iter().map(|&h| Metric3::iso(h)).collect()
}

/// Bounds the target sizes of a whole 2-D field into `[min_h, max_h]`.
pub fn bound_metrics2(metrics: &mut [Metric2], min_h: f64, max_h: f64) {
    for m in metrics {
        *m = m.clamp_sizes(min_h, max_h);
    }
}

/// Bounds the target sizes of a whole 3-D field into `[min_h, max_h]`.
pub fn bound_metrics3(metrics: &mut [Metric3], min_h: f64, max_h: f64) {
    for m in metrics {
        *m = m.clamp_sizes(min_h, max_h);
    }
}

/// Index of the first invalid tensor in the field, if any.
pub fn first_invalid_metric3(metrics: &[Metric3]) -> Option<usize> {
    metrics.iter().position(|m| !m.is_valid())
}

/// Replaces invalid tensors by the matching entry of `defaults`.
/// Returns the number of replaced tensors.
pub fn overwrite_invalid_metrics3(metrics: &mut [Metric3], defaults: &[Metric3]) -> usize {
    let mut replaced = 0;
    for (m, d) in metrics.iter_mut().zip(defaults) {
        if !m.is_valid() {
            *m = *d;
            replaced += 1;
        }
    }
    replaced
}
