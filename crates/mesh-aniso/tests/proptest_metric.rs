//! Property-based tests for the metric tensor algebra.
//!
//! Random SPD tensors are generated through a Cholesky factor, so every
//! sample is valid by construction and reasonably conditioned.

use mesh_aniso::{Metric2, Metric3};
use nalgebra::{Matrix3, Vector3};
use proptest::prelude::*;

fn approx_eq(a: f64, b: f64, eps: f64) -> bool {
    (a - b).abs() <= eps * a.abs().max(b.abs()).max(1.0)
}

/// A valid 3-D tensor built as `L Lᵀ` from a lower-triangular factor with a
/// bounded-away-from-zero diagonal.
fn arb_metric3() -> impl Strategy<Value = Metric3> {
    (
        prop::array::uniform3(0.5..2.0f64),
        prop::array::uniform3(-0.5..0.5f64),
    )
        .prop_map(|(diag, off)| {
            let l = Matrix3::new(
                diag[0], 0.0, 0.0, off[0], diag[1], 0.0, off[1], off[2], diag[2],
            );
            Metric3::from_matrix(&(l * l.transpose()))
        })
}

fn arb_metric2() -> impl Strategy<Value = Metric2> {
    (prop::array::uniform2(0.5..2.0f64), -0.5..0.5f64).prop_map(|(diag, off)| {
        Metric2([
            diag[0] * diag[0],
            off * diag[0],
            off * off + diag[1] * diag[1],
        ])
    })
}

fn arb_direction() -> impl Strategy<Value = Vector3<f64>> {
    prop::array::uniform3(-1.0..1.0f64)
        .prop_filter_map("null direction", |d| {
            let v = Vector3::new(d[0], d[1], d[2]);
            (v.norm() > 0.1).then(|| v / v.norm())
        })
}

/// Directional size `1 / √(dᵀMd)` along a unit direction.
fn size_along(m: &Metric3, d: &Vector3<f64>) -> f64 {
    1.0 / (d.transpose() * m.to_matrix() * d)[0].sqrt()
}

proptest! {
    #[test]
    fn intersect_of_valid_tensors_is_valid(m0 in arb_metric3(), m1 in arb_metric3()) {
        let (r, ok) = m0.intersect(&m1);
        prop_assert!(ok);
        prop_assert!(r.is_valid());
    }

    #[test]
    fn unite_of_valid_tensors_is_valid(m0 in arb_metric3(), m1 in arb_metric3()) {
        let (r, ok) = m0.unite(&m1);
        prop_assert!(ok);
        prop_assert!(r.is_valid());
    }

    #[test]
    fn zero_is_the_identity_of_intersect(m in arb_metric3()) {
        prop_assert_eq!(m.intersect(&Metric3::ZERO).0, m);
    }

    #[test]
    fn saturated_is_the_identity_of_unite(m in arb_metric3()) {
        prop_assert_eq!(m.unite(&Metric3::SATURATED).0, m);
    }

    #[test]
    fn intersection_is_contained_in_both(
        m0 in arb_metric3(),
        m1 in arb_metric3(),
        d in arb_direction(),
    ) {
        // The intersection prescribes sizes no larger than either operand,
        // in every direction.
        let (r, _) = m0.intersect(&m1);
        let bound = size_along(&m0, &d).min(size_along(&m1, &d));
        prop_assert!(size_along(&r, &d) <= bound * (1.0 + 1e-9));
    }

    #[test]
    fn union_contains_both(
        m0 in arb_metric3(),
        m1 in arb_metric3(),
        d in arb_direction(),
    ) {
        let (r, _) = m0.unite(&m1);
        let bound = size_along(&m0, &d).max(size_along(&m1, &d));
        prop_assert!(size_along(&r, &d) >= bound * (1.0 - 1e-9));
    }

    #[test]
    fn intersect_is_commutative_up_to_roundoff(m0 in arb_metric3(), m1 in arb_metric3()) {
        let a = m0.intersect(&m1).0;
        let b = m1.intersect(&m0).0;
        for (x, y) in a.0.iter().zip(&b.0) {
            prop_assert!(approx_eq(*x, *y, 1e-6), "{x} vs {y}");
        }
    }

    #[test]
    fn clamp_is_idempotent(m in arb_metric3()) {
        let once = m.clamp_sizes(0.4, 3.0);
        let twice = once.clamp_sizes(0.4, 3.0);
        for (x, y) in once.0.iter().zip(&twice.0) {
            prop_assert!(approx_eq(*x, *y, 1e-6), "{x} vs {y}");
        }
    }

    #[test]
    fn clamp_bounds_every_directional_size(m in arb_metric3(), d in arb_direction()) {
        let clamped = m.clamp_sizes(0.4, 3.0);
        let h = size_along(&clamped, &d);
        prop_assert!(h >= 0.4 * (1.0 - 1e-9) && h <= 3.0 * (1.0 + 1e-9), "h = {h}");
    }

    #[test]
    fn scaling_sizes_scales_lengths_inversely(m in arb_metric3(), d in arb_direction()) {
        let doubled = m.scale_sizes(2.0);
        prop_assert!(approx_eq(size_along(&doubled, &d), 2.0 * size_along(&m, &d), 1e-9));
    }

    #[test]
    fn projection_of_iso_through_an_orthonormal_basis_is_iso(h in 0.1..10.0f64) {
        let basis = mesh_aniso::LocalBasis::new(Vector3::x(), Vector3::y());
        let m2 = Metric3::iso(h).project(&basis);
        prop_assert!(approx_eq(m2.0[0], 1.0 / (h * h), 1e-12));
        prop_assert!(m2.0[1].abs() < 1e-15);
        prop_assert!(approx_eq(m2.0[2], 1.0 / (h * h), 1e-12));
    }

    #[test]
    fn intersect2_of_valid_tensors_is_valid(m0 in arb_metric2(), m1 in arb_metric2()) {
        let (r, ok) = m0.intersect(&m1);
        prop_assert!(ok);
        prop_assert!(r.is_valid());
    }

    #[test]
    fn generalized_eigen_solves_the_pencil(m0 in arb_metric2(), m1 in arb_metric2()) {
        // B x = λ A x for every returned pair.
        let (lams, vecs) = m0.generalized_eigen_pairs(&m1).unwrap();
        let a = m0.to_matrix();
        let b = m1.to_matrix();
        for (lam, v) in lams.iter().zip(&vecs) {
            let lhs = b * v;
            let rhs = a * v * *lam;
            for k in 0..2 {
                prop_assert!(approx_eq(lhs[k], rhs[k], 1e-6), "{} vs {}", lhs[k], rhs[k]);
            }
        }
    }
}
