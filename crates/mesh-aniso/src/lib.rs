//! Anisotropic metric tensors and curvature-adaptive surface meshing.
//!
//! This crate provides the sizing-field machinery of a finite-element surface
//! mesher: symmetric metric tensors with their algebra (intersection, union,
//! clamping, projection), gradation control, curvature-based chordal-error
//! control, and a pipeline that meshes a parametrized surface patch through
//! a background mesh carrying the anisotropic field.
//!
//! # Features
//!
//! - **Metric algebra**: 2×2 and 3×3 tensors, generalized eigensolvers,
//!   simultaneous reduction for intersection and union
//! - **Gradation control**: H-shock bounding of isotropic and anisotropic
//!   fields over an edge graph
//! - **Chordal control**: curvature recovery on the mesh, exact surface
//!   curvatures when available, sag-tolerance driven refinement
//! - **Background mesh**: an iterator that refines a coarse triangulation
//!   until it resolves its own sizing field
//! - **Surface pipeline**: parametric meshing with quad splitting,
//!   orientation control, high-order node generation and quality summaries
//!
//! The surface and the meshing engine are capabilities supplied by the
//! caller through the [`Surface`] and [`Mesher`] traits. A flat patch
//! ([`PlanarSurface`]) and a deterministic grid engine
//! ([`StructuredMesher`]) ship with the crate as references and test
//! doubles.
//!
//! # Quick Start
//!
//! ```no_run
//! use mesh_aniso::{
//!     mesh_parametric_surface, BoundaryEdge, MeshData, Mesher, PlanarSurface,
//!     StructuredMesher, SurfaceMeshParams,
//! };
//! use nalgebra::Point3;
//!
//! // A unit square in the z = 0 plane, four segments per side.
//! let mut pos = Vec::new();
//! for i in 0..4 {
//!     pos.push(Point3::new(i as f64 * 0.25, 0.0, 0.0));
//! }
//! for i in 0..4 {
//!     pos.push(Point3::new(1.0, i as f64 * 0.25, 0.0));
//! }
//! for i in 0..4 {
//!     pos.push(Point3::new(1.0 - i as f64 * 0.25, 1.0, 0.0));
//! }
//! for i in 0..4 {
//!     pos.push(Point3::new(0.0, 1.0 - i as f64 * 0.25, 0.0));
//! }
//! let boundary = (0..16).map(|i| BoundaryEdge::new(i, (i + 1) % 16)).collect();
//! let mut data = MeshData::with_boundary(pos, boundary);
//!
//! let mut mesher = StructuredMesher::new();
//! mesher.settings_mut().target_h = 0.25;
//! let mut aux = StructuredMesher::new();
//! let info = mesh_parametric_surface(
//!     &PlanarSurface::xy(),
//!     &mut mesher,
//!     &mut aux,
//!     &mut data,
//!     &SurfaceMeshParams::default(),
//! )
//! .unwrap();
//! println!("{} triangles, Qmin = {:.3}", info.triangle_count, info.qmin);
//! ```
//!
//! # Conventions
//!
//! A metric tensor encodes target sizes: along a unit direction `d`, the
//! desired edge length is `1 / √(dᵀMd)`. Tensors are stored lower-triangle,
//! column by column (`mxx, mxy, myy` and `mxx, mxy, myy, mxz, myz, mzz`).
//! Elements are wound counter-clockwise in the parametric plane; the direct
//! orientation (`boundary_sgn = 1`) matches that winding.

mod error;
mod types;

pub mod background;
pub mod curvature;
pub mod gradation;
pub mod histogram;
pub mod interpolate;
pub mod mesher;
pub mod metric;
pub mod param;
pub mod progress;
pub mod quality;
pub mod surface;
pub mod tracing_ext;

pub use error::{ErrorCode, MeshError, MeshResult, WarningCode};
pub use types::{BoundaryEdge, Element, MeshData, MetricField};

pub use background::{BackgroundParams, build_background_mesh};
pub use curvature::{ChordalControl, ChordalParams, Curvature2, parametric_curvatures};
pub use gradation::GradationDirection;
pub use histogram::Histogram;
pub use mesher::{BasicMode, MeshJob, Mesher, MesherSettings, StructuredMesher};
pub use metric::{LocalBasis, Metric2, Metric3};
pub use param::{SurfaceMeshInfo, SurfaceMeshParams, mesh_parametric_surface};
pub use progress::{InterruptHandler, ProgressRange};
pub use quality::{HighOrder, QuadSplitCriterion};
pub use surface::{PlanarSurface, Surface};
