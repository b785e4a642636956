//! Error types for metric and meshing operations.
//!
//! Every fallible operation returns [`MeshResult`]. Errors carry a
//! machine-readable code in the format `MESH-XXXX`:
//!
//! - `MESH-1xxx`: resource errors (memory)
//! - `MESH-2xxx`: metric and background-mesh errors
//! - `MESH-3xxx`: topology errors (nodes, edges, boundaries, elements)
//! - `MESH-4xxx`: licensing
//! - `MESH-5xxx`: internal errors
//!
//! Interruption and low element quality are deliberately *not* errors: they
//! are reported through [`WarningCode`] on the result info so that partial
//! output stays usable.

use miette::Diagnostic;
use thiserror::Error;

/// Result type alias for mesh operations.
pub type MeshResult<T> = Result<T, MeshError>;

/// Machine-readable error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// MESH-1001: Allocation failure reported by a mesher.
    OutOfMemory = 1001,
    /// MESH-2001: Background mesh is unusable (wrong arity, bad metrics).
    BackgroundMesh = 2001,
    /// MESH-2002: Metric field is malformed or contains invalid tensors.
    InvalidMetrics = 2002,
    /// MESH-3001: A node index is out of range or a coordinate is not finite.
    Node = 3001,
    /// MESH-3002: A boundary edge is degenerate or malformed.
    Edge = 3002,
    /// MESH-3003: The boundary as a whole cannot be meshed.
    Boundary = 3003,
    /// MESH-3004: The generated mesh contains a degenerate element.
    DegenerateElement = 3004,
    /// MESH-4001: License rejection reported by a mesher.
    License = 4001,
    /// MESH-5001: Internal invariant violation.
    Internal = 5001,
}

impl ErrorCode {
    /// Returns the error code as a string in the format `MESH-XXXX`.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::OutOfMemory => "MESH-1001",
            ErrorCode::BackgroundMesh => "MESH-2001",
            ErrorCode::InvalidMetrics => "MESH-2002",
            ErrorCode::Node => "MESH-3001",
            ErrorCode::Edge => "MESH-3002",
            ErrorCode::Boundary => "MESH-3003",
            ErrorCode::DegenerateElement => "MESH-3004",
            ErrorCode::License => "MESH-4001",
            ErrorCode::Internal => "MESH-5001",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Non-fatal conditions reported alongside a successful result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WarningCode {
    /// No warning.
    #[default]
    None,
    /// The run was interrupted through the progress handler. The output
    /// bundle is consistent but incomplete.
    Interruption,
    /// The worst element shape quality is below the acceptance threshold.
    ShapeQuality,
}

/// Errors that can occur during metric processing or surface meshing.
#[derive(Debug, Error, Diagnostic)]
pub enum MeshError {
    /// A mesher ran out of memory.
    #[error("out of memory while {operation}")]
    #[diagnostic(
        code(mesh::resource::memory),
        help("Reduce the mesh density (larger target size or chordal error) or split the surface into patches.")
    )]
    OutOfMemory { operation: String },

    /// The supplied background mesh cannot be used.
    #[error("invalid background mesh: {details}")]
    #[diagnostic(
        code(mesh::metric::background),
        help("The background mesh must be a pure triangle mesh with a valid metric at every node it references.")
    )]
    BackgroundMesh { details: String },

    /// The metric field is malformed.
    #[error("invalid metrics: {details}")]
    #[diagnostic(
        code(mesh::metric::invalid),
        help("Metric fields must be empty, isotropic (one size per node) or anisotropic (six components per node).")
    )]
    InvalidMetrics { details: String },

    /// A node index or coordinate is unusable.
    #[error("invalid node {index}: {details}")]
    #[diagnostic(
        code(mesh::topology::node),
        help("All indices must reference existing coordinates and all coordinates must be finite.")
    )]
    Node { index: usize, details: String },

    /// A boundary edge is unusable.
    #[error("invalid edge ({a}, {b}): {details}")]
    #[diagnostic(code(mesh::topology::edge))]
    Edge { a: u32, b: u32, details: String },

    /// The boundary as a whole cannot be meshed.
    #[error("invalid boundary: {details}")]
    #[diagnostic(
        code(mesh::topology::boundary),
        help("The boundary must enclose a meshable parametric domain and match the requested element order.")
    )]
    Boundary { details: String },

    /// The generated mesh contains a degenerate element.
    #[error("degenerate element {element}: shape quality {quality:.3e}")]
    #[diagnostic(
        code(mesh::topology::degenerate),
        help("This usually indicates a nearly singular parametrization or a self-intersecting boundary.")
    )]
    DegenerateElement { element: usize, quality: f64 },

    /// A mesher rejected the run for licensing reasons.
    #[error("license rejected by the meshing engine: {details}")]
    #[diagnostic(code(mesh::license))]
    License { details: String },

    /// Internal invariant violation.
    #[error("internal error: {details}")]
    #[diagnostic(
        code(mesh::internal),
        help("This is a bug. Please report it with the input that triggered it.")
    )]
    Internal { details: String },
}

impl MeshError {
    /// Returns the machine-readable error code.
    pub fn code(&self) -> ErrorCode {
        match self {
            MeshError::OutOfMemory { .. } => ErrorCode::OutOfMemory,
            MeshError::BackgroundMesh { .. } => ErrorCode::BackgroundMesh,
            MeshError::InvalidMetrics { .. } => ErrorCode::InvalidMetrics,
            MeshError::Node { .. } => ErrorCode::Node,
            MeshError::Edge { .. } => ErrorCode::Edge,
            MeshError::Boundary { .. } => ErrorCode::Boundary,
            MeshError::DegenerateElement { .. } => ErrorCode::DegenerateElement,
            MeshError::License { .. } => ErrorCode::License,
            MeshError::Internal { .. } => ErrorCode::Internal,
        }
    }

    // Constructor helpers for common error patterns

    /// Create an OutOfMemory error.
    pub fn out_of_memory(operation: impl Into<String>) -> Self {
        MeshError::OutOfMemory {
            operation: operation.into(),
        }
    }

    /// Create a BackgroundMesh error.
    pub fn background_mesh(details: impl Into<String>) -> Self {
        MeshError::BackgroundMesh {
            details: details.into(),
        }
    }

    /// Create an InvalidMetrics error.
    pub fn invalid_metrics(details: impl Into<String>) -> Self {
        MeshError::InvalidMetrics {
            details: details.into(),
        }
    }

    /// Create a Node error.
    pub fn node(index: usize, details: impl Into<String>) -> Self {
        MeshError::Node {
            index,
            details: details.into(),
        }
    }

    /// Create an Edge error.
    pub fn edge(a: u32, b: u32, details: impl Into<String>) -> Self {
        MeshError::Edge {
            a,
            b,
            details: details.into(),
        }
    }

    /// Create a Boundary error.
    pub fn boundary(details: impl Into<String>) -> Self {
        MeshError::Boundary {
            details: details.into(),
        }
    }

    /// Create a DegenerateElement error.
    pub fn degenerate_element(element: usize, quality: f64) -> Self {
        MeshError::DegenerateElement { element, quality }
    }

    /// Create a License error.
    pub fn license(details: impl Into<String>) -> Self {
        MeshError::License {
            details: details.into(),
        }
    }

    /// Create an Internal error.
    pub fn internal(details: impl Into<String>) -> Self {
        MeshError::Internal {
            details: details.into(),
        }
    }
}
