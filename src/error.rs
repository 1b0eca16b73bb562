//! Error types for dynmesh.
//!
//! Every mesh mutator returns a [`Result`]; the `Err` variant doubles as the
//! operation's result code. Variants fall into three classes:
//!
//! - **recoverable**: a local edit was refused and nothing was mutated
//!   ([`MeshError::is_recoverable`]). Remeshing passes skip the candidate.
//! - **unsupported**: the input needs a case that is deliberately not
//!   implemented ([`MeshError::is_unsupported`]).
//! - **fatal**: the topology is provably inconsistent, or the caller passed
//!   arguments that do not name live elements. The current operation aborts.

use thiserror::Error;

use crate::mesh::{EdgeId, TriangleId, VertexId};

/// Result type alias using [`MeshError`].
pub type Result<T> = std::result::Result<T, MeshError>;

/// Errors that can occur during mesh operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MeshError {
    /// The mesh has no faces.
    #[error("mesh has no faces")]
    EmptyMesh,

    /// A face references an invalid vertex index.
    #[error("face {face} references invalid vertex index {vertex}")]
    InvalidVertexIndex {
        /// The face index.
        face: usize,
        /// The invalid vertex index.
        vertex: usize,
    },

    /// The vertex id is not live.
    #[error("vertex {0} is not live")]
    InvalidVertex(VertexId),

    /// The edge id is not live.
    #[error("edge {0} is not live")]
    InvalidEdge(EdgeId),

    /// The triangle id is not live.
    #[error("triangle {0} is not live")]
    InvalidTriangle(TriangleId),

    /// Explicit-id vertex insertion hit a live slot.
    #[error("vertex {0} already exists")]
    VertexAlreadyExists(VertexId),

    /// Explicit-id triangle insertion hit a live slot.
    #[error("triangle {0} already exists")]
    TriangleAlreadyExists(TriangleId),

    /// A triangle would name the same vertex twice.
    #[error("triangle {0:?} is degenerate (has duplicate vertices)")]
    DegenerateTriangle([VertexId; 3]),

    /// An edge would get more than two incident triangles.
    #[error("edge ({v0}, {v1}) would have more than two incident triangles")]
    NonManifoldEdge {
        /// First vertex of the edge.
        v0: VertexId,
        /// Second vertex of the edge.
        v1: VertexId,
    },

    /// The operation is not defined on a boundary edge.
    #[error("edge {0} is a boundary edge")]
    BoundaryEdge(EdgeId),

    /// Removing the triangle would leave a bowtie vertex.
    #[error("removing triangle {triangle} would make vertex {vertex} a bowtie")]
    WouldCreateBowtie {
        /// The triangle whose removal was refused.
        triangle: TriangleId,
        /// The vertex that would become non-manifold.
        vertex: VertexId,
    },

    /// A flip would create an edge that already exists.
    #[error("flipping edge {edge} would duplicate edge ({v0}, {v1})")]
    FlipEdgeExists {
        /// The edge being flipped.
        edge: EdgeId,
        /// First vertex of the would-be edge.
        v0: VertexId,
        /// Second vertex of the would-be edge.
        v1: VertexId,
    },

    /// A collapse fails the link condition or would fold the surface.
    #[error("collapsing edge {edge} would create non-manifold topology: {reason}")]
    CollapseNonManifold {
        /// The edge being collapsed.
        edge: EdgeId,
        /// Which check failed.
        reason: &'static str,
    },

    /// A collapse would leave a vertex without any triangle.
    #[error("collapsing edge {edge} would isolate vertex {vertex}")]
    CollapseWouldIsolate {
        /// The edge being collapsed.
        edge: EdgeId,
        /// The vertex that would lose its last triangle.
        vertex: VertexId,
    },

    /// An edge the topology requires is missing.
    #[error("expected edge ({v0}, {v1}) is missing")]
    MissingEdge {
        /// First vertex.
        v0: VertexId,
        /// Second vertex.
        v1: VertexId,
    },

    /// A boundary vertex does not have exactly two boundary edges.
    #[error("boundary vertex {vertex} has {boundary_edges} boundary edges")]
    BrokenBoundary {
        /// The offending vertex.
        vertex: VertexId,
        /// How many boundary edges it has.
        boundary_edges: usize,
    },

    /// A recorded triangle is gone or changed when re-applying a removal.
    #[error("recorded triangle {0} is no longer present as captured")]
    RecordedTriangleMismatch(TriangleId),

    /// A recorded vertex slot was reused before the removal was reverted.
    #[error("recorded vertex {0} cannot be restored: its id is live")]
    RecordedVertexMismatch(VertexId),

    /// The requested case is deliberately not implemented.
    #[error("unsupported: {0}")]
    Unsupported(&'static str),

    /// Invalid mesh state for the requested operation.
    #[error("invalid mesh state: {0}")]
    InvalidState(String),

    /// Invalid parameter value.
    #[error("invalid parameter: {name} = {value} ({reason})")]
    InvalidParameter {
        /// Parameter name.
        name: &'static str,
        /// The invalid value (as string).
        value: String,
        /// Reason the value is invalid.
        reason: &'static str,
    },
}

impl MeshError {
    /// Create an invalid parameter error.
    pub fn invalid_param<T: std::fmt::Display>(
        name: &'static str,
        value: T,
        reason: &'static str,
    ) -> Self {
        MeshError::InvalidParameter {
            name,
            value: value.to_string(),
            reason,
        }
    }

    /// True for local refusals that left the mesh untouched.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            MeshError::VertexAlreadyExists(_)
                | MeshError::TriangleAlreadyExists(_)
                | MeshError::DegenerateTriangle(_)
                | MeshError::NonManifoldEdge { .. }
                | MeshError::BoundaryEdge(_)
                | MeshError::WouldCreateBowtie { .. }
                | MeshError::FlipEdgeExists { .. }
                | MeshError::CollapseNonManifold { .. }
                | MeshError::CollapseWouldIsolate { .. }
        )
    }

    /// True for deliberately unimplemented cases.
    pub fn is_unsupported(&self) -> bool {
        matches!(self, MeshError::Unsupported(_))
    }

    /// True when the current operation must abort.
    pub fn is_fatal(&self) -> bool {
        !self.is_recoverable() && !self.is_unsupported()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classes() {
        let e = MeshError::BoundaryEdge(EdgeId::new(3));
        assert!(e.is_recoverable());
        assert!(!e.is_fatal());

        let e = MeshError::Unsupported("bowtie boundary");
        assert!(e.is_unsupported());
        assert!(!e.is_fatal());

        let e = MeshError::MissingEdge {
            v0: VertexId::new(0),
            v1: VertexId::new(1),
        };
        assert!(e.is_fatal());

        assert!(MeshError::RecordedVertexMismatch(VertexId::new(1)).is_fatal());
    }

    #[test]
    fn test_display() {
        let e = MeshError::invalid_param("passes", 0, "must be positive");
        assert_eq!(e.to_string(), "invalid parameter: passes = 0 (must be positive)");
    }
}
