use std::fmt;

use crate::spatial_index::IndexError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceRole {
    Mesh,
    Rest,
    Deformed,
}

impl fmt::Display for SurfaceRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SurfaceRole::Mesh => "mesh",
            SurfaceRole::Rest => "rest surface",
            SurfaceRole::Deformed => "deformed surface",
        };
        f.write_str(label)
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum TopologyDiff {
    #[error("point count differs (rest {rest}, deformed {deformed})")]
    PointCount { rest: usize, deformed: usize },
    #[error("primitive count differs (rest {rest}, deformed {deformed})")]
    PrimitiveCount { rest: usize, deformed: usize },
    #[error("primitive {prim} has {rest} vertices on rest but {deformed} on deformed")]
    VertexCount {
        prim: usize,
        rest: usize,
        deformed: usize,
    },
    #[error("primitive {prim} references different points")]
    VertexOrder { prim: usize },
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum DeformError {
    #[error("{surface} contains no usable geometry")]
    EmptyInput { surface: SurfaceRole },
    #[error("rest/deformed topology mismatch: {0}")]
    TopologyMismatch(TopologyDiff),
    #[error("{surface} has no vec3 point attribute '{attribute}' to drive the frame")]
    MissingDriveAttribute {
        surface: SurfaceRole,
        attribute: String,
    },
    #[error("piece attribute '{attribute}' on {surface} must be an integer or string attribute")]
    UnsupportedPieceAttributeType {
        surface: SurfaceRole,
        attribute: String,
    },
    #[error("piece attribute '{attribute}' not found on {surface}")]
    PieceAttributeNotFound {
        surface: SurfaceRole,
        attribute: String,
    },
    #[error("{surface} primitive {prim} has {vertex_count} vertices; only triangles and quads are supported")]
    UnsupportedPrimitive {
        surface: SurfaceRole,
        prim: usize,
        vertex_count: usize,
    },
    #[error("{surface} primitive {prim} references vertices or points that do not exist")]
    MalformedSurface { surface: SurfaceRole, prim: usize },
    #[error("capture state holds {records} records but the mesh has {points} points")]
    CaptureMismatch { records: usize, points: usize },
    #[error(transparent)]
    Index(#[from] IndexError),
}

impl From<TopologyDiff> for DeformError {
    fn from(diff: TopologyDiff) -> Self {
        DeformError::TopologyMismatch(diff)
    }
}
