mod attributes;
mod capture;
mod config;
mod deform;
mod error;
mod evaluate;
mod frame;
mod groups;
mod mesh;
mod parallel;
mod pieces;
mod primitive;
mod spatial_index;
mod state;
mod surface;
mod transport;

pub use attributes::{
    AttributeDomain, AttributeError, AttributeInfo, AttributeRef, AttributeStorage, AttributeType,
    MeshAttributes, TypeInfo,
};
pub use capture::{capture, CaptureHit, CaptureOutput, CaptureRecord, TransformScratch};
pub use config::DeformConfig;
pub use deform::{deform, DeformOutput};
pub use error::{DeformError, SurfaceRole, TopologyDiff};
pub use evaluate::{evaluate, DeformInputs, DeformStats, Evaluation};
pub use frame::{
    blended_frame, intrinsic_up, invert_rotation, look_at, rigid_projection, DriveAttributes,
    FrameSample, FrameSource, LocalFrame,
};
pub use groups::{build_group_mask, name_matches, point_group_mask};
pub use mesh::{make_box, make_grid, Mesh};
pub use parallel::{for_each_indexed_mut, for_each_indexed_mut_with_scratch};
pub use pieces::{PieceGroups, PieceKey};
pub use primitive::{ClosestPoint, Primitive, Quad, SurfacePrimitive, Triangle, VertexWeights};
pub use spatial_index::{IndexError, IndexFlags, NearestHit, PrimIndex, QueryKind, RayHit};
pub use state::{CaptureState, ReinitKey};
pub use surface::Surface;
pub use transport::TransportSet;
