use glam::{Mat3, Vec3};

use crate::attributes::{AttributeDomain, AttributeRef};
use crate::error::{DeformError, SurfaceRole};
use crate::primitive::SurfacePrimitive;
use crate::surface::Surface;

const PARALLEL_EPS: f32 = 1.0e-6;
const POLAR_MAX_ITERS: usize = 32;
const POLAR_EPS: f32 = 1.0e-6;

/// Externally authored normal and up vectors, one per surface point.
#[derive(Debug, Clone, Copy)]
pub struct DriveAttributes<'a> {
    pub normal: &'a [[f32; 3]],
    pub up: &'a [[f32; 3]],
}

impl<'a> DriveAttributes<'a> {
    pub fn resolve(
        surface: &Surface<'a>,
        role: SurfaceRole,
        normal_name: &str,
        up_name: &str,
    ) -> Result<Self, DeformError> {
        let mesh = surface.mesh();
        let lookup = |name: &str| match mesh.attribute(AttributeDomain::Point, name) {
            Some(AttributeRef::Vec3(values)) if values.len() == mesh.point_count() => Ok(values),
            _ => Err(DeformError::MissingDriveAttribute {
                surface: role,
                attribute: name.to_string(),
            }),
        };
        Ok(Self {
            normal: lookup(normal_name)?,
            up: lookup(up_name)?,
        })
    }
}

#[derive(Debug, Clone, Copy)]
pub enum FrameSource<'a> {
    Intrinsic,
    Driven(DriveAttributes<'a>),
}

/// Unnormalized frame ingredients at one parametric location.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FrameSample {
    pub position: Vec3,
    pub normal: Vec3,
    pub up: Vec3,
}

impl FrameSample {
    pub fn at(
        surface: &Surface<'_>,
        prim: usize,
        u: f32,
        v: f32,
        source: &FrameSource<'_>,
    ) -> Option<Self> {
        let shape = surface.primitive(prim)?;
        let position = shape.position_at(u, v);
        let (normal, up) = match source {
            FrameSource::Intrinsic => {
                let normal = shape.normal_at(u, v);
                (normal, intrinsic_up(normal))
            }
            FrameSource::Driven(drive) => {
                let weights = shape.interpolation_weights_at(u, v);
                (
                    surface.interpolate_point_vec3(prim, &weights, drive.normal),
                    surface.interpolate_point_vec3(prim, &weights, drive.up),
                )
            }
        };
        Some(Self {
            position,
            normal,
            up,
        })
    }

    fn accumulate(&mut self, other: &FrameSample, weight: f32) {
        self.position += other.position * weight;
        self.normal += other.normal * weight;
        self.up += other.up * weight;
    }
}

/// World-space origin plus orientation; `rotation` maps local to world.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocalFrame {
    pub origin: Vec3,
    pub rotation: Mat3,
}

impl LocalFrame {
    pub fn to_local(&self, world: Vec3, inverse: &Mat3) -> Vec3 {
        *inverse * (world - self.origin)
    }

    pub fn to_world(&self, local: Vec3) -> Vec3 {
        self.rotation * local + self.origin
    }
}

/// Weighted frame over `(prim, u, v, weight)` hits. `None` when a hit is not on the surface.
pub fn blended_frame<I>(
    surface: &Surface<'_>,
    hits: I,
    source: &FrameSource<'_>,
    rigid: bool,
) -> Option<LocalFrame>
where
    I: IntoIterator<Item = (usize, f32, f32, f32)>,
{
    let mut total = FrameSample::default();
    let mut any = false;
    for (prim, u, v, weight) in hits {
        let sample = FrameSample::at(surface, prim, u, v, source)?;
        total.accumulate(&sample, weight);
        any = true;
    }
    if !any {
        return None;
    }
    let mut rotation = look_at(total.normal, total.up);
    if rigid {
        rotation = rigid_projection(rotation);
    }
    Some(LocalFrame {
        origin: total.position,
        rotation,
    })
}

/// Up vector derived from the normal alone: `normal x Y`, or `normal x X` when the
/// normal is parallel to Y.
pub fn intrinsic_up(normal: Vec3) -> Vec3 {
    let up = normal.cross(Vec3::Y);
    if up.length_squared() > PARALLEL_EPS * normal.length_squared().max(PARALLEL_EPS) {
        up
    } else {
        normal.cross(Vec3::X)
    }
}

/// Basis with columns (side, up, forward) where forward follows `normal`.
pub fn look_at(normal: Vec3, up: Vec3) -> Mat3 {
    let forward = normal.try_normalize().unwrap_or(Vec3::Z);
    let side = forward
        .cross(up)
        .try_normalize()
        .unwrap_or_else(|| forward.any_orthonormal_vector());
    let up = side.cross(forward);
    Mat3::from_cols(side, up, forward)
}

/// Nearest orthogonal matrix (polar decomposition by Newton iteration).
pub fn rigid_projection(matrix: Mat3) -> Mat3 {
    let mut current = matrix;
    for _ in 0..POLAR_MAX_ITERS {
        if current.determinant().abs() <= f32::EPSILON {
            return matrix;
        }
        let next = (current + current.inverse().transpose()) * 0.5;
        let delta = (next - current).to_cols_array();
        current = next;
        if delta.iter().map(|value| value.abs()).sum::<f32>() < POLAR_EPS {
            break;
        }
    }
    current
}

/// Inverse of a frame rotation; exact transpose for orthonormal bases.
pub fn invert_rotation(rotation: &Mat3, rigid: bool) -> Mat3 {
    if rigid || rotation.determinant().abs() <= f32::EPSILON {
        rotation.transpose()
    } else {
        rotation.inverse()
    }
}
