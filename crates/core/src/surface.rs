use glam::Vec3;

use crate::error::{DeformError, SurfaceRole};
use crate::mesh::Mesh;
use crate::primitive::{Primitive, VertexWeights};

/// Validated, read-only view of a mesh whose primitives can all be evaluated.
#[derive(Debug, Clone)]
pub struct Surface<'a> {
    mesh: &'a Mesh,
    starts: Vec<usize>,
}

impl<'a> Surface<'a> {
    pub fn new(mesh: &'a Mesh, role: SurfaceRole) -> Result<Self, DeformError> {
        let starts = mesh.primitive_vertex_starts();
        let point_count = mesh.positions.len();
        for (prim, range) in starts.windows(2).enumerate() {
            let count = range[1] - range[0];
            if count != 3 && count != 4 {
                return Err(DeformError::UnsupportedPrimitive {
                    surface: role,
                    prim,
                    vertex_count: count,
                });
            }
            let Some(vertices) = mesh.indices.get(range[0]..range[1]) else {
                return Err(DeformError::MalformedSurface { surface: role, prim });
            };
            if vertices.iter().any(|point| *point as usize >= point_count) {
                return Err(DeformError::MalformedSurface { surface: role, prim });
            }
        }
        Ok(Self { mesh, starts })
    }

    pub fn mesh(&self) -> &'a Mesh {
        self.mesh
    }

    pub fn primitive_count(&self) -> usize {
        self.starts.len().saturating_sub(1)
    }

    pub fn primitive_points(&self, prim: usize) -> &'a [u32] {
        match (self.starts.get(prim), self.starts.get(prim + 1)) {
            (Some(start), Some(end)) => &self.mesh.indices[*start..*end],
            _ => &[],
        }
    }

    pub fn primitive(&self, prim: usize) -> Option<Primitive> {
        let mut points = [Vec3::ZERO; 4];
        let vertices = self.primitive_points(prim);
        for (slot, point) in points.iter_mut().zip(vertices) {
            *slot = Vec3::from(self.mesh.positions[*point as usize]);
        }
        Primitive::from_points(&points[..vertices.len()])
    }

    /// Blends a per-point vec3 attribute over the primitive's vertices.
    pub fn interpolate_point_vec3(
        &self,
        prim: usize,
        weights: &VertexWeights,
        values: &[[f32; 3]],
    ) -> Vec3 {
        let vertices = self.primitive_points(prim);
        weights.iter().fold(Vec3::ZERO, |acc, (local, weight)| {
            let value = vertices
                .get(local)
                .and_then(|point| values.get(*point as usize))
                .copied()
                .map(Vec3::from)
                .unwrap_or(Vec3::ZERO);
            acc + value * weight
        })
    }
}
