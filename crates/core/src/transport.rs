use glam::{Mat3, Vec3};

use crate::attributes::{AttributeDomain, AttributeStorage, AttributeType};
use crate::groups::name_matches;
use crate::mesh::Mesh;
use crate::parallel::for_each_indexed_mut;

/// Vector attributes carried through the deformation, by domain.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransportSet {
    pub point: Vec<String>,
    pub vertex: Vec<String>,
}

impl TransportSet {
    pub fn resolve(mesh: &Mesh, patterns: &str) -> Self {
        let mut set = TransportSet::default();
        for info in mesh.list_attributes() {
            if info.implicit
                || info.name == "P"
                || info.data_type != AttributeType::Vec3
                || !info.type_info.is_transformable()
                || !name_matches(patterns, &info.name)
            {
                continue;
            }
            match info.domain {
                AttributeDomain::Point => set.point.push(info.name),
                AttributeDomain::Vertex => set.vertex.push(info.name),
                _ => {}
            }
        }
        set
    }

    pub fn is_empty(&self) -> bool {
        self.point.is_empty() && self.vertex.is_empty()
    }

    /// Rotates every selected value by its point's transform; `None` leaves the value as is.
    pub fn apply(&self, mesh: &mut Mesh, transforms: &[Option<Mat3>]) {
        for name in &self.point {
            if let Some(AttributeStorage::Vec3(values)) =
                mesh.attributes.get_mut(AttributeDomain::Point, name)
            {
                for_each_indexed_mut(values, |point, value| {
                    if let Some(Some(transform)) = transforms.get(point) {
                        *value = (*transform * Vec3::from(*value)).to_array();
                    }
                });
            }
        }

        let vertex_points = &mesh.indices;
        for name in &self.vertex {
            if let Some(AttributeStorage::Vec3(values)) =
                mesh.attributes.get_mut(AttributeDomain::Vertex, name)
            {
                for_each_indexed_mut(values, |vertex, value| {
                    let transform = vertex_points
                        .get(vertex)
                        .and_then(|point| transforms.get(*point as usize));
                    if let Some(Some(transform)) = transform {
                        *value = (*transform * Vec3::from(*value)).to_array();
                    }
                });
            }
        }
    }
}
