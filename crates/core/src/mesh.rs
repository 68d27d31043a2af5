use std::collections::BTreeMap;

use crate::attributes::{
    AttributeDomain, AttributeError, AttributeInfo, AttributeRef, AttributeStorage, AttributeType,
    MeshAttributes, TypeInfo,
};
use crate::error::TopologyDiff;

/// Polygon mesh: `face_counts[i]` vertices per primitive, `indices` maps each vertex to a point.
#[derive(Debug, Clone, Default)]
pub struct Mesh {
    pub positions: Vec<[f32; 3]>,
    pub face_counts: Vec<u32>,
    pub indices: Vec<u32>,
    pub attributes: MeshAttributes,
    pub groups: BTreeMap<String, Vec<bool>>,
}

impl Mesh {
    pub fn with_points(positions: Vec<[f32; 3]>) -> Self {
        Self {
            positions,
            ..Self::default()
        }
    }

    pub fn with_polygons(positions: Vec<[f32; 3]>, face_counts: Vec<u32>, indices: Vec<u32>) -> Self {
        Self {
            positions,
            face_counts,
            indices,
            ..Self::default()
        }
    }

    pub fn point_count(&self) -> usize {
        self.positions.len()
    }

    pub fn primitive_count(&self) -> usize {
        self.face_counts.len()
    }

    pub fn vertex_count(&self) -> usize {
        self.indices.len()
    }

    /// Offset of the first vertex of every primitive, plus a trailing total.
    pub fn primitive_vertex_starts(&self) -> Vec<usize> {
        let mut starts = Vec::with_capacity(self.face_counts.len() + 1);
        let mut cursor = 0usize;
        starts.push(0);
        for count in &self.face_counts {
            cursor += *count as usize;
            starts.push(cursor);
        }
        starts
    }

    pub fn first_primitive_per_point(&self) -> Vec<Option<u32>> {
        let mut first = vec![None; self.positions.len()];
        let mut cursor = 0usize;
        for (prim, count) in self.face_counts.iter().enumerate() {
            let end = (cursor + *count as usize).min(self.indices.len());
            for vertex in cursor..end {
                let point = self.indices[vertex] as usize;
                if let Some(slot) = first.get_mut(point) {
                    if slot.is_none() {
                        *slot = Some(prim as u32);
                    }
                }
            }
            cursor = end;
        }
        first
    }

    pub fn compare_topology(&self, other: &Mesh) -> Result<(), TopologyDiff> {
        if self.positions.len() != other.positions.len() {
            return Err(TopologyDiff::PointCount {
                rest: self.positions.len(),
                deformed: other.positions.len(),
            });
        }
        if self.face_counts.len() != other.face_counts.len() {
            return Err(TopologyDiff::PrimitiveCount {
                rest: self.face_counts.len(),
                deformed: other.face_counts.len(),
            });
        }
        for (prim, (a, b)) in self.face_counts.iter().zip(&other.face_counts).enumerate() {
            if a != b {
                return Err(TopologyDiff::VertexCount {
                    prim,
                    rest: *a as usize,
                    deformed: *b as usize,
                });
            }
        }
        if self.indices != other.indices {
            let starts = self.primitive_vertex_starts();
            let vertex = self
                .indices
                .iter()
                .zip(&other.indices)
                .position(|(a, b)| a != b)
                .unwrap_or(self.indices.len().min(other.indices.len()));
            let prim = starts
                .windows(2)
                .position(|range| vertex >= range[0] && vertex < range[1])
                .unwrap_or(self.face_counts.len());
            return Err(TopologyDiff::VertexOrder { prim });
        }
        Ok(())
    }

    pub fn attribute_domain_len(&self, domain: AttributeDomain) -> usize {
        match domain {
            AttributeDomain::Point => self.positions.len(),
            AttributeDomain::Vertex => self.indices.len(),
            AttributeDomain::Primitive => self.face_counts.len(),
            AttributeDomain::Detail => 1,
        }
    }

    pub fn list_attributes(&self) -> Vec<AttributeInfo> {
        let mut list = Vec::new();
        if !self.positions.is_empty() {
            list.push(AttributeInfo {
                name: "P".to_string(),
                domain: AttributeDomain::Point,
                data_type: AttributeType::Vec3,
                type_info: TypeInfo::Position,
                len: self.positions.len(),
                implicit: true,
            });
        }
        for domain in AttributeDomain::ALL {
            for (name, storage) in self.attributes.map(domain) {
                list.push(AttributeInfo {
                    name: name.clone(),
                    domain,
                    data_type: storage.data_type(),
                    type_info: self.attributes.type_info(domain, name),
                    len: storage.len(),
                    implicit: false,
                });
            }
        }
        list.sort_by(|a, b| a.name.cmp(&b.name));
        list
    }

    pub fn attribute(&self, domain: AttributeDomain, name: &str) -> Option<AttributeRef<'_>> {
        match (name, domain) {
            ("P", AttributeDomain::Point) => Some(AttributeRef::Vec3(self.positions.as_slice())),
            _ => self
                .attributes
                .get(domain, name)
                .map(AttributeStorage::as_ref),
        }
    }

    pub fn set_attribute(
        &mut self,
        domain: AttributeDomain,
        name: impl Into<String>,
        storage: AttributeStorage,
    ) -> Result<(), AttributeError> {
        let name = name.into();
        let expected_len = self.attribute_domain_len(domain);
        let actual_len = storage.len();
        if expected_len != 0 && actual_len != expected_len {
            return Err(AttributeError::InvalidLength {
                expected: expected_len,
                actual: actual_len,
            });
        }

        match (name.as_str(), domain) {
            ("P", AttributeDomain::Point) => {
                if let AttributeStorage::Vec3(values) = storage {
                    self.positions = values;
                    return Ok(());
                }
                return Err(AttributeError::InvalidType {
                    expected: AttributeType::Vec3,
                    actual: storage.data_type(),
                });
            }
            ("P", _) => return Err(AttributeError::InvalidDomain),
            _ => {}
        }

        self.attributes.map_mut(domain).insert(name, storage);
        Ok(())
    }

    pub fn set_vec3_attribute(
        &mut self,
        domain: AttributeDomain,
        name: &str,
        values: Vec<[f32; 3]>,
        type_info: TypeInfo,
    ) -> Result<(), AttributeError> {
        self.set_attribute(domain, name, AttributeStorage::Vec3(values))?;
        if name != "P" {
            self.attributes.set_type_info(domain, name, type_info);
        }
        Ok(())
    }

    pub fn translated(&self, offset: [f32; 3]) -> Mesh {
        let mut out = self.clone();
        for p in &mut out.positions {
            p[0] += offset[0];
            p[1] += offset[1];
            p[2] += offset[2];
        }
        out
    }
}

/// Quad grid in the XZ plane, centered at the origin, with +Y facing normals.
pub fn make_grid(size: [f32; 2], divisions: [u32; 2]) -> Mesh {
    let width = size[0].max(0.0);
    let depth = size[1].max(0.0);
    let div_x = divisions[0].max(1);
    let div_z = divisions[1].max(1);

    let step_x = width / div_x as f32;
    let step_z = depth / div_z as f32;
    let origin_x = -width * 0.5;
    let origin_z = -depth * 0.5;

    let mut positions = Vec::new();
    for z in 0..=div_z {
        for x in 0..=div_x {
            positions.push([
                origin_x + x as f32 * step_x,
                0.0,
                origin_z + z as f32 * step_z,
            ]);
        }
    }

    let mut indices = Vec::new();
    let stride = div_x + 1;
    for z in 0..div_z {
        for x in 0..div_x {
            let i0 = z * stride + x;
            let i1 = i0 + 1;
            let i2 = i0 + stride;
            let i3 = i2 + 1;

            indices.extend_from_slice(&[i0, i2, i3, i1]);
        }
    }
    let face_counts = vec![4; (div_x * div_z) as usize];

    Mesh::with_polygons(positions, face_counts, indices)
}

/// Closed box made of six outward facing quads.
pub fn make_box(size: [f32; 3]) -> Mesh {
    let hx = size[0] * 0.5;
    let hy = size[1] * 0.5;
    let hz = size[2] * 0.5;
    let positions = vec![
        [-hx, -hy, -hz],
        [hx, -hy, -hz],
        [hx, hy, -hz],
        [-hx, hy, -hz],
        [-hx, -hy, hz],
        [hx, -hy, hz],
        [hx, hy, hz],
        [-hx, hy, hz],
    ];
    let indices = vec![
        0, 3, 2, 1, // -z
        4, 5, 6, 7, // +z
        0, 1, 5, 4, // -y
        3, 7, 6, 2, // +y
        0, 4, 7, 3, // -x
        1, 2, 6, 5, // +x
    ];
    Mesh::with_polygons(positions, vec![4; 6], indices)
}
