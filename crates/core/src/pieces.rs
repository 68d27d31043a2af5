use std::collections::BTreeMap;

use crate::attributes::{AttributeDomain, AttributeRef, AttributeType};
use crate::error::{DeformError, SurfaceRole};
use crate::mesh::Mesh;
use crate::spatial_index::{IndexFlags, PrimIndex};
use crate::surface::Surface;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PieceKey {
    Int(i32),
    Str(String),
}

#[derive(Debug, Clone, Copy)]
enum KeyColumn<'a> {
    Int(&'a [i32]),
    Str(&'a [String]),
}

impl<'a> KeyColumn<'a> {
    fn from_attribute(
        attr: AttributeRef<'a>,
        surface: SurfaceRole,
        name: &str,
    ) -> Result<Self, DeformError> {
        match attr {
            AttributeRef::Int(values) => Ok(KeyColumn::Int(values)),
            AttributeRef::String(values) => Ok(KeyColumn::Str(values)),
            _ => Err(DeformError::UnsupportedPieceAttributeType {
                surface,
                attribute: name.to_string(),
            }),
        }
    }

    fn data_type(&self) -> AttributeType {
        match self {
            KeyColumn::Int(_) => AttributeType::Int,
            KeyColumn::Str(_) => AttributeType::String,
        }
    }

    fn key(&self, idx: usize) -> Option<PieceKey> {
        match self {
            KeyColumn::Int(values) => values.get(idx).copied().map(PieceKey::Int),
            KeyColumn::Str(values) => values.get(idx).cloned().map(PieceKey::Str),
        }
    }
}

/// Rest-surface primitives bucketed by piece key, one spatial index per bucket.
#[derive(Debug)]
pub struct PieceGroups {
    attribute: String,
    key_type: AttributeType,
    groups: BTreeMap<PieceKey, PrimIndex>,
}

impl PieceGroups {
    pub fn build(rest: &Surface<'_>, attribute: &str, flags: IndexFlags) -> Result<Self, DeformError> {
        let mesh = rest.mesh();
        let mut buckets: BTreeMap<PieceKey, Vec<usize>> = BTreeMap::new();

        let key_type = if let Some(attr) = mesh.attribute(AttributeDomain::Primitive, attribute) {
            let column = KeyColumn::from_attribute(attr, SurfaceRole::Rest, attribute)?;
            for prim in 0..rest.primitive_count() {
                if let Some(key) = column.key(prim) {
                    buckets.entry(key).or_default().push(prim);
                }
            }
            column.data_type()
        } else if let Some(attr) = mesh.attribute(AttributeDomain::Point, attribute) {
            let column = KeyColumn::from_attribute(attr, SurfaceRole::Rest, attribute)?;
            for prim in 0..rest.primitive_count() {
                let first_point = rest.primitive_points(prim).first().copied();
                if let Some(key) = first_point.and_then(|point| column.key(point as usize)) {
                    buckets.entry(key).or_default().push(prim);
                }
            }
            column.data_type()
        } else {
            return Err(DeformError::PieceAttributeNotFound {
                surface: SurfaceRole::Rest,
                attribute: attribute.to_string(),
            });
        };

        let groups = buckets
            .into_iter()
            .map(|(key, prims)| (key, PrimIndex::with_primitives(rest, &prims, flags)))
            .collect();

        Ok(Self {
            attribute: attribute.to_string(),
            key_type,
            groups,
        })
    }

    pub fn piece_count(&self) -> usize {
        self.groups.len()
    }

    pub fn get(&self, key: &PieceKey) -> Option<&PrimIndex> {
        self.groups.get(key)
    }

    /// Piece key of every mesh point; `None` when the point has no readable key.
    pub fn point_keys(&self, mesh: &Mesh) -> Result<Vec<Option<PieceKey>>, DeformError> {
        let name = self.attribute.as_str();
        let (column, from_primitives) =
            if let Some(attr) = mesh.attribute(AttributeDomain::Point, name) {
                (KeyColumn::from_attribute(attr, SurfaceRole::Mesh, name)?, false)
            } else if let Some(attr) = mesh.attribute(AttributeDomain::Primitive, name) {
                (KeyColumn::from_attribute(attr, SurfaceRole::Mesh, name)?, true)
            } else {
                return Err(DeformError::PieceAttributeNotFound {
                    surface: SurfaceRole::Mesh,
                    attribute: name.to_string(),
                });
            };
        if column.data_type() != self.key_type {
            return Err(DeformError::UnsupportedPieceAttributeType {
                surface: SurfaceRole::Mesh,
                attribute: name.to_string(),
            });
        }

        if !from_primitives {
            return Ok((0..mesh.point_count()).map(|point| column.key(point)).collect());
        }
        Ok(mesh
            .first_primitive_per_point()
            .into_iter()
            .map(|prim| prim.and_then(|prim| column.key(prim as usize)))
            .collect())
    }
}
