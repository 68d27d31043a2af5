use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttributeDomain {
    Point,
    Vertex,
    Primitive,
    Detail,
}

impl AttributeDomain {
    pub const ALL: [AttributeDomain; 4] = [
        AttributeDomain::Vertex,
        AttributeDomain::Point,
        AttributeDomain::Primitive,
        AttributeDomain::Detail,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeType {
    Float,
    Int,
    Vec3,
    String,
}

/// Semantic tag carried by three-component attributes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TypeInfo {
    #[default]
    None,
    Position,
    Vector,
    Normal,
}

impl TypeInfo {
    pub fn is_transformable(self) -> bool {
        matches!(self, TypeInfo::Position | TypeInfo::Vector | TypeInfo::Normal)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AttributeStorage {
    Float(Vec<f32>),
    Int(Vec<i32>),
    Vec3(Vec<[f32; 3]>),
    String(Vec<String>),
}

impl AttributeStorage {
    pub fn len(&self) -> usize {
        match self {
            AttributeStorage::Float(values) => values.len(),
            AttributeStorage::Int(values) => values.len(),
            AttributeStorage::Vec3(values) => values.len(),
            AttributeStorage::String(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn data_type(&self) -> AttributeType {
        match self {
            AttributeStorage::Float(_) => AttributeType::Float,
            AttributeStorage::Int(_) => AttributeType::Int,
            AttributeStorage::Vec3(_) => AttributeType::Vec3,
            AttributeStorage::String(_) => AttributeType::String,
        }
    }

    pub fn as_ref(&self) -> AttributeRef<'_> {
        match self {
            AttributeStorage::Float(values) => AttributeRef::Float(values.as_slice()),
            AttributeStorage::Int(values) => AttributeRef::Int(values.as_slice()),
            AttributeStorage::Vec3(values) => AttributeRef::Vec3(values.as_slice()),
            AttributeStorage::String(values) => AttributeRef::String(values.as_slice()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeError {
    InvalidDomain,
    InvalidLength {
        expected: usize,
        actual: usize,
    },
    InvalidType {
        expected: AttributeType,
        actual: AttributeType,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct AttributeInfo {
    pub name: String,
    pub domain: AttributeDomain,
    pub data_type: AttributeType,
    pub type_info: TypeInfo,
    pub len: usize,
    pub implicit: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AttributeRef<'a> {
    Float(&'a [f32]),
    Int(&'a [i32]),
    Vec3(&'a [[f32; 3]]),
    String(&'a [String]),
}

impl<'a> AttributeRef<'a> {
    pub fn len(&self) -> usize {
        match self {
            AttributeRef::Float(values) => values.len(),
            AttributeRef::Int(values) => values.len(),
            AttributeRef::Vec3(values) => values.len(),
            AttributeRef::String(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn data_type(&self) -> AttributeType {
        match self {
            AttributeRef::Float(_) => AttributeType::Float,
            AttributeRef::Int(_) => AttributeType::Int,
            AttributeRef::Vec3(_) => AttributeType::Vec3,
            AttributeRef::String(_) => AttributeType::String,
        }
    }

    pub fn as_vec3(&self) -> Option<&'a [[f32; 3]]> {
        match self {
            AttributeRef::Vec3(values) => Some(values),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeshAttributes {
    point: HashMap<String, AttributeStorage>,
    vertex: HashMap<String, AttributeStorage>,
    primitive: HashMap<String, AttributeStorage>,
    detail: HashMap<String, AttributeStorage>,
    type_info: HashMap<(AttributeDomain, String), TypeInfo>,
}

impl MeshAttributes {
    pub fn map(&self, domain: AttributeDomain) -> &HashMap<String, AttributeStorage> {
        match domain {
            AttributeDomain::Point => &self.point,
            AttributeDomain::Vertex => &self.vertex,
            AttributeDomain::Primitive => &self.primitive,
            AttributeDomain::Detail => &self.detail,
        }
    }

    pub fn map_mut(&mut self, domain: AttributeDomain) -> &mut HashMap<String, AttributeStorage> {
        match domain {
            AttributeDomain::Point => &mut self.point,
            AttributeDomain::Vertex => &mut self.vertex,
            AttributeDomain::Primitive => &mut self.primitive,
            AttributeDomain::Detail => &mut self.detail,
        }
    }

    pub fn get(&self, domain: AttributeDomain, name: &str) -> Option<&AttributeStorage> {
        self.map(domain).get(name)
    }

    pub fn get_mut(&mut self, domain: AttributeDomain, name: &str) -> Option<&mut AttributeStorage> {
        self.map_mut(domain).get_mut(name)
    }

    pub fn type_info(&self, domain: AttributeDomain, name: &str) -> TypeInfo {
        self.type_info
            .get(&(domain, name.to_string()))
            .copied()
            .unwrap_or_default()
    }

    pub fn set_type_info(&mut self, domain: AttributeDomain, name: &str, info: TypeInfo) {
        if info == TypeInfo::None {
            self.type_info.remove(&(domain, name.to_string()));
        } else {
            self.type_info.insert((domain, name.to_string()), info);
        }
    }
}
