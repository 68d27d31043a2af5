use std::fmt;

use glam::Vec3;

use crate::primitive::Primitive;
use crate::surface::Surface;

const LEAF_SIZE: usize = 4;
const BOUNDS_PAD: f32 = 1.0e-6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKind {
    Closest,
    Ray,
}

impl fmt::Display for QueryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryKind::Closest => f.write_str("closest-point"),
            QueryKind::Ray => f.write_str("ray"),
        }
    }
}

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexError {
    #[error("spatial index contains no primitives")]
    EmptyIndex,
    #[error("{0} queries were not enabled when the index was built")]
    QueryDisabled(QueryKind),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexFlags {
    pub rays: bool,
    pub closest: bool,
}

impl IndexFlags {
    pub const ALL: IndexFlags = IndexFlags {
        rays: true,
        closest: true,
    };
    pub const CLOSEST: IndexFlags = IndexFlags {
        rays: false,
        closest: true,
    };
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NearestHit {
    pub prim: usize,
    pub u: f32,
    pub v: f32,
    pub position: Vec3,
    pub distance: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayHit {
    pub prim: usize,
    pub u: f32,
    pub v: f32,
    pub distance: f32,
}

#[derive(Debug, Clone)]
struct Entry {
    prim: usize,
    order: usize,
    shape: Primitive,
    min: Vec3,
    max: Vec3,
}

#[derive(Debug, Clone, Copy)]
enum NodeKind {
    Leaf { start: usize, end: usize },
    Branch { left: usize, right: usize },
}

#[derive(Debug, Clone, Copy)]
struct Node {
    min: Vec3,
    max: Vec3,
    kind: NodeKind,
}

/// Bounding volume hierarchy over the primitives of a surface (or a subset of them).
#[derive(Debug, Clone)]
pub struct PrimIndex {
    flags: IndexFlags,
    entries: Vec<Entry>,
    nodes: Vec<Node>,
}

impl PrimIndex {
    pub fn new(surface: &Surface<'_>, flags: IndexFlags) -> Self {
        let prims: Vec<usize> = (0..surface.primitive_count()).collect();
        Self::with_primitives(surface, &prims, flags)
    }

    /// Ties in `nearest_point` resolve to the earliest entry of `prims`.
    pub fn with_primitives(surface: &Surface<'_>, prims: &[usize], flags: IndexFlags) -> Self {
        let mut entries: Vec<Entry> = prims
            .iter()
            .enumerate()
            .filter_map(|(order, &prim)| {
                let shape = surface.primitive(prim)?;
                let (min, max) = shape.bounds();
                Some(Entry {
                    prim,
                    order,
                    shape,
                    min: min - Vec3::splat(BOUNDS_PAD),
                    max: max + Vec3::splat(BOUNDS_PAD),
                })
            })
            .collect();
        let mut nodes = Vec::new();
        if !entries.is_empty() {
            let len = entries.len();
            build_node(&mut entries, 0, len, &mut nodes);
        }
        Self {
            flags,
            entries,
            nodes,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn nearest_point(&self, position: Vec3) -> Result<NearestHit, IndexError> {
        if !self.flags.closest {
            return Err(IndexError::QueryDisabled(QueryKind::Closest));
        }
        if self.entries.is_empty() {
            return Err(IndexError::EmptyIndex);
        }

        let mut best: Option<(f32, usize, NearestHit)> = None;
        let mut stack = vec![0usize];
        while let Some(node_idx) = stack.pop() {
            let node = self.nodes[node_idx];
            let bound = aabb_distance_sq(position, node.min, node.max);
            if best.is_some_and(|(best_dist, ..)| bound > best_dist) {
                continue;
            }
            match node.kind {
                NodeKind::Leaf { start, end } => {
                    for entry in &self.entries[start..end] {
                        let hit = entry.shape.closest_point(position);
                        let better = match best {
                            None => true,
                            Some((best_dist, best_order, _)) => {
                                hit.distance_sq < best_dist
                                    || (hit.distance_sq == best_dist && entry.order < best_order)
                            }
                        };
                        if better {
                            best = Some((
                                hit.distance_sq,
                                entry.order,
                                NearestHit {
                                    prim: entry.prim,
                                    u: hit.u,
                                    v: hit.v,
                                    position: hit.position,
                                    distance: hit.distance_sq.sqrt(),
                                },
                            ));
                        }
                    }
                }
                NodeKind::Branch { left, right } => {
                    let left_node = self.nodes[left];
                    let right_node = self.nodes[right];
                    let left_dist = aabb_distance_sq(position, left_node.min, left_node.max);
                    let right_dist = aabb_distance_sq(position, right_node.min, right_node.max);
                    // Nearer child is popped first.
                    if left_dist <= right_dist {
                        stack.push(right);
                        stack.push(left);
                    } else {
                        stack.push(left);
                        stack.push(right);
                    }
                }
            }
        }

        best.map(|(_, _, hit)| hit).ok_or(IndexError::EmptyIndex)
    }

    pub fn cast_ray(
        &self,
        origin: Vec3,
        direction: Vec3,
        max_distance: f32,
    ) -> Result<Option<RayHit>, IndexError> {
        if !self.flags.rays {
            return Err(IndexError::QueryDisabled(QueryKind::Ray));
        }
        let Some(dir) = direction.try_normalize() else {
            return Ok(None);
        };
        if self.entries.is_empty() || max_distance.is_nan() || max_distance <= 0.0 {
            return Ok(None);
        }

        let inv_dir = dir.recip();
        let mut best: Option<(f32, usize, RayHit)> = None;
        let mut stack = vec![0usize];
        while let Some(node_idx) = stack.pop() {
            let node = self.nodes[node_idx];
            let limit = best.map_or(max_distance, |(t, ..)| t);
            if !ray_hits_aabb(origin, inv_dir, node.min, node.max, limit) {
                continue;
            }
            match node.kind {
                NodeKind::Leaf { start, end } => {
                    for entry in &self.entries[start..end] {
                        let Some((t, u, v)) = entry.shape.intersect_ray(origin, dir) else {
                            continue;
                        };
                        if t > max_distance {
                            continue;
                        }
                        let better = match best {
                            None => true,
                            Some((best_t, best_order, _)) => {
                                t < best_t || (t == best_t && entry.order < best_order)
                            }
                        };
                        if better {
                            best = Some((
                                t,
                                entry.order,
                                RayHit {
                                    prim: entry.prim,
                                    u,
                                    v,
                                    distance: t,
                                },
                            ));
                        }
                    }
                }
                NodeKind::Branch { left, right } => {
                    stack.push(right);
                    stack.push(left);
                }
            }
        }

        Ok(best.map(|(_, _, hit)| hit))
    }
}

fn build_node(entries: &mut [Entry], start: usize, end: usize, nodes: &mut Vec<Node>) -> usize {
    let (min, max) = entries[start..end].iter().fold(
        (Vec3::splat(f32::MAX), Vec3::splat(f32::MIN)),
        |(min, max), entry| (min.min(entry.min), max.max(entry.max)),
    );
    let node_idx = nodes.len();
    nodes.push(Node {
        min,
        max,
        kind: NodeKind::Leaf { start, end },
    });
    if end - start <= LEAF_SIZE {
        return node_idx;
    }

    let extent = max - min;
    let axis = if extent.x >= extent.y && extent.x >= extent.z {
        0
    } else if extent.y >= extent.z {
        1
    } else {
        2
    };
    entries[start..end].sort_by(|a, b| {
        let ca = (a.min[axis] + a.max[axis]) * 0.5;
        let cb = (b.min[axis] + b.max[axis]) * 0.5;
        ca.total_cmp(&cb).then(a.order.cmp(&b.order))
    });
    let mid = start + (end - start) / 2;
    let left = build_node(entries, start, mid, nodes);
    let right = build_node(entries, mid, end, nodes);
    nodes[node_idx].kind = NodeKind::Branch { left, right };
    node_idx
}

fn aabb_distance_sq(p: Vec3, min: Vec3, max: Vec3) -> f32 {
    let d = (min - p).max(p - max).max(Vec3::ZERO);
    d.length_squared()
}

fn ray_hits_aabb(origin: Vec3, inv_dir: Vec3, min: Vec3, max: Vec3, max_t: f32) -> bool {
    let t1 = (min - origin) * inv_dir;
    let t2 = (max - origin) * inv_dir;
    let t_near = t1.min(t2).max_element().max(0.0);
    let t_far = t1.max(t2).min_element().min(max_t);
    t_near <= t_far
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SurfaceRole;
    use crate::mesh::{make_box, make_grid, Mesh};

    fn sample_points(count: usize, scale: f32) -> Vec<Vec3> {
        // Deterministic low-discrepancy sequence.
        (0..count)
            .map(|i| {
                let t = i as f32;
                Vec3::new(
                    ((t * 0.618_034).fract() - 0.5) * scale,
                    ((t * 0.414_213).fract() - 0.5) * scale,
                    ((t * 0.732_050).fract() - 0.5) * scale,
                )
            })
            .collect()
    }

    fn brute_nearest(surface: &Surface<'_>, p: Vec3) -> (usize, f32) {
        let mut best = (0, f32::MAX);
        for prim in 0..surface.primitive_count() {
            let hit = surface.primitive(prim).expect("prim").closest_point(p);
            if hit.distance_sq < best.1 {
                best = (prim, hit.distance_sq);
            }
        }
        best
    }

    #[test]
    fn nearest_matches_brute_force() {
        let mut grid = make_grid([4.0, 4.0], [8, 8]);
        for (idx, p) in grid.positions.iter_mut().enumerate() {
            p[1] = (idx as f32 * 0.37).sin() * 0.3;
        }
        let surface = Surface::new(&grid, SurfaceRole::Rest).expect("surface");
        let index = PrimIndex::new(&surface, IndexFlags::CLOSEST);
        for p in sample_points(200, 5.0) {
            let hit = index.nearest_point(p).expect("hit");
            let (_, brute_dist) = brute_nearest(&surface, p);
            assert!(
                (hit.distance * hit.distance - brute_dist).abs() < 1.0e-4,
                "{p:?}: {} vs {}",
                hit.distance * hit.distance,
                brute_dist
            );
        }
    }

    #[test]
    fn ties_resolve_to_insertion_order() {
        let grid = make_grid([2.0, 1.0], [2, 1]);
        let surface = Surface::new(&grid, SurfaceRole::Rest).expect("surface");
        // Point above the shared edge is equidistant to both quads.
        let p = Vec3::new(0.0, 1.0, 0.0);

        let forward = PrimIndex::with_primitives(&surface, &[0, 1], IndexFlags::CLOSEST);
        assert_eq!(forward.nearest_point(p).expect("hit").prim, 0);

        let reversed = PrimIndex::with_primitives(&surface, &[1, 0], IndexFlags::CLOSEST);
        assert_eq!(reversed.nearest_point(p).expect("hit").prim, 1);
    }

    #[test]
    fn empty_index_reports_error() {
        let mesh = Mesh::default();
        let surface = Surface::new(&mesh, SurfaceRole::Rest).expect("surface");
        let index = PrimIndex::new(&surface, IndexFlags::ALL);
        assert!(index.is_empty());
        assert_eq!(index.nearest_point(Vec3::ZERO), Err(IndexError::EmptyIndex));
        assert_eq!(index.cast_ray(Vec3::ZERO, Vec3::X, 1.0), Ok(None));
    }

    #[test]
    fn disabled_queries_are_rejected() {
        let grid = make_grid([1.0, 1.0], [1, 1]);
        let surface = Surface::new(&grid, SurfaceRole::Rest).expect("surface");
        let index = PrimIndex::new(&surface, IndexFlags::CLOSEST);
        assert_eq!(
            index.cast_ray(Vec3::Y, Vec3::NEG_Y, 2.0),
            Err(IndexError::QueryDisabled(QueryKind::Ray))
        );
    }

    #[test]
    fn ray_returns_first_hit_within_distance() {
        let cube = make_box([2.0, 2.0, 2.0]);
        let surface = Surface::new(&cube, SurfaceRole::Rest).expect("surface");
        let index = PrimIndex::new(&surface, IndexFlags::ALL);

        let hit = index
            .cast_ray(Vec3::new(0.2, 0.1, 0.0), Vec3::X, 10.0)
            .expect("query")
            .expect("hit");
        assert_eq!(hit.prim, 5);
        assert!((hit.distance - 0.8).abs() < 1.0e-5);

        let short = index
            .cast_ray(Vec3::new(0.2, 0.1, 0.0), Vec3::X, 0.5)
            .expect("query");
        assert!(short.is_none());
    }
}
