use glam::Vec3;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::DeformConfig;
use crate::error::{DeformError, SurfaceRole};
use crate::frame::{blended_frame, invert_rotation, FrameSource};
use crate::groups::point_group_mask;
use crate::mesh::Mesh;
use crate::parallel::for_each_indexed_mut_with_scratch;
use crate::pieces::{PieceGroups, PieceKey};
use crate::spatial_index::{IndexError, IndexFlags, NearestHit, PrimIndex};
use crate::surface::Surface;

const VERTICAL_DIR_DOT: f32 = 0.99;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CaptureHit {
    pub prim: usize,
    pub u: f32,
    pub v: f32,
    pub weight: f32,
}

impl CaptureHit {
    pub fn as_tuple(&self) -> (usize, f32, f32, f32) {
        (self.prim, self.u, self.v, self.weight)
    }
}

/// Binding of one mesh point to the rest surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureRecord {
    pub rest_local: [f32; 3],
    pub hits: Vec<CaptureHit>,
    /// Rest frame, column major. Only kept when vector attributes are transported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rotation: Option<[f32; 9]>,
}

impl CaptureRecord {
    pub fn weight_sum(&self) -> f32 {
        self.hits.iter().map(|hit| hit.weight).sum()
    }

    pub fn frame_hits(&self) -> impl Iterator<Item = (usize, f32, f32, f32)> + '_ {
        self.hits.iter().map(CaptureHit::as_tuple)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CaptureOutput {
    pub records: Vec<Option<CaptureRecord>>,
    pub captured: usize,
    pub skipped: usize,
}

/// Per-worker buffers reused across the points a worker captures.
#[derive(Debug, Default)]
pub struct TransformScratch {
    hits: Vec<CaptureHit>,
}

#[derive(Debug, Clone, Copy)]
struct SampleSettings {
    multi_sample: bool,
    min_distance_threshold: f32,
    sample_ray_scale: f32,
    rigid: bool,
    store_rotation: bool,
}

enum IndexLookup {
    Global(PrimIndex),
    Pieces {
        groups: PieceGroups,
        keys: Vec<Option<PieceKey>>,
    },
}

impl IndexLookup {
    fn index_for(&self, point: usize) -> Option<&PrimIndex> {
        match self {
            IndexLookup::Global(index) => Some(index),
            IndexLookup::Pieces { groups, keys } => {
                let key = keys.get(point)?.as_ref()?;
                groups.get(key)
            }
        }
    }
}

pub fn capture(
    mesh: &Mesh,
    rest: &Surface<'_>,
    config: &DeformConfig,
    source: &FrameSource<'_>,
    store_rotation: bool,
) -> Result<CaptureOutput, DeformError> {
    if rest.primitive_count() == 0 {
        return Err(DeformError::EmptyInput {
            surface: SurfaceRole::Rest,
        });
    }

    let settings = SampleSettings {
        multi_sample: config.multi_sample_enabled(),
        min_distance_threshold: config.min_distance_threshold,
        sample_ray_scale: config.sample_ray_scale,
        rigid: config.rigid_projection,
        store_rotation,
    };
    let flags = IndexFlags {
        rays: settings.multi_sample,
        closest: true,
    };
    let lookup = match config.piece_attribute() {
        Some(name) => {
            let groups = PieceGroups::build(rest, name, flags)?;
            let keys = groups.point_keys(mesh)?;
            debug!("capture split rest surface into {} pieces by '{}'", groups.piece_count(), name);
            IndexLookup::Pieces { groups, keys }
        }
        None => IndexLookup::Global(PrimIndex::new(rest, flags)),
    };
    let mask = point_group_mask(mesh, &config.group);

    let mut records: Vec<Option<CaptureRecord>> = vec![None; mesh.point_count()];
    for_each_indexed_mut_with_scratch(
        &mut records,
        TransformScratch::default,
        |scratch, idx, slot| {
            if let Some(mask) = &mask {
                if !mask.get(idx).copied().unwrap_or(false) {
                    return;
                }
            }
            let Some(index) = lookup.index_for(idx) else {
                return;
            };
            let position = Vec3::from(mesh.positions[idx]);
            *slot = capture_point(position, index, rest, source, &settings, scratch);
        },
    );

    let captured = records.iter().filter(|record| record.is_some()).count();
    let skipped = records.len() - captured;
    debug!("captured {captured} points ({skipped} skipped)");
    Ok(CaptureOutput {
        records,
        captured,
        skipped,
    })
}

fn capture_point(
    position: Vec3,
    index: &PrimIndex,
    rest: &Surface<'_>,
    source: &FrameSource<'_>,
    settings: &SampleSettings,
    scratch: &mut TransformScratch,
) -> Option<CaptureRecord> {
    let primary = index.nearest_point(position).ok()?;
    scratch.hits.clear();
    scratch.hits.push(CaptureHit {
        prim: primary.prim,
        u: primary.u,
        v: primary.v,
        weight: 1.0,
    });
    if settings.multi_sample && primary.distance > settings.min_distance_threshold {
        let scale = settings.sample_ray_scale;
        if let Err(err) = gather_ray_samples(position, &primary, index, scale, &mut scratch.hits) {
            warn!("secondary samples skipped: {err}");
        }
        normalize_weights(&mut scratch.hits);
    }

    let frame = blended_frame(
        rest,
        scratch.hits.iter().map(CaptureHit::as_tuple),
        source,
        settings.rigid,
    )?;
    let inverse = invert_rotation(&frame.rotation, settings.rigid);
    Some(CaptureRecord {
        rest_local: frame.to_local(position, &inverse).to_array(),
        hits: scratch.hits.clone(),
        rotation: settings
            .store_rotation
            .then(|| frame.rotation.to_cols_array()),
    })
}

// Four rays perpendicular to the direction of the closest hit.
fn gather_ray_samples(
    position: Vec3,
    primary: &NearestHit,
    index: &PrimIndex,
    ray_scale: f32,
    hits: &mut Vec<CaptureHit>,
) -> Result<(), IndexError> {
    let Some(dir) = (primary.position - position).try_normalize() else {
        return Ok(());
    };
    let reference = if dir.dot(Vec3::Y) > VERTICAL_DIR_DOT {
        Vec3::X
    } else {
        Vec3::Y
    };
    let y = reference
        .cross(dir)
        .try_normalize()
        .unwrap_or_else(|| dir.any_orthonormal_vector());
    let x = y.cross(dir);
    let max_distance = primary.distance * ray_scale;

    for ray_dir in [y, -y, x, -x] {
        let Some(hit) = index.cast_ray(position, ray_dir, max_distance)? else {
            continue;
        };
        if hit.distance <= f32::EPSILON {
            continue;
        }
        hits.push(CaptureHit {
            prim: hit.prim,
            u: hit.u,
            v: hit.v,
            weight: primary.distance / hit.distance,
        });
    }
    Ok(())
}

fn normalize_weights(hits: &mut [CaptureHit]) {
    let total: f32 = hits.iter().map(|hit| hit.weight).sum();
    if total <= 0.0 {
        return;
    }
    for hit in hits {
        hit.weight /= total;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::{AttributeDomain, AttributeStorage};
    use crate::mesh::{make_box, make_grid};

    fn unit_quad() -> Mesh {
        Mesh::with_polygons(
            vec![
                [0.0, 0.0, 0.0],
                [1.0, 0.0, 0.0],
                [1.0, 1.0, 0.0],
                [0.0, 1.0, 0.0],
            ],
            vec![4],
            vec![0, 1, 2, 3],
        )
    }

    fn run(mesh: &Mesh, rest: &Mesh, config: &DeformConfig) -> CaptureOutput {
        let surface = Surface::new(rest, SurfaceRole::Rest).expect("surface");
        capture(mesh, &surface, config, &FrameSource::Intrinsic, false).expect("capture")
    }

    #[test]
    fn point_above_unit_quad_binds_to_center() {
        let mesh = Mesh::with_points(vec![[0.5, 0.5, 0.1]]);
        let output = run(&mesh, &unit_quad(), &DeformConfig::default());
        let record = output.records[0].as_ref().expect("record");
        assert_eq!(record.hits.len(), 1);
        let hit = record.hits[0];
        assert_eq!(hit.prim, 0);
        assert!((hit.u - 0.5).abs() < 1.0e-5);
        assert!((hit.v - 0.5).abs() < 1.0e-5);
        assert_eq!(hit.weight, 1.0);
        assert!(Vec3::from(record.rest_local).abs_diff_eq(Vec3::new(0.0, 0.0, 0.1), 1.0e-5));
        assert!(record.rotation.is_none());
    }

    #[test]
    fn capture_is_idempotent() {
        let mut rest = make_grid([2.0, 2.0], [4, 4]);
        rest.positions[7][1] = 0.4;
        let mesh = Mesh::with_points(vec![[0.1, 0.3, 0.2], [-0.7, -0.2, 0.9], [0.4, 1.0, -0.6]]);
        let config = DeformConfig {
            use_multiple_samples: true,
            ..DeformConfig::default()
        };
        let first = run(&mesh, &rest, &config);
        let second = run(&mesh, &rest, &config);
        assert_eq!(first, second);
    }

    #[test]
    fn multi_sample_weights_are_normalized() {
        let rest = make_box([2.0, 2.0, 2.0]);
        let mesh = Mesh::with_points(vec![[0.3, 0.1, 0.2]]);
        let config = DeformConfig {
            use_multiple_samples: true,
            ..DeformConfig::default()
        };
        let output = run(&mesh, &rest, &config);
        let record = output.records[0].as_ref().expect("record");
        assert_eq!(record.hits.len(), 5);
        assert_eq!(record.hits[0].prim, 5);
        assert!((record.weight_sum() - 1.0).abs() < 1.0e-4);
        assert!(record.hits[0].weight > record.hits[1].weight);
    }

    #[test]
    fn ray_samples_need_a_ray_index() {
        let rest = make_box([2.0, 2.0, 2.0]);
        let surface = Surface::new(&rest, SurfaceRole::Rest).expect("surface");
        let position = Vec3::new(0.3, 0.1, 0.2);
        let closest_only = PrimIndex::new(&surface, IndexFlags::CLOSEST);
        let primary = closest_only.nearest_point(position).expect("primary");

        let mut hits = Vec::new();
        assert_eq!(
            gather_ray_samples(position, &primary, &closest_only, 2.0, &mut hits),
            Err(IndexError::QueryDisabled(crate::spatial_index::QueryKind::Ray))
        );
        assert!(hits.is_empty());

        let full = PrimIndex::new(&surface, IndexFlags::ALL);
        gather_ray_samples(position, &primary, &full, 2.0, &mut hits).expect("rays");
        assert_eq!(hits.len(), 4);
    }

    #[test]
    fn close_points_skip_multi_sample() {
        let rest = make_box([2.0, 2.0, 2.0]);
        let mesh = Mesh::with_points(vec![[0.9995, 0.1, 0.2]]);
        let config = DeformConfig {
            use_multiple_samples: true,
            ..DeformConfig::default()
        };
        let output = run(&mesh, &rest, &config);
        assert_eq!(output.records[0].as_ref().expect("record").hits.len(), 1);
    }

    #[test]
    fn group_limits_captured_points() {
        let mut mesh = Mesh::with_points(vec![[0.2, 0.2, 0.1], [0.8, 0.8, 0.1], [0.5, 0.5, 0.3]]);
        mesh.groups.insert("pinned".to_string(), vec![true, false, true]);
        let config = DeformConfig {
            group: "pinned".to_string(),
            ..DeformConfig::default()
        };
        let output = run(&mesh, &unit_quad(), &config);
        assert!(output.records[0].is_some());
        assert!(output.records[1].is_none());
        assert!(output.records[2].is_some());
        assert_eq!((output.captured, output.skipped), (2, 1));
    }

    #[test]
    fn pieces_bind_to_their_own_primitives() {
        let mut rest = make_grid([2.0, 1.0], [2, 1]);
        rest.set_attribute(
            AttributeDomain::Primitive,
            "piece",
            AttributeStorage::String(vec!["A".to_string(), "B".to_string()]),
        )
        .expect("piece");
        // Both points sit over piece A's primitive.
        let mut mesh = Mesh::with_points(vec![[-0.5, 0.2, 0.0], [-0.4, 0.2, 0.1], [-0.6, 0.1, 0.0]]);
        mesh.set_attribute(
            AttributeDomain::Point,
            "piece",
            AttributeStorage::String(vec!["A".to_string(), "B".to_string(), "X".to_string()]),
        )
        .expect("piece");
        let config = DeformConfig {
            piece_attribute: Some("piece".to_string()),
            ..DeformConfig::default()
        };
        let output = run(&mesh, &rest, &config);
        let a = output.records[0].as_ref().expect("A");
        let b = output.records[1].as_ref().expect("B");
        assert!(a.hits.iter().all(|hit| hit.prim == 0));
        assert!(b.hits.iter().all(|hit| hit.prim == 1));
        assert!(output.records[2].is_none());
    }

    #[test]
    fn stores_rest_rotation_on_request() {
        let mesh = Mesh::with_points(vec![[0.5, 0.5, 0.1]]);
        let rest = unit_quad();
        let surface = Surface::new(&rest, SurfaceRole::Rest).expect("surface");
        let output = capture(&mesh, &surface, &DeformConfig::default(), &FrameSource::Intrinsic, true)
            .expect("capture");
        let rotation = output.records[0]
            .as_ref()
            .and_then(|record| record.rotation)
            .expect("rotation");
        assert!(glam::Mat3::from_cols_array(&rotation)
            .z_axis
            .abs_diff_eq(Vec3::Z, 1.0e-6));
    }

    #[test]
    fn empty_rest_surface_is_rejected() {
        let mesh = Mesh::with_points(vec![[0.0; 3]]);
        let rest = Mesh::with_points(vec![[0.0; 3]]);
        let surface = Surface::new(&rest, SurfaceRole::Rest).expect("surface");
        assert_eq!(
            capture(&mesh, &surface, &DeformConfig::default(), &FrameSource::Intrinsic, false),
            Err(DeformError::EmptyInput {
                surface: SurfaceRole::Rest
            })
        );
    }
}
