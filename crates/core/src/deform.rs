use glam::{Mat3, Vec3};
use tracing::debug;

use crate::capture::CaptureRecord;
use crate::config::DeformConfig;
use crate::error::DeformError;
use crate::frame::{blended_frame, invert_rotation, rigid_projection, FrameSource};
use crate::mesh::Mesh;
use crate::parallel::for_each_indexed_mut;
use crate::surface::Surface;
use crate::transport::TransportSet;

#[derive(Debug, Clone)]
pub struct DeformOutput {
    pub mesh: Mesh,
    pub deformed: usize,
    pub skipped: usize,
}

#[derive(Debug, Clone, Copy)]
struct PointResult {
    position: Vec3,
    transform: Option<Mat3>,
}

pub fn deform(
    records: &[Option<CaptureRecord>],
    mesh: &Mesh,
    rest: &Mesh,
    deformed: &Surface<'_>,
    config: &DeformConfig,
    source: &FrameSource<'_>,
    transport: &TransportSet,
) -> Result<DeformOutput, DeformError> {
    rest.compare_topology(deformed.mesh())?;
    if records.len() != mesh.point_count() {
        return Err(DeformError::CaptureMismatch {
            records: records.len(),
            points: mesh.point_count(),
        });
    }

    let rigid = config.rigid_projection;
    let wants_vectors = !transport.is_empty();
    let mut results: Vec<Option<PointResult>> = vec![None; mesh.point_count()];
    for_each_indexed_mut(&mut results, |idx, slot| {
        if let Some(record) = &records[idx] {
            *slot = deform_point(record, deformed, source, rigid, wants_vectors);
        }
    });

    let mut out = mesh.clone();
    let mut transforms = Vec::with_capacity(if wants_vectors { results.len() } else { 0 });
    let mut moved = 0usize;
    for (position, result) in out.positions.iter_mut().zip(&results) {
        if let Some(result) = result {
            *position = result.position.to_array();
            moved += 1;
        }
        if wants_vectors {
            transforms.push(result.and_then(|result| result.transform));
        }
    }
    if wants_vectors {
        transport.apply(&mut out, &transforms);
    }

    let skipped = results.len() - moved;
    debug!("deformed {moved} points ({skipped} unchanged)");
    Ok(DeformOutput {
        mesh: out,
        deformed: moved,
        skipped,
    })
}

fn deform_point(
    record: &CaptureRecord,
    deformed: &Surface<'_>,
    source: &FrameSource<'_>,
    rigid: bool,
    wants_vectors: bool,
) -> Option<PointResult> {
    let frame = blended_frame(deformed, record.frame_hits(), source, rigid)?;
    let position = frame.to_world(Vec3::from(record.rest_local));
    let transform = match (wants_vectors, record.rotation.as_ref()) {
        (true, Some(rest_rotation)) => {
            let rest_rotation = Mat3::from_cols_array(rest_rotation);
            let combined = frame.rotation * invert_rotation(&rest_rotation, rigid);
            Some(if rigid {
                rigid_projection(combined)
            } else {
                combined
            })
        }
        _ => None,
    };
    Some(PointResult {
        position,
        transform,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::{AttributeDomain, AttributeStorage, TypeInfo};
    use crate::capture::capture;
    use crate::error::{SurfaceRole, TopologyDiff};
    use crate::frame::DriveAttributes;
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

    fn capture_and_deform(
        mesh: &Mesh,
        rest: &Mesh,
        deformed: &Mesh,
        config: &DeformConfig,
    ) -> DeformOutput {
        let transport = TransportSet::resolve(mesh, &config.attributes_to_transport);
        let rest_surface = Surface::new(rest, SurfaceRole::Rest).expect("rest");
        let deformed_surface = Surface::new(deformed, SurfaceRole::Deformed).expect("deformed");
        let (rest_source, deformed_source) = if config.drive_by_attributes {
            (
                FrameSource::Driven(
                    DriveAttributes::resolve(&rest_surface, SurfaceRole::Rest, "N", "up")
                        .expect("rest drive"),
                ),
                FrameSource::Driven(
                    DriveAttributes::resolve(&deformed_surface, SurfaceRole::Deformed, "N", "up")
                        .expect("deformed drive"),
                ),
            )
        } else {
            (FrameSource::Intrinsic, FrameSource::Intrinsic)
        };
        let captured = capture(mesh, &rest_surface, config, &rest_source, !transport.is_empty())
            .expect("capture");
        deform(
            &captured.records,
            mesh,
            rest,
            &deformed_surface,
            config,
            &deformed_source,
            &transport,
        )
        .expect("deform")
    }

    fn scattered_points() -> Mesh {
        Mesh::with_points(vec![
            [0.3, 0.4, 0.2],
            [-0.8, 0.1, 0.6],
            [0.2, -0.5, -0.4],
            [1.4, 0.3, 0.0],
            [0.0, 2.0, 0.0],
        ])
    }

    fn assert_positions_eq(a: &[[f32; 3]], b: &[[f32; 3]], tolerance: f32) {
        assert_eq!(a.len(), b.len());
        for (pa, pb) in a.iter().zip(b) {
            assert!(
                Vec3::from(*pa).abs_diff_eq(Vec3::from(*pb), tolerance),
                "{pa:?} != {pb:?}"
            );
        }
    }

    #[test]
    fn translated_quad_carries_point_along() {
        let rest = unit_quad();
        let deformed = rest.translated([2.0, 0.0, 0.0]);
        let mesh = Mesh::with_points(vec![[0.5, 0.5, 0.1]]);
        let output = capture_and_deform(&mesh, &rest, &deformed, &DeformConfig::default());
        assert!(Vec3::from(output.mesh.positions[0]).abs_diff_eq(Vec3::new(2.5, 0.5, 0.1), 1.0e-5));
        assert_eq!((output.deformed, output.skipped), (1, 0));
    }

    #[test]
    fn identity_round_trip_intrinsic() {
        let mut rest = make_box([2.0, 2.0, 2.0]);
        rest.positions[6] = [1.2, 1.1, 0.9];
        let mesh = scattered_points();
        for use_multiple_samples in [false, true] {
            let config = DeformConfig {
                use_multiple_samples,
                ..DeformConfig::default()
            };
            let output = capture_and_deform(&mesh, &rest, &rest, &config);
            assert_positions_eq(&output.mesh.positions, &mesh.positions, 1.0e-5);
        }
    }

    #[test]
    fn identity_round_trip_driven() {
        let mut rest = make_grid([2.0, 2.0], [3, 3]);
        let count = rest.point_count();
        let normals: Vec<[f32; 3]> = (0..count)
            .map(|i| Vec3::new(0.1 * i as f32, 1.0, -0.05 * i as f32).normalize().to_array())
            .collect();
        rest.set_vec3_attribute(AttributeDomain::Point, "N", normals, TypeInfo::Normal)
            .expect("N");
        rest.set_vec3_attribute(AttributeDomain::Point, "up", vec![[0.0, 0.0, 1.0]; count], TypeInfo::Vector)
            .expect("up");
        let config = DeformConfig {
            drive_by_attributes: true,
            ..DeformConfig::default()
        };
        let mesh = scattered_points();
        let output = capture_and_deform(&mesh, &rest, &rest, &config);
        assert_positions_eq(&output.mesh.positions, &mesh.positions, 1.0e-5);
    }

    #[test]
    fn rotated_surface_rotates_points_and_vectors() {
        let rest = unit_quad();
        let turn = Mat3::from_rotation_x(std::f32::consts::FRAC_PI_2);
        let mut deformed = rest.clone();
        for p in &mut deformed.positions {
            *p = (turn * Vec3::from(*p)).to_array();
        }
        let mut mesh = Mesh::with_points(vec![[0.5, 0.5, 0.1]]);
        mesh.set_vec3_attribute(AttributeDomain::Point, "v", vec![[0.0, 0.0, 1.0]], TypeInfo::Vector)
            .expect("v");

        for rigid_projection in [false, true] {
            let config = DeformConfig {
                rigid_projection,
                ..DeformConfig::default()
            };
            let output = capture_and_deform(&mesh, &rest, &deformed, &config);
            let expected = turn * Vec3::new(0.5, 0.5, 0.1);
            assert!(Vec3::from(output.mesh.positions[0]).abs_diff_eq(expected, 1.0e-5));

            let Some(AttributeStorage::Vec3(values)) =
                output.mesh.attributes.get(AttributeDomain::Point, "v")
            else {
                panic!("v");
            };
            assert!(Vec3::from(values[0]).abs_diff_eq(turn * Vec3::Z, 1.0e-5));
        }
    }

    #[test]
    fn sheared_surface_keeps_transport_rigid() {
        let rest = unit_quad();
        let mut deformed = rest.clone();
        deformed.positions[2] = [1.8, 1.0, 0.3];
        deformed.positions[3] = [0.8, 1.0, 0.0];
        let mut mesh = Mesh::with_points(vec![[0.4, 0.6, 0.2]]);
        mesh.set_vec3_attribute(AttributeDomain::Point, "v", vec![[0.3, 0.0, 1.0]], TypeInfo::Vector)
            .expect("v");
        let rest_surface = Surface::new(&rest, SurfaceRole::Rest).expect("rest");
        let deformed_surface = Surface::new(&deformed, SurfaceRole::Deformed).expect("deformed");

        // Look-at frames are orthonormal, so projecting them changes nothing.
        let mut transported = Vec::new();
        for rigid in [false, true] {
            let config = DeformConfig {
                rigid_projection: rigid,
                ..DeformConfig::default()
            };
            let captured = capture(&mesh, &rest_surface, &config, &FrameSource::Intrinsic, true)
                .expect("capture");
            let record = captured.records[0].as_ref().expect("record");
            let source = FrameSource::Intrinsic;
            let transform = deform_point(record, &deformed_surface, &source, rigid, true)
                .and_then(|result| result.transform)
                .expect("transform");
            assert!((transform.transpose() * transform).abs_diff_eq(Mat3::IDENTITY, 1.0e-4));
            assert!((transform.determinant() - 1.0).abs() < 1.0e-4);

            let output = capture_and_deform(&mesh, &rest, &deformed, &config);
            let Some(AttributeStorage::Vec3(values)) =
                output.mesh.attributes.get(AttributeDomain::Point, "v")
            else {
                panic!("v");
            };
            let length = Vec3::from(values[0]).length();
            assert!((length - Vec3::new(0.3, 0.0, 1.0).length()).abs() < 1.0e-4);
            transported.push((Vec3::from(values[0]), Vec3::from(output.mesh.positions[0])));
        }
        assert!(transported[0].0.abs_diff_eq(transported[1].0, 1.0e-4));
        assert!(transported[0].1.abs_diff_eq(transported[1].1, 1.0e-4));
    }

    #[test]
    fn topology_mismatch_stops_deform() {
        let rest = make_grid([1.0, 1.0], [2, 1]);
        let deformed = make_grid([1.0, 1.0], [1, 1]);
        let mesh = Mesh::with_points(vec![[0.0, 0.1, 0.0]]);
        let rest_surface = Surface::new(&rest, SurfaceRole::Rest).expect("rest");
        let deformed_surface = Surface::new(&deformed, SurfaceRole::Deformed).expect("deformed");
        let captured = capture(
            &mesh,
            &rest_surface,
            &DeformConfig::default(),
            &FrameSource::Intrinsic,
            false,
        )
        .expect("capture");
        let err = deform(
            &captured.records,
            &mesh,
            &rest,
            &deformed_surface,
            &DeformConfig::default(),
            &FrameSource::Intrinsic,
            &TransportSet::default(),
        )
        .expect_err("mismatch");
        assert!(matches!(
            err,
            DeformError::TopologyMismatch(TopologyDiff::PointCount { .. })
        ));
    }

    #[test]
    fn record_count_must_match_mesh() {
        let rest = unit_quad();
        let surface = Surface::new(&rest, SurfaceRole::Deformed).expect("surface");
        let mesh = Mesh::with_points(vec![[0.0; 3]; 2]);
        let err = deform(
            &[None],
            &mesh,
            &rest,
            &surface,
            &DeformConfig::default(),
            &FrameSource::Intrinsic,
            &TransportSet::default(),
        )
        .expect_err("mismatch");
        assert_eq!(err, DeformError::CaptureMismatch { records: 1, points: 2 });
    }

    #[test]
    fn uncaptured_points_keep_base_position() {
        let rest = unit_quad();
        let deformed = rest.translated([0.0, 0.0, 1.0]);
        let surface = Surface::new(&deformed, SurfaceRole::Deformed).expect("surface");
        let mesh = Mesh::with_points(vec![[0.2, 0.3, 0.4]]);
        let output = deform(
            &[None],
            &mesh,
            &rest,
            &surface,
            &DeformConfig::default(),
            &FrameSource::Intrinsic,
            &TransportSet::default(),
        )
        .expect("deform");
        assert_eq!(output.mesh.positions, mesh.positions);
        assert_eq!((output.deformed, output.skipped), (0, 1));
    }
}
