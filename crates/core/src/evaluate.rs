use tracing::{debug, warn};

use crate::capture::capture;
use crate::config::DeformConfig;
use crate::deform::deform;
use crate::error::{DeformError, SurfaceRole};
use crate::frame::{DriveAttributes, FrameSource};
use crate::mesh::Mesh;
use crate::state::{CaptureState, ReinitKey};
use crate::surface::Surface;
use crate::transport::TransportSet;

/// Borrowed inputs of one invocation. Generations change whenever the caller edits
/// the corresponding geometry.
#[derive(Debug, Clone, Copy)]
pub struct DeformInputs<'a> {
    pub mesh: &'a Mesh,
    pub rest: &'a Mesh,
    pub deformed: &'a Mesh,
    pub mesh_generation: u64,
    pub rest_generation: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeformStats {
    pub captured: usize,
    pub deformed: usize,
    pub skipped: usize,
}

#[derive(Debug, Clone)]
pub struct Evaluation {
    pub mesh: Mesh,
    pub state: CaptureState,
    pub recaptured: bool,
    pub stats: DeformStats,
}

pub fn evaluate(
    inputs: &DeformInputs<'_>,
    config: &DeformConfig,
    previous: Option<&CaptureState>,
) -> Result<Evaluation, DeformError> {
    match evaluate_checked(inputs, config, previous) {
        Ok(evaluation) => Ok(evaluation),
        Err(err) => {
            warn!("point deform skipped: {err}");
            Err(err)
        }
    }
}

fn evaluate_checked(
    inputs: &DeformInputs<'_>,
    config: &DeformConfig,
    previous: Option<&CaptureState>,
) -> Result<Evaluation, DeformError> {
    let DeformInputs {
        mesh,
        rest,
        deformed,
        ..
    } = *inputs;
    if mesh.point_count() == 0 {
        return Err(DeformError::EmptyInput {
            surface: SurfaceRole::Mesh,
        });
    }
    if rest.primitive_count() == 0 {
        return Err(DeformError::EmptyInput {
            surface: SurfaceRole::Rest,
        });
    }
    if deformed.point_count() == 0 {
        return Err(DeformError::EmptyInput {
            surface: SurfaceRole::Deformed,
        });
    }
    let rest_surface = Surface::new(rest, SurfaceRole::Rest)?;
    let deformed_surface = Surface::new(deformed, SurfaceRole::Deformed)?;
    rest.compare_topology(deformed)?;

    let (rest_source, deformed_source) = if config.drive_by_attributes {
        let rest_drive = DriveAttributes::resolve(
            &rest_surface,
            SurfaceRole::Rest,
            &config.normal_attribute,
            &config.up_attribute,
        )?;
        let deformed_drive = DriveAttributes::resolve(
            &deformed_surface,
            SurfaceRole::Deformed,
            &config.normal_attribute,
            &config.up_attribute,
        )?;
        (
            FrameSource::Driven(rest_drive),
            FrameSource::Driven(deformed_drive),
        )
    } else {
        (FrameSource::Intrinsic, FrameSource::Intrinsic)
    };
    let transport = TransportSet::resolve(mesh, &config.attributes_to_transport);

    let key = ReinitKey::new(config, inputs.rest_generation, inputs.mesh_generation);
    let reusable = previous.filter(|state| {
        state.is_valid_for(&key, mesh.point_count())
            && (transport.is_empty() || state.has_rotations())
    });
    let (state, recaptured) = match reusable {
        Some(state) => (state.clone(), false),
        None => {
            let output = capture(mesh, &rest_surface, config, &rest_source, !transport.is_empty())?;
            (
                CaptureState {
                    key,
                    records: output.records,
                },
                true,
            )
        }
    };

    let output = deform(
        &state.records,
        mesh,
        rest,
        &deformed_surface,
        config,
        &deformed_source,
        &transport,
    )?;
    let stats = DeformStats {
        captured: state.captured_count(),
        deformed: output.deformed,
        skipped: output.skipped,
    };
    debug!(
        "point deform: recaptured={recaptured} captured={} deformed={} skipped={}",
        stats.captured, stats.deformed, stats.skipped
    );

    Ok(Evaluation {
        mesh: output.mesh,
        state,
        recaptured,
        stats,
    })
}
