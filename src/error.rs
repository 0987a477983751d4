// src/error.rs

use glam::Vec2;
use thiserror::Error;

use crate::lighting_lib::light::LightId;
use crate::occlusion_lib::occluder::OccluderId;

/// Errors raised by the occlusion and lighting pipeline.
///
/// None of these are fatal to a frame: the orchestrator logs them and keeps
/// whatever mesh the affected light had before.
#[derive(Error, Debug)]
pub enum LightingError {
    /// A ray cast from the light did not reach any segment, not even the
    /// synthetic boundary square.
    #[error("raycast from {origin} did not hit any segment")]
    RaycastMiss { origin: Vec2 },

    /// Boundary points could not be ordered around the light (non-finite input).
    #[error("could not order {} light volume points around {light_pos}: {points:?}", points.len())]
    DegenerateGeometry { light_pos: Vec2, points: Vec<Vec2> },

    /// The light volume would not fit in a 16-bit index buffer.
    #[error("light volume needs {0} vertices, more than a 16-bit index buffer can address")]
    MeshTooLarge(usize),

    #[error("unknown occluder {0:?}")]
    UnknownOccluder(OccluderId),

    #[error("unknown light {0:?}")]
    UnknownLight(LightId),

    /// The background raycast thread is gone.
    #[error("raycast worker is not running")]
    WorkerUnavailable,

    #[error("invalid lighting config: {0}")]
    Config(#[from] serde_json::Error),

    #[error("could not read lighting config: {0}")]
    Io(#[from] std::io::Error),
}
