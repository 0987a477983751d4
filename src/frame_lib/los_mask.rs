// src/frame_lib/los_mask.rs

use glam::Vec2;

use crate::config::{LightingConfig, LosMode};
use crate::frame_lib::viewer::{ViewRect, Viewer};
use crate::lighting_lib::vertex::{LightVertex, MaskVertex};
use crate::occlusion_lib::registry::OcclusionWorld;
use crate::occlusion_lib::vessel::{VesselDirectory, VesselRelation};

/// Combined sight-blocking geometry for the current viewer, in world space.
///
/// `hard` is a plain triangle list; `penumbra` is a triangle list textured
/// with the penumbra gradient.
#[derive(Clone, Debug, Default)]
pub struct LosMask {
    hard: Vec<MaskVertex>,
    penumbra: Vec<LightVertex>,
    eye: Option<Vec2>,
}

impl LosMask {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hard_vertices(&self) -> &[MaskVertex] {
        &self.hard
    }

    pub fn penumbra_vertices(&self) -> &[LightVertex] {
        &self.penumbra
    }

    /// Point the mask was built around, if one was built this frame.
    pub fn eye(&self) -> Option<Vec2> {
        self.eye
    }

    pub fn is_empty(&self) -> bool {
        self.hard.is_empty() && self.penumbra.is_empty()
    }

    pub fn clear(&mut self) {
        self.hard.clear();
        self.penumbra.clear();
        self.eye = None;
    }

    /// Rebuilds the mask for `viewer`. Leaves it empty when LOS is off or
    /// there is nobody to see through.
    pub fn update(
        &mut self,
        config: &LightingConfig,
        world: &OcclusionWorld,
        vessels: &dyn VesselDirectory,
        viewer: Option<&Viewer>,
        view: &ViewRect,
    ) {
        self.clear();
        if !config.los_active() {
            return;
        }
        let Some(viewer) = viewer else {
            return;
        };

        let range = view.width() * config.los_range_factor;
        let eye = eye_position(world, vessels, viewer, range);
        self.eye = Some(eye);

        let alpha = match config.los_mode {
            LosMode::Opaque => 1.0,
            _ => config.los_alpha.clamp(0.0, 1.0),
        };
        let color = [0.0, 0.0, 0.0, alpha];
        let view_rect = view.rect();

        for id in world.occluders_within(eye, range, None, VesselRelation::Any, vessels) {
            let Some(occluder) = world.get(id) else {
                continue;
            };
            let vessel_pos = vessels.position(occluder.vessel());
            let draw_pos = vessels.draw_position(occluder.vessel());
            if !occluder.bounds().translate(draw_pos).intersects(&view_rect) {
                continue;
            }
            let Some(shadow) = occluder.los_shadow(eye - vessel_pos) else {
                continue;
            };
            self.hard
                .extend(shadow.hard.iter().map(|p| MaskVertex::new(*p + draw_pos, color)));
            self.penumbra.extend(
                shadow
                    .penumbra
                    .iter()
                    .map(|p| LightVertex::new(p.position + draw_pos, color, p.uv)),
            );
        }
    }
}

/// The viewer's head, unless the sightline from body to head passes through
/// an LOS line; then the body.
fn eye_position(world: &OcclusionWorld, vessels: &dyn VesselDirectory, viewer: &Viewer, range: f32) -> Vec2 {
    let Some(head) = viewer.head else {
        return viewer.position;
    };
    let blocked = world
        .occluders_within(viewer.position, range, None, VesselRelation::Any, vessels)
        .into_iter()
        .filter_map(|id| world.get(id))
        .any(|o| {
            let offset = vessels.position(o.vessel());
            o.los_crosses(viewer.position - offset, head - offset)
        });
    if blocked {
        viewer.position
    } else {
        head
    }
}
