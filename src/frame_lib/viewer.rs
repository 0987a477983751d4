// src/frame_lib/viewer.rs

use std::collections::BTreeMap;

use glam::Vec2;

use crate::geometry::Rect;
use crate::lighting_lib::light::BodyId;
use crate::occlusion_lib::vessel::VesselId;

/// The entity whose sight the LOS mask is built for. Positions are in world space.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Viewer {
    /// Collider (body) position.
    pub position: Vec2,
    /// Head position, if the entity has one.
    pub head: Option<Vec2>,
    pub vessel: Option<VesselId>,
}

impl Viewer {
    pub fn new(position: Vec2, vessel: Option<VesselId>) -> Self {
        Self {
            position,
            head: None,
            vessel,
        }
    }

    pub fn with_head(mut self, head: Vec2) -> Self {
        self.head = Some(head);
        self
    }
}

/// The camera's visible area in world space.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ViewRect {
    pub center: Vec2,
    pub size: Vec2,
}

impl ViewRect {
    pub fn new(center: Vec2, size: Vec2) -> Self {
        Self { center, size }
    }

    pub fn width(&self) -> f32 {
        self.size.x
    }

    pub fn rect(&self) -> Rect {
        Rect::from_center(self.center, self.size * 0.5)
    }
}

/// Supplies the draw positions of physics bodies that lights are attached to.
pub trait BodyPositions {
    fn draw_position(&self, body: BodyId) -> Option<Vec2>;
}

impl BodyPositions for BTreeMap<BodyId, Vec2> {
    fn draw_position(&self, body: BodyId) -> Option<Vec2> {
        self.get(&body).copied()
    }
}

/// For scenes without any simulated bodies.
pub struct NoBodies;

impl BodyPositions for NoBodies {
    fn draw_position(&self, _body: BodyId) -> Option<Vec2> {
        None
    }
}
