// src/occlusion_lib/vessel.rs

use std::collections::BTreeMap;

use glam::Vec2;

use crate::geometry::Rect;

// Type aliases for IDs
pub type VesselId = u32;

/// A vessel's placement as reported by the simulation each frame.
#[derive(Clone, Debug, PartialEq)]
pub struct VesselInfo {
    /// Translation from vessel-local to world coordinates.
    pub position: Vec2,
    /// Interpolated position used for drawing.
    pub draw_position: Vec2,
    /// Offset used when the vessel is laid out detached from its world position.
    pub hidden_position: Vec2,
    /// Vessel extents, relative to `hidden_position`.
    pub borders: Rect,
    pub docked_to: Vec<VesselId>,
}

impl VesselInfo {
    pub fn new(position: Vec2, borders: Rect) -> Self {
        Self {
            position,
            draw_position: position,
            hidden_position: Vec2::ZERO,
            borders,
            docked_to: Vec::new(),
        }
    }

    /// Borders in the vessel's local (occluder) space.
    pub fn local_borders(&self) -> Rect {
        self.borders.translate(self.hidden_position)
    }
}

/// Read-only view of every vessel the lighting system may encounter.
pub trait VesselDirectory {
    fn vessel(&self, id: VesselId) -> Option<&VesselInfo>;

    fn vessel_ids(&self) -> Vec<VesselId>;

    fn position(&self, vessel: Option<VesselId>) -> Vec2 {
        vessel
            .and_then(|id| self.vessel(id))
            .map_or(Vec2::ZERO, |v| v.position)
    }

    fn draw_position(&self, vessel: Option<VesselId>) -> Vec2 {
        vessel
            .and_then(|id| self.vessel(id))
            .map_or(Vec2::ZERO, |v| v.draw_position)
    }

    fn is_docked(&self, a: VesselId, b: VesselId) -> bool {
        self.vessel(a).map_or(false, |v| v.docked_to.contains(&b))
            || self.vessel(b).map_or(false, |v| v.docked_to.contains(&a))
    }

    /// Offset that converts coordinates in frame `from` into frame `to`.
    fn frame_offset(&self, from: Option<VesselId>, to: Option<VesselId>) -> Vec2 {
        if from == to {
            return Vec2::ZERO;
        }
        self.position(from) - self.position(to)
    }
}

#[derive(Clone, Debug, Default)]
pub struct VesselTable {
    vessels: BTreeMap<VesselId, VesselInfo>,
}

impl VesselTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: VesselId, info: VesselInfo) {
        self.vessels.insert(id, info);
    }

    pub fn remove(&mut self, id: VesselId) -> Option<VesselInfo> {
        self.vessels.remove(&id)
    }

    pub fn get_mut(&mut self, id: VesselId) -> Option<&mut VesselInfo> {
        self.vessels.get_mut(&id)
    }

    pub fn set_position(&mut self, id: VesselId, position: Vec2) {
        if let Some(v) = self.vessels.get_mut(&id) {
            v.position = position;
            v.draw_position = position;
        }
    }

    pub fn dock(&mut self, a: VesselId, b: VesselId) {
        if let Some(v) = self.vessels.get_mut(&a) {
            if !v.docked_to.contains(&b) {
                v.docked_to.push(b);
            }
        }
        if let Some(v) = self.vessels.get_mut(&b) {
            if !v.docked_to.contains(&a) {
                v.docked_to.push(a);
            }
        }
    }
}

impl VesselDirectory for VesselTable {
    fn vessel(&self, id: VesselId) -> Option<&VesselInfo> {
        self.vessels.get(&id)
    }

    fn vessel_ids(&self) -> Vec<VesselId> {
        self.vessels.keys().copied().collect()
    }
}

/// Which vessels a radius query accepts, relative to a reference vessel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VesselRelation {
    Same,
    SameOrDocked,
    Any,
}

impl VesselRelation {
    pub fn accepts(
        &self,
        vessels: &dyn VesselDirectory,
        reference: Option<VesselId>,
        candidate: Option<VesselId>,
    ) -> bool {
        match self {
            VesselRelation::Any => true,
            VesselRelation::Same => reference == candidate,
            VesselRelation::SameOrDocked => match (reference, candidate) {
                (Some(a), Some(b)) => a == b || vessels.is_docked(a, b),
                (a, b) => a == b,
            },
        }
    }
}
