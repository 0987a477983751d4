// src/lighting_lib/hull_cache.rs

use std::collections::{BTreeMap, BTreeSet};

use glam::Vec2;

use crate::geometry::circle_intersects_rect;
use crate::occlusion_lib::occluder::{OccluderId, Segment};
use crate::occlusion_lib::registry::{OccluderRegistry, OcclusionWorld};
use crate::occlusion_lib::vessel::{VesselDirectory, VesselId};

/// Relative vessel motion beyond this forces a rebuild.
pub const VESSEL_DRIFT_THRESHOLD: f32 = 5.0;

/// Where a light sits when its occluder lists are refreshed.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LightPlacement {
    pub position: Vec2,
    pub vessel: Option<VesselId>,
    /// Reach of the light's texture, which may exceed its nominal range.
    pub reach: f32,
    /// World clock value when the light's mesh was last rebuilt.
    pub calculated_at: u64,
}

/// A light's private copy of the occluders within its reach, one list per vessel.
#[derive(Clone, Debug, Default)]
pub struct HullCache {
    lists: BTreeMap<Option<VesselId>, OccluderRegistry>,
    up_to_date: BTreeSet<Option<VesselId>>,
    drift: BTreeMap<VesselId, Vec2>,
    layout_version: Option<u64>,
}

impl HullCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lists(&self) -> impl Iterator<Item = &OccluderRegistry> {
        self.lists.values()
    }

    pub fn occluder_count(&self) -> usize {
        self.lists.values().map(|l| l.members.len()).sum()
    }

    pub fn is_hidden(&self, id: OccluderId) -> bool {
        self.lists.values().any(|l| l.is_hidden(id))
    }

    /// Forces every list to be re-gathered on the next check.
    pub fn invalidate(&mut self) {
        self.up_to_date.clear();
    }

    pub fn clear_hidden(&mut self) {
        for list in self.lists.values_mut() {
            list.hidden.clear();
        }
    }

    pub fn reset(&mut self) {
        self.lists.clear();
        self.up_to_date.clear();
        self.drift.clear();
        self.layout_version = None;
    }

    /// Hides every cached occluder except those that shaped the last mesh.
    pub fn hide_unused(&mut self, used: &BTreeSet<OccluderId>) {
        for list in self.lists.values_mut() {
            list.hidden = list
                .members
                .iter()
                .filter(|id| !used.contains(id))
                .copied()
                .collect();
        }
    }

    /// Refreshes the in-range lists and reports whether the light's mesh is stale.
    pub fn check(
        &mut self,
        light: &LightPlacement,
        world: &OcclusionWorld,
        vessels: &dyn VesselDirectory,
    ) -> bool {
        if self.layout_version != Some(world.layout_version()) {
            self.layout_version = Some(world.layout_version());
            self.up_to_date.clear();
        }

        let mut stale = false;
        let keys = vessels
            .vessel_ids()
            .into_iter()
            .map(Some)
            .chain(std::iter::once(None));
        for key in keys {
            stale |= self.check_vessel(key, light, world, vessels);
        }
        stale
    }

    fn check_vessel(
        &mut self,
        key: Option<VesselId>,
        light: &LightPlacement,
        world: &OcclusionWorld,
        vessels: &dyn VesselDirectory,
    ) -> bool {
        let mut stale = false;
        if !self.lists.contains_key(&key) {
            self.lists.insert(key, OccluderRegistry::new(key));
            stale = true;
        }
        if let Some(list) = self.lists.get(&key) {
            stale |= list.members.iter().any(|id| match world.get(*id) {
                Some(o) => o.last_vertex_change() > light.calculated_at && !list.is_hidden(*id),
                None => !list.is_hidden(*id),
            });
        }

        match (light.vessel, key) {
            (None, None) => {
                if !self.up_to_date.contains(&None) {
                    stale |= self.refresh(None, light.position, light.reach, world);
                }
            }
            (None, Some(v)) => {
                let local = light.position - vessels.position(Some(v));
                if !self.reaches_vessel(v, local, light.reach, vessels) {
                    stale |= self.drop_list(key);
                    return stale;
                }
                stale |= self.refresh(key, local, light.reach, world);
            }
            // occluders outside any vessel do not shadow lights inside one
            (Some(_), None) => {}
            (Some(own), Some(v)) if own == v => {
                if !self.up_to_date.contains(&key) {
                    stale |= self.refresh(key, light.position, light.reach, world);
                }
            }
            (Some(own), Some(v)) => {
                if vessels.is_docked(v, own) && self.up_to_date.contains(&key) {
                    return stale;
                }
                let local = light.position + vessels.frame_offset(Some(own), Some(v));
                if !self.reaches_vessel(v, local, light.reach, vessels) {
                    stale |= self.drop_list(key);
                    return stale;
                }
                let diff = vessels.position(Some(own)) - vessels.position(Some(v));
                match self.drift.get(&v) {
                    Some(prev) if prev.distance_squared(diff) <= VESSEL_DRIFT_THRESHOLD * VESSEL_DRIFT_THRESHOLD => {}
                    _ => {
                        self.drift.insert(v, diff);
                        stale = true;
                    }
                }
                stale |= self.refresh(key, local, light.reach, world);
            }
        }
        stale
    }

    fn reaches_vessel(&self, vessel: VesselId, local: Vec2, reach: f32, vessels: &dyn VesselDirectory) -> bool {
        vessels
            .vessel(vessel)
            .map_or(false, |info| circle_intersects_rect(local, reach, &info.local_borders()))
    }

    fn drop_list(&mut self, key: Option<VesselId>) -> bool {
        match self.lists.get_mut(&key) {
            Some(list) if !list.members.is_empty() => {
                list.members.clear();
                list.hidden.clear();
                true
            }
            _ => false,
        }
    }

    /// Re-gathers `key`'s in-range occluders around `local`. Returns true if an
    /// occluder joined the list or a visible one left it.
    fn refresh(&mut self, key: Option<VesselId>, local: Vec2, reach: f32, world: &OcclusionWorld) -> bool {
        let members: Vec<OccluderId> = world
            .registry(key)
            .map(|registry| {
                registry
                    .members
                    .iter()
                    .copied()
                    .filter(|id| {
                        world
                            .get(*id)
                            .map_or(false, |o| o.is_enabled() && circle_intersects_rect(local, reach, &o.bounds()))
                    })
                    .collect()
            })
            .unwrap_or_default();

        self.up_to_date.insert(key);
        let Some(list) = self.lists.get_mut(&key) else {
            return false;
        };
        let lost_visible = list
            .members
            .iter()
            .any(|id| !members.contains(id) && !list.hidden.contains(id));
        let gained = members.iter().any(|id| !list.members.contains(id));
        list.hidden.retain(|id| members.contains(id));
        list.members = members;
        lost_visible || gained
    }

    /// Light-facing sides of every visible cached occluder, in the light's frame.
    pub fn gather_segments(
        &self,
        light: &LightPlacement,
        world: &OcclusionWorld,
        vessels: &dyn VesselDirectory,
    ) -> Vec<Segment> {
        let mut segments = Vec::new();
        for list in self.lists.values() {
            let offset = vessels.frame_offset(list.vessel, light.vessel);
            for id in &list.members {
                if list.is_hidden(*id) {
                    continue;
                }
                match world.get(*id) {
                    Some(o) if o.is_enabled() => segments.extend(o.facing_segments(light.position, offset)),
                    _ => {}
                }
            }
        }
        segments
    }
}
