// src/occlusion_lib/registry.rs

use std::collections::{BTreeMap, BTreeSet};

use glam::Vec2;

use crate::error::LightingError;
use crate::geometry::{circle_intersects_rect, Rect};
use crate::occlusion_lib::los_merge::merge_offsets;
use crate::occlusion_lib::occluder::{Occluder, OccluderId, Orientation};
use crate::occlusion_lib::vessel::{VesselDirectory, VesselId, VesselRelation};

/// The occluders living in one coordinate frame (`None` is the open world).
///
/// `hidden` is scratch space for a single raycast pass: occluders in it did
/// not contribute to the last shadow mesh built against this list.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct OccluderRegistry {
    pub vessel: Option<VesselId>,
    pub members: Vec<OccluderId>,
    pub hidden: BTreeSet<OccluderId>,
}

impl OccluderRegistry {
    pub fn new(vessel: Option<VesselId>) -> Self {
        Self {
            vessel,
            members: Vec::new(),
            hidden: BTreeSet::new(),
        }
    }

    pub fn is_hidden(&self, id: OccluderId) -> bool {
        self.hidden.contains(&id)
    }
}

#[derive(Clone, Debug)]
struct Slot {
    generation: u32,
    occluder: Option<Occluder>,
}

/// Owns every occluder and the per-vessel registries that group them.
///
/// Handles are generational: a slot freed by `remove` is reused with a new
/// generation, so an old `OccluderId` simply stops resolving.
#[derive(Clone, Debug, Default)]
pub struct OcclusionWorld {
    slots: Vec<Slot>,
    free: Vec<u32>,
    registries: BTreeMap<Option<VesselId>, OccluderRegistry>,
    /// Bumped on every geometry change; stored as each occluder's change stamp.
    clock: u64,
    /// Bumped whenever an occluder is added or removed.
    layout_version: u64,
}

impl OcclusionWorld {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.occluder.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clock(&self) -> u64 {
        self.clock
    }

    pub fn layout_version(&self) -> u64 {
        self.layout_version
    }

    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    pub fn get(&self, id: OccluderId) -> Option<&Occluder> {
        self.slots
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.occluder.as_ref())
    }

    fn get_mut(&mut self, id: OccluderId) -> Option<&mut Occluder> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.occluder.as_mut())
    }

    pub fn occluder(&self, id: OccluderId) -> Result<&Occluder, LightingError> {
        self.get(id).ok_or(LightingError::UnknownOccluder(id))
    }

    pub fn contains(&self, id: OccluderId) -> bool {
        self.get(id).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Occluder> {
        self.slots.iter().filter_map(|slot| slot.occluder.as_ref())
    }

    pub fn registry(&self, vessel: Option<VesselId>) -> Option<&OccluderRegistry> {
        self.registries.get(&vessel)
    }

    pub fn registries(&self) -> impl Iterator<Item = &OccluderRegistry> {
        self.registries.values()
    }

    fn allocate(&mut self) -> OccluderId {
        match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.generation = slot.generation.wrapping_add(1);
                OccluderId { index, generation: slot.generation }
            }
            None => {
                self.slots.push(Slot { generation: 0, occluder: None });
                OccluderId {
                    index: (self.slots.len() - 1) as u32,
                    generation: 0,
                }
            }
        }
    }

    /// Creates an occluder from an axis-aligned rectangle in the vessel's local
    /// space. Without an explicit orientation the long side of the rectangle wins.
    pub fn create(
        &mut self,
        vessel: Option<VesselId>,
        rect: Rect,
        orientation: Option<Orientation>,
    ) -> OccluderId {
        let id = self.allocate();
        let stamp = self.tick();
        let occluder = Occluder::from_rect(id, vessel, rect, orientation, stamp);
        self.insert(occluder)
    }

    /// Creates an occluder from four corners given in order around the shape.
    pub fn create_from_corners(
        &mut self,
        vessel: Option<VesselId>,
        corners: [Vec2; 4],
        orientation: Orientation,
    ) -> OccluderId {
        let id = self.allocate();
        let stamp = self.tick();
        let occluder = Occluder::from_corners(id, vessel, corners, orientation, stamp);
        self.insert(occluder)
    }

    fn insert(&mut self, occluder: Occluder) -> OccluderId {
        let id = occluder.id;
        let vessel = occluder.vessel;
        self.slots[id.index as usize].occluder = Some(occluder);
        self.layout_version += 1;

        let registry = self.registries.entry(vessel).or_insert_with(|| {
            log::debug!("Creating occluder registry for vessel {:?}", vessel);
            OccluderRegistry::new(vessel)
        });
        let others = registry.members.clone();
        registry.members.push(id);

        for other in others {
            self.merge_and_propagate(id, other);
            self.merge_and_propagate(other, id);
        }
        id
    }

    pub fn translate(&mut self, id: OccluderId, delta: Vec2) -> Result<(), LightingError> {
        if delta == Vec2::ZERO {
            return Ok(());
        }
        let stamp = self.tick();
        self.get_mut(id)
            .ok_or(LightingError::UnknownOccluder(id))?
            .translate(delta, stamp);
        self.relink_moved(id);
        Ok(())
    }

    pub fn rotate(&mut self, id: OccluderId, pivot: Vec2, angle: f32) -> Result<(), LightingError> {
        let stamp = self.tick();
        self.get_mut(id)
            .ok_or(LightingError::UnknownOccluder(id))?
            .rotate(pivot, angle, stamp);
        self.relink_moved(id);
        Ok(())
    }

    pub fn set_vertices(&mut self, id: OccluderId, corners: [Vec2; 4]) -> Result<(), LightingError> {
        let stamp = self.tick();
        self.get_mut(id)
            .ok_or(LightingError::UnknownOccluder(id))?
            .set_vertices(corners, stamp);
        self.relink_moved(id);
        Ok(())
    }

    pub fn set_enabled(&mut self, id: OccluderId, enabled: bool) -> Result<(), LightingError> {
        let stamp = self.clock + 1;
        let occluder = self.get_mut(id).ok_or(LightingError::UnknownOccluder(id))?;
        if occluder.enabled == enabled {
            return Ok(());
        }
        occluder.enabled = enabled;
        occluder.last_vertex_change = stamp;
        self.clock = stamp;
        // in-range lists only hold enabled occluders
        self.layout_version += 1;
        Ok(())
    }

    /// Removes an occluder and re-merges every neighbor it was joined to.
    pub fn remove(&mut self, id: OccluderId) -> Result<Occluder, LightingError> {
        let occluder = self
            .slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.occluder.take())
            .ok_or(LightingError::UnknownOccluder(id))?;
        self.free.push(id.index);
        self.layout_version += 1;
        self.tick();

        if let Some(registry) = self.registries.get_mut(&occluder.vessel) {
            registry.members.retain(|m| *m != id);
            registry.hidden.remove(&id);
            if registry.members.is_empty() {
                log::debug!("Removing empty occluder registry for vessel {:?}", occluder.vessel);
                self.registries.remove(&occluder.vessel);
            }
        }

        for neighbor in occluder.overlapping.iter().copied() {
            if let Some(n) = self.get_mut(neighbor) {
                n.overlapping.remove(&id);
            }
            self.relink(neighbor);
        }
        Ok(occluder)
    }

    /// Drops every merge in the vessel's registry and re-merges all pairs.
    pub fn recalculate_all(&mut self, vessel: Option<VesselId>) {
        let Some(members) = self.registries.get(&vessel).map(|r| r.members.clone()) else {
            return;
        };
        for id in &members {
            if let Some(o) = self.get_mut(*id) {
                o.reset_los_offsets();
                o.overlapping.clear();
            }
        }
        for (i, a) in members.iter().enumerate() {
            for b in &members[i + 1..] {
                self.merge_and_propagate(*a, *b);
                self.merge_and_propagate(*b, *a);
            }
        }
    }

    /// Occluders whose bounds reach within `radius` of `point`.
    ///
    /// `point` is in `reference`'s frame; `relation` decides which vessels'
    /// occluders are considered at all.
    pub fn occluders_within(
        &self,
        point: Vec2,
        radius: f32,
        reference: Option<VesselId>,
        relation: VesselRelation,
        vessels: &dyn VesselDirectory,
    ) -> Vec<OccluderId> {
        let mut found = Vec::new();
        for registry in self.registries.values() {
            if !relation.accepts(vessels, reference, registry.vessel) {
                continue;
            }
            let local = point + vessels.frame_offset(reference, registry.vessel);
            for id in &registry.members {
                if let Some(o) = self.get(*id) {
                    if o.enabled && circle_intersects_rect(local, radius, &o.bounds()) {
                        found.push(*id);
                    }
                }
            }
        }
        found
    }

    pub(crate) fn registry_mut(&mut self, vessel: Option<VesselId>) -> Option<&mut OccluderRegistry> {
        self.registries.get_mut(&vessel)
    }

    /// One merge of `own` towards `neighbor`. Returns whether they now overlap.
    fn merge_into(&mut self, own: OccluderId, neighbor: OccluderId) -> bool {
        let offsets = match (self.get(own), self.get(neighbor)) {
            (Some(a), Some(b)) => merge_offsets(a, b),
            _ => return false,
        };
        if offsets.iter().all(Option::is_none) {
            return false;
        }
        if let Some(a) = self.get_mut(own) {
            for (i, offset) in offsets.iter().enumerate() {
                if let Some(offset) = offset {
                    a.offer_los_offset(i, *offset);
                }
            }
            a.overlapping.insert(neighbor);
        }
        if let Some(b) = self.get_mut(neighbor) {
            b.overlapping.insert(own);
        }
        true
    }

    /// Merges and then lets `own`'s existing neighbors re-merge against it once.
    fn merge_and_propagate(&mut self, own: OccluderId, neighbor: OccluderId) {
        if !self.merge_into(own, neighbor) {
            return;
        }
        let others: Vec<OccluderId> = match self.get(own) {
            Some(o) => o.overlapping.iter().copied().filter(|c| *c != neighbor).collect(),
            None => return,
        };
        for other in others {
            self.merge_into(other, own);
        }
    }

    /// Cuts all of `id`'s merge links in both directions.
    fn detach_links(&mut self, id: OccluderId) -> BTreeSet<OccluderId> {
        let former = match self.get_mut(id) {
            Some(o) => std::mem::take(&mut o.overlapping),
            None => return BTreeSet::new(),
        };
        for n in &former {
            if let Some(other) = self.get_mut(*n) {
                other.overlapping.remove(&id);
            }
        }
        former
    }

    fn members_of(&self, id: OccluderId) -> Vec<OccluderId> {
        self.get(id)
            .and_then(|o| self.registries.get(&o.vessel))
            .map(|r| r.members.iter().copied().filter(|m| *m != id).collect())
            .unwrap_or_default()
    }

    /// Resets `id`'s offsets and merges it again with everything in its registry.
    fn relink(&mut self, id: OccluderId) {
        self.detach_links(id);
        if let Some(o) = self.get_mut(id) {
            o.reset_los_offsets();
        }
        for other in self.members_of(id) {
            self.merge_into(id, other);
            self.merge_into(other, id);
        }
    }

    fn relink_moved(&mut self, id: OccluderId) {
        let former = self.detach_links(id);
        for neighbor in former {
            self.relink(neighbor);
        }
        for other in self.members_of(id) {
            self.merge_and_propagate(id, other);
            self.merge_and_propagate(other, id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::occlusion_lib::vessel::{VesselInfo, VesselTable};

    fn rect(min: (f32, f32), max: (f32, f32)) -> Rect {
        Rect::new(Vec2::new(min.0, min.1), Vec2::new(max.0, max.1))
    }

    #[test]
    fn registry_is_created_lazily_and_dropped_when_empty() {
        let mut world = OcclusionWorld::new();
        assert!(world.registry(Some(1)).is_none());
        let id = world.create(Some(1), rect((0.0, 0.0), (100.0, 20.0)), None);
        assert_eq!(world.registry(Some(1)).unwrap().members, vec![id]);
        world.remove(id).unwrap();
        assert!(world.registry(Some(1)).is_none());
        assert!(world.is_empty());
    }

    #[test]
    fn stale_handles_do_not_resolve() {
        let mut world = OcclusionWorld::new();
        let first = world.create(None, rect((0.0, 0.0), (100.0, 20.0)), None);
        world.remove(first).unwrap();
        let second = world.create(None, rect((0.0, 0.0), (100.0, 20.0)), None);
        assert_eq!(first.index(), second.index());
        assert_ne!(first, second);
        assert!(world.get(first).is_none());
        assert!(matches!(world.remove(first), Err(LightingError::UnknownOccluder(_))));
    }

    #[test]
    fn adjacent_walls_merge_on_creation() {
        let mut world = OcclusionWorld::new();
        let a = world.create(None, rect((-100.0, -10.0), (-6.0, 10.0)), None);
        let b = world.create(None, rect((6.0, -10.0), (100.0, 10.0)), None);
        assert!(world.get(a).unwrap().overlapping().contains(&b));
        assert!(world.get(b).unwrap().overlapping().contains(&a));
        assert_eq!(world.get(a).unwrap().los_segment()[1], Vec2::ZERO);
        assert_eq!(world.get(b).unwrap().los_segment()[0], Vec2::ZERO);
    }

    #[test]
    fn moving_away_clears_the_merge() {
        let mut world = OcclusionWorld::new();
        let a = world.create(None, rect((-100.0, -10.0), (-6.0, 10.0)), None);
        let b = world.create(None, rect((6.0, -10.0), (100.0, 10.0)), None);
        let before = world.clock();
        world.translate(b, Vec2::new(200.0, 0.0)).unwrap();
        assert!(world.get(a).unwrap().overlapping().is_empty());
        assert!(world.get(b).unwrap().overlapping().is_empty());
        assert_eq!(world.get(a).unwrap().los_offsets(), [None, None]);
        assert!(world.get(b).unwrap().last_vertex_change() > before);
    }

    #[test]
    fn radius_query_respects_vessel_relation() {
        let mut vessels = VesselTable::new();
        vessels.insert(1, VesselInfo::new(Vec2::new(1000.0, 0.0), rect((-500.0, -500.0), (500.0, 500.0))));
        let mut world = OcclusionWorld::new();
        let outside = world.create(None, rect((990.0, -10.0), (1010.0, 10.0)), None);
        let inside = world.create(Some(1), rect((-10.0, -10.0), (10.0, 10.0)), None);

        // both sit at world (1000, 0)
        let mut any = world.occluders_within(Vec2::new(1000.0, 0.0), 5.0, None, VesselRelation::Any, &vessels);
        any.sort();
        let mut expected = vec![outside, inside];
        expected.sort();
        assert_eq!(any, expected);

        let same = world.occluders_within(Vec2::ZERO, 5.0, Some(1), VesselRelation::Same, &vessels);
        assert_eq!(same, vec![inside]);
    }

    #[test]
    fn disabled_occluders_are_skipped_by_queries() {
        let vessels = VesselTable::new();
        let mut world = OcclusionWorld::new();
        let id = world.create(None, rect((-10.0, -10.0), (10.0, 10.0)), None);
        world.set_enabled(id, false).unwrap();
        assert!(world
            .occluders_within(Vec2::ZERO, 5.0, None, VesselRelation::Any, &vessels)
            .is_empty());
    }
}
