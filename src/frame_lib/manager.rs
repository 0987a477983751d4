// src/frame_lib/manager.rs

use std::collections::BTreeMap;

use glam::{Affine2, Vec2};

use crate::config::LightingConfig;
use crate::error::LightingError;
use crate::frame_lib::los_mask::LosMask;
use crate::frame_lib::viewer::{BodyPositions, ViewRect, Viewer};
use crate::frame_lib::worker::{RaycastJob, RaycastResult, RaycastWorker};
use crate::geometry::circle_intersects_rect;
use crate::lighting_lib::light::{Light, LightId, LightParams, SpriteQuad};
use crate::occlusion_lib::registry::OcclusionWorld;
use crate::occlusion_lib::vessel::{VesselDirectory, VesselId};

/// Priority factor for lights in the viewer's vessel.
pub const SAME_VESSEL_PRIORITY: f32 = 2.0;
/// Priority factor for shadow-casting lights.
pub const SHADOW_PRIORITY: f32 = 1.5;
/// Lights fainter than this are never active.
const MIN_ALPHA: f32 = 1.0 / 255.0;

/// Everything the orchestrator reads from the simulation for one frame.
pub struct FrameContext<'a> {
    pub occluders: &'a OcclusionWorld,
    pub vessels: &'a dyn VesselDirectory,
    pub bodies: &'a dyn BodyPositions,
    pub view: ViewRect,
    pub viewer: Option<Viewer>,
    /// Simulation time in seconds.
    pub time: f64,
    /// Editors show every light regardless of the volume limit.
    pub in_editor: bool,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameStats {
    /// Lights that passed the visibility filter.
    pub visible: usize,
    /// Lights kept after the volume limit.
    pub active: usize,
    pub culled: usize,
    /// Rebuilds run on the frame thread.
    pub recalculated: usize,
    /// Rebuilds handed to the worker.
    pub submitted: usize,
    /// Worker results applied at the start of the frame.
    pub applied: usize,
    pub failures: usize,
}

impl FrameStats {
    /// Full rebuilds started this frame, on either thread.
    pub fn rebuilds(&self) -> usize {
        self.recalculated + self.submitted
    }
}

/// A light ready to be drawn by the renderer.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum LightDraw {
    /// Shadow mesh of `light` placed in the world by `transform`.
    Volume {
        light: LightId,
        transform: Affine2,
        color: [f32; 3],
    },
    Sprite { light: LightId, quad: SpriteQuad },
}

/// Owns every light and decides, each frame, which of them are shown and
/// which get their shadow mesh rebuilt.
pub struct LightManager {
    config: LightingConfig,
    lights: BTreeMap<LightId, Light>,
    next_id: LightId,
    active: Vec<LightId>,
    worker: Option<RaycastWorker>,
    worker_failed: bool,
    los_mask: LosMask,
    stats: FrameStats,
}

impl LightManager {
    pub fn new(config: LightingConfig) -> Self {
        Self {
            config,
            lights: BTreeMap::new(),
            next_id: 0,
            active: Vec::new(),
            worker: None,
            worker_failed: false,
            los_mask: LosMask::new(),
            stats: FrameStats::default(),
        }
    }

    pub fn config(&self) -> &LightingConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: LightingConfig) {
        self.config = config;
    }

    pub fn add_light(&mut self, position: Vec2, vessel: Option<VesselId>, params: LightParams) -> LightId {
        let id = self.next_id;
        self.next_id += 1;
        self.lights.insert(id, Light::new(id, position, vessel, params));
        id
    }

    /// Removes a light. A worker job still in flight for it finishes and is discarded.
    pub fn remove_light(&mut self, id: LightId) -> Result<Light, LightingError> {
        self.active.retain(|a| *a != id);
        self.lights.remove(&id).ok_or(LightingError::UnknownLight(id))
    }

    pub fn light(&self, id: LightId) -> Option<&Light> {
        self.lights.get(&id)
    }

    pub fn light_mut(&mut self, id: LightId) -> Result<&mut Light, LightingError> {
        self.lights.get_mut(&id).ok_or(LightingError::UnknownLight(id))
    }

    pub fn lights(&self) -> impl Iterator<Item = &Light> {
        self.lights.values()
    }

    pub fn len(&self) -> usize {
        self.lights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lights.is_empty()
    }

    /// This frame's active lights, highest priority first.
    pub fn active_lights(&self) -> &[LightId] {
        &self.active
    }

    pub fn los_mask(&self) -> &LosMask {
        &self.los_mask
    }

    pub fn stats(&self) -> FrameStats {
        self.stats
    }

    /// Forces every light to re-gather occluders and rebuild after a level load.
    pub fn on_map_loaded(&mut self) {
        for light in self.lights.values_mut() {
            light.mark_needs_hull_check();
            light.mark_dirty();
        }
    }

    /// Drops every light's cached state.
    pub fn reset_all(&mut self) {
        for light in self.lights.values_mut() {
            light.reset();
        }
    }

    pub fn update(&mut self, ctx: &FrameContext) -> FrameStats {
        let mut stats = FrameStats::default();
        self.apply_worker_results(&mut stats);

        if !self.config.lighting_enabled {
            self.active.clear();
            self.los_mask.clear();
            self.stats = stats;
            return stats;
        }

        for light in self.lights.values_mut() {
            light.update(ctx.time);
            if let Some(pos) = light.parent_body().and_then(|b| ctx.bodies.draw_position(b)) {
                light.set_position(pos - ctx.vessels.draw_position(light.vessel()));
            }
        }

        self.select_active(ctx, &mut stats);
        self.recalculate(ctx, &mut stats);

        self.los_mask.update(
            &self.config,
            ctx.occluders,
            ctx.vessels,
            ctx.viewer.as_ref(),
            &ctx.view,
        );

        self.stats = stats;
        stats
    }

    fn select_active(&mut self, ctx: &FrameContext, stats: &mut FrameStats) {
        let view = ctx.view.rect();
        let viewer_vessel = ctx.viewer.map(|v| v.vessel);

        let mut visible: Vec<(LightId, f32)> = Vec::new();
        for light in self.lights.values_mut() {
            if !light.enabled || light.alpha() < MIN_ALPHA || light.range() < 1.0 {
                continue;
            }
            let world_pos = light.position() + ctx.vessels.draw_position(light.vessel());
            if !circle_intersects_rect(world_pos, light.texture_range(), &view) {
                continue;
            }
            let mut priority =
                light.range() * light.alpha() * light.current_brightness() * light.params().priority_multiplier;
            if viewer_vessel.is_some_and(|v| v == light.vessel()) {
                priority *= SAME_VESSEL_PRIORITY;
            }
            if light.casts_shadows() {
                priority *= SHADOW_PRIORITY;
            }
            light.priority = priority;
            visible.push((light.id(), priority));
        }
        // ties keep id order
        visible.sort_by(|a, b| b.1.total_cmp(&a.1));
        stats.visible = visible.len();

        let limit = self.config.max_active_lights;
        let mut volumes = 0;
        self.active.clear();
        for (id, _) in visible {
            let needs_volume = self.lights.get(&id).map_or(false, Light::needs_volume);
            if needs_volume {
                if volumes >= limit && !ctx.in_editor {
                    stats.culled += 1;
                    continue;
                }
                volumes += 1;
            }
            self.active.push(id);
        }
        stats.active = self.active.len();
    }

    fn recalculate(&mut self, ctx: &FrameContext, stats: &mut FrameStats) {
        let mut candidates: Vec<(LightId, f64)> = Vec::new();
        for id in &self.active {
            let Some(light) = self.lights.get_mut(id) else {
                continue;
            };
            if !light.casts_shadows() {
                continue;
            }
            light.check_hulls(ctx.occluders, ctx.vessels);
            let in_flight = self.worker.as_ref().is_some_and(|w| w.is_pending(*id));
            if light.needs_recalculation() && !in_flight {
                candidates.push((*id, light.last_recalculation_time()));
            }
        }
        // stalest first, never-built lights before everything else
        candidates.sort_by(|a, b| a.1.total_cmp(&b.1));

        let budget = self.config.recalculation_budget;
        if candidates.len() > budget {
            log::debug!(
                "Recalculation budget reached: {} of {} stale lights wait",
                candidates.len() - budget,
                candidates.len()
            );
        }
        for (id, _) in candidates.into_iter().take(budget) {
            let deferred = self.lights.get(&id).is_some_and(|l| l.params().deferred);
            if deferred {
                match self.submit(id, ctx) {
                    Submission::Queued => {
                        stats.submitted += 1;
                        continue;
                    }
                    Submission::Full => continue,
                    Submission::Unavailable => {}
                }
            }
            let Some(light) = self.lights.get_mut(&id) else {
                continue;
            };
            log::trace!("Recalculating light {}", id);
            stats.recalculated += 1;
            if let Err(e) = light.recalculate(ctx.occluders, ctx.vessels, ctx.time) {
                log::warn!("Keeping previous mesh for light {}: {}", id, e);
                stats.failures += 1;
            }
        }
    }

    fn submit(&mut self, id: LightId, ctx: &FrameContext) -> Submission {
        if self.worker.is_none() && !self.worker_failed {
            match RaycastWorker::spawn(self.config.worker_queue_capacity) {
                Ok(worker) => self.worker = Some(worker),
                Err(e) => {
                    log::error!("Deferred lights fall back to frame-thread rebuilds: {}", e);
                    self.worker_failed = true;
                }
            }
        }
        let (Some(worker), Some(light)) = (self.worker.as_mut(), self.lights.get_mut(&id)) else {
            return Submission::Unavailable;
        };

        let input = light.raycast_input(ctx.occluders, ctx.vessels);
        match worker.submit(RaycastJob { light: id, input }) {
            Ok(true) => {
                light.begin_recalculation(ctx.time, ctx.occluders.clock());
                Submission::Queued
            }
            Ok(false) => Submission::Full,
            Err(e) => {
                log::error!("{}", e);
                self.worker = None;
                self.worker_failed = true;
                Submission::Unavailable
            }
        }
    }

    fn apply_worker_results(&mut self, stats: &mut FrameStats) {
        let Some(worker) = self.worker.as_mut() else {
            return;
        };
        for result in worker.drain() {
            self.apply_result(result, stats);
        }
    }

    /// Blocks until the worker has finished every queued job and applies the results.
    pub fn flush_worker(&mut self) -> FrameStats {
        let mut stats = FrameStats::default();
        let results = self.worker.as_mut().map(RaycastWorker::wait_idle).unwrap_or_default();
        for result in results {
            self.apply_result(result, &mut stats);
        }
        stats
    }

    fn apply_result(&mut self, result: RaycastResult, stats: &mut FrameStats) {
        let Some(light) = self.lights.get_mut(&result.light) else {
            log::trace!("Discarding raycast result for removed light {}", result.light);
            return;
        };
        let applied = result
            .outcome
            .and_then(|outcome| light.apply_outcome(result.origin, &outcome));
        match applied {
            Ok(()) => stats.applied += 1,
            Err(e) => {
                log::warn!("Keeping previous mesh for light {}: {}", result.light, e);
                stats.failures += 1;
            }
        }
    }

    /// Draw list for the active lights, in priority order. Lights that are
    /// dark this frame are left out.
    pub fn draw_list(&self, vessels: &dyn VesselDirectory) -> Vec<LightDraw> {
        let mut draws = Vec::with_capacity(self.active.len());
        for id in &self.active {
            let Some(light) = self.lights.get(id) else {
                continue;
            };
            if !light.needs_volume() {
                continue;
            }
            let draw_offset = vessels.draw_position(light.vessel());
            if !light.casts_shadows() {
                draws.push(LightDraw::Sprite {
                    light: *id,
                    quad: light.sprite_quad(draw_offset),
                });
            } else if !light.mesh().is_empty() {
                draws.push(LightDraw::Volume {
                    light: *id,
                    transform: light.world_transform(draw_offset),
                    color: light.diffuse_color(),
                });
            }
        }
        draws
    }
}

enum Submission {
    Queued,
    /// The queue is full; the light stays dirty for a later frame.
    Full,
    Unavailable,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame_lib::viewer::NoBodies;
    use crate::geometry::Rect;
    use crate::occlusion_lib::vessel::VesselTable;

    fn ctx<'a>(world: &'a OcclusionWorld, vessels: &'a VesselTable, time: f64) -> FrameContext<'a> {
        FrameContext {
            occluders: world,
            vessels,
            bodies: &NoBodies,
            view: ViewRect::new(Vec2::ZERO, Vec2::new(2000.0, 2000.0)),
            viewer: None,
            time,
            in_editor: false,
        }
    }

    fn world_with_wall() -> OcclusionWorld {
        let mut world = OcclusionWorld::new();
        world.create(None, Rect::new(Vec2::new(-50.0, -10.0), Vec2::new(50.0, 10.0)), None);
        world
    }

    #[test]
    fn lights_are_ranked_by_priority() {
        let world = world_with_wall();
        let vessels = VesselTable::new();
        let mut manager = LightManager::new(LightingConfig::default());
        let small = manager.add_light(Vec2::new(0.0, 100.0), None, LightParams::new(50.0, [1.0; 4]));
        let big = manager.add_light(Vec2::new(0.0, -100.0), None, LightParams::new(200.0, [1.0; 4]));
        let sprite = manager.add_light(
            Vec2::new(100.0, 0.0),
            None,
            LightParams { range: 120.0, casts_shadows: false, ..Default::default() },
        );

        manager.update(&ctx(&world, &vessels, 0.0));
        assert_eq!(manager.active_lights(), &[big, sprite, small]);
        assert_eq!(manager.light(sprite).unwrap().priority(), 120.0);
        assert_eq!(manager.light(big).unwrap().priority(), 300.0);
    }

    #[test]
    fn dimmed_lights_lose_priority() {
        let world = world_with_wall();
        let vessels = VesselTable::new();
        let config = LightingConfig { max_active_lights: 1, ..Default::default() };
        let mut manager = LightManager::new(config);
        let steady = manager.add_light(Vec2::new(0.0, 100.0), None, LightParams::new(150.0, [1.0; 4]));
        let pulsing = manager.add_light(
            Vec2::new(0.0, -100.0),
            None,
            LightParams { range: 200.0, pulse_frequency: 1.0, pulse_amount: 0.5, ..Default::default() },
        );

        // full brightness
        manager.update(&ctx(&world, &vessels, 0.75));
        assert_eq!(manager.active_lights(), &[pulsing]);

        // half brightness
        manager.update(&ctx(&world, &vessels, 0.25));
        assert_eq!(manager.active_lights(), &[steady]);
        assert!((manager.light(pulsing).unwrap().priority() - 150.0).abs() < 1e-3);
    }

    #[test]
    fn invisible_and_disabled_lights_are_skipped() {
        let world = world_with_wall();
        let vessels = VesselTable::new();
        let mut manager = LightManager::new(LightingConfig::default());
        manager.add_light(Vec2::new(5000.0, 0.0), None, LightParams::new(100.0, [1.0; 4]));
        manager.add_light(Vec2::ZERO, None, LightParams::new(100.0, [1.0, 1.0, 1.0, 0.0]));
        let off = manager.add_light(Vec2::ZERO, None, LightParams::new(100.0, [1.0; 4]));
        manager.light_mut(off).unwrap().enabled = false;

        let stats = manager.update(&ctx(&world, &vessels, 0.0));
        assert_eq!(stats.visible, 0);
        assert!(manager.active_lights().is_empty());
    }

    #[test]
    fn volume_limit_drops_the_lowest_priority_lights() {
        let world = world_with_wall();
        let vessels = VesselTable::new();
        let config = LightingConfig { max_active_lights: 2, ..Default::default() };
        let mut manager = LightManager::new(config);
        let ids: Vec<LightId> = (0..4)
            .map(|i| manager.add_light(Vec2::new(0.0, 100.0), None, LightParams::new(100.0 + i as f32 * 10.0, [1.0; 4])))
            .collect();

        let stats = manager.update(&ctx(&world, &vessels, 0.0));
        assert_eq!(stats.culled, 2);
        assert_eq!(manager.active_lights(), &[ids[3], ids[2]]);

        let mut editor = ctx(&world, &vessels, 0.0);
        editor.in_editor = true;
        assert_eq!(manager.update(&editor).active, 4);
    }

    #[test]
    fn rebuilds_never_exceed_the_budget() {
        let world = world_with_wall();
        let vessels = VesselTable::new();
        let config = LightingConfig { recalculation_budget: 3, ..Default::default() };
        let mut manager = LightManager::new(config);
        for i in 0..10 {
            manager.add_light(Vec2::new(i as f32 * 20.0 - 100.0, 150.0), None, LightParams::new(200.0, [1.0; 4]));
        }
        let rebuilds: Vec<usize> = (0..5)
            .map(|frame| manager.update(&ctx(&world, &vessels, frame as f64)).rebuilds())
            .collect();
        assert_eq!(rebuilds, vec![3, 3, 3, 1, 0]);
        assert!(manager.lights().all(|l| l.recalculations() == 1));
    }

    #[test]
    fn disabling_lighting_clears_the_frame() {
        let world = world_with_wall();
        let vessels = VesselTable::new();
        let mut manager = LightManager::new(LightingConfig::default());
        manager.add_light(Vec2::new(0.0, 100.0), None, LightParams::new(100.0, [1.0; 4]));
        manager.update(&ctx(&world, &vessels, 0.0));
        assert_eq!(manager.active_lights().len(), 1);

        manager.set_config(LightingConfig { lighting_enabled: false, ..Default::default() });
        let stats = manager.update(&ctx(&world, &vessels, 1.0));
        assert_eq!(stats, FrameStats::default());
        assert!(manager.active_lights().is_empty());
    }

    #[test]
    fn deferred_lights_are_rebuilt_on_the_worker() {
        let world = world_with_wall();
        let vessels = VesselTable::new();
        let mut manager = LightManager::new(LightingConfig::default());
        let id = manager.add_light(
            Vec2::new(0.0, 200.0),
            None,
            LightParams { range: 300.0, deferred: true, ..Default::default() },
        );

        let stats = manager.update(&ctx(&world, &vessels, 0.0));
        assert_eq!((stats.submitted, stats.recalculated), (1, 0));
        assert!(manager.light(id).unwrap().mesh().is_empty());

        let flushed = manager.flush_worker();
        assert_eq!(flushed.applied, 1);
        // the scene's single wall and boundary square give eight hits
        assert_eq!(manager.light(id).unwrap().mesh().vertex_count(), 17);
        assert_eq!(manager.update(&ctx(&world, &vessels, 1.0)).rebuilds(), 0);
    }

    #[test]
    fn map_load_dirties_every_light() {
        let world = world_with_wall();
        let vessels = VesselTable::new();
        let mut manager = LightManager::new(LightingConfig::default());
        let id = manager.add_light(Vec2::new(0.0, 100.0), None, LightParams::new(100.0, [1.0; 4]));
        manager.update(&ctx(&world, &vessels, 0.0));
        assert!(!manager.light(id).unwrap().needs_recalculation());

        manager.on_map_loaded();
        assert!(manager.light(id).unwrap().needs_recalculation());
        assert_eq!(manager.update(&ctx(&world, &vessels, 1.0)).rebuilds(), 1);
    }

    #[test]
    fn draw_list_has_volumes_and_sprites() {
        let world = world_with_wall();
        let vessels = VesselTable::new();
        let mut manager = LightManager::new(LightingConfig::default());
        let lamp = manager.add_light(Vec2::new(0.0, 100.0), None, LightParams::new(100.0, [1.0; 4]));
        let glow = manager.add_light(
            Vec2::new(100.0, 0.0),
            None,
            LightParams { range: 20.0, casts_shadows: false, ..Default::default() },
        );
        manager.update(&ctx(&world, &vessels, 0.0));
        let draws = manager.draw_list(&vessels);
        assert_eq!(draws.len(), 2);
        assert!(matches!(draws[0], LightDraw::Volume { light, .. } if light == lamp));
        assert!(matches!(draws[1], LightDraw::Sprite { light, .. } if light == glow));
        assert!(manager.remove_light(glow).is_ok());
        assert!(matches!(manager.remove_light(glow), Err(LightingError::UnknownLight(_))));
    }
}
