// src/lighting_lib/light.rs

use glam::{Affine2, Vec2};

use crate::error::LightingError;
use crate::lighting_lib::hull_cache::{HullCache, LightPlacement};
use crate::lighting_lib::light_mesh::{LightMesh, SpriteFlip, UvMapping};
use crate::lighting_lib::shadow::{find_raycast_hits, RaycastInput, RaycastOutcome};
use crate::occlusion_lib::registry::OcclusionWorld;
use crate::occlusion_lib::vessel::{VesselDirectory, VesselId};

// Type aliases for IDs
pub type LightId = u32;
pub type BodyId = u32;

/// Moves below this (per axis) are ignored entirely.
pub const POSITION_EPSILON: f32 = 0.1;
/// Moves shorter than this reuse the last mesh with a translation.
pub const MOVEMENT_RECALCULATION_THRESHOLD: f32 = 10.0;
pub const ROTATION_EPSILON: f32 = 0.001;
pub const ROTATION_RECALCULATION_THRESHOLD: f32 = 0.02;
pub const RANGE_RECALCULATION_THRESHOLD: f32 = 10.0;
pub const MAX_RANGE: f32 = 4096.0;
/// Extra room for the boundary square when the texture origin sits at an edge.
const EDGE_ORIGIN_MARGIN: f32 = 5.0;
const EDGE_ORIGIN_THRESHOLD: f32 = 0.45;

/// A shape texture that replaces the default radial light texture.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OverrideTexture {
    /// Size of the source rectangle in texels.
    pub source_size: Vec2,
    /// Drawn size in world units.
    pub size: Vec2,
    /// Light origin inside the texture, in texels.
    pub origin: Vec2,
}

impl OverrideTexture {
    fn relative_origin(&self) -> Vec2 {
        self.origin / self.source_size.max(Vec2::ONE)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct LightParams {
    pub range: f32,
    /// Linear RGBA, 0..1.
    pub color: [f32; 4],
    pub casts_shadows: bool,
    /// Blinks per second; 0 disables blinking.
    pub blink_frequency: f32,
    pub pulse_frequency: f32,
    /// 0 = no pulsing, 1 = pulses all the way to dark.
    pub pulse_amount: f32,
    /// 0 = steady, 1 = flickers between dark and full brightness.
    pub flicker: f32,
    pub flicker_speed: f32,
    pub priority_multiplier: f32,
    pub override_texture: Option<OverrideTexture>,
    pub flip: SpriteFlip,
    /// Rebuild the shadow mesh on the background worker, one frame late.
    pub deferred: bool,
}

impl Default for LightParams {
    fn default() -> Self {
        Self {
            range: 100.0,
            color: [1.0, 1.0, 1.0, 1.0],
            casts_shadows: true,
            blink_frequency: 0.0,
            pulse_frequency: 0.0,
            pulse_amount: 0.0,
            flicker: 0.0,
            flicker_speed: 1.0,
            priority_multiplier: 1.0,
            override_texture: None,
            flip: SpriteFlip::default(),
            deferred: false,
        }
    }
}

impl LightParams {
    pub fn new(range: f32, color: [f32; 4]) -> Self {
        Self {
            range,
            color,
            ..Default::default()
        }
    }
}

/// Draw-ready quad for lights that do not cast shadows.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SpriteQuad {
    pub center: Vec2,
    pub rotation: f32,
    pub half_size: Vec2,
    /// Texture-space point that sits at `center`.
    pub origin_uv: Vec2,
    pub color: [f32; 4],
}

#[inline(always)]
fn hash2d(x: i32, y: i32) -> f32 {
    let n = x.wrapping_mul(374761393).wrapping_add(y.wrapping_mul(668265263));
    let n = (n ^ (n >> 13)).wrapping_mul(1274126177);
    ((n as u32) as f32) / (u32::MAX as f32)
}

#[inline(always)]
fn smoothstep(t: f32) -> f32 {
    t * t * (3.0 - 2.0 * t)
}

/// Smooth value noise in 0..1.
fn flicker_noise(x: f32, y: f32) -> f32 {
    let xi = x.floor() as i32;
    let yi = y.floor() as i32;
    let xf = smoothstep(x - x.floor());
    let yf = smoothstep(y - y.floor());

    let n00 = hash2d(xi, yi);
    let n10 = hash2d(xi + 1, yi);
    let n01 = hash2d(xi, yi + 1);
    let n11 = hash2d(xi + 1, yi + 1);

    let nx0 = n00 + xf * (n10 - n00);
    let nx1 = n01 + xf * (n11 - n01);
    nx0 + yf * (nx1 - nx0)
}

#[derive(Clone, Debug)]
pub struct Light {
    pub(crate) id: LightId,
    params: LightParams,
    pub enabled: bool,
    vessel: Option<VesselId>,
    parent_body: Option<BodyId>,
    position: Vec2,
    rotation: f32,
    current_brightness: f32,
    pub(crate) priority: f32,

    prev_calculated_position: Vec2,
    prev_calculated_rotation: f32,
    prev_calculated_range: f32,
    translate_vertices: Vec2,
    rotate_vertices: f32,

    needs_hull_check: bool,
    needs_recalculation: bool,
    last_recalculation_time: f64,
    calculated_at: u64,
    recalculations: u64,

    hull_cache: HullCache,
    mesh: LightMesh,
}

impl Light {
    pub fn new(id: LightId, position: Vec2, vessel: Option<VesselId>, mut params: LightParams) -> Self {
        params.range = params.range.clamp(0.0, MAX_RANGE);
        Self {
            id,
            prev_calculated_range: params.range,
            params,
            enabled: true,
            vessel,
            parent_body: None,
            position,
            rotation: 0.0,
            current_brightness: 1.0,
            priority: 0.0,
            prev_calculated_position: position,
            prev_calculated_rotation: 0.0,
            translate_vertices: Vec2::ZERO,
            rotate_vertices: 0.0,
            needs_hull_check: true,
            needs_recalculation: true,
            last_recalculation_time: f64::NEG_INFINITY,
            calculated_at: 0,
            recalculations: 0,
            hull_cache: HullCache::new(),
            mesh: LightMesh::new(),
        }
    }

    pub fn id(&self) -> LightId {
        self.id
    }

    pub fn params(&self) -> &LightParams {
        &self.params
    }

    pub fn position(&self) -> Vec2 {
        self.position
    }

    pub fn rotation(&self) -> f32 {
        self.rotation
    }

    pub fn range(&self) -> f32 {
        self.params.range
    }

    pub fn color(&self) -> [f32; 4] {
        self.params.color
    }

    pub fn alpha(&self) -> f32 {
        self.params.color[3]
    }

    pub fn vessel(&self) -> Option<VesselId> {
        self.vessel
    }

    pub fn parent_body(&self) -> Option<BodyId> {
        self.parent_body
    }

    pub fn casts_shadows(&self) -> bool {
        self.params.casts_shadows
    }

    pub fn current_brightness(&self) -> f32 {
        self.current_brightness
    }

    pub fn priority(&self) -> f32 {
        self.priority
    }

    pub fn needs_recalculation(&self) -> bool {
        self.needs_recalculation
    }

    pub fn needs_hull_check(&self) -> bool {
        self.needs_hull_check
    }

    pub fn last_recalculation_time(&self) -> f64 {
        self.last_recalculation_time
    }

    /// Number of full mesh rebuilds started so far.
    pub fn recalculations(&self) -> u64 {
        self.recalculations
    }

    pub fn mesh(&self) -> &LightMesh {
        &self.mesh
    }

    pub fn hull_cache(&self) -> &HullCache {
        &self.hull_cache
    }

    /// Pending translation applied to the last mesh instead of rebuilding it.
    pub fn translate_vertices(&self) -> Vec2 {
        self.translate_vertices
    }

    pub fn rotate_vertices(&self) -> f32 {
        self.rotate_vertices
    }

    /// How far the light's texture reaches from its position.
    pub fn texture_range(&self) -> f32 {
        let range = self.params.range;
        match &self.params.override_texture {
            Some(tex) => {
                let rel = tex.relative_origin() - Vec2::splat(0.5);
                range + (rel.x.abs() * tex.size.x).max(rel.y.abs() * tex.size.y)
            }
            None => range,
        }
    }

    pub fn mark_dirty(&mut self) {
        self.hull_cache.clear_hidden();
        self.needs_recalculation = true;
    }

    pub fn mark_needs_hull_check(&mut self) {
        self.needs_hull_check = true;
    }

    pub fn set_position(&mut self, position: Vec2) {
        let moved = position - self.position;
        if moved.x.abs() < POSITION_EPSILON && moved.y.abs() < POSITION_EPSILON {
            return;
        }
        self.position = position;

        let threshold = MOVEMENT_RECALCULATION_THRESHOLD * MOVEMENT_RECALCULATION_THRESHOLD;
        if self.prev_calculated_position.distance_squared(position) < threshold && !self.mesh.is_empty() {
            self.translate_vertices = position - self.prev_calculated_position;
            return;
        }
        self.needs_hull_check = true;
        self.mark_dirty();
    }

    pub fn set_rotation(&mut self, rotation: f32) {
        if (rotation - self.rotation).abs() < ROTATION_EPSILON {
            return;
        }
        self.rotation = rotation;

        if (rotation - self.prev_calculated_rotation).abs() < ROTATION_RECALCULATION_THRESHOLD && !self.mesh.is_empty() {
            self.rotate_vertices = rotation - self.prev_calculated_rotation;
            return;
        }
        self.needs_hull_check = true;
        self.mark_dirty();
    }

    pub fn set_range(&mut self, range: f32) {
        self.params.range = range.clamp(0.0, MAX_RANGE);
        if (self.prev_calculated_range - self.params.range).abs() < RANGE_RECALCULATION_THRESHOLD {
            return;
        }
        self.needs_hull_check = true;
        self.mark_dirty();
        self.prev_calculated_range = self.params.range;
    }

    pub fn set_color(&mut self, color: [f32; 4]) {
        self.params.color = color;
    }

    pub fn set_casts_shadows(&mut self, casts_shadows: bool) {
        if self.params.casts_shadows != casts_shadows {
            self.params.casts_shadows = casts_shadows;
            self.needs_hull_check = true;
            self.mark_dirty();
        }
    }

    pub fn set_override_texture(&mut self, texture: Option<OverrideTexture>) {
        self.params.override_texture = texture;
        self.needs_hull_check = true;
        self.mark_dirty();
    }

    pub fn set_parent_body(&mut self, body: Option<BodyId>) {
        self.parent_body = body;
    }

    /// Moves the light into another vessel's frame. Cached lists are dropped.
    pub fn set_vessel(&mut self, vessel: Option<VesselId>, position: Vec2) {
        if self.vessel == vessel {
            self.set_position(position);
            return;
        }
        self.vessel = vessel;
        self.position = position;
        self.reset();
    }

    /// Blink, pulse and flicker for the given simulation time.
    pub fn update(&mut self, time: f64) {
        let p = &self.params;
        if p.blink_frequency > 0.0 {
            let blink = (time * p.blink_frequency as f64).rem_euclid(1.0);
            if blink > 0.5 {
                self.current_brightness = 0.0;
                return;
            }
        }
        let mut brightness = 1.0;
        if p.pulse_frequency > 0.0 && p.pulse_amount > 0.0 {
            let phase = (time * p.pulse_frequency as f64).rem_euclid(1.0) as f32;
            brightness *= 1.0 - ((phase * std::f32::consts::TAU).sin() + 1.0) / 2.0 * p.pulse_amount;
        }
        if p.flicker > 0.0 && p.flicker_speed > 0.0 {
            let state = (time * p.flicker_speed as f64).rem_euclid(255.0) as f32;
            brightness *= 1.0 - flicker_noise(state, state * 0.5) * p.flicker;
        }
        self.current_brightness = brightness;
    }

    /// Whether the light produces anything at all this frame.
    pub fn is_lit(&self) -> bool {
        self.enabled && self.params.range >= 1.0 && self.alpha() > 0.0
    }

    /// Whether the light needs a rendered volume (as opposed to being dark right now).
    pub fn needs_volume(&self) -> bool {
        self.params.range >= 1.0 && self.alpha() > 0.0 && self.current_brightness > 0.0
    }

    /// Offset of the boundary square from the light and its half size.
    pub fn shadow_bounds(&self) -> (Vec2, f32) {
        let texture_range = self.texture_range();
        let Some(tex) = &self.params.override_texture else {
            return (Vec2::ZERO, texture_range);
        };
        let cos = self.rotation.cos();
        let sin = -self.rotation.sin();
        let mut origin = tex.origin / tex.source_size.x.max(tex.source_size.y).max(1.0) - Vec2::splat(0.5);
        let mut extent = texture_range;
        if origin.x.abs() >= EDGE_ORIGIN_THRESHOLD || origin.y.abs() >= EDGE_ORIGIN_THRESHOLD {
            extent += EDGE_ORIGIN_MARGIN;
        }
        origin *= texture_range;
        let offset = Vec2::new(-origin.x * cos - origin.y * sin, origin.x * sin + origin.y * cos);
        (offset, extent)
    }

    pub fn uv_mapping(&self) -> UvMapping {
        let flip = self.params.flip;
        let Some(tex) = &self.params.override_texture else {
            return UvMapping::Polar { flip };
        };
        let mut cos = self.rotation.cos();
        let mut sin = -self.rotation.sin();
        let mut origin = tex.origin;
        if flip.horizontal {
            origin.x = tex.source_size.x - origin.x;
            cos = -cos;
            sin = -sin;
        }
        if flip.vertical {
            origin.y = tex.source_size.y - origin.y;
        }
        let dims = tex.source_size.max(Vec2::ONE);
        UvMapping::Override {
            cos,
            sin,
            scale: dims / tex.size.max(Vec2::ONE),
            offset: origin / dims - Vec2::splat(0.5),
            flip,
        }
    }

    pub(crate) fn placement(&self) -> LightPlacement {
        LightPlacement {
            position: self.position,
            vessel: self.vessel,
            reach: self.texture_range(),
            calculated_at: self.calculated_at,
        }
    }

    /// Refreshes the in-range occluder lists; marks the light dirty if any of
    /// them changed since the last rebuild.
    pub fn check_hulls(&mut self, world: &OcclusionWorld, vessels: &dyn VesselDirectory) {
        if self.needs_hull_check {
            self.hull_cache.invalidate();
            self.needs_hull_check = false;
        }
        let placement = self.placement();
        if self.hull_cache.check(&placement, world, vessels) {
            self.mark_dirty();
        }
    }

    /// Snapshot of everything the shadow builder needs, in the light's frame.
    pub fn raycast_input(&self, world: &OcclusionWorld, vessels: &dyn VesselDirectory) -> RaycastInput {
        let (bounds_offset, bounds_extent) = self.shadow_bounds();
        RaycastInput {
            origin: self.position,
            bounds_offset,
            bounds_extent,
            segments: self.hull_cache.gather_segments(&self.placement(), world, vessels),
        }
    }

    /// Marks the start of a rebuild at `time`. Anything that dirties the light
    /// after this point triggers another rebuild.
    pub(crate) fn begin_recalculation(&mut self, time: f64, clock: u64) {
        self.needs_recalculation = false;
        self.last_recalculation_time = time;
        self.calculated_at = clock;
        self.recalculations += 1;
        self.prev_calculated_position = self.position;
        self.prev_calculated_rotation = self.rotation;
        self.translate_vertices = Vec2::ZERO;
        self.rotate_vertices = 0.0;
    }

    /// Replaces the mesh with one built from `outcome`, centered on `origin`.
    ///
    /// If the light was dirtied after `begin_recalculation`, the outcome's used
    /// set is out of date and nothing gets hidden.
    pub(crate) fn apply_outcome(&mut self, origin: Vec2, outcome: &RaycastOutcome) -> Result<(), LightingError> {
        if !self.needs_recalculation {
            self.hull_cache.hide_unused(&outcome.used);
        }
        let uv = self.uv_mapping();
        self.mesh.build(origin, &outcome.hits, self.params.range, &uv)
    }

    /// Full synchronous rebuild. On failure the previous mesh is kept.
    pub fn recalculate(
        &mut self,
        world: &OcclusionWorld,
        vessels: &dyn VesselDirectory,
        time: f64,
    ) -> Result<(), LightingError> {
        let input = self.raycast_input(world, vessels);
        self.begin_recalculation(time, world.clock());
        let outcome = find_raycast_hits(&input)?;
        self.apply_outcome(input.origin, &outcome)
    }

    /// Places the mesh (built in the light's frame) in the world. `draw_offset`
    /// is the draw position of the light's vessel.
    pub fn world_transform(&self, draw_offset: Vec2) -> Affine2 {
        let pivot = self.prev_calculated_position;
        Affine2::from_translation(pivot + draw_offset + self.translate_vertices)
            * Affine2::from_angle(self.rotate_vertices)
            * Affine2::from_translation(-pivot)
    }

    /// Mesh vertex positions in world space.
    pub fn world_vertices(&self, draw_offset: Vec2) -> Vec<Vec2> {
        let transform = self.world_transform(draw_offset);
        self.mesh
            .vertices()
            .iter()
            .map(|v| transform.transform_point2(v.position()))
            .collect()
    }

    /// Tint for drawing the mesh: color scaled by alpha and brightness.
    pub fn diffuse_color(&self) -> [f32; 3] {
        let [r, g, b, a] = self.params.color;
        let k = a * self.current_brightness;
        [r * k, g * k, b * k]
    }

    pub fn sprite_quad(&self, draw_offset: Vec2) -> SpriteQuad {
        let [r, g, b, a] = self.params.color;
        let k = self.current_brightness;
        let (half_size, origin_uv) = match &self.params.override_texture {
            Some(tex) => (tex.size * 0.5, tex.relative_origin()),
            None => (Vec2::splat(self.params.range), Vec2::splat(0.5)),
        };
        SpriteQuad {
            center: self.position + draw_offset,
            rotation: -self.rotation,
            half_size,
            origin_uv,
            color: [r * k, g * k, b * k, a * k],
        }
    }

    /// Drops cached occluder lists and the mesh; the next frame rebuilds from scratch.
    pub fn reset(&mut self) {
        self.hull_cache.reset();
        self.mesh.clear();
        self.needs_hull_check = true;
        self.needs_recalculation = true;
        self.translate_vertices = Vec2::ZERO;
        self.rotate_vertices = 0.0;
        self.prev_calculated_position = self.position;
        self.prev_calculated_rotation = self.rotation;
    }
}
