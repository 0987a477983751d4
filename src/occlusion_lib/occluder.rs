// src/occlusion_lib/occluder.rs

use std::collections::BTreeSet;

use glam::Vec2;

use crate::geometry::{rotate_about, Rect};
use crate::intersection::segments_cross;
use crate::occlusion_lib::vessel::VesselId;

/// Segments closer than this to a coordinate axis count as axis aligned.
pub const AXIS_ALIGNED_TOLERANCE: f32 = 0.1;
/// How far LOS shadows are pushed away from the eye.
pub const LOS_EXTRUSION: f32 = 9000.0;
/// Sideways shift of the eye when fanning out a penumbra wedge.
pub const PENUMBRA_SPREAD: f32 = 20.0;

/// Stable handle into the occluder arena. A removed occluder's slot is reused
/// with a bumped generation, so stale handles never alias a new occluder.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OccluderId {
    pub(crate) index: u32,
    pub(crate) generation: u32,
}

impl OccluderId {
    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Orientation {
    /// Long axis runs along x (floors, ceilings, horizontal walls).
    Horizontal,
    Vertical,
}

impl Orientation {
    pub fn infer(bounds: &Rect) -> Self {
        if bounds.width() > bounds.height() {
            Orientation::Horizontal
        } else {
            Orientation::Vertical
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Segment {
    pub start: Vec2,
    pub end: Vec2,
    pub is_horizontal: bool,
    pub is_axis_aligned: bool,
    /// `None` for synthetic segments such as a light's boundary square.
    pub owner: Option<OccluderId>,
}

impl Segment {
    pub fn new(start: Vec2, end: Vec2, owner: Option<OccluderId>) -> Self {
        let d = (end - start).abs();
        Self {
            start,
            end,
            is_horizontal: d.x > d.y,
            is_axis_aligned: d.x < AXIS_ALIGNED_TOLERANCE || d.y < AXIS_ALIGNED_TOLERANCE,
            owner,
        }
    }

    pub fn midpoint(&self) -> Vec2 {
        (self.start + self.end) * 0.5
    }

    pub fn length_squared(&self) -> f32 {
        self.start.distance_squared(self.end)
    }

    pub fn translated(&self, offset: Vec2) -> Segment {
        Segment::new(self.start + offset, self.end + offset, self.owner)
    }
}

/// One vertex of an LOS shadow, in the occluder's local frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ShadowPoint {
    pub position: Vec2,
    pub uv: Vec2,
}

/// Geometry blocking sight behind an occluder's LOS segment, as seen from an eye.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LosShadow {
    /// Two triangles covering the LOS segment extruded away from the eye.
    pub hard: Vec<Vec2>,
    /// One textured triangle per LOS endpoint that is not joined to a neighbor.
    pub penumbra: Vec<ShadowPoint>,
}

/// A rectangular blocker with four boundary segments and one interior LOS segment.
#[derive(Clone, Debug)]
pub struct Occluder {
    pub(crate) id: OccluderId,
    pub(crate) vessel: Option<VesselId>,
    orientation: Orientation,
    corners: [Vec2; 4],
    segments: [Segment; 4],
    los_points: [Vec2; 2],
    pub(crate) los_offsets: [Option<Vec2>; 2],
    bounds: Rect,
    pub(crate) enabled: bool,
    pub(crate) last_vertex_change: u64,
    pub(crate) overlapping: BTreeSet<OccluderId>,
}

impl Occluder {
    pub(crate) fn from_rect(
        id: OccluderId,
        vessel: Option<VesselId>,
        rect: Rect,
        orientation: Option<Orientation>,
        stamp: u64,
    ) -> Self {
        let orientation = orientation.unwrap_or_else(|| Orientation::infer(&rect));
        Self::from_corners(id, vessel, rect.corners(), orientation, stamp)
    }

    pub(crate) fn from_corners(
        id: OccluderId,
        vessel: Option<VesselId>,
        corners: [Vec2; 4],
        orientation: Orientation,
        stamp: u64,
    ) -> Self {
        let mut occluder = Self {
            id,
            vessel,
            orientation,
            corners,
            segments: [Segment::new(Vec2::ZERO, Vec2::ZERO, Some(id)); 4],
            los_points: [Vec2::ZERO; 2],
            los_offsets: [None; 2],
            bounds: Rect::from_points(&corners),
            enabled: true,
            last_vertex_change: stamp,
            overlapping: BTreeSet::new(),
        };
        occluder.rebuild();
        occluder
    }

    fn rebuild(&mut self) {
        let c = self.corners;
        for i in 0..4 {
            self.segments[i] = Segment::new(c[i], c[(i + 1) % 4], Some(self.id));
        }
        // corners run around the rectangle; the short sides depend on orientation
        self.los_points = match self.orientation {
            Orientation::Horizontal => [(c[3] + c[0]) * 0.5, (c[1] + c[2]) * 0.5],
            Orientation::Vertical => [(c[0] + c[1]) * 0.5, (c[2] + c[3]) * 0.5],
        };
        self.bounds = Rect::from_points(&c);
        self.los_offsets = [None; 2];
    }

    pub fn id(&self) -> OccluderId {
        self.id
    }

    pub fn vessel(&self) -> Option<VesselId> {
        self.vessel
    }

    pub fn orientation(&self) -> Orientation {
        self.orientation
    }

    pub fn corners(&self) -> &[Vec2; 4] {
        &self.corners
    }

    pub fn segments(&self) -> &[Segment; 4] {
        &self.segments
    }

    pub fn bounds(&self) -> Rect {
        self.bounds
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn last_vertex_change(&self) -> u64 {
        self.last_vertex_change
    }

    pub fn overlapping(&self) -> &BTreeSet<OccluderId> {
        &self.overlapping
    }

    pub fn los_offsets(&self) -> [Option<Vec2>; 2] {
        self.los_offsets
    }

    /// Center of the rectangle (mean of the corners).
    pub fn center(&self) -> Vec2 {
        self.corners.iter().copied().sum::<Vec2>() * 0.25
    }

    /// The LOS points before any merge offsets are applied.
    pub fn base_los_points(&self) -> [Vec2; 2] {
        self.los_points
    }

    /// The LOS segment with merge offsets applied.
    pub fn los_segment(&self) -> [Vec2; 2] {
        [
            self.los_points[0] + self.los_offsets[0].unwrap_or(Vec2::ZERO),
            self.los_points[1] + self.los_offsets[1].unwrap_or(Vec2::ZERO),
        ]
    }

    /// Width across the LOS segment: mean length of the two short sides.
    pub fn thickness(&self) -> f32 {
        let c = self.corners;
        match self.orientation {
            Orientation::Horizontal => (c[3].distance(c[0]) + c[1].distance(c[2])) * 0.5,
            Orientation::Vertical => (c[0].distance(c[1]) + c[2].distance(c[3])) * 0.5,
        }
    }

    pub(crate) fn translate(&mut self, delta: Vec2, stamp: u64) {
        for c in self.corners.iter_mut() {
            *c += delta;
        }
        self.rebuild();
        self.last_vertex_change = stamp;
    }

    pub(crate) fn rotate(&mut self, pivot: Vec2, angle: f32, stamp: u64) {
        for c in self.corners.iter_mut() {
            *c = rotate_about(*c, pivot, angle);
        }
        self.rebuild();
        self.last_vertex_change = stamp;
    }

    pub(crate) fn set_vertices(&mut self, corners: [Vec2; 4], stamp: u64) {
        self.corners = corners;
        self.rebuild();
        self.last_vertex_change = stamp;
    }

    /// Records `offset` for LOS endpoint `index` unless a smaller one is already stored.
    pub(crate) fn offer_los_offset(&mut self, index: usize, offset: Vec2) -> bool {
        match self.los_offsets[index] {
            Some(existing) if existing.length_squared() <= offset.length_squared() => false,
            _ => {
                self.los_offsets[index] = Some(offset);
                true
            }
        }
    }

    pub(crate) fn reset_los_offsets(&mut self) {
        self.los_offsets = [None; 2];
    }

    /// Boundary segments whose outward side faces `viewpoint`.
    ///
    /// `viewpoint` is given in the caller's frame; `offset` maps this
    /// occluder's local frame into that frame.
    pub fn facing_segments(&self, viewpoint: Vec2, offset: Vec2) -> impl Iterator<Item = Segment> + '_ {
        let center = self.center();
        let local_view = viewpoint - offset;
        self.segments.iter().filter_map(move |segment| {
            if segment.length_squared() < f32::EPSILON {
                return None;
            }
            let mid = segment.midpoint();
            let edge = segment.end - segment.start;
            let mut normal = edge.perp();
            if normal.dot(mid - center) < 0.0 {
                normal = -normal;
            }
            (normal.dot(local_view - mid) > 0.0).then(|| segment.translated(offset))
        })
    }

    /// Whether the segment `a-b` (local frame) crosses this occluder's LOS line.
    pub fn los_crosses(&self, a: Vec2, b: Vec2) -> bool {
        let [p0, p1] = self.los_segment();
        segments_cross(a, b, p0, p1)
    }

    /// Sight-blocking geometry behind the LOS segment as seen from `eye`
    /// (local frame). Returns `None` for a collapsed LOS segment.
    pub fn los_shadow(&self, eye: Vec2) -> Option<LosShadow> {
        let [mut p0, mut p1] = self.los_segment();
        let [mut free0, mut free1] = [self.los_offsets[0].is_none(), self.los_offsets[1].is_none()];
        if p0.distance_squared(p1) < 1.0 {
            return None;
        }
        // p0 is the endpoint whose outside lies to the left of the eye ray
        if (p0 - eye).perp_dot(p1 - eye) > 0.0 {
            std::mem::swap(&mut p0, &mut p1);
            std::mem::swap(&mut free0, &mut free1);
        }

        let extrude = |p: Vec2| eye + (p - eye).normalize_or_zero() * LOS_EXTRUSION;
        let (e0, e1) = (extrude(p0), extrude(p1));
        let mut shadow = LosShadow {
            hard: vec![p1, p0, e0, p1, e0, e1],
            penumbra: Vec::new(),
        };
        if free0 {
            shadow.penumbra.extend(penumbra_wedge(eye, p0, 1.0));
        }
        if free1 {
            shadow.penumbra.extend(penumbra_wedge(eye, p1, -1.0));
        }
        Some(shadow)
    }
}

/// Soft wedge fanning out from `tip`, on the left of the eye ray for `side = 1`
/// and on the right for `side = -1`.
fn penumbra_wedge(eye: Vec2, tip: Vec2, side: f32) -> [ShadowPoint; 3] {
    let dir = (tip - eye).normalize_or_zero();
    let outer_normal = dir.perp() * side;
    let inner_normal = -dir.perp() * side * 0.05;
    let cast = |normal: Vec2| {
        let shifted = (tip - (eye - normal * PENUMBRA_SPREAD)).normalize_or_zero();
        eye + shifted * LOS_EXTRUSION
    };
    let outer = ShadowPoint { position: cast(outer_normal), uv: Vec2::new(0.05, 0.0) };
    let inner = ShadowPoint { position: cast(inner_normal), uv: Vec2::new(1.0, 0.0) };
    let tip = ShadowPoint { position: tip, uv: Vec2::new(0.0, 1.0) };
    if side > 0.0 {
        [tip, outer, inner]
    } else {
        [tip, inner, outer]
    }
}
