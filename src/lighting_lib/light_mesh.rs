// src/lighting_lib/light_mesh.rs

use glam::Vec2;

use crate::error::LightingError;
use crate::intersection::line_intersection;
use crate::lighting_lib::vertex::LightVertex;

/// How far the faded outer ring extends past the lit area.
pub const FADE_DISTANCE: f32 = 40.0;
const MAX_FADE_LENGTH_SQ: f32 = 10_000.0;
const CAPPED_FADE_LENGTH: f32 = 100.0;
const MIN_GPU_VERTICES: usize = 64;
const SOLID: [f32; 4] = [1.0, 1.0, 1.0, 1.0];
const TRANSPARENT: [f32; 4] = [0.0, 0.0, 0.0, 0.0];

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SpriteFlip {
    pub horizontal: bool,
    pub vertical: bool,
}

impl SpriteFlip {
    fn apply(&self, mut uv: Vec2) -> Vec2 {
        if self.horizontal {
            uv.x = 1.0 - uv.x;
        }
        if self.vertical {
            uv.y = 1.0 - uv.y;
        }
        // texture space has y pointing down
        uv.y = 1.0 - uv.y;
        uv
    }
}

/// Maps a vertex's offset from the light to a light-texture coordinate.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum UvMapping {
    /// Radial texture centered on the light, covering its range.
    Polar { flip: SpriteFlip },
    /// Shape texture rotated with the light and anchored at its origin.
    Override {
        cos: f32,
        sin: f32,
        /// Source texels per drawn unit.
        scale: Vec2,
        /// Origin offset from the texture center, in UV units.
        offset: Vec2,
        flip: SpriteFlip,
    },
}

impl UvMapping {
    fn center(&self) -> Vec2 {
        match self {
            UvMapping::Polar { flip } => flip.apply(Vec2::splat(0.5)),
            UvMapping::Override { offset, flip, .. } => flip.apply(Vec2::splat(0.5) + *offset),
        }
    }

    fn map(&self, diff: Vec2, range: f32) -> Vec2 {
        let diff = diff / (range * 2.0);
        match self {
            UvMapping::Polar { flip } => flip.apply(Vec2::splat(0.5) + diff),
            UvMapping::Override { cos, sin, scale, offset, flip } => {
                let rotated = Vec2::new(diff.x * cos - diff.y * sin, diff.x * sin + diff.y * cos);
                flip.apply(Vec2::splat(0.5) + rotated * *scale + *offset)
            }
        }
    }
}

/// Light volume geometry in the light's own frame, plus the sizes the
/// renderer should allocate for its GPU buffers.
#[derive(Clone, Debug, Default)]
pub struct LightMesh {
    vertices: Vec<LightVertex>,
    indices: Vec<u16>,
    vertex_count: usize,
    index_count: usize,
    gpu_vertex_capacity: usize,
    gpu_index_capacity: usize,
}

impl LightMesh {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn vertices(&self) -> &[LightVertex] {
        &self.vertices[..self.vertex_count]
    }

    pub fn indices(&self) -> &[u16] {
        &self.indices[..self.index_count]
    }

    pub fn vertex_count(&self) -> usize {
        self.vertex_count
    }

    pub fn index_count(&self) -> usize {
        self.index_count
    }

    pub fn is_empty(&self) -> bool {
        self.vertex_count == 0
    }

    /// (vertices, indices) the backing GPU buffers must hold.
    pub fn gpu_capacity(&self) -> (usize, usize) {
        (self.gpu_vertex_capacity, self.gpu_index_capacity)
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Rebuilds the fan from boundary points sorted by angle around `center`.
    ///
    /// Each point contributes a solid vertex and a transparent one pushed
    /// outwards; every consecutive pair of points then gets one solid triangle
    /// from the center and two triangles across the faded ring.
    pub fn build(&mut self, center: Vec2, hits: &[Vec2], range: f32, uv: &UvMapping) -> Result<(), LightingError> {
        let n = hits.len();
        if n == 0 {
            self.vertex_count = 0;
            self.index_count = 0;
            return Ok(());
        }
        let vertex_count = n * 2 + 1;
        let index_count = n * 9;
        if vertex_count > u16::MAX as usize {
            return Err(LightingError::MeshTooLarge(vertex_count));
        }

        // CPU storage grows like the GPU buffers and is never shrunk
        if self.vertices.len() < vertex_count {
            let grown = MIN_GPU_VERTICES.max(vertex_count * 3 / 2);
            self.vertices.resize(grown, LightVertex::new(Vec2::ZERO, TRANSPARENT, Vec2::ZERO));
        }
        if self.indices.len() < index_count {
            self.indices.resize((MIN_GPU_VERTICES * 3).max(index_count * 3 / 2), 0);
        }

        self.vertices[0] = LightVertex::new(center, SOLID, uv.center());
        for i in 0..n {
            let vertex = hits[i];
            let prev = hits[if i > 0 { i - 1 } else { n - 1 }];
            let next = hits[if i + 1 < n { i + 1 } else { 0 }];
            let raw = vertex - center;
            let fade = fade_offset(vertex, prev, next, raw);
            let tex = uv.map(raw, range);
            self.vertices[1 + i * 2] = LightVertex::new(vertex, SOLID, tex);
            self.vertices[2 + i * 2] = LightVertex::new(vertex + fade, TRANSPARENT, tex);
        }

        let vc = vertex_count as u16;
        for i in 0..n - 1 {
            let base = i * 9;
            let a = (i * 2 + 1) as u16 % vc;
            let b = (i * 2 + 2) as u16 % vc;
            let c = (i * 2 + 3) as u16 % vc;
            let d = (i * 2 + 4) as u16 % vc;
            self.indices[base..base + 9].copy_from_slice(&[0, c, a, a, c, d, b, a, d]);
        }
        let base = (n - 1) * 9;
        self.indices[base..base + 9].copy_from_slice(&[0, 1, vc - 2, 1, vc - 1, vc - 2, 1, 2, vc - 1]);

        self.vertex_count = vertex_count;
        self.index_count = index_count;
        self.grow_gpu_capacity();
        Ok(())
    }

    fn grow_gpu_capacity(&mut self) {
        if self.gpu_vertex_capacity == 0 {
            self.gpu_vertex_capacity = MIN_GPU_VERTICES.max(self.vertex_count * 3 / 2);
            self.gpu_index_capacity = (MIN_GPU_VERTICES * 3).max(self.index_count * 3 / 2);
        } else if self.vertex_count > self.gpu_vertex_capacity || self.index_count > self.gpu_index_capacity {
            self.gpu_vertex_capacity = self.vertex_count * 3 / 2;
            self.gpu_index_capacity = self.index_count * 3 / 2;
        }
    }
}

/// Outward push for the transparent copy of `vertex`, from the normals of its
/// two neighboring edges.
fn fade_offset(vertex: Vec2, prev: Vec2, next: Vec2, raw: Vec2) -> Vec2 {
    let outward = |edge: Vec2| {
        let mut n = edge.perp();
        let m = n.x.abs().max(n.y.abs());
        if m <= f32::EPSILON {
            return Vec2::ZERO;
        }
        n /= m;
        if n.distance_squared(raw) > (-n).distance_squared(raw) {
            n = -n;
        }
        n
    };
    let n1 = outward(vertex - next);
    let n2 = outward(prev - vertex);

    let mut fade = n1 * FADE_DISTANCE;
    if let Some(corner) = line_intersection(
        vertex + n1 * FADE_DISTANCE,
        next + n1 * FADE_DISTANCE,
        vertex + n2 * FADE_DISTANCE,
        prev + n2 * FADE_DISTANCE,
    ) {
        fade = corner - vertex;
        if fade.length_squared() > MAX_FADE_LENGTH_SQ {
            fade /= fade.x.abs().max(fade.y.abs());
            fade *= CAPPED_FADE_LENGTH;
        }
    }
    fade
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square_hits() -> Vec<Vec2> {
        // counter-clockwise from -135 degrees
        vec![
            Vec2::new(-100.0, -100.0),
            Vec2::new(100.0, -100.0),
            Vec2::new(100.0, 100.0),
            Vec2::new(-100.0, 100.0),
        ]
    }

    #[test]
    fn fan_is_closed() {
        let mut mesh = LightMesh::new();
        mesh.build(Vec2::ZERO, &square_hits(), 100.0, &UvMapping::Polar { flip: SpriteFlip::default() })
            .unwrap();
        assert_eq!(mesh.vertex_count(), 9);
        assert_eq!(mesh.index_count(), 36);
        assert!(mesh.indices().iter().all(|i| (*i as usize) < mesh.vertex_count()));
        // every boundary vertex is used by a solid triangle from the center
        for v in 1..=4u16 {
            let solid = mesh.indices().chunks(9).any(|t| t[0] == 0 && (t[1] == 2 * v - 1 || t[2] == 2 * v - 1));
            assert!(solid);
        }
    }

    #[test]
    fn fade_vertices_point_away_from_the_light() {
        let mut mesh = LightMesh::new();
        mesh.build(Vec2::ZERO, &square_hits(), 100.0, &UvMapping::Polar { flip: SpriteFlip::default() })
            .unwrap();
        let v = mesh.vertices();
        for i in 0..4 {
            let solid = v[1 + i * 2].position();
            let faded = v[2 + i * 2].position();
            assert!(faded.length() > solid.length());
            assert_eq!(v[2 + i * 2].color[3], 0.0);
        }
    }

    #[test]
    fn polar_uv_covers_the_range() {
        let mut mesh = LightMesh::new();
        mesh.build(Vec2::ZERO, &square_hits(), 100.0, &UvMapping::Polar { flip: SpriteFlip::default() })
            .unwrap();
        let v = mesh.vertices();
        assert_eq!(v[0].uv, [0.5, 0.5]);
        // (-100, -100) is half a texture away in both axes, y flipped into texture space
        assert_eq!(v[1].uv, [0.0, 1.0]);
    }

    #[test]
    fn buffers_grow_geometrically() {
        let mut mesh = LightMesh::new();
        let uv = UvMapping::Polar { flip: SpriteFlip::default() };
        mesh.build(Vec2::ZERO, &square_hits(), 100.0, &uv).unwrap();
        assert_eq!(mesh.gpu_capacity(), (64, 192));

        let many: Vec<Vec2> = (0..100)
            .map(|i| Vec2::from_angle(i as f32 / 100.0 * std::f32::consts::TAU - std::f32::consts::PI) * 100.0)
            .collect();
        mesh.build(Vec2::ZERO, &many, 100.0, &uv).unwrap();
        assert_eq!(mesh.vertex_count(), 201);
        assert_eq!(mesh.gpu_capacity(), (301, 1350));

        // shrinking keeps the larger GPU buffers
        mesh.build(Vec2::ZERO, &square_hits(), 100.0, &uv).unwrap();
        assert_eq!(mesh.gpu_capacity(), (301, 1350));
    }

    #[test]
    fn steady_growth_reuses_cpu_storage() {
        let ring = |n: usize| -> Vec<Vec2> {
            (0..n)
                .map(|i| Vec2::from_angle(i as f32 / n as f32 * std::f32::consts::TAU - std::f32::consts::PI) * 100.0)
                .collect()
        };
        let mut mesh = LightMesh::new();
        let uv = UvMapping::Polar { flip: SpriteFlip::default() };
        mesh.build(Vec2::ZERO, &ring(100), 100.0, &uv).unwrap();
        let vertices = mesh.vertices().as_ptr();
        let indices = mesh.indices().as_ptr();

        for n in [110, 120, 140] {
            mesh.build(Vec2::ZERO, &ring(n), 100.0, &uv).unwrap();
            assert_eq!(mesh.vertex_count(), n * 2 + 1);
            assert_eq!(mesh.vertices().as_ptr(), vertices);
            assert_eq!(mesh.indices().as_ptr(), indices);
        }
        mesh.build(Vec2::ZERO, &ring(8), 100.0, &uv).unwrap();
        assert_eq!(mesh.vertices().as_ptr(), vertices);
    }

    #[test]
    fn oversized_meshes_are_rejected() {
        let mut mesh = LightMesh::new();
        let hits = vec![Vec2::ONE; 40_000];
        let err = mesh
            .build(Vec2::ZERO, &hits, 100.0, &UvMapping::Polar { flip: SpriteFlip::default() })
            .unwrap_err();
        assert!(matches!(err, LightingError::MeshTooLarge(80_001)));
    }
}
