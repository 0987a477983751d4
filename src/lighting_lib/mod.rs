// src/lighting_lib/mod.rs

pub mod light;
pub mod hull_cache;
pub mod shadow;
pub mod light_mesh;
pub mod vertex;

pub use light::{BodyId, Light, LightId, LightParams, OverrideTexture, SpriteQuad};
pub use hull_cache::HullCache;
pub use shadow::{find_raycast_hits, RaycastInput, RaycastOutcome};
pub use light_mesh::{LightMesh, SpriteFlip, UvMapping};
pub use vertex::{LightVertex, MaskVertex};
