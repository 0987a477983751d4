// src/lib.rs

pub mod config;
pub mod error;
pub mod geometry;
pub mod intersection;
pub mod occlusion_lib;
pub mod lighting_lib;
pub mod frame_lib;

pub use config::{LightingConfig, LosMode};
pub use error::LightingError;
pub use frame_lib::{FrameContext, LightManager};
pub use lighting_lib::{Light, LightId, LightParams};
pub use occlusion_lib::{OccluderId, OcclusionWorld, VesselTable};
