// src/occlusion_lib/mod.rs

pub mod occluder;
pub mod los_merge;
pub mod registry;
pub mod vessel;

pub use occluder::{LosShadow, Occluder, OccluderId, Orientation, Segment, ShadowPoint};
pub use registry::{OccluderRegistry, OcclusionWorld};
pub use vessel::{VesselDirectory, VesselId, VesselInfo, VesselRelation, VesselTable};
