// src/frame_lib/mod.rs

pub mod manager;
pub mod worker;
pub mod los_mask;
pub mod viewer;

pub use manager::{FrameContext, FrameStats, LightDraw, LightManager};
pub use worker::{RaycastJob, RaycastResult, RaycastWorker};
pub use los_mask::LosMask;
pub use viewer::{BodyPositions, NoBodies, ViewRect, Viewer};
