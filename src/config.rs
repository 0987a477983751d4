// src/config.rs

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::LightingError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LosMode {
    /// No line-of-sight mask is produced.
    None,
    /// Areas outside sight are partially revealed (mask drawn with `los_alpha`).
    Transparent,
    /// Areas outside sight are blacked out.
    Opaque,
}

impl Default for LosMode {
    fn default() -> Self {
        LosMode::Transparent
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LightingConfig {
    pub lighting_enabled: bool,
    /// Resolution scale of the light map relative to the screen.
    pub light_map_scale: f32,
    /// Maximum number of light volumes drawn in one frame.
    pub max_active_lights: usize,
    /// Maximum number of full light volume rebuilds in one frame.
    pub recalculation_budget: usize,
    pub los_enabled: bool,
    pub los_alpha: f32,
    pub los_mode: LosMode,
    /// Occluders within `view width * los_range_factor` of the viewer feed the LOS mask.
    pub los_range_factor: f32,
    /// Bounded capacity of the background raycast queue.
    pub worker_queue_capacity: usize,
}

impl Default for LightingConfig {
    fn default() -> Self {
        Self {
            lighting_enabled: true,
            light_map_scale: 0.5,
            max_active_lights: 100,
            recalculation_budget: 5,
            los_enabled: true,
            los_alpha: 1.0,
            los_mode: LosMode::Transparent,
            los_range_factor: 0.75,
            worker_queue_capacity: 64,
        }
    }
}

impl LightingConfig {
    pub fn from_json_str(json: &str) -> Result<Self, LightingError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, LightingError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn to_json_string(&self) -> Result<String, LightingError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Size of the light map render target for a given screen size.
    pub fn light_map_size(&self, screen_width: u32, screen_height: u32) -> (u32, u32) {
        let scale = self.light_map_scale.max(0.0);
        (
            ((screen_width as f32 * scale) as u32).max(1),
            ((screen_height as f32 * scale) as u32).max(1),
        )
    }

    pub fn los_active(&self) -> bool {
        self.los_enabled && self.los_mode != LosMode::None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let config = LightingConfig::from_json_str(r#"{ "recalculation_budget": 2, "los_mode": "opaque" }"#).unwrap();
        assert_eq!(config.recalculation_budget, 2);
        assert_eq!(config.los_mode, LosMode::Opaque);
        assert_eq!(config.max_active_lights, LightingConfig::default().max_active_lights);
    }

    #[test]
    fn malformed_json_is_a_config_error() {
        let err = LightingConfig::from_json_str("{ recalculation_budget: ").unwrap_err();
        assert!(matches!(err, LightingError::Config(_)));
    }

    #[test]
    fn light_map_size_scales_and_never_hits_zero() {
        let config = LightingConfig { light_map_scale: 0.5, ..Default::default() };
        assert_eq!(config.light_map_size(1920, 1080), (960, 540));
        let tiny = LightingConfig { light_map_scale: 0.0, ..Default::default() };
        assert_eq!(tiny.light_map_size(1920, 1080), (1, 1));
    }

    #[test]
    fn round_trips_through_json() {
        let config = LightingConfig { los_mode: LosMode::None, ..Default::default() };
        let text = config.to_json_string().unwrap();
        assert_eq!(LightingConfig::from_json_str(&text).unwrap(), config);
        assert!(!config.los_active());
    }
}
