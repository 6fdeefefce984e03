//! Engine parameter configuration.
//!
//! All tunables are optional in the file and fall back to their documented
//! defaults, so a missing config file simply means "run with defaults".

use serde::Deserialize;
use std::path::Path;

use crate::engine::association::AssociationParameters;
use crate::engine::placement::PlacementParameters;
use crate::engine::propagation::RadioParameters;
use crate::engine::types::UeKind;

/// Antenna heights implied by a UE's kind, meters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct UeHeights {
    pub vehicle_m: f64,
    pub pedestrian_m: f64,
}

impl Default for UeHeights {
    fn default() -> Self {
        Self {
            vehicle_m: 1.5,
            pedestrian_m: 1.5,
        }
    }
}

impl UeHeights {
    pub fn antenna_height_m(&self, kind: UeKind) -> f64 {
        match kind {
            UeKind::Vehicle => self.vehicle_m,
            UeKind::Pedestrian => self.pedestrian_m,
        }
    }
}

/// All engine tunables, grouped per component.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct EngineConfig {
    pub radio: RadioParameters,
    pub association: AssociationParameters,
    pub placement: PlacementParameters,
    pub ue_heights: UeHeights,
}

impl EngineConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Arguments
    /// * `config_path` - Path to the config.toml file
    ///
    /// # Returns
    /// * `Ok(EngineConfig)` if the file was successfully loaded and parsed
    /// * `Err(String)` with a descriptive error message otherwise
    pub fn load(config_path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(config_path).map_err(|e| format!("Failed to read config file: {}", e))?;

        toml::from_str(&content).map_err(|e| format!("Failed to parse config file: {}", e))
    }

    /// Derive the config path from a scene file path.
    ///
    /// Replaces the scene filename with "config.toml" in the same directory.
    pub fn config_path_from_scene(scene_path: &str) -> std::path::PathBuf {
        let scene = Path::new(scene_path);
        scene.parent().unwrap_or(Path::new(".")).join("config.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let config: EngineConfig = toml::from_str("").unwrap();
        assert_eq!(config.radio.frequency_hz, 3.5e9);
        assert_eq!(config.association.handover_hysteresis_db, 3.0);
        assert_eq!(config.placement.per_hop_latency_ms, 2.0);
        assert_eq!(config.ue_heights.vehicle_m, 1.5);
    }

    #[test]
    fn partial_config_overrides_only_named_fields() {
        let config: EngineConfig = toml::from_str(
            r#"
            [radio]
            nlos-penalty-db = 25.0

            [association]
            handover-hysteresis-db = 5.0
            "#,
        )
        .unwrap();
        assert_eq!(config.radio.nlos_penalty_db, 25.0);
        assert_eq!(config.radio.frequency_hz, 3.5e9);
        assert_eq!(config.association.handover_hysteresis_db, 5.0);
        assert_eq!(config.association.min_connect_snr_db, -5.0);
    }

    #[test]
    fn config_path_is_derived_from_the_scene_path() {
        let path = EngineConfig::config_path_from_scene("scenes/downtown.json");
        assert_eq!(path, std::path::PathBuf::from("scenes/config.toml"));
    }
}
