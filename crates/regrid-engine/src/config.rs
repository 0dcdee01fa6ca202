//! Configuration for the regridding engine.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::geometry::{EarthModel, MEAN_EARTH_RADIUS_M};

/// Default upper bound on source cells held in memory per block (64 MiB of f32).
pub const DEFAULT_MAX_BLOCK_CELLS: usize = 16 * 1024 * 1024;

/// Configuration for the regridder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegridConfig {
    /// Upper bound on source cells read per block when the block shape is automatic.
    pub max_block_cells: usize,

    /// Process blocks on the rayon thread pool.
    pub parallel: bool,

    /// Earth shape used for cell areas.
    pub earth_model: EarthModel,

    /// Memory budget for cached area rasters in megabytes.
    pub area_cache_size_mb: usize,
}

impl Default for RegridConfig {
    fn default() -> Self {
        Self {
            max_block_cells: DEFAULT_MAX_BLOCK_CELLS,
            parallel: false,
            earth_model: EarthModel::default(),
            area_cache_size_mb: 64,
        }
    }
}

impl RegridConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("REGRID_MAX_BLOCK_CELLS") {
            match val.parse() {
                Ok(cells) => config.max_block_cells = cells,
                Err(_) => warn!(value = %val, "Ignoring invalid REGRID_MAX_BLOCK_CELLS"),
            }
        }

        if let Ok(val) = std::env::var("REGRID_PARALLEL") {
            config.parallel = val.to_lowercase() == "true" || val == "1";
        }

        if let Ok(val) = std::env::var("REGRID_EARTH_MODEL") {
            match EarthModel::from_name(&val) {
                Some(model) => config.earth_model = model,
                None => warn!(value = %val, "Ignoring unknown REGRID_EARTH_MODEL"),
            }
        }

        if let Ok(val) = std::env::var("REGRID_EARTH_RADIUS_M") {
            match val.parse::<f64>() {
                Ok(radius_m) if matches!(config.earth_model, EarthModel::Sphere { .. }) => {
                    config.earth_model = EarthModel::Sphere { radius_m };
                }
                Ok(_) => warn!("REGRID_EARTH_RADIUS_M only applies to the spherical model"),
                Err(_) => warn!(value = %val, "Ignoring invalid REGRID_EARTH_RADIUS_M"),
            }
        }

        if let Ok(val) = std::env::var("AREA_CACHE_SIZE_MB") {
            match val.parse() {
                Ok(size) => config.area_cache_size_mb = size,
                Err(_) => warn!(value = %val, "Ignoring invalid AREA_CACHE_SIZE_MB"),
            }
        }

        config
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_block_cells == 0 {
            return Err("max_block_cells must be > 0".to_string());
        }

        if self.area_cache_size_mb == 0 {
            return Err("area_cache_size_mb must be > 0".to_string());
        }

        self.earth_model.validate().map_err(|e| e.to_string())
    }

    /// Get the area cache size in bytes.
    pub fn area_cache_size_bytes(&self) -> usize {
        self.area_cache_size_mb * 1024 * 1024
    }

    /// Radius of the spherical model, if one is configured.
    pub fn sphere_radius_m(&self) -> Option<f64> {
        match self.earth_model {
            EarthModel::Sphere { radius_m } => Some(radius_m),
            EarthModel::Ellipsoid { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RegridConfig::default();
        assert_eq!(config.max_block_cells, DEFAULT_MAX_BLOCK_CELLS);
        assert!(!config.parallel);
        assert_eq!(config.sphere_radius_m(), Some(MEAN_EARTH_RADIUS_M));
        assert_eq!(config.area_cache_size_bytes(), 64 * 1024 * 1024);
    }

    #[test]
    fn test_config_validation() {
        let mut config = RegridConfig::default();
        assert!(config.validate().is_ok());

        config.max_block_cells = 0;
        assert!(config.validate().is_err());

        config = RegridConfig::default();
        config.area_cache_size_mb = 0;
        assert!(config.validate().is_err());

        config = RegridConfig::default();
        config.earth_model = EarthModel::Sphere { radius_m: 0.0 };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_cache_size_falls_back_to_default() {
        std::env::set_var("AREA_CACHE_SIZE_MB", "lots");
        assert_eq!(RegridConfig::from_env().area_cache_size_mb, 64);

        std::env::set_var("AREA_CACHE_SIZE_MB", "8");
        assert_eq!(RegridConfig::from_env().area_cache_size_mb, 8);

        std::env::remove_var("AREA_CACHE_SIZE_MB");
    }

    #[test]
    fn test_config_serde_roundtrip_keeps_earth_model() {
        let config = RegridConfig {
            earth_model: EarthModel::WGS84,
            ..Default::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("\"type\":\"ellipsoid\""));
        let parsed: RegridConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, config);
    }
}
