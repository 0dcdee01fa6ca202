//! Surface area of lat/lon grid cells on a spherical or ellipsoidal Earth.
//!
//! A cell bounded by latitudes φ₁ < φ₂ and spanning Δλ of longitude covers
//!
//! ```text
//! sphere:     A = R² · Δλ · (sin φ₂ − sin φ₁)
//! ellipsoid:  A = a²/2 · Δλ · (q(φ₂) − q(φ₁))
//! ```
//!
//! where `q` is the authalic-latitude function of the ellipsoid, which reduces
//! to `2 sin φ` as the eccentricity goes to zero. Areas depend only on
//! latitude, so a grid needs one value per row. All areas are in hectares.

use serde::{Deserialize, Serialize};

use crate::area::AreaRaster;
use crate::error::{RegridError, Result};
use crate::types::Grid;

/// Mean radius of Earth in metres (IUGG, GRS80 derived constant R₁).
pub const MEAN_EARTH_RADIUS_M: f64 = 6_371_008.8;

pub const SQUARE_METRES_PER_HECTARE: f64 = 10_000.0;

/// Eccentricities below this are treated as a sphere of radius `a`.
const SPHERE_ECCENTRICITY: f64 = 1e-12;

/// Earth shape used for area computation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum EarthModel {
    /// Sphere with the given radius in metres.
    Sphere { radius_m: f64 },
    /// Ellipsoid of revolution with semi-major axis `a` (m) and flattening `f`.
    Ellipsoid { a: f64, f: f64 },
}

impl Default for EarthModel {
    fn default() -> Self {
        Self::Sphere {
            radius_m: MEAN_EARTH_RADIUS_M,
        }
    }
}

impl EarthModel {
    /// WGS84 ellipsoid (EPSG:7030).
    pub const WGS84: Self = Self::Ellipsoid {
        a: 6_378_137.0,
        f: 1.0 / 298.257_223_563,
    };

    /// Parse a model name: `sphere` or `wgs84` (case-insensitive).
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "sphere" | "spherical" => Some(Self::default()),
            "wgs84" | "ellipsoid" => Some(Self::WGS84),
            _ => None,
        }
    }

    /// Check that the model parameters describe a real body.
    pub fn validate(&self) -> Result<()> {
        match *self {
            Self::Sphere { radius_m } if radius_m.is_finite() && radius_m > 0.0 => Ok(()),
            Self::Ellipsoid { a, f } if a.is_finite() && a > 0.0 && (0.0..1.0).contains(&f) => {
                Ok(())
            }
            other => Err(RegridError::ConfigError(format!(
                "invalid earth model {other:?}"
            ))),
        }
    }

    /// Hashable identity, used in cache keys.
    pub(crate) fn key(&self) -> (u8, u64, u64) {
        match *self {
            Self::Sphere { radius_m } => (0, radius_m.to_bits(), 0),
            Self::Ellipsoid { a, f } => (1, a.to_bits(), f.to_bits()),
        }
    }

    /// Square of the radius scaling the zone function.
    fn scale_m2(&self) -> f64 {
        match *self {
            Self::Sphere { radius_m } => radius_m * radius_m,
            Self::Ellipsoid { a, .. } => a * a,
        }
    }

    /// Primitive of the zone area per radian of longitude, divided by the
    /// scale. Equal to `sin φ` on a sphere.
    fn zone(&self, lat_rad: f64) -> f64 {
        let s = lat_rad.sin();
        match *self {
            Self::Sphere { .. } => s,
            Self::Ellipsoid { f, .. } => {
                let e2 = f * (2.0 - f);
                let e = e2.sqrt();
                if e < SPHERE_ECCENTRICITY {
                    return s;
                }
                let q = (1.0 - e2)
                    * (s / (1.0 - e2 * s * s) + ((1.0 + e * s) / (1.0 - e * s)).ln() / (2.0 * e));
                q / 2.0
            }
        }
    }

    /// Area in square metres of the band between two latitudes (degrees)
    /// spanning `delta_lon_rad` of longitude.
    fn band_area_m2(&self, south_deg: f64, north_deg: f64, delta_lon_rad: f64) -> f64 {
        // Southern bands use their northern mirror so both hemispheres round
        // the same way.
        let (south_deg, north_deg) = if north_deg <= 0.0 {
            (-north_deg, -south_deg)
        } else {
            (south_deg, north_deg)
        };
        let dz = self.zone(north_deg.to_radians()) - self.zone(south_deg.to_radians());
        (self.scale_m2() * delta_lon_rad * dz).max(0.0)
    }
}

/// Area in hectares of a cell centred at `lat_center` spanning `delta_lat` by
/// `delta_lon` degrees.
///
/// The band edges are `lat_center ± delta_lat / 2`; a cell that reaches past a
/// pole only covers the part of the band that exists. Latitudes outside
/// [-90, 90] are a caller bug and are rejected rather than clamped.
pub fn cell_area(lat_center: f64, delta_lat: f64, delta_lon: f64, earth: &EarthModel) -> Result<f64> {
    if !lat_center.is_finite() || !(-90.0..=90.0).contains(&lat_center) {
        return Err(RegridError::InvalidLatitude(lat_center));
    }
    if !(delta_lat.is_finite() && delta_lat > 0.0) {
        return Err(RegridError::InvalidResolution(format!(
            "delta_lat must be > 0, got {delta_lat}"
        )));
    }
    if !(delta_lon.is_finite() && delta_lon > 0.0) {
        return Err(RegridError::InvalidResolution(format!(
            "delta_lon must be > 0, got {delta_lon}"
        )));
    }

    let south = (lat_center - delta_lat / 2.0).max(-90.0);
    let north = (lat_center + delta_lat / 2.0).min(90.0);
    let area_m2 = earth.band_area_m2(south, north, delta_lon.to_radians());
    Ok(area_m2 / SQUARE_METRES_PER_HECTARE)
}

/// Per-row cell areas for a grid.
///
/// Areas vary only with latitude, so the result holds one value per row;
/// [`AreaRaster::get`] broadcasts it across columns.
pub fn grid_cell_areas(grid: &Grid, earth: &EarthModel) -> Result<AreaRaster> {
    grid.validate()?;
    earth.validate()?;
    let per_row = (0..grid.rows)
        .map(|row| cell_area(grid.row_center_lat(row), grid.res_lat, grid.res_lon, earth))
        .collect::<Result<Vec<f64>>>()?;
    AreaRaster::per_row(per_row, grid.cols)
}

/// Total surface area of the Earth model in hectares.
pub fn earth_surface_area(earth: &EarthModel) -> f64 {
    earth.band_area_m2(-90.0, 90.0, std::f64::consts::TAU) / SQUARE_METRES_PER_HECTARE
}
