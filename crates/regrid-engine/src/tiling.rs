//! Degree-based tiling of the globe.
//!
//! Tiles are `size x size` degree squares on a lattice anchored at
//! (-90°, -180°). Large rasters are processed tile by tile: only tiles touched
//! by the source extent are visited, and each tile is snapped to target-cell
//! edges so that no target cell is split between two blocks.

use serde::{Deserialize, Serialize};

use crate::error::{RegridError, Result};
use crate::types::{BoundingBox, CellBlock, Grid, INDEX_EPSILON};

/// One tile of the global lattice, in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TileCase {
    pub lat_min: f64,
    pub lat_max: f64,
    pub lon_min: f64,
    pub lon_max: f64,
}

impl TileCase {
    pub fn bbox(&self) -> BoundingBox {
        BoundingBox::new(self.lon_min, self.lat_min, self.lon_max, self.lat_max)
    }

    /// Whether the tile shares any area or edge with `bbox`.
    pub fn intersects(&self, bbox: &BoundingBox) -> bool {
        self.bbox().intersects(bbox)
    }

    /// Identifier of the form `latmin_latmax_lonmin_lonmax`.
    pub fn label(&self) -> String {
        format!(
            "{}_{}_{}_{}",
            self.lat_min, self.lat_max, self.lon_min, self.lon_max
        )
    }
}

/// Number of tiles along an axis of `span` degrees.
fn tiles_along(span: f64, size_deg: f64) -> Result<i64> {
    if !(size_deg.is_finite() && size_deg > 0.0) {
        return Err(RegridError::InvalidTileSize(size_deg));
    }
    let n = span / size_deg;
    if (n - n.round()).abs() > INDEX_EPSILON {
        return Err(RegridError::InvalidTileSize(size_deg));
    }
    Ok(n.round() as i64)
}

/// Every tile of the global lattice, south to north then west to east.
pub fn global_tiles(size_deg: f64) -> Result<Vec<TileCase>> {
    tiles_touching(&BoundingBox::default(), size_deg)
}

/// Tiles of the lattice that overlap `bbox`, south to north then west to east.
///
/// Latitudes are limited to the globe; longitudes follow the bbox, so extents
/// given in a 0..360 convention get tiles beyond 180°.
pub fn tiles_touching(bbox: &BoundingBox, size_deg: f64) -> Result<Vec<TileCase>> {
    let lat_tiles = tiles_along(180.0, size_deg)?;
    tiles_along(360.0, size_deg)?;

    let lat_first = (((bbox.min_lat + 90.0) / size_deg).floor() as i64).max(0);
    let lat_last = (((bbox.max_lat + 90.0) / size_deg).ceil() as i64).min(lat_tiles);
    let lon_first = ((bbox.min_lon + 180.0) / size_deg).floor() as i64;
    let lon_last = ((bbox.max_lon + 180.0) / size_deg).ceil() as i64;

    let mut tiles = Vec::new();
    for i in lat_first..lat_last.max(lat_first + 1).min(lat_tiles) {
        for j in lon_first..lon_last.max(lon_first + 1) {
            let lat_min = -90.0 + i as f64 * size_deg;
            let lon_min = -180.0 + j as f64 * size_deg;
            tiles.push(TileCase {
                lat_min,
                lat_max: lat_min + size_deg,
                lon_min,
                lon_max: lon_min + size_deg,
            });
        }
    }
    Ok(tiles)
}

/// Source blocks covering `grid`, one per tile of `size_deg` degrees.
///
/// Tile edges are snapped to the nearest target-cell edge (target cells are
/// `k_lat x k_lon` source cells), so adjacent tiles share their snapped edge
/// and the blocks partition the grid exactly.
pub fn tile_blocks(grid: &Grid, k_lat: usize, k_lon: usize, size_deg: f64) -> Result<Vec<CellBlock>> {
    if k_lat == 0 || k_lon == 0 || grid.rows % k_lat != 0 || grid.cols % k_lon != 0 {
        return Err(RegridError::invalid_block(format!(
            "{}x{} grid does not divide into {k_lat}x{k_lon} target cells",
            grid.rows, grid.cols
        )));
    }
    let target_rows = grid.rows / k_lat;
    let target_cols = grid.cols / k_lon;
    let cell_lat = grid.res_lat * k_lat as f64;
    let cell_lon = grid.res_lon * k_lon as f64;

    let snap = |offset: f64, limit: usize| -> usize { offset.round().clamp(0.0, limit as f64) as usize };

    let mut blocks = Vec::new();
    for tile in tiles_touching(&grid.bbox(), size_deg)? {
        let top = snap((grid.origin_lat - tile.lat_max) / cell_lat, target_rows);
        let bottom = snap((grid.origin_lat - tile.lat_min) / cell_lat, target_rows);
        let left = snap((tile.lon_min - grid.origin_lon) / cell_lon, target_cols);
        let right = snap((tile.lon_max - grid.origin_lon) / cell_lon, target_cols);
        if bottom <= top || right <= left {
            continue;
        }
        blocks.push(CellBlock::new(
            top * k_lat,
            bottom * k_lat,
            left * k_lon,
            right * k_lon,
        )?);
    }

    blocks.sort_by_key(|b| (b.row_start, b.col_start));
    let covered: usize = blocks.iter().map(CellBlock::len).sum();
    if covered != grid.len() {
        return Err(RegridError::extent_mismatch(format!(
            "{size_deg}° tiles cover {covered} of {} source cells",
            grid.len()
        )));
    }
    Ok(blocks)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_global_tiles() {
        let tiles = global_tiles(30.0).unwrap();
        assert_eq!(tiles.len(), 6 * 12);
        assert_eq!(
            tiles[0],
            TileCase {
                lat_min: -90.0,
                lat_max: -60.0,
                lon_min: -180.0,
                lon_max: -150.0
            }
        );
        assert_eq!(tiles[0].label(), "-90_-60_-180_-150");

        assert!(global_tiles(7.0).is_err());
        assert!(global_tiles(0.0).is_err());
    }

    #[test]
    fn test_tiles_touching_region() {
        let europe = BoundingBox::new(-10.0, 35.0, 40.0, 70.0);
        let tiles = tiles_touching(&europe, 10.0).unwrap();
        // lat 30..70 (4 tiles) x lon -10..40 (5 tiles)
        assert_eq!(tiles.len(), 20);
        assert!(tiles.iter().all(|t| t.intersects(&europe)));
    }

    #[test]
    fn test_tile_blocks_partition_grid() {
        let grid = Grid::global(1.0, 1.0).unwrap();
        let blocks = tile_blocks(&grid, 2, 2, 30.0).unwrap();
        assert_eq!(blocks.len(), 72);
        assert!(blocks.iter().all(|b| b.is_aligned(2, 2)));
        assert_eq!(blocks[0], CellBlock::new(0, 30, 0, 30).unwrap());
    }

    #[test]
    fn test_tile_blocks_snap_to_target_cells() {
        // Target cells of 4° do not line up with 10° tiles.
        let grid = Grid::new(40.0, 0.0, 1.0, 1.0, 40, 40).unwrap();
        let blocks = tile_blocks(&grid, 4, 4, 10.0).unwrap();
        assert!(blocks.iter().all(|b| b.is_aligned(4, 4)));
        let covered: usize = blocks.iter().map(CellBlock::len).sum();
        assert_eq!(covered, grid.len());
    }

    #[test]
    fn test_tile_blocks_beyond_antimeridian() {
        let grid = Grid::new(90.0, 0.0, 1.0, 1.0, 180, 360).unwrap();
        let blocks = tile_blocks(&grid, 1, 1, 90.0).unwrap();
        assert_eq!(blocks.len(), 2 * 4);
    }

    #[test]
    fn test_tile_blocks_rejects_bad_factor() {
        let grid = Grid::global(1.0, 1.0).unwrap();
        assert!(tile_blocks(&grid, 7, 1, 30.0).is_err());
    }
}
